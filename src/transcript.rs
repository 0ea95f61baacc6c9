/// Transcript parsing: validate the tool banner and split the session output
/// into one block per issued instruction.
///
/// The tool prints a prompt (`abc 01> `) and echoes each instruction before
/// its output. Everything before the first prompt is banner and is dropped.
/// Each block is bound to the instruction it echoes; a block whose echo does
/// not match the instruction issued at that point is a structural error.
use crate::script::{InstructionTag, Script};
use regex::Regex;

/// Banner text and prompt marker of one tool.
#[derive(Debug, Clone)]
pub struct TranscriptGrammar {
    banner: String,
    marker: Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBlock {
    tag: InstructionTag,
    echo: String,
    lines: Vec<String>,
}

impl CommandBlock {
    pub fn tag(&self) -> InstructionTag {
        self.tag
    }

    /// The instruction text as echoed after the prompt.
    pub fn echo(&self) -> &str {
        &self.echo
    }

    /// Output lines, echo excluded.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }
}

/// A validated transcript: exactly one block per script instruction, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    blocks: Vec<CommandBlock>,
}

impl Transcript {
    pub fn block(&self, tag: InstructionTag) -> Option<&CommandBlock> {
        self.blocks.iter().find(|b| b.tag() == tag)
    }

    pub fn blocks(&self) -> &[CommandBlock] {
        &self.blocks
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("expected tool output starting with {expected:?}, got {found:?}")]
    MissingBanner { expected: String, found: String },
    #[error("expected {expected} command blocks, transcript has {found}")]
    BlockCount { expected: usize, found: usize },
    #[error("command block {index} echoes {found:?}, expected {expected:?}")]
    Misaligned {
        index: usize,
        expected: String,
        found: String,
    },
}

impl Default for TranscriptGrammar {
    fn default() -> Self {
        Self::new("UC Berkeley, ABC", "abc")
    }
}

impl TranscriptGrammar {
    /// `prompt` is the tool name printed before the instruction counter
    /// (`abc` for `abc 07> `). Counters of any width are accepted.
    pub fn new(banner: &str, prompt: &str) -> Self {
        let marker = format!(r"\r?\n{} \d+> ", regex::escape(prompt));
        Self {
            banner: banner.to_string(),
            marker: Regex::new(&marker).expect("escaped prompt forms a valid pattern"),
        }
    }

    /// Decompose `text` into one block per instruction of `script`.
    ///
    /// Pure function of its inputs: the same text and script always yield
    /// the same blocks.
    pub fn parse(&self, text: &str, script: &Script) -> Result<Transcript, TranscriptError> {
        if !text.starts_with(&self.banner) {
            return Err(TranscriptError::MissingBanner {
                expected: self.banner.clone(),
                found: text.lines().next().unwrap_or_default().to_string(),
            });
        }

        let mut segments: Vec<&str> = self.marker.split(text).skip(1).collect();

        // The tool prints one more prompt when stdin runs dry.
        if segments.len() == script.len() + 1
            && segments.last().is_some_and(|s| s.trim().is_empty())
        {
            segments.pop();
        }

        if segments.len() != script.len() {
            return Err(TranscriptError::BlockCount {
                expected: script.len(),
                found: segments.len(),
            });
        }

        let mut blocks = Vec::with_capacity(segments.len());
        for (index, (segment, instruction)) in
            segments.into_iter().zip(script.instructions()).enumerate()
        {
            let mut lines = segment.lines();
            let echo = lines.next().unwrap_or_default().trim();
            if echo != instruction.text.trim() {
                return Err(TranscriptError::Misaligned {
                    index,
                    expected: instruction.text.clone(),
                    found: echo.to_string(),
                });
            }
            blocks.push(CommandBlock {
                tag: instruction.tag,
                echo: echo.to_string(),
                lines: lines.map(str::to_string).collect(),
            });
        }

        Ok(Transcript { blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::abc_transcript;

    fn sample_script() -> Script {
        let mut script = Script::new();
        script.push("setup", "source ./../../abc.rc");
        script.push("read", "read benchmark/preprocessed/add/add16.aig");
        script.push("print_io", "print_io");
        script
    }

    fn sample_transcript() -> String {
        abc_transcript(&[
            ("source ./../../abc.rc", &[]),
            ("read benchmark/preprocessed/add/add16.aig", &[]),
            (
                "print_io",
                &[
                    "Primary inputs (32): a0 a1",
                    "Primary outputs (17): s0 s1",
                ],
            ),
        ])
    }

    #[test]
    fn test_parse_binds_one_block_per_instruction() {
        let script = sample_script();
        let transcript = TranscriptGrammar::default()
            .parse(&sample_transcript(), &script)
            .unwrap();

        assert_eq!(transcript.blocks().len(), 3);
        let io = transcript.block(script.tag_of("print_io").unwrap()).unwrap();
        assert_eq!(io.echo(), "print_io");
        assert_eq!(
            io.lines(),
            &[
                "Primary inputs (32): a0 a1",
                "Primary outputs (17): s0 s1",
            ]
        );
        let setup = transcript.block(script.tag_of("setup").unwrap()).unwrap();
        assert!(setup.lines().is_empty());
    }

    #[test]
    fn test_parse_synthetic_transcript_keeps_issue_order() {
        let mut script = Script::new();
        let texts = ["time", "strash", "time", "print_stats", "time"];
        let labels = ["t0", "opt", "t1", "stats", "t2"];
        for (label, text) in labels.into_iter().zip(texts) {
            script.push(label, text);
        }
        const ELAPSE: &[&str] = &["elapse: 0.01 seconds, total: 0.01 seconds"];
        let outputs: Vec<(&str, &[&str])> = texts.iter().map(|t| (*t, ELAPSE)).collect();

        let transcript = TranscriptGrammar::default()
            .parse(&abc_transcript(&outputs), &script)
            .unwrap();

        assert_eq!(transcript.blocks().len(), texts.len());
        for (i, block) in transcript.blocks().iter().enumerate() {
            assert_eq!(block.tag().index(), i);
            assert_eq!(block.echo(), texts[i]);
        }
    }

    #[test]
    fn test_parse_is_idempotent() {
        let grammar = TranscriptGrammar::default();
        let script = sample_script();
        let text = sample_transcript();
        assert_eq!(
            grammar.parse(&text, &script).unwrap(),
            grammar.parse(&text, &script).unwrap()
        );
    }

    #[test]
    fn test_missing_banner_is_rejected() {
        let script = sample_script();
        let text = "bash: abc: command not found\n";
        let err = TranscriptGrammar::default()
            .parse(text, &script)
            .unwrap_err();
        assert_eq!(
            err,
            TranscriptError::MissingBanner {
                expected: "UC Berkeley, ABC".to_string(),
                found: "bash: abc: command not found".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_transcript_is_missing_banner() {
        let err = TranscriptGrammar::default()
            .parse("", &sample_script())
            .unwrap_err();
        assert!(matches!(err, TranscriptError::MissingBanner { .. }));
    }

    #[test]
    fn test_truncated_transcript_is_block_count_error() {
        // Tool died after the second instruction.
        let text = abc_transcript(&[
            ("source ./../../abc.rc", &[]),
            ("read benchmark/preprocessed/add/add16.aig", &[]),
        ]);
        let text = text.trim_end_matches("abc 03> ");
        let err = TranscriptGrammar::default()
            .parse(text, &sample_script())
            .unwrap_err();
        assert_eq!(
            err,
            TranscriptError::BlockCount {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn test_trailing_prompt_is_optional() {
        let script = sample_script();
        let full = sample_transcript();
        let without_final_prompt = full.trim_end_matches("abc 04> ");
        let grammar = TranscriptGrammar::default();
        assert_eq!(
            grammar.parse(&full, &script).unwrap(),
            grammar.parse(without_final_prompt, &script).unwrap()
        );
    }

    #[test]
    fn test_misaligned_echo_is_rejected() {
        let mut script = Script::new();
        script.push("setup", "source ./../../abc.rc");
        script.push("print_io", "print_io");
        let text = abc_transcript(&[("source ./../../abc.rc", &[]), ("print_stats", &[])]);
        let err = TranscriptGrammar::default()
            .parse(&text, &script)
            .unwrap_err();
        assert_eq!(
            err,
            TranscriptError::Misaligned {
                index: 1,
                expected: "print_io".to_string(),
                found: "print_stats".to_string(),
            }
        );
    }

    #[test]
    fn test_wide_prompt_counter() {
        let mut script = Script::new();
        script.push("stats", "print_stats");
        let text = "UC Berkeley, ABC 1.01\nabc 123> print_stats\nand = 5\nabc 124> ";
        let transcript = TranscriptGrammar::default().parse(text, &script).unwrap();
        assert_eq!(transcript.blocks()[0].lines(), &["and = 5"]);
    }

    #[test]
    fn test_output_mentioning_prompt_name_is_not_a_marker() {
        let mut script = Script::new();
        script.push("stats", "print_stats");
        let text = "UC Berkeley, ABC 1.01\nabc 01> print_stats\nabc network: and = 5\nabc 02> ";
        let transcript = TranscriptGrammar::default().parse(text, &script).unwrap();
        assert_eq!(transcript.blocks()[0].lines(), &["abc network: and = 5"]);
    }
}
