/// Scripted instruction sequences fed to the tool over stdin.
///
/// Every instruction is paired with an `InstructionTag` when it is pushed.
/// The transcript parser binds each output block to the tag of the
/// instruction it echoes, so callers look up output by tag (or by the
/// instruction's label) instead of by position.
use serde::Serialize;

/// Identifier handed out by `Script::push`, unique within one script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InstructionTag(usize);

impl InstructionTag {
    /// Issue-order index of the instruction.
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub tag: InstructionTag,
    pub label: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Script {
    instructions: Vec<Instruction>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one instruction. `label` names its role (`"symmetrize"`,
    /// `"time_opt"`) and must not repeat within the script.
    pub fn push(&mut self, label: &'static str, text: impl Into<String>) -> InstructionTag {
        let text = text.into();
        debug_assert!(!text.contains('\n'), "instruction must be a single line");
        debug_assert!(
            self.tag_of(label).is_none(),
            "duplicate instruction label {label}"
        );
        let tag = InstructionTag(self.instructions.len());
        self.instructions.push(Instruction { tag, label, text });
        tag
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn tag_of(&self, label: &str) -> Option<InstructionTag> {
        self.instructions
            .iter()
            .find(|i| i.label == label)
            .map(|i| i.tag)
    }

    /// The text written to the tool's stdin: one instruction per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for instruction in &self.instructions {
            out.push_str(&instruction.text);
            out.push('\n');
        }
        out
    }
}
