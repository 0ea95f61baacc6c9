/// Metric extraction: declarative patterns applied to single lines of
/// command blocks.
///
/// Values stay text so the output table keeps the tool's exact formatting.
/// When a pattern matches more than once, the first match wins.
use crate::script::Script;
use crate::transcript::{CommandBlock, Transcript};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// What a metric line looks like. Each kind owns its pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// `time` output: `elapse: 0.25 seconds, total: 0.50 seconds`.
    Elapsed,
    /// Timer line: `t_symm =     0.01 sec`.
    Seconds,
    /// `gbdd_build` output: `Node count: 42`.
    NodeCount,
    /// `print_stats` output: `... and =    123  lev = 17`.
    AndCount,
    /// `AIG size: 120 -> 95 (-20.83%)`: before, after, change.
    AigSize,
    /// `BDD size: 80 -> 80 (0.00%)`: before, after, change.
    BddSize,
    /// `Selection: 0110 (50.00% of components)`: one bit per output.
    Selection,
    /// `Total error: 0.12`.
    TotalError,
    /// `Primary inputs (32): ...`.
    PrimaryInputs,
    /// `Primary outputs (17): ...`.
    PrimaryOutputs,
}

static ELAPSED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"elapse: ([\d.]+)").unwrap());
static SECONDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"= *([\d.]+) sec").unwrap());
static NODE_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Node count: (\d+)").unwrap());
static AND_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"and = +(\d+)").unwrap());
static AIG_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"AIG size: (\d+) -> (\d+) \(((?:[-\d.%]|inf|nan)+)\)").unwrap());
static BDD_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BDD size: (\d+) -> (\d+) \(((?:[-\d.%]|inf|nan)+)\)").unwrap());
static SELECTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Selection: ([01]+)").unwrap());
static TOTAL_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Total error: (\d*\.\d*)").unwrap());
static PRIMARY_INPUTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Primary inputs \((\d+)\):").unwrap());
static PRIMARY_OUTPUTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Primary outputs \((\d+)\):").unwrap());

impl MetricKind {
    pub fn pattern(self) -> &'static Regex {
        match self {
            MetricKind::Elapsed => &ELAPSED,
            MetricKind::Seconds => &SECONDS,
            MetricKind::NodeCount => &NODE_COUNT,
            MetricKind::AndCount => &AND_COUNT,
            MetricKind::AigSize => &AIG_SIZE,
            MetricKind::BddSize => &BDD_SIZE,
            MetricKind::Selection => &SELECTION,
            MetricKind::TotalError => &TOTAL_ERROR,
            MetricKind::PrimaryInputs => &PRIMARY_INPUTS,
            MetricKind::PrimaryOutputs => &PRIMARY_OUTPUTS,
        }
    }

    /// Number of capture groups a match yields.
    pub fn arity(self) -> usize {
        match self {
            MetricKind::AigSize | MetricKind::BddSize => 3,
            _ => 1,
        }
    }
}

/// One entry of an extraction table: where a metric lives and what it looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSpec {
    pub name: &'static str,
    /// Label of the instruction whose output block holds the metric.
    pub instruction: &'static str,
    /// Output line within that block, echo excluded.
    pub line: usize,
    pub kind: MetricKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("metric {metric} not found in line {line} of {instruction:?} output: {content:?}")]
    MetricNotFound {
        metric: &'static str,
        instruction: &'static str,
        line: usize,
        content: Option<String>,
    },
    #[error("metric {metric} refers to unissued instruction {instruction:?}")]
    UnknownInstruction {
        metric: &'static str,
        instruction: &'static str,
    },
    #[error("no extracted metric named {0}")]
    UnknownMetric(&'static str),
}

/// Capture groups of the first match of `pattern` on line `line` of `block`.
///
/// `None` when the line does not exist or the pattern does not match it.
pub fn extract<'a>(block: &'a CommandBlock, line: usize, pattern: &Regex) -> Option<Vec<&'a str>> {
    let text = block.line(line)?;
    let captures = pattern.captures(text)?;
    Some(
        captures
            .iter()
            .skip(1)
            .map(|group| group.map_or("", |m| m.as_str()))
            .collect(),
    )
}

/// Extracted values of one tool invocation, keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    values: HashMap<&'static str, Vec<String>>,
}

impl Metrics {
    /// Capture group `group` (0-based) of metric `name`.
    pub fn get(&self, name: &'static str, group: usize) -> Result<&str, ExtractError> {
        self.values
            .get(name)
            .and_then(|groups| groups.get(group))
            .map(String::as_str)
            .ok_or(ExtractError::UnknownMetric(name))
    }
}

/// Apply every entry of `specs` to `transcript`. Any miss fails the whole set.
pub fn extract_all(
    specs: &[MetricSpec],
    script: &Script,
    transcript: &Transcript,
) -> Result<Metrics, ExtractError> {
    let mut metrics = Metrics::default();
    for spec in specs {
        let tag = script
            .tag_of(spec.instruction)
            .ok_or(ExtractError::UnknownInstruction {
                metric: spec.name,
                instruction: spec.instruction,
            })?;
        let not_found = |content: Option<&str>| ExtractError::MetricNotFound {
            metric: spec.name,
            instruction: spec.instruction,
            line: spec.line,
            content: content.map(str::to_string),
        };
        let block = transcript.block(tag).ok_or_else(|| not_found(None))?;
        let groups = extract(block, spec.line, spec.kind.pattern())
            .ok_or_else(|| not_found(block.line(spec.line)))?;
        debug_assert_eq!(groups.len(), spec.kind.arity());
        tracing::trace!(metric = spec.name, values = ?groups, "extracted");
        metrics
            .values
            .insert(spec.name, groups.into_iter().map(str::to_string).collect());
    }
    Ok(metrics)
}
