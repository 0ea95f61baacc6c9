/// Sweep plumbing shared by the preprocessing and symmetrization sweeps:
/// benchmark categories, bit-width ranges, instance enumeration, resolved
/// run settings, and the per-stage invoke/parse/extract pipeline.
use crate::config::{self, Config, ConfigError, PathsConfig, ToolConfig};
use crate::extract::{extract_all, ExtractError, MetricSpec};
use crate::invoker::{Invocation, InvokeError, ToolInvoker};
use crate::row::{RowWidthError, StageOutcome};
use crate::script::Script;
use crate::table::TableError;
use crate::transcript::{TranscriptError, TranscriptGrammar};
use clap::ValueEnum;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Add,
    Mult,
    Mac,
    Asymm,
    Networks,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Add => "add",
            Category::Mult => "mult",
            Category::Mac => "mac",
            Category::Asymm => "asymm",
            Category::Networks => "networks",
        }
    }

    /// Default bit-width sweep of a generated family; `None` for file-based ones.
    pub fn default_widths(self) -> Option<WidthRange> {
        let (start, end, stride) = match self {
            Category::Add => (16, 256, 16),
            Category::Mult => (1, 13, 1),
            Category::Mac => (1, 5, 1),
            Category::Asymm => (1, 18, 1),
            Category::Networks => return None,
        };
        Some(WidthRange { start, end, stride })
    }
}

/// Error metric the tool optimizes against; passed through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMetric {
    Er,
    Awae,
    Nawae,
}

impl ErrorMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorMetric::Er => "er",
            ErrorMetric::Awae => "awae",
            ErrorMetric::Nawae => "nawae",
        }
    }
}

/// Inclusive bit-width range walked with a fixed stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WidthRange {
    pub start: u32,
    pub end: u32,
    pub stride: u32,
}

/// Command-line overrides of a `WidthRange`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WidthOverrides {
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub stride: Option<u32>,
}

impl WidthRange {
    pub fn with_overrides(self, overrides: &WidthOverrides) -> Result<WidthRange, SweepError> {
        let range = WidthRange {
            start: overrides.start.unwrap_or(self.start),
            end: overrides.end.unwrap_or(self.end),
            stride: overrides.stride.unwrap_or(self.stride),
        };
        if range.stride == 0 {
            return Err(SweepError::ZeroStride);
        }
        Ok(range)
    }

    /// `start`, `start + stride`, ... while `<= end`.
    pub fn widths(self) -> impl Iterator<Item = u32> {
        let stride = self.stride.max(1) as usize;
        (self.start..=self.end).step_by(stride)
    }
}

/// Where the circuit of an instance comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InstanceSource {
    /// Built by the tool itself (`netgen ...`).
    Generated { instruction: String },
    /// Read from files that must still exist when the instance runs.
    Files { paths: Vec<PathBuf> },
}

/// One member of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BenchmarkInstance {
    pub category: Category,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairs: Option<u32>,
    pub source: InstanceSource,
}

impl BenchmarkInstance {
    /// Input files that have disappeared since enumeration.
    pub fn missing_inputs(&self) -> Vec<&Path> {
        match &self.source {
            InstanceSource::Generated { .. } => Vec::new(),
            InstanceSource::Files { paths } => paths
                .iter()
                .map(PathBuf::as_path)
                .filter(|p| !p.is_file())
                .collect(),
        }
    }
}

/// Files in `dir` with extension `ext`, in directory enumeration order.
pub fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, SweepError> {
    let enumerate_err = |source| SweepError::Enumerate {
        dir: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(enumerate_err)? {
        let path = entry.map_err(enumerate_err)?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == ext) {
            files.push(path);
        }
    }
    Ok(files)
}

/// Settings shared by every stage of a run, resolved from config file and
/// command line. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct SweepSettings {
    pub tool: ToolConfig,
    pub paths: PathsConfig,
    #[serde(serialize_with = "serialize_secs")]
    pub timeout: Duration,
    pub optimize_command: String,
    pub unbounded_error_bound: String,
    pub verbosity: u8,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub timeout: Option<String>,
    pub optimize_command: Option<String>,
    pub verbosity: u8,
}

impl SweepSettings {
    /// Benchmark paths are anchored at the tool's working directory and made
    /// absolute, since they appear both in tool scripts and in symbench's own
    /// file operations.
    pub fn resolve(
        config: &Config,
        overrides: &RunOverrides,
    ) -> Result<SweepSettings, ConfigError> {
        let timeout = overrides.timeout.as_deref().unwrap_or(&config.run.timeout);
        let optimize_command = overrides
            .optimize_command
            .clone()
            .unwrap_or_else(|| config.run.optimize_command.clone());
        config::validate_optimize_command(&optimize_command)?;

        let working_dir = match std::path::absolute(&config.tool.working_dir) {
            Ok(dir) => dir,
            Err(source) => {
                return Err(ConfigError::WorkingDir {
                    path: config.tool.working_dir.clone(),
                    source,
                })
            }
        };
        let tool = ToolConfig {
            working_dir: working_dir.clone(),
            ..config.tool.clone()
        };

        Ok(SweepSettings {
            tool,
            paths: config.paths.anchored(&working_dir),
            timeout: config::parse_timeout(timeout)?,
            optimize_command,
            unbounded_error_bound: config.run.unbounded_error_bound.clone(),
            verbosity: overrides.verbosity,
        })
    }

    pub fn preprocessed_dir(&self, category: Category) -> PathBuf {
        self.paths.preprocessed_dir.join(category.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("malformed tool transcript for {instance}: {source}")]
    Transcript {
        instance: String,
        #[source]
        source: TranscriptError,
    },
    #[error("unexpected tool output for {instance}: {source}")]
    Extract {
        instance: String,
        #[source]
        source: ExtractError,
    },
    #[error("row for {instance} does not fit the table: {source}")]
    Row {
        instance: String,
        #[source]
        source: RowWidthError,
    },
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("failed to list {}: {source}", dir.display())]
    Enumerate {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bit-width stride must be at least 1")]
    ZeroStride,
}

/// What a finished sweep produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub table: PathBuf,
    pub rows: usize,
    pub timed_out_stages: usize,
    pub skipped: usize,
}

/// Invoke, parse, and extract for one stage of one instance.
pub struct Pipeline {
    invoker: ToolInvoker,
    grammar: TranscriptGrammar,
    verbosity: u8,
}

impl Pipeline {
    pub fn new(settings: &SweepSettings) -> Self {
        Self {
            invoker: ToolInvoker::new(&settings.tool, settings.timeout),
            grammar: TranscriptGrammar::new(&settings.tool.banner, &settings.tool.prompt),
            verbosity: settings.verbosity,
        }
    }

    /// Run `script` and pull `specs` out of its transcript.
    ///
    /// A timeout yields `StageOutcome::TimedOut`; a transcript that does not
    /// have the expected shape is an error that ends the run.
    pub async fn run_stage(
        &self,
        instance: &str,
        script: &Script,
        specs: &[MetricSpec],
    ) -> Result<StageOutcome, SweepError> {
        tracing::trace!(instance, script = %script.render(), "tool script");

        let transcript = match self.invoker.run(script).await? {
            Invocation::TimedOut => {
                tracing::warn!(instance, "timed out");
                return Ok(StageOutcome::TimedOut);
            }
            Invocation::Completed {
                transcript,
                exit_code,
            } => {
                if exit_code != Some(0) {
                    tracing::debug!(instance, exit_code = ?exit_code, "tool exited abnormally");
                }
                transcript
            }
        };

        let parsed = self.grammar.parse(&transcript, script).map_err(|e| SweepError::Transcript {
            instance: instance.to_string(),
            source: e,
        })?;

        if self.verbosity >= 3 {
            for block in parsed.blocks() {
                let lines = block.lines();
                tracing::trace!(instance, command = block.echo(), ?lines, "command block");
            }
        }

        let metrics = extract_all(specs, script, &parsed).map_err(|e| SweepError::Extract {
            instance: instance.to_string(),
            source: e,
        })?;
        Ok(StageOutcome::Extracted(metrics))
    }
}
