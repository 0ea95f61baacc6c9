/// Component-wise symmetrization sweep over preprocessed circuits.
///
/// Every instance runs `symmetrize` six times: each profit strategy
/// (`const`, `bdd`, `aig`) under an unbounded and a bounded error regime.
/// Each run is its own tool invocation, so a timeout only blanks the
/// columns of that stage.
use crate::config::{self, ConfigError};
use crate::extract::{MetricKind, MetricSpec};
use crate::row::{ColumnSpec, ResultRow, RowSchema, StageOutcome};
use crate::script::Script;
use crate::sweep::{
    files_with_extension, BenchmarkInstance, Category, ErrorMetric, InstanceSource, Pipeline,
    SweepError, SweepSettings, SweepSummary,
};
use crate::table::{TableWriter, SEPARATOR};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// Error bound large enough that every component may be replaced.
    Unbounded,
    /// The user's threshold.
    Bounded,
}

/// How `symmetrize` scores replacing a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profit {
    Const,
    Bdd,
    Aig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub regime: Regime,
    pub profit: Profit,
}

impl Stage {
    /// `ub_const`, `b_aig`, ...
    pub fn name(self) -> String {
        let regime = match self.regime {
            Regime::Unbounded => "ub",
            Regime::Bounded => "b",
        };
        format!("{regime}_{}", self.profit.as_str())
    }

    /// Column-name prefix of the stage.
    pub fn prefix(self) -> String {
        format!("{}_", self.name())
    }
}

impl Profit {
    pub fn as_str(self) -> &'static str {
        match self {
            Profit::Const => "const",
            Profit::Bdd => "bdd",
            Profit::Aig => "aig",
        }
    }
}

pub const STAGES: [Stage; 6] = [
    Stage {
        regime: Regime::Unbounded,
        profit: Profit::Const,
    },
    Stage {
        regime: Regime::Unbounded,
        profit: Profit::Bdd,
    },
    Stage {
        regime: Regime::Unbounded,
        profit: Profit::Aig,
    },
    Stage {
        regime: Regime::Bounded,
        profit: Profit::Const,
    },
    Stage {
        regime: Regime::Bounded,
        profit: Profit::Bdd,
    },
    Stage {
        regime: Regime::Bounded,
        profit: Profit::Aig,
    },
];

// `symmetrize` output, echo excluded:
//   0 t_symm, 1 optimize command output, 2 t_aig, 3 t_bdd, 4 t_select,
//   5 "Symmetrization complete.", 6 AIG size, 7 BDD size, 8 Selection, 9 Total error
const METRICS: &[MetricSpec] = &[
    MetricSpec {
        name: "pi",
        instruction: "print_io",
        line: 0,
        kind: MetricKind::PrimaryInputs,
    },
    MetricSpec {
        name: "po",
        instruction: "print_io",
        line: 1,
        kind: MetricKind::PrimaryOutputs,
    },
    MetricSpec {
        name: "t_symm",
        instruction: "symmetrize",
        line: 0,
        kind: MetricKind::Seconds,
    },
    MetricSpec {
        name: "t_aig",
        instruction: "symmetrize",
        line: 2,
        kind: MetricKind::Seconds,
    },
    MetricSpec {
        name: "t_bdd",
        instruction: "symmetrize",
        line: 3,
        kind: MetricKind::Seconds,
    },
    MetricSpec {
        name: "t_select",
        instruction: "symmetrize",
        line: 4,
        kind: MetricKind::Seconds,
    },
    MetricSpec {
        name: "aig_size",
        instruction: "symmetrize",
        line: 6,
        kind: MetricKind::AigSize,
    },
    MetricSpec {
        name: "bdd_size",
        instruction: "symmetrize",
        line: 7,
        kind: MetricKind::BddSize,
    },
    MetricSpec {
        name: "selection",
        instruction: "symmetrize",
        line: 8,
        kind: MetricKind::Selection,
    },
    MetricSpec {
        name: "err",
        instruction: "symmetrize",
        line: 9,
        kind: MetricKind::TotalError,
    },
];

/// Per-instance columns, taken from the first stage only.
const INFO_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "pi",
        metric: "pi",
        group: 0,
    },
    ColumnSpec {
        name: "po",
        metric: "po",
        group: 0,
    },
    ColumnSpec {
        name: "n_bdd",
        metric: "bdd_size",
        group: 0,
    },
    ColumnSpec {
        name: "n_aig",
        metric: "aig_size",
        group: 0,
    },
    ColumnSpec {
        name: "t_symm",
        metric: "t_symm",
        group: 0,
    },
    ColumnSpec {
        name: "t_aig",
        metric: "t_aig",
        group: 0,
    },
    ColumnSpec {
        name: "t_bdd",
        metric: "t_bdd",
        group: 0,
    },
];

const STAGE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "t_select",
        metric: "t_select",
        group: 0,
    },
    ColumnSpec {
        name: "selection",
        metric: "selection",
        group: 0,
    },
    ColumnSpec {
        name: "n_bdd",
        metric: "bdd_size",
        group: 1,
    },
    ColumnSpec {
        name: "n_bdd_gain",
        metric: "bdd_size",
        group: 2,
    },
    ColumnSpec {
        name: "n_aig",
        metric: "aig_size",
        group: 1,
    },
    ColumnSpec {
        name: "n_aig_gain",
        metric: "aig_size",
        group: 2,
    },
    ColumnSpec {
        name: "err",
        metric: "err",
        group: 0,
    },
];

pub fn schema() -> RowSchema {
    let mut schema = RowSchema::new()
        .column("time")
        .column("name")
        .column("error_metric")
        .column("threshold")
        .stage("", INFO_COLUMNS);
    for stage in STAGES {
        schema = schema.stage(&stage.prefix(), STAGE_COLUMNS);
    }
    schema
}

/// Error metric and threshold of one symmetrization sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompwiseParams {
    pub category: Category,
    pub metric: ErrorMetric,
    /// Passed through to the tool untouched.
    pub threshold: String,
}

impl CompwiseParams {
    pub fn new(
        category: Category,
        metric: ErrorMetric,
        threshold: String,
    ) -> Result<CompwiseParams, ConfigError> {
        config::validate_threshold(&threshold)?;
        Ok(CompwiseParams {
            category,
            metric,
            threshold,
        })
    }
}

/// Every `.aig` under the category's preprocessed directory, in directory order.
/// The matching `.bdd` is required as well and checked again right before use.
pub fn plan(
    settings: &SweepSettings,
    category: Category,
) -> Result<Vec<BenchmarkInstance>, SweepError> {
    let files = files_with_extension(&settings.preprocessed_dir(category), "aig")?;
    Ok(files
        .into_iter()
        .map(|aig| {
            let name = aig
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let bdd = aig.with_extension("bdd");
            BenchmarkInstance {
                category,
                name,
                width: None,
                pairs: None,
                source: InstanceSource::Files {
                    paths: vec![aig, bdd],
                },
            }
        })
        .collect())
}

/// Table path: `<compwise>/<category>/<timestamp>_<category>_<metric>_<threshold>.csv`.
pub fn table_path(settings: &SweepSettings, params: &CompwiseParams, timestamp: &str) -> PathBuf {
    settings
        .paths
        .compwise_dir
        .join(params.category.as_str())
        .join(format!(
            "{timestamp}_{}_{}_{}.csv",
            params.category.as_str(),
            params.metric.as_str(),
            params.threshold
        ))
}

fn build_script(
    settings: &SweepSettings,
    aig: &Path,
    bdd: &Path,
    metric: ErrorMetric,
    bound: &str,
    profit: Profit,
) -> Script {
    let mut script = Script::new();
    script.push("setup", format!("source {}", settings.tool.rc_file));
    script.push("read", format!("read {}", aig.display()));
    script.push("gbdd_load", format!("gbdd_load {}", bdd.display()));
    script.push("print_io", "print_io");
    script.push(
        "symmetrize",
        format!(
            "symmetrize {} {bound} {} \"{}\"",
            metric.as_str(),
            profit.as_str(),
            settings.optimize_command
        ),
    );
    script
}

/// Symmetrize `instances` in order and stream one row per instance into `table`.
pub async fn run(
    settings: &SweepSettings,
    params: &CompwiseParams,
    instances: &[BenchmarkInstance],
    table: &Path,
) -> Result<SweepSummary, SweepError> {
    let schema = schema();
    let mut table = TableWriter::create(table, &schema)?;
    let pipeline = Pipeline::new(settings);

    let mut timed_out_stages = 0;
    let mut skipped = 0;

    for instance in instances {
        let missing = instance.missing_inputs();
        let inputs = match &instance.source {
            InstanceSource::Files { paths } if missing.is_empty() => {
                paths.first().zip(paths.get(1))
            }
            _ => None,
        };
        let Some((aig, bdd)) = inputs else {
            tracing::warn!(instance = %instance.name, ?missing, "inputs unavailable, skipping");
            skipped += 1;
            continue;
        };

        let started = chrono::Local::now().format("%H:%M:%S %d.%m.%Y").to_string();
        tracing::info!(instance = %instance.name, "symmetrizing");

        let mut row = ResultRow::new();
        row.push(started)
            .push(instance.name.clone())
            .push(params.metric.as_str())
            .push(params.threshold.clone());

        for (i, stage) in STAGES.iter().enumerate() {
            let bound = match stage.regime {
                Regime::Unbounded => settings.unbounded_error_bound.as_str(),
                Regime::Bounded => params.threshold.as_str(),
            };
            let script = build_script(settings, aig, bdd, params.metric, bound, stage.profit);
            let label = format!("{} {}", instance.name, stage.name());
            let outcome = pipeline.run_stage(&label, &script, METRICS).await?;
            if outcome == StageOutcome::TimedOut {
                timed_out_stages += 1;
            }

            let extract_err = |e| SweepError::Extract {
                instance: label.clone(),
                source: e,
            };
            if i == 0 {
                row.push_stage(&outcome, INFO_COLUMNS)
                    .map_err(extract_err)?;
            }
            row.push_stage(&outcome, STAGE_COLUMNS)
                .map_err(extract_err)?;
        }

        let row = row.finish(&schema).map_err(|e| SweepError::Row {
            instance: instance.name.clone(),
            source: e,
        })?;
        tracing::debug!(row = %row.values().join(SEPARATOR), "row written");
        table.append(&row)?;
    }

    Ok(SweepSummary {
        table: table.path().to_path_buf(),
        rows: table.rows(),
        timed_out_stages,
        skipped,
    })
}
