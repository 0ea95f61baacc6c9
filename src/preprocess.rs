/// Preprocessing sweep: build or read each benchmark circuit, optimize it,
/// build its global BDDs, and store both next to a `log.csv` of timings and
/// sizes.
use crate::extract::{MetricKind, MetricSpec};
use crate::row::{ColumnSpec, ResultRow, RowSchema, StageOutcome};
use crate::script::Script;
use crate::sweep::{
    files_with_extension, BenchmarkInstance, Category, InstanceSource, Pipeline, SweepError,
    SweepSettings, SweepSummary, WidthOverrides,
};
use crate::table::{TableWriter, SEPARATOR};
use std::path::Path;

const METRICS: &[MetricSpec] = &[
    MetricSpec {
        name: "t_opt",
        instruction: "time_opt",
        line: 0,
        kind: MetricKind::Elapsed,
    },
    MetricSpec {
        name: "n_bdd",
        instruction: "gbdd_build",
        line: 1,
        kind: MetricKind::NodeCount,
    },
    MetricSpec {
        name: "t_gbdd",
        instruction: "time_gbdd",
        line: 0,
        kind: MetricKind::Elapsed,
    },
    MetricSpec {
        name: "n_aig",
        instruction: "print_stats",
        line: 0,
        kind: MetricKind::AndCount,
    },
];

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "t_opt",
        metric: "t_opt",
        group: 0,
    },
    ColumnSpec {
        name: "n_aig",
        metric: "n_aig",
        group: 0,
    },
    ColumnSpec {
        name: "t_gbdd",
        metric: "t_gbdd",
        group: 0,
    },
    ColumnSpec {
        name: "n_bdd",
        metric: "n_bdd",
        group: 0,
    },
];

pub const LOG_FILE: &str = "log.csv";

/// Pair-count range of the `mac` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairRange {
    pub start: u32,
    pub end: u32,
}

impl Default for PairRange {
    fn default() -> Self {
        Self { start: 2, end: 5 }
    }
}

pub fn schema() -> RowSchema {
    RowSchema::new().column("name").stage("", COLUMNS)
}

/// Enumerate the instances of `category` in sweep order.
///
/// Generated families walk their bit-width range (for `mac`, once per pair
/// count); `networks` lists the `.pla` files of the networks directory.
pub fn plan(
    settings: &SweepSettings,
    category: Category,
    widths: &WidthOverrides,
    pairs: PairRange,
) -> Result<Vec<BenchmarkInstance>, SweepError> {
    let Some(range) = category.default_widths() else {
        return network_instances(&settings.paths.networks_dir);
    };
    let range = range.with_overrides(widths)?;

    let generated = |name: String, width: u32, instruction: String| BenchmarkInstance {
        category,
        name,
        width: Some(width),
        pairs: None,
        source: InstanceSource::Generated { instruction },
    };

    let mut instances = Vec::new();
    match category {
        Category::Mac => {
            for p in pairs.start..=pairs.end {
                for n in range.widths() {
                    let instruction = format!("netgen mac {n} {p}");
                    instances.push(BenchmarkInstance {
                        pairs: Some(p),
                        ..generated(format!("mac{p}x{n}"), n, instruction)
                    });
                }
            }
        }
        _ => {
            for n in range.widths() {
                let instruction = match category {
                    Category::Add => format!("netgen adder {n}"),
                    Category::Mult => format!("netgen multiplier {n}"),
                    _ => format!("netgen asymmetric {n} 1"),
                };
                let name = format!("{}{n}", category.as_str());
                instances.push(generated(name, n, instruction));
            }
        }
    }
    Ok(instances)
}

fn network_instances(networks_dir: &Path) -> Result<Vec<BenchmarkInstance>, SweepError> {
    let files = files_with_extension(networks_dir, "pla")?;
    Ok(files
        .into_iter()
        .map(|path| {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let name = file_name.split('.').next().unwrap_or_default().to_string();
            BenchmarkInstance {
                category: Category::Networks,
                name,
                width: None,
                pairs: None,
                source: InstanceSource::Files { paths: vec![path] },
            }
        })
        .collect())
}

/// Tool script for one instance; outputs land at `out_base` + `.aig`/`.bdd`.
fn build_script(settings: &SweepSettings, instance: &BenchmarkInstance, out_base: &Path) -> Script {
    let load = match &instance.source {
        InstanceSource::Generated { instruction } => instruction.clone(),
        InstanceSource::Files { paths } => paths
            .first()
            .map(|p| format!("read {}", p.display()))
            .unwrap_or_default(),
    };

    let mut script = Script::new();
    script.push("setup", format!("source {}", settings.tool.rc_file));
    script.push("load", load);
    script.push("time_start", "time");
    script.push("optimize", settings.optimize_command.clone());
    script.push("time_opt", "time");
    script.push("gbdd_build", "gbdd_build 1");
    script.push("time_gbdd", "time");
    script.push("print_stats", "print_stats");
    script.push("write_aig", format!("write {}.aig", out_base.display()));
    script.push(
        "store_bdd",
        format!("gbdd_store {}.bdd", out_base.display()),
    );
    script
}

/// Preprocess `instances` in order, appending one `log.csv` row per instance.
///
/// A timed-out instance gets a placeholder row and the sweep moves on to
/// the next one. A malformed transcript ends the sweep with an error; rows
/// already written stay on disk.
pub async fn run(
    settings: &SweepSettings,
    category: Category,
    instances: &[BenchmarkInstance],
) -> Result<SweepSummary, SweepError> {
    let out_dir = settings.preprocessed_dir(category);
    let schema = schema();
    let mut table = TableWriter::create(&out_dir.join(LOG_FILE), &schema)?;
    let pipeline = Pipeline::new(settings);

    let mut timed_out_stages = 0;
    let mut skipped = 0;

    for instance in instances {
        let missing = instance.missing_inputs();
        if !missing.is_empty() {
            tracing::warn!(instance = %instance.name, ?missing, "input vanished, skipping");
            skipped += 1;
            continue;
        }

        tracing::info!(instance = %instance.name, "preprocessing");
        let script = build_script(settings, instance, &out_dir.join(&instance.name));
        let outcome = pipeline.run_stage(&instance.name, &script, METRICS).await?;
        if outcome == StageOutcome::TimedOut {
            timed_out_stages += 1;
        }

        let mut row = ResultRow::new();
        row.push(instance.name.clone());
        row.push_stage(&outcome, COLUMNS)
            .map_err(|e| SweepError::Extract {
                instance: instance.name.clone(),
                source: e,
            })?;
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
