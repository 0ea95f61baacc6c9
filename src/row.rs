/// Result rows: fixed column schemas, stage-wise column groups, and the
/// placeholder substitution for timed-out stages.
use crate::extract::{ExtractError, Metrics};

/// Token written into every column of a stage whose invocation timed out.
pub const PLACEHOLDER: &str = "-";

/// A table column filled from one capture group of one extracted metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub metric: &'static str,
    pub group: usize,
}

/// How one stage of an instance ended, as far as its row is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Extracted(Metrics),
    TimedOut,
}

/// Ordered column names of one output table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSchema {
    columns: Vec<String>,
}

impl RowSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(name.into());
        self
    }

    /// Add one column per `ColumnSpec`, each name prefixed with `prefix`.
    pub fn stage(mut self, prefix: &str, specs: &[ColumnSpec]) -> Self {
        self.columns
            .extend(specs.iter().map(|spec| format!("{prefix}{}", spec.name)));
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row has {found} values, schema declares {expected} columns")]
pub struct RowWidthError {
    pub expected: usize,
    pub found: usize,
}

/// One table row, built left to right.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRow {
    values: Vec<String>,
}

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: impl Into<String>) -> &mut Self {
        self.values.push(value.into());
        self
    }

    pub fn push_placeholders(&mut self, count: usize) -> &mut Self {
        self.values
            .extend(std::iter::repeat(PLACEHOLDER.to_string()).take(count));
        self
    }

    /// Append the columns of one stage: extracted values on success, one
    /// placeholder per column on timeout.
    pub fn push_stage(
        &mut self,
        outcome: &StageOutcome,
        specs: &[ColumnSpec],
    ) -> Result<&mut Self, ExtractError> {
        match outcome {
            StageOutcome::Extracted(metrics) => {
                for spec in specs {
                    let value = metrics.get(spec.metric, spec.group)?;
                    self.values.push(value.to_string());
                }
            }
            StageOutcome::TimedOut => {
                self.push_placeholders(specs.len());
            }
        }
        Ok(self)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Check the row against its schema before it goes to the table.
    pub fn finish(self, schema: &RowSchema) -> Result<ResultRow, RowWidthError> {
        if self.values.len() != schema.len() {
            return Err(RowWidthError {
                expected: schema.len(),
                found: self.values.len(),
            });
        }
        Ok(self)
    }
}
