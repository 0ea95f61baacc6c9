/// Output table: a semicolon-separated file owned by one writer for the
/// whole run.
///
/// The header goes out on creation; every appended row is flushed and
/// synced before `append` returns, so a killed run leaves all completed
/// rows on disk. The file stays exclusively locked until the writer drops.
use crate::row::{ResultRow, RowSchema};
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SEPARATOR: &str = ";";

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to write table {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("table {} is locked by another run", path.display())]
    Locked { path: PathBuf },
    #[error("row for table {} has {found} fields, header has {expected}", path.display())]
    Width {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug)]
pub struct TableWriter {
    path: PathBuf,
    file: File,
    columns: usize,
    rows: usize,
}

impl TableWriter {
    /// Create (or truncate) the table at `path`, creating parent directories,
    /// and write the header line.
    pub fn create(path: &Path, schema: &RowSchema) -> Result<TableWriter, TableError> {
        let io_err = |source| TableError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;
        file.try_lock_exclusive().map_err(|_| TableError::Locked {
            path: path.to_path_buf(),
        })?;
        // Truncate only once the lock is ours.
        file.set_len(0).map_err(io_err)?;

        let mut writer = TableWriter {
            path: path.to_path_buf(),
            file,
            columns: schema.len(),
            rows: 0,
        };
        writer.write_line(&schema.columns().join(SEPARATOR))?;
        tracing::debug!(path = %path.display(), columns = writer.columns, "table created");
        Ok(writer)
    }

    /// Append one row and make it durable.
    pub fn append(&mut self, row: &ResultRow) -> Result<(), TableError> {
        if row.values().len() != self.columns {
            return Err(TableError::Width {
                path: self.path.clone(),
                expected: self.columns,
                found: row.values().len(),
            });
        }
        self.write_line(&row.values().join(SEPARATOR))?;
        self.rows += 1;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<(), TableError> {
        let io_err = |source| TableError::Io {
            path: self.path.clone(),
            source,
        };
        writeln!(self.file, "{line}").map_err(io_err)?;
        self.file.flush().map_err(io_err)?;
        self.file.sync_data().map_err(io_err)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far (header excluded).
    pub fn rows(&self) -> usize {
        self.rows
    }
}

impl Drop for TableWriter {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), error = %e, "failed to unlock table");
        }
    }
}
