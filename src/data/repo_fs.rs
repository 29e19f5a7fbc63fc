//! Filesystem-backed ratings files (comma separated, header row first).

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::common::error::{ClientError, ClientResult};

use super::domain::{DataRepo, Dataset, RawTable, REQUIRED_COLUMNS};

/// Repository rooted at a directory; names are paths relative to it.
pub struct FsDataRepo {
    root: PathBuf,
}

impl FsDataRepo {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// Read a CSV file into an unvalidated table.
pub fn read_csv(path: &Path) -> ClientResult<RawTable> {
    let file = File::open(path)
        .map_err(|err| ClientError::io(format!("cannot open {}: {err}", path.display())))?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(ClientError::schema(format!("{} is empty", path.display()))),
    };
    let mut table = RawTable::new(split_line(&header));

    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        table.rows.push(split_line(&line));
    }

    debug!(path = %path.display(), rows = table.rows.len(), "read ratings file");
    Ok(table)
}

/// Split on bare commas. Quotes wrapping a whole cell are removed; quoted
/// cells containing commas are not supported.
fn split_line(line: &str) -> Vec<String> {
    line.trim_end_matches('\r')
        .split(',')
        .map(|cell| {
            let cell = cell.trim();
            cell.strip_prefix('"')
                .and_then(|c| c.strip_suffix('"'))
                .unwrap_or(cell)
                .to_string()
        })
        .collect()
}

impl DataRepo for FsDataRepo {
    fn load_table(&self, name: &str) -> ClientResult<RawTable> {
        read_csv(&self.path(name))
    }

    fn save_dataset(&self, name: &str, dataset: &Dataset) -> ClientResult<()> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "{}", REQUIRED_COLUMNS.join(","))?;
        for r in dataset.records() {
            writeln!(out, "{},{},{}", r.user, r.item, r.rating)?;
        }
        out.flush()?;
        Ok(())
    }
}
