//! Per-run resources: the scratch directory and the chunk size.
//!
//! Scratch lives in a `TempDir` owned by the context, so it is removed when
//! the context drops, whether the run succeeded or failed.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::ReconError;

pub struct RunContext {
    scratch: TempDir,
    chunk_size: usize,
    staged: Vec<String>,
}

impl RunContext {
    pub fn new(chunk_size: usize) -> Result<Self, ReconError> {
        let scratch = tempfile::Builder::new()
            .prefix("geodiff-")
            .tempdir()
            .map_err(|e| ReconError::io("scratch", e))?;
        log::debug!("scratch directory {}", scratch.path().display());
        Ok(Self { scratch, chunk_size: chunk_size.max(1), staged: Vec::new() })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Staged file names, in staging order.
    pub fn staged(&self) -> &[String] {
        &self.staged
    }

    /// Create (or truncate) a file in scratch and remember it for `persist`.
    pub fn stage(&mut self, name: &str) -> Result<BufWriter<File>, ReconError> {
        let path = self.scratch.path().join(name);
        let file = File::create(&path).map_err(|e| ReconError::io("stage", format!("{}: {e}", path.display())))?;
        if !self.staged.iter().any(|n| n == name) {
            self.staged.push(name.to_string());
        }
        Ok(BufWriter::new(file))
    }

    /// Copy every staged file into `out_dir`, creating it if needed.
    pub fn persist(&self, out_dir: &Path) -> Result<Vec<PathBuf>, ReconError> {
        std::fs::create_dir_all(out_dir)
            .map_err(|e| ReconError::io("persist", format!("{}: {e}", out_dir.display())))?;
        let mut written = Vec::with_capacity(self.staged.len());
        for name in &self.staged {
            let from = self.scratch.path().join(name);
            let to = out_dir.join(name);
            std::fs::copy(&from, &to).map_err(|e| ReconError::io("persist", format!("{}: {e}", to.display())))?;
            written.push(to);
        }
        log::info!("persisted {} file(s) to {}", written.len(), out_dir.display());
        Ok(written)
    }
}
