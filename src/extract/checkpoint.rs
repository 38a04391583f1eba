//! Durable checkpoints of the merged document.

use crate::Result;
use crate::extract::merge_store::{MergeStore, OutputDocument};
use ohno::IntoAppError;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "checkpoint";

/// Writes the merged document to its well-known location, atomically.
#[derive(Debug, Clone)]
pub struct CheckpointWriter {
    path: PathBuf,
}

impl CheckpointWriter {
    /// The document lands at `<output_dir>/<repo_name>/<repo_name>_output.json`.
    pub fn new(output_dir: impl AsRef<Path>, repo_name: &str) -> Self {
        let path = output_dir
            .as_ref()
            .join(repo_name)
            .join(format!("{repo_name}_output.json"));

        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the previously persisted document, if there is one.
    ///
    /// A document that exists but cannot be parsed is a hard error: the run
    /// refuses to start rather than risk overwriting collected data.
    pub fn load(&self) -> Result<Option<OutputDocument>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).into_app_err_with(|| {
                    format!("unable to open output document '{}'", self.path.display())
                });
            }
        };

        let document = serde_json::from_reader(BufReader::new(file)).into_app_err_with(|| {
            format!(
                "output document '{}' is malformed, refusing to start so it is not overwritten",
                self.path.display()
            )
        })?;

        Ok(Some(document))
    }

    /// Write the full document. Goes through a temp file and a rename so an
    /// interrupted flush never corrupts the last good checkpoint.
    pub fn flush(&self, store: &MergeStore) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).into_app_err_with(|| {
                format!("unable to create output directory '{}'", parent.display())
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        {
            let file = File::create(&temp_path).into_app_err_with(|| {
                format!("unable to create checkpoint file '{}'", temp_path.display())
            })?;

            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, store.document()).into_app_err_with(|| {
                format!("unable to serialize output document to '{}'", temp_path.display())
            })?;

            writer.flush().into_app_err_with(|| {
                format!("unable to write checkpoint file '{}'", temp_path.display())
            })?;
        }

        fs::rename(&temp_path, &self.path).into_app_err_with(|| {
            format!("unable to move checkpoint into place at '{}'", self.path.display())
        })?;

        log::debug!(target: LOG_TARGET, "Wrote checkpoint to '{}'", self.path.display());
        Ok(())
    }
}
