//! Batched artifact upload.
//!
//! Files go up in consecutive batches. Every file in a batch gets its own
//! scoped thread and the whole batch is joined before the next one starts, so
//! at most `batch_size` writes are ever in flight. The first failing batch
//! aborts the upload; files written before it stay on the remote store.

use serde::Serialize;
use std::path::Path;
use std::thread;

use crate::error::{Error, Result};
use crate::local_files::{self, FileSystem};
use crate::remote::RemoteStore;

pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Whether a listing entry is uploaded. Names without an extension separator
/// are treated as directories.
pub fn is_uploadable(name: &str) -> bool {
    name.contains('.')
}

/// Names from `files` that pass [`is_uploadable`], in order.
pub fn uploadable(files: &[String]) -> Vec<String> {
    files.iter().filter(|f| is_uploadable(f)).cloned().collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
    pub batches: usize,
}

impl UploadReport {
    pub fn merge(&mut self, other: UploadReport) {
        self.uploaded.extend(other.uploaded);
        self.excluded.extend(other.excluded);
        self.batches += other.batches;
    }
}

pub struct BatchUploader<'a> {
    store: &'a dyn RemoteStore,
    batch_size: usize,
}

impl<'a> BatchUploader<'a> {
    pub fn new(store: &'a dyn RemoteStore, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::validation_invalid_argument(
                "batchSize",
                "Batch size must be at least 1",
                None,
                None,
            ));
        }
        Ok(Self { store, batch_size })
    }

    /// Upload `files` (names relative to `src`) to the remote directory `dest`.
    pub fn upload(&self, src: &Path, dest: &str, files: &[String]) -> Result<UploadReport> {
        let (selected, excluded): (Vec<&String>, Vec<&String>) =
            files.iter().partition(|f| is_uploadable(f));

        let mut report = UploadReport {
            excluded: excluded.into_iter().cloned().collect(),
            ..UploadReport::default()
        };

        let total_batches = selected.len().div_ceil(self.batch_size);
        for (index, batch) in selected.chunks(self.batch_size).enumerate() {
            crate::log_status!(
                "upload",
                "Batch {}/{} to {} ({} file(s))",
                index + 1,
                total_batches,
                dest,
                batch.len()
            );

            let results = self.run_batch(src, dest, batch);
            report.batches += 1;

            let mut failures = Vec::new();
            for (name, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => report.uploaded.push((*name).clone()),
                    Err(err) => failures.push(((*name).clone(), err)),
                }
            }

            if let Some((_, first)) = failures.first() {
                let names: Vec<&str> = failures.iter().map(|(n, _)| n.as_str()).collect();
                return Err(first.clone().with_hint(format!(
                    "Batch {} of {} failed ({}); {} file(s) were already written to {} and were not removed. Re-run the deploy to publish a fresh version.",
                    index + 1,
                    total_batches,
                    names.join(", "),
                    report.uploaded.len(),
                    dest
                )));
            }
        }

        Ok(report)
    }

    /// Write one batch concurrently and wait for all of it.
    fn run_batch(&self, src: &Path, dest: &str, batch: &[&String]) -> Vec<Result<()>> {
        let store = self.store;
        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|name| {
                    let local = src.join(name.as_str());
                    let remote = remote_path(dest, name);
                    scope.spawn(move || {
                        let bytes = local_files::local().read(&local)?;
                        store.write_file(&remote, &bytes)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(Error::internal_unexpected("upload thread panicked")))
                })
                .collect()
        })
    }
}

fn remote_path(dest: &str, name: &str) -> String {
    format!("{}/{}", dest.trim_end_matches('/'), name)
}
