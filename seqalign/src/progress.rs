//! File-backed progress counters.
//!
//! The alignment stage pipes its records through the `count-lines` filter,
//! which periodically stores the running line count in `{job_id}.lines`.
//! Pollers read the same file through [`ProgressCounter::read`]. Every write
//! replaces the whole value through a rename, so a reader sees either the
//! previous value or the new one and never a torn write.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

/// Extension of progress counter files.
pub const COUNTER_EXTENSION: &str = "lines";

/// Progress counters stored as plain integer text files in one directory.
#[derive(Debug, Clone)]
pub struct ProgressCounter {
    dir: PathBuf,
}

impl ProgressCounter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Name of the counter file for a job, relative to the counter directory.
    pub fn file_name(job_id: &Uuid) -> String {
        format!("{job_id}.{COUNTER_EXTENSION}")
    }

    /// Path of the counter file for a job.
    pub fn path_for(&self, job_id: &Uuid) -> PathBuf {
        self.dir.join(Self::file_name(job_id))
    }

    /// Last value written for `job_id`, or 0 if nothing was written yet.
    pub async fn read(&self, job_id: &Uuid) -> u64 {
        read_value(&self.path_for(job_id)).await
    }

    /// Replace the value for `job_id`.
    pub async fn write(&self, job_id: &Uuid, value: u64) -> Result<()> {
        let path = self.path_for(job_id);
        let tmp = temp_path(&path);

        tokio::fs::write(&tmp, value.to_string())
            .await
            .map_err(|e| Error::io_path("writing progress counter", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::io_path("replacing progress counter", &path, e))?;
        Ok(())
    }

    /// Delete the counter file for `job_id`. A missing file is not an error.
    pub async fn remove(&self, job_id: &Uuid) -> Result<()> {
        let path = self.path_for(job_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io_path("removing progress counter", &path, e)),
        }
    }
}

/// Read a counter file, treating a missing or malformed file as zero.
pub async fn read_value(path: &Path) -> u64 {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents.trim().parse().unwrap_or_else(|_| {
            debug!(path = %path.display(), "Ignoring malformed progress counter");
            0
        }),
        Err(_) => 0,
    }
}

/// Blocking variant of [`ProgressCounter::write`] for the counting filter,
/// which runs outside any async runtime.
pub fn store_blocking(path: &Path, value: u64) -> std::io::Result<()> {
    let tmp = temp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        write!(file, "{value}")?;
    }
    std::fs::rename(&tmp, path)
}

/// Copy `input` to `output` line by line, storing the running line count in
/// `counter` every `every` lines and once more at end of input.
///
/// Returns the final count. Bytes are passed through untouched, including a
/// trailing line without a newline.
pub fn copy_counting<R, W>(
    mut input: R,
    mut output: W,
    counter: &Path,
    every: u64,
) -> std::io::Result<u64>
where
    R: BufRead,
    W: Write,
{
    let every = every.max(1);
    let mut buf = Vec::with_capacity(8 * 1024);
    let mut count: u64 = 0;

    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        output.write_all(&buf)?;
        count += 1;
        if count % every == 0 {
            store_blocking(counter, count)?;
        }
    }

    output.flush()?;
    store_blocking(counter, count)?;
    Ok(count)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
