//! File naming conventions keyed by accession.
//!
//! Jobs share one working directory and are isolated only by these names:
//!
//! | file                          | produced by |
//! |-------------------------------|-------------|
//! | `{acc}.fastq.gz`              | fetch (single layout) |
//! | `{acc}_1.fastq.gz`, `_2`, ... | fetch (paired layout) |
//! | `{acc}.bam`                   | align |
//! | `{acc}.sorted.bam`            | sort |
//! | `{acc}.sorted.bam.bai`        | index |

use std::sync::LazyLock;

use regex::Regex;

use crate::{Error, Result};

/// Suffix of downloaded read files.
pub const FASTQ_SUFFIX: &str = ".fastq.gz";

static ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}$").unwrap());

/// Check that an accession is usable as a filename key.
///
/// Accessions end up in file names and shell pipelines, so only ASCII
/// letters, digits, `_`, `.` and `-` are accepted, starting with a letter or
/// digit.
pub fn validate_accession(accession: &str) -> Result<()> {
    if ACCESSION_RE.is_match(accession) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "invalid accession {accession:?}: expected letters, digits, '_', '.' or '-'"
        )))
    }
}

/// Single-end read file name.
pub fn single_fastq(accession: &str) -> String {
    format!("{accession}{FASTQ_SUFFIX}")
}

/// Read file name for mate `mate` of a paired run.
pub fn mate_fastq(accession: &str, mate: u8) -> String {
    format!("{accession}_{mate}{FASTQ_SUFFIX}")
}

/// Whether `name` is a read file downloaded for `accession`.
///
/// Matches `{acc}.fastq.gz` and `{acc}_<digits>.fastq.gz` only, so a
/// different accession sharing the prefix (`SRR1` vs `SRR12`) never matches.
pub fn is_fastq_for(name: &str, accession: &str) -> bool {
    let Some(rest) = name.strip_prefix(accession) else {
        return false;
    };
    let Some(stem) = rest.strip_suffix(FASTQ_SUFFIX) else {
        return false;
    };
    match stem.strip_prefix('_') {
        Some(mate) => !mate.is_empty() && mate.bytes().all(|b| b.is_ascii_digit()),
        None => stem.is_empty(),
    }
}

/// Unsorted alignment file name.
pub fn bam(accession: &str) -> String {
    format!("{accession}.bam")
}

/// Sorted alignment file name.
pub fn sorted_bam(accession: &str) -> String {
    format!("{accession}.sorted.bam")
}

/// Whether `name` is the sorted alignment of `accession` or one of its
/// companion files (index).
pub fn is_sorted_artifact_for(name: &str, accession: &str) -> bool {
    let sorted = sorted_bam(accession);
    match name.strip_prefix(sorted.as_str()) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}
