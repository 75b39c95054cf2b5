//! Read layout detection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::filename::{mate_fastq, single_fastq};

/// Whether a run is single-ended or paired-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadLayout {
    Single,
    Paired,
}

impl ReadLayout {
    /// Derive the layout from the names of the downloaded files: a mate-1
    /// file means paired, anything else single.
    pub fn detect<S: AsRef<str>>(accession: &str, files: &[S]) -> Self {
        let mate1 = mate_fastq(accession, 1);
        if files.iter().any(|name| name.as_ref() == mate1) {
            ReadLayout::Paired
        } else {
            ReadLayout::Single
        }
    }

    /// Files holding this layout's reads, in the order the aligner takes them.
    pub fn read_files(&self, accession: &str) -> Vec<String> {
        match self {
            ReadLayout::Single => vec![single_fastq(accession)],
            ReadLayout::Paired => vec![mate_fastq(accession, 1), mate_fastq(accession, 2)],
        }
    }

    /// File whose read count stands for the whole run.
    pub fn primary_file(&self, accession: &str) -> String {
        match self {
            ReadLayout::Single => single_fastq(accession),
            ReadLayout::Paired => mate_fastq(accession, 1),
        }
    }
}

impl fmt::Display for ReadLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadLayout::Single => f.write_str("single"),
            ReadLayout::Paired => f.write_str("paired"),
        }
    }
}
