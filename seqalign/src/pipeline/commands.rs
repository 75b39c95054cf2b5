//! Command templates for each pipeline stage.
//!
//! Commands run inside the work directory and refer to job files by their
//! bare names, so every argument is relative to it.

use std::path::{Path, PathBuf};

use process_utils::shell_quote;
use serde::{Deserialize, Serialize};

use super::layout::ReadLayout;
use crate::runner::CommandSpec;

/// Command labels, also used by fakes in tests to recognise stages.
pub mod labels {
    pub const FETCH: &str = "fetch";
    pub const COUNT_READS: &str = "count-reads";
    pub const DOWNSAMPLE: &str = "downsample";
    pub const NPROC: &str = "nproc";
    pub const ALIGN: &str = "align";
    pub const SORT: &str = "sort";
    pub const INDEX: &str = "index";
}

/// External tools used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Downloader, invoked as `<fetcher> -a <accession>`.
    #[serde(default = "default_fetcher")]
    pub fetcher: String,
    /// Aligner producing SAM on stdout.
    #[serde(default = "default_aligner")]
    pub aligner: String,
    /// samtools binary for view, sort and index.
    #[serde(default = "default_samtools")]
    pub samtools: String,
    /// Seeded read sampler.
    #[serde(default = "default_sampler")]
    pub sampler: String,
    /// Line counting filter feeding the progress counter.
    #[serde(default = "default_counter")]
    pub counter: String,
    /// Reference genome; relative paths resolve against the work directory.
    #[serde(default = "default_reference")]
    pub reference: PathBuf,
}

fn default_fetcher() -> String {
    "fastq-dl".to_string()
}

fn default_aligner() -> String {
    "minimap2".to_string()
}

fn default_samtools() -> String {
    "samtools".to_string()
}

fn default_sampler() -> String {
    "seqtk".to_string()
}

fn default_counter() -> String {
    "count-lines".to_string()
}

fn default_reference() -> PathBuf {
    PathBuf::from("./ref.fa")
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            fetcher: default_fetcher(),
            aligner: default_aligner(),
            samtools: default_samtools(),
            sampler: default_sampler(),
            counter: default_counter(),
            reference: default_reference(),
        }
    }
}

/// Builds [`CommandSpec`]s for one work directory.
#[derive(Debug, Clone)]
pub struct CommandBuilder<'a> {
    tools: &'a ToolConfig,
    work_dir: &'a Path,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(tools: &'a ToolConfig, work_dir: &'a Path) -> Self {
        Self { tools, work_dir }
    }

    /// Download the reads of `accession`.
    pub fn fetch(&self, accession: &str) -> CommandSpec {
        CommandSpec::program(labels::FETCH, &self.tools.fetcher, ["-a", accession])
            .in_dir(self.work_dir)
    }

    /// Print the number of reads (four FASTQ lines each) in a gzipped file.
    pub fn count_reads(&self, file: &str) -> CommandSpec {
        let script = format!(
            "zcat {} | awk 'END {{ print int(NR / 4) }}'",
            shell_quote(file)
        );
        CommandSpec::shell(labels::COUNT_READS, script)
            .in_dir(self.work_dir)
            .capture_stdout()
    }

    /// Sample `file` with probability `fraction` into `output`, recompressed.
    pub fn downsample(&self, file: &str, output: &str, fraction: f64, seed: u64) -> CommandSpec {
        let script = format!(
            "{} sample -s{seed} {} {fraction} | gzip -c > {}",
            shell_quote(&self.tools.sampler),
            shell_quote(file),
            shell_quote(output)
        );
        CommandSpec::shell(labels::DOWNSAMPLE, script).in_dir(self.work_dir)
    }

    /// Print the number of available processors.
    pub fn nproc(&self) -> CommandSpec {
        CommandSpec::program(labels::NPROC, "nproc", Vec::<String>::new())
            .in_dir(self.work_dir)
            .capture_stdout()
    }

    /// Align reads, counting SAM lines into `counter_file`, and write BAM to `output`.
    pub fn align(
        &self,
        layout: ReadLayout,
        accession: &str,
        threads: usize,
        counter_file: &str,
        output: &str,
    ) -> CommandSpec {
        let reads = layout
            .read_files(accession)
            .iter()
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");
        let script = format!(
            "{aligner} -a -t {threads} {reference} {reads} | {counter} {counter_file} | {samtools} view -bS - > {output}",
            aligner = shell_quote(&self.tools.aligner),
            reference = shell_quote(self.tools.reference.to_string_lossy()),
            counter = shell_quote(&self.tools.counter),
            counter_file = shell_quote(counter_file),
            samtools = shell_quote(&self.tools.samtools),
            output = shell_quote(output),
        );
        CommandSpec::shell(labels::ALIGN, script).in_dir(self.work_dir)
    }

    /// Coordinate-sort `input` into `output`.
    pub fn sort(&self, input: &str, output: &str) -> CommandSpec {
        CommandSpec::program(
            labels::SORT,
            &self.tools.samtools,
            ["sort", "-o", output, input],
        )
        .in_dir(self.work_dir)
    }

    /// Build the index next to a sorted BAM.
    pub fn index(&self, input: &str) -> CommandSpec {
        CommandSpec::program(labels::INDEX, &self.tools.samtools, ["index", input])
            .in_dir(self.work_dir)
    }
}
