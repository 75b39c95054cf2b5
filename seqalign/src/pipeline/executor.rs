//! Pipeline executor.
//!
//! Runs the stages of one job strictly in order. External commands go through
//! the [`CommandRunner`]; every stage appends human-readable lines to the job
//! log. A failed stage is logged and skipped unless its [`FailurePolicy`] is
//! [`FailurePolicy::Abort`]. Unparseable output of a successful count command
//! always fails the job; a failed read count only skips downsampling.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, instrument};

use super::commands::CommandBuilder;
use super::layout::ReadLayout;
use super::stage::{FailurePolicy, Stage};
use super::PipelineConfig;
use crate::downsample::DownsampleDecision;
use crate::job::{JobHandle, JobStatus};
use crate::progress::ProgressCounter;
use crate::retention::RetentionSweeper;
use crate::runner::{CommandOutcome, CommandRunner, CommandSpec};
use crate::utils::filename::{bam, is_fastq_for, is_sorted_artifact_for, sorted_bam};
use crate::utils::fs::{ensure_dir_all, io_error, list_files, move_file, remove_if_exists};
use crate::{Error, Result};

/// Executes the alignment pipeline for submitted jobs.
pub struct PipelineExecutor {
    config: PipelineConfig,
    runner: Arc<dyn CommandRunner>,
    progress: ProgressCounter,
    sweeper: Arc<RetentionSweeper>,
}

impl PipelineExecutor {
    /// Progress counters live in the work directory, next to the files the
    /// alignment command writes.
    pub fn new(
        config: PipelineConfig,
        runner: Arc<dyn CommandRunner>,
        sweeper: Arc<RetentionSweeper>,
    ) -> Self {
        let progress = ProgressCounter::new(&config.work_dir);
        Self {
            config,
            runner,
            progress,
            sweeper,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn progress(&self) -> &ProgressCounter {
        &self.progress
    }

    pub fn sweeper(&self) -> &Arc<RetentionSweeper> {
        &self.sweeper
    }

    fn work_dir(&self) -> &Path {
        &self.config.work_dir
    }

    /// Run the whole pipeline and record the terminal status on `job`.
    #[instrument(skip(self, job), fields(job_id = %job.id(), accession = %job.accession()))]
    pub async fn run(&self, job: Arc<JobHandle>) {
        match self.execute(&job).await {
            Ok(()) => {
                job.finish(JobStatus::Complete);
            }
            Err(e) => {
                job.error(format!("Job failed: {e}"));
                job.finish(JobStatus::Failed);
            }
        }
    }

    async fn execute(&self, job: &JobHandle) -> Result<()> {
        let accession = job.accession().to_string();
        let commands = CommandBuilder::new(&self.config.tools, self.work_dir());

        job.info(format!("Processing accession {accession}"));

        // Fetch
        self.run_stage(job, Stage::Fetch, &commands.fetch(&accession))
            .await?;
        let files = self.downloaded_files(&accession).await?;
        job.info(format!("Downloaded {} files for {accession}", files.len()));
        job.info(format!("Files: {}", files.join(", ")));
        let layout = ReadLayout::detect(&accession, &files);

        // Inspect
        let primary = layout.primary_file(&accession);
        let outcome = self
            .run_stage(job, Stage::Inspect, &commands.count_reads(&primary))
            .await?;
        let reads = if outcome.is_success() {
            let reads: u64 = parse_output(&outcome, "read count")?;
            job.info(format!("Found {reads} reads in {primary}"));
            Some(reads)
        } else {
            job.warn(format!(
                "Read count unavailable for {primary}; skipping downsampling"
            ));
            None
        };

        // Downsample
        if let Some(reads) = reads
            && let DownsampleDecision::Sample { fraction } = self.config.downsample.decide(reads)
        {
            job.info(format!(
                "Downsampling {accession} from {reads} to {} reads (fraction {fraction})",
                self.config.downsample.max_reads
            ));
            for file in layout.read_files(&accession) {
                self.downsample_file(job, &commands, &file, fraction)
                    .await?;
            }
        }
        job.info(format!("Type: {layout}"));

        // Probe
        let outcome = self
            .run_stage(job, Stage::Probe, &commands.nproc())
            .await?;
        let cores: NonZeroUsize = parse_output(&outcome, "processor count")?;
        job.info(format!("Found {cores} cores"));

        // Align
        let counter_file = ProgressCounter::file_name(&job.id());
        let unsorted = bam(&accession);
        let align = commands.align(layout, &accession, cores.get(), &counter_file, &unsorted);
        if self.run_stage(job, Stage::Align, &align).await?.is_success() {
            job.info(format!("Aligned {accession} to reference genome"));
        }

        // Sort
        let sorted = sorted_bam(&accession);
        let sort = commands.sort(&unsorted, &sorted);
        if self.run_stage(job, Stage::Sort, &sort).await?.is_success() {
            job.info(format!("Sorted BAM file for {accession}"));
        }

        // Index
        let index = commands.index(&sorted);
        if self.run_stage(job, Stage::Index, &index).await?.is_success() {
            job.info(format!("Indexed BAM file for {accession}"));
        }

        // Publish
        let published = self.publish(job, &accession).await;
        self.tolerate(job, Stage::Publish, published)?;

        // Cleanup
        let cleaned = self.cleanup(job, &accession).await;
        self.tolerate(job, Stage::Cleanup, cleaned)?;
        job.info(format!("Finished processing {accession}"));

        Ok(())
    }

    /// Run one stage command and apply the stage's failure policy.
    ///
    /// Under [`FailurePolicy::Continue`] a failed or unstartable command is
    /// logged and its outcome returned; the caller checks
    /// [`CommandOutcome::is_success`] before reporting success.
    async fn run_stage(
        &self,
        job: &JobHandle,
        stage: Stage,
        spec: &CommandSpec,
    ) -> Result<CommandOutcome> {
        debug!(
            job_id = %job.id(),
            stage = %stage,
            command = %spec.command_line(),
            "Running stage"
        );

        let outcome = match self.runner.run(spec).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.tolerate(job, stage, Err(e))?;
                return Ok(CommandOutcome::default());
            }
        };

        if !outcome.is_success() {
            let failed = Err(Error::StageFailed {
                stage: stage.to_string(),
                exit_code: outcome.exit_code,
            });
            self.tolerate(job, stage, failed)?;
        }

        Ok(outcome)
    }

    /// Apply `stage`'s failure policy to `result`.
    fn tolerate(&self, job: &JobHandle, stage: Stage, result: Result<()>) -> Result<()> {
        let Err(e) = result else {
            return Ok(());
        };

        match self.config.policy_for(stage) {
            FailurePolicy::Continue => {
                job.warn(format!("{e}; continuing"));
                Ok(())
            }
            FailurePolicy::Abort => Err(e),
        }
    }

    /// Names of the read files downloaded for `accession`, sorted.
    async fn downloaded_files(&self, accession: &str) -> Result<Vec<String>> {
        let paths = list_files(self.work_dir(), |name| is_fastq_for(name, accession)).await?;
        Ok(paths
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }

    /// Sample `file` into a temporary sibling and replace the original with it.
    ///
    /// The original is left untouched unless the sampler succeeded.
    async fn downsample_file(
        &self,
        job: &JobHandle,
        commands: &CommandBuilder<'_>,
        file: &str,
        fraction: f64,
    ) -> Result<()> {
        let tmp = format!("{file}.tmp");
        let tmp_path = self.work_dir().join(&tmp);
        let spec = commands.downsample(file, &tmp, fraction, self.config.downsample.seed);

        let outcome = match self.run_stage(job, Stage::Downsample, &spec).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.discard_temp(job, &tmp_path).await;
                return Err(e);
            }
        };

        if !outcome.is_success() {
            self.discard_temp(job, &tmp_path).await;
            return Ok(());
        }

        let target = self.work_dir().join(file);
        let replaced = tokio::fs::rename(&tmp_path, &target)
            .await
            .map_err(|e| io_error("replacing", &target, e));
        if replaced.is_err() {
            self.discard_temp(job, &tmp_path).await;
        }
        self.tolerate(job, Stage::Downsample, replaced)
    }

    async fn discard_temp(&self, job: &JobHandle, path: &Path) {
        if let Err(e) = remove_if_exists(path).await {
            job.warn(format!("Could not remove {}: {e}", path.display()));
        }
    }

    /// Sweep expired artifacts, then move this accession's sorted alignment
    /// and its companions to the publish directory.
    async fn publish(&self, job: &JobHandle, accession: &str) -> Result<()> {
        let report = self.sweeper.sweep(accession).await;
        if !report.swept.is_empty() {
            job.info(format!(
                "Removed {} expired alignments from {}",
                report.swept.len(),
                self.sweeper.publish_dir().display()
            ));
        }

        let artifacts = list_files(self.work_dir(), |name| {
            is_sorted_artifact_for(name, accession)
        })
        .await?;
        // Sorted by name, so the BAM itself comes before its companions.
        let Some((bam_file, companions)) = artifacts.split_first() else {
            return Err(Error::Other(format!(
                "No sorted BAM file to publish for {accession}"
            )));
        };

        let publish_dir = self.sweeper.publish_dir();
        ensure_dir_all(publish_dir).await?;
        move_file(bam_file, &published_path(publish_dir, bam_file)).await?;
        self.sweeper.record(accession);
        for source in companions {
            move_file(source, &published_path(publish_dir, source)).await?;
        }

        job.info(format!(
            "Moved BAM file for {accession} to {}",
            publish_dir.display()
        ));
        Ok(())
    }

    /// Delete the job's intermediate files.
    ///
    /// Every failure is logged; the returned error only summarizes them for
    /// the cleanup stage's failure policy.
    async fn cleanup(&self, job: &JobHandle, accession: &str) -> Result<()> {
        let mut failed = 0;
        let mut targets = match list_files(self.work_dir(), |name| is_fastq_for(name, accession))
            .await
        {
            Ok(files) => files,
            Err(e) => {
                job.warn(format!("Could not list read files: {e}"));
                failed += 1;
                Vec::new()
            }
        };
        targets.push(self.work_dir().join(bam(accession)));

        let mut removed = 0;
        for path in &targets {
            match remove_if_exists(path).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    job.warn(format!("Could not remove {}: {e}", path.display()));
                    failed += 1;
                }
            }
        }

        if let Err(e) = self.progress.remove(&job.id()).await {
            job.warn(format!("Could not remove progress counter: {e}"));
            failed += 1;
        }

        job.info(format!(
            "Removed {removed} intermediate files for {accession}"
        ));

        if failed > 0 {
            return Err(Error::Other(format!(
                "Cleanup left {failed} intermediate files for {accession}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("config", &self.config)
            .field("progress", &self.progress)
            .field("sweeper", &self.sweeper)
            .finish_non_exhaustive()
    }
}

fn published_path(publish_dir: &Path, source: &Path) -> PathBuf {
    match source.file_name() {
        Some(name) => publish_dir.join(name),
        None => publish_dir.to_path_buf(),
    }
}

/// Parse a command's trimmed stdout.
fn parse_output<T: FromStr>(outcome: &CommandOutcome, what: &'static str) -> Result<T> {
    let text = outcome.trimmed_stdout();
    text.parse()
        .map_err(|_| Error::invalid_output(what, text))
}
