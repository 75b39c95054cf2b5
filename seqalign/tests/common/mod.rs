//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use seqalign::Result;
use seqalign::job::{JobRegistry, PollResponse, PollStatus};
use seqalign::pipeline::{PipelineConfig, PipelineExecutor};
use seqalign::retention::{RetentionConfig, RetentionSweeper};
use seqalign::runner::{CommandOutcome, CommandRunner, CommandSpec, Invocation};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Stand-in for the external tools.
///
/// Each command produces the files the real tool would write in the work
/// directory, then exits with 0, or with 1 for labels marked as failing.
pub struct ScriptedRunner {
    work_dir: PathBuf,
    paired: bool,
    reads: String,
    cores: String,
    progress_lines: u64,
    failing: HashSet<String>,
    hold: Option<(String, Arc<Semaphore>)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            paired: false,
            reads: "1000".to_string(),
            cores: "8".to_string(),
            progress_lines: 42,
            failing: HashSet::new(),
            hold: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Download `_1`/`_2` mate files instead of a single file.
    pub fn paired(mut self) -> Self {
        self.paired = true;
        self
    }

    /// Output of the read counting command.
    pub fn reads(mut self, output: &str) -> Self {
        self.reads = output.to_string();
        self
    }

    /// Make the command with `label` exit with status 1.
    pub fn failing(mut self, label: &str) -> Self {
        self.failing.insert(label.to_string());
        self
    }

    /// Block the command with `label` until [`Self::release`] is called.
    pub fn holding(mut self, label: &str) -> Self {
        self.hold = Some((label.to_string(), Arc::new(Semaphore::new(0))));
        self
    }

    pub fn release(&self) {
        if let Some((_, gate)) = &self.hold {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.label).collect()
    }

    pub fn calls_for(&self, label: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.label == label)
            .collect()
    }

    fn touch(&self, name: &str) {
        std::fs::write(self.work_dir.join(name), name).unwrap();
    }

    fn produce(&self, spec: &CommandSpec) -> Option<String> {
        match (spec.label.as_str(), &spec.invocation) {
            ("fetch", Invocation::Program { args, .. }) => {
                let accession = args.last().unwrap();
                if self.paired {
                    self.touch(&format!("{accession}_1.fastq.gz"));
                    self.touch(&format!("{accession}_2.fastq.gz"));
                } else {
                    self.touch(&format!("{accession}.fastq.gz"));
                }
                None
            }
            ("count-reads", _) => Some(self.reads.clone()),
            ("nproc", _) => Some(self.cores.clone()),
            ("downsample", Invocation::Shell(script)) => {
                self.touch(redirect_target(script));
                None
            }
            ("align", Invocation::Shell(script)) => {
                let words: Vec<&str> = script.split_whitespace().collect();
                let counter_pos = words.iter().position(|w| *w == "count-lines").unwrap();
                self.touch(redirect_target(script));
                std::fs::write(
                    self.work_dir.join(words[counter_pos + 1]),
                    self.progress_lines.to_string(),
                )
                .unwrap();
                None
            }
            ("sort", Invocation::Program { args, .. }) => {
                self.touch(&args[2]);
                None
            }
            ("index", Invocation::Program { args, .. }) => {
                self.touch(&format!("{}.bai", args[1]));
                None
            }
            _ => None,
        }
    }
}

fn redirect_target(script: &str) -> &str {
    script.rsplit("> ").next().unwrap().trim()
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutcome> {
        self.calls.lock().push(spec.clone());
        let stdout = self.produce(spec);

        if let Some((label, gate)) = &self.hold
            && *label == spec.label
        {
            let _permit = gate.acquire().await.unwrap();
        }

        if self.failing.contains(&spec.label) {
            return Ok(CommandOutcome::failure(1));
        }
        Ok(CommandOutcome::success(stdout))
    }
}

/// A registry wired to a [`ScriptedRunner`] with temporary work and publish
/// directories.
pub struct TestEnv {
    pub work: TempDir,
    pub publish: TempDir,
    pub runner: Arc<ScriptedRunner>,
    pub registry: Arc<JobRegistry>,
}

impl TestEnv {
    pub fn new(script: impl FnOnce(ScriptedRunner) -> ScriptedRunner) -> Self {
        Self::with_config(script, |config| config, RetentionConfig::default())
    }

    pub fn with_config(
        script: impl FnOnce(ScriptedRunner) -> ScriptedRunner,
        configure: impl FnOnce(PipelineConfig) -> PipelineConfig,
        retention: RetentionConfig,
    ) -> Self {
        let work = TempDir::new().unwrap();
        let publish = TempDir::new().unwrap();
        let runner = Arc::new(script(ScriptedRunner::new(work.path())));
        let sweeper = Arc::new(RetentionSweeper::new(publish.path(), retention));
        let executor = Arc::new(PipelineExecutor::new(
            configure(PipelineConfig::new(work.path())),
            runner.clone(),
            sweeper,
        ));
        let registry = Arc::new(JobRegistry::new(executor));

        Self {
            work,
            publish,
            runner,
            registry,
        }
    }

    /// Poll until the job leaves the processing state.
    pub async fn wait_terminal(&self, id: Uuid) -> PollResponse {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let response = self.registry.poll(&id.to_string()).await;
                if response.status() != Some(PollStatus::Processing) {
                    return response;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not finish")
    }

    /// Plain log messages of a job, without timestamps.
    pub fn messages(&self, id: Uuid) -> Vec<String> {
        self.registry
            .lookup(&id)
            .unwrap()
            .logs()
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }

    pub fn work_file(&self, name: &str) -> PathBuf {
        self.work.path().join(name)
    }

    pub fn published_file(&self, name: &str) -> PathBuf {
        self.publish.path().join(name)
    }
}

/// Index of the first message starting with `prefix`.
pub fn position_of(messages: &[String], prefix: &str) -> usize {
    messages
        .iter()
        .position(|m| m.starts_with(prefix))
        .unwrap_or_else(|| panic!("no log line starting with {prefix:?} in {messages:#?}"))
}
