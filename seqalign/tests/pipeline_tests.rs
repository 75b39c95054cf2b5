//! End-to-end pipeline tests against scripted external tools.

mod common;

use std::time::Duration;

use common::{TestEnv, position_of};
use seqalign::job::{PollResponse, PollStatus};
use seqalign::pipeline::Stage;
use seqalign::retention::RetentionConfig;

mod paired_tests {
    use super::*;

    #[tokio::test]
    async fn test_paired_run_downsamples_both_mates() {
        let env = TestEnv::new(|r| r.paired().reads("250000\n"));
        let id = env.registry.submit("SRR000").unwrap();

        let response = env.wait_terminal(id).await;
        assert_eq!(response.status(), Some(PollStatus::Complete));

        let downsample = env.runner.calls_for("downsample");
        assert_eq!(downsample.len(), 2);
        assert!(downsample[0]
            .command_line()
            .contains("sample -s100 SRR000_1.fastq.gz 0.4 |"));
        assert!(downsample[1]
            .command_line()
            .contains("sample -s100 SRR000_2.fastq.gz 0.4 |"));

        let align = env.runner.calls_for("align");
        assert!(align[0]
            .command_line()
            .contains("SRR000_1.fastq.gz SRR000_2.fastq.gz"));

        let messages = env.messages(id);
        let order = [
            "Downloaded",
            "Downsampling",
            "Type: paired",
            "Aligned",
            "Sorted",
            "Indexed",
            "Moved",
            "Finished",
        ]
        .map(|prefix| position_of(&messages, prefix));
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{messages:#?}");
        assert!(messages.contains(&"Downloaded 2 files for SRR000".to_string()));

        assert!(env.published_file("SRR000.sorted.bam").exists());
        assert!(env.published_file("SRR000.sorted.bam.bai").exists());
        for leftover in [
            "SRR000_1.fastq.gz",
            "SRR000_2.fastq.gz",
            "SRR000_1.fastq.gz.tmp",
            "SRR000.bam",
            "SRR000.sorted.bam",
        ] {
            assert!(!env.work_file(leftover).exists(), "{leftover} left behind");
        }
    }

    #[tokio::test]
    async fn test_failed_sampling_keeps_original_and_continues() {
        let env = TestEnv::new(|r| r.paired().reads("250000").failing("downsample"));
        let id = env.registry.submit("SRR000").unwrap();

        let response = env.wait_terminal(id).await;
        assert_eq!(response.status(), Some(PollStatus::Complete));

        let messages = env.messages(id);
        assert!(
            messages
                .iter()
                .any(|m| m == "Stage downsample failed with exit code 1; continuing")
        );
        assert!(!env.work_file("SRR000_1.fastq.gz.tmp").exists());
        assert!(!env.work_file("SRR000_2.fastq.gz.tmp").exists());
        assert!(env.published_file("SRR000.sorted.bam").exists());
    }
}

mod single_tests {
    use super::*;

    #[tokio::test]
    async fn test_single_run_under_ceiling_skips_downsampling() {
        let env = TestEnv::new(|r| r.reads("50000"));
        let id = env.registry.submit("SRR001").unwrap();

        let response = env.wait_terminal(id).await;
        assert_eq!(response.status(), Some(PollStatus::Complete));

        let messages = env.messages(id);
        assert!(!messages.iter().any(|m| m.starts_with("Downsampling")));
        assert!(messages.contains(&"Type: single".to_string()));
        assert!(messages.contains(&"Found 50000 reads in SRR001.fastq.gz".to_string()));
        assert!(env.runner.calls_for("downsample").is_empty());
        assert!(
            env.runner.calls_for("align")[0]
                .command_line()
                .contains("-t 8 ./ref.fa SRR001.fastq.gz |")
        );
        assert!(env.published_file("SRR001.sorted.bam").exists());
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_unparseable_read_count_fails_job() {
        let env = TestEnv::new(|r| r.reads("zcat: SRR001.fastq.gz: unexpected end of file"));
        let id = env.registry.submit("SRR001").unwrap();

        let response = env.wait_terminal(id).await;
        assert_eq!(response.status(), Some(PollStatus::Failed));

        let messages = env.messages(id);
        let last = messages.last().unwrap();
        assert!(last.starts_with("Job failed: Could not parse read count"), "{last}");
        assert_eq!(env.runner.labels(), ["fetch", "count-reads"]);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_later_stages() {
        let env = TestEnv::with_config(
            |r| r.failing("sort"),
            |config| config.with_abort_on([Stage::Sort]),
            RetentionConfig::default(),
        );
        let id = env.registry.submit("SRR001").unwrap();

        let response = env.wait_terminal(id).await;
        assert_eq!(response.status(), Some(PollStatus::Failed));

        assert_eq!(
            env.runner.labels(),
            ["fetch", "count-reads", "nproc", "align", "sort"]
        );
        let messages = env.messages(id);
        assert_eq!(
            messages.last().unwrap(),
            "Job failed: Stage sort failed with exit code 1"
        );
        assert!(!messages.iter().any(|m| m.starts_with("Moved")));
        assert!(!env.published_file("SRR001.sorted.bam").exists());
    }

    #[tokio::test]
    async fn test_failure_without_abort_policy_completes() {
        let env = TestEnv::new(|r| r.failing("sort"));
        let id = env.registry.submit("SRR001").unwrap();

        let response = env.wait_terminal(id).await;
        assert_eq!(response.status(), Some(PollStatus::Complete));
        assert!(env.runner.labels().contains(&"index".to_string()));
    }
}

mod poll_tests {
    use super::*;

    #[tokio::test]
    async fn test_processing_poll_reports_progress_lines() {
        let env = TestEnv::new(|r| r.holding("align"));
        let id = env.registry.submit("SRR001").unwrap();

        let lines = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let PollResponse::Status {
                    status: PollStatus::Processing,
                    lines: Some(lines),
                    ..
                } = env.registry.poll(&id.to_string()).await
                    && lines > 0
                {
                    return lines;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(lines, 42);

        env.runner.release();
        let response = env.wait_terminal(id).await;
        assert_eq!(response.status(), Some(PollStatus::Complete));
        assert!(!env.work_file(&format!("{id}.lines")).exists());
    }

    #[tokio::test]
    async fn test_terminal_polls_are_identical() {
        let env = TestEnv::new(|r| r);
        let id = env.registry.submit("SRR001").unwrap();

        let first = env.wait_terminal(id).await;
        let second = env.registry.poll(&id.to_string()).await;
        let third = env.registry.poll(&id.to_string()).await;

        assert_eq!(first, second);
        assert_eq!(second, third);
        match first {
            PollResponse::Status { lines, log, .. } => {
                assert!(lines.is_none());
                assert!(log.last().unwrap().ends_with("Finished processing SRR001"));
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_id_is_reported_in_payload() {
        let env = TestEnv::new(|r| r);
        assert_eq!(
            env.registry.poll("00000000-0000-0000-0000-000000000000").await,
            PollResponse::invalid()
        );
    }
}

mod retention_tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_sweeps_expired_alignments() {
        let env = TestEnv::with_config(
            |r| r,
            |config| config,
            RetentionConfig::new().with_max_age_secs(0),
        );

        let first = env.registry.submit("SRR100").unwrap();
        env.wait_terminal(first).await;
        assert!(env.published_file("SRR100.sorted.bam").exists());

        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = env.registry.submit("SRR200").unwrap();
        env.wait_terminal(second).await;

        assert!(!env.published_file("SRR100.sorted.bam").exists());
        assert!(!env.published_file("SRR100.sorted.bam.bai").exists());
        assert!(env.published_file("SRR200.sorted.bam").exists());
        assert!(
            env.messages(second)
                .iter()
                .any(|m| m.starts_with("Removed 1 expired alignments"))
        );
    }
}
