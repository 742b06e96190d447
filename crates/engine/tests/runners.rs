mod support;

use std::time::Duration;

use engine::{EngineConfig, EngineError, JobContext, TeardownOwner};
use logging::{CollectingSink, REDACTED};
use model::{
    CONNECTION_FAILED_MESSAGE, DestinationType, LogKind, RestoreJobConfig, Tool,
};
use remote::{OutputEvent, SessionState};
use support::{
    PRIVATE_KEY, REPO_PASSWORD, Reply, SSH_PASSWORD, Script, job, key_host, password_host,
    quick_config,
};
use tokio_util::sync::CancellationToken;

const RESTIC_SUMMARY: &str = concat!(
    r#"{"message_type":"status","percent_done":0.5}"#,
    "\n",
    r#"{"message_type":"summary","files_new":2,"total_files_processed":12,"total_bytes_processed":3456}"#,
    "\n"
);

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn refused_connection_yields_single_error() {
    let script = Script::refusing();
    let runner = script.runner(quick_config());
    let job = job(Tool::Restic, DestinationType::S3, "bucket/path");

    let run = runner
        .run_backup_job(&password_host(), &job, JobContext::new())
        .await;
    assert!(!run.result.success);
    assert_eq!(run.result.errors, vec![CONNECTION_FAILED_MESSAGE.to_owned()]);
    assert!(run.lease.is_none());
    assert!(script.requests().is_empty());

    let restore = RestoreJobConfig {
        job: job.clone(),
        snapshot_id: "4f9a0c1e".to_owned(),
        restore_path: "/srv/restore".to_owned(),
    };
    let restored = runner
        .run_restore_job(&password_host(), &restore, JobContext::new())
        .await;
    assert_eq!(restored.errors, vec![CONNECTION_FAILED_MESSAGE.to_owned()]);

    let listed = runner
        .list_job_snapshots(&password_host(), &job, JobContext::new())
        .await;
    assert!(matches!(listed, Err(EngineError::ConnectionFailed { target }) if target == "backup@web1:22"));
}

#[tokio::test]
async fn push_backup_prunes_and_disconnects() {
    let script = Script::accepting()
        .reply(Reply::stdout(RESTIC_SUMMARY, 0))
        .reply(Reply::exit(0));
    let job = job(Tool::Restic, DestinationType::S3, "bucket/path");

    let run = script
        .runner(quick_config())
        .run_backup_job(&password_host(), &job, JobContext::new())
        .await;
    assert!(run.result.success, "{:?}", run.result.errors);
    assert_eq!(run.result.files_processed, Some(12));
    assert_eq!(run.result.bytes_processed, Some(3456));
    assert!(run.result.warnings.is_empty());
    assert!(run.lease.is_none());
    assert_eq!(run.teardown_owner(), TeardownOwner::Initiator);
    assert_eq!(script.state(), SessionState::Disconnected);
    assert_eq!(script.disconnects(), 1);

    let requests = script.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].label, "restic backup");
    assert_eq!(requests[1].label, "restic forget");
    assert!(requests[1].rendered.contains("--keep-daily=7"));
    for request in &requests {
        assert!(!request.local);
        assert!(!request.rendered.contains(REPO_PASSWORD));
        assert!(
            request
                .env
                .contains(&("RESTIC_PASSWORD".to_owned(), REPO_PASSWORD.to_owned()))
        );
    }
    let last = run.result.logs.last().map(|log| log.message.as_str());
    assert_eq!(last, Some("Disconnected from backup@web1:22"));
}

#[tokio::test]
async fn failed_prune_is_only_a_warning() {
    let script = Script::accepting()
        .reply(Reply::stdout(RESTIC_SUMMARY, 0))
        .reply(Reply::stderr("Fatal: unable to create lock in backend\n", 1));
    let job = job(Tool::Restic, DestinationType::S3, "bucket/path");

    let result = script
        .runner(quick_config())
        .run_backup_job(&password_host(), &job, JobContext::new())
        .await
        .into_result();
    assert!(result.success);
    assert!(result.errors.is_empty());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(
        result.warnings[0],
        "Prune failed with exit code 1: Fatal: unable to create lock in backend"
    );
    assert!(
        result
            .logs
            .iter()
            .any(|log| log.kind == LogKind::Error && log.message == result.warnings[0])
    );
}

#[tokio::test]
async fn empty_retention_skips_prune() {
    let script = Script::accepting().reply(Reply::stdout(RESTIC_SUMMARY, 0));
    let mut job = job(Tool::Restic, DestinationType::B2, "fleet/web");
    job.retention = Default::default();

    let result = script
        .runner(quick_config())
        .run_backup_job(&password_host(), &job, JobContext::new())
        .await
        .into_result();
    assert!(result.success);
    assert_eq!(script.requests().len(), 1);
    assert!(result.logs.iter().any(|log| log.message.contains("prune skipped")));
}

#[tokio::test]
async fn failed_backup_reports_redacted_output() {
    let leak = format!("Fatal: wrong password {REPO_PASSWORD} for user with {SSH_PASSWORD}\n");
    let script = Script::accepting().reply(Reply::stderr(&leak, 1));
    let job = job(Tool::Restic, DestinationType::S3, "bucket/path");
    let sink = CollectingSink::new();

    let result = script
        .runner(quick_config())
        .run_backup_job(&password_host(), &job, JobContext::new().with_sink(sink.clone()))
        .await
        .into_result();
    assert!(!result.success);
    assert_eq!(script.requests().len(), 1, "no prune after a failed backup");
    assert_eq!(
        result.errors,
        vec![format!(
            "Backup failed with exit code 1: Fatal: wrong password {REDACTED} for user with {REDACTED}"
        )]
    );
    for log in result.logs.iter().chain(sink.entries().iter()) {
        assert!(!log.message.contains(REPO_PASSWORD), "{}", log.message);
        assert!(!log.message.contains(SSH_PASSWORD), "{}", log.message);
    }
}

#[tokio::test]
async fn live_sink_sees_the_transcript_in_order() {
    let script = Script::accepting()
        .reply(Reply {
            events: vec![
                OutputEvent::Stdout(b"sending incremental file list\nindex.ht".to_vec()),
                OutputEvent::Stdout(b"ml\n".to_vec()),
                OutputEvent::Stderr(b"rsync: [sender] send_files failed\n".to_vec()),
                OutputEvent::Exit(Some(0)),
            ],
            hang: false,
        });
    let job = job(Tool::Rsync, DestinationType::Sftp, "/mnt/mirror/web");
    let sink = CollectingSink::new();

    let result = script
        .runner(quick_config())
        .run_backup_job(&password_host(), &job, JobContext::new().with_sink(sink.clone()))
        .await
        .into_result();
    let streamed: Vec<String> = sink.entries().into_iter().map(|log| log.message).collect();
    let aggregated: Vec<String> = result.logs.iter().map(|log| log.message.clone()).collect();
    assert_eq!(streamed, aggregated);
    assert!(aggregated.contains(&"index.html".to_owned()));
    let failure = result
        .logs
        .iter()
        .find(|log| log.message.starts_with("rsync: [sender]"))
        .map(|log| log.kind);
    assert_eq!(failure, Some(LogKind::Error));
}

#[tokio::test]
async fn pull_backup_hands_over_the_session() {
    let stats = "Number of regular files transferred: 3\nTotal transferred file size: 1,024 bytes\n";
    let script = Script::accepting().reply(Reply::stdout(stats, 0));
    let job = job(Tool::Rsync, DestinationType::Nfs, "/backups/web");

    let run = script
        .runner(quick_config())
        .run_backup_job(&key_host(), &job, JobContext::new())
        .await;
    assert!(run.result.success, "{:?}", run.result.errors);
    assert_eq!(run.result.files_processed, Some(3));
    assert_eq!(run.result.bytes_processed, Some(1024));
    assert_eq!(run.teardown_owner(), TeardownOwner::RemotePuller);
    assert_eq!(script.state(), SessionState::Connected);
    assert_eq!(script.disconnects(), 0);

    let requests = script.requests();
    assert_eq!(requests.len(), 1, "rsync has no prune step");
    assert!(requests[0].local);
    assert!(requests[0].rendered.contains("backup@web1:/var/www"));
    assert!(!requests[0].rendered.contains("{{SSH_IDENTITY_FILE}}"));
    assert!(!requests[0].rendered.contains("fakekey"));
    assert!(!PRIVATE_KEY.is_empty());

    let lease = run.lease.expect("pull mode keeps the session");
    assert_eq!(lease.owner(), TeardownOwner::RemotePuller);
    assert_eq!(lease.target(), "backup@web1:2222");
    assert!(lease.is_connected());
    lease.release().await;
    assert_eq!(script.state(), SessionState::Disconnected);
    assert_eq!(script.disconnects(), 1);
}

#[tokio::test]
async fn dropped_lease_disconnects_in_background() {
    let script = Script::accepting();
    let job = job(Tool::Rsync, DestinationType::Nfs, "/backups/web");

    let run = script
        .runner(quick_config())
        .run_backup_job(&key_host(), &job, JobContext::new())
        .await;
    assert!(run.lease.is_some());
    drop(run.into_result());
    let probe = script.clone();
    wait_until(move || probe.state() == SessionState::Disconnected).await;
}

#[tokio::test]
async fn restore_failure_keeps_stderr() {
    let script = Script::accepting().reply(Reply::stderr(
        "Archive web-2024-05-01T02:00:00 does not exist\n",
        2,
    ));
    let restore = RestoreJobConfig {
        job: job(Tool::Borg, DestinationType::Nfs, "/mnt/borg/web"),
        snapshot_id: "web-2024-05-01T02:00:00".to_owned(),
        restore_path: "/srv/restore".to_owned(),
    };

    let result = script
        .runner(quick_config())
        .run_restore_job(&password_host(), &restore, JobContext::new())
        .await;
    assert!(!result.success);
    assert_eq!(
        result.errors,
        vec![
            "Restore failed with exit code 2: Archive web-2024-05-01T02:00:00 does not exist"
                .to_owned()
        ]
    );
    assert_eq!(script.state(), SessionState::Disconnected);
    assert_eq!(script.requests()[0].label, "borg extract");
}

#[tokio::test]
async fn restore_without_snapshot_runs_nothing() {
    let script = Script::accepting();
    let restore = RestoreJobConfig {
        job: job(Tool::Restic, DestinationType::Nfs, "/mnt/restic"),
        snapshot_id: "  ".to_owned(),
        restore_path: "/srv/restore".to_owned(),
    };

    let result = script
        .runner(quick_config())
        .run_restore_job(&password_host(), &restore, JobContext::new())
        .await;
    assert!(!result.success);
    assert!(result.errors[0].starts_with("Invalid restore request"));
    assert!(script.requests().is_empty());
    assert_eq!(script.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn cancellation_interrupts_the_running_command() {
    let script = Script::accepting().reply(Reply::hanging("scanning...\n"));
    let job = job(Tool::Restic, DestinationType::S3, "bucket/path");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = script
        .runner(quick_config())
        .run_backup_job(&password_host(), &job, JobContext::new().with_cancel(cancel))
        .await
        .into_result();
    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Backup interrupted"), "{}", result.errors[0]);
    assert!(result.errors[0].contains("restic backup cancelled"));
    assert_eq!(script.requests().len(), 1);
    assert_eq!(script.state(), SessionState::Disconnected);
    let probe = script.clone();
    wait_until(move || probe.aborted() == 1).await;
}

#[tokio::test]
async fn command_timeout_interrupts_the_running_command() {
    let script = Script::accepting().reply(Reply::hanging("scanning...\n"));
    let job = job(Tool::Borg, DestinationType::Nfs, "/mnt/borg/web");
    let config = EngineConfig::builder()
        .command_timeout_secs(1)
        .build_with(|_| None);

    let result = script
        .runner(config)
        .run_backup_job(&password_host(), &job, JobContext::new())
        .await
        .into_result();
    assert!(!result.success);
    assert!(result.errors[0].contains("borg create timed out after 1s"));
    assert!(
        result
            .logs
            .iter()
            .any(|log| log.kind == LogKind::Error && log.message == "borg create timed out after 1s")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_job_still_disconnects() {
    let script = Script::accepting().reply(Reply::hanging("scanning...\n"));
    let runner = script.runner(quick_config());
    let job = job(Tool::Restic, DestinationType::S3, "bucket/path");

    let task = tokio::spawn(async move {
        runner
            .run_backup_job(&password_host(), &job, JobContext::new())
            .await
    });
    let probe = script.clone();
    wait_until(move || probe.requests().len() == 1).await;
    assert_eq!(script.state(), SessionState::Connected);

    task.abort();
    assert!(task.await.is_err());
    let probe = script.clone();
    wait_until(move || probe.state() == SessionState::Disconnected).await;
    assert_eq!(script.disconnects(), 1);
}
