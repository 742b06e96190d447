use command::{
    Invocation, RSYNC_SYSTEM_EXCLUDES, SynthesizedCommand, ToolAdapterExt, ToolOperation, Venue,
};
use model::{
    BackupJobConfig, DestinationCredentials, DestinationType, RetentionPolicy, SshConnectionConfig,
    Tool,
};
use proptest::prelude::*;

fn path() -> impl Strategy<Value = String> {
    "/[a-z]{1,8}(/[a-z0-9_]{1,8}){0,3}"
}

fn password() -> impl Strategy<Value = String> {
    "[A-Za-z0-9]{12,24}".prop_map(|tail| format!("Pw!{tail}"))
}

fn retention() -> impl Strategy<Value = RetentionPolicy> {
    (0u32..48, 0u32..14, 0u32..8, 0u32..12, 0u32..5).prop_map(
        |(keep_hourly, keep_daily, keep_weekly, keep_monthly, keep_yearly)| RetentionPolicy {
            keep_hourly,
            keep_daily,
            keep_weekly,
            keep_monthly,
            keep_yearly,
        },
    )
}

fn repository_destination(tool: Tool) -> BoxedStrategy<(DestinationType, String)> {
    let object_stores = prop_oneof![
        Just(DestinationType::S3),
        Just(DestinationType::B2),
        Just(DestinationType::Gcs),
        Just(DestinationType::Azure),
        Just(DestinationType::Gdrive),
        Just(DestinationType::Onedrive),
    ];
    let local = path().prop_map(|path| (DestinationType::Nfs, path));
    let sftp = ("[a-z]{3,8}", path())
        .prop_map(|(host, path)| (DestinationType::Sftp, format!("backup@{host}:{path}")));
    let stores = (object_stores, "[a-z]{3,10}/[a-z]{1,8}");
    match tool {
        Tool::Restic => prop_oneof![local, sftp, stores].boxed(),
        _ => prop_oneof![local, sftp].boxed(),
    }
}

fn job(
    tool: Tool,
    sources: Vec<String>,
    (destination_type, destination_path): (DestinationType, String),
    repo_password: Option<String>,
    retention: RetentionPolicy,
) -> BackupJobConfig {
    BackupJobConfig {
        job_id: "17".to_owned(),
        job_name: "fleet nightly".to_owned(),
        tool,
        source_paths: sources,
        destination_type,
        destination_path,
        credentials: DestinationCredentials::default(),
        repo_password: repo_password.map(Into::into),
        retention,
    }
}

fn operations() -> [ToolOperation<'static>; 5] {
    [
        ToolOperation::Backup,
        ToolOperation::Prune,
        ToolOperation::ListSnapshots,
        ToolOperation::ListFiles {
            snapshot_id: "latest",
        },
        ToolOperation::Restore {
            snapshot_id: "latest",
            target: "/srv/restore",
        },
    ]
}

fn synthesized(job: &BackupJobConfig, ssh: &SshConnectionConfig) -> Vec<SynthesizedCommand> {
    let adapter = job.tool.adapter();
    operations()
        .iter()
        .filter_map(|operation| {
            adapter
                .synthesize(operation, &Invocation::new(job, ssh))
                .expect("synthesis succeeds for well-formed jobs")
        })
        .collect()
}

proptest! {
    #[test]
    fn repository_password_stays_out_of_argv(
        tool in prop_oneof![Just(Tool::Borg), Just(Tool::Restic)],
        sources in prop::collection::vec(path(), 1..4),
        secret in password(),
        retention in retention(),
        seed in any::<u64>(),
    ) {
        let destination = match (tool, seed % 3) {
            (_, 0) => (DestinationType::Nfs, "/mnt/repo".to_owned()),
            (_, 1) => (DestinationType::Sftp, "backup@vault:/srv/repo".to_owned()),
            (Tool::Restic, _) => (DestinationType::S3, "bucket/repo".to_owned()),
            _ => (DestinationType::Nfs, "/mnt/other".to_owned()),
        };
        let job = job(tool, sources, destination, Some(secret.clone()), retention);
        let ssh = SshConnectionConfig::with_private_key("web1", 22, "root", "KEY".into(), None);

        for command in synthesized(&job, &ssh) {
            prop_assert!(!command.line.render().contains(&secret));
            prop_assert!(command.env.values().any(|value| value.expose() == secret));
        }
    }

    #[test]
    fn repository_targets_follow_destination(
        (tool, destination) in prop_oneof![Just(Tool::Borg), Just(Tool::Restic)]
            .prop_flat_map(|tool| (Just(tool), repository_destination(tool))),
        sources in prop::collection::vec(path(), 1..3),
        secret in password(),
    ) {
        let ssh = SshConnectionConfig::with_password("web1", 22, "root", "pw".into());
        let job = job(tool, sources, destination, Some(secret), RetentionPolicy::default());

        let commands = synthesized(&job, &ssh);
        prop_assert_eq!(commands.len(), 4);
        let repository = if tool == Tool::Borg { "BORG_REPO" } else { "RESTIC_REPOSITORY" };
        for command in commands {
            prop_assert_eq!(command.venue, Venue::Remote);
            prop_assert!(command.env.get(repository).is_some());
        }
    }

    #[test]
    fn rsync_always_stays_on_one_filesystem(
        sources in prop::collection::vec(path(), 1..4),
        destination in path(),
        pull in any::<bool>(),
        secret in password(),
    ) {
        let destination_type = if pull { DestinationType::Nfs } else { DestinationType::Sftp };
        let job = job(
            Tool::Rsync,
            sources,
            (destination_type, destination),
            None,
            RetentionPolicy::default(),
        );
        let ssh = SshConnectionConfig::with_password("web1", 22, "backup", secret.as_str().into());

        let commands = synthesized(&job, &ssh);
        prop_assert_eq!(commands.len(), 4);
        for command in commands {
            let args = command.line.arguments();
            prop_assert!(args.iter().any(|arg| arg == "--one-file-system"));
            for excluded in RSYNC_SYSTEM_EXCLUDES {
                let flag = format!("--exclude={excluded}");
                prop_assert!(args.contains(&flag));
            }
            prop_assert!(!command.line.render().contains(&secret));
            prop_assert_eq!(command.venue == Venue::Local, pull);
        }
    }
}

#[test]
fn restic_s3_backup_has_no_password_in_arguments() {
    let job = job(
        Tool::Restic,
        vec!["/data".to_owned()],
        (DestinationType::S3, "bucket/path".to_owned()),
        Some("x".to_owned()),
        RetentionPolicy::default(),
    );
    let ssh = SshConnectionConfig::with_private_key("web1", 22, "root", "KEY".into(), None);
    let command = Tool::Restic
        .adapter()
        .synthesize(&ToolOperation::Backup, &Invocation::new(&job, &ssh))
        .unwrap()
        .unwrap();

    assert_eq!(command.env.get("RESTIC_PASSWORD"), Some("x"));
    assert!(command.line.arguments().iter().all(|arg| !arg.contains('x')));
}
