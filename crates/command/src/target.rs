//! Repository locations and destination credentials for borg and restic.
//!
//! Both tools read their repository and password from the environment, which
//! keeps them out of the process list on the SSH host.

use model::{BackupJobConfig, DestinationType, Tool};

use crate::error::SynthesisError;
use crate::line::Environment;

/// Schemes that mark a destination path as an already complete repository URL.
const RESTIC_SCHEMES: &[&str] = &[
    "s3:", "b2:", "gs:", "azure:", "sftp:", "rclone:", "rest:", "swift:", "local:",
];

/// Builds the environment of a borg or restic command: repository, password,
/// and destination credentials.
pub(crate) fn repository_environment(job: &BackupJobConfig) -> Result<Environment, SynthesisError> {
    let mut env = Environment::new();
    match job.tool {
        Tool::Borg => {
            env.set("BORG_REPO", borg_repository(job)?);
            env.set_opt("BORG_PASSPHRASE", job.repo_password.as_ref());
        }
        Tool::Restic => {
            env.set("RESTIC_REPOSITORY", restic_repository(job)?);
            env.set_opt("RESTIC_PASSWORD", job.repo_password.as_ref());
        }
        Tool::Rsync => {}
    }
    credential_environment(job, &mut env);
    Ok(env)
}

/// restic repository string for the job's destination.
pub(crate) fn restic_repository(job: &BackupJobConfig) -> Result<String, SynthesisError> {
    let path = job.destination_path.trim();
    if RESTIC_SCHEMES.iter().any(|scheme| path.starts_with(scheme)) {
        return Ok(path.to_owned());
    }

    let destination = job.destination_type;
    let repository = match destination {
        DestinationType::Nfs => path.to_owned(),
        DestinationType::Sftp => format!("sftp:{path}"),
        DestinationType::S3 => {
            let endpoint = job
                .credentials
                .endpoint
                .as_deref()
                .map(|endpoint| endpoint.trim().trim_end_matches('/'))
                .filter(|endpoint| !endpoint.is_empty())
                .unwrap_or("s3.amazonaws.com");
            format!("s3:{endpoint}/{}", path.trim_start_matches('/'))
        }
        DestinationType::B2 => {
            let (bucket, prefix) = split_bucket(destination, path)?;
            format!("b2:{bucket}:{prefix}")
        }
        DestinationType::Gcs => {
            let (bucket, prefix) = split_bucket(destination, path)?;
            format!("gs:{bucket}:/{prefix}")
        }
        DestinationType::Azure => {
            let (container, prefix) = split_bucket(destination, path)?;
            format!("azure:{container}:/{prefix}")
        }
        DestinationType::Gdrive => format!("rclone:gdrive:{}", path.trim_start_matches('/')),
        DestinationType::Onedrive => format!("rclone:onedrive:{}", path.trim_start_matches('/')),
    };
    Ok(repository)
}

/// borg repository string for the job's destination.
///
/// borg speaks only to local paths and SSH remotes.
pub(crate) fn borg_repository(job: &BackupJobConfig) -> Result<String, SynthesisError> {
    let path = job.destination_path.trim();
    match job.destination_type {
        DestinationType::Nfs => Ok(path.to_owned()),
        DestinationType::Sftp => normalize_ssh_url(path),
        destination => Err(SynthesisError::UnsupportedDestination {
            tool: Tool::Borg,
            destination,
        }),
    }
}

/// Rewrites scp-style `user@host:path` into `ssh://user@host/path`.
fn normalize_ssh_url(path: &str) -> Result<String, SynthesisError> {
    if path.starts_with("ssh://") {
        return Ok(path.to_owned());
    }
    let invalid = |reason| SynthesisError::InvalidDestination {
        destination: DestinationType::Sftp,
        path: path.to_owned(),
        reason,
    };
    let path = path.strip_prefix("sftp://").unwrap_or(path);
    let (authority, remote_path) = path
        .split_once(':')
        .ok_or_else(|| invalid("expected user@host:path"))?;
    if authority.is_empty() || remote_path.is_empty() {
        return Err(invalid("expected user@host:path"));
    }
    if let Some(absolute) = remote_path.strip_prefix('/') {
        Ok(format!("ssh://{authority}/{absolute}"))
    } else {
        Ok(format!("ssh://{authority}/./{remote_path}"))
    }
}

fn split_bucket(
    destination: DestinationType,
    path: &str,
) -> Result<(&str, &str), SynthesisError> {
    let trimmed = path.trim_start_matches('/');
    let (bucket, prefix) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if bucket.is_empty() {
        return Err(SynthesisError::InvalidDestination {
            destination,
            path: path.to_owned(),
            reason: "missing bucket name",
        });
    }
    Ok((bucket, prefix.trim_end_matches('/')))
}

fn credential_environment(job: &BackupJobConfig, env: &mut Environment) {
    let credentials = &job.credentials;
    let (access_name, secret_name) = match job.destination_type {
        DestinationType::S3 => {
            if let Some(region) = credentials.region.as_deref().filter(|r| !r.is_empty()) {
                env.set("AWS_DEFAULT_REGION", region);
            }
            ("AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY")
        }
        DestinationType::B2 => ("B2_ACCOUNT_ID", "B2_ACCOUNT_KEY"),
        DestinationType::Azure => ("AZURE_ACCOUNT_NAME", "AZURE_ACCOUNT_KEY"),
        DestinationType::Gcs => ("GOOGLE_PROJECT_ID", "GOOGLE_APPLICATION_CREDENTIALS"),
        DestinationType::Sftp
        | DestinationType::Nfs
        | DestinationType::Gdrive
        | DestinationType::Onedrive => return,
    };
    env.set_opt(access_name, credentials.access_key.as_ref());
    env.set_opt(secret_name, credentials.secret_key.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{DestinationCredentials, RetentionPolicy};

    fn job(tool: Tool, destination_type: DestinationType, path: &str) -> BackupJobConfig {
        BackupJobConfig {
            job_id: "1".to_owned(),
            job_name: "web".to_owned(),
            tool,
            source_paths: vec!["/srv".to_owned()],
            destination_type,
            destination_path: path.to_owned(),
            credentials: DestinationCredentials::default(),
            repo_password: Some("repo-pw".into()),
            retention: RetentionPolicy::default(),
        }
    }

    #[test]
    fn restic_targets_per_destination() {
        let cases = [
            (DestinationType::Nfs, "/mnt/restic", "/mnt/restic"),
            (DestinationType::Sftp, "u@h:/srv/repo", "sftp:u@h:/srv/repo"),
            (DestinationType::S3, "bucket/path", "s3:s3.amazonaws.com/bucket/path"),
            (DestinationType::B2, "bucket/path", "b2:bucket:path"),
            (DestinationType::Gcs, "bucket/path", "gs:bucket:/path"),
            (DestinationType::Azure, "container/path", "azure:container:/path"),
            (DestinationType::Gdrive, "backups/web", "rclone:gdrive:backups/web"),
            (DestinationType::Onedrive, "/backups", "rclone:onedrive:backups"),
        ];
        for (destination, path, expected) in cases {
            let job = job(Tool::Restic, destination, path);
            assert_eq!(restic_repository(&job).unwrap(), expected, "{destination}");
        }
    }

    #[test]
    fn restic_s3_honours_custom_endpoint() {
        let mut job = job(Tool::Restic, DestinationType::S3, "bucket/path");
        job.credentials.endpoint = Some("https://minio.local:9000/".to_owned());
        assert_eq!(
            restic_repository(&job).unwrap(),
            "s3:https://minio.local:9000/bucket/path"
        );
    }

    #[test]
    fn explicit_restic_urls_pass_through() {
        let job = job(Tool::Restic, DestinationType::S3, "s3:example.com/b/p");
        assert_eq!(restic_repository(&job).unwrap(), "s3:example.com/b/p");
    }

    #[test]
    fn bucketless_paths_are_rejected() {
        let job = job(Tool::Restic, DestinationType::B2, "/");
        assert!(matches!(
            restic_repository(&job),
            Err(SynthesisError::InvalidDestination { .. })
        ));
    }

    #[test]
    fn borg_normalizes_scp_style_remotes() {
        let job = job(Tool::Borg, DestinationType::Sftp, "backup@vault:/srv/borg");
        assert_eq!(borg_repository(&job).unwrap(), "ssh://backup@vault/srv/borg");

        let job = self::job(Tool::Borg, DestinationType::Sftp, "backup@vault:borg");
        assert_eq!(borg_repository(&job).unwrap(), "ssh://backup@vault/./borg");

        let job = self::job(Tool::Borg, DestinationType::Sftp, "ssh://b@v:2222/srv");
        assert_eq!(borg_repository(&job).unwrap(), "ssh://b@v:2222/srv");
    }

    #[test]
    fn borg_rejects_object_stores() {
        let job = job(Tool::Borg, DestinationType::S3, "bucket/path");
        assert!(matches!(
            borg_repository(&job),
            Err(SynthesisError::UnsupportedDestination { .. })
        ));
    }

    #[test]
    fn credentials_land_in_environment() {
        let mut job = job(Tool::Restic, DestinationType::S3, "bucket/path");
        job.credentials.access_key = Some("AKIA".into());
        job.credentials.secret_key = Some("s3cr3t".into());
        job.credentials.region = Some("eu-west-1".to_owned());

        let env = repository_environment(&job).unwrap();
        assert_eq!(env.get("AWS_ACCESS_KEY_ID"), Some("AKIA"));
        assert_eq!(env.get("AWS_SECRET_ACCESS_KEY"), Some("s3cr3t"));
        assert_eq!(env.get("AWS_DEFAULT_REGION"), Some("eu-west-1"));
        assert_eq!(env.get("RESTIC_PASSWORD"), Some("repo-pw"));
        assert_eq!(
            env.get("RESTIC_REPOSITORY"),
            Some("s3:s3.amazonaws.com/bucket/path")
        );
    }

    #[test]
    fn borg_environment_uses_passphrase() {
        let job = job(Tool::Borg, DestinationType::Nfs, "/mnt/borg");
        let env = repository_environment(&job).unwrap();
        assert_eq!(env.names().collect::<Vec<_>>(), ["BORG_PASSPHRASE", "BORG_REPO"]);
    }
}
