mod support;

use engine::{EngineError, JobContext, resolve_ssh_config};
use logging::REDACTED;
use model::{DestinationType, Secret, SshAuth, SshEndpoint, Tool};
use remote::OutputEvent;
use secrets::{
    CipherError, CredentialRequest, KeyRing, LEGACY_MASTER_KEY, MasterKey, MemoryCredentialStore,
    SecretCipher, SecretError, SecretResolver, StoredSshKey,
};
use support::{PRIVATE_KEY, Reply, SSH_PASSWORD, Script, job, quick_config};

const PASSPHRASE: &str = "unlock-Pa55phrase";

/// Prefixes payloads with the master secret; any other key fails to decrypt.
struct TaggingCipher;

impl SecretCipher for TaggingCipher {
    fn encrypt(&self, plaintext: &str, key: &MasterKey) -> Result<String, CipherError> {
        Ok(format!("enc:{}:{plaintext}", key.secret().expose()))
    }

    fn decrypt(&self, payload: &str, key: &MasterKey) -> Result<Secret, CipherError> {
        payload
            .strip_prefix(&format!("enc:{}:", key.secret().expose()))
            .map(Secret::from)
            .ok_or_else(|| CipherError::new("tag mismatch"))
    }
}

fn sealed(master: &MasterKey, passphrase: Option<&str>) -> StoredSshKey {
    StoredSshKey {
        private_key_data: TaggingCipher.encrypt(PRIVATE_KEY, master).unwrap().into(),
        passphrase: passphrase.map(|value| TaggingCipher.encrypt(value, master).unwrap().into()),
        is_encrypted: true,
    }
}

fn resolver(store: MemoryCredentialStore) -> SecretResolver<MemoryCredentialStore, TaggingCipher> {
    let ring = KeyRing::with_legacy_fallback(MasterKey::new("current", 2, "rotated-master"));
    SecretResolver::new(store, TaggingCipher, ring)
}

fn endpoint() -> SshEndpoint {
    SshEndpoint::new("web1", 2222, "backup")
}

const RESTIC_SUMMARY: &str =
    "{\"message_type\":\"summary\",\"total_files_processed\":3,\"total_bytes_processed\":900}\n";

#[tokio::test]
async fn system_key_resolves_into_a_connected_backup() {
    let legacy = MasterKey::from(LEGACY_MASTER_KEY);
    let store = MemoryCredentialStore::new().with_key("7", sealed(&legacy, Some(PASSPHRASE)));
    let mut context = JobContext::new();

    let ssh = resolve_ssh_config(
        &resolver(store),
        &endpoint(),
        &CredentialRequest::default(),
        Some("7"),
        &mut context,
    )
    .await
    .unwrap();
    match ssh.auth() {
        SshAuth::PrivateKey { key, passphrase } => {
            assert_eq!(key.expose(), PRIVATE_KEY);
            assert_eq!(passphrase.as_ref().map(Secret::expose), Some(PASSPHRASE));
        }
        SshAuth::Password(_) => panic!("expected key auth"),
    }
    assert!(context.redactor.len() >= 2);

    let script = Script::accepting()
        .reply(Reply {
            events: vec![
                OutputEvent::Stderr(format!("key passphrase {PASSPHRASE} accepted\n").into_bytes()),
                OutputEvent::Stdout(RESTIC_SUMMARY.as_bytes().to_vec()),
                OutputEvent::Exit(Some(0)),
            ],
            hang: false,
        })
        .reply(Reply::exit(0));
    let job = job(Tool::Restic, DestinationType::S3, "bucket/path");
    let run = script
        .runner(quick_config())
        .run_backup_job(&ssh, &job, context)
        .await;

    assert!(run.result.success, "{:?}", run.result.errors);
    assert_eq!(run.result.files_processed, Some(3));
    assert_eq!(script.logins(), ["backup@web1:2222 publickey"]);
    assert_eq!(script.disconnects(), 1);
    assert!(
        run.result
            .logs
            .iter()
            .all(|log| !log.message.contains(PASSPHRASE))
    );
    let masked = format!("key passphrase {REDACTED} accepted");
    assert!(run.result.logs.iter().any(|log| log.message == masked));
}

#[tokio::test]
async fn unknown_key_id_fails_before_connecting() {
    let mut context = JobContext::new();
    let request = CredentialRequest {
        ssh_key_id: Some("99".to_owned()),
        password: Some(Secret::new(SSH_PASSWORD)),
        ..CredentialRequest::default()
    };

    let error = resolve_ssh_config(
        &resolver(MemoryCredentialStore::new()),
        &endpoint(),
        &request,
        None,
        &mut context,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        &error,
        EngineError::Credentials(SecretError::CredentialNotFound { id }) if id == "99"
    ));
    assert!(context.redactor.is_empty());
}

#[tokio::test]
async fn undecryptable_key_is_fatal_and_leaks_nothing() {
    let foreign = MasterKey::new("foreign", 9, "someone-else");
    let store = MemoryCredentialStore::new().with_key("3", sealed(&foreign, None));
    let request = CredentialRequest {
        ssh_key_id: Some("3".to_owned()),
        ..CredentialRequest::default()
    };

    let error = resolve_ssh_config(
        &resolver(store),
        &endpoint(),
        &request,
        None,
        &mut JobContext::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        &error,
        EngineError::Credentials(SecretError::DecryptionFailed { attempts: 2, .. })
    ));
    let message = error.to_string();
    assert!(message.starts_with("credential resolution failed: "));
    assert!(!message.contains("AAAAfakekey"));
}

#[tokio::test]
async fn inline_password_is_protected_for_the_job() {
    let mut context = JobContext::new();
    let request = CredentialRequest {
        password: Some(Secret::new(SSH_PASSWORD)),
        ..CredentialRequest::default()
    };

    let ssh = resolve_ssh_config(
        &resolver(MemoryCredentialStore::new()),
        &endpoint(),
        &request,
        Some("7"),
        &mut context,
    )
    .await
    .unwrap();

    assert!(matches!(ssh.auth(), SshAuth::Password(password) if password.expose() == SSH_PASSWORD));
    assert_eq!(ssh.display_target().to_string(), "backup@web1:2222");
    assert_eq!(context.redactor.redact(SSH_PASSWORD), REDACTED);
}
