//! Job runners: resolve credentials, connect, operate, and tear the session
//! down.
//!
//! Every runner owns its executor through a [`SessionGuard`]. The guard
//! closes the session on the normal path and, if the runner's future is
//! dropped or unwinds mid-operation, schedules the disconnect on the current
//! runtime. The only session that survives a runner is the pull-mode backup
//! session, which leaves as a [`SessionLease`].

use std::fmt;
use std::sync::Arc;

use logging::trace_engine;
use model::{
    BackupJobConfig, BackupResult, FileEntry, LogKind, RestoreJobConfig, Snapshot,
    SshConnectionConfig, SshEndpoint,
};
use remote::{CommandChannel, LocalProcess, SessionState, SshSession, TimeoutConfig, Transport};
use secrets::{CredentialRequest, CredentialStore, SecretCipher, SecretResolver};
use time::OffsetDateTime;

use crate::config::EngineConfig;
use crate::context::JobContext;
use crate::error::{EngineError, EngineResult};
use crate::executor::BackupExecutor;
use crate::operations;

/// Creates the transports a runner connects through.
pub trait Connector: Send + Sync {
    /// A fresh, disconnected transport for one invocation.
    fn transport(&self, timeouts: TimeoutConfig) -> Box<dyn Transport>;

    /// The channel pull-mode commands run on.
    fn local_channel(&self) -> Box<dyn CommandChannel> {
        Box::new(LocalProcess::new())
    }
}

/// Connects over SSH with [`SshSession`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SshConnector;

impl Connector for SshConnector {
    fn transport(&self, timeouts: TimeoutConfig) -> Box<dyn Transport> {
        Box::new(SshSession::new(timeouts))
    }
}

/// Which party closes a session once the runner returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeardownOwner {
    /// The runner already closed the session.
    Initiator,
    /// The holder of the [`SessionLease`] closes it once the pull completes.
    RemotePuller,
}

/// A connected session handed out by a pull-mode backup.
///
/// Call [`release`](Self::release) once the remote transfer is finished.
/// Dropping an unreleased lease disconnects in the background.
pub struct SessionLease {
    transport: Option<Box<dyn Transport>>,
    target: String,
}

impl SessionLease {
    /// Who is responsible for closing the session.
    #[must_use]
    pub const fn owner(&self) -> TeardownOwner {
        TeardownOwner::RemotePuller
    }

    /// `user@host:port` of the leased session.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether the session is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|transport| transport.is_connected())
    }

    /// Closes the session.
    pub async fn release(mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect().await;
            trace_engine!(host = %self.target, "session lease released");
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            disconnect_in_background(transport, &self.target);
        }
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("target", &self.target)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Outcome of [`JobRunner::run_backup_job`].
#[derive(Debug)]
pub struct BackupRun {
    /// The job result.
    pub result: BackupResult,
    /// The still-open pull-mode session, if any.
    pub lease: Option<SessionLease>,
}

impl BackupRun {
    /// Who closes the session: the lease holder when there is one.
    #[must_use]
    pub fn teardown_owner(&self) -> TeardownOwner {
        self.lease
            .as_ref()
            .map_or(TeardownOwner::Initiator, SessionLease::owner)
    }

    /// Discards the lease, closing any leased session in the background.
    #[must_use]
    pub fn into_result(self) -> BackupResult {
        self.result
    }
}

/// Closes the executor's session on every exit path.
struct SessionGuard {
    executor: BackupExecutor,
    armed: bool,
}

impl SessionGuard {
    const fn new(executor: BackupExecutor) -> Self {
        Self {
            executor,
            armed: true,
        }
    }

    async fn close(&mut self) {
        self.executor.disconnect().await;
        self.armed = false;
    }

    fn into_lease(&mut self, ssh: &SshConnectionConfig) -> SessionLease {
        self.armed = false;
        SessionLease {
            transport: Some(self.executor.take_transport()),
            target: ssh.display_target().to_string(),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.armed {
            let transport = self.executor.take_transport();
            disconnect_in_background(transport, "abandoned job");
        }
    }
}

fn disconnect_in_background(mut transport: Box<dyn Transport>, target: &str) {
    if transport.state() == SessionState::Disconnected {
        return;
    }
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            trace_engine!(host = %target, "closing session in the background");
            runtime.spawn(async move {
                transport.disconnect().await;
            });
        }
        Err(_) => {
            tracing::warn!(target: "backhaul::engine", host = %target, "no runtime to close session; dropping it");
        }
    }
}

/// Resolves the SSH credentials of one invocation and attaches them to
/// `endpoint`.
///
/// Every resolved secret is registered with the redactor of `context`
/// before the configuration is handed out, so the job that receives the
/// context never records them. Unknown key ids and keys no master key
/// decrypts are fatal and surface as [`EngineError::Credentials`]; nothing
/// is connected in that case.
pub async fn resolve_ssh_config<S, C>(
    resolver: &SecretResolver<S, C>,
    endpoint: &SshEndpoint,
    request: &CredentialRequest,
    system_key_id: Option<&str>,
    context: &mut JobContext,
) -> EngineResult<SshConnectionConfig>
where
    S: CredentialStore,
    C: SecretCipher,
{
    let resolved = resolver.resolve(request, system_key_id).await?;
    resolved.register_with(&mut context.redactor);
    trace_engine!(
        host = %endpoint.host,
        protected = context.redactor.len(),
        "ssh credentials resolved"
    );
    Ok(resolved.connect_to(endpoint)?)
}

/// Runs job invocations with one configuration and connector.
#[derive(Clone)]
pub struct JobRunner {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JobRunner {
    /// A runner connecting over SSH.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            connector: Arc::new(SshConnector),
        }
    }

    /// Replaces the connector.
    #[must_use]
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// The runner's configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn guard(&self, pull_mode: bool, context: JobContext) -> SessionGuard {
        let executor = BackupExecutor::new(
            self.connector.transport(self.config.timeouts()),
            pull_mode,
            &self.config,
            context,
        )
        .with_local_channel(self.connector.local_channel());
        SessionGuard::new(executor)
    }

    /// Runs one backup.
    ///
    /// A connection failure yields a failed result with a single
    /// `"Failed to connect to SSH server"` error. Pull-mode jobs return the
    /// open session in [`BackupRun::lease`]; every other job is disconnected
    /// before this returns.
    pub async fn run_backup_job(
        &self,
        ssh: &SshConnectionConfig,
        job: &BackupJobConfig,
        context: JobContext,
    ) -> BackupRun {
        let start_time = OffsetDateTime::now_utc();
        let pull_mode = job.is_pull_mode();
        let mut guard = self.guard(pull_mode, context);
        if !guard.executor.connect(ssh).await {
            guard.armed = false;
            trace_engine!(job = %job.job_id, "backup aborted: connection failed");
            return BackupRun {
                result: BackupResult::connection_failed(start_time, guard.executor.logs().to_vec()),
                lease: None,
            };
        }

        let mut result = operations::execute_backup(&mut guard.executor, job, ssh).await;
        let lease = if pull_mode && guard.executor.is_connected() {
            guard
                .executor
                .log(LogKind::Ssh, "Session stays open for the remote transfer")
                .await;
            Some(guard.into_lease(ssh))
        } else {
            guard.close().await;
            None
        };
        result.logs = guard.executor.logs().to_vec();
        BackupRun { result, lease }
    }

    /// Restores one snapshot. The session is always closed.
    pub async fn run_restore_job(
        &self,
        ssh: &SshConnectionConfig,
        restore: &RestoreJobConfig,
        context: JobContext,
    ) -> BackupResult {
        let start_time = OffsetDateTime::now_utc();
        let mut guard = self.guard(restore.job.is_pull_mode(), context);
        if !guard.executor.connect(ssh).await {
            guard.armed = false;
            return BackupResult::connection_failed(start_time, guard.executor.logs().to_vec());
        }

        let mut result = operations::restore(&mut guard.executor, restore, ssh).await;
        guard.close().await;
        result.logs = guard.executor.logs().to_vec();
        result
    }

    /// Lists the job's snapshots. The session is always closed.
    pub async fn list_job_snapshots(
        &self,
        ssh: &SshConnectionConfig,
        job: &BackupJobConfig,
        context: JobContext,
    ) -> EngineResult<Vec<Snapshot>> {
        let mut guard = self.connected(ssh, job, context).await?;
        let snapshots = operations::list_snapshots(&mut guard.executor, job, ssh).await;
        guard.close().await;
        snapshots
    }

    /// Lists the files of one snapshot. The session is always closed.
    pub async fn list_job_files(
        &self,
        ssh: &SshConnectionConfig,
        job: &BackupJobConfig,
        snapshot_id: &str,
        context: JobContext,
    ) -> EngineResult<Vec<FileEntry>> {
        let mut guard = self.connected(ssh, job, context).await?;
        let entries = operations::list_files(&mut guard.executor, job, ssh, snapshot_id).await;
        guard.close().await;
        entries
    }

    async fn connected(
        &self,
        ssh: &SshConnectionConfig,
        job: &BackupJobConfig,
        context: JobContext,
    ) -> EngineResult<SessionGuard> {
        let mut guard = self.guard(job.is_pull_mode(), context);
        if guard.executor.connect(ssh).await {
            Ok(guard)
        } else {
            guard.armed = false;
            Err(EngineError::ConnectionFailed {
                target: ssh.display_target().to_string(),
            })
        }
    }
}

/// [`JobRunner::run_backup_job`] with configuration from the environment.
pub async fn run_backup_job(
    ssh: &SshConnectionConfig,
    job: &BackupJobConfig,
    context: JobContext,
) -> BackupRun {
    JobRunner::new(EngineConfig::from_env())
        .run_backup_job(ssh, job, context)
        .await
}

/// [`JobRunner::run_restore_job`] with configuration from the environment.
pub async fn run_restore_job(
    ssh: &SshConnectionConfig,
    restore: &RestoreJobConfig,
    context: JobContext,
) -> BackupResult {
    JobRunner::new(EngineConfig::from_env())
        .run_restore_job(ssh, restore, context)
        .await
}

/// [`JobRunner::list_job_snapshots`] with configuration from the environment.
pub async fn list_job_snapshots(
    ssh: &SshConnectionConfig,
    job: &BackupJobConfig,
) -> EngineResult<Vec<Snapshot>> {
    JobRunner::new(EngineConfig::from_env())
        .list_job_snapshots(ssh, job, JobContext::new())
        .await
}

/// [`JobRunner::list_job_files`] with configuration from the environment.
pub async fn list_job_files(
    ssh: &SshConnectionConfig,
    job: &BackupJobConfig,
    snapshot_id: &str,
) -> EngineResult<Vec<FileEntry>> {
    JobRunner::new(EngineConfig::from_env())
        .list_job_files(ssh, job, snapshot_id, JobContext::new())
        .await
}
