//! crates/logging/src/tracing_macros.rs
//! Convenience macros for backhaul diagnostics.
//!
//! Each macro wraps a standard tracing macro with the target of one
//! subsystem so `BACKHAUL_LOG` directives can select them individually.

/// Emit an SSH session trace.
///
/// # Example
/// ```ignore
/// trace_ssh!("connected to {}", target);
/// ```
#[macro_export]
macro_rules! trace_ssh {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "backhaul::ssh", $($arg)*);
    };
}

/// Emit a command dispatch trace.
///
/// # Example
/// ```ignore
/// trace_cmd!(venue = "remote", "dispatching {}", label);
/// ```
#[macro_export]
macro_rules! trace_cmd {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "backhaul::cmd", $($arg)*);
    };
}

/// Emit a secret resolution trace. Never pass secret material.
#[macro_export]
macro_rules! trace_secrets {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "backhaul::secrets", $($arg)*);
    };
}

/// Emit an engine lifecycle trace.
///
/// # Example
/// ```ignore
/// trace_engine!(job = %job.job_id, "backup finished");
/// ```
#[macro_export]
macro_rules! trace_engine {
    ($($arg:tt)*) => {
        ::tracing::info!(target: "backhaul::engine", $($arg)*);
    };
}

/// Mirror one transcript entry into the diagnostic stream.
#[macro_export]
macro_rules! trace_job {
    ($($arg:tt)*) => {
        ::tracing::trace!(target: "backhaul::job", $($arg)*);
    };
}
