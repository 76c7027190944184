//! Severity-tagged logging sink consumed by the log core.
//!
//! The core never reaches for a global logger or for `tracing`'s thread-local
//! subscriber directly: every [`crate::raft_log::RaftLog`] is handed a `Logger`
//! at construction, the same way it is handed its [`crate::storage::Storage`].

/// Capability interface for the five severities the core can emit.
///
/// `fatal` indicates a violated invariant or corrupted state, never a runtime
/// condition a caller could recover from. Implementations MUST NOT return from
/// `fatal` — the default [`TracingLogger`] logs at `error` and then panics, which
/// aborts the process once unwinding reaches `main` (or, in a `panic = "abort"`
/// release profile, immediately).
pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);

    /// Diverges. See the trait-level docs.
    fn fatal(&self, msg: &str) -> ! {
        self.error(msg);
        panic!("{msg}");
    }
}

/// Default [`Logger`] backed by the `tracing` crate, at the crate's own target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, msg: &str) {
        tracing::debug!(target: "raft_log", "{msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!(target: "raft_log", "{msg}");
    }

    fn warn(&self, msg: &str) {
        tracing::warn!(target: "raft_log", "{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!(target: "raft_log", "{msg}");
    }
}
