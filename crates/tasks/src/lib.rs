//! Task spawning and graceful, hierarchical shutdown for reth.
//!
//! Two independent pieces live here:
//!
//! - [`TaskSpawner`]/[`TokioTaskExecutor`]: a thin, object-safe spawn
//!   abstraction so library crates don't have to hardcode `tokio::spawn`.
//! - [`GracefulShutdown`]: a wait-group over a hierarchy of cancellation
//!   tokens, for components (like the sync coordinator) that own a
//!   dynamically changing set of child tasks and need `close()` to block
//!   until every one of them has actually exited.

#![warn(missing_docs, unreachable_pub)]

use std::{fmt, future::Future, pin::Pin};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A future that resolves to nothing, boxed for storage in a trait object.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Spawns futures onto some executor.
///
/// Abstracts over `tokio::spawn` so crates that need to spawn tasks don't
/// have to depend on a particular runtime flavor, and so tests can swap in
/// a spawner that tracks what was spawned.
pub trait TaskSpawner: fmt::Debug + Send + Sync + Unpin {
    /// Spawns the future to run in the background, returning a handle.
    fn spawn(&self, fut: BoxFuture) -> JoinHandle<()>;

    /// Spawns a critical task: one whose premature exit should be treated
    /// as noteworthy by the caller (logged loudly), unlike an ordinary
    /// task, which is expected to come and go.
    fn spawn_critical(&self, name: &'static str, fut: BoxFuture) -> JoinHandle<()>;
}

/// A [`TaskSpawner`] that spawns directly onto the ambient tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTaskExecutor;

impl TaskSpawner for TokioTaskExecutor {
    fn spawn(&self, fut: BoxFuture) -> JoinHandle<()> {
        tokio::spawn(fut)
    }

    fn spawn_critical(&self, name: &'static str, fut: BoxFuture) -> JoinHandle<()> {
        tokio::spawn(async move {
            fut.await;
            tracing::debug!(target: "tasks", task = name, "critical task exited");
        })
    }
}

/// A hierarchy of cancellation handles plus a wait-group, for components
/// that spawn a dynamically changing number of child tasks and need to
/// know, deterministically, when all of them have exited.
///
/// The root token is never handed out directly: callers derive a
/// [`CancellationToken::child_token`] per spawned task via
/// [`GracefulShutdown::child_token`]. Cancelling the root cancels every
/// child transitively; cancelling one child cancels only that task.
#[derive(Debug)]
pub struct GracefulShutdown {
    root: CancellationToken,
    tasks: tokio::task::JoinSet<()>,
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl GracefulShutdown {
    /// Creates a fresh shutdown hierarchy with an uncancelled root.
    pub fn new() -> Self {
        Self { root: CancellationToken::new(), tasks: tokio::task::JoinSet::new() }
    }

    /// Returns a cancellation handle derived from the root, suitable for
    /// handing to one spawned task. Cancelling the root cancels this
    /// handle too; cancelling this handle alone cancels only its task.
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Returns the root cancellation token itself, for callers that only
    /// need to observe root-level cancellation (e.g. a main loop's own
    /// `select!`) without registering a tracked task.
    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Tracks a spawned task so [`GracefulShutdown::shutdown`] waits for
    /// it to exit.
    pub fn track(&mut self, fut: impl Future<Output = ()> + Send + 'static) {
        self.tasks.spawn(fut);
    }

    /// `true` once the root cancellation has fired.
    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Cancels the root token and waits for every tracked task to exit.
    ///
    /// Idempotent-ish: calling this on an already-cancelled hierarchy just
    /// waits out whatever tasks remain.
    pub async fn shutdown(&mut self) {
        self.root.cancel();
        while self.tasks.join_next().await.is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_waits_for_all_children() {
        let mut shutdown = GracefulShutdown::new();
        let exited = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let token = shutdown.child_token();
            let exited = exited.clone();
            shutdown.track(async move {
                token.cancelled().await;
                exited.fetch_add(1, Ordering::SeqCst);
            });
        }

        shutdown.shutdown().await;
        assert_eq!(exited.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn per_child_cancellation_is_independent() {
        let shutdown = GracefulShutdown::new();
        let a = shutdown.child_token();
        let b = shutdown.child_token();

        a.cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!shutdown.is_cancelled());
    }
}
