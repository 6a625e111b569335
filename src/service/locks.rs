//! Per-session mutual exclusion.
//!
//! Every mutating sequence that reads session-scoped state and then
//! conditionally writes (join cap + host claim, submit + completion
//! check, restart, leave) must execute as a single atomic unit per
//! session. Sessions evolve independently, so a mutex keyed by session
//! code is sufficient — no global lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::SessionCode;

/// Keyed async mutexes, one per live session.
///
/// Guards are owned ([`OwnedMutexGuard`]) so critical sections can span
/// awaits without borrowing the lock table. Entries are purged on
/// session teardown.
#[derive(Debug, Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<SessionCode, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the session's lock, creating it on first use.
    pub async fn lock(&self, code: &SessionCode) -> OwnedMutexGuard<()> {
        let cell = {
            let mut table = self.inner.lock().await;
            Arc::clone(
                table
                    .entry(code.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        cell.lock_owned().await
    }

    /// Drops the session's lock entry (session deleted or expired).
    ///
    /// In-flight guards stay valid; they hold their own `Arc`.
    pub async fn purge(&self, code: &SessionCode) {
        self.inner.lock().await.remove(code);
    }

    /// Number of tracked sessions (for tests and observability).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Returns `true` if no session locks are tracked.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn lock_serializes_critical_sections() {
        let locks = Arc::new(SessionLocks::new());
        let code = SessionCode::generate();
        let counter = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let code = code.clone();
            let counter = Arc::clone(&counter);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&code).await;
                let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(inside, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_sessions_do_not_contend() {
        let locks = SessionLocks::new();
        let a = SessionCode::generate();
        let b = SessionCode::generate();
        let _guard_a = locks.lock(&a).await;
        // Must not deadlock.
        let _guard_b = locks.lock(&b).await;
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn purge_removes_entry() {
        let locks = SessionLocks::new();
        let code = SessionCode::generate();
        drop(locks.lock(&code).await);
        locks.purge(&code).await;
        assert!(locks.is_empty().await);
    }
}
