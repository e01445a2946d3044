// crates/formstore-core/src/runtime/change_lock.rs
// ============================================================================
// Module: Change Lock
// Description: Non-blocking, per-resource mutual exclusion.
// Purpose: Serialize metadata writers without ever suspending a caller.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! [`ChangeLock::with_lock`] makes exactly one acquisition attempt and then
//! runs the operation once, telling it whether exclusive access was obtained.
//! A caller that loses the race is expected to skip its work for this round.
//! Release is tied to a guard, so it happens on every exit path including
//! unwinding.
//!
//! [`ChangeLockProvider`] hands out one lock per project and table so writers
//! in different projects never contend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use crate::core::ProjectId;

// ============================================================================
// SECTION: Change Lock
// ============================================================================

/// Non-blocking try-lock guarding one logical resource.
///
/// # Invariants
/// - At most one `with_lock` operation observes `acquired == true` at a time.
/// - The lock is free again once that operation returns or unwinds.
#[derive(Debug, Default)]
pub struct ChangeLock {
    /// Set while an operation holds the lock.
    held: AtomicBool,
}

impl ChangeLock {
    /// Creates an unlocked change lock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Attempts to acquire the lock and runs `operation` exactly once.
    ///
    /// `operation` receives `true` when this call holds exclusive access and
    /// `false` when another operation already does. The lock is released
    /// after `operation` returns; when it was never acquired, release is a
    /// no-op.
    pub fn with_lock<T, F>(&self, operation: F) -> T
    where
        F: FnOnce(bool) -> T,
    {
        let guard = self.try_acquire();
        operation(guard.is_some())
    }

    /// Returns true while some operation holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Makes a single acquisition attempt.
    fn try_acquire(&self) -> Option<ChangeLockGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| ChangeLockGuard {
                lock: self,
            })
    }
}

/// Releases the owning lock on drop.
struct ChangeLockGuard<'a> {
    /// Lock held by this guard.
    lock: &'a ChangeLock,
}

impl Drop for ChangeLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}

// ============================================================================
// SECTION: Provider
// ============================================================================

/// Lock map keyed by project.
type LockMap = Mutex<BTreeMap<ProjectId, Arc<ChangeLock>>>;

/// Hands out one [`ChangeLock`] per project for each metadata table.
#[derive(Debug, Default)]
pub struct ChangeLockProvider {
    /// Locks guarding each project's forms table and directory.
    form_locks: LockMap,
    /// Locks guarding each project's instances table.
    instance_locks: LockMap,
}

impl ChangeLockProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock guarding a project's forms.
    #[must_use]
    pub fn form_lock(&self, project_id: &ProjectId) -> Arc<ChangeLock> {
        lock_for(&self.form_locks, project_id)
    }

    /// Returns the lock guarding a project's instances.
    #[must_use]
    pub fn instance_lock(&self, project_id: &ProjectId) -> Arc<ChangeLock> {
        lock_for(&self.instance_locks, project_id)
    }
}

/// Returns the lock registered for `project_id`, creating it on first use.
fn lock_for(locks: &LockMap, project_id: &ProjectId) -> Arc<ChangeLock> {
    let mut guard = locks.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(guard.entry(project_id.clone()).or_default())
}

#[cfg(test)]
mod tests {
    use std::panic;
    use std::sync::Arc;

    use super::ChangeLock;
    use super::ChangeLockProvider;
    use crate::core::ProjectId;

    #[test]
    fn free_lock_is_acquired_and_released() {
        let lock = ChangeLock::new();
        let acquired = lock.with_lock(|acquired| {
            assert!(lock.is_locked());
            acquired
        });
        assert!(acquired);
        assert!(!lock.is_locked());
    }

    #[test]
    fn nested_attempt_is_refused_without_blocking() {
        let lock = ChangeLock::new();
        let (outer, inner) = lock.with_lock(|outer| (outer, lock.with_lock(|inner| inner)));
        assert!(outer);
        assert!(!inner);
        assert!(!lock.is_locked());
    }

    #[test]
    fn refused_attempt_does_not_release_holder() {
        let lock = ChangeLock::new();
        lock.with_lock(|_| {
            lock.with_lock(|acquired| assert!(!acquired));
            assert!(lock.is_locked());
        });
    }

    #[test]
    fn lock_is_released_when_operation_panics() {
        let lock = ChangeLock::new();
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            lock.with_lock(|acquired| assert!(!acquired, "operation failed while holding"));
        }));
        assert!(result.is_err());
        assert!(!lock.is_locked());
        assert!(lock.with_lock(|acquired| acquired));
    }

    #[test]
    fn provider_scopes_locks_per_project_and_table() {
        let provider = ChangeLockProvider::new();
        let demo = ProjectId::new("demo");
        let other = ProjectId::new("other");
        assert!(Arc::ptr_eq(&provider.form_lock(&demo), &provider.form_lock(&demo)));
        assert!(!Arc::ptr_eq(&provider.form_lock(&demo), &provider.form_lock(&other)));
        assert!(!Arc::ptr_eq(&provider.form_lock(&demo), &provider.instance_lock(&demo)));

        let demo_lock = provider.form_lock(&demo);
        let other_lock = provider.form_lock(&other);
        demo_lock.with_lock(|held| {
            assert!(held);
            other_lock.with_lock(|other_held| assert!(other_held));
        });
    }
}
