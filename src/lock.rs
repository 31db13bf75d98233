//! Per-case single-flight guard.
//!
//! At most one consolidation may be in flight per case. A second attempt is
//! rejected immediately rather than queued, and runs for different cases
//! never wait on each other: the set is only locked for the duration of an
//! insert or remove.

use crate::model::CaseId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// The set of cases currently being consolidated.
#[derive(Debug, Clone, Default)]
pub struct CaseLocks {
    held: Arc<Mutex<HashSet<CaseId>>>,
}

impl CaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `case_id`, or `None` if another run already holds it.
    ///
    /// The claim is released when the returned guard is dropped, including
    /// when the owning future is cancelled.
    pub fn try_acquire(&self, case_id: CaseId) -> Option<CaseLockGuard> {
        if self.set().insert(case_id) {
            Some(CaseLockGuard {
                held: Arc::clone(&self.held),
                case_id,
            })
        } else {
            None
        }
    }

    pub fn is_held(&self, case_id: CaseId) -> bool {
        self.set().contains(&case_id)
    }

    // Insert/remove cannot leave the set half-updated, so a poisoned lock is
    // still consistent.
    fn set(&self) -> MutexGuard<'_, HashSet<CaseId>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// RAII claim on one case.
#[derive(Debug)]
pub struct CaseLockGuard {
    held: Arc<Mutex<HashSet<CaseId>>>,
    case_id: CaseId,
}

impl CaseLockGuard {
    pub fn case_id(&self) -> CaseId {
        self.case_id
    }
}

impl Drop for CaseLockGuard {
    fn drop(&mut self) {
        let mut set = self.held.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.case_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let locks = CaseLocks::new();
        let guard = locks.try_acquire(CaseId(1)).expect("first claim");
        assert!(locks.try_acquire(CaseId(1)).is_none());
        assert!(locks.is_held(CaseId(1)));
        drop(guard);
        assert!(!locks.is_held(CaseId(1)));
        assert!(locks.try_acquire(CaseId(1)).is_some());
    }

    #[test]
    fn different_cases_are_independent() {
        let locks = CaseLocks::new();
        let _a = locks.try_acquire(CaseId(1)).unwrap();
        let b = locks.try_acquire(CaseId(2)).unwrap();
        assert_eq!(b.case_id(), CaseId(2));
    }

    #[test]
    fn clones_share_state() {
        let locks = CaseLocks::new();
        let other = locks.clone();
        let _g = locks.try_acquire(CaseId(7)).unwrap();
        assert!(other.try_acquire(CaseId(7)).is_none());
    }
}
