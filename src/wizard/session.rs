use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::utils::error::{AppError, Result};

/// Owners with a wizard in progress. At most one session per owner.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the owner's slot, or fails with `SessionActive` without
    /// touching the session already running.
    pub fn try_begin(&self, owner_id: &str) -> Result<SessionGuard> {
        if !self.lock().insert(owner_id.to_string()) {
            return Err(AppError::SessionActive {
                owner: owner_id.to_string(),
            });
        }

        tracing::debug!("Wizard session opened for {}", owner_id);
        Ok(SessionGuard {
            owner_id: owner_id.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_active(&self, owner_id: &str) -> bool {
        self.lock().contains(owner_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set is always left consistent, so a poisoned lock is still usable
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the owner's slot when dropped.
#[derive(Debug)]
pub struct SessionGuard {
    owner_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionGuard {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.owner_id);
        tracing::debug!("Wizard session closed for {}", self.owner_id);
    }
}
