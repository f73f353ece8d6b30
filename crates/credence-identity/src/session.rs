//! Bounded pool of tenant sessions.
//!
//! A session is the execution context a tenant operation holds while it talks
//! to the custodian. The pool caps how many are open at once; callers that
//! cannot get one within the acquisition timeout fail fast.

use std::sync::Arc;
use std::time::Duration;

use credence_core::TenantId;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::IdentityError;

pub struct SessionPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: Duration,
}

impl SessionPool {
    pub fn new(capacity: usize, acquire_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            acquire_timeout,
        }
    }

    /// Open a session for `tenant_id`. Released when the guard drops.
    pub async fn acquire(&self, tenant_id: &TenantId) -> Result<TenantSession, IdentityError> {
        let timeout_ms = self.acquire_timeout.as_millis() as u64;
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                tracing::warn!(tenant = %tenant_id, timeout_ms, "tenant session acquisition timed out");
                IdentityError::SessionUnavailable { timeout_ms }
            })?
            .map_err(|_| IdentityError::SessionUnavailable { timeout_ms })?;

        tracing::trace!(tenant = %tenant_id, available = self.available(), "tenant session opened");
        Ok(TenantSession {
            tenant_id: tenant_id.clone(),
            _permit: permit,
        })
    }

    /// Sessions that can be opened right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Scoped tenant session. Dropping it returns the slot to the pool.
#[derive(Debug)]
pub struct TenantSession {
    tenant_id: TenantId,
    _permit: OwnedSemaphorePermit,
}

impl TenantSession {
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }
}
