//! Per-service endpoint resolution
//!
//! A resolver is session state for one `(service, role)` pair: the last
//! primary it saw and the replica round-robin cursor. Every client created
//! for that pair shares it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::directory::Discovery;
use crate::error::{Error, Result};
use crate::transport::Address;

/// Which node of a replicated service a client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Alternate,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Alternate => f.write_str("replica"),
        }
    }
}

#[derive(Default)]
struct ResolverState {
    cached_primary: Option<Address>,
    /// Unset until the first replica lookup
    cursor: Option<usize>,
}

pub struct ServiceEndpointResolver {
    service_name: String,
    role: Role,
    discovery: Arc<Discovery>,
    state: Mutex<ResolverState>,
    /// Bumped whenever the discovered primary differs from the cached one
    epoch: AtomicU64,
}

impl ServiceEndpointResolver {
    pub fn new(service_name: String, role: Role, discovery: Arc<Discovery>) -> Self {
        Self {
            service_name,
            role,
            discovery,
            state: Mutex::new(ResolverState::default()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Topology epoch; connections dialed under an older epoch are stale
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Last primary address this resolver returned
    pub fn cached_primary(&self) -> Option<Address> {
        self.state.lock().cached_primary.clone()
    }

    /// Current primary address, refreshing the sticky cache
    pub async fn resolve_primary(&self) -> Result<Address> {
        self.resolve_primary_tagged().await.map(|(addr, _)| addr)
    }

    /// Like `resolve_primary`, also returning the epoch the address belongs to
    pub(crate) async fn resolve_primary_tagged(&self) -> Result<(Address, u64)> {
        let addr = self.discovery.discover_primary(&self.service_name).await?;

        let mut state = self.state.lock();
        let previous = state.cached_primary.replace(addr.clone());
        if let Some(previous) = previous
            && previous != addr
        {
            log::warn!(
                "Primary for '{}' changed from {} to {}",
                self.service_name,
                previous,
                addr
            );
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }

        Ok((addr, self.epoch.load(Ordering::Acquire)))
    }

    /// Next replica in round-robin order. Once the cursor has walked the
    /// whole list the primary is returned instead and the cursor restarts.
    pub async fn resolve_next_alternate(&self) -> Result<Address> {
        let alternates = self.discovery.discover_alternates(&self.service_name).await;

        {
            let mut state = self.state.lock();
            let mut cursor = state.cursor.unwrap_or(0);
            // List shrank past the cursor: restart from the first replica
            if cursor > alternates.len() {
                cursor = 0;
            }
            if let Some(addr) = alternates.get(cursor) {
                state.cursor = Some(cursor + 1);
                return Ok(addr.clone());
            }
            state.cursor = Some(cursor);
        }

        log::debug!(
            "No fresh replica for '{}', falling back to primary",
            self.service_name
        );
        let fallback = self.resolve_primary().await;
        self.state.lock().cursor = Some(0);

        match fallback {
            Ok(addr) => Ok(addr),
            Err(Error::PrimaryNotFound(_)) => {
                Err(Error::AlternateNotFound(self.service_name.clone()))
            }
            Err(e) => Err(e),
        }
    }
}
