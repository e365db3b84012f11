//! Ownership Coordinator
//!
//! Claims a selection for the daemon's window and verifies the claim by
//! reading the owner back.
//!
//! Claim-then-verify is two separate requests. Another client can claim the
//! same selection between them (or right after the verify), so a successful
//! claim is a best-effort guarantee only. A lost race surfaces as
//! [`SyncError::OwnershipClaimFailed`]; it is never assumed away.

use crate::clipboard::error::{Result, SyncError};
use crate::clipboard::registry::SelectionRegistry;
use crate::clipboard::service::{Atom, SelectionService, Timestamp, Window};
use tracing::{debug, warn};

/// Claims selections on behalf of the daemon
#[derive(Debug, Clone, Copy)]
pub struct OwnershipCoordinator {
    window: Window,
}

impl OwnershipCoordinator {
    /// Coordinator claiming for `window`
    pub fn new(window: Window) -> Self {
        Self { window }
    }

    /// The daemon's window
    pub fn window(&self) -> Window {
        self.window
    }

    /// Claim `selection` and confirm the daemon ended up owning it
    ///
    /// The registry's owner record is updated with whatever owner the
    /// verification observed.
    pub fn claim<S: SelectionService + ?Sized>(
        &self,
        service: &mut S,
        registry: &mut SelectionRegistry,
        selection: Atom,
        timestamp: Timestamp,
    ) -> Result<Window> {
        let name = registry
            .lookup_by_id(selection)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("0x{selection:x}"));

        let owner = service
            .claim_owner(selection, timestamp)
            .and_then(|()| service.current_owner(selection))
            .map_err(|e| {
                if e.is_fatal() {
                    return e;
                }
                warn!("Claiming {} failed: {}", name, e);
                SyncError::OwnershipClaimFailed {
                    selection: name.clone(),
                    owner: None,
                }
            })?;

        if owner != Some(self.window) {
            registry.record_owner(selection, owner, None);
            return Err(SyncError::OwnershipClaimFailed {
                selection: name,
                owner,
            });
        }

        registry.record_owner(selection, owner, Some(timestamp));
        debug!("Daemon window 0x{:x} now owns {}", self.window, name);

        Ok(self.window)
    }
}
