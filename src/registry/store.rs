//! Sink registry implementation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use super::error::RegistryError;
use crate::sink::{SinkPair, Viewer};

/// Identifier handed out for each installed viewer
pub type ViewerId = u64;

/// Ingest session identifier (one per connection)
pub type SessionId = u64;

struct ViewerSlot {
    id: ViewerId,
    viewer: Arc<dyn Viewer>,
    sinks: SinkPair,
}

#[derive(Default)]
struct Slots {
    viewer: Option<ViewerSlot>,
    holder: Option<SessionId>,
}

/// Proof that a session holds the sink pair
///
/// Not `Clone`: each publish produces exactly one lease. The lease watches
/// the holder slot, so a takeover is visible without taking the lock.
#[derive(Debug)]
pub struct SinkLease {
    session_id: SessionId,
    holder: watch::Receiver<Option<SessionId>>,
}

impl SinkLease {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Fails once another session has bound the sink pair
    pub fn check(&self) -> Result<(), RegistryError> {
        let holder = *self.holder.borrow();
        if holder == Some(self.session_id) {
            Ok(())
        } else {
            Err(RegistryError::Superseded {
                session_id: self.session_id,
                holder,
            })
        }
    }

    /// Resolves when this lease stops holding the sink pair
    pub async fn superseded(&mut self) -> RegistryError {
        let session_id = self.session_id;
        let changed = self
            .holder
            .wait_for(|h| *h != Some(session_id))
            .await
            .map(|holder| *holder);
        match changed {
            Ok(holder) => RegistryError::Superseded { session_id, holder },
            // Registry dropped; nothing can take over any more
            Err(_) => std::future::pending().await,
        }
    }
}

/// Sinks resolved for a lease
#[derive(Debug, Clone)]
pub struct BoundSinks {
    pub viewer_id: ViewerId,
    pub sinks: SinkPair,
}

/// Single-viewer, single-publisher routing table
///
/// One viewer slot and one holder slot, guarded by a single mutex so that
/// replacing the viewer and resolving a lease never interleave.
pub struct SinkRegistry {
    slots: Mutex<Slots>,
    /// Mirrors `Slots::holder`, written under the lock
    holder_tx: watch::Sender<Option<SessionId>>,
    next_viewer_id: AtomicU64,
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            holder_tx: watch::Sender::new(None),
            next_viewer_id: AtomicU64::new(1),
        }
    }

    /// Install a viewer, closing the one it replaces.
    ///
    /// The old viewer is closed before the lock is released, so no session
    /// can resolve the new pair while the old transport is still up.
    pub async fn install_viewer(&self, viewer: Arc<dyn Viewer>) -> ViewerId {
        let id = self.next_viewer_id.fetch_add(1, Ordering::Relaxed);
        let sinks = viewer.sinks();

        let mut slots = self.slots.lock().await;
        if let Some(old) = slots.viewer.take() {
            tracing::info!(old_viewer = old.id, new_viewer = id, "Replacing viewer");
            old.viewer.close().await;
        }
        slots.viewer = Some(ViewerSlot { id, viewer, sinks });

        tracing::info!(viewer = id, holder = ?slots.holder, "Viewer installed");
        id
    }

    /// Remove a viewer whose transport failed. No-op if it was already replaced.
    pub async fn detach_viewer(&self, id: ViewerId) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.viewer.as_ref() {
            Some(slot) if slot.id == id => {}
            _ => return false,
        }

        if let Some(slot) = slots.viewer.take() {
            slot.viewer.close().await;
        }
        tracing::info!(viewer = id, "Viewer detached");
        true
    }

    /// Make `session_id` the holder of the sink pair.
    ///
    /// A previous holder is superseded: its lease reports the takeover and
    /// its session is torn down.
    pub async fn bind(&self, session_id: SessionId) -> SinkLease {
        let mut slots = self.slots.lock().await;
        self.holder_tx.send_replace(Some(session_id));
        if let Some(previous) = slots.holder.replace(session_id) {
            if previous != session_id {
                tracing::info!(
                    session_id = session_id,
                    superseded = previous,
                    "Sink pair taken over"
                );
            }
        } else {
            tracing::debug!(session_id = session_id, "Sink pair bound");
        }
        SinkLease {
            session_id,
            holder: self.holder_tx.subscribe(),
        }
    }

    /// Current sinks for a lease, `None` while no viewer is connected
    pub async fn resolve(&self, lease: &SinkLease) -> Result<Option<BoundSinks>, RegistryError> {
        let slots = self.slots.lock().await;
        match slots.holder {
            Some(holder) if holder == lease.session_id => Ok(slots.viewer.as_ref().map(|v| {
                BoundSinks {
                    viewer_id: v.id,
                    sinks: v.sinks.clone(),
                }
            })),
            other => Err(RegistryError::Superseded {
                session_id: lease.session_id,
                holder: other,
            }),
        }
    }

    /// Give up the sink pair if this lease still holds it
    pub async fn release(&self, lease: SinkLease) {
        let mut slots = self.slots.lock().await;
        if slots.holder == Some(lease.session_id) {
            slots.holder = None;
            self.holder_tx.send_replace(None);
            tracing::debug!(session_id = lease.session_id, "Sink pair released");
        }
    }

    pub async fn viewer_id(&self) -> Option<ViewerId> {
        self.slots.lock().await.viewer.as_ref().map(|v| v.id)
    }

    pub async fn holder(&self) -> Option<SessionId> {
        self.slots.lock().await.holder
    }

    /// Close and remove the viewer, used at shutdown
    pub async fn close_all(&self) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.viewer.take() {
            slot.viewer.close().await;
        }
        slots.holder = None;
        self.holder_tx.send_replace(None);
    }
}
