//! One-shot completion slots for synchronous adds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use swarmd_events::TorrentId;
use tokio::sync::oneshot;

/// How a pending synchronous add resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AddOutcome {
    Usable,
    Failed(String),
}

/// Waiter table shared by the facade (register/cancel) and the aggregator
/// (resolve). Resolving never blocks.
#[derive(Clone, Default)]
pub(crate) struct AddWaiters {
    slots: Arc<Mutex<HashMap<TorrentId, oneshot::Sender<AddOutcome>>>>,
}

impl AddWaiters {
    fn slots(&self) -> MutexGuard<'_, HashMap<TorrentId, oneshot::Sender<AddOutcome>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn register(&self, id: &TorrentId) -> oneshot::Receiver<AddOutcome> {
        let (sender, receiver) = oneshot::channel();
        self.slots().insert(id.clone(), sender);
        receiver
    }

    pub(crate) fn is_waiting(&self, id: &TorrentId) -> bool {
        self.slots().contains_key(id)
    }

    pub(crate) fn resolve(&self, id: &TorrentId, outcome: AddOutcome) -> bool {
        self.slots()
            .remove(id)
            .is_some_and(|sender| sender.send(outcome).is_ok())
    }

    pub(crate) fn cancel(&self, id: &TorrentId) {
        self.slots().remove(id);
    }

    pub(crate) fn cancel_all(&self) {
        self.slots().clear();
    }
}
