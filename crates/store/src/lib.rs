//! hubsync store: single-slot holder for the latest extracted manifest facts.

#![forbid(unsafe_code)]

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use hubsync_core::ManifestFacts;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

/// One published value. `epoch` counts writes since the store was created, starting at 1.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub epoch: u64,
    pub facts: ManifestFacts,
}

struct Shared {
    slot: ArcSwapOption<StatusSnapshot>,
    epoch_tx: watch::Sender<u64>,
}

/// Create an empty store, returning its only writer and a clonable reader.
pub fn status_store() -> (StatusPublisher, StatusReader) {
    let (epoch_tx, _) = watch::channel(0u64);
    let shared = Arc::new(Shared { slot: ArcSwapOption::empty(), epoch_tx });
    (StatusPublisher { shared: Arc::clone(&shared) }, StatusReader { shared })
}

/// Write half. Not `Clone`: the manifest extractor is the only writer.
pub struct StatusPublisher {
    shared: Arc<Shared>,
}

impl StatusPublisher {
    /// Replace the slot wholesale. Returns the epoch of the new value.
    pub fn set(&self, facts: ManifestFacts) -> u64 {
        let mut epoch = 0;
        self.shared.slot.rcu(|cur| {
            epoch = cur.as_ref().map_or(0, |s| s.epoch) + 1;
            Some(Arc::new(StatusSnapshot { epoch, facts: facts.clone() }))
        });
        // Racing writers may reach here out of order; the channel only moves forward.
        self.shared.epoch_tx.send_if_modified(|cur| {
            if epoch > *cur {
                *cur = epoch;
                true
            } else {
                false
            }
        });
        metrics::counter!("status_store_writes_total", 1u64);
        debug!(epoch, "status store updated");
        epoch
    }

    pub fn reader(&self) -> StatusReader {
        StatusReader { shared: Arc::clone(&self.shared) }
    }
}

/// Read half; cheap to clone and hand to any collaborator.
#[derive(Clone)]
pub struct StatusReader {
    shared: Arc<Shared>,
}

impl StatusReader {
    /// Latest snapshot, or `None` before the first successful sync.
    pub fn get(&self) -> Option<Arc<StatusSnapshot>> {
        self.shared.slot.load_full()
    }

    pub fn facts(&self) -> Option<ManifestFacts> {
        self.get().map(|s| s.facts.clone())
    }

    /// Receiver that observes the epoch of every write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.epoch_tx.subscribe()
    }
}
