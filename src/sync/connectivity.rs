//! Online/offline signal.

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy)]
struct State {
    online: bool,
    /// Number of offline → online transitions so far.
    reconnects: u64,
}

/// Boolean connectivity source with change notification.
#[derive(Debug)]
pub struct Connectivity {
    tx: watch::Sender<State>,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(State {
            online,
            reconnects: 0,
        });
        Self { tx }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    /// Update the signal. Returns true if the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if state.online == online {
                return false;
            }
            state.online = online;
            if online {
                state.reconnects += 1;
            }
            true
        });
        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    /// Stream of offline → online transitions, starting from now.
    #[must_use]
    pub fn online_edges(&self) -> OnlineEdges {
        let mut rx = self.tx.subscribe();
        let seen = rx.borrow_and_update().reconnects;
        OnlineEdges { rx, seen }
    }
}

/// Edge-triggered "came back online" notifications.
///
/// Several transitions between two calls to [`OnlineEdges::next`] are
/// reported once.
#[derive(Debug)]
pub struct OnlineEdges {
    rx: watch::Receiver<State>,
    seen: u64,
}

impl OnlineEdges {
    /// Wait for the next offline → online transition.
    ///
    /// Returns false once the [`Connectivity`] source is dropped.
    pub async fn next(&mut self) -> bool {
        loop {
            if self.rx.changed().await.is_err() {
                return false;
            }
            let reconnects = self.rx.borrow_and_update().reconnects;
            if reconnects > self.seen {
                self.seen = reconnects;
                return true;
            }
        }
    }
}
