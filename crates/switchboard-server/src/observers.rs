//! The observer set behind the `/compliance` channel.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Manages connected observer sessions and fan-out delivery.
///
/// Membership changes only on connect/disconnect; there is no ordering
/// among members. Delivery is independent per observer: one dead peer is
/// removed without blocking or failing delivery to the others.
#[derive(Clone, Default)]
pub struct ObserverManager {
    observers: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
}

impl ObserverManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer and returns its session id.
    pub async fn add(&self, sender: mpsc::Sender<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.observers.write().await.insert(id, sender);
        id
    }

    /// Removes an observer (disconnect path).
    pub async fn remove(&self, id: Uuid) {
        self.observers.write().await.remove(&id);
    }

    pub async fn count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Sends an already-serialized message to every connected observer.
    ///
    /// Returns the number of observers successfully delivered to. Observers
    /// whose channel has closed are removed from the set; a merely slow
    /// observer keeps its membership but misses this message.
    pub async fn broadcast(&self, message: String) -> usize {
        let mut delivered = 0;
        let mut disconnected: Vec<Uuid> = Vec::new();

        {
            let observers = self.observers.read().await;
            for (id, sender) in observers.iter() {
                match sender.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Closed(_)) => disconnected.push(*id),
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(observer = %id, "dropping event for slow observer");
                    }
                }
            }
        }

        if !disconnected.is_empty() {
            let mut observers = self.observers.write().await;
            for id in disconnected {
                observers.remove(&id);
                tracing::info!(observer = %id, "removed dead observer during broadcast");
            }
        }

        delivered
    }
}
