use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::error::{EngineError, Result};

type Senders = HashMap<String, (u64, broadcast::Sender<()>)>;

/// Tracks in-flight dispatches and batch runs by id so they can be cancelled.
///
/// At most one registration per id exists at a time.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    senders: Arc<Mutex<Senders>>,
    next_token: Arc<AtomicU64>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &str) -> Result<CancelGuard> {
        let mut senders = self.lock();
        if senders.contains_key(id) {
            return Err(EngineError::AlreadyRunning { id: id.to_string() });
        }

        let (tx, rx) = broadcast::channel(1);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        senders.insert(id.to_string(), (token, tx));

        Ok(CancelGuard {
            registry: self.clone(),
            id: id.to_string(),
            token,
            rx,
        })
    }

    pub fn cancel(&self, id: &str) -> bool {
        if let Some((_, tx)) = self.lock().remove(id) {
            let _ = tx.send(());
            return true;
        }
        false
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    fn release(&self, id: &str, token: u64) {
        let mut senders = self.lock();
        if senders.get(id).is_some_and(|(current, _)| *current == token) {
            senders.remove(id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Senders> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Live registration; dropping it frees the id.
pub struct CancelGuard {
    registry: CancelRegistry,
    id: String,
    token: u64,
    rx: broadcast::Receiver<()>,
}

impl CancelGuard {
    pub fn receiver(&mut self) -> &mut broadcast::Receiver<()> {
        &mut self.rx
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        self.registry.release(&self.id, self.token);
    }
}

/// A receiver that never fires.
pub fn uncancellable() -> broadcast::Receiver<()> {
    broadcast::channel(1).1
}

/// Resolves once a cancel signal arrives. A closed channel never resolves.
pub async fn cancelled(cancel_rx: &mut broadcast::Receiver<()>) {
    loop {
        match cancel_rx.recv().await {
            Ok(()) | Err(RecvError::Lagged(_)) => return,
            Err(RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

/// Non-blocking check between batch steps.
pub fn cancel_requested(cancel_rx: &mut broadcast::Receiver<()>) -> bool {
    use tokio::sync::broadcast::error::TryRecvError;

    match cancel_rx.try_recv() {
        Ok(_) | Err(TryRecvError::Lagged(_)) => true,
        Err(TryRecvError::Closed) | Err(TryRecvError::Empty) => false,
    }
}
