//! Per-request edit tokens and cancellation

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

/// Identity and liveness of one edit request.
///
/// Clones share the cancelled flag. The orchestrator checks it before the
/// commit step; once cancelled, a late edit plan is discarded.
#[derive(Debug, Clone)]
pub struct EditToken {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
}

impl EditToken {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Guard that cancels this token when dropped, unless disarmed.
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            token: Some(self.clone()),
        }
    }
}

impl Default for EditToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels its token on drop, e.g. when a client abandons an HTTP request
pub struct CancelOnDrop {
    token: Option<EditToken>,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.token = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            if !token.is_cancelled() {
                tracing::info!("Edit request {} abandoned by caller", token.id());
            }
            token.cancel();
        }
    }
}

/// In-flight tokens by id, so a caller can cancel by id alone
#[derive(Default)]
pub struct TokenRegistry {
    tokens: Mutex<HashMap<Uuid, EditToken>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for `id` (or a fresh id). An id already in flight is refused.
    pub fn issue(&self, id: Option<Uuid>) -> Option<EditToken> {
        let token = id.map(EditToken::with_id).unwrap_or_default();
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        if tokens.contains_key(&token.id()) {
            return None;
        }
        tokens.insert(token.id(), token.clone());
        Some(token)
    }

    /// Cancel the token for `id`. Returns whether one was in flight.
    pub fn cancel(&self, id: Uuid) -> bool {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        match tokens.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a finished request.
    pub fn release(&self, id: Uuid) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.remove(&id);
    }

    pub fn in_flight(&self) -> usize {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
