use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Active {
    next_id: u64,
    current: Option<(u64, CancellationToken)>,
}

/// Holds the one cancellation token of the generation currently in flight.
///
/// Starting a generation cancels the previous one, so at most one stream is
/// ever live. Cloning shares the slot.
#[derive(Clone, Default)]
pub struct GenerationSlot {
    active: Arc<Mutex<Active>>,
}

impl GenerationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels whatever is running and installs a fresh token.
    pub fn begin(&self) -> GenerationHandle {
        let mut active = self.lock();
        if let Some((id, previous)) = active.current.take() {
            log::info!("Stopping generation #{} to start a new one", id);
            previous.cancel();
        }

        active.next_id += 1;
        let id = active.next_id;
        let token = CancellationToken::new();
        active.current = Some((id, token.clone()));
        log::debug!("Generation #{} started", id);

        GenerationHandle {
            id,
            token,
            slot: self.clone(),
        }
    }

    /// Cancels the active generation. Returns false when nothing was running.
    pub fn stop(&self) -> bool {
        match self.lock().current.take() {
            Some((id, token)) => {
                log::info!("Generation #{} stopped by user", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().current.is_some()
    }

    fn release(&self, id: u64) {
        let mut active = self.lock();
        if matches!(&active.current, Some((current, _)) if *current == id) {
            active.current = None;
            log::debug!("Generation #{} released", id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Active> {
        // The guarded state stays consistent even if a holder panicked.
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Ownership of the active generation; dropping it frees the slot.
pub struct GenerationHandle {
    id: u64,
    token: CancellationToken,
    slot: GenerationSlot,
}

impl GenerationHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for GenerationHandle {
    fn drop(&mut self) {
        self.slot.release(self.id);
    }
}
