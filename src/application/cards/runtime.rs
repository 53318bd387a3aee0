use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

/// Tracks cards that currently have an export running.
#[derive(Default, Clone)]
pub struct InFlightExports {
    cards: Arc<DashMap<Uuid, ()>>,
}

#[derive(Debug, Error)]
pub enum InFlightError {
    #[error("export already in progress for card {card_id}")]
    AlreadyRunning { card_id: Uuid },
}

impl InFlightExports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, card_id: Uuid) -> Result<ExportGuard, InFlightError> {
        use dashmap::mapref::entry::Entry;

        match self.cards.entry(card_id) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Ok(ExportGuard {
                    card_id,
                    cards: Arc::clone(&self.cards),
                })
            }
            Entry::Occupied(_) => Err(InFlightError::AlreadyRunning { card_id }),
        }
    }

    pub fn is_running(&self, card_id: Uuid) -> bool {
        self.cards.contains_key(&card_id)
    }
}

/// Releases the card's export slot when dropped, on every exit path.
pub struct ExportGuard {
    card_id: Uuid,
    cards: Arc<DashMap<Uuid, ()>>,
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.cards.remove(&self.card_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_rejected_until_drop() {
        let exports = InFlightExports::new();
        let id = Uuid::new_v4();

        let guard = exports.acquire(id).unwrap();
        assert!(exports.is_running(id));
        assert!(matches!(
            exports.acquire(id),
            Err(InFlightError::AlreadyRunning { card_id }) if card_id == id
        ));

        drop(guard);
        assert!(!exports.is_running(id));
        assert!(exports.acquire(id).is_ok());
    }

    #[test]
    fn guard_is_released_on_panic() {
        let exports = InFlightExports::new();
        let id = Uuid::new_v4();

        let cloned = exports.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.acquire(id).unwrap();
            panic!("rasterizer blew up");
        }));

        assert!(outcome.is_err());
        assert!(!exports.is_running(id));
    }

    #[test]
    fn cards_are_independent() {
        let exports = InFlightExports::new();
        let _a = exports.acquire(Uuid::new_v4()).unwrap();
        assert!(exports.acquire(Uuid::new_v4()).is_ok());
    }
}
