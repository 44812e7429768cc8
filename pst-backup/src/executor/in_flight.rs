//! Identity of the record the worker is processing.
//!
//! Only the worker writes the slot; observers hold an [`InFlightView`] and
//! compare identities, e.g. to refuse removing the file being uploaded.

use tokio::sync::watch;

use crate::fs::RecordId;

/// Single-slot marker written by the worker
#[derive(Debug)]
pub struct InFlight {
    tx: watch::Sender<Option<RecordId>>,
}

impl InFlight {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn set(&self, id: RecordId) {
        self.tx.send_replace(Some(id));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<RecordId> {
        *self.tx.borrow()
    }

    pub fn view(&self) -> InFlightView {
        InFlightView {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle on an [`InFlight`] slot
#[derive(Debug, Clone)]
pub struct InFlightView {
    rx: watch::Receiver<Option<RecordId>>,
}

impl InFlightView {
    pub fn current(&self) -> Option<RecordId> {
        *self.rx.borrow()
    }

    pub fn is_in_flight(&self, id: RecordId) -> bool {
        self.current() == Some(id)
    }

    /// Wait for the next change. None once the worker is gone.
    pub async fn changed(&mut self) -> Option<Option<RecordId>> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let slot = InFlight::new();
        let view = slot.view();
        let id = RecordId::new();

        assert_eq!(view.current(), None);
        slot.set(id);
        assert!(view.is_in_flight(id));
        assert!(!view.is_in_flight(RecordId::new()));
        assert_eq!(slot.current(), Some(id));

        slot.clear();
        assert_eq!(view.current(), None);
    }

    #[tokio::test]
    async fn test_view_observes_changes() {
        let slot = InFlight::new();
        let mut view = slot.view();
        let id = RecordId::new();

        slot.set(id);
        assert_eq!(view.changed().await, Some(Some(id)));

        drop(slot);
        assert_eq!(view.changed().await, None);
    }
}
