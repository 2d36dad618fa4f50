//! Single-slot mailbox for the follow-up action requested while a job runs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferredAction {
    #[default]
    None,
    RerunSameSize,
    RerunNewVariationOrSize,
    OpenSizeDialog,
    SaveRasterImage,
    SaveMovie,
    CloseWindow,
    ExitApplication,
}

impl DeferredAction {
    /// Closing actions supersede everything else once they are pending.
    pub fn is_closing(self) -> bool {
        matches!(self, DeferredAction::CloseWindow | DeferredAction::ExitApplication)
    }
}

/// Holds at most one action. Latest request wins, except that a lesser action
/// never replaces a pending close or exit, and a close never replaces an exit.
#[derive(Debug, Default)]
pub(crate) struct ActionSlot {
    pending: DeferredAction,
}

impl ActionSlot {
    /// Returns the value now in the slot.
    pub fn offer(&mut self, action: DeferredAction) -> DeferredAction {
        if action == DeferredAction::None {
            return self.pending;
        }
        if self.pending.is_closing() && !action.is_closing() {
            tracing::debug!(pending = ?self.pending, rejected = ?action, "closing action keeps the slot");
            return self.pending;
        }
        if self.pending == DeferredAction::ExitApplication {
            return self.pending;
        }
        self.pending = action;
        self.pending
    }

    pub fn peek(&self) -> DeferredAction {
        self.pending
    }

    pub fn take(&mut self) -> DeferredAction {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_request_wins() {
        let mut slot = ActionSlot::default();
        slot.offer(DeferredAction::SaveMovie);
        slot.offer(DeferredAction::RerunSameSize);
        assert_eq!(slot.peek(), DeferredAction::RerunSameSize);
    }

    #[test]
    fn close_is_never_overwritten_by_a_lesser_action() {
        let mut slot = ActionSlot::default();
        slot.offer(DeferredAction::CloseWindow);
        assert_eq!(
            slot.offer(DeferredAction::SaveRasterImage),
            DeferredAction::CloseWindow
        );
        assert_eq!(slot.peek(), DeferredAction::CloseWindow);
    }

    #[test]
    fn close_replaces_a_pending_lesser_action() {
        let mut slot = ActionSlot::default();
        slot.offer(DeferredAction::SaveRasterImage);
        slot.offer(DeferredAction::CloseWindow);
        assert_eq!(slot.peek(), DeferredAction::CloseWindow);
    }

    #[test]
    fn exit_upgrades_a_pending_close() {
        let mut slot = ActionSlot::default();
        slot.offer(DeferredAction::CloseWindow);
        slot.offer(DeferredAction::ExitApplication);
        assert_eq!(slot.peek(), DeferredAction::ExitApplication);
        slot.offer(DeferredAction::OpenSizeDialog);
        assert_eq!(slot.peek(), DeferredAction::ExitApplication);
    }

    #[test]
    fn close_does_not_downgrade_a_pending_exit() {
        let mut slot = ActionSlot::default();
        slot.offer(DeferredAction::ExitApplication);
        assert_eq!(
            slot.offer(DeferredAction::CloseWindow),
            DeferredAction::ExitApplication
        );
        assert_eq!(slot.take(), DeferredAction::ExitApplication);
    }

    #[test]
    fn offering_none_keeps_the_pending_action() {
        let mut slot = ActionSlot::default();
        slot.offer(DeferredAction::SaveMovie);
        slot.offer(DeferredAction::None);
        assert_eq!(slot.take(), DeferredAction::SaveMovie);
        assert_eq!(slot.peek(), DeferredAction::None);
    }
}
