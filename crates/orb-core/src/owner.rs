use chrono::Utc;

use crate::domain::{OwnerSlot, Sender, UserId};

/// Single-slot owner claim.
///
/// The first claimer wins; every later claim is a no-op, whoever makes it.
/// Not synchronized on its own: [`crate::state::RelayState`] guards it
/// together with the session table.
#[derive(Debug, Default)]
pub struct OwnerRegistry {
    slot: Option<OwnerSlot>,
}

impl OwnerRegistry {
    pub fn new(slot: Option<OwnerSlot>) -> Self {
        Self { slot }
    }

    /// Returns `true` only when this call filled the empty slot.
    pub fn claim_if_unset(&mut self, sender: &Sender) -> bool {
        self.claim(sender).0
    }

    /// Like [`Self::claim_if_unset`], also handing back whoever holds the slot now.
    pub fn claim(&mut self, sender: &Sender) -> (bool, &OwnerSlot) {
        let newly = self.slot.is_none();
        let slot = self.slot.get_or_insert_with(|| OwnerSlot {
            id: sender.id,
            chat_id: sender.chat_id,
            display_name: sender.display_name.clone(),
            claimed_at: Utc::now(),
        });
        (newly, slot)
    }

    pub fn is_owner(&self, id: UserId) -> bool {
        self.slot.as_ref().is_some_and(|o| o.id == id)
    }

    pub fn current(&self) -> Option<&OwnerSlot> {
        self.slot.as_ref()
    }
}
