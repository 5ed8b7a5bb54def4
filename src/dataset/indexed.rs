use crate::dataset::Summary;

/// Rating given by a user, as seen from the user's side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserEvent {
    pub item_id: usize,
    pub rating: i32,
}

/// Rating received by an item, as seen from the item's side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ItemEvent {
    pub user_id: usize,
    pub rating: i32,

    /// Position of the same rating in the user's event list.
    pub user_position: usize,
}

/// Ratings grouped by user and by item. Produced by consuming an
/// [`InteractionStore`](crate::InteractionStore), which cannot be reused afterwards.
pub struct IndexedInteractions {
    pub summary: Summary,
    by_user: Vec<Vec<UserEvent>>,
    by_item: Vec<Vec<ItemEvent>>,
}

impl IndexedInteractions {
    pub(super) fn new(
        summary: Summary,
        by_user: Vec<Vec<UserEvent>>,
        by_item: Vec<Vec<ItemEvent>>,
    ) -> Self {
        debug_assert_eq!(by_user.len(), summary.n_users);
        debug_assert_eq!(by_item.len(), summary.n_items);
        Self {
            summary,
            by_user,
            by_item,
        }
    }

    #[must_use]
    pub fn n_users(&self) -> usize {
        self.by_user.len()
    }

    #[must_use]
    pub fn n_items(&self) -> usize {
        self.by_item.len()
    }

    /// Events of the user, empty for unknown users.
    #[must_use]
    pub fn user_events(&self, user_id: usize) -> &[UserEvent] {
        self.by_user.get(user_id).map_or(&[], Vec::as_slice)
    }

    /// Events of the item, empty for unknown items.
    #[must_use]
    pub fn item_events(&self, item_id: usize) -> &[ItemEvent] {
        self.by_item.get(item_id).map_or(&[], Vec::as_slice)
    }
}
