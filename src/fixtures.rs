//! Shared test data.

use crate::dataset::InteractionStore;

/// Three users, two items.
pub fn scenario_store() -> InteractionStore {
    [(0, 0, 5), (0, 1, 3), (1, 0, 4), (1, 1, 2), (2, 0, 1)]
        .into_iter()
        .collect()
}

/// Exact rank-2 ratings: every user rates every item with `dot(user, item)`.
pub fn low_rank_store() -> InteractionStore {
    const USERS: [[i32; 2]; 5] = [[1, 0], [0, 1], [1, 1], [2, 1], [1, 2]];
    const ITEMS: [[i32; 2]; 4] = [[3, 0], [0, 1], [1, 1], [2, 0]];

    let mut store = InteractionStore::new();
    for (user_id, user) in USERS.iter().enumerate() {
        for (item_id, item) in ITEMS.iter().enumerate() {
            store.add(user_id, item_id, user[0] * item[0] + user[1] * item[1]);
        }
    }
    store
}

/// Small dense-ish store on a 1..=5 scale with a clear user and item structure.
pub fn dense_store() -> InteractionStore {
    let mut store = InteractionStore::new();
    for user_id in 0..20 {
        for item_id in 0..10 {
            if (user_id + item_id) % 4 == 3 {
                continue;
            }
            let rating = 1 + ((user_id % 3) + (item_id % 3)) as i32;
            store.add(user_id, item_id, rating.min(5));
        }
    }
    store
}
