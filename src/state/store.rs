use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-user accumulator: which orders have been seen and which of those have
/// been paid. An order id lives in exactly one of the two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    pub unpaid_order_ids: Vec<String>,
    pub paid_order_ids: Vec<String>,
}

/// Keyed accumulator storage, mutated only through the join operator.
///
/// A pure mapping: no locking here. The engine routes all writes through a
/// single driver task, which is what serializes same-key updates.
#[derive(Debug, Default)]
pub struct StateStore {
    states: HashMap<String, CartState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the store from a snapshot's state image.
    pub fn from_image(image: HashMap<String, CartState>) -> Self {
        Self { states: image }
    }

    pub fn get(&self, key: &str) -> Option<&CartState> {
        self.states.get(key)
    }

    pub fn put(&mut self, key: String, state: CartState) {
        self.states.insert(key, state);
    }

    /// One-pass enumeration of every (key, state) pair.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &CartState)> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Full copy of the store for inclusion in a snapshot.
    pub fn image(&self) -> HashMap<String, CartState> {
        self.states.clone()
    }
}
