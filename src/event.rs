use serde::{Deserialize, Serialize};

/// A single cart event as it appears on the wire: one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub user_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub order_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Order,
    Payment,
}

/// Post-update view of one user's cart, emitted once per processed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub user_id: String,
    pub paid_order_ids: Vec<String>,
    pub unpaid_order_ids: Vec<String>,
}
