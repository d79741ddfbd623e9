use crate::event::{Event, EventType, OutputRecord};
use crate::state::store::StateStore;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(
        "invariant violation for user '{user_id}': payment for order '{order_id}' \
         with no matching unpaid order"
    )]
    InvariantViolation { user_id: String, order_id: String },
}

/// The keyed fold: applies one event to the user's accumulator and emits the
/// post-update view.
///
/// An order appends to `unpaid_order_ids`; a payment moves the id from unpaid
/// to paid. A payment for an order that is not currently unpaid means the
/// input is corrupt or out of order within the key, and fails the run rather
/// than being papered over. On failure the store is left untouched: the new
/// state is computed first and written back only on success.
pub struct JoinOperator;

impl JoinOperator {
    pub fn apply(
        store: &mut StateStore,
        event: &Event,
    ) -> Result<OutputRecord, OperatorError> {
        let mut state = store.get(&event.user_id).cloned().unwrap_or_default();

        match event.event_type {
            EventType::Order => {
                state.unpaid_order_ids.push(event.order_id.clone());
            }
            EventType::Payment => {
                let pos = state
                    .unpaid_order_ids
                    .iter()
                    .position(|id| id == &event.order_id)
                    .ok_or_else(|| OperatorError::InvariantViolation {
                        user_id: event.user_id.clone(),
                        order_id: event.order_id.clone(),
                    })?;
                let order_id = state.unpaid_order_ids.remove(pos);
                state.paid_order_ids.push(order_id);
            }
        }

        trace!(
            user_id = %event.user_id,
            unpaid = state.unpaid_order_ids.len(),
            paid = state.paid_order_ids.len(),
            "Applied event"
        );

        let record = OutputRecord {
            user_id: event.user_id.clone(),
            paid_order_ids: state.paid_order_ids.clone(),
            unpaid_order_ids: state.unpaid_order_ids.clone(),
        };
        store.put(event.user_id.clone(), state);

        Ok(record)
    }
}
