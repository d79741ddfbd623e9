pub mod operator;
pub mod store;

pub use operator::{JoinOperator, OperatorError};
pub use store::{CartState, StateStore};
