pub mod runner;

pub use runner::{EngineError, JoinEngine};
