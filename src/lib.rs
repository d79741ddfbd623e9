pub mod cli;
pub mod config;
pub mod event;
pub mod pipeline;
pub mod recovery;
pub mod sink;
pub mod source;
pub mod state;
