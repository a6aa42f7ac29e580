//! Port traits at the external-collaborator boundaries.

pub mod config_port;
pub mod data_port;
pub mod progress_port;
pub mod strategy_port;
