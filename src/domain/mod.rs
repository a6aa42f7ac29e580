//! Core engine types and logic.

pub mod bar;
pub mod error;
pub mod market;
pub mod performance;
pub mod position;
pub mod signal;
pub mod simulation;
pub mod sizing;
pub mod strategy;
