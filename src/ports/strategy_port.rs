//! Strategy store port.

use crate::domain::error::EngineError;
use crate::domain::strategy::StrategyDefinition;

/// Loads named strategy definitions from the relational store. An unknown
/// identifier is absence, not an error; the engine treats absence as fatal
/// for the run.
pub trait StrategyStore {
    fn load(&self, strategy_id: i64) -> Result<Option<StrategyDefinition>, EngineError>;

    fn list(&self) -> Result<Vec<StrategyDefinition>, EngineError>;
}
