//! Strategy definition: rule-set membership plus a position-sizing policy.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Signal names as stored in the strategy store. Membership in a rule set is
/// all that matters; an absent name means that check is skipped entirely.
pub const GOLDEN_CROSS: &str = "GoldenCross";
pub const DEATH_CROSS: &str = "DeathCross";
pub const REGIME_FILTER: &str = "RegimeFilter";
pub const Q2_FILTER: &str = "Q2Filter";

/// How the numeric sizing parameter is interpreted when funding a new
/// position. Tags that are neither `FixedAmount` nor `PercentOfEquity`
/// degrade to a zero allocation rather than failing the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizingPolicy {
    FixedAmount,
    PercentOfEquity,
    Unknown(String),
}

impl SizingPolicy {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "FixedAmount" => SizingPolicy::FixedAmount,
            "PercentOfEquity" => SizingPolicy::PercentOfEquity,
            other => SizingPolicy::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            SizingPolicy::FixedAmount => "FixedAmount",
            SizingPolicy::PercentOfEquity => "PercentOfEquity",
            SizingPolicy::Unknown(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDefinition {
    pub id: i64,
    pub name: String,
    pub sizing: SizingPolicy,
    pub sizing_value: f64,
    pub entry_rules: HashSet<String>,
    pub exit_rules: HashSet<String>,
}

impl StrategyDefinition {
    pub fn has_entry_rule(&self, name: &str) -> bool {
        self.entry_rules.contains(name)
    }

    pub fn has_exit_rule(&self, name: &str) -> bool {
        self.exit_rules.contains(name)
    }
}
