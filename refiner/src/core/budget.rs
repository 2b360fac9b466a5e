//! Per-run cost budget for chargeable collaborator calls.

use serde::{Deserialize, Serialize};

use crate::core::types::CostKind;

/// Fixed cost, in budget units, of each chargeable operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTable {
    pub generate: u64,
    pub evaluate: u64,
    pub revise: u64,
    pub summarize: u64,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            generate: 1_200,
            evaluate: 800,
            revise: 1_000,
            summarize: 400,
        }
    }
}

impl CostTable {
    pub fn cost(&self, kind: CostKind) -> u64 {
        match kind {
            CostKind::Generate => self.generate,
            CostKind::Evaluate => self.evaluate,
            CostKind::Revise => self.revise,
            CostKind::Summarize => self.summarize,
        }
    }
}

/// Remaining budget for one run. The balance never goes below zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetLedger {
    remaining: u64,
    spent: u64,
    costs: CostTable,
}

impl BudgetLedger {
    pub fn new(total: u64, costs: CostTable) -> Self {
        Self {
            remaining: total,
            spent: 0,
            costs,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn spent(&self) -> u64 {
        self.spent
    }

    /// Whether the next charge of `kind` fits in the remaining balance.
    pub fn has_sufficient(&self, kind: CostKind) -> bool {
        self.remaining >= self.costs.cost(kind)
    }

    /// Deduct the cost of `kind`. Callers must check [`Self::has_sufficient`] first.
    pub fn charge(&mut self, kind: CostKind) -> Result<u64, String> {
        let cost = self.costs.cost(kind);
        let remaining = self.remaining.checked_sub(cost).ok_or_else(|| {
            format!(
                "charge of {cost} for {kind:?} exceeds remaining budget {}",
                self.remaining
            )
        })?;
        self.remaining = remaining;
        self.spent += cost;
        Ok(remaining)
    }
}
