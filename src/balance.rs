// ⚖️ Balance Check - summary-stage arithmetic for card statements
//
// Following the formula:
//   previous_balance + debits - credits = closing_balance
//
// A failed check is attached to the statement as a flag; it never blocks
// the parse.

use crate::statement::{checked_total, Direction, ParsedTransaction, StatementHeader};
use serde::{Deserialize, Serialize};

// ============================================================================
// CHECK RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryCheck {
    /// Balances match within tolerance
    Balanced {
        previous_balance: f64,
        total_debits: f64,
        total_credits: f64,
        closing_balance: f64,
    },

    /// Off by less than the major threshold
    MinorDiscrepancy {
        expected_balance: f64,
        calculated_balance: f64,
        difference: f64,
    },

    /// Off by the major threshold or more, usually missing transactions
    MajorDiscrepancy {
        expected_balance: f64,
        calculated_balance: f64,
        difference: f64,
    },

    /// Not enough header data to check
    Skipped { reason: String },
}

impl SummaryCheck {
    pub fn is_balanced(&self) -> bool {
        matches!(self, SummaryCheck::Balanced { .. })
    }

    pub fn has_discrepancy(&self) -> bool {
        matches!(
            self,
            SummaryCheck::MinorDiscrepancy { .. } | SummaryCheck::MajorDiscrepancy { .. }
        )
    }

    pub fn difference(&self) -> f64 {
        match self {
            SummaryCheck::MinorDiscrepancy { difference, .. } => *difference,
            SummaryCheck::MajorDiscrepancy { difference, .. } => *difference,
            _ => 0.0,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            SummaryCheck::Balanced { closing_balance, .. } => {
                format!("balances match closing balance {:.2}", closing_balance)
            }
            SummaryCheck::MinorDiscrepancy {
                expected_balance,
                calculated_balance,
                difference,
            }
            | SummaryCheck::MajorDiscrepancy {
                expected_balance,
                calculated_balance,
                difference,
            } => format!(
                "calculated closing balance {:.2} differs from statement {:.2} by {:.2}",
                calculated_balance, expected_balance, difference
            ),
            SummaryCheck::Skipped { reason } => format!("balance check skipped: {}", reason),
        }
    }
}

// ============================================================================
// CHECKER
// ============================================================================

pub struct BalanceChecker {
    /// Differences up to this are balanced (default: 0.01)
    pub tolerance: f64,

    /// Threshold for minor vs major discrepancy (default: 10.00)
    pub major_discrepancy_threshold: f64,
}

impl BalanceChecker {
    pub fn new() -> Self {
        BalanceChecker {
            tolerance: 0.01,
            major_discrepancy_threshold: 10.0,
        }
    }

    pub fn with_thresholds(tolerance: f64, major_threshold: f64) -> Self {
        BalanceChecker {
            tolerance,
            major_discrepancy_threshold: major_threshold,
        }
    }

    /// Check the statement's transactions against its opening/closing balances.
    /// The closing balance falls back to the total due when not printed.
    pub fn check(
        &self,
        header: &StatementHeader,
        transactions: &[ParsedTransaction],
    ) -> SummaryCheck {
        let Some(previous) = header.previous_balance_cents else {
            return SummaryCheck::Skipped {
                reason: "previous balance not found".to_string(),
            };
        };
        let Some(closing) = header.closing_balance_cents.or(header.total_due_cents) else {
            return SummaryCheck::Skipped {
                reason: "closing balance not found".to_string(),
            };
        };

        let totals = checked_total(transactions, Direction::Debit)
            .zip(checked_total(transactions, Direction::Credit))
            .and_then(|(debits, credits)| {
                let calculated = previous.checked_add(debits)?.checked_sub(credits)?;
                let gap = calculated.checked_sub(closing)?.checked_abs()?;
                Some((debits, credits, calculated, gap))
            });
        let Some((debits, credits, calculated, gap)) = totals else {
            return SummaryCheck::Skipped {
                reason: "amount overflow".to_string(),
            };
        };

        let difference = to_units(gap);

        if difference <= self.tolerance {
            SummaryCheck::Balanced {
                previous_balance: to_units(previous),
                total_debits: to_units(debits),
                total_credits: to_units(credits),
                closing_balance: to_units(closing),
            }
        } else if difference < self.major_discrepancy_threshold {
            SummaryCheck::MinorDiscrepancy {
                expected_balance: to_units(closing),
                calculated_balance: to_units(calculated),
                difference,
            }
        } else {
            SummaryCheck::MajorDiscrepancy {
                expected_balance: to_units(closing),
                calculated_balance: to_units(calculated),
                difference,
            }
        }
    }
}

impl Default for BalanceChecker {
    fn default() -> Self {
        Self::new()
    }
}

fn to_units(cents: i64) -> f64 {
    cents as f64 / 100.0
}

// ============================================================================
// TESTS
// ============================================================================
