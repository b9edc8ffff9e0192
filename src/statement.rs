// 🧾 Statement model - what a parse produces and persistence consumes
//
// Money is held in integer minor units (paise/cents). A ParsedStatement
// carries no wall-clock timestamps so identical input bytes always produce
// identical values.

use crate::balance::SummaryCheck;
use crate::banks::BankCode;
use crate::rules::normalize_merchant;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TRANSACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "debit",
            Direction::Credit => "credit",
        }
    }

    /// `D`/`DR` → debit, `C`/`CR` → credit (case-insensitive)
    pub fn from_marker(marker: &str) -> Option<Direction> {
        match marker.trim().to_ascii_uppercase().as_str() {
            "D" | "DR" => Some(Direction::Debit),
            "C" | "CR" => Some(Direction::Credit),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTransaction {
    pub date: NaiveDate,

    /// Description as printed on the statement (whitespace collapsed)
    pub description: String,

    /// Normalized key used for categorization and overrides
    pub merchant_key: String,

    /// Always > 0; the sign lives in `direction`
    pub amount_cents: i64,

    pub direction: Direction,

    /// None until categorized
    pub category: Option<String>,
}

impl ParsedTransaction {
    pub fn new(
        date: NaiveDate,
        description: &str,
        amount_cents: i64,
        direction: Direction,
    ) -> Self {
        let description = description.split_whitespace().collect::<Vec<_>>().join(" ");
        ParsedTransaction {
            date,
            merchant_key: normalize_merchant(description.as_str()),
            description,
            amount_cents,
            direction,
            category: None,
        }
    }

    pub fn is_debit(&self) -> bool {
        self.direction == Direction::Debit
    }

    pub fn amount(&self) -> f64 {
        self.amount_cents as f64 / 100.0
    }
}

/// Sum of `direction` amounts in minor units, or None if it overflows
pub fn checked_total(transactions: &[ParsedTransaction], direction: Direction) -> Option<i64> {
    transactions
        .iter()
        .filter(|t| t.direction == direction)
        .try_fold(0i64, |total, t| total.checked_add(t.amount_cents))
}

// ============================================================================
// HEADER
// ============================================================================

/// Statement-level fields. Every field is optional: formats differ per bank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementHeader {
    pub card_last_four: Option<String>,
    pub statement_date: Option<NaiveDate>,

    /// Billing period as printed, e.g. "16 Dec 2025 to 15 Jan 2026"
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,

    pub due_date: Option<NaiveDate>,
    pub total_due_cents: Option<i64>,
    pub minimum_due_cents: Option<i64>,
    pub credit_limit_cents: Option<i64>,
    pub available_limit_cents: Option<i64>,
    pub previous_balance_cents: Option<i64>,
    pub closing_balance_cents: Option<i64>,
    pub reward_points_earned: Option<i64>,
    pub reward_points_redeemed: Option<i64>,
    pub reward_points_balance: Option<i64>,
}

impl StatementHeader {
    /// Fields downstream accounting cannot do without
    pub fn missing_critical_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.statement_date.is_none() {
            missing.push("statement_date".to_string());
        }
        if self.closing_balance_cents.is_none() && self.total_due_cents.is_none() {
            missing.push("closing_balance".to_string());
        }
        missing
    }

    /// Drop values that break the header invariants: negative amounts, a
    /// period that ends before it starts and a due date before the statement
    /// date. A missing statement date is taken from the period end.
    /// Returns the names of dropped fields.
    pub fn enforce_invariants(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        if let (Some(start), Some(end)) = (self.period_start, self.period_end) {
            if end < start {
                self.period_start = None;
                self.period_end = None;
                dropped.push("statement_period".to_string());
            }
        }
        if self.statement_date.is_none() {
            self.statement_date = self.period_end;
        }

        let amounts: [(&str, &mut Option<i64>); 9] = [
            ("total_due", &mut self.total_due_cents),
            ("minimum_due", &mut self.minimum_due_cents),
            ("credit_limit", &mut self.credit_limit_cents),
            ("available_limit", &mut self.available_limit_cents),
            ("previous_balance", &mut self.previous_balance_cents),
            ("closing_balance", &mut self.closing_balance_cents),
            ("reward_points_earned", &mut self.reward_points_earned),
            ("reward_points_redeemed", &mut self.reward_points_redeemed),
            ("reward_points_balance", &mut self.reward_points_balance),
        ];
        for (name, value) in amounts {
            if matches!(value, Some(v) if *v < 0) {
                *value = None;
                dropped.push(name.to_string());
            }
        }

        if let (Some(statement), Some(due)) = (self.statement_date, self.due_date) {
            if due < statement {
                self.due_date = None;
                dropped.push("due_date".to_string());
            }
        }
        dropped
    }
}

// ============================================================================
// STATEMENT
// ============================================================================

/// Which extraction pass supplied the transaction list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextStrategy {
    Primary,
    Fallback,
}

/// Recovered problems and provenance, reported next to a best-effort result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseMetadata {
    pub strategy: TextStrategy,
    pub primary_matches: usize,
    pub fallback_matches: usize,

    /// Lines that looked like transactions but failed the grammar
    pub malformed_lines: usize,

    /// Critical header fields that could not be found
    pub missing_fields: Vec<String>,

    /// Header values dropped for violating header invariants
    pub rejected_fields: Vec<String>,

    pub summary: SummaryCheck,
}

impl Default for ParseMetadata {
    fn default() -> Self {
        ParseMetadata {
            strategy: TextStrategy::Primary,
            primary_matches: 0,
            fallback_matches: 0,
            malformed_lines: 0,
            missing_fields: Vec::new(),
            rejected_fields: Vec::new(),
            summary: SummaryCheck::Skipped {
                reason: "not checked".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    pub bank: BankCode,

    #[serde(flatten)]
    pub header: StatementHeader,

    pub transactions: Vec<ParsedTransaction>,

    pub metadata: ParseMetadata,

    /// SHA-256 of the source document, set when parsed from bytes
    pub document_hash: Option<String>,
}

impl ParsedStatement {
    /// Statement returned but flagged: critical header fields are missing
    pub fn is_incomplete(&self) -> bool {
        !self.metadata.missing_fields.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        self.is_incomplete()
            || self.metadata.malformed_lines > 0
            || !self.metadata.rejected_fields.is_empty()
            || self.metadata.summary.has_discrepancy()
    }

    /// Human-readable warnings for CLI/API output
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.metadata.malformed_lines > 0 {
            warnings.push(format!(
                "{} transaction line(s) skipped as malformed",
                self.metadata.malformed_lines
            ));
        }
        if self.is_incomplete() {
            warnings.push(format!("missing fields: {}", self.metadata.missing_fields.join(", ")));
        }
        if !self.metadata.rejected_fields.is_empty() {
            warnings.push(format!(
                "inconsistent fields dropped: {}",
                self.metadata.rejected_fields.join(", ")
            ));
        }
        if self.metadata.summary.has_discrepancy() {
            warnings.push(self.metadata.summary.summary());
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_transaction_new_normalizes() {
        let t = ParsedTransaction::new(
            date(2025, 12, 15),
            "  Apollo   Pharmacies ",
            113882,
            Direction::Debit,
        );
        assert_eq!(t.description, "Apollo Pharmacies");
        assert_eq!(t.merchant_key, "APOLLO PHARMACIES");
        assert_eq!(t.amount(), 1138.82);
        assert!(t.is_debit());
        assert!(t.category.is_none());
    }

    #[test]
    fn test_checked_total_by_direction() {
        let txns = vec![
            ParsedTransaction::new(date(2025, 12, 1), "SWIGGY", 45_000, Direction::Debit),
            ParsedTransaction::new(date(2025, 12, 2), "REFUND", 10_000, Direction::Credit),
            ParsedTransaction::new(date(2025, 12, 3), "ZOMATO", 31_250, Direction::Debit),
        ];
        assert_eq!(checked_total(&txns, Direction::Debit), Some(76_250));
        assert_eq!(checked_total(&txns, Direction::Credit), Some(10_000));

        let huge = vec![
            ParsedTransaction::new(date(2025, 12, 1), "A", i64::MAX, Direction::Debit),
            ParsedTransaction::new(date(2025, 12, 2), "B", 1, Direction::Debit),
        ];
        assert_eq!(checked_total(&huge, Direction::Debit), None);
    }

    #[test]
    fn test_direction_markers() {
        assert_eq!(Direction::from_marker("D"), Some(Direction::Debit));
        assert_eq!(Direction::from_marker("cr"), Some(Direction::Credit));
        assert_eq!(Direction::from_marker(" Dr "), Some(Direction::Debit));
        assert_eq!(Direction::from_marker("X"), None);
    }

    #[test]
    fn test_due_date_before_statement_date_is_dropped() {
        let mut header = StatementHeader {
            statement_date: Some(date(2025, 1, 15)),
            due_date: Some(date(2025, 1, 10)),
            ..Default::default()
        };
        let dropped = header.enforce_invariants();
        assert_eq!(dropped, vec!["due_date".to_string()]);
        assert!(header.due_date.is_none());
    }

    #[test]
    fn test_period_end_stands_in_for_statement_date() {
        let mut header = StatementHeader {
            period_start: Some(date(2025, 12, 16)),
            period_end: Some(date(2026, 1, 15)),
            ..Default::default()
        };
        assert!(header.enforce_invariants().is_empty());
        assert_eq!(header.statement_date, Some(date(2026, 1, 15)));
        assert!(header.missing_critical_fields().contains(&"closing_balance".to_string()));
        assert!(!header.missing_critical_fields().contains(&"statement_date".to_string()));

        // a printed statement date wins over the period end
        let mut header = StatementHeader {
            statement_date: Some(date(2026, 1, 17)),
            period_end: Some(date(2026, 1, 15)),
            ..Default::default()
        };
        header.enforce_invariants();
        assert_eq!(header.statement_date, Some(date(2026, 1, 17)));
    }

    #[test]
    fn test_inverted_period_is_dropped() {
        let mut header = StatementHeader {
            period_start: Some(date(2026, 1, 15)),
            period_end: Some(date(2025, 12, 16)),
            ..Default::default()
        };
        assert_eq!(header.enforce_invariants(), vec!["statement_period".to_string()]);
        assert_eq!(header.period_start, None);
        assert_eq!(header.statement_date, None);
    }

    #[test]
    fn test_negative_amounts_are_dropped() {
        let mut header = StatementHeader {
            minimum_due_cents: Some(-5),
            closing_balance_cents: Some(1000),
            ..Default::default()
        };
        let dropped = header.enforce_invariants();
        assert_eq!(dropped, vec!["minimum_due".to_string()]);
        assert_eq!(header.closing_balance_cents, Some(1000));
    }

    #[test]
    fn test_missing_critical_fields() {
        let header = StatementHeader::default();
        assert_eq!(header.missing_critical_fields(), vec!["statement_date", "closing_balance"]);

        let header = StatementHeader {
            statement_date: Some(date(2025, 1, 15)),
            total_due_cents: Some(100),
            ..Default::default()
        };
        assert!(header.missing_critical_fields().is_empty());
    }
}
