// 📐 Transaction-line grammar and reconciliation between text candidates
//
// Generic row shape:
//   <day> <Mon> <yy> <description> <amount, thousands separators, 2 decimals> <D|C>
//   15 Dec 25 APOLLO PHARMACIES LIMI IN 1,138.82 D

use crate::statement::{Direction, ParsedTransaction, TextStrategy};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Short month alternation used by day-month-year tokens
pub const MONTHS: &str = "Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec";

/// Amount with optional Indian or Western thousands separators and exactly 2 decimals
pub const AMOUNT_2DP: &str = r"(?:\d{1,3}(?:,\d{2,3})+|\d+)\.\d{2}";

// ============================================================================
// LINE GRAMMAR
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Line does not start like a transaction row (headers, prose, footers)
    NotCandidate,

    /// Starts with a date token but fails the row grammar
    Malformed,

    Parsed(ParsedTransaction),
}

/// Row grammar for one statement layout.
///
/// `row` must define the named groups `date`, `desc` and `amount`, and may
/// define `dir`. Without a direction marker, a leading `-` on the amount means
/// credit and anything else is a debit.
#[derive(Debug, Clone)]
pub struct LineGrammar {
    candidate: Regex,
    row: Regex,
    date_formats: &'static [&'static str],
}

impl LineGrammar {
    pub fn new(
        candidate: &str,
        row: &str,
        date_formats: &'static [&'static str],
    ) -> Result<Self, regex::Error> {
        Ok(LineGrammar {
            candidate: RegexBuilder::new(candidate).case_insensitive(true).build()?,
            row: RegexBuilder::new(row).case_insensitive(true).build()?,
            date_formats,
        })
    }

    /// The default `<d Mon yy> <desc> <amount> <D|C>` grammar
    pub fn generic() -> &'static LineGrammar {
        &GENERIC_GRAMMAR
    }

    pub fn is_candidate(&self, line: &str) -> bool {
        self.candidate.is_match(line)
    }

    /// Classify a single (already whitespace-collapsed) line
    pub fn parse_line(&self, line: &str) -> LineOutcome {
        if !self.is_candidate(line) {
            return LineOutcome::NotCandidate;
        }
        match self.row.captures(line) {
            Some(caps) => self.build(&caps),
            None => LineOutcome::Malformed,
        }
    }

    /// Every match of the row grammar inside `text`, for stitched multi-row lines
    pub fn parse_all(&self, text: &str) -> Vec<LineOutcome> {
        self.row.captures_iter(text).map(|caps| self.build(&caps)).collect()
    }

    fn build(&self, caps: &regex::Captures<'_>) -> LineOutcome {
        let (Some(date), Some(desc), Some(amount)) =
            (caps.name("date"), caps.name("desc"), caps.name("amount"))
        else {
            return LineOutcome::Malformed;
        };

        let Some(date) = parse_date(date.as_str(), self.date_formats) else {
            return LineOutcome::Malformed;
        };
        let raw_amount = amount.as_str().trim();
        let Some(amount_cents) = parse_amount_cents(raw_amount) else {
            return LineOutcome::Malformed;
        };
        if amount_cents <= 0 {
            return LineOutcome::Malformed;
        }

        let direction = match caps.name("dir") {
            Some(marker) => match Direction::from_marker(marker.as_str()) {
                Some(d) => d,
                None => return LineOutcome::Malformed,
            },
            None if raw_amount.starts_with('-') => Direction::Credit,
            None => Direction::Debit,
        };

        let description = desc.as_str().trim();
        if description.is_empty() {
            return LineOutcome::Malformed;
        }

        LineOutcome::Parsed(ParsedTransaction::new(date, description, amount_cents, direction))
    }

    /// Scan a text candidate line by line
    pub fn scan(&self, text: &str) -> TransactionScan {
        let mut scan = TransactionScan::default();
        for raw in text.lines() {
            let line = collapse_whitespace(raw);
            if line.is_empty() {
                continue;
            }
            match self.parse_line(&line) {
                LineOutcome::Parsed(t) => scan.transactions.push(t),
                LineOutcome::Malformed => {
                    debug!(line = %line, "malformed transaction line");
                    scan.malformed_lines += 1;
                }
                LineOutcome::NotCandidate => {}
            }
        }
        scan
    }
}

/// Day-month-year formats for `15 Dec 25` style tokens, two-digit year first
pub const DMY_SHORT_FORMATS: &[&str] = &["%d %b %y", "%d %b %Y"];

static GENERIC_GRAMMAR: Lazy<LineGrammar> = Lazy::new(|| {
    let date = format!(r"\d{{1,2}} (?:{MONTHS}) \d{{2}}");
    LineGrammar::new(
        &format!(r"^{date}\b"),
        // the direction marker is uppercase only
        &format!(r"^(?P<date>{date}) (?P<desc>.+?) (?P<amount>{AMOUNT_2DP}) ?(?P<dir>(?-i:[DC]))$"),
        DMY_SHORT_FORMATS,
    )
    .expect("generic grammar compiles")
});

// ============================================================================
// SCAN RESULTS & RECONCILIATION
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionScan {
    pub transactions: Vec<ParsedTransaction>,
    pub malformed_lines: usize,
}

impl TransactionScan {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Outcome of choosing between the primary and fallback transaction lists
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub transactions: Vec<ParsedTransaction>,
    pub strategy: TextStrategy,
    pub primary_matches: usize,
    pub fallback_matches: usize,

    /// Malformed lines of the selected candidate
    pub malformed_lines: usize,
}

/// Whole-list selection: the fallback list wins only with strictly more
/// matches. Lists are never merged line by line.
pub fn reconcile(primary: TransactionScan, fallback: TransactionScan) -> Reconciled {
    let primary_matches = primary.len();
    let fallback_matches = fallback.len();

    let (chosen, strategy) = if fallback_matches > primary_matches {
        (fallback, TextStrategy::Fallback)
    } else {
        (primary, TextStrategy::Primary)
    };

    debug!(
        primary_matches,
        fallback_matches,
        strategy = ?strategy,
        "reconciled transaction candidates"
    );

    Reconciled {
        transactions: chosen.transactions,
        strategy,
        primary_matches,
        fallback_matches,
        malformed_lines: chosen.malformed_lines,
    }
}

// ============================================================================
// TOKEN PARSING
// ============================================================================

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a date token with the first matching format
pub fn parse_date(text: &str, formats: &[&str]) -> Option<NaiveDate> {
    let text = collapse_whitespace(text);
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
}

/// Amount text → minor units. Accepts currency glyphs, thousands separators,
/// a sign or parentheses, 0–2 decimals. The result is always non-negative.
pub fn parse_amount_cents(text: &str) -> Option<i64> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (whole, fraction) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };
    if fraction.len() > 2 || fraction.contains('.') {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };

    whole.checked_mul(100)?.checked_add(fraction)
}
