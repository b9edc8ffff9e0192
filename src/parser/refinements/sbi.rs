// State Bank of India
//
// Rows follow the generic `15 Dec 25 MERCHANT 1,138.82 D` shape, but
// extractors wrap long merchants onto the next line, interleave a value-date
// column, and sometimes drop newlines entirely. Cards are masked down to the
// last two digits (XXXX XXXX XXXX XX95). The reward summary prints four
// numbers whose column order varies between extractions.
//
// Reconciliation between the two text candidates is unchanged: this parser
// only changes how each candidate is scanned. There is no "fallback looks
// corrupt" override for SBI; the strictly-more-rows rule applies as is.

use crate::banks::BankCode;
use crate::extract::TextSource;
use crate::parser::grammar::{
    collapse_whitespace, LineGrammar, LineOutcome, TransactionScan, AMOUNT_2DP, DMY_SHORT_FORMATS,
    MONTHS,
};
use crate::parser::header::{self, find_card_last_four, find_date};
use crate::parser::StatementParser;
use crate::statement::{ParsedTransaction, StatementHeader};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::cmp::Reverse;
use tracing::debug;

const SBI_DATE_FORMATS: &[&str] = &[
    "%d %b %y",
    "%d %b %Y",
    "%d %B %Y",
    "%d/%m/%y",
    "%d/%m/%Y",
    "%d-%m-%y",
    "%d-%m-%Y",
];

/// Characters of context on each side of a reward row that must mention the labels
const REWARD_CONTEXT: usize = 220;

/// Characters before or after a reward row searched for a column label
const REWARD_ANCHOR_WINDOW: usize = 90;

/// Largest value accepted in a reward row; anything longer is not a points count
const MAX_REWARD_POINTS: i64 = 999_999_999_999_999;

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("valid sbi pattern")
}

static SBI_GRAMMAR: Lazy<LineGrammar> = Lazy::new(|| {
    let date = format!(r"\d{{1,2}} (?:{MONTHS}) \d{{2}}");
    // unanchored so one stitched line can yield several rows
    LineGrammar::new(
        &format!(r"^{date}\b"),
        &format!(r"(?P<date>{date}) (?P<desc>.+?) (?P<amount>{AMOUNT_2DP}) ?(?P<dir>(?-i:[CD]))\b"),
        DMY_SHORT_FORMATS,
    )
    .expect("sbi grammar compiles")
});

static EMBEDDED_DATE: Lazy<Regex> =
    Lazy::new(|| case_insensitive(&format!(r"\d{{1,2}} (?:{MONTHS}) \d{{2}}\b")));

static TRAILING_VALUE_DATE: Lazy<Regex> =
    Lazy::new(|| case_insensitive(&format!(r"\s+\d{{1,2}} (?:{MONTHS}) \d{{2}}\s*$")));

static SBI_CARD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"[xX*]{4}[\s-]+[xX*]{4}[\s-]+[xX*]{4}[\s-]+[xX*]{2}(\d{2})\b",
        concat!(
            r"Card\s+(?:No|Number)[.:\s]*",
            r"[xX*]{4,}[\s-]*[xX*]{4,}[\s-]*[xX*]{4,}[\s-]*[xX*]{0,2}(\d{2,4})\b",
        ),
        r"\b(?:ending\s+in|ends\s+with|ending)[:\s]*[xX*]{0,2}(\d{2,4})\b",
    ]
    .iter()
    .map(|p| case_insensitive(p))
    .collect()
});

static STATEMENT_DATE_LOOSE: Lazy<Regex> =
    Lazy::new(|| case_insensitive(r"Statement\s+Date.*?(\d{1,2}\s+[A-Za-z]{3,9}\s+\d{4})"));

static FOUR_NUMBERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^| )(\d[\d,]*) (\d[\d,]*) (\d[\d,]*) (\d[\d,]*)(?: |$)")
        .expect("valid sbi pattern")
});

// ============================================================================
// REWARD POINTS
// ============================================================================

/// Reward summary satisfying `previous + earned - redeemed == closing`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPoints {
    pub previous: i64,
    pub earned: i64,
    pub redeemed: i64,
    pub closing: i64,
}

/// Column roles in printed order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Previous,
    Earned,
    Redeemed,
    Closing,
}

impl RewardPoints {
    fn from_slots(slots: [i64; 4]) -> Option<Self> {
        let points = RewardPoints {
            previous: slots[0],
            earned: slots[1],
            redeemed: slots[2],
            closing: slots[3],
        };
        points.is_consistent().then_some(points)
    }

    /// `previous + earned - redeemed == closing`; an overflowing sum is inconsistent
    pub fn is_consistent(&self) -> bool {
        self.previous
            .checked_add(self.earned)
            .and_then(|total| total.checked_sub(self.redeemed))
            .is_some_and(|closing| closing == self.closing)
    }

    /// Locate the reward row in `text` and assign its four numbers
    pub fn find(text: &str) -> Option<RewardPoints> {
        let text = collapse_whitespace(text);

        for caps in FOUR_NUMBERS.captures_iter(&text) {
            let (Some(first), Some(last)) = (caps.get(1), caps.get(4)) else {
                continue;
            };
            let (start, end) = (first.start(), last.end());

            let context = window(&text, start.saturating_sub(REWARD_CONTEXT), end + REWARD_CONTEXT)
                .to_lowercase();
            if !context.contains("previous balance") || !context.contains("earned") {
                continue;
            }

            let Some(nums) = (1..=4)
                .map(|i| caps.get(i).and_then(|m| m.as_str().replace(',', "").parse::<i64>().ok()))
                .map(|n| n.filter(|&n| n <= MAX_REWARD_POINTS))
                .collect::<Option<Vec<i64>>>()
            else {
                continue;
            };
            let nums = [nums[0], nums[1], nums[2], nums[3]];

            let pre =
                window(&text, start.saturating_sub(REWARD_ANCHOR_WINDOW), start).to_lowercase();
            let post = window(&text, end, end + REWARD_ANCHOR_WINDOW).to_lowercase();

            let anchored = match leading_label(&pre) {
                Some(column) => Self::anchored(column, nums),
                None if post.contains("previous balance") && post.contains("earned") => {
                    Self::from_slots(nums)
                }
                None => None,
            };

            if let Some(points) = anchored.or_else(|| Self::solve(nums)) {
                debug!(
                    previous = points.previous,
                    earned = points.earned,
                    redeemed = points.redeemed,
                    closing = points.closing,
                    "reward points found"
                );
                return Some(points);
            }
        }
        None
    }

    /// First number belongs to `column`; the rest fill the remaining columns
    fn anchored(column: Column, nums: [i64; 4]) -> Option<RewardPoints> {
        let anchor = column as usize;
        let open: Vec<usize> = (0..4).filter(|&slot| slot != anchor).collect();

        PERMUTATIONS_3.iter().find_map(|perm| {
            let mut slots = [0i64; 4];
            slots[anchor] = nums[0];
            for (k, &slot) in open.iter().enumerate() {
                slots[slot] = nums[1 + perm[k]];
            }
            Self::from_slots(slots)
        })
    }

    /// Every assignment that satisfies the invariant, ranked by plausibility
    pub fn solve(nums: [i64; 4]) -> Option<RewardPoints> {
        let min = nums.iter().copied().min()?;
        let max = nums.iter().copied().max()?;

        permutations_4()
            .filter_map(|p| Self::from_slots([nums[p[0]], nums[p[1]], nums[p[2]], nums[p[3]]]))
            .min_by_key(|c| {
                let mut penalty: i64 = 0;
                if c.closing == min {
                    penalty += 1000;
                }
                if c.closing < c.previous {
                    penalty += 100;
                }
                if c.earned > c.previous {
                    penalty += 200;
                }
                if c.earned == max {
                    penalty += 100;
                }
                penalty = penalty.saturating_add(c.redeemed);
                if c.earned == 0 {
                    penalty += 10;
                }
                if c.closing != max {
                    penalty += 5;
                }
                (penalty, c.redeemed, Reverse(c.earned), Reverse(c.closing))
            })
    }
}

const PERMUTATIONS_3: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Index permutations of four columns in lexicographic order
fn permutations_4() -> impl Iterator<Item = [usize; 4]> {
    (0..4).flat_map(|a| {
        (0..4).flat_map(move |b| {
            (0..4).flat_map(move |c| {
                (0..4)
                    .filter(move |&d| a != b && a != c && a != d && b != c && b != d && c != d)
                    .map(move |d| [a, b, c, d])
            })
        })
    })
}

fn leading_label(pre: &str) -> Option<Column> {
    if pre.contains("closing balance") {
        Some(Column::Closing)
    } else if pre.contains("previous balance") {
        Some(Column::Previous)
    } else if pre.contains("earned") {
        Some(Column::Earned)
    } else if pre.contains("redeemed") {
        Some(Column::Redeemed)
    } else {
        None
    }
}

/// `text[start..end]` widened outward to char boundaries
fn window(text: &str, start: usize, end: usize) -> &str {
    let mut start = start.min(text.len());
    let mut end = end.min(text.len());
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    while !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

// ============================================================================
// TRANSACTION ROWS
// ============================================================================

/// Drop an interleaved next-row merchant and a trailing value date
fn clean_merchant(text: &str) -> String {
    let original = collapse_whitespace(text);
    let mut head = original.as_str();

    if let Some(m) = EMBEDDED_DATE.find(head) {
        if m.start() > 0 {
            head = head[..m.start()].trim_end();
        }
    }
    let cleaned = TRAILING_VALUE_DATE.replace(head, "").trim().to_string();

    if cleaned.is_empty() {
        original
    } else {
        cleaned
    }
}

/// Join continuation lines onto the row that starts with a date
fn stitch_rows(text: &str, grammar: &LineGrammar) -> Vec<String> {
    let mut rows = Vec::new();
    let mut current: Option<String> = None;

    for raw in text.lines() {
        let line = collapse_whitespace(raw);
        if line.is_empty() {
            continue;
        }
        if grammar.is_candidate(&line) {
            if let Some(row) = current.replace(line) {
                rows.push(row);
            }
        } else if let Some(row) = current.as_mut() {
            row.push(' ');
            row.push_str(&line);
        }
    }
    rows.extend(current);
    rows
}

fn cleaned(t: ParsedTransaction) -> ParsedTransaction {
    let merchant = clean_merchant(&t.description);
    ParsedTransaction::new(t.date, &merchant, t.amount_cents, t.direction)
}

// ============================================================================
// PARSER
// ============================================================================

pub struct SbiParser;

impl SbiParser {
    pub fn new() -> Self {
        SbiParser
    }

    /// `XX95` for cards masked to two digits, otherwise the last four
    fn card_last_four(text: &str) -> Option<String> {
        SBI_CARD_PATTERNS
            .iter()
            .find_map(|p| p.captures(text).and_then(|caps| caps.get(1)))
            .map(|m| match m.as_str() {
                two if two.len() == 2 => format!("XX{two}"),
                digits => digits.to_string(),
            })
            .or_else(|| find_card_last_four(text))
    }
}

impl Default for SbiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementParser for SbiParser {
    fn bank(&self) -> BankCode {
        BankCode::Sbi
    }

    fn date_formats(&self) -> &'static [&'static str] {
        SBI_DATE_FORMATS
    }

    fn line_grammar(&self) -> &LineGrammar {
        &SBI_GRAMMAR
    }

    fn parse_header(&self, source: &dyn TextSource) -> StatementHeader {
        let mut header = header::parse_header(source, self.date_formats());

        if let Some(card) = Self::card_last_four(source.primary_text())
            .or_else(|| Self::card_last_four(source.fallback_text()))
        {
            header.card_last_four = Some(card);
        }
        if header.statement_date.is_none() {
            header.statement_date = find_date(source, &STATEMENT_DATE_LOOSE, self.date_formats());
        }

        let rewards = RewardPoints::find(source.primary_text())
            .or_else(|| RewardPoints::find(source.fallback_text()));
        if let Some(points) = rewards {
            header.reward_points_earned = Some(points.earned);
            header.reward_points_redeemed = Some(points.redeemed);
            header.reward_points_balance = Some(points.closing);
        }
        header
    }

    fn scan_transactions(&self, text: &str) -> TransactionScan {
        let grammar = self.line_grammar();
        let mut scan = TransactionScan::default();

        for row in stitch_rows(text, grammar) {
            let outcomes = grammar.parse_all(&row);
            if outcomes.is_empty() {
                debug!(row = %row, "malformed sbi row");
                scan.malformed_lines += 1;
            }
            for outcome in outcomes {
                match outcome {
                    LineOutcome::Parsed(t) => scan.transactions.push(cleaned(t)),
                    _ => scan.malformed_lines += 1,
                }
            }
        }

        // extraction sometimes drops every newline
        if scan.transactions.is_empty() {
            let mut flat = TransactionScan::default();
            for outcome in grammar.parse_all(&collapse_whitespace(text)) {
                match outcome {
                    LineOutcome::Parsed(t) => flat.transactions.push(cleaned(t)),
                    _ => flat.malformed_lines += 1,
                }
            }
            if !flat.is_empty() {
                return flat;
            }
        }
        scan
    }
}
