// 🧭 Header field extraction - statement-level values found by label
//
// Each field is looked up in the primary text first and in the fallback
// text when the primary has no match. Missing fields stay None.
//
// The billing period is read from a labelled range ("Statement Period",
// "Billing Period", "Statement Date X to Y") before a bare "X - Y" range.

use crate::extract::TextSource;
use crate::parser::grammar::{parse_amount_cents, parse_date};
use crate::statement::StatementHeader;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Date formats tried for header dates. Two-digit-year variants come first
/// so `25` is never read as the year 0025.
pub const GENERIC_DATE_FORMATS: &[&str] = &[
    "%d %b %y",
    "%d %b %Y",
    "%d %B %Y",
    "%d %b, %Y",
    "%d %B, %Y",
    "%d-%b-%y",
    "%d-%b-%Y",
    "%d/%m/%y",
    "%d/%m/%Y",
    "%d-%m-%y",
    "%d-%m-%Y",
    "%d.%m.%y",
    "%d.%m.%Y",
];

/// Date token as printed next to header labels
pub const DATE_TOKEN: &str =
    r"\d{1,2}[-/.][A-Za-z0-9]{1,9}[-/.]\d{2,4}|\d{1,2}\s+[A-Za-z]{3,9},?\s+\d{2,4}";

/// Amount next to a label. Some extractors print the rupee sign as a bare `C`.
const AMOUNT_TOKEN: &str = r"(?:Rs\.?|INR|[₹$C])?\s*(\d[\d,]*(?:\.\d{1,2})?)";

fn labeled(label: &str, value: &str) -> Regex {
    RegexBuilder::new(&format!(r"{label}[:\s\-]*(?:{value})"))
        .case_insensitive(true)
        .build()
        .expect("valid header pattern")
}

fn amount_field(label: &str) -> Regex {
    labeled(label, AMOUNT_TOKEN)
}

fn date_field(label: &str) -> Regex {
    labeled(label, &format!("({DATE_TOKEN})"))
}

fn period_pattern(label: &str, date: &str) -> Regex {
    RegexBuilder::new(&format!(r"{label}(?P<start>{date})\s*(?:to|-)\s*(?P<end>{date})"))
        .case_insensitive(true)
        .build()
        .expect("valid period pattern")
}

struct HeaderPatterns {
    statement_date: Regex,
    period: Regex,
    bare_period: Regex,
    due_date: Regex,
    total_due: Regex,
    minimum_due: Regex,
    credit_limit: Regex,
    available_limit: Regex,
    previous_balance: Regex,
    closing_balance: Regex,
    points_earned: Regex,
    points_redeemed: Regex,
    points_balance: Regex,
    card_numbers: Vec<Regex>,
}

static PATTERNS: Lazy<HeaderPatterns> = Lazy::new(|| HeaderPatterns {
    statement_date: date_field(r"Statement\s+Date"),
    period: period_pattern(
        r"(?:(?P<dated>Statement\s+Date)|Statement\s+Period|Billing\s+(?:Period|Cycle))[:\s\-]*",
        DATE_TOKEN,
    ),
    bare_period: period_pattern("", r"\d{1,2}\s+[A-Za-z]{3,9},?\s+\d{2,4}"),
    due_date: date_field(r"(?:Payment\s+)?Due\s+Date"),
    total_due: amount_field(r"Total\s+(?:Amount\s+)?Due"),
    minimum_due: amount_field(r"Minimum\s+(?:Amount\s+|Payment\s+)?Due"),
    // group 1 catches "Available"/"Cash" prefixes so those matches can be skipped
    credit_limit: amount_field(r"(Available\s+|Cash\s+)?(?:Total\s+)?Credit\s+Limit"),
    available_limit: amount_field(r"Available\s+(?:Credit\s+)?Limit"),
    previous_balance: amount_field(r"(?:Previous|Opening)\s+Balance"),
    closing_balance: amount_field(r"Closing\s+Balance"),
    points_earned: labeled(r"(?:Reward\s+)?Points\s+Earned", r"(\d[\d,]*)"),
    points_redeemed: labeled(r"(?:Reward\s+)?Points\s+Redeemed", r"(\d[\d,]*)"),
    points_balance: labeled(r"Reward\s+Points(?:\s+Balance)?", r"(\d[\d,]*)"),
    card_numbers: [
        r"\b(?:Credit\s+)?Card\s*(?:No|Number)\.?[: ]+([0-9Xx* ]{8,30})",
        r"\b\d{4,6}[Xx*]{4,14}\d{2,4}\b",
        r"[Xx*]{4}[\s-]?[Xx*]{4}[\s-]?[Xx*]{4}[\s-]?(\d{4})\b",
        r"\bending(?:\s+in)?[:\s]*(\d{4})\b",
    ]
    .iter()
    .map(|p| RegexBuilder::new(p).case_insensitive(true).build().expect("valid card pattern"))
    .collect(),
});

// ============================================================================
// FIELD LOOKUPS
// ============================================================================

/// First capture of `pattern` in the primary text, else the fallback text
fn find_capture(source: &dyn TextSource, pattern: &Regex) -> Option<String> {
    [source.primary_text(), source.fallback_text()]
        .into_iter()
        .find_map(|text| pattern.captures(text))
        .and_then(|caps| caps.iter().skip(1).flatten().last().map(|m| m.as_str().to_string()))
}

pub fn find_amount(source: &dyn TextSource, pattern: &Regex) -> Option<i64> {
    find_capture(source, pattern).and_then(|s| parse_amount_cents(&s))
}

pub fn find_date(source: &dyn TextSource, pattern: &Regex, formats: &[&str]) -> Option<NaiveDate> {
    find_capture(source, pattern).and_then(|s| parse_date(&s, formats))
}

pub fn find_count(source: &dyn TextSource, pattern: &Regex) -> Option<i64> {
    find_capture(source, pattern).and_then(|s| s.replace(',', "").parse().ok())
}

fn find_credit_limit(source: &dyn TextSource) -> Option<i64> {
    [source.primary_text(), source.fallback_text()]
        .into_iter()
        .flat_map(|text| PATTERNS.credit_limit.captures_iter(text))
        .find(|caps| caps.get(1).is_none())
        .and_then(|caps| caps.get(2))
        .and_then(|m| parse_amount_cents(m.as_str()))
}

struct StatementPeriod {
    start: NaiveDate,
    end: NaiveDate,
    /// Range printed after a "Statement Date" label
    dated: bool,
}

/// First range whose dates both parse. Labelled ranges beat bare ones.
fn find_period(source: &dyn TextSource, formats: &[&str]) -> Option<StatementPeriod> {
    let p = &*PATTERNS;
    [&p.period, &p.bare_period].into_iter().find_map(|pattern| {
        [source.primary_text(), source.fallback_text()]
            .into_iter()
            .flat_map(|text| pattern.captures_iter(text))
            .find_map(|caps| {
                Some(StatementPeriod {
                    start: parse_date(caps.name("start")?.as_str(), formats)?,
                    end: parse_date(caps.name("end")?.as_str(), formats)?,
                    dated: caps.name("dated").is_some(),
                })
            })
    })
}

/// Last four digits of the card number, from a labelled or masked token
pub fn find_card_last_four(text: &str) -> Option<String> {
    PATTERNS.card_numbers.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let raw = caps.get(1).or_else(|| caps.get(0))?;
        let digits: String = raw.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
        (digits.len() >= 4).then(|| digits[digits.len() - 4..].to_string())
    })
}

/// Generic header stage
pub fn parse_header(source: &dyn TextSource, date_formats: &[&str]) -> StatementHeader {
    let p = &*PATTERNS;
    let period = find_period(source, date_formats);
    let statement_date = match &period {
        // "Statement Date X to Y": the label's own capture would be the start
        Some(range) if range.dated && range.start <= range.end => Some(range.end),
        _ => find_date(source, &p.statement_date, date_formats),
    };

    StatementHeader {
        card_last_four: find_card_last_four(source.primary_text())
            .or_else(|| find_card_last_four(source.fallback_text())),
        statement_date,
        period_start: period.as_ref().map(|r| r.start),
        period_end: period.as_ref().map(|r| r.end),
        due_date: find_date(source, &p.due_date, date_formats),
        total_due_cents: find_amount(source, &p.total_due),
        minimum_due_cents: find_amount(source, &p.minimum_due),
        credit_limit_cents: find_credit_limit(source),
        available_limit_cents: find_amount(source, &p.available_limit),
        previous_balance_cents: find_amount(source, &p.previous_balance),
        closing_balance_cents: find_amount(source, &p.closing_balance),
        reward_points_earned: find_count(source, &p.points_earned),
        reward_points_redeemed: find_count(source, &p.points_redeemed),
        reward_points_balance: find_count(source, &p.points_balance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionResult;

    const HEADER: &str = "\
HDFC Bank Credit Card Statement
Card No: 4386 XXXX XXXX 1234
Statement Date: 15/01/2025
Payment Due Date: 04/02/2025
Total Amount Due: ₹ 12,345.67
Minimum Amount Due: 617.00
Credit Limit: 3,00,000.00   Available Credit Limit: 2,87,654.33
Opening Balance 5,000.00
Closing Balance C12,345.67
Reward Points Earned 120
";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_generic_header_fields() {
        let source = ExtractionResult::from_texts(HEADER, "");
        let h = parse_header(&source, GENERIC_DATE_FORMATS);

        assert_eq!(h.card_last_four.as_deref(), Some("1234"));
        assert_eq!(h.statement_date, Some(date(2025, 1, 15)));
        assert_eq!(h.due_date, Some(date(2025, 2, 4)));
        assert_eq!(h.total_due_cents, Some(1_234_567));
        assert_eq!(h.minimum_due_cents, Some(61_700));
        assert_eq!(h.credit_limit_cents, Some(30_000_000));
        assert_eq!(h.available_limit_cents, Some(28_765_433));
        assert_eq!(h.previous_balance_cents, Some(500_000));
        assert_eq!(h.closing_balance_cents, Some(1_234_567));
        assert_eq!(h.reward_points_earned, Some(120));
        assert_eq!(h.reward_points_redeemed, None);
    }

    #[test]
    fn test_fields_missing_from_primary_come_from_fallback() {
        let source =
            ExtractionResult::from_texts("Statement Date 15 Jan 2026", "Minimum Due 200.00");
        let h = parse_header(&source, GENERIC_DATE_FORMATS);
        assert_eq!(h.statement_date, Some(date(2026, 1, 15)));
        assert_eq!(h.minimum_due_cents, Some(20_000));
        assert_eq!(h.due_date, None);
    }

    #[test]
    fn test_empty_text_yields_empty_header() {
        let source = ExtractionResult::from_texts("", "");
        assert_eq!(parse_header(&source, GENERIC_DATE_FORMATS), StatementHeader::default());
    }

    #[test]
    fn test_card_last_four_variants() {
        assert_eq!(find_card_last_four("XXXX XXXX XXXX 9876").as_deref(), Some("9876"));
        assert_eq!(find_card_last_four("card 437748XXXXXX5521 issued").as_deref(), Some("5521"));
        assert_eq!(find_card_last_four("Card ending in 4321").as_deref(), Some("4321"));
        assert_eq!(find_card_last_four("no card here"), None);
    }

    #[test]
    fn test_labelled_periods() {
        let text = "Statement Period: 16 Dec 2025 to 15 Jan 2026";
        let source = ExtractionResult::from_texts(text, "");
        let h = parse_header(&source, GENERIC_DATE_FORMATS);
        assert_eq!(h.period_start, Some(date(2025, 12, 16)));
        assert_eq!(h.period_end, Some(date(2026, 1, 15)));
        assert_eq!(h.statement_date, None);

        let source = ExtractionResult::from_texts("", "Billing Period 16/12/2025 - 15/01/2026");
        let h = parse_header(&source, GENERIC_DATE_FORMATS);
        assert_eq!(h.period_start, Some(date(2025, 12, 16)));
        assert_eq!(h.period_end, Some(date(2026, 1, 15)));
    }

    #[test]
    fn test_statement_date_range_uses_its_end() {
        let source = ExtractionResult::from_texts("Statement Date 16 Dec 2025 to 15 Jan 2026", "");
        let h = parse_header(&source, GENERIC_DATE_FORMATS);
        assert_eq!(h.statement_date, Some(date(2026, 1, 15)));
        assert_eq!(h.period_start, Some(date(2025, 12, 16)));
    }

    #[test]
    fn test_bare_period_range() {
        let text = "Account Summary\n16 Dec, 2025 - 15 Jan, 2026\n";
        let source = ExtractionResult::from_texts(text, "");
        let h = parse_header(&source, GENERIC_DATE_FORMATS);
        assert_eq!(h.period_start, Some(date(2025, 12, 16)));
        assert_eq!(h.period_end, Some(date(2026, 1, 15)));

        // word-shaped tokens that are not dates do not count
        let source = ExtractionResult::from_texts("12 SWIGGY 45 - 3 PIZZA 12", "");
        let h = parse_header(&source, GENERIC_DATE_FORMATS);
        assert_eq!(h.period_start, None);
        assert_eq!(h.period_end, None);
    }

    #[test]
    fn test_two_digit_years_are_not_year_25() {
        let source = ExtractionResult::from_texts("Statement Date 15-Jan-25", "");
        let h = parse_header(&source, GENERIC_DATE_FORMATS);
        assert_eq!(h.statement_date, Some(date(2025, 1, 15)));
    }
}
