// American Express
//
// US layout: MM/DD/YY(YY) dates, credits printed as negative amounts, and a
// five-digit account ending instead of the usual four.
//   01/15/2025 WHOLE FOODS MARKET $84.12
//   01/20/2025 PAYMENT THANK YOU -$500.00

use crate::banks::BankCode;
use crate::extract::TextSource;
use crate::parser::grammar::LineGrammar;
use crate::parser::header::{self, find_amount, find_date, DATE_TOKEN};
use crate::parser::StatementParser;
use crate::statement::StatementHeader;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

const AMEX_DATE_FORMATS: &[&str] = &[
    "%m/%d/%y",
    "%m/%d/%Y",
    "%m-%d-%y",
    "%m-%d-%Y",
    "%d %b %y",
    "%d %b %Y",
    "%d %B %Y",
];

const AMEX_ROW_FORMATS: &[&str] = &["%m/%d/%y", "%m/%d/%Y"];

static AMEX_GRAMMAR: Lazy<LineGrammar> = Lazy::new(|| {
    LineGrammar::new(
        r"^\d{1,2}/\d{1,2}/\d{2,4}\b",
        concat!(
            r"^(?P<date>\d{1,2}/\d{1,2}/\d{2,4})\*? (?P<desc>.+?) ",
            r"(?P<amount>-? ?\$?(?:\d{1,3}(?:,\d{3})+|\d+)\.\d{2})$",
        ),
        AMEX_ROW_FORMATS,
    )
    .expect("amex grammar compiles")
});

static ACCOUNT_ENDING: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"account\s+ending\s+in[\s:]*(\d{5})\b",
        r"account\s+ending[\s:]*(\d{5})\b",
        r"card\s+ending\s+in[\s:]*(\d{5})\b",
        r"xxxxx\s+xxxxx\s+x(\d{5})\b",
    ]
    .iter()
    .map(|p| RegexBuilder::new(p).case_insensitive(true).build().expect("valid amex pattern"))
    .collect()
});

static NEW_BALANCE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"New\s+Balance[:\s]*\$?\s*(\d[\d,]*(?:\.\d{1,2})?)")
        .case_insensitive(true)
        .build()
        .expect("valid amex pattern")
});

static CLOSING_DATE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(&format!(r"Closing\s+Date[:\s\-]*({DATE_TOKEN})"))
        .case_insensitive(true)
        .build()
        .expect("valid amex pattern")
});

pub struct AmexParser;

impl AmexParser {
    pub fn new() -> Self {
        AmexParser
    }

    /// Last four of the five-digit account ending
    fn account_last_four(text: &str) -> Option<String> {
        ACCOUNT_ENDING
            .iter()
            .find_map(|p| p.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str()[1..].to_string())
    }
}

impl Default for AmexParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementParser for AmexParser {
    fn bank(&self) -> BankCode {
        BankCode::Amex
    }

    fn date_formats(&self) -> &'static [&'static str] {
        AMEX_DATE_FORMATS
    }

    fn line_grammar(&self) -> &LineGrammar {
        &AMEX_GRAMMAR
    }

    fn parse_header(&self, source: &dyn TextSource) -> StatementHeader {
        let mut header = header::parse_header(source, self.date_formats());

        if let Some(last_four) = Self::account_last_four(source.primary_text())
            .or_else(|| Self::account_last_four(source.fallback_text()))
        {
            header.card_last_four = Some(last_four);
        }
        if header.statement_date.is_none() {
            header.statement_date = find_date(source, &CLOSING_DATE, self.date_formats());
        }
        if header.closing_balance_cents.is_none() {
            header.closing_balance_cents = find_amount(source, &NEW_BALANCE);
        }
        header
    }
}
