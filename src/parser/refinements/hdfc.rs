// HDFC Bank
//
// Rows are dated DD/MM/YYYY (optionally followed by a time) or DD-MMM-YY,
// and only credits carry a marker:
//   15/01/2025 14:32:10 SWIGGY BANGALORE 450.00
//   16/01/2025 PAYMENT RECEIVED - THANK YOU 10,000.00 Cr
// Reconciliation between the two text candidates is unchanged.

use crate::banks::BankCode;
use crate::parser::grammar::{LineGrammar, AMOUNT_2DP, MONTHS};
use crate::parser::StatementParser;
use once_cell::sync::Lazy;

const HDFC_DATE_FORMATS: &[&str] = &[
    "%d-%b-%y",
    "%d-%b-%Y",
    "%d/%m/%y",
    "%d/%m/%Y",
    "%d %b %y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%m-%y",
    "%d-%m-%Y",
];

static HDFC_GRAMMAR: Lazy<LineGrammar> = Lazy::new(|| {
    let date = format!(r"\d{{2}}/\d{{2}}/\d{{4}}|\d{{1,2}}-(?:{MONTHS})-\d{{2,4}}");
    let time = r"(?: \d{2}:\d{2}(?::\d{2})?)?";
    LineGrammar::new(
        &format!(r"^(?:{date})\b"),
        &format!(
            r"^(?P<date>{date}){time} (?P<desc>.+?) (?P<amount>{AMOUNT_2DP})(?: ?(?P<dir>Cr|Dr))?$"
        ),
        HDFC_DATE_FORMATS,
    )
    .expect("hdfc grammar compiles")
});

pub struct HdfcParser;

impl HdfcParser {
    pub fn new() -> Self {
        HdfcParser
    }
}

impl Default for HdfcParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementParser for HdfcParser {
    fn bank(&self) -> BankCode {
        BankCode::Hdfc
    }

    fn date_formats(&self) -> &'static [&'static str] {
        HDFC_DATE_FORMATS
    }

    fn line_grammar(&self) -> &LineGrammar {
        &HDFC_GRAMMAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionResult;
    use crate::statement::Direction;
    use chrono::NaiveDate;

    const STATEMENT: &str = "\
HDFC Bank Credit Card Statement
Statement Date: 15-Jan-25
Payment Due Date: 04-Feb-25
Opening Balance 0.00
Total Amount Due 11,229.00
Domestic Transactions
Date Transaction Description Amount (in Rs.)
02/01/2025 14:32:10 SWIGGY BANGALORE 450.00
05/01/2025 AMAZON PAY INDIA 1,299.00
07-Jan-25 MAKEMYTRIP INDIA 9,980.00
10/01/2025 REFUND AMAZON 500.00 Cr
11/01/2025 BAD ROW 12.5
";

    #[test]
    fn test_hdfc_rows_and_dates() {
        let statement = HdfcParser::new().parse(&ExtractionResult::from_texts(STATEMENT, ""));

        assert_eq!(statement.bank, BankCode::Hdfc);
        assert_eq!(statement.transactions.len(), 4);
        assert_eq!(statement.metadata.malformed_lines, 1);

        let swiggy = &statement.transactions[0];
        assert_eq!(swiggy.date, NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
        assert_eq!(swiggy.description, "SWIGGY BANGALORE");
        assert_eq!(swiggy.direction, Direction::Debit);

        assert_eq!(statement.transactions[2].date, NaiveDate::from_ymd_opt(2025, 1, 7).unwrap());
        assert_eq!(statement.transactions[3].direction, Direction::Credit);

        assert_eq!(statement.header.statement_date, NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(statement.header.due_date, NaiveDate::from_ymd_opt(2025, 2, 4));
        assert!(statement.metadata.summary.is_balanced());
    }

    #[test]
    fn test_generic_rows_are_not_hdfc_rows() {
        let scan = HdfcParser::new().scan_transactions("15 Dec 25 SWIGGY 450.00 D");
        assert!(scan.is_empty());
        assert_eq!(scan.malformed_lines, 0);
    }
}
