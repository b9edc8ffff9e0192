// 🔍 Bank Detector - identify the issuer from extracted statement text
//
// Signatures are checked in registration order against the primary text,
// then against the fallback text. If two banks match, the first registered
// wins; statements that mention another issuer (e.g. a UPI transfer to an
// HDFC account on an SBI statement) resolve to whichever bank is listed first.

use crate::banks::BankCode;
use crate::extract::TextSource;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::debug;

struct BankSignature {
    bank: BankCode,
    patterns: Vec<Regex>,
}

impl BankSignature {
    fn new(bank: BankCode, patterns: &[&str]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .expect("valid bank signature")
            })
            .collect();
        BankSignature { bank, patterns }
    }

    fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

static SIGNATURES: Lazy<Vec<BankSignature>> = Lazy::new(|| {
    vec![
        BankSignature::new(
            BankCode::Hdfc,
            &[r"HDFC\s+Bank", r"hdfcbank\.com", r"HDFC\s+Credit\s+Card"],
        ),
        BankSignature::new(
            BankCode::Icici,
            &[r"ICICI\s+Bank", r"icicibank\.com", r"ICICI\s+Credit\s+Card"],
        ),
        BankSignature::new(
            BankCode::Sbi,
            &[r"State\s+Bank\s+of\s+India", r"SBI\s+Card", r"sbicard\.com"],
        ),
        BankSignature::new(
            BankCode::Amex,
            &[r"American\s+Express", r"americanexpress\.com", r"\bAMEX\b"],
        ),
        BankSignature::new(
            BankCode::Citi,
            &[r"Citibank", r"citi\.com", r"Citi\s+Credit\s+Card"],
        ),
        BankSignature::new(
            BankCode::Chase,
            &[r"JPMorgan\s+Chase", r"chase\.com", r"Chase\s+Credit\s+Card"],
        ),
    ]
});

pub struct BankDetector;

impl BankDetector {
    pub fn new() -> Self {
        BankDetector
    }

    /// Issuer of the statement, or `BankCode::Unknown`
    pub fn detect(&self, source: &dyn TextSource) -> BankCode {
        if let Some(bank) = Self::match_text(source.primary_text()) {
            debug!(bank = %bank, "bank detected from primary text");
            return bank;
        }
        if let Some(bank) = Self::match_text(source.fallback_text()) {
            debug!(bank = %bank, "bank detected from fallback text");
            return bank;
        }
        debug!("no bank signature matched");
        BankCode::Unknown
    }

    fn match_text(text: &str) -> Option<BankCode> {
        if text.trim().is_empty() {
            return None;
        }
        SIGNATURES.iter().find(|s| s.matches(text)).map(|s| s.bank)
    }

    /// Banks in the order their signatures are checked
    pub fn registered_banks(&self) -> Vec<BankCode> {
        SIGNATURES.iter().map(|s| s.bank).collect()
    }
}

impl Default for BankDetector {
    fn default() -> Self {
        Self::new()
    }
}
