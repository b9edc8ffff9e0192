// 🏦 Bank metadata - issuer codes, display names, logo references

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Issuing bank identifier, or the `Unknown` sentinel when no signature matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankCode {
    Hdfc,
    Icici,
    Sbi,
    Amex,
    Citi,
    Chase,
    Unknown,
}

impl BankCode {
    /// Every known issuer, in detection order
    pub const KNOWN: [BankCode; 6] = [
        BankCode::Hdfc,
        BankCode::Icici,
        BankCode::Sbi,
        BankCode::Amex,
        BankCode::Citi,
        BankCode::Chase,
    ];

    /// Human-readable name for display
    pub fn name(&self) -> &'static str {
        match self {
            BankCode::Hdfc => "HDFC Bank",
            BankCode::Icici => "ICICI Bank",
            BankCode::Sbi => "SBI Card",
            BankCode::Amex => "American Express",
            BankCode::Citi => "Citibank",
            BankCode::Chase => "JPMorgan Chase",
            BankCode::Unknown => "Unknown issuer",
        }
    }

    /// Short code for storage and lookups
    pub fn code(&self) -> &'static str {
        match self {
            BankCode::Hdfc => "hdfc",
            BankCode::Icici => "icici",
            BankCode::Sbi => "sbi",
            BankCode::Amex => "amex",
            BankCode::Citi => "citi",
            BankCode::Chase => "chase",
            BankCode::Unknown => "unknown",
        }
    }

    /// Parse a stored code; anything unrecognized is `Unknown`
    pub fn from_code(code: &str) -> BankCode {
        let code = code.trim();
        BankCode::KNOWN
            .iter()
            .copied()
            .find(|b| b.code().eq_ignore_ascii_case(code))
            .unwrap_or(BankCode::Unknown)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, BankCode::Unknown)
    }

    pub fn logo(&self) -> Option<&'static str> {
        bank_logo(self.code())
    }
}

impl fmt::Display for BankCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// LOGO LOOKUP
// ============================================================================

static BANK_LOGOS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([("hdfc", "/static/banks/hdfc.svg")])
});

/// Logo reference for a bank code. Blank or unknown codes have none.
pub fn bank_logo(code: &str) -> Option<&'static str> {
    let key = code.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }
    BANK_LOGOS.get(key.as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_from_code() {
        for bank in BankCode::KNOWN {
            assert_eq!(BankCode::from_code(bank.code()), bank);
        }
        assert_eq!(BankCode::from_code(" SBI "), BankCode::Sbi);
        assert_eq!(BankCode::from_code("monzo"), BankCode::Unknown);
        assert!(BankCode::from_code("").is_unknown());
        assert!(!BankCode::Amex.is_unknown());
    }

    #[test]
    fn test_bank_logo_lookup() {
        assert_eq!(bank_logo("hdfc"), Some("/static/banks/hdfc.svg"));
        assert_eq!(bank_logo("  HDFC "), Some("/static/banks/hdfc.svg"));
        assert_eq!(bank_logo("sbi"), None);
        assert_eq!(bank_logo(""), None);
        assert_eq!(bank_logo("   "), None);
        assert_eq!(BankCode::Hdfc.logo(), Some("/static/banks/hdfc.svg"));
    }

    #[test]
    fn test_serializes_as_code() {
        assert_eq!(serde_json::to_string(&BankCode::Amex).unwrap(), "\"amex\"");
        assert_eq!(serde_json::to_string(&BankCode::Unknown).unwrap(), "\"unknown\"");
    }
}
