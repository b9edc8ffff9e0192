// 🏷️ Categorization Rules - Rules as Data
// Merchant-key normalization and ordered keyword rules for spending categories

use anyhow::{Context as AnyhowContext, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Category assigned when neither an override nor a rule applies
pub const UNCATEGORIZED: &str = "uncategorized";

/// Public taxonomy accepted for overrides
pub const CATEGORIES: &[&str] = &[
    "food",
    "shopping",
    "personal_care",
    "fuel",
    "travel",
    "utilities",
    "entertainment",
    "health",
    "fees",
    "transfer",
    "payment",
    "other",
    UNCATEGORIZED,
];

pub fn is_known_category(category: &str) -> bool {
    CATEGORIES.contains(&category)
}

// ============================================================================
// MERCHANT KEY
// ============================================================================

/// Exact-match key for a merchant/description: trimmed, upper-cased,
/// internal whitespace collapsed to single spaces. `None` and `""` give `""`.
pub fn normalize_merchant<'a>(text: impl Into<Option<&'a str>>) -> String {
    match text.into() {
        Some(t) => t.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase(),
        None => String::new(),
    }
}

// ============================================================================
// RULE DEFINITION
// ============================================================================

/// Serialized form of a rule, as stored in a rules file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Rule ID for tracking
    pub id: String,

    /// Category to assign
    pub category: String,

    /// Regex matched against the normalized merchant key
    pub pattern: String,

    /// Description/notes about this rule
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub id: String,
    pub category: String,
    pattern: Regex,
}

impl CategoryRule {
    pub fn new(id: &str, category: &str, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("Invalid pattern for rule '{}': {}", id, pattern))?;
        Ok(CategoryRule {
            id: id.to_string(),
            category: category.to_string(),
            pattern,
        })
    }

    /// Check if the rule matches an already-normalized merchant key
    pub fn matches(&self, merchant_key: &str) -> bool {
        self.pattern.is_match(merchant_key)
    }
}

impl TryFrom<RuleDefinition> for CategoryRule {
    type Error = anyhow::Error;

    fn try_from(def: RuleDefinition) -> Result<Self> {
        CategoryRule::new(&def.id, &def.category, &def.pattern)
    }
}

// ============================================================================
// RULE ENGINE
// ============================================================================

/// Ordered rule list. Registration order is evaluation order; first match wins.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<CategoryRule>,
}

const DEFAULT_RULES: &[(&str, &str, &str)] = &[
    ("payment", "payment", r"\bPAYMENT\b|\bPAYMENT\s+RECEIVED\b|\bCC\s+PAYMENT\b"),
    (
        "fees",
        "fees",
        r"\bFEE\b|\bCHARGE\b|\bSURCHARGE\b|\bGST\b|\bTAX\b|\bLATE\b|\bANNUAL\b|\bWAIVER\b",
    ),
    (
        "fuel",
        "fuel",
        r"\bFUELS?\b|\bPETROL\b|\bDIESEL\b|\bSHELL\b|\bHPCL\b|\bIOCL\b|\bBPCL\b",
    ),
    (
        "health",
        "health",
        concat!(
            r"\bPHARM\b|\bPHARMACY\b|\bPHARMACIES\b|\bHOSP\b|\bHOSPITAL\b|",
            r"\bCLINIC\b|\bMED\b|\bAPOLLO\b",
        ),
    ),
    ("personal_care", "personal_care", r"\bSALON\b|\bBARBER\b|\bPARLOUR\b|\bPARLOR\b"),
    ("cleartrip", "travel", r"CLEARTRIP"),
    ("reliance_retail", "shopping", r"RELIANCE\s*RETAIL"),
    (
        "utilities",
        "utilities",
        concat!(
            r"\bELECTRIC\b|\bWATER\b|\bGAS\b|\bBROADBAND\b|\bINTERNET\b|",
            r"\bMOBILE\b|\bRECHARGE\b|\bUTILITY\b",
        ),
    ),
    (
        "travel",
        "travel",
        r"\bIRCTC\b|\bAIR\b|\bAIRLINE\b|\bHOTEL\b|\bUBER\b|\bOLA\b|\bTERMINAL\b|\bTRAVEL\b",
    ),
    (
        "entertainment",
        "entertainment",
        concat!(
            r"\bNETFLIX\b|\bSPOTIFY\b|\bPRIME\b|\bHOTSTAR\b|\bAPPLE\s+SERVICES\b|",
            r"\bGOOGLE\b|\bYOUTUBE\b",
        ),
    ),
    (
        "food",
        "food",
        r"\bSWIGGY\b|\bZOMATO\b|\bSTARBUCKS\b|\bCAFE\b|\bRESTAURANT\b|\bBAKERY\b|\bFOODS?\b",
    ),
    ("shopping", "shopping", r"\bAMAZON\b|\bFLIPKART\b|\bMYNTRA\b|\bSHOP\b|\bSTORE\b|\bMART\b"),
    // Payment rails last so merchant hints win (UPI-Apple Services → entertainment)
    ("transfer", "transfer", r"\bIMPS\b|\bNEFT\b|\bRTGS\b|\bTRANSFER\b"),
];

/// Built-in rules, compiled once per process
pub static BUILTIN_RULES: Lazy<RuleEngine> = Lazy::new(|| {
    let rules = DEFAULT_RULES
        .iter()
        .map(|(id, category, pattern)| CategoryRule::new(id, category, pattern))
        .collect::<Result<Vec<_>>>()
        .expect("built-in rules compile");
    RuleEngine { rules }
});

impl RuleEngine {
    /// Create a new empty rule engine
    pub fn new() -> Self {
        RuleEngine { rules: Vec::new() }
    }

    /// Copy of the built-in rule list
    pub fn builtin() -> Self {
        BUILTIN_RULES.clone()
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let definitions: Vec<RuleDefinition> =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        RuleEngine::from_definitions(definitions)
    }

    pub fn from_definitions(definitions: Vec<RuleDefinition>) -> Result<Self> {
        let rules = definitions
            .into_iter()
            .map(CategoryRule::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(RuleEngine { rules })
    }

    /// Append a rule after all existing ones
    pub fn add_rule(&mut self, rule: CategoryRule) {
        self.rules.push(rule);
    }

    /// First rule matching the merchant text, after normalization
    pub fn find_rule(&self, merchant: &str) -> Option<&CategoryRule> {
        let key = normalize_merchant(merchant);
        if key.is_empty() {
            return None;
        }
        self.rules.iter().find(|r| r.matches(&key))
    }

    /// Category from the first matching rule, or "uncategorized"
    pub fn classify(&self, merchant: &str) -> String {
        self.find_rule(merchant)
            .map(|r| r.category.clone())
            .unwrap_or_else(|| UNCATEGORIZED.to_string())
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_empty_and_none() {
        assert_eq!(normalize_merchant(""), "");
        assert_eq!(normalize_merchant(None), "");
        assert_eq!(normalize_merchant("   \t  "), "");
    }

    #[test]
    fn test_normalize_trims_uppercases_collapses() {
        assert_eq!(normalize_merchant("  UPI-Apple   Services  "), "UPI-APPLE SERVICES");
        assert_eq!(normalize_merchant("swiggy\n\tbangalore"), "SWIGGY BANGALORE");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in ["", "  a  b ", "UPI-Apple   Services", "ünïcode  straße", "\u{a0}x\u{a0} y"] {
            let once = normalize_merchant(input);
            assert_eq!(normalize_merchant(once.as_str()), once, "input: {:?}", input);
        }
    }

    #[test]
    fn test_builtin_rules() {
        let engine = RuleEngine::builtin();
        assert_eq!(engine.classify("APOLLO PHARMACIES LIMI IN"), "health");
        assert_eq!(engine.classify("UPI-Apple Services"), "entertainment");
        assert_eq!(engine.classify("SWIGGY BANGALORE"), "food");
        assert_eq!(engine.classify("FUEL SURCHARGE WAIVER"), "fees");
        assert_eq!(engine.classify("HPCL PETROL PUMP"), "fuel");
        assert_eq!(engine.classify("UPI-T2 UNISEX SALON"), "personal_care");
        assert_eq!(engine.classify("CLEARTRIP PVT LTD"), "travel");
        assert_eq!(engine.classify("RELIANCE RETAIL LTD"), "shopping");
        assert_eq!(engine.classify("NEFT TRANSFER"), "transfer");
        assert_eq!(engine.classify("PAYMENT RECEIVED THANK YOU"), "payment");
    }

    #[test]
    fn test_no_match_is_uncategorized() {
        let engine = RuleEngine::builtin();
        assert_eq!(engine.classify("ZZZ UNKNOWN VENDOR"), UNCATEGORIZED);
        assert_eq!(engine.classify(""), UNCATEGORIZED);
        assert!(RuleEngine::new().find_rule("SWIGGY").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let mut engine = RuleEngine::new();
        engine.add_rule(CategoryRule::new("coffee", "food", r"STARBUCKS").unwrap());
        engine.add_rule(CategoryRule::new("airport", "travel", r"TERMINAL").unwrap());

        let rule = engine.find_rule("starbucks terminal 2").unwrap();
        assert_eq!(rule.id, "coffee");
        assert_eq!(engine.rule_count(), 2);
    }

    #[test]
    fn test_from_definitions_rejects_bad_regex() {
        let defs = vec![RuleDefinition {
            id: "broken".to_string(),
            category: "food".to_string(),
            pattern: "(".to_string(),
            description: None,
        }];
        assert!(RuleEngine::from_definitions(defs).is_err());
    }

    #[test]
    fn test_definitions_from_json() {
        let json = r#"[{"id": "gym", "category": "health", "pattern": "\\bGYM\\b"}]"#;
        let defs: Vec<RuleDefinition> = serde_json::from_str(json).unwrap();
        let engine = RuleEngine::from_definitions(defs).unwrap();
        assert_eq!(engine.classify("gold's gym"), "health");
    }

    #[test]
    fn test_taxonomy() {
        assert!(is_known_category("food"));
        assert!(is_known_category(UNCATEGORIZED));
        assert!(!is_known_category("Food"));
    }
}
