// 🗂️ Categorization - user override → ordered rules → "uncategorized"
//
// Overrides live in persistence and are reached through `OverrideStore`.
// Writing an override retroactively recategorizes the user's debits for
// that merchant key; credits are never touched.

use crate::error::{Result, StatementError};
use crate::rules::{is_known_category, normalize_merchant, RuleEngine, UNCATEGORIZED};
use crate::statement::ParsedStatement;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

// ============================================================================
// OVERRIDE STORE
// ============================================================================

/// A user's category choice for one merchant key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantOverride {
    pub user_id: String,
    pub merchant_key: String,
    pub category: String,
}

/// Result of a user override request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideOutcome {
    pub merchant_key: String,
    pub category: String,
    pub updated_transactions_count: usize,
}

/// Persistence seam for merchant overrides.
///
/// Both write operations must be atomic: the override row and the affected
/// transactions change together or not at all.
pub trait OverrideStore {
    fn find_override(&self, user_id: &str, merchant_key: &str) -> Result<Option<String>>;

    /// Upsert (last write wins) and set `category` on the user's debits with
    /// this key. Returns the number of transactions updated.
    fn upsert_override(&self, user_id: &str, merchant_key: &str, category: &str) -> Result<usize>;

    /// Delete the override and reset the user's debits with this key to
    /// `fallback_category`. Returns None when no override existed.
    fn delete_override(
        &self,
        user_id: &str,
        merchant_key: &str,
        fallback_category: &str,
    ) -> Result<Option<usize>>;

    fn list_overrides(&self, user_id: &str) -> Result<Vec<MerchantOverride>>;
}

// ============================================================================
// CATEGORIZER
// ============================================================================

pub struct Categorizer<'a> {
    rules: &'a RuleEngine,
    store: &'a dyn OverrideStore,
}

impl<'a> Categorizer<'a> {
    pub fn new(rules: &'a RuleEngine, store: &'a dyn OverrideStore) -> Self {
        Categorizer { rules, store }
    }

    /// Category for a raw merchant/description as seen by `user_id`
    pub fn categorize(&self, user_id: &str, merchant_raw: &str) -> Result<String> {
        let key = normalize_merchant(merchant_raw);
        if key.is_empty() {
            return Ok(UNCATEGORIZED.to_string());
        }
        if let Some(category) = self.store.find_override(user_id, &key)? {
            return Ok(category);
        }
        Ok(self.rules.classify(&key))
    }

    /// Fill the category of every transaction. Each merchant key is
    /// resolved once per statement.
    pub fn categorize_statement(
        &self,
        user_id: &str,
        statement: &mut ParsedStatement,
    ) -> Result<()> {
        let mut resolved: HashMap<String, String> = HashMap::new();

        for txn in statement.transactions.iter_mut() {
            let category = match resolved.get(&txn.merchant_key) {
                Some(c) => c.clone(),
                None => {
                    let c = self.categorize(user_id, &txn.merchant_key)?;
                    resolved.insert(txn.merchant_key.clone(), c.clone());
                    c
                }
            };
            txn.category = Some(category);
        }
        Ok(())
    }

    pub fn apply_override(
        &self,
        user_id: &str,
        merchant: &str,
        category: &str,
    ) -> Result<OverrideOutcome> {
        let merchant_key = normalize_merchant(merchant);
        if merchant_key.is_empty() {
            return Err(StatementError::EmptyMerchant);
        }
        let category = category.trim().to_lowercase();
        if !is_known_category(&category) {
            return Err(StatementError::InvalidCategory(category));
        }

        let updated = self.store.upsert_override(user_id, &merchant_key, &category)?;
        info!(
            user = %user_id,
            merchant = %merchant_key,
            category = %category,
            updated,
            "override applied"
        );

        Ok(OverrideOutcome {
            merchant_key,
            category,
            updated_transactions_count: updated,
        })
    }

    /// Drop an override; the user's debits fall back to the rules
    pub fn remove_override(
        &self,
        user_id: &str,
        merchant: &str,
    ) -> Result<Option<OverrideOutcome>> {
        let merchant_key = normalize_merchant(merchant);
        if merchant_key.is_empty() {
            return Err(StatementError::EmptyMerchant);
        }
        let category = self.rules.classify(&merchant_key);

        let outcome = self
            .store
            .delete_override(user_id, &merchant_key, &category)?
            .map(|updated| OverrideOutcome {
                merchant_key,
                category,
                updated_transactions_count: updated,
            });

        if let Some(o) = &outcome {
            info!(
                user = %user_id,
                merchant = %o.merchant_key,
                updated = o.updated_transactions_count,
                "override removed"
            );
        }
        Ok(outcome)
    }

    pub fn overrides(&self, user_id: &str) -> Result<Vec<MerchantOverride>> {
        self.store.list_overrides(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::extract::ExtractionResult;
    use crate::parser::{GenericParser, StatementParser};

    fn statement() -> ParsedStatement {
        let text = "\
Statement Date 15 Jan 2026
01 Jan 26 SWIGGY BANGALORE 450.00 D
02 Jan 26 UPI-Apple   Services 179.00 D
03 Jan 26 MYSTERY VENDOR 99.00 D
04 Jan 26 PAYMENT RECEIVED 500.00 C
";
        GenericParser::new().parse(&ExtractionResult::from_texts(text, ""))
    }

    #[test]
    fn test_rules_then_uncategorized() {
        let db = Database::open_in_memory().unwrap();
        let rules = RuleEngine::builtin();
        let categorizer = Categorizer::new(&rules, &db);

        assert_eq!(categorizer.categorize("u1", "  swiggy   bangalore ").unwrap(), "food");
        assert_eq!(categorizer.categorize("u1", "UPI-Apple Services").unwrap(), "entertainment");
        assert_eq!(categorizer.categorize("u1", "MYSTERY VENDOR").unwrap(), UNCATEGORIZED);
        assert_eq!(categorizer.categorize("u1", "").unwrap(), UNCATEGORIZED);
    }

    #[test]
    fn test_override_wins_for_that_user_only() {
        let db = Database::open_in_memory().unwrap();
        let rules = RuleEngine::builtin();
        let categorizer = Categorizer::new(&rules, &db);

        categorizer.apply_override("u1", "swiggy bangalore", "shopping").unwrap();

        assert_eq!(categorizer.categorize("u1", "SWIGGY BANGALORE").unwrap(), "shopping");
        assert_eq!(categorizer.categorize("u2", "SWIGGY BANGALORE").unwrap(), "food");
    }

    #[test]
    fn test_categorize_statement_fills_every_transaction() {
        let db = Database::open_in_memory().unwrap();
        let rules = RuleEngine::builtin();
        let categorizer = Categorizer::new(&rules, &db);

        let mut statement = statement();
        categorizer.categorize_statement("u1", &mut statement).unwrap();

        let categories: Vec<_> = statement
            .transactions
            .iter()
            .map(|t| t.category.as_deref().unwrap())
            .collect();
        assert_eq!(categories, vec!["food", "entertainment", UNCATEGORIZED, "payment"]);
    }

    #[test]
    fn test_apply_override_validates_input() {
        let db = Database::open_in_memory().unwrap();
        let rules = RuleEngine::builtin();
        let categorizer = Categorizer::new(&rules, &db);

        let err = categorizer.apply_override("u1", "SWIGGY", "groceries").unwrap_err();
        assert!(matches!(err, StatementError::InvalidCategory(ref c) if c == "groceries"));

        let err = categorizer.apply_override("u1", "   ", "food").unwrap_err();
        assert!(matches!(err, StatementError::EmptyMerchant));

        let outcome = categorizer.apply_override("u1", " swiggy ", " Food ").unwrap();
        assert_eq!(outcome.merchant_key, "SWIGGY");
        assert_eq!(outcome.category, "food");
        assert_eq!(outcome.updated_transactions_count, 0);
    }

    #[test]
    fn test_last_override_wins() {
        let db = Database::open_in_memory().unwrap();
        let rules = RuleEngine::builtin();
        let categorizer = Categorizer::new(&rules, &db);

        categorizer.apply_override("u1", "MYSTERY VENDOR", "shopping").unwrap();
        categorizer.apply_override("u1", "mystery vendor", "travel").unwrap();

        let overrides = categorizer.overrides("u1").unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].category, "travel");
    }

    #[test]
    fn test_remove_override_restores_rule_category() {
        let db = Database::open_in_memory().unwrap();
        let rules = RuleEngine::builtin();
        let categorizer = Categorizer::new(&rules, &db);

        let mut statement = statement();
        categorizer.categorize_statement("u1", &mut statement).unwrap();
        db.save_statement("u1", &statement).unwrap();

        categorizer.apply_override("u1", "SWIGGY BANGALORE", "shopping").unwrap();
        let removed = categorizer.remove_override("u1", "SWIGGY BANGALORE").unwrap().unwrap();
        assert_eq!(removed.category, "food");
        assert_eq!(removed.updated_transactions_count, 1);

        assert!(categorizer.remove_override("u1", "SWIGGY BANGALORE").unwrap().is_none());
        assert_eq!(categorizer.categorize("u1", "SWIGGY BANGALORE").unwrap(), "food");
    }
}
