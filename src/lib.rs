// Statement Parser - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod balance;
pub mod banks;
pub mod categorize;
pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod extract;
pub mod parser;
pub mod pipeline;
pub mod rules;
pub mod statement;

// Re-export commonly used types
pub use balance::{BalanceChecker, SummaryCheck};
pub use banks::{bank_logo, BankCode};
pub use categorize::{Categorizer, MerchantOverride, OverrideOutcome, OverrideStore};
pub use config::Settings;
pub use db::{Database, StoredStatement, StoredTransaction};
pub use detector::BankDetector;
pub use error::{ExtractionFailure, Result, StatementError};
pub use extract::{ExtractionResult, PdfExtractor, RawDocument, TextSource};
pub use parser::{get_parser, GenericParser, ParserRegistry, StatementParser};
pub use pipeline::{run_with_timeout, StatementPipeline};
pub use rules::{normalize_merchant, CategoryRule, RuleEngine, UNCATEGORIZED};
pub use statement::{
    Direction, ParseMetadata, ParsedStatement, ParsedTransaction, StatementHeader, TextStrategy,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
