// 🔄 Statement pipeline - bytes → extraction → detection → parser → categories
//
// Parsing is synchronous. Callers that need a wall-clock bound use
// `parse_with_timeout`, which parks the parse on a worker thread and
// abandons it once the budget is spent.

use crate::balance::BalanceChecker;
use crate::banks::BankCode;
use crate::categorize::{Categorizer, OverrideStore};
use crate::config::Settings;
use crate::detector::BankDetector;
use crate::error::{Result, StatementError};
use crate::extract::{ExtractionResult, PdfExtractor, RawDocument, TextSource};
use crate::parser::ParserRegistry;
use crate::rules::RuleEngine;
use crate::statement::ParsedStatement;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

pub struct StatementPipeline {
    settings: Settings,
    extractor: PdfExtractor,
    detector: BankDetector,
    rules: RuleEngine,
}

impl StatementPipeline {
    /// Pipeline with the built-in categorization rules
    pub fn new(settings: Settings) -> Self {
        StatementPipeline {
            settings,
            extractor: PdfExtractor::new(),
            detector: BankDetector::new(),
            rules: RuleEngine::builtin(),
        }
    }

    /// Pipeline honouring `rules_path` when the settings name one
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let rules = match &settings.rules_path {
            Some(path) => RuleEngine::from_file(path)?,
            None => RuleEngine::builtin(),
        };
        Ok(Self::new(settings).with_rules(rules))
    }

    pub fn with_rules(mut self, rules: RuleEngine) -> Self {
        self.rules = rules;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.parse_timeout_secs)
    }

    fn checker(&self) -> BalanceChecker {
        BalanceChecker::with_thresholds(
            self.settings.summary_tolerance,
            self.settings.summary_major_threshold,
        )
    }

    /// Size check, decryption and both extraction passes. `password` is only
    /// consulted when the empty user password does not open the document.
    pub fn extract(
        &self,
        bytes: Vec<u8>,
        password: Option<&str>,
    ) -> Result<(RawDocument, ExtractionResult)> {
        let document = RawDocument::new(bytes, self.settings.max_document_bytes)?;
        let extraction = self.extractor.extract(&document, password)?;
        if extraction.is_blank() {
            warn!(bytes = document.len(), "document has no extractable text");
        }
        Ok((document, extraction))
    }

    pub fn detect_bytes(&self, bytes: Vec<u8>, password: Option<&str>) -> Result<BankCode> {
        let (_, extraction) = self.extract(bytes, password)?;
        Ok(self.detector.detect(&extraction))
    }

    /// Full parse of a PDF payload. The result carries the document fingerprint.
    pub fn parse_bytes(&self, bytes: Vec<u8>, password: Option<&str>) -> Result<ParsedStatement> {
        let (document, extraction) = self.extract(bytes, password)?;
        let mut statement = self.parse_source(&extraction)?;
        statement.document_hash = Some(document.fingerprint());
        Ok(statement)
    }

    /// Detect and parse already-extracted text
    pub fn parse_source(&self, source: &dyn TextSource) -> Result<ParsedStatement> {
        let bank = self.detector.detect(source);
        if bank.is_unknown() {
            info!("no issuer signature matched, using the generic parser");
        }
        let parser = ParserRegistry::global().resolve(bank, &self.settings)?;
        let statement = parser.parse_with_checker(source, &self.checker());

        if statement.is_incomplete() {
            warn!(
                bank = %bank,
                missing = ?statement.metadata.missing_fields,
                "statement is incomplete"
            );
        }
        Ok(statement)
    }

    /// Fill transaction categories for `user_id`
    pub fn categorize(
        &self,
        user_id: &str,
        statement: &mut ParsedStatement,
        store: &dyn OverrideStore,
    ) -> Result<()> {
        Categorizer::new(&self.rules, store).categorize_statement(user_id, statement)
    }

    /// `parse_bytes` bounded by the configured timeout
    pub fn parse_with_timeout(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        password: Option<String>,
    ) -> Result<ParsedStatement> {
        let pipeline = Arc::clone(self);
        run_with_timeout(self.timeout(), move || pipeline.parse_bytes(bytes, password.as_deref()))
    }
}

impl Default for StatementPipeline {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

/// Run `job` on a worker thread and wait at most `timeout` for its result.
/// A late result is discarded.
pub fn run_with_timeout<T, F>(timeout: Duration, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        // receiver may be gone after a timeout
        let _ = sender.send(job());
    });

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            info!(secs = timeout.as_secs(), "parse timed out");
            Err(StatementError::TimeoutExceeded {
                secs: timeout.as_secs(),
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(StatementError::WorkerLost),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::ExtractionFailure;

    const SBI_TEXT: &str = "\
SBI Card
Statement Date 15 Jan 2026
Previous Balance 0.00
Total Amount Due 1,588.82
15 Dec 25 APOLLO PHARMACIES LIMI IN 1,138.82 D
16 Dec 25 SWIGGY 450.00 D
";

    #[test]
    fn test_parse_source_routes_to_detected_bank() {
        let pipeline = StatementPipeline::default();
        let statement = pipeline
            .parse_source(&ExtractionResult::from_texts(SBI_TEXT, ""))
            .unwrap();

        assert_eq!(statement.bank, BankCode::Sbi);
        assert_eq!(statement.transactions.len(), 2);
        assert!(statement.metadata.summary.is_balanced());
    }

    #[test]
    fn test_disabled_bank_is_unsupported() {
        let settings = Settings {
            disabled_banks: vec!["sbi".to_string()],
            ..Settings::default()
        };
        let err = StatementPipeline::new(settings)
            .parse_source(&ExtractionResult::from_texts(SBI_TEXT, ""))
            .unwrap_err();
        assert!(matches!(err, StatementError::UnsupportedBank(_)));
    }

    #[test]
    fn test_oversized_and_invalid_payloads() {
        let settings = Settings {
            max_document_bytes: 8,
            ..Settings::default()
        };
        let pipeline = StatementPipeline::new(settings);

        let err = pipeline.parse_bytes(vec![b'x'; 9], None).unwrap_err();
        assert!(matches!(err, StatementError::DocumentTooLarge { size: 9, max: 8 }));

        let err = pipeline.parse_bytes(Vec::new(), None).unwrap_err();
        assert!(matches!(err, StatementError::Extraction(ExtractionFailure::Empty)));

        let err = pipeline.parse_bytes(b"hello".to_vec(), Some("secret")).unwrap_err();
        assert!(matches!(err, StatementError::Extraction(ExtractionFailure::NotPdf(_))));
    }

    #[test]
    fn test_categorize_fills_categories() {
        let pipeline = StatementPipeline::default();
        let db = Database::open_in_memory().unwrap();
        let mut statement = pipeline
            .parse_source(&ExtractionResult::from_texts(SBI_TEXT, ""))
            .unwrap();

        pipeline.categorize("u1", &mut statement, &db).unwrap();
        assert_eq!(statement.transactions[0].category.as_deref(), Some("health"));
        assert_eq!(statement.transactions[1].category.as_deref(), Some("food"));
    }

    #[test]
    fn test_run_with_timeout() {
        let ok = run_with_timeout(Duration::from_secs(5), || Ok(42)).unwrap();
        assert_eq!(ok, 42);

        let err = run_with_timeout(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, StatementError::TimeoutExceeded { .. }));

        let err = run_with_timeout::<(), _>(Duration::from_secs(5), || panic!("worker died"))
            .unwrap_err();
        assert!(matches!(err, StatementError::WorkerLost));
    }
}
