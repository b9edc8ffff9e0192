// Statement Parser - CLI
// parse / detect statements, manage merchant overrides

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use statement_parser::{
    bank_logo, BankCode, Categorizer, Database, MerchantOverride, OverrideStore, ParsedStatement,
    ParserRegistry, Settings, StatementPipeline,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "statement-parser", version, about = "Credit-card statement PDF parser")]
struct Cli {
    /// JSON settings file (STATEMENT_* environment variables still apply)
    #[arg(long, global = true, env = "STATEMENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a statement PDF and print the result
    Parse {
        pdf: PathBuf,

        /// User whose overrides apply during categorization
        #[arg(long, default_value = "local")]
        user: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Store the parsed statement in the database
        #[arg(long)]
        save: bool,

        #[command(flatten)]
        unlock: Unlock,
    },

    /// Set the category for a merchant and recategorize past debits
    Override {
        #[arg(long)]
        user: String,

        #[arg(long)]
        merchant: String,

        #[arg(long)]
        category: String,
    },

    /// List a user's merchant overrides
    Overrides {
        #[arg(long)]
        user: String,
    },

    /// Print the bank detected for a PDF
    Detect {
        pdf: PathBuf,

        #[command(flatten)]
        unlock: Unlock,
    },

    /// List supported banks
    Banks,
}

#[derive(Args, Debug)]
struct Unlock {
    /// User password of an encrypted statement (tried after the empty password)
    #[arg(long, env = "STATEMENT_PDF_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Csv,
}

/// One CSV line per transaction
#[derive(Serialize)]
struct CsvRow<'a> {
    date: String,
    description: &'a str,
    merchant_key: &'a str,
    amount: String,
    direction: &'static str,
    category: &'a str,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Parse {
            pdf,
            user,
            format,
            save,
            unlock,
        } => run_parse(settings, &pdf, &user, format, save, unlock.password),

        Command::Override {
            user,
            merchant,
            category,
        } => {
            let pipeline = StatementPipeline::from_settings(settings)?;
            let db = open_database(pipeline.settings())?;
            let outcome = Categorizer::new(pipeline.rules(), &db)
                .apply_override(&user, &merchant, &category)?;

            eprintln!(
                "✓ {} → {} ({} transactions updated)",
                outcome.merchant_key, outcome.category, outcome.updated_transactions_count
            );
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }

        Command::Overrides { user } => {
            let db = open_database(&settings)?;
            let overrides = db.list_overrides(&user)?;
            if overrides.is_empty() {
                eprintln!("No overrides for {}", user);
            }
            for o in overrides {
                println!("{:<40} {}", o.merchant_key, o.category);
            }
            Ok(())
        }

        Command::Detect { pdf, unlock } => {
            let pipeline = StatementPipeline::new(settings);
            let bank = pipeline.detect_bytes(read_pdf(&pdf)?, unlock.password.as_deref())?;
            println!("{} ({})", bank.code(), bank.name());
            Ok(())
        }

        Command::Banks => {
            let registry = ParserRegistry::global();
            for bank in BankCode::KNOWN {
                let parser = if registry.has_refinement(bank) { "refined" } else { "generic" };
                let logo = bank_logo(bank.code()).unwrap_or("-");
                println!("{:<6} {:<24} {:<8} {}", bank.code(), bank.name(), parser, logo);
            }
            Ok(())
        }
    }
}

fn run_parse(
    settings: Settings,
    pdf: &Path,
    user: &str,
    format: OutputFormat,
    save: bool,
    password: Option<String>,
) -> Result<()> {
    let pipeline = Arc::new(StatementPipeline::from_settings(settings)?);
    let bytes = read_pdf(pdf)?;

    eprintln!("📄 Parsing {}...", pdf.display());
    let mut statement = pipeline
        .parse_with_timeout(bytes, password)
        .with_context(|| format!("Failed to parse {}", pdf.display()))?;

    // overrides apply whenever a database is around, even without --save
    let db = if save || pipeline.settings().database_path.exists() {
        Some(open_database(pipeline.settings())?)
    } else {
        None
    };
    match &db {
        Some(db) => pipeline.categorize(user, &mut statement, db)?,
        None => pipeline.categorize(user, &mut statement, &NoOverrides)?,
    }

    for warning in statement.warnings() {
        eprintln!("⚠️  {}", warning);
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statement)?),
        OutputFormat::Csv => write_csv(&statement)?,
    }

    if let Some(db) = db.filter(|_| save) {
        let id = db.save_statement(user, &statement)?;
        eprintln!("✓ Saved statement {} ({} transactions)", id, statement.transactions.len());
    }
    Ok(())
}

fn write_csv(statement: &ParsedStatement) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    for t in &statement.transactions {
        writer.serialize(CsvRow {
            date: t.date.format("%Y-%m-%d").to_string(),
            description: &t.description,
            merchant_key: &t.merchant_key,
            amount: format!("{:.2}", t.amount()),
            direction: t.direction.as_str(),
            category: t.category.as_deref().unwrap_or(""),
        })?;
    }
    writer.flush()?;
    Ok(())
}

fn read_pdf(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        bail!("PDF not found: {}", path.display());
    }
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn open_database(settings: &Settings) -> Result<Database> {
    Database::open(&settings.database_path)
        .with_context(|| format!("Failed to open database {}", settings.database_path.display()))
}

/// Rules-only categorization for parses that are not saved
struct NoOverrides;

impl OverrideStore for NoOverrides {
    fn find_override(&self, _: &str, _: &str) -> statement_parser::Result<Option<String>> {
        Ok(None)
    }

    fn upsert_override(&self, _: &str, _: &str, _: &str) -> statement_parser::Result<usize> {
        Ok(0)
    }

    fn delete_override(
        &self,
        _: &str,
        _: &str,
        _: &str,
    ) -> statement_parser::Result<Option<usize>> {
        Ok(None)
    }

    fn list_overrides(&self, _: &str) -> statement_parser::Result<Vec<MerchantOverride>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_password() {
        let args = ["statement-parser", "parse", "jan.pdf", "--password", "ABCD1234"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Parse { pdf, unlock, .. } => {
                assert_eq!(pdf, PathBuf::from("jan.pdf"));
                assert_eq!(unlock.password.as_deref(), Some("ABCD1234"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_detect_accepts_password() {
        let args = ["statement-parser", "detect", "jan.pdf", "--password", "pw"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Detect { unlock, .. } => assert_eq!(unlock.password.as_deref(), Some("pw")),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
