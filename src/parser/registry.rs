// 🗂️ Parser Registry - bank code → parser constructor
//
// Built once per process and never mutated. Banks without a refinement get
// the generic parser, so detection never fails on an unfamiliar issuer.

use super::refinements::{AmexParser, HdfcParser, SbiParser};
use super::{GenericParser, StatementParser};
use crate::banks::BankCode;
use crate::config::Settings;
use crate::error::StatementError;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use tracing::warn;

type ParserConstructor = fn() -> Box<dyn StatementParser>;

pub struct ParserRegistry {
    constructors: BTreeMap<BankCode, ParserConstructor>,
}

fn hdfc() -> Box<dyn StatementParser> {
    Box::new(HdfcParser::new())
}

fn sbi() -> Box<dyn StatementParser> {
    Box::new(SbiParser::new())
}

fn amex() -> Box<dyn StatementParser> {
    Box::new(AmexParser::new())
}

static REGISTRY: Lazy<ParserRegistry> = Lazy::new(ParserRegistry::builtin);

impl ParserRegistry {
    fn builtin() -> Self {
        let mut constructors: BTreeMap<BankCode, ParserConstructor> = BTreeMap::new();
        constructors.insert(BankCode::Hdfc, hdfc);
        constructors.insert(BankCode::Sbi, sbi);
        constructors.insert(BankCode::Amex, amex);
        ParserRegistry { constructors }
    }

    /// Process-wide registry
    pub fn global() -> &'static ParserRegistry {
        &REGISTRY
    }

    /// Parser for `bank`; unmapped banks get the generic parser
    pub fn get_parser(&self, bank: BankCode) -> Box<dyn StatementParser> {
        match self.constructors.get(&bank) {
            Some(construct) => construct(),
            None => Box::new(GenericParser::for_bank(bank)),
        }
    }

    /// Like `get_parser`, but refuses banks on the hard-disable list
    pub fn resolve(
        &self,
        bank: BankCode,
        settings: &Settings,
    ) -> Result<Box<dyn StatementParser>, StatementError> {
        if settings.is_bank_disabled(bank.code()) {
            warn!(bank = %bank, "bank is disabled for parsing");
            return Err(StatementError::UnsupportedBank(bank.code().to_string()));
        }
        Ok(self.get_parser(bank))
    }

    pub fn has_refinement(&self, bank: BankCode) -> bool {
        self.constructors.contains_key(&bank)
    }

    /// Banks with a dedicated refinement
    pub fn refined_banks(&self) -> Vec<BankCode> {
        self.constructors.keys().copied().collect()
    }
}

/// Parser for `bank` from the process-wide registry
pub fn get_parser(bank: BankCode) -> Box<dyn StatementParser> {
    ParserRegistry::global().get_parser(bank)
}
