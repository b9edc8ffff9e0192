// 🏦 Bank refinements - parsers that reuse the generic pipeline and override
// the stages where an issuer's layout differs

mod amex;
mod hdfc;
mod sbi;

pub use amex::AmexParser;
pub use hdfc::HdfcParser;
pub use sbi::{RewardPoints, SbiParser};
