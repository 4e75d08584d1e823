pub mod batch;
pub mod projection;
pub mod sbc;
pub mod scenarios;
pub mod templates;
pub mod valuation;
