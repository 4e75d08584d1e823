//! Multi-stage discounted-cash-flow valuation with share-based-compensation
//! adjustment.
//!
//! Pipeline: [`stages`] define the growth phases, [`projection`] walks them
//! year by year, [`sbc`] forecasts share-based compensation against the
//! projected revenue, and [`valuation`] discounts the resulting FCFF and
//! compares it with the SBC-free baseline.

pub mod error;
pub mod projection;
pub mod sbc;
pub mod stages;
pub mod time_value;
pub mod types;
pub mod valuation;

#[cfg(feature = "scenarios")]
pub mod scenarios;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

#[cfg(feature = "batch")]
pub mod batch;

pub use error::AtlasError;
pub use types::*;

/// Standard result type for all valuation operations
pub type AtlasResult<T> = Result<T, AtlasError>;
