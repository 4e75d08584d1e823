pub mod calculator;
pub mod comparison;
pub mod cost_of_capital;
pub mod multi_stage;

pub use calculator::{calculate_valuation, DiscountedFlow, ValuationInput, ValuationResult};
pub use comparison::{analyze_sbc_impact, Materiality, SbcImpact, SbcImpactInput};
pub use cost_of_capital::{calculate_wacc, WaccInput, WaccOutput};
pub use multi_stage::{run_multi_stage_dcf, MultiStageDcfInput, MultiStageDcfOutput};
