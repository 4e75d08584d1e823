//! Year-by-year projection of revenue, operating profit and free cash flow to
//! the firm across the configured stages.

pub mod engine;
pub mod overrides;

pub use engine::{apply_sbc, project_revenue_and_pretax, project_with_sbc, Projection, ProjectionRow};
pub use overrides::{apply_override, YearOverride};
