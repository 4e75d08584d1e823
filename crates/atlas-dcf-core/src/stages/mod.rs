//! Growth stages, the multi-stage model configuration and its validation,
//! and the library of pre-built archetype templates.

pub mod config;
pub mod stage;
pub mod templates;

pub use config::{ModelType, MultiStageDcfConfig};
pub use stage::{interpolate, GrowthDecline, MarginTrajectory, Stage};
pub use templates::{get_template, recommend_template, TemplateKind, TemplateRecommendation};
