//! Pre-built stage configurations for common company archetypes, plus an
//! advisory heuristic that suggests one from historical metrics.

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AtlasError;
use crate::types::{Money, Rate};
use crate::AtlasResult;

use super::config::{ModelType, MultiStageDcfConfig};
use super::stage::Stage;

const HYPERGROWTH_THRESHOLD: Rate = dec!(0.35);
const GROWTH_THRESHOLD: Rate = dec!(0.10);
/// Above this revenue a >35% grower is treated as a Growth company.
const MEGA_CAP_REVENUE: Money = dec!(100000000000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    HypergrowthTech,
    GrowthCompany,
    MatureCompany,
    Turnaround,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::HypergrowthTech,
        TemplateKind::GrowthCompany,
        TemplateKind::MatureCompany,
        TemplateKind::Turnaround,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            TemplateKind::HypergrowthTech => "Hypergrowth Tech",
            TemplateKind::GrowthCompany => "Growth Company",
            TemplateKind::MatureCompany => "Mature Company",
            TemplateKind::Turnaround => "Turnaround",
        }
    }

    /// A fully valid configuration for this archetype. Base revenue is 100 and
    /// the tax rate 21%; callers override whatever they know.
    pub fn config(self) -> MultiStageDcfConfig {
        match self {
            TemplateKind::HypergrowthTech => MultiStageDcfConfig {
                model_type: ModelType::ThreeStage,
                stages: vec![
                    Stage::spanning(1, "Hypergrowth", 1, 3)
                        .with_growth(dec!(0.40), dec!(0.30))
                        .with_margins(dec!(0.05), dec!(0.15))
                        .with_costs(dec!(0.08), dec!(0.15), dec!(0.04))
                        .with_sbc(dec!(0.12)),
                    Stage::spanning(2, "Scaling", 4, 4)
                        .with_growth(dec!(0.30), dec!(0.12))
                        .with_margins(dec!(0.15), dec!(0.25))
                        .with_costs(dec!(0.06), dec!(0.12), dec!(0.04))
                        .with_sbc(dec!(0.08)),
                    Stage::spanning(3, "Maturity", 8, 3)
                        .with_growth(dec!(0.12), dec!(0.05))
                        .with_margins(dec!(0.25), dec!(0.28))
                        .with_costs(dec!(0.05), dec!(0.10), dec!(0.04))
                        .with_sbc(dec!(0.05)),
                ],
                terminal_growth_rate: dec!(0.03),
                wacc: dec!(0.10),
                base_revenue: dec!(100),
                tax_rate: dec!(0.21),
            },
            TemplateKind::GrowthCompany => MultiStageDcfConfig {
                model_type: ModelType::TwoStage,
                stages: vec![
                    Stage::spanning(1, "Growth", 1, 5)
                        .with_growth(dec!(0.25), dec!(0.12))
                        .with_margins(dec!(0.15), dec!(0.22))
                        .with_costs(dec!(0.06), dec!(0.12), dec!(0.04))
                        .with_sbc(dec!(0.05)),
                    Stage::spanning(2, "Maturity", 6, 5)
                        .with_growth(dec!(0.12), dec!(0.04))
                        .with_margins(dec!(0.22), dec!(0.24))
                        .with_costs(dec!(0.05), dec!(0.10), dec!(0.04))
                        .with_sbc(dec!(0.03)),
                ],
                terminal_growth_rate: dec!(0.03),
                wacc: dec!(0.09),
                base_revenue: dec!(100),
                tax_rate: dec!(0.21),
            },
            TemplateKind::MatureCompany => MultiStageDcfConfig {
                model_type: ModelType::SingleStage,
                stages: vec![Stage::spanning(1, "Steady State", 1, 10)
                    .with_growth(dec!(0.06), dec!(0.03))
                    .with_margins(dec!(0.20), dec!(0.20))
                    .with_costs(dec!(0.04), dec!(0.08), dec!(0.035))
                    .with_sbc(dec!(0.01))],
                terminal_growth_rate: dec!(0.025),
                wacc: dec!(0.08),
                base_revenue: dec!(100),
                tax_rate: dec!(0.21),
            },
            TemplateKind::Turnaround => MultiStageDcfConfig {
                model_type: ModelType::TwoStage,
                stages: vec![
                    Stage::spanning(1, "Recovery", 1, 3)
                        .with_growth(dec!(0.08), dec!(0.15))
                        .with_margins(dec!(0.03), dec!(0.10))
                        .with_costs(dec!(0.05), dec!(0.10), dec!(0.04))
                        .with_sbc(dec!(0.03))
                        .as_turnaround(),
                    Stage::spanning(2, "Normalization", 4, 7)
                        .with_growth(dec!(0.15), dec!(0.05))
                        .with_margins(dec!(0.10), dec!(0.15))
                        .with_costs(dec!(0.045), dec!(0.10), dec!(0.04))
                        .with_sbc(dec!(0.02)),
                ],
                terminal_growth_rate: dec!(0.03),
                wacc: dec!(0.095),
                base_revenue: dec!(100),
                tax_rate: dec!(0.21),
            },
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for TemplateKind {
    type Err = AtlasError;

    /// Accepts display names and short forms, ignoring case, spaces, `-` and `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "hypergrowth" | "hypergrowthtech" => Ok(TemplateKind::HypergrowthTech),
            "growth" | "growthcompany" => Ok(TemplateKind::GrowthCompany),
            "mature" | "maturecompany" => Ok(TemplateKind::MatureCompany),
            "turnaround" => Ok(TemplateKind::Turnaround),
            _ => Err(AtlasError::configuration(format!(
                "unknown template '{s}'; expected one of: {}",
                TemplateKind::ALL
                    .iter()
                    .map(|k| k.display_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// Look up a template configuration by name.
pub fn get_template(name: &str) -> AtlasResult<MultiStageDcfConfig> {
    Ok(name.parse::<TemplateKind>()?.config())
}

/// Advisory template suggestion. Never a gate: the caller may pick any template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecommendation {
    pub template: TemplateKind,
    pub rationale: String,
}

/// Suggest a template from recent revenue growth, the EBIT margin history
/// (oldest first) and revenue scale.
pub fn recommend_template(
    historical_growth: Rate,
    historical_margins: &[Rate],
    revenue_scale: Money,
) -> TemplateRecommendation {
    let margin_expanding = match (historical_margins.first(), historical_margins.last()) {
        (Some(first), Some(last)) if historical_margins.len() >= 2 => last > first,
        _ => false,
    };
    let growth_pct = historical_growth * dec!(100);

    let (template, rationale) = if historical_growth > HYPERGROWTH_THRESHOLD {
        if revenue_scale >= MEGA_CAP_REVENUE {
            (
                TemplateKind::GrowthCompany,
                format!("Revenue growth of {growth_pct:.1}% exceeds 35%, but revenue scale of {revenue_scale} makes sustained hypergrowth unlikely"),
            )
        } else {
            (
                TemplateKind::HypergrowthTech,
                format!("Revenue growth of {growth_pct:.1}% exceeds 35%"),
            )
        }
    } else if historical_growth >= GROWTH_THRESHOLD {
        (
            TemplateKind::GrowthCompany,
            format!("Revenue growth of {growth_pct:.1}% is between 10% and 35%"),
        )
    } else if margin_expanding {
        (
            TemplateKind::Turnaround,
            format!("Revenue growth of {growth_pct:.1}% is below 10% while EBIT margins are expanding"),
        )
    } else {
        (
            TemplateKind::MatureCompany,
            format!("Revenue growth of {growth_pct:.1}% is below 10% with flat or contracting margins"),
        )
    };

    tracing::debug!(%template, "template recommended");
    TemplateRecommendation { template, rationale }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_template_is_valid() {
        for kind in TemplateKind::ALL {
            let cfg = kind.config();
            assert!(cfg.validate().is_ok(), "{kind} failed: {:?}", cfg.violations());
            assert_eq!(cfg.stages.len(), cfg.model_type.expected_stages());
        }
    }

    #[test]
    fn test_template_growth_paths() {
        let hyper = TemplateKind::HypergrowthTech.config();
        assert_eq!(hyper.total_duration(), 10);
        assert_eq!(hyper.stages[0].revenue_growth_start, dec!(0.40));
        assert_eq!(hyper.stages[2].revenue_growth_end, dec!(0.05));

        let growth = TemplateKind::GrowthCompany.config();
        assert_eq!(growth.stages[0].revenue_growth_start, dec!(0.25));
        assert_eq!(growth.stages[1].revenue_growth_end, dec!(0.04));

        let mature = TemplateKind::MatureCompany.config();
        assert_eq!(mature.stages.len(), 1);
        assert_eq!(mature.stages[0].duration, 10);

        let turn = TemplateKind::Turnaround.config();
        assert!(turn.stages[0].turnaround);
        assert!(turn.stages[0].is_accelerating());
        assert!(!turn.stages[1].turnaround);
    }

    #[test]
    fn test_get_template_by_name() {
        let cfg = get_template("Hypergrowth Tech").unwrap();
        assert_eq!(cfg.model_type, ModelType::ThreeStage);
        assert!(get_template("mature").is_ok());
        assert!(get_template("growth_company").is_ok());
        assert!(get_template("TURNAROUND").is_ok());
    }

    #[test]
    fn test_unknown_template_is_configuration_error() {
        let err = get_template("moonshot").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("moonshot"));
    }

    #[test]
    fn test_recommend_thresholds() {
        let flat = [dec!(0.20), dec!(0.20)];
        assert_eq!(
            recommend_template(dec!(0.50), &flat, dec!(1000000000)).template,
            TemplateKind::HypergrowthTech
        );
        assert_eq!(
            recommend_template(dec!(0.20), &flat, dec!(1000000000)).template,
            TemplateKind::GrowthCompany
        );
        assert_eq!(
            recommend_template(dec!(0.05), &[dec!(0.02), dec!(0.06)], dec!(1000000000)).template,
            TemplateKind::Turnaround
        );
        assert_eq!(
            recommend_template(dec!(0.05), &flat, dec!(1000000000)).template,
            TemplateKind::MatureCompany
        );
    }

    #[test]
    fn test_recommend_boundaries() {
        assert_eq!(
            recommend_template(dec!(0.35), &[], dec!(1)).template,
            TemplateKind::GrowthCompany
        );
        assert_eq!(
            recommend_template(dec!(0.10), &[], dec!(1)).template,
            TemplateKind::GrowthCompany
        );
        // A single margin observation carries no trend.
        assert_eq!(
            recommend_template(dec!(0.02), &[dec!(0.10)], dec!(1)).template,
            TemplateKind::MatureCompany
        );
    }

    #[test]
    fn test_recommend_mega_cap_tempers_hypergrowth() {
        let rec = recommend_template(dec!(0.40), &[], dec!(200000000000));
        assert_eq!(rec.template, TemplateKind::GrowthCompany);
        assert!(rec.rationale.contains("scale"));
    }
}
