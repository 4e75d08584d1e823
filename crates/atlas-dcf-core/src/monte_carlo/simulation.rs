use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::{LogNormal, Normal, Triangular, Uniform};
use std::time::Instant;

use crate::error::AtlasError;
use crate::stages::MultiStageDcfConfig;
use crate::types::{render_warnings, with_precision, ComputationOutput, DataQualityWarning, Money};
use crate::valuation::multi_stage::value_per_share_for;
use crate::valuation::{calculate_wacc, MultiStageDcfInput};
use crate::AtlasResult;

const MIN_SIMULATIONS: u32 = 100;
const MAX_SIMULATIONS: u32 = 1_000_000;
/// Sampled rates are rounded to this many decimal places before entering the
/// Decimal model.
const SAMPLE_DP: u32 = 8;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Probability distribution specification for a Monte Carlo variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum McDistribution {
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
}

/// Monte Carlo over a multi-stage valuation.
///
/// Growth and margin distributions are additive shifts applied to every
/// stage bound, so stage boundaries stay continuous. WACC and terminal growth
/// are sampled as absolute levels. An absent distribution holds the base value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McDcfInput {
    pub base: MultiStageDcfInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_shift: Option<McDistribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_shift: Option<McDistribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wacc: Option<McDistribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_growth: Option<McDistribution>,
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    /// Path `i` is seeded with `seed + i`, so results do not depend on
    /// thread scheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_num_simulations() -> u32 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McDcfOutput {
    /// Percentiles of simulated value per share.
    pub value_per_share: McPercentiles,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Share of valid paths valued above `base.current_price`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability_above_price: Option<f64>,
    pub simulation_count: u32,
    pub skipped_paths: u32,
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Sampler {
    Normal(Normal),
    LogNormal(LogNormal),
    Triangular(Triangular),
    Uniform(Uniform),
}

impl Sampler {
    fn build(field: &str, dist: &McDistribution) -> AtlasResult<Self> {
        Ok(match *dist {
            McDistribution::Normal { mean, std_dev } => {
                Sampler::Normal(Normal::new(mean, std_dev).map_err(invalid(field))?)
            }
            McDistribution::LogNormal { mu, sigma } => {
                Sampler::LogNormal(LogNormal::new(mu, sigma).map_err(invalid(field))?)
            }
            McDistribution::Triangular { min, mode, max } => {
                Sampler::Triangular(Triangular::new(min, max, mode).map_err(invalid(field))?)
            }
            McDistribution::Uniform { min, max } => {
                Sampler::Uniform(Uniform::new(min, max).map_err(invalid(field))?)
            }
        })
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        match self {
            Sampler::Normal(d) => rng.sample(d),
            Sampler::LogNormal(d) => rng.sample(d),
            Sampler::Triangular(d) => rng.sample(d),
            Sampler::Uniform(d) => rng.sample(d),
        }
    }
}

fn invalid<E: std::fmt::Display>(field: &str) -> impl Fn(E) -> AtlasError + '_ {
    move |e| AtlasError::InvalidInput {
        field: field.into(),
        reason: format!("Invalid distribution parameters: {e}"),
    }
}

struct PathSamplers {
    growth_shift: Option<Sampler>,
    margin_shift: Option<Sampler>,
    wacc: Option<Sampler>,
    terminal_growth: Option<Sampler>,
}

impl PathSamplers {
    fn build(input: &McDcfInput) -> AtlasResult<Self> {
        let build = |field: &str, d: &Option<McDistribution>| d.as_ref().map(|d| Sampler::build(field, d)).transpose();
        Ok(Self {
            growth_shift: build("growth_shift", &input.growth_shift)?,
            margin_shift: build("margin_shift", &input.margin_shift)?,
            wacc: build("wacc", &input.wacc)?,
            terminal_growth: build("terminal_growth", &input.terminal_growth)?,
        })
    }

    /// Draw one path's configuration. `None` when a draw is not representable.
    fn draw(&self, base: &MultiStageDcfConfig, rng: &mut StdRng) -> Option<MultiStageDcfConfig> {
        let mut draw = |s: &Option<Sampler>| -> Option<Option<Decimal>> {
            match s {
                Some(s) => Decimal::from_f64(s.sample(rng)).map(|d| Some(d.round_dp(SAMPLE_DP))),
                None => Some(None),
            }
        };
        let growth_shift = draw(&self.growth_shift)?;
        let margin_shift = draw(&self.margin_shift)?;
        let wacc = draw(&self.wacc)?;
        let terminal_growth = draw(&self.terminal_growth)?;

        let mut config = base.clone();
        for stage in &mut config.stages {
            if let Some(shift) = growth_shift {
                stage.revenue_growth_start += shift;
                stage.revenue_growth_end += shift;
            }
            if let Some(shift) = margin_shift {
                stage.ebit_margin_start += shift;
                stage.ebit_margin_end += shift;
            }
        }
        if let Some(wacc) = wacc {
            config.wacc = wacc;
        }
        if let Some(g) = terminal_growth {
            config.terminal_growth_rate = g;
        }
        Some(config)
    }
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Linear-interpolated percentile of a non-empty, sorted slice.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] * (1.0 - frac) + sorted[upper] * frac
}

fn percentiles(sorted: &[f64]) -> McPercentiles {
    McPercentiles {
        p5: percentile_sorted(sorted, 5.0),
        p10: percentile_sorted(sorted, 10.0),
        p25: percentile_sorted(sorted, 25.0),
        p50: percentile_sorted(sorted, 50.0),
        p75: percentile_sorted(sorted, 75.0),
        p90: percentile_sorted(sorted, 90.0),
        p95: percentile_sorted(sorted, 95.0),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run a Monte Carlo valuation over sampled stage and discount parameters.
///
/// Paths run in parallel. A path whose sampled configuration fails validation
/// (for example WACC at or below terminal growth) is skipped and counted.
pub fn run_monte_carlo_dcf(input: &McDcfInput) -> AtlasResult<ComputationOutput<McDcfOutput>> {
    let start = Instant::now();

    if !(MIN_SIMULATIONS..=MAX_SIMULATIONS).contains(&input.num_simulations) {
        return Err(AtlasError::InvalidInput {
            field: "num_simulations".into(),
            reason: format!("Must be between {MIN_SIMULATIONS} and {MAX_SIMULATIONS}"),
        });
    }
    let samplers = PathSamplers::build(input)?;
    let seed = input.seed.unwrap_or_else(rand::random);

    // The comparison pass is irrelevant to the distribution of value.
    let mut base = input.base.clone();
    base.compare_sbc = false;
    if let Some(wacc_input) = base.wacc_input.take() {
        base.config.wacc = calculate_wacc(&wacc_input)?.result.wacc;
    }

    let outcomes: Vec<Option<f64>> = (0..input.num_simulations)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(u64::from(i)));
            let config = samplers.draw(&base.config, &mut rng)?;
            value_per_share_for(&config, &base)
                .ok()
                .and_then(|v: Money| v.to_f64())
        })
        .collect();

    let mut values: Vec<f64> = outcomes.into_iter().flatten().collect();
    let skipped = input.num_simulations - values.len() as u32;
    if values.is_empty() {
        return Err(AtlasError::InsufficientData(format!(
            "All {} simulation paths failed validation",
            input.num_simulations
        )));
    }

    let mut warnings = Vec::new();
    if skipped > 0 {
        warnings.push(DataQualityWarning::SimulationPathsSkipped {
            skipped,
            total: input.num_simulations,
        });
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    let probability_above_price = input
        .base
        .current_price
        .and_then(|p| p.to_f64())
        .filter(|p| *p > 0.0)
        .map(|price| values.iter().filter(|&&v| v > price).count() as f64 / n);

    tracing::debug!(paths = values.len(), skipped, seed, "monte carlo complete");

    let output = McDcfOutput {
        value_per_share: percentiles(&values),
        mean,
        std_dev: variance.sqrt(),
        min: values[0],
        max: values[values.len() - 1],
        probability_above_price,
        simulation_count: values.len() as u32,
        skipped_paths: skipped,
    };

    Ok(with_precision(
        "Monte Carlo multi-stage DCF",
        &serde_json::json!({
            "num_simulations": input.num_simulations,
            "seed": seed,
            "growth_shift": input.growth_shift,
            "margin_shift": input.margin_shift,
            "wacc": input.wacc,
            "terminal_growth": input.terminal_growth,
        }),
        render_warnings(&warnings),
        start.elapsed().as_micros() as u64,
        "ieee754_f64",
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::TemplateKind;
    use rust_decimal_macros::dec;

    fn mature_mc(num_simulations: u32) -> McDcfInput {
        McDcfInput {
            base: MultiStageDcfInput::new(TemplateKind::MatureCompany.config(), dec!(10)),
            growth_shift: Some(McDistribution::Normal {
                mean: 0.0,
                std_dev: 0.005,
            }),
            margin_shift: Some(McDistribution::Uniform {
                min: -0.02,
                max: 0.02,
            }),
            wacc: Some(McDistribution::Triangular {
                min: 0.07,
                mode: 0.08,
                max: 0.09,
            }),
            terminal_growth: None,
            num_simulations,
            seed: Some(42),
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let input = mature_mc(500);
        let a = run_monte_carlo_dcf(&input).unwrap().result;
        let b = run_monte_carlo_dcf(&input).unwrap().result;
        assert_eq!(a, b);
    }

    #[test]
    fn test_percentiles_are_ordered() {
        let out = run_monte_carlo_dcf(&mature_mc(1_000)).unwrap().result;
        let p = &out.value_per_share;
        assert!(out.min <= p.p5);
        assert!(p.p5 <= p.p25 && p.p25 <= p.p50 && p.p50 <= p.p75 && p.p75 <= p.p95);
        assert!(p.p95 <= out.max);
        assert!(out.std_dev > 0.0);
    }

    #[test]
    fn test_no_distributions_collapse_to_base_value() {
        let mut input = mature_mc(100);
        input.growth_shift = None;
        input.margin_shift = None;
        input.wacc = None;
        let out = run_monte_carlo_dcf(&input).unwrap().result;
        assert_eq!(out.min, out.max);
        assert_eq!(out.std_dev, 0.0);
        assert_eq!(out.skipped_paths, 0);
    }

    #[test]
    fn test_invalid_paths_are_skipped() {
        let mut input = mature_mc(400);
        // Terminal growth is 2.5%; draws at or below it fail validation.
        input.wacc = Some(McDistribution::Uniform {
            min: 0.0,
            max: 0.05,
        });
        let out = run_monte_carlo_dcf(&input).unwrap();
        assert!(out.result.skipped_paths > 0);
        assert!(out.result.simulation_count > 0);
        assert_eq!(out.result.simulation_count + out.result.skipped_paths, 400);
        assert!(out.warnings.iter().any(|w| w.contains("simulation paths skipped")));
    }

    #[test]
    fn test_all_paths_invalid_is_error() {
        let mut input = mature_mc(100);
        input.wacc = Some(McDistribution::Uniform {
            min: 0.0,
            max: 0.02,
        });
        assert!(matches!(
            run_monte_carlo_dcf(&input).unwrap_err(),
            AtlasError::InsufficientData(_)
        ));
    }

    #[test]
    fn test_probability_above_price() {
        let mut input = mature_mc(500);
        input.base.current_price = Some(dec!(0.0001));
        let out = run_monte_carlo_dcf(&input).unwrap().result;
        assert_eq!(out.probability_above_price, Some(1.0));
    }

    #[test]
    fn test_bad_parameters_rejected() {
        let mut input = mature_mc(100);
        input.growth_shift = Some(McDistribution::Normal {
            mean: 0.0,
            std_dev: -1.0,
        });
        assert!(run_monte_carlo_dcf(&input).is_err());

        let input = mature_mc(10);
        assert!(run_monte_carlo_dcf(&input).is_err());
    }
}
