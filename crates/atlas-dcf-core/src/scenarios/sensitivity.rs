use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::AtlasError;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::valuation::multi_stage::value_per_share_for;
use crate::valuation::MultiStageDcfInput;
use crate::AtlasResult;

const MAX_GRID_CELLS: usize = 10_000;

/// Inclusive sweep `min..=max` in increments of `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccTerminalSensitivityInput {
    /// Base case; its WACC and terminal growth are replaced cell by cell.
    pub base: MultiStageDcfInput,
    pub wacc_range: SweepRange,
    pub terminal_growth_range: SweepRange,
}

/// Value per share over a WACC x terminal growth grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub wacc_values: Vec<Decimal>,
    pub terminal_growth_values: Vec<Decimal>,
    /// matrix[i][j] is the value at wacc_values[i], terminal_growth_values[j].
    /// `None` where that combination fails validation.
    pub matrix: Vec<Vec<Option<Money>>>,
    pub base_case_value: Option<Money>,
    /// Cell closest to the base case's own WACC and terminal growth.
    pub base_case_position: (usize, usize),
}

/// Generate the sweep values from min to max with step; max is always included.
fn generate_sweep_values(name: &str, range: &SweepRange) -> AtlasResult<Vec<Decimal>> {
    if range.step <= Decimal::ZERO {
        return Err(AtlasError::InvalidInput {
            field: format!("{name}.step"),
            reason: "Step must be positive".into(),
        });
    }
    if range.min > range.max {
        return Err(AtlasError::InvalidInput {
            field: name.into(),
            reason: "Min must be <= max".into(),
        });
    }

    let mut values = Vec::new();
    let mut current = range.min;
    while current <= range.max {
        values.push(current);
        if values.len() > MAX_GRID_CELLS {
            return Err(AtlasError::InvalidInput {
                field: format!("{name}.step"),
                reason: format!("Sweep exceeds {MAX_GRID_CELLS} values"),
            });
        }
        current += range.step;
    }
    if let Some(&last) = values.last() {
        if last < range.max {
            values.push(range.max);
        }
    }
    Ok(values)
}

fn closest_index(values: &[Decimal], target: Decimal) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (**v - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Evaluate a 2-way grid with a caller-supplied model function.
///
/// Cells whose evaluation fails are `None` and produce a warning instead of
/// failing the grid.
pub fn evaluate_grid<F>(
    rows: &[Decimal],
    cols: &[Decimal],
    eval_fn: F,
    warnings: &mut Vec<String>,
) -> Vec<Vec<Option<Money>>>
where
    F: Fn(Decimal, Decimal) -> AtlasResult<Money>,
{
    rows.iter()
        .map(|&r| {
            cols.iter()
                .map(|&c| match eval_fn(r, c) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warnings.push(format!("Evaluation failed at ({r}, {c}): {e}"));
                        None
                    }
                })
                .collect()
        })
        .collect()
}

/// WACC x terminal growth sensitivity of value per share.
pub fn wacc_terminal_sensitivity(
    input: &WaccTerminalSensitivityInput,
) -> AtlasResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let wacc_values = generate_sweep_values("wacc_range", &input.wacc_range)?;
    let growth_values = generate_sweep_values("terminal_growth_range", &input.terminal_growth_range)?;
    if wacc_values.len() * growth_values.len() > MAX_GRID_CELLS {
        return Err(AtlasError::InvalidInput {
            field: "wacc_range x terminal_growth_range".into(),
            reason: format!("Grid exceeds {MAX_GRID_CELLS} cells"),
        });
    }

    // The grid supplies WACC directly; a CAPM build-up would override it.
    let mut base = input.base.clone();
    base.wacc_input = None;

    let matrix = evaluate_grid(
        &wacc_values,
        &growth_values,
        |wacc, growth| {
            let mut config = base.config.clone();
            config.wacc = wacc;
            config.terminal_growth_rate = growth;
            value_per_share_for(&config, &base)
        },
        &mut warnings,
    );

    let base_row = closest_index(&wacc_values, base.config.wacc);
    let base_col = closest_index(&growth_values, base.config.terminal_growth_rate);
    let base_case_value = value_per_share_for(&base.config, &base).ok();

    let invalid = matrix.iter().flatten().filter(|c| c.is_none()).count();
    tracing::debug!(
        cells = wacc_values.len() * growth_values.len(),
        invalid,
        "sensitivity grid evaluated"
    );

    let output = SensitivityOutput {
        wacc_values,
        terminal_growth_values: growth_values,
        matrix,
        base_case_value,
        base_case_position: (base_row, base_col),
    };

    Ok(with_metadata(
        "2-Way Sensitivity: WACC x terminal growth, value per share",
        &serde_json::json!({
            "wacc_range": input.wacc_range,
            "terminal_growth_range": input.terminal_growth_range,
            "base_wacc": input.base.config.wacc,
            "base_terminal_growth": input.base.config.terminal_growth_rate,
        }),
        warnings,
        start.elapsed().as_micros() as u64,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::TemplateKind;
    use rust_decimal_macros::dec;

    fn grid_input() -> WaccTerminalSensitivityInput {
        WaccTerminalSensitivityInput {
            base: MultiStageDcfInput::new(TemplateKind::MatureCompany.config(), dec!(10)),
            wacc_range: SweepRange {
                min: dec!(0.07),
                max: dec!(0.09),
                step: dec!(0.01),
            },
            terminal_growth_range: SweepRange {
                min: dec!(0.01),
                max: dec!(0.03),
                step: dec!(0.01),
            },
        }
    }

    #[test]
    fn test_sweep_includes_max() {
        let values = generate_sweep_values(
            "x",
            &SweepRange {
                min: dec!(0),
                max: dec!(0.25),
                step: dec!(0.1),
            },
        )
        .unwrap();
        assert_eq!(values, vec![dec!(0), dec!(0.1), dec!(0.2), dec!(0.25)]);
    }

    #[test]
    fn test_non_positive_step_rejected() {
        let range = SweepRange {
            min: dec!(0),
            max: dec!(1),
            step: dec!(0),
        };
        assert!(generate_sweep_values("x", &range).is_err());
    }

    #[test]
    fn test_grid_shape_and_monotonicity() {
        let out = wacc_terminal_sensitivity(&grid_input()).unwrap().result;
        assert_eq!(out.matrix.len(), 3);
        assert!(out.matrix.iter().all(|row| row.len() == 3));
        // Higher WACC lowers value at every growth rate that validates.
        let v = |i: usize, j: usize| out.matrix[i][j].unwrap();
        assert!(v(0, 0) > v(1, 0));
        assert!(v(1, 0) > v(2, 0));
        // Higher terminal growth raises value.
        assert!(v(0, 1) > v(0, 0));
    }

    #[test]
    fn test_invalid_cells_are_none_with_warning() {
        // Mature ends at 3% growth; terminal growth above that fails validation.
        let mut input = grid_input();
        input.terminal_growth_range = SweepRange {
            min: dec!(0.02),
            max: dec!(0.04),
            step: dec!(0.01),
        };
        let out = wacc_terminal_sensitivity(&input).unwrap();
        assert!(out.result.matrix.iter().all(|row| row[2].is_none()));
        assert!(out.result.matrix.iter().all(|row| row[0].is_some()));
        assert_eq!(out.warnings.len(), 3);
    }

    #[test]
    fn test_base_case_position() {
        let out = wacc_terminal_sensitivity(&grid_input()).unwrap().result;
        // Mature template: wacc 8%, terminal 2.5% -> row 1, column 1 or 2.
        assert_eq!(out.base_case_position.0, 1);
        assert!(out.base_case_value.is_some());
    }
}
