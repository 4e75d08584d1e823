use atlas_dcf_core::projection::{project_revenue_and_pretax, project_with_sbc};
use atlas_dcf_core::sbc::SbcForecastConfig;
use atlas_dcf_core::stages::{GrowthDecline, ModelType, MultiStageDcfConfig, Stage};
use atlas_dcf_core::valuation::{calculate_valuation, run_multi_stage_dcf, MultiStageDcfInput, ValuationInput};
use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn bp(v: u32) -> Decimal {
    Decimal::new(i64::from(v), 4)
}

fn within(actual: Decimal, expected: Decimal) -> bool {
    (actual - expected).abs() <= dec!(0.000000001) * (Decimal::ONE + expected.abs())
}

/// A valid three-stage config with declining growth built from basis points.
fn three_stage(
    g0_bp: u32,
    drop1_bp: u32,
    drop2_bp: u32,
    drop3_bp: u32,
    durations: (u32, u32, u32),
    decline: GrowthDecline,
) -> MultiStageDcfConfig {
    let g0 = bp(g0_bp);
    let g1 = g0 - bp(drop1_bp);
    let g2 = g1 - bp(drop2_bp);
    let g3 = g2 - bp(drop3_bp);
    let (d1, d2, d3) = durations;
    MultiStageDcfConfig {
        model_type: ModelType::ThreeStage,
        stages: vec![
            Stage::spanning(1, "Early", 1, d1)
                .with_growth(g0, g1)
                .with_decline(decline)
                .with_margins(dec!(0.10), dec!(0.18))
                .with_costs(dec!(0.06), dec!(0.12), dec!(0.04))
                .with_sbc(dec!(0.05)),
            Stage::spanning(2, "Middle", 1 + d1, d2)
                .with_growth(g1, g2)
                .with_decline(decline)
                .with_margins(dec!(0.18), dec!(0.22))
                .with_costs(dec!(0.05), dec!(0.10), dec!(0.04))
                .with_sbc(dec!(0.03)),
            Stage::spanning(3, "Late", 1 + d1 + d2, d3)
                .with_growth(g2, g3)
                .with_decline(decline)
                .with_margins(dec!(0.22), dec!(0.22))
                .with_costs(dec!(0.04), dec!(0.08), dec!(0.04))
                .with_sbc(dec!(0.02)),
        ],
        terminal_growth_rate: g3.min(dec!(0.03)),
        wacc: dec!(0.09),
        base_revenue: dec!(1000),
        tax_rate: dec!(0.21),
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(48))]

    #[test]
    fn prop_growth_continuous_at_stage_boundaries(
        g0_bp in 1500u32..5000,
        drop1_bp in 0u32..1000,
        drop2_bp in 0u32..800,
        drop3_bp in 0u32..300,
        d1 in 1u32..5,
        d2 in 1u32..5,
        d3 in 1u32..5,
        exponential in proptest::bool::ANY,
    ) {
        let decline = if exponential { GrowthDecline::Exponential } else { GrowthDecline::Linear };
        // One-year stages ahead of another stage must be flat to validate.
        let drop1_bp = if d1 == 1 { 0 } else { drop1_bp };
        let drop2_bp = if d2 == 1 { 0 } else { drop2_bp };
        let config = three_stage(g0_bp, drop1_bp, drop2_bp, drop3_bp, (d1, d2, d3), decline);
        let rows = project_revenue_and_pretax(&config).unwrap();
        prop_assert_eq!(rows.len() as u32, d1 + d2 + d3);
        for pair in config.stages.windows(2) {
            let last = &rows[(pair[0].end_year - 1) as usize];
            let first = &rows[(pair[1].start_year - 1) as usize];
            prop_assert_eq!(last.revenue_growth, first.revenue_growth);
            prop_assert_eq!(first.revenue_growth, pair[1].revenue_growth_start);
        }
    }

    #[test]
    fn prop_sloped_one_year_stage_rejected(
        g0_bp in 1500u32..5000,
        drop1_bp in 1u32..1000,
        d2 in 1u32..5,
    ) {
        let config = three_stage(g0_bp, drop1_bp, 0, 0, (1, d2, 3), GrowthDecline::Linear);
        let err = project_revenue_and_pretax(&config).unwrap_err();
        prop_assert!(err.is_configuration());
        prop_assert!(err.violations().iter().any(|v| v.starts_with("stage 1 (Early): a one-year stage")));
    }

    #[test]
    fn prop_fcff_identity_holds_every_year(
        g0_bp in 1500u32..5000,
        drop1_bp in 0u32..1000,
        drop2_bp in 0u32..800,
        drop3_bp in 0u32..300,
        sbc_bp in 0u32..2000,
    ) {
        let config = three_stage(g0_bp, drop1_bp, drop2_bp, drop3_bp, (3, 4, 3), GrowthDecline::Linear);
        let sbc = SbcForecastConfig::maintain_current(bp(sbc_bp));
        let projection = project_with_sbc(&config, true, Some(&sbc)).unwrap();
        for row in &projection.rows {
            let expected = row.nopat + row.da - row.capex - row.delta_nwc - row.sbc_amount;
            prop_assert!(within(row.fcff, expected), "year {}: {} vs {}", row.year, row.fcff, expected);
        }
    }

    #[test]
    fn prop_enterprise_value_is_sum_of_parts(
        flows in proptest::collection::vec(-500i64..5000, 1..15),
        wacc_bp in 500u32..2000,
        growth_bp in 0u32..400,
        mid_year in proptest::bool::ANY,
    ) {
        let input = ValuationInput {
            fcff: flows.into_iter().map(Decimal::from).collect(),
            wacc: bp(wacc_bp),
            terminal_growth_rate: bp(growth_bp),
            shares_outstanding: dec!(100),
            mid_year_convention: mid_year,
        };
        let out = calculate_valuation(&input).unwrap().result;
        prop_assert!(within(out.enterprise_value, out.pv_explicit_fcf + out.pv_terminal_value));
    }

    #[test]
    fn prop_more_sbc_never_raises_value(
        low_bp in 0u32..1500,
        extra_bp in 1u32..1500,
    ) {
        let value_at = |pct: Decimal| {
            let mut input = MultiStageDcfInput::new(
                three_stage(3000, 800, 800, 200, (3, 4, 3), GrowthDecline::Linear),
                dec!(50),
            );
            input.sbc_forecast = Some(SbcForecastConfig::linear_normalization(pct, dec!(0.0), 5));
            run_multi_stage_dcf(&input).unwrap().result
        };
        let low = value_at(bp(low_bp));
        let high = value_at(bp(low_bp + extra_bp));
        prop_assert!(high.valuation.enterprise_value <= low.valuation.enterprise_value);
        let baseline = high.sbc_impact.unwrap().enterprise_value_without_sbc;
        prop_assert!(high.valuation.enterprise_value <= baseline);
    }

    #[test]
    fn prop_wacc_not_above_terminal_growth_always_rejected(
        wacc_bp in 0u32..200,
        gap_bp in 0u32..100,
    ) {
        let mut config = three_stage(3000, 800, 800, 200, (3, 4, 3), GrowthDecline::Linear);
        config.wacc = bp(wacc_bp);
        config.terminal_growth_rate = bp(wacc_bp + gap_bp);
        let err = project_revenue_and_pretax(&config).unwrap_err();
        prop_assert!(err.is_configuration());
        let err = run_multi_stage_dcf(&MultiStageDcfInput::new(config, dec!(1))).unwrap_err();
        prop_assert!(err.is_configuration());
    }
}
