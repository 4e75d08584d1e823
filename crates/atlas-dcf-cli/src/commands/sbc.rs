use clap::Args;
use serde::Deserialize;
use serde_json::{json, Value};

use atlas_dcf_core::sbc::{detect_sbc, forecast_sbc, HistoricalFinancials, SbcForecastConfig};
use atlas_dcf_core::types::Money;
use atlas_dcf_core::AtlasResult;

use crate::input;

/// Arguments for SBC detection from historical financials
#[derive(Args)]
pub struct SbcDetectArgs {
    /// Path to JSON/YAML file with revenue and SBC history
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for a standalone SBC forecast
#[derive(Args)]
pub struct SbcForecastArgs {
    /// Path to JSON/YAML file with `config` and `revenues` (year 1 first)
    #[arg(long)]
    pub input: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SbcForecastRequest {
    config: SbcForecastConfig,
    revenues: Vec<Money>,
}

pub fn run_sbc_detect(args: SbcDetectArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let financials: HistoricalFinancials =
        input::read_required(args.input.as_deref(), "SBC detection")?;
    let result = detect_sbc(&financials);
    Ok(serde_json::to_value(result)?)
}

pub fn run_sbc_forecast(args: SbcForecastArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: SbcForecastRequest = input::read_required(args.input.as_deref(), "SBC forecast")?;
    Ok(forecast_output(&request)?)
}

fn forecast_output(request: &SbcForecastRequest) -> AtlasResult<Value> {
    let forecast = forecast_sbc(&request.config, &request.revenues)?;
    let warnings: Vec<String> = forecast.warnings.iter().map(|w| w.to_string()).collect();
    Ok(json!({
        "result": {
            "method": forecast.method,
            "years": forecast.years,
            "total_sbc": forecast.total_sbc()?,
        },
        "warnings": warnings,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(config: SbcForecastConfig) -> SbcForecastRequest {
        SbcForecastRequest {
            config,
            revenues: vec![dec!(1000), dec!(1100), dec!(1200)],
        }
    }

    #[test]
    fn test_rising_target_warning_reported() {
        let out = forecast_output(&request(SbcForecastConfig::linear_normalization(
            dec!(0.02),
            dec!(0.05),
            2,
        )))
        .unwrap();
        let warnings = out["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].as_str().unwrap().contains("above the starting level"));
        assert_eq!(out["result"]["years"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_steady_forecast_has_no_warnings() {
        let out = forecast_output(&request(SbcForecastConfig::maintain_current(dec!(0.04)))).unwrap();
        assert!(out["warnings"].as_array().unwrap().is_empty());
        assert_eq!(out["result"]["method"], "MAINTAIN_CURRENT");
    }
}
