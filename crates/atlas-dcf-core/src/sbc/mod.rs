//! Share-based compensation: detection from historical statements and
//! year-by-year forecasting against a revenue projection.

pub mod detection;
pub mod forecast;

pub use detection::{
    detect_sbc, industry_sbc_estimate, DetectionConfidence, HistoricalFinancials, SbcDetection,
    SbcDetectionMethod, SbcHistory, SbcTrend,
};
pub use forecast::{
    forecast_sbc, forecast_sbc_from_stages, SbcForecast, SbcForecastConfig, SbcForecastMethod,
    SbcForecastYear,
};
