mod commands;
mod input;
mod output;

use atlas_dcf_core::AtlasError;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::batch::BatchArgs;
use commands::projection::{OverrideArgs, ProjectArgs};
use commands::sbc::{SbcDetectArgs, SbcForecastArgs};
use commands::scenarios::{MonteCarloArgs, SensitivityArgs};
use commands::templates::{RecommendArgs, TemplateArgs};
use commands::valuation::{DcfArgs, SbcImpactArgs, WaccArgs};

/// Multi-stage DCF valuation with share-based compensation adjustment
#[derive(Parser)]
#[command(
    name = "atlas-dcf",
    version,
    about = "Multi-stage DCF valuation with share-based compensation adjustment",
    long_about = "Projects revenue through one to three growth stages, deducts \
                  share-based compensation as a real cash cost, and discounts \
                  free cash flow to the firm with decimal precision. Supports \
                  templates, per-year overrides, WACC, sensitivity grids, Monte \
                  Carlo and batch valuation."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log pipeline detail to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a named template configuration, or list all templates
    Template(TemplateArgs),
    /// Suggest a template from historical growth, margins and scale
    Recommend(RecommendArgs),
    /// Project revenue through FCFF for every explicit year
    Project(ProjectArgs),
    /// Run the full multi-stage DCF valuation
    Dcf(DcfArgs),
    /// Detect the SBC level and trend from historical financials
    SbcDetect(SbcDetectArgs),
    /// Forecast SBC against a revenue path
    SbcForecast(SbcForecastArgs),
    /// Compare valuation with and without the SBC deduction
    SbcImpact(SbcImpactArgs),
    /// Re-project after per-year driver overrides
    Override(OverrideArgs),
    /// Calculate WACC from a CAPM build-up
    Wacc(WaccArgs),
    /// WACC x terminal growth value-per-share grid
    Sensitivity(SensitivityArgs),
    /// Monte Carlo distribution of value per share
    MonteCarlo(MonteCarloArgs),
    /// Value several companies in one run
    Batch(BatchArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "warn" })
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn report_error(e: &(dyn std::error::Error + 'static)) {
    match e.downcast_ref::<AtlasError>() {
        Some(AtlasError::Configuration { violations }) => {
            eprintln!("{}: invalid configuration", "error".red().bold());
            for v in violations {
                eprintln!("  - {}", v);
            }
        }
        _ => eprintln!("{}: {}", "error".red().bold(), e),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Template(args) => commands::templates::run_template(args),
        Commands::Recommend(args) => commands::templates::run_recommend(args),
        Commands::Project(args) => commands::projection::run_project(args),
        Commands::Dcf(args) => commands::valuation::run_dcf(args),
        Commands::SbcDetect(args) => commands::sbc::run_sbc_detect(args),
        Commands::SbcForecast(args) => commands::sbc::run_sbc_forecast(args),
        Commands::SbcImpact(args) => commands::valuation::run_sbc_impact(args),
        Commands::Override(args) => commands::projection::run_override(args),
        Commands::Wacc(args) => commands::valuation::run_wacc(args),
        Commands::Sensitivity(args) => commands::scenarios::run_sensitivity(args),
        Commands::MonteCarlo(args) => commands::scenarios::run_monte_carlo(args),
        Commands::Batch(args) => commands::batch::run_batch(args),
        Commands::Version => {
            println!("atlas-dcf {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            report_error(&*e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "atlas-dcf", "template", "mature", "--output", "minimal", "--verbose",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.output, OutputFormat::Minimal));
        assert!(matches!(cli.command, Commands::Template(_)));
    }

    #[test]
    fn test_recommend_parses_margin_list() {
        let cli = Cli::try_parse_from([
            "atlas-dcf", "recommend", "--growth", "0.42", "--margins", "0.05,0.08,0.11",
            "--revenue", "1000000000",
        ])
        .unwrap();
        match cli.command {
            Commands::Recommend(args) => assert_eq!(args.margins.len(), 3),
            _ => panic!("expected recommend"),
        }
    }
}
