pub mod simulation;

pub use simulation::{run_monte_carlo_dcf, McDcfInput, McDcfOutput, McDistribution, McPercentiles};
