pub mod sensitivity;

pub use sensitivity::{
    evaluate_grid, wacc_terminal_sensitivity, SensitivityOutput, SweepRange, WaccTerminalSensitivityInput,
};
