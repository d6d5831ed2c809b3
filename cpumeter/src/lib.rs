#![warn(clippy::correctness)]

//! Drives two three-phase panel instruments as a CPU load meter: one needle
//! shows the least loaded core, the other the most loaded, and both sweep
//! through a demo whenever someone shows activity.

/// The chain from needle rotation to DAC codes and amplifier voltages.
pub mod calculator;

/// Installation settings, read from JSON.
pub mod config;

/// Sampling and smoothing of per-core utilization.
pub mod cpu;

/// The demo sweep and the status pin blinker.
pub mod demo;

/// The error type shared by the whole meter.
pub mod error;

/// Opening the real bus and GPIO controller.
pub mod hardware;

/// Instruments and the scales printed on them.
pub mod indicator;

/// Detection of recent activity.
pub mod liveness;

/// The control loop.
pub mod state;

/// Subcommands of the command line tool.
pub mod tool;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
