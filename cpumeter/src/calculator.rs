//! Voltages for a three-phase (Desynn) indicator.
//!
//! Symbols used throughout:
//!
//! - `r`: rotation in full turns. 0 points straight up, increasing values turn
//!   clockwise and the needle is up again at 1.
//! - `p`: voltage position, 0 to 1.
//! - `m`: relative position, `m_low` to `m_high`, a sub-range of 0 to 1.
//! - `d`: digital code, 0 to `d_max`.
//! - `vi`: intermediate voltage out of the DAC, 0 to `vi_max`.
//! - `vout`: `vi` multiplied by the amplifier gain.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
  f64::consts::TAU,
  fmt::{self, Display, Formatter},
};

/// Phase offsets of the three stator windings, in turns.
const PHASES: [f64; 3] = [0.0, 1.0 / 3.0, 2.0 / 3.0];

/// The fixed electrical properties of one indicator and its drive chain.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Calibration {
  /// Rotation, in turns, at which the first phase is at its maximum.
  pub rotation_offset: f64,

  /// Digital code for the DAC's maximum output voltage.
  pub max_digital: f64,

  /// The DAC's maximum output voltage, in volts.
  pub max_dac_voltage: f64,

  /// Voltage gain of the amplifier after the DAC.
  pub amplifier_gain: f64,

  /// Lowest voltage the amplifier should output, in volts.
  pub vout_low: f64,

  /// Highest voltage the amplifier should output, in volts.
  pub vout_high: f64,
}

/// Converts indicator rotations to DAC codes and voltages.
#[derive(Clone, Debug)]
pub struct Calculator {
  roffset: f64,
  dmax: f64,
  vimax: f64,
  gain: f64,
  m_low: f64,
  m_high: f64,
}

impl Calculator {
  /// Fails when either output bound is above what the amplifier can reach.
  pub fn new(calibration: &Calibration) -> Result<Self> {
    let full_scale = calibration.max_dac_voltage * calibration.amplifier_gain;

    if calibration.vout_high > full_scale {
      return Err(Error::Configuration(format!(
        "vout_high {} V exceeds amplifier full scale {full_scale} V",
        calibration.vout_high
      )));
    }

    if calibration.vout_low > full_scale {
      return Err(Error::Configuration(format!(
        "vout_low {} V exceeds amplifier full scale {full_scale} V",
        calibration.vout_low
      )));
    }

    Ok(Calculator {
      roffset: calibration.rotation_offset,
      dmax: calibration.max_digital,
      vimax: calibration.max_dac_voltage,
      gain: calibration.amplifier_gain,
      m_low: calibration.vout_low / full_scale,
      m_high: calibration.vout_high / full_scale,
    })
  }

  /// Voltage position of a single winding. Periodic in `rotation` with
  /// period 1, largest at the rotation offset.
  pub fn position(&self, rotation: f64) -> f64 {
    0.5 * (1.0 + ((rotation - self.roffset) * TAU).cos())
  }

  /// Maps a voltage position onto the usable output range.
  pub fn relative_position(&self, position: f64) -> f64 {
    position * (self.m_high - self.m_low) + self.m_low
  }

  pub fn digital_value(&self, relative_position: f64) -> i32 {
    (relative_position * self.dmax).floor() as i32
  }

  /// DAC output voltage for a code, in volts.
  pub fn intermediate_voltage(&self, digital_value: i32) -> f64 {
    f64::from(digital_value) * self.vimax / self.dmax
  }

  /// Amplifier output voltage, in volts.
  pub fn output_voltage(&self, intermediate_voltage: f64) -> f64 {
    intermediate_voltage * self.gain
  }

  /// Voltage positions of the three windings.
  pub fn positions(&self, rotation: f64) -> [f64; 3] {
    PHASES.map(|phase| self.position(rotation + phase))
  }

  pub fn relative_positions(&self, rotation: f64) -> [f64; 3] {
    self.positions(rotation).map(|p| self.relative_position(p))
  }

  /// The three codes to send to the DACs, in winding order.
  pub fn digital_values(&self, rotation: f64) -> [i32; 3] {
    self
      .relative_positions(rotation)
      .map(|m| self.digital_value(m))
  }

  pub fn intermediate_voltages(&self, rotation: f64) -> [f64; 3] {
    self
      .digital_values(rotation)
      .map(|d| self.intermediate_voltage(d))
  }

  pub fn output_voltages(&self, rotation: f64) -> [f64; 3] {
    self
      .intermediate_voltages(rotation)
      .map(|vi| self.output_voltage(vi))
  }
}

impl Display for Calculator {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Calculator. mLow {:.2} mHigh {:.2}",
      self.m_low, self.m_high
    )
  }
}
