use crate::{
  calculator::{Calculator, Calibration},
  error::{Error, Result},
};
use common::comm::gpio::{BANK_WIDTH, CONTROLLER_COUNT};
use mcp4812::{Channel, DacChannel, Gain};
use serde::{Deserialize, Serialize};
use std::{
  fs,
  path::{Path, PathBuf},
  time::Duration,
};

/// Everything that describes one CPU meter installation.
///
/// Missing fields take the values of the reference instrument, so a
/// configuration file only needs to list what differs.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
  pub spi: SpiConfig,
  pub status_pin: PinLocation,

  /// Marker file whose age selects between demo, measurement and sleep.
  pub timestamp_path: PathBuf,

  pub cpu: CpuConfig,
  pub thresholds: Thresholds,

  /// Wait between checks of the marker file while asleep, in seconds.
  pub idle_time: f64,

  /// Half period of the status pin blink during the demo, in seconds.
  pub toggle_period: f64,

  pub demo: DemoConfig,
  pub dac: DacConfig,
  pub amplifier: AmplifierConfig,
  pub indicators: [IndicatorConfig; 2],
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SpiConfig {
  /// Device file prefix; chip select `n` is `<url>.<n>`.
  pub url: String,

  /// Clock frequency, in hertz.
  pub frequency: u32,

  pub chip_count: usize,
}

/// A line of one of the processor's GPIO controllers.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct PinLocation {
  pub controller: usize,
  pub pin: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct CpuConfig {
  /// Number of samples averaged by the smoother.
  pub averaging_samples: usize,

  /// Duration of one utilization sample, in seconds.
  pub sample_time: f64,
}

/// Marker file ages, in seconds, at which the meter changes mode.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Thresholds {
  /// Younger than this starts the demo.
  pub demo: f64,

  /// Older than this stops measuring.
  pub sleep: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DemoConfig {
  pub step_size: f64,

  /// Seconds between steps.
  pub step_time: f64,

  /// Seconds spent at the scale start before sweeping.
  pub settle: f64,

  /// Seconds spent at the scale end.
  pub pause: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DacConfig {
  /// Code which produces the maximum output.
  pub max_input: f64,

  /// Maximum output, in volts.
  pub max_output: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct AmplifierConfig {
  pub gain: f64,

  /// Output voltage limits, in volts.
  pub vout_low: f64,
  pub vout_high: f64,
}

/// One instrument: where its needle points up, where its scale is drawn and
/// which DAC outputs drive its windings.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IndicatorConfig {
  /// Rotation, in turns, at which the needle points straight up.
  pub rotation_up: f64,

  /// Rotations at the start and end of the printed scale, in turns.
  pub scale_begin: f64,
  pub scale_end: f64,

  /// The three windings, in the order that turns the needle clockwise.
  pub phases: [PhaseWiring; 3],
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PhaseWiring {
  pub chip: usize,
  pub channel: Channel,

  #[serde(default)]
  pub gain: Gain,

  #[serde(default = "enabled")]
  pub enabled: bool,
}

fn enabled() -> bool {
  true
}

impl PhaseWiring {
  fn new(chip: usize, channel: Channel) -> Self {
    PhaseWiring {
      chip,
      channel,
      gain: Gain::X1,
      enabled: true,
    }
  }

  pub fn dac_channel(&self) -> DacChannel {
    DacChannel {
      chip: self.chip,
      channel: self.channel,
      gain: self.gain,
      enabled: self.enabled,
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Config {
      spi: SpiConfig::default(),
      status_pin: PinLocation::default(),
      timestamp_path: PathBuf::from("/tmp/cpumeter_timestamp"),
      cpu: CpuConfig::default(),
      thresholds: Thresholds::default(),
      idle_time: 1.0,
      toggle_period: 0.3,
      demo: DemoConfig::default(),
      dac: DacConfig::default(),
      amplifier: AmplifierConfig::default(),
      indicators: [
        IndicatorConfig {
          rotation_up: 0.93,
          scale_begin: 0.52,
          scale_end: 1.0,
          phases: [
            PhaseWiring::new(1, Channel::B), // J2p2
            PhaseWiring::new(0, Channel::B), // J2p1
            PhaseWiring::new(0, Channel::A), // J2p3
          ],
        },
        IndicatorConfig {
          rotation_up: 0.38,
          scale_begin: 0.47,
          scale_end: -0.03,
          phases: [
            PhaseWiring::new(2, Channel::B), // J2p4
            PhaseWiring::new(1, Channel::A), // J2p5
            PhaseWiring::new(2, Channel::A), // J2p6
          ],
        },
      ],
    }
  }
}

impl Default for SpiConfig {
  fn default() -> Self {
    SpiConfig {
      url: "/dev/spidev0".to_owned(),
      frequency: 12_000_000,
      chip_count: 3,
    }
  }
}

impl Default for PinLocation {
  fn default() -> Self {
    PinLocation {
      controller: 0,
      pin: 6,
    }
  }
}

impl Default for CpuConfig {
  fn default() -> Self {
    CpuConfig {
      averaging_samples: 20,
      sample_time: 0.1,
    }
  }
}

impl Default for Thresholds {
  fn default() -> Self {
    Thresholds {
      demo: 2.0,
      sleep: 3600.0,
    }
  }
}

impl Default for DemoConfig {
  fn default() -> Self {
    DemoConfig {
      step_size: 0.02,
      step_time: 0.01,
      settle: 0.2,
      pause: 0.1,
    }
  }
}

impl Default for DacConfig {
  fn default() -> Self {
    DacConfig {
      max_input: 1023.0,
      max_output: 2.004,
    }
  }
}

impl Default for AmplifierConfig {
  fn default() -> Self {
    AmplifierConfig {
      gain: 11.0,
      vout_low: 7.0,
      vout_high: 20.0,
    }
  }
}

impl Config {
  /// Reads the configuration file at `path`, or returns the defaults when
  /// there is none.
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let Some(path) = path else {
      return Ok(Config::default());
    };

    let contents = fs::read_to_string(path).map_err(|error| {
      Error::Configuration(format!("cannot read {}: {error}", path.display()))
    })?;

    Ok(serde_json::from_str(&contents)?)
  }

  /// Electrical calibration of indicator `index`, 0 or 1.
  pub fn calibration(&self, index: usize) -> Calibration {
    Calibration {
      rotation_offset: self.indicators[index].rotation_up,
      max_digital: self.dac.max_input,
      max_dac_voltage: self.dac.max_output,
      amplifier_gain: self.amplifier.gain,
      vout_low: self.amplifier.vout_low,
      vout_high: self.amplifier.vout_high,
    }
  }

  /// Checks everything that can be checked without hardware.
  pub fn validate(&self) -> Result<()> {
    if self.cpu.averaging_samples == 0 {
      return Err(Error::Configuration(
        "cpu.averaging_samples must be at least 1".to_owned(),
      ));
    }

    if !(self.demo.step_size > 0.0 && self.demo.step_size.is_finite()) {
      return Err(Error::Configuration(
        "demo.step_size must be positive".to_owned(),
      ));
    }

    if self.spi.frequency == 0 {
      return Err(Error::Configuration("spi.frequency must be positive".to_owned()));
    }

    if !(self.dac.max_input > 0.0 && self.dac.max_output > 0.0 && self.amplifier.gain > 0.0) {
      return Err(Error::Configuration(
        "DAC range and amplifier gain must be positive".to_owned(),
      ));
    }

    for (name, seconds) in [
      ("cpu.sample_time", self.cpu.sample_time),
      ("toggle_period", self.toggle_period),
      ("demo.step_time", self.demo.step_time),
    ] {
      if seconds <= 0.0 {
        return Err(Error::Configuration(format!("{name} must be positive")));
      }

      seconds_to_duration(name, seconds)?;
    }

    for (name, seconds) in [
      ("idle_time", self.idle_time),
      ("demo.settle", self.demo.settle),
      ("demo.pause", self.demo.pause),
      ("thresholds.demo", self.thresholds.demo),
      ("thresholds.sleep", self.thresholds.sleep),
    ] {
      seconds_to_duration(name, seconds)?;
    }

    // A missing marker counts as twice the sleep threshold, which must never
    // be young enough for the demo.
    if self.thresholds.sleep < self.thresholds.demo {
      return Err(Error::Configuration(format!(
        "thresholds.sleep ({}) must not be below thresholds.demo ({})",
        self.thresholds.sleep, self.thresholds.demo
      )));
    }

    if self.status_pin.controller >= CONTROLLER_COUNT {
      return Err(Error::Configuration(format!(
        "status_pin.controller {} does not exist, there are {CONTROLLER_COUNT}",
        self.status_pin.controller
      )));
    }

    if self.status_pin.pin >= BANK_WIDTH {
      return Err(Error::Configuration(format!(
        "status_pin.pin {} is outside a bank of {BANK_WIDTH} lines",
        self.status_pin.pin
      )));
    }

    for (index, indicator) in self.indicators.iter().enumerate() {
      for phase in &indicator.phases {
        if phase.chip >= self.spi.chip_count {
          return Err(Error::Configuration(format!(
            "indicator {index} is wired to chip {} but the bus has {} chips",
            phase.chip, self.spi.chip_count
          )));
        }
      }

      Calculator::new(&self.calibration(index))?;
    }

    Ok(())
  }

  pub fn sample_time(&self) -> Result<Duration> {
    seconds_to_duration("cpu.sample_time", self.cpu.sample_time)
  }

  pub fn idle_time(&self) -> Result<Duration> {
    seconds_to_duration("idle_time", self.idle_time)
  }

  pub fn toggle_period(&self) -> Result<Duration> {
    seconds_to_duration("toggle_period", self.toggle_period)
  }
}

/// Converts a configured number of seconds, rejecting negative and
/// non-finite values.
pub fn seconds_to_duration(name: &str, seconds: f64) -> Result<Duration> {
  Duration::try_from_secs_f64(seconds).map_err(|_| {
    Error::Configuration(format!("{name} must be a non-negative number of seconds, got {seconds}"))
  })
}
