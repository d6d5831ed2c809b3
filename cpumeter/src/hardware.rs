use crate::{
  calculator::Calculator,
  config::Config,
  cpu::CpuSampler,
  error::{Error, Result},
  indicator::{Indicator, Scale, SharedBus},
  liveness::TimestampFile,
  state::Meter,
};
use common::comm::gpio::{Gpio, OutputPin};
use jeflog::pass;
use mcp4812::{Bus, SpiBus};
use std::{cell::RefCell, rc::Rc};
use sysinfo::{System, SystemExt};

/// The meter as wired on the real board.
pub type BoardMeter = Meter<SpiBus, Gpio, System, TimestampFile>;

/// Opens the DAC chips on the configured bus.
pub fn open_bus(config: &Config) -> Result<SharedBus<SpiBus>> {
  let bus = SpiBus::open(&config.spi.url, config.spi.frequency, config.spi.chip_count)?;
  pass!(
    "Opened {} DAC chips on {} at {} Hz.",
    bus.chip_count(),
    config.spi.url,
    config.spi.frequency
  );

  Ok(Rc::new(RefCell::new(bus)))
}

/// Builds one scale per configured indicator on `bus`. Each needle is moved to
/// the start of its scale.
pub fn scales<B: Bus>(config: &Config, bus: &SharedBus<B>) -> Result<[Scale<B>; 2]> {
  let build = |index: usize| -> Result<Scale<B>> {
    let wiring = &config.indicators[index];
    let calculator = Calculator::new(&config.calibration(index))?;
    let indicator = Indicator::new(
      calculator,
      bus.clone(),
      wiring.phases.each_ref().map(|phase| phase.dac_channel()),
    );

    Scale::new(indicator, wiring.scale_begin, wiring.scale_end)
  };

  Ok([build(0)?, build(1)?])
}

/// Opens the GPIO controller of the status pin and claims the pin.
pub fn status_pin(config: &Config) -> Result<OutputPin<Gpio>> {
  let location = &config.status_pin;
  let gpio = Gpio::open_controller(location.controller).map_err(Error::Gpio)?;

  OutputPin::new(gpio, location.pin).map_err(Error::Gpio)
}

/// Sets up everything the control loop drives.
pub fn set_up(config: &Config) -> Result<BoardMeter> {
  config.validate()?;

  let bus = open_bus(config)?;
  let scales = scales(config, &bus)?;

  for (name, scale) in ["A", "B"].iter().zip(&scales) {
    pass!("Indicator {name}: {}", scale.indicator().calculator());
  }

  let pin = status_pin(config)?;
  let sampler = CpuSampler::new(
    System::new(),
    config.cpu.averaging_samples,
    config.sample_time()?,
  );
  let liveness = TimestampFile::new(&config.timestamp_path);

  Meter::new(scales, pin, sampler, liveness, config)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::RecordingBus;
  use mcp4812::decode;

  #[test]
  fn scales_start_at_scale_begin() {
    let config = Config::default();
    let bus = Rc::new(RefCell::new(RecordingBus::default()));

    let [a, b] = scales(&config, &bus).unwrap();

    assert_eq!(a.rotation(), 0.52);
    assert_eq!(b.rotation(), 0.47);
  }

  #[test]
  fn writes_follow_wiring_table() {
    let config = Config::default();
    let bus = Rc::new(RefCell::new(RecordingBus::default()));

    scales(&config, &bus).unwrap();

    let wired: Vec<_> = bus
      .borrow()
      .writes
      .iter()
      .map(|(chip, bytes)| (*chip, decode(*bytes).channel))
      .collect();

    let expected: Vec<_> = config
      .indicators
      .iter()
      .flat_map(|indicator| indicator.phases.iter())
      .map(|phase| (phase.chip, phase.channel))
      .collect();

    assert_eq!(wired, expected);
  }

  #[test]
  fn unreachable_calibration_fails_before_writing() {
    let mut config = Config::default();
    config.amplifier.vout_low = 40.0;
    let bus = Rc::new(RefCell::new(RecordingBus::default()));

    assert!(matches!(scales(&config, &bus), Err(Error::Configuration(_))));
    assert!(bus.borrow().writes.is_empty());
  }
}
