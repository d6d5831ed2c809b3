//! Stand-ins for the hardware, shared by the unit tests.

use crate::{
  calculator::{Calculator, Calibration},
  config::Config,
  cpu::{CpuSampler, LoadSource},
  hardware,
  indicator::SharedBus,
  liveness::Liveness,
  state::Meter,
};
use common::comm::gpio::{OutputPin, VirtualBank};
use mcp4812::Bus;
use std::{cell::RefCell, collections::VecDeque, io, rc::Rc};

/// Records every write, or fails them all once `fail` is set.
#[derive(Debug, Default)]
pub struct RecordingBus {
  pub writes: Vec<(usize, [u8; 2])>,
  pub fail: bool,
}

impl Bus for RecordingBus {
  fn write(&mut self, chip: usize, bytes: &[u8]) -> mcp4812::Result<()> {
    if self.fail {
      return Err(mcp4812::Error::SPI(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "bus unplugged",
      )));
    }

    self.writes.push((chip, [bytes[0], bytes[1]]));
    Ok(())
  }
}

pub fn calculator(rotation_offset: f64) -> Calculator {
  Calculator::new(&Calibration {
    rotation_offset,
    max_digital: 1023.0,
    max_dac_voltage: 2.004,
    amplifier_gain: 11.0,
    vout_low: 7.0,
    vout_high: 20.0,
  })
  .unwrap()
}

/// Hands out one scripted batch per sample; after the script runs out every
/// sample is empty.
pub struct ScriptedLoad {
  batches: VecDeque<Vec<f64>>,
  current: Vec<f64>,
  refreshes: usize,
}

impl ScriptedLoad {
  pub fn new(batches: Vec<Vec<f64>>) -> Self {
    ScriptedLoad {
      batches: batches.into(),
      current: Vec::new(),
      refreshes: 0,
    }
  }
}

impl LoadSource for ScriptedLoad {
  fn refresh(&mut self) {
    self.refreshes += 1;

    // Every second refresh closes a sample interval.
    if self.refreshes % 2 == 0 {
      self.current = self.batches.pop_front().unwrap_or_default();
    }
  }

  fn per_core(&self) -> Vec<f64> {
    self.current.clone()
  }
}

/// Reports scripted ages in order, then no marker at all.
pub struct ScriptedLiveness {
  ages: VecDeque<Option<f64>>,
}

impl ScriptedLiveness {
  pub fn new(ages: impl IntoIterator<Item = Option<f64>>) -> Self {
    ScriptedLiveness {
      ages: ages.into_iter().collect(),
    }
  }
}

impl Liveness for ScriptedLiveness {
  fn age(&mut self) -> Option<f64> {
    self.ages.pop_front().flatten()
  }
}

pub type TestMeter = Meter<RecordingBus, VirtualBank, ScriptedLoad, ScriptedLiveness>;

/// A meter wired like the reference instrument, on a recording bus.
pub fn meter(liveness: ScriptedLiveness, batches: Vec<Vec<f64>>) -> (TestMeter, SharedBus<RecordingBus>) {
  meter_with(&Config::default(), liveness, batches)
}

pub fn meter_with(
  config: &Config,
  liveness: ScriptedLiveness,
  batches: Vec<Vec<f64>>,
) -> (TestMeter, SharedBus<RecordingBus>) {
  let bus = Rc::new(RefCell::new(RecordingBus::default()));

  let scales = hardware::scales(config, &bus).unwrap();
  let pin = OutputPin::new(VirtualBank::default(), config.status_pin.pin).unwrap();
  let sampler = CpuSampler::new(
    ScriptedLoad::new(batches),
    config.cpu.averaging_samples,
    config.sample_time().unwrap(),
  );

  (Meter::new(scales, pin, sampler, liveness, config).unwrap(), bus)
}
