use crate::{calculator::Calculator, error::Result};
use mcp4812::{Bus, DacChannel};
use std::{cell::RefCell, rc::Rc};

/// A bus shared by the indicators of one process.
///
/// The control loop is single-threaded, and a borrow is only ever held for
/// the synchronous phase writes of one indicator.
pub type SharedBus<B> = Rc<RefCell<B>>;

/// A three-phase instrument, without regard to the scale printed on its face.
pub struct Indicator<B: Bus> {
  calculator: Calculator,
  bus: SharedBus<B>,

  /// DAC outputs of the three windings, ordered so that increasing rotation
  /// turns the needle clockwise.
  phases: [DacChannel; 3],
}

impl<B: Bus> Indicator<B> {
  pub fn new(calculator: Calculator, bus: SharedBus<B>, phases: [DacChannel; 3]) -> Self {
    Indicator {
      calculator,
      bus,
      phases,
    }
  }

  pub fn calculator(&self) -> &Calculator {
    &self.calculator
  }

  /// Points the needle at `rotation` turns. The windings are written in
  /// order, first to last.
  pub fn set_output(&self, rotation: f64) -> Result<()> {
    let codes = self.calculator.digital_values(rotation);
    let mut bus = self.bus.borrow_mut();

    for (phase, code) in self.phases.iter().zip(codes) {
      phase.set_output(&mut *bus, code)?;
    }

    Ok(())
  }
}

/// A scale drawn on an indicator, running from `rot0` at its start to `rot1`
/// at its end.
///
/// The scale is the only writer of its indicator's rotation.
pub struct Scale<B: Bus> {
  indicator: Indicator<B>,
  rot0: f64,
  rot1: f64,
  clockwise: bool,
  rotation: f64,
}

impl<B: Bus> Scale<B> {
  /// Wraps `indicator` and moves its needle to the start of the scale.
  ///
  /// For a scale read clockwise, `rot1` is larger than `rot0`.
  pub fn new(indicator: Indicator<B>, rot0: f64, rot1: f64) -> Result<Self> {
    let mut scale = Scale {
      indicator,
      rot0,
      rot1,
      clockwise: rot1 > rot0,
      rotation: 0.0,
    };

    scale.set_scale(0.0)?;
    Ok(scale)
  }

  /// The rotation last written to the indicator, in turns.
  pub fn rotation(&self) -> f64 {
    self.rotation
  }

  pub fn indicator(&self) -> &Indicator<B> {
    &self.indicator
  }

  /// Moves the needle to `value`, 0 being the start of the scale and 1 its
  /// end. Values outside the scale are clamped to it.
  pub fn set_scale(&mut self, value: f64) -> Result<()> {
    // f64::max discards NaN, which therefore lands on the scale start.
    let value = value.max(0.0).min(1.0);

    self.rotation = self.rot0 + value * (self.rot1 - self.rot0);
    self.indicator.set_output(self.rotation)
  }

  /// Moves the needle `turns` full turns past the start of the scale, in the
  /// scale's reading direction. Negative turns are ignored.
  pub fn set_turns(&mut self, turns: f64) -> Result<()> {
    if turns < 0.0 || turns.is_nan() {
      return Ok(());
    }

    self.rotation = if self.clockwise {
      self.rot0 + turns
    } else {
      self.rot0 - turns
    };

    self.indicator.set_output(self.rotation)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{calculator, RecordingBus};
  use mcp4812::{decode, Channel};

  fn phases() -> [DacChannel; 3] {
    [
      DacChannel::new(1, Channel::B),
      DacChannel::new(0, Channel::B),
      DacChannel::new(0, Channel::A),
    ]
  }

  fn make_scale(rot0: f64, rot1: f64) -> (Scale<RecordingBus>, SharedBus<RecordingBus>) {
    let bus = Rc::new(RefCell::new(RecordingBus::default()));
    let indicator = Indicator::new(calculator(0.93), bus.clone(), phases());

    (Scale::new(indicator, rot0, rot1).unwrap(), bus)
  }

  #[test]
  fn writes_three_phases_in_order() {
    let bus = Rc::new(RefCell::new(RecordingBus::default()));
    let indicator = Indicator::new(calculator(0.93), bus.clone(), phases());

    indicator.set_output(0.25).unwrap();

    let expected = calculator(0.93).digital_values(0.25);
    let recorded = bus.borrow();
    let writes = &recorded.writes;

    assert_eq!(writes.len(), 3);

    for ((write, phase), code) in writes.iter().zip(phases()).zip(expected) {
      let command = decode(write.1);

      assert_eq!(write.0, phase.chip);
      assert_eq!(command.channel, phase.channel);
      assert_eq!(i32::from(command.code), code);
      assert!(command.enabled);
    }
  }

  #[test]
  fn new_scale_moves_to_start() {
    let (scale, bus) = make_scale(0.52, 1.0);

    assert_eq!(scale.rotation(), 0.52);
    assert_eq!(bus.borrow().writes.len(), 3);
  }

  #[test]
  fn set_scale_interpolates() {
    let (mut scale, _) = make_scale(0.52, 1.0);

    scale.set_scale(0.5).unwrap();
    assert!((scale.rotation() - 0.76).abs() < 1e-12);

    let (mut reversed, _) = make_scale(0.47, -0.03);

    reversed.set_scale(1.0).unwrap();
    assert!((reversed.rotation() + 0.03).abs() < 1e-12);
  }

  #[test]
  fn set_scale_clamps() {
    let (mut scale, _) = make_scale(0.52, 1.0);

    scale.set_scale(-1.0).unwrap();
    assert_eq!(scale.rotation(), 0.52);

    scale.set_scale(2.0).unwrap();
    assert!((scale.rotation() - 1.0).abs() < 1e-12);

    scale.set_scale(f64::NAN).unwrap();
    assert_eq!(scale.rotation(), 0.52);
  }

  #[test]
  fn set_turns_follows_direction() {
    let (mut clockwise, _) = make_scale(0.52, 1.0);
    clockwise.set_turns(1.0).unwrap();
    assert!((clockwise.rotation() - 1.52).abs() < 1e-12);

    let (mut counterclockwise, _) = make_scale(0.47, -0.03);
    counterclockwise.set_turns(0.25).unwrap();
    assert!((counterclockwise.rotation() - 0.22).abs() < 1e-12);
  }

  #[test]
  fn negative_turns_are_ignored() {
    let (mut scale, bus) = make_scale(0.52, 1.0);
    scale.set_scale(0.3).unwrap();

    let before = scale.rotation();
    let writes = bus.borrow().writes.len();

    scale.set_turns(-0.5).unwrap();

    assert_eq!(scale.rotation(), before);
    assert_eq!(bus.borrow().writes.len(), writes);
  }

  #[test]
  fn bus_errors_propagate() {
    let (mut scale, bus) = make_scale(0.52, 1.0);
    bus.borrow_mut().fail = true;

    assert!(scale.set_scale(0.5).is_err());
  }
}
