use crate::{error::Result, indicator::Scale};
use common::comm::gpio::{Bank, OutputPin};
use mcp4812::Bus;
use std::time::Duration;
use tokio::time;

/// How a ramp drives its scale.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Ramp {
  /// Full turns past the start of the scale.
  Turns,

  /// Positions on the scale, 0 to 1.
  Scale,
}

/// Animates a scale through its whole range to show the instrument works.
#[derive(Clone, Debug)]
pub struct DemoRunner {
  step_size: f64,
  step_time: Duration,
  settle: Duration,
  pause: Duration,
}

impl DemoRunner {
  pub fn new(step_size: f64, step_time: Duration, settle: Duration, pause: Duration) -> Self {
    DemoRunner {
      step_size,
      step_time,
      settle,
      pause,
    }
  }

  /// A ramp stops once within this distance of its target, so a target
  /// which is not a whole number of steps away cannot be overshot forever.
  fn allowed_error(&self) -> f64 {
    self.step_size * 0.7
  }

  /// Runs the full sequence: rest at the scale start, sweep one full turn,
  /// sweep the scale up, pause, and sweep it back down.
  pub async fn run<B: Bus>(&self, scale: &mut Scale<B>) -> Result<()> {
    scale.set_scale(0.0)?;
    time::sleep(self.settle).await;

    self.ramp(scale, Ramp::Turns, 0.0, 1.0).await?;
    self.ramp(scale, Ramp::Scale, 0.0, 1.0).await?;
    time::sleep(self.pause).await;
    self.ramp(scale, Ramp::Scale, 1.0, 0.0).await
  }

  async fn ramp<B: Bus>(&self, scale: &mut Scale<B>, ramp: Ramp, start: f64, end: f64) -> Result<()> {
    let step = if end > start {
      self.step_size
    } else {
      -self.step_size
    };

    let mut current = start;

    while (end - current).abs() >= self.allowed_error() {
      current += step;

      match ramp {
        Ramp::Turns => scale.set_turns(current)?,
        Ramp::Scale => scale.set_scale(current)?,
      }

      time::sleep(self.step_time).await;
    }

    Ok(())
  }
}

/// Blinks a pin until dropped.
#[derive(Clone, Debug)]
pub struct Toggler {
  period: Duration,
}

impl Toggler {
  pub fn new(period: Duration) -> Self {
    Toggler { period }
  }

  /// Toggles `pin` once per period. Never returns; the future is cancelled by
  /// dropping it, which may happen at any of its sleeps.
  pub async fn run<G: Bank>(&self, pin: &mut OutputPin<G>) {
    loop {
      pin.toggle();
      time::sleep(self.period).await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    indicator::{Indicator, SharedBus},
    testing::{calculator, RecordingBus},
  };
  use common::comm::gpio::VirtualBank;
  use mcp4812::{Channel, DacChannel};
  use std::{cell::RefCell, rc::Rc};

  fn runner() -> DemoRunner {
    DemoRunner::new(
      0.02,
      Duration::from_millis(10),
      Duration::from_millis(200),
      Duration::from_millis(100),
    )
  }

  fn scale() -> (Scale<RecordingBus>, SharedBus<RecordingBus>) {
    let bus = Rc::new(RefCell::new(RecordingBus::default()));
    let phases = [
      DacChannel::new(2, Channel::B),
      DacChannel::new(1, Channel::A),
      DacChannel::new(2, Channel::A),
    ];
    let indicator = Indicator::new(calculator(0.38), bus.clone(), phases);

    (Scale::new(indicator, 0.47, -0.03).unwrap(), bus)
  }

  #[tokio::test(start_paused = true)]
  async fn ramp_stops_near_target() {
    let (mut scale, _) = scale();
    let runner = runner();

    runner.ramp(&mut scale, Ramp::Scale, 0.0, 1.0).await.unwrap();
    assert!((scale.rotation() - -0.03).abs() < 0.02);

    runner.ramp(&mut scale, Ramp::Scale, 1.0, 0.0).await.unwrap();
    assert!((scale.rotation() - 0.47).abs() < 0.02);
  }

  #[tokio::test(start_paused = true)]
  async fn ramp_with_uneven_step_terminates() {
    let (mut scale, bus) = scale();
    let runner = DemoRunner::new(0.3, Duration::from_millis(10), Duration::ZERO, Duration::ZERO);

    runner.ramp(&mut scale, Ramp::Scale, 0.0, 1.0).await.unwrap();

    // 0.3, 0.6, 0.9: within 0.21 of the target after three steps.
    assert_eq!(bus.borrow().writes.len(), 3 + 3 * 3);
  }

  #[tokio::test(start_paused = true)]
  async fn full_sequence_returns_to_start() {
    let (mut scale, bus) = scale();
    let start = time::Instant::now();

    runner().run(&mut scale).await.unwrap();

    // The turn sweep and both scale sweeps take 50 steps each.
    let steps = 150;
    assert_eq!(bus.borrow().writes.len(), 3 * (1 + 1 + steps));
    assert!(start.elapsed() >= Duration::from_millis(200 + 100 + 10 * steps as u64));
    assert!((scale.rotation() - 0.47).abs() < 0.02);
  }

  #[tokio::test(start_paused = true)]
  async fn turn_sweep_overtravels_scale() {
    let (mut scale, _) = scale();
    let runner = runner();

    runner.ramp(&mut scale, Ramp::Turns, 0.0, 1.0).await.unwrap();

    // Counterclockwise scale: one turn past 0.47.
    assert!((scale.rotation() - -0.53).abs() < 0.02);
  }

  #[tokio::test(start_paused = true)]
  async fn toggler_blinks_until_dropped() {
    let bank = VirtualBank::default();
    let mut pin = OutputPin::new(&bank, 6).unwrap();
    let toggler = Toggler::new(Duration::from_millis(300));

    let _ = time::timeout(Duration::from_millis(1000), toggler.run(&mut pin)).await;

    // Toggled at 0, 300, 600 and 900 ms.
    assert!(!pin.get_output());

    let _ = time::timeout(Duration::from_millis(100), toggler.run(&mut pin)).await;
    assert!(pin.get_output());
  }
}
