use crate::{
  config::{seconds_to_duration, Config, Thresholds},
  cpu::{CpuSampler, LoadSource},
  demo::{DemoRunner, Toggler},
  error::Result,
  indicator::Scale,
  liveness::Liveness,
};
use common::comm::gpio::{Bank, OutputPin};
use jeflog::pass;
use mcp4812::Bus;
use std::{fmt, time::Duration};
use tokio::time;

/// What the meter is doing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
  /// Nobody has shown activity for a long time; the needles rest.
  Sleep,

  /// The needles show the least and most loaded core.
  CpuMeas,

  /// Both needles sweep through their range while the status pin blinks.
  Demo,
}

impl State {
  /// Chooses the state for a tick, given the age of the last activity in
  /// seconds. A missing marker must be passed as an age above the sleep
  /// threshold.
  pub fn next(self, age: f64, thresholds: &Thresholds) -> State {
    if self != State::Demo && age < thresholds.demo {
      State::Demo
    } else if self == State::CpuMeas && age > thresholds.sleep {
      State::Sleep
    } else {
      self
    }
  }
}

impl fmt::Display for State {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Sleep => write!(f, "SLEEP"),
      Self::CpuMeas => write!(f, "CPU_MEAS"),
      Self::Demo => write!(f, "DEMO"),
    }
  }
}

/// The control loop driving both instruments.
pub struct Meter<B: Bus, G: Bank, L: LoadSource, T: Liveness> {
  state: State,
  scales: [Scale<B>; 2],
  pin: OutputPin<G>,
  sampler: CpuSampler<L>,
  liveness: T,
  demo: DemoRunner,
  toggler: Toggler,
  thresholds: Thresholds,
  idle_time: Duration,
}

impl<B: Bus, G: Bank, L: LoadSource, T: Liveness> Meter<B, G, L, T> {
  /// Assembles a meter in the `Sleep` state. The first scale shows the least
  /// loaded core, the second the most loaded.
  pub fn new(
    scales: [Scale<B>; 2],
    pin: OutputPin<G>,
    sampler: CpuSampler<L>,
    liveness: T,
    config: &Config,
  ) -> Result<Self> {
    let demo = DemoRunner::new(
      config.demo.step_size,
      seconds_to_duration("demo.step_time", config.demo.step_time)?,
      seconds_to_duration("demo.settle", config.demo.settle)?,
      seconds_to_duration("demo.pause", config.demo.pause)?,
    );

    Ok(Meter {
      state: State::Sleep,
      scales,
      pin,
      sampler,
      liveness,
      demo,
      toggler: Toggler::new(config.toggle_period()?),
      thresholds: config.thresholds.clone(),
      idle_time: config.idle_time()?,
    })
  }

  pub fn state(&self) -> State {
    self.state
  }

  pub fn scales(&self) -> &[Scale<B>; 2] {
    &self.scales
  }

  pub fn pin(&self) -> &OutputPin<G> {
    &self.pin
  }

  /// Runs until a write to the hardware fails.
  pub async fn run(mut self) -> Result<()> {
    loop {
      self.tick().await?;
    }
  }

  /// Re-evaluates the state and carries out one action in it, returning the
  /// state the action ran in.
  pub async fn tick(&mut self) -> Result<State> {
    let age = self
      .liveness
      .age()
      .unwrap_or(2.0 * self.thresholds.sleep);

    let next = self.state.next(age, &self.thresholds);
    self.enter(next);

    match next {
      State::CpuMeas => self.measure().await?,
      State::Demo => {
        self.demo().await?;
        self.enter(State::CpuMeas);
      }
      State::Sleep => time::sleep(self.idle_time).await,
    }

    Ok(next)
  }

  fn enter(&mut self, state: State) {
    if state == self.state {
      return;
    }

    match state {
      State::Demo => {
        pass!("Starting demo");
      }
      State::Sleep => {
        pass!("Going to sleep");
      }
      State::CpuMeas => {
        pass!("Starting CPU measurement");
      }
    }

    self.state = state;
  }

  async fn measure(&mut self) -> Result<()> {
    self.pin.toggle();

    // Before the first sample the needles stay where they are.
    if let Some((min, max)) = self.sampler.sample().await {
      let [least, most] = &mut self.scales;
      least.set_scale(min)?;
      most.set_scale(max)?;
    }

    Ok(())
  }

  async fn demo(&mut self) -> Result<()> {
    let Meter {
      scales: [first, second],
      pin,
      demo,
      toggler,
      ..
    } = self;

    // The toggler never finishes; it is dropped, and so cancelled, as soon as
    // both sweeps are done.
    tokio::select! {
      biased;
      result = async { tokio::try_join!(demo.run(first), demo.run(second)) } => {
        result?;
      }
      _ = toggler.run(pin) => {}
    }

    Ok(())
  }
}
