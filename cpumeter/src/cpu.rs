use std::{collections::VecDeque, time::Duration};
use sysinfo::{CpuExt, System, SystemExt};
use tokio::time;

/// A running average of the least and most loaded core.
///
/// The minimum and maximum of every batch are averaged separately, each over
/// the last `capacity` batches.
#[derive(Clone, Debug)]
pub struct Smoother {
  minimums: VecDeque<f64>,
  maximums: VecDeque<f64>,
  capacity: usize,
}

impl Smoother {
  pub fn new(capacity: usize) -> Self {
    Smoother {
      minimums: VecDeque::with_capacity(capacity + 1),
      maximums: VecDeque::with_capacity(capacity + 1),
      capacity,
    }
  }

  /// Records the minimum and maximum of `values`. An empty batch records
  /// nothing.
  pub fn update(&mut self, values: &[f64]) {
    let Some(min) = values.iter().copied().reduce(f64::min) else {
      return;
    };
    let Some(max) = values.iter().copied().reduce(f64::max) else {
      return;
    };

    push(&mut self.minimums, min, self.capacity);
    push(&mut self.maximums, max, self.capacity);
  }

  /// The averaged minimum and maximum, or `None` before the first batch.
  /// A window which is not yet full is averaged over what it holds.
  pub fn get(&self) -> Option<(f64, f64)> {
    Some((mean(&self.minimums)?, mean(&self.maximums)?))
  }

  /// Number of batches currently averaged over.
  pub fn len(&self) -> usize {
    self.minimums.len()
  }

  pub fn is_empty(&self) -> bool {
    self.minimums.is_empty()
  }
}

fn push(window: &mut VecDeque<f64>, value: f64, capacity: usize) {
  window.push_back(value);

  while window.len() > capacity {
    window.pop_front();
  }
}

fn mean(window: &VecDeque<f64>) -> Option<f64> {
  if window.is_empty() {
    return None;
  }

  Some(window.iter().sum::<f64>() / window.len() as f64)
}

/// Source of per-core utilization.
pub trait LoadSource {
  /// Starts a new measurement interval.
  fn refresh(&mut self);

  /// Utilization of every core over the interval ended by the latest
  /// refresh, each from 0 to 1.
  fn per_core(&self) -> Vec<f64>;
}

impl LoadSource for System {
  fn refresh(&mut self) {
    self.refresh_cpu();
  }

  fn per_core(&self) -> Vec<f64> {
    self
      .cpus()
      .iter()
      .map(|cpu| f64::from(cpu.cpu_usage()) / 100.0)
      .collect()
  }
}

/// Samples core utilization and smooths it.
pub struct CpuSampler<L: LoadSource> {
  source: L,
  smoother: Smoother,
  sample_time: Duration,
}

impl<L: LoadSource> CpuSampler<L> {
  pub fn new(source: L, averaging_samples: usize, sample_time: Duration) -> Self {
    CpuSampler {
      source,
      smoother: Smoother::new(averaging_samples),
      sample_time,
    }
  }

  /// Measures utilization over one sample time and returns the smoothed
  /// `(min, max)` core utilization, each from 0 to 1.
  ///
  /// Returns `None` only while no core has ever reported a value.
  pub async fn sample(&mut self) -> Option<(f64, f64)> {
    self.source.refresh();
    time::sleep(self.sample_time).await;
    self.source.refresh();

    self.smoother.update(&self.source.per_core());
    self.smoother.get()
  }
}
