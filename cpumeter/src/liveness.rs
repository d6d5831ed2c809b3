use std::{
  fs,
  path::{Path, PathBuf},
  time::SystemTime,
};

/// Reports how long ago something outside the meter last showed activity.
pub trait Liveness {
  /// Seconds since the last sign of activity, or `None` if there never was
  /// one.
  fn age(&mut self) -> Option<f64>;
}

/// A marker file whose modification time is the last sign of activity.
///
/// Touching the file, for example from a login hook, starts the demo.
#[derive(Clone, Debug)]
pub struct TimestampFile {
  path: PathBuf,
}

impl TimestampFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    TimestampFile { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Liveness for TimestampFile {
  fn age(&mut self) -> Option<f64> {
    let modified = fs::metadata(&self.path).ok()?.modified().ok()?;

    // A modification time in the future counts as just now.
    let age = SystemTime::now()
      .duration_since(modified)
      .map(|age| age.as_secs_f64())
      .unwrap_or(0.0);

    Some(age)
  }
}
