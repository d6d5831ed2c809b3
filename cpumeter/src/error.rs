use std::{
  fmt::{self, Display, Formatter},
  io,
};

/// An error which stops the CPU meter.
#[derive(Debug)]
pub enum Error {
  /// Indicates that the configuration cannot drive the instruments, such as
  /// calibration bounds which the amplifier cannot reach.
  Configuration(String),

  /// Indicates that the configuration file is not valid JSON or does not
  /// match the expected layout.
  ConfigFile(serde_json::Error),

  /// Indicates that the DAC bus is unreachable or a write to it failed.
  Dac(mcp4812::Error),

  /// Indicates that the GPIO controller holding the status pin could not be
  /// mapped.
  Gpio(io::Error),

  /// Indicates that the async runtime driving the control loop could not be
  /// started.
  Runtime(io::Error),
}

impl Display for Error {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    match self {
      Self::Configuration(reason) => write!(f, "invalid configuration: {reason}"),
      Self::ConfigFile(error) => write!(f, "invalid configuration file: {error}"),
      Self::Dac(error) => write!(f, "could not reach DAC bus: {error}"),
      Self::Gpio(error) => write!(f, "could not open GPIO controller: {error}"),
      Self::Runtime(error) => write!(f, "could not start runtime: {error}"),
    }
  }
}

impl std::error::Error for Error {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::ConfigFile(error) => Some(error),
      Self::Dac(error) => Some(error),
      Self::Gpio(error) => Some(error),
      Self::Runtime(error) => Some(error),
      Self::Configuration(_) => None,
    }
  }
}

impl From<mcp4812::Error> for Error {
  fn from(error: mcp4812::Error) -> Self {
    Error::Dac(error)
  }
}

impl From<serde_json::Error> for Error {
  fn from(error: serde_json::Error) -> Self {
    Error::ConfigFile(error)
  }
}

/// A result wrapper for errors which stop the CPU meter.
pub type Result<T> = std::result::Result<T, Error>;
