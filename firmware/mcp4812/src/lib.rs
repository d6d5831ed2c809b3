//! Driver for the MCP4812 dual 10-bit voltage-output DAC.
//!
//! Every chip holds two channels, A and B, which are set independently by one
//! 16-bit command word shifted in over SPI:
//!
//! | bit    | meaning                                  |
//! |--------|------------------------------------------|
//! | 15     | channel select, 1 selects channel B      |
//! | 14     | ignored                                  |
//! | 13     | gain, 1 selects x1 and 0 selects x2      |
//! | 12     | output enabled when set                  |
//! | 11..2  | 10-bit output code                       |
//! | 1..0   | ignored                                  |
//!
//! The high byte is shifted out first.

#![warn(missing_docs)]

use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use std::{
  fmt::{self, Display, Formatter},
  io,
};

/// The largest code accepted by the converter.
pub const MAX_CODE: u16 = 0x03FF;

const CHANNEL_B_BIT: u16 = 1 << 15;
const GAIN_X1_BIT: u16 = 1 << 13;
const ENABLED_BIT: u16 = 1 << 12;
const CODE_SHIFT: u16 = 2;

/// A error related to interacting with MCP4812 converters.
#[derive(Debug)]
pub enum Error {
  /// Indicates that a write addressed a chip select which the bus does not
  /// have.
  ChipSelectInvalid(usize),

  /// Indicates that a SPI I/O error has occurred.
  SPI(io::Error),
}

impl Display for Error {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    match self {
      Self::ChipSelectInvalid(chip) => {
        write!(f, "no DAC on chip select {chip}")
      }
      Self::SPI(error) => {
        write!(f, "SPI error: {error}")
      }
    }
  }
}

impl std::error::Error for Error {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::SPI(error) => Some(error),
      _ => None,
    }
  }
}

impl From<io::Error> for Error {
  fn from(error: io::Error) -> Self {
    Error::SPI(error)
  }
}

/// A result wrapper for errors from MCP4812 converters.
pub type Result<T> = std::result::Result<T, Error>;

/// One of the two outputs of a chip.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Channel {
  /// Output A, pin 8 (Vouta).
  A,

  /// Output B, pin 6 (Voutb).
  B,
}

/// The output gain of a channel relative to the internal 2.048 V reference.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Gain {
  /// Full scale equals the reference.
  #[default]
  X1,

  /// Full scale equals twice the reference.
  X2,
}

/// The decoded contents of a command word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Command {
  /// The 10-bit output code.
  pub code: u16,

  /// The addressed channel.
  pub channel: Channel,

  /// The selected gain.
  pub gain: Gain,

  /// Whether the channel's output is active.
  pub enabled: bool,
}

/// Packs a command word for one channel.
///
/// `value` is reduced to its magnitude and then to its low 10 bits, so any
/// integer produces a well-formed word.
pub fn encode(value: i32, channel: Channel, gain: Gain, enabled: bool) -> [u8; 2] {
  let mut word = ((value.unsigned_abs() & u32::from(MAX_CODE)) as u16) << CODE_SHIFT;

  if channel == Channel::B {
    word |= CHANNEL_B_BIT;
  }

  if gain == Gain::X1 {
    word |= GAIN_X1_BIT;
  }

  if enabled {
    word |= ENABLED_BIT;
  }

  word.to_be_bytes()
}

/// Unpacks a command word produced by [`encode`].
pub fn decode(bytes: [u8; 2]) -> Command {
  let word = u16::from_be_bytes(bytes);

  Command {
    code: (word >> CODE_SHIFT) & MAX_CODE,
    channel: if word & CHANNEL_B_BIT != 0 {
      Channel::B
    } else {
      Channel::A
    },
    gain: if word & GAIN_X1_BIT != 0 {
      Gain::X1
    } else {
      Gain::X2
    },
    enabled: word & ENABLED_BIT != 0,
  }
}

/// Byte-level access to a set of chips sharing one SPI bus, each addressed by
/// its chip select.
pub trait Bus {
  /// Shifts `bytes` into the chip on chip select `chip` as one transaction.
  fn write(&mut self, chip: usize, bytes: &[u8]) -> Result<()>;
}

/// A fixed output of one chip on the bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DacChannel {
  /// Chip select of the chip holding the output.
  pub chip: usize,

  /// The output within the chip.
  pub channel: Channel,

  /// The output gain.
  pub gain: Gain,

  /// Whether the output is driven.
  pub enabled: bool,
}

impl DacChannel {
  /// Describes an enabled output at x1 gain.
  pub fn new(chip: usize, channel: Channel) -> Self {
    DacChannel {
      chip,
      channel,
      gain: Gain::X1,
      enabled: true,
    }
  }

  /// The command word that sets this output to `value`.
  pub fn word(&self, value: i32) -> [u8; 2] {
    encode(value, self.channel, self.gain, self.enabled)
  }

  /// Sets the analog output. One 2-byte transaction, roughly 50 us at 12 MHz.
  pub fn set_output<B: Bus + ?Sized>(&self, bus: &mut B, value: i32) -> Result<()> {
    bus.write(self.chip, &self.word(value))
  }
}

/// The converters of a board, one `spidev` device per chip select.
pub struct SpiBus {
  chips: Vec<Spidev>,
}

impl SpiBus {
  /// Opens chip selects `0..chip_count` of the bus whose device files start
  /// with `url`, so `/dev/spidev0` opens `/dev/spidev0.0`, `/dev/spidev0.1`
  /// and so on.
  pub fn open(url: &str, frequency: u32, chip_count: usize) -> Result<Self> {
    // SPI options specified by the datasheet. Mode 0 and mode 3 both work.
    let options = SpidevOptions::new()
      .bits_per_word(8)
      .max_speed_hz(frequency)
      .lsb_first(false)
      .mode(SpiModeFlags::SPI_MODE_0)
      .build();

    let mut chips = Vec::with_capacity(chip_count);

    for chip in 0..chip_count {
      let mut spi = Spidev::open(format!("{url}.{chip}"))?;
      spi.configure(&options)?;
      chips.push(spi);
    }

    Ok(SpiBus { chips })
  }

  /// The number of chip selects opened.
  pub fn chip_count(&self) -> usize {
    self.chips.len()
  }
}

impl Bus for SpiBus {
  fn write(&mut self, chip: usize, bytes: &[u8]) -> Result<()> {
    let spi = self
      .chips
      .get_mut(chip)
      .ok_or(Error::ChipSelectInvalid(chip))?;

    let mut transfer = SpidevTransfer::write(bytes);
    spi.transfer(&mut transfer)?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Default)]
  struct Recorder {
    writes: Vec<(usize, Vec<u8>)>,
  }

  impl Bus for Recorder {
    fn write(&mut self, chip: usize, bytes: &[u8]) -> Result<()> {
      if chip > 2 {
        return Err(Error::ChipSelectInvalid(chip));
      }

      self.writes.push((chip, bytes.to_vec()));
      Ok(())
    }
  }

  #[test]
  fn full_scale_channel_b() {
    assert_eq!(encode(1023, Channel::B, Gain::X1, true), [0xBF, 0xFC]);
  }

  #[test]
  fn zero_channel_a_shutdown() {
    assert_eq!(encode(0, Channel::A, Gain::X2, false), [0x00, 0x00]);
    assert_eq!(encode(0, Channel::A, Gain::X1, true), [0x30, 0x00]);
  }

  #[test]
  fn out_of_range_values_are_masked() {
    // 2000 = 0b111_1101_0000, the low ten bits are 976.
    assert_eq!(encode(2000, Channel::A, Gain::X2, false), [0x0F, 0x40]);
    assert_eq!(decode(encode(2000, Channel::B, Gain::X1, true)).code, 976);
    assert_eq!(decode(encode(1024, Channel::A, Gain::X1, true)).code, 0);
  }

  #[test]
  fn negative_values_use_magnitude() {
    assert_eq!(
      encode(-5, Channel::B, Gain::X1, true),
      encode(5, Channel::B, Gain::X1, true)
    );
  }

  #[test]
  fn decode_reproduces_fields() {
    let cases = [
      (1023, Channel::B, Gain::X1, true),
      (512, Channel::A, Gain::X2, true),
      (1, Channel::B, Gain::X2, false),
      (700, Channel::A, Gain::X1, false),
    ];

    for (code, channel, gain, enabled) in cases {
      let command = decode(encode(code, channel, gain, enabled));

      assert_eq!(
        command,
        Command {
          code: code as u16,
          channel,
          gain,
          enabled
        }
      );
    }
  }

  #[test]
  fn channel_writes_its_chip() {
    let mut bus = Recorder::default();
    let channel = DacChannel::new(2, Channel::B);

    channel.set_output(&mut bus, 1023).unwrap();

    assert_eq!(bus.writes, vec![(2, vec![0xBF, 0xFC])]);
  }

  #[test]
  fn invalid_chip_is_reported() {
    let mut bus = Recorder::default();
    let channel = DacChannel::new(7, Channel::A);

    assert!(matches!(
      channel.set_output(&mut bus, 0),
      Err(Error::ChipSelectInvalid(7))
    ));
  }
}
