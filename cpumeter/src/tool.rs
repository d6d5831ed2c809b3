use crate::{
  calculator::Calculator,
  config::Config,
  error::{Error, Result},
  hardware,
};
use jeflog::{pass, task};
use std::fmt::Write;
use tokio::runtime;

/// Where `set` puts the needle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Position {
  /// Fraction of the printed scale.
  Scale(f64),

  /// Full turns past the start of the printed scale.
  Turns(f64),
}

/// Maps the command line name of an indicator to its index.
pub fn indicator_index(name: &str) -> Result<usize> {
  match name.to_ascii_lowercase().as_str() {
    "a" => Ok(0),
    "b" => Ok(1),
    other => Err(Error::Configuration(format!("no indicator named '{other}'"))),
  }
}

/// Runs the meter until the hardware fails.
pub fn run(config: &Config) -> Result<()> {
  task!("Starting CPU meter application");

  let meter = hardware::set_up(config)?;

  runtime::Builder::new_current_thread()
    .enable_time()
    .build()
    .map_err(Error::Runtime)?
    .block_on(meter.run())
}

/// Prints what indicator `index` would be sent for `rotation`, without
/// touching any hardware.
pub fn calibrate(config: &Config, index: usize, rotation: f64) -> Result<()> {
  config.validate()?;

  let calculator = Calculator::new(&config.calibration(index))?;
  print!("{}", calibration_table(&calculator, rotation));

  Ok(())
}

/// Opens the bus and puts one indicator at `position`.
pub fn set(config: &Config, index: usize, position: Position) -> Result<()> {
  config.validate()?;

  let bus = hardware::open_bus(config)?;
  let [a, b] = hardware::scales(config, &bus)?;
  let mut scale = if index == 0 { a } else { b };

  match position {
    Position::Scale(value) => scale.set_scale(value)?,
    Position::Turns(turns) => scale.set_turns(turns)?,
  }

  pass!("Indicator at rotation {:.4}.", scale.rotation());
  Ok(())
}

fn calibration_table(calculator: &Calculator, rotation: f64) -> String {
  let positions = calculator.positions(rotation);
  let relative = calculator.relative_positions(rotation);
  let codes = calculator.digital_values(rotation);
  let intermediate = calculator.intermediate_voltages(rotation);
  let output = calculator.output_voltages(rotation);

  let mut table = format!("{calculator}\nrotation {rotation:.4}\n");
  let _ = writeln!(table, "phase  position  relative  code  dac [V]  out [V]");

  for phase in 0..3 {
    let _ = writeln!(
      table,
      "{phase:>5}  {:>8.4}  {:>8.4}  {:>4}  {:>7.3}  {:>7.3}",
      positions[phase], relative[phase], codes[phase], intermediate[phase], output[phase],
    );
  }

  table
}
