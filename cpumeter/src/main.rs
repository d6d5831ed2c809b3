use clap::{builder::PossibleValuesParser, Arg, ArgGroup, ArgMatches, Command};
use cpumeter::{
  config::Config,
  tool::{self, Position},
};
use jeflog::fail;
use std::{path::PathBuf, process};

fn main() -> anyhow::Result<()> {
  let indicator = || {
    Arg::new("indicator")
      .long("indicator")
      .short('i')
      .required(true)
      .ignore_case(true)
      .value_parser(PossibleValuesParser::new(["a", "b"]))
  };

  let matches = Command::new("cpumeter")
    .about("Shows CPU load on two three-phase panel instruments.")
    .subcommand_required(true)
    .arg(
      Arg::new("config")
        .long("config")
        .short('c')
        .global(true)
        .value_parser(clap::value_parser!(PathBuf)),
    )
    .arg(Arg::new("url").long("url").global(true))
    .arg(
      Arg::new("timestamp")
        .long("timestamp")
        .global(true)
        .value_parser(clap::value_parser!(PathBuf)),
    )
    .subcommand(
      Command::new("run")
        .about("Runs the meter until the hardware fails."),
    )
    .subcommand(
      Command::new("calibrate")
        .about("Prints the DAC codes and voltages for a rotation without touching hardware.")
        .arg(indicator())
        .arg(
          Arg::new("rotation")
            .long("rotation")
            .short('r')
            .required(true)
            .allow_negative_numbers(true)
            .value_parser(clap::value_parser!(f64)),
        ),
    )
    .subcommand(
      Command::new("set")
        .about("Moves one indicator to a scale position or rotation and exits.")
        .arg(indicator())
        .arg(
          Arg::new("scale")
            .long("scale")
            .short('s')
            .allow_negative_numbers(true)
            .value_parser(clap::value_parser!(f64)),
        )
        .arg(
          Arg::new("turns")
            .long("turns")
            .short('t')
            .allow_negative_numbers(true)
            .value_parser(clap::value_parser!(f64)),
        )
        .group(
          ArgGroup::new("position")
            .args(["scale", "turns"])
            .required(true),
        ),
    )
    .get_matches();

  let Some((command, args)) = matches.subcommand() else {
    fail!("Invalid command. Please check the command you entered.");
    process::exit(1);
  };

  let result = load_config(args).and_then(|config| match command {
    "run" => tool::run(&config),
    "calibrate" => tool::calibrate(
      &config,
      indicator_index(args)?,
      *args.get_one::<f64>("rotation").unwrap_or(&0.0),
    ),
    "set" => {
      let position = match (args.get_one::<f64>("scale"), args.get_one::<f64>("turns")) {
        (Some(value), _) => Position::Scale(*value),
        (None, Some(turns)) => Position::Turns(*turns),
        (None, None) => Position::Scale(0.0),
      };

      tool::set(&config, indicator_index(args)?, position)
    }
    _ => {
      fail!("Invalid command. Please check the command you entered.");
      process::exit(1);
    }
  });

  if let Err(error) = result {
    fail!("{}", capitalize(&error.to_string()));
    process::exit(1);
  }

  Ok(())
}

fn load_config(matches: &ArgMatches) -> cpumeter::Result<Config> {
  let mut config = Config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

  if let Some(url) = matches.get_one::<String>("url") {
    config.spi.url = url.clone();
  }

  if let Some(timestamp) = matches.get_one::<PathBuf>("timestamp") {
    config.timestamp_path = timestamp.clone();
  }

  config.validate()?;
  Ok(config)
}

fn indicator_index(args: &ArgMatches) -> cpumeter::Result<usize> {
  let name = args.get_one::<String>("indicator").map(String::as_str).unwrap_or("a");
  tool::indicator_index(name)
}

fn capitalize(message: &str) -> String {
  let mut chars = message.chars();

  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}
