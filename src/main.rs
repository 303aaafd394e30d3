use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::LevelFilter;

/// Compile a C translation unit to RV64 assembly.
#[derive(Parser, Debug)]
#[command(name = "rv64cc", version, about)]
struct Cli {
  /// Source text to compile, or a path when --file is given
  input: String,

  /// Treat INPUT as the path of a source file
  #[arg(short, long)]
  file: bool,

  /// Write the assembly to FILE instead of stdout
  #[arg(short, long, value_name = "FILE")]
  output: Option<PathBuf>,

  /// Enable debug logging
  #[arg(short, long)]
  verbose: bool,
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose {
    LevelFilter::Debug
  } else {
    LevelFilter::Warn
  };
  env_logger::Builder::new()
    .filter_level(default_level)
    .parse_default_env()
    .init();

  let source = if cli.file {
    match fs::read_to_string(&cli.input) {
      Ok(source) => source,
      Err(err) => {
        eprintln!("cannot read {}: {err}", cli.input);
        process::exit(1);
      }
    }
  } else {
    cli.input
  };

  let asm = match rv64cc::generate_assembly(&source) {
    Ok(asm) => asm,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  match cli.output {
    Some(path) => {
      if let Err(err) = fs::write(&path, asm) {
        eprintln!("cannot write {}: {err}", path.display());
        process::exit(1);
      }
      log::debug!("wrote {}", path.display());
    }
    None => print!("{asm}"),
  }
}
