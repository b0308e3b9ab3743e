use std::process::ExitCode;

use arenalloc::{HarnessConfig, Registry, bench};
use log::error;

/// Usage: `arenalloc [path/to/libstrategy.so]`
///
/// Without an argument the strategy named by `ARENALLOC_STRATEGY` (default
/// `buddy`) is benchmarked. A library that cannot be loaded, or that lacks
/// any contract symbol, is skipped in favour of that default.
fn main() -> ExitCode {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

  let config = match HarnessConfig::from_env() {
    Ok(config) => config,
    Err(e) => {
      error!("{e}");
      eprintln!("arenalloc: {e}");
      return ExitCode::FAILURE;
    }
  };

  let config = match std::env::args_os().nth(1) {
    Some(path) => config.with_plugin(path),
    None => config,
  };

  match bench::run(&config, &Registry::builtin()) {
    Ok(report) => {
      print!("{report}");
      ExitCode::SUCCESS
    }
    Err(e) => {
      error!("{e}");
      eprintln!("arenalloc: {e}");
      ExitCode::FAILURE
    }
  }
}
