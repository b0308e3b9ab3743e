use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_ARENA_SIZE: usize = 1 << 24;
pub const DEFAULT_OPS: usize = 100_000;
pub const DEFAULT_BLOCK_SIZE: usize = 32;
pub const DEFAULT_STRATEGY: &str = "buddy";

pub const ARENA_SIZE_VAR: &str = "ARENALLOC_ARENA_SIZE";
pub const OPS_VAR: &str = "ARENALLOC_OPS";
pub const BLOCK_SIZE_VAR: &str = "ARENALLOC_BLOCK_SIZE";
pub const STRATEGY_VAR: &str = "ARENALLOC_STRATEGY";

/// Settings of one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
  /// Bytes mapped for the arena.
  pub arena_size: usize,
  /// Allocations issued, then freed, by the workload.
  pub ops: usize,
  /// Size of every workload request.
  pub block_size: usize,
  /// Registry name used when no plugin loads.
  pub strategy: String,
  /// External strategy library to try first.
  pub plugin: Option<PathBuf>,
}

impl Default for HarnessConfig {
  fn default() -> Self {
    Self {
      arena_size: DEFAULT_ARENA_SIZE,
      ops: DEFAULT_OPS,
      block_size: DEFAULT_BLOCK_SIZE,
      strategy: DEFAULT_STRATEGY.to_string(),
      plugin: None,
    }
  }
}

impl HarnessConfig {
  /// Defaults overridden by the `ARENALLOC_*` environment variables.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  pub fn from_lookup<F>(
    lookup: F,
  ) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Self::default();

    if let Some(value) = lookup(ARENA_SIZE_VAR) {
      config.arena_size = parse_count(ARENA_SIZE_VAR, &value, false)?;
    }

    if let Some(value) = lookup(OPS_VAR) {
      config.ops = parse_count(OPS_VAR, &value, false)?;
    }

    if let Some(value) = lookup(BLOCK_SIZE_VAR) {
      config.block_size = parse_count(BLOCK_SIZE_VAR, &value, true)?;
    }

    if let Some(value) = lookup(STRATEGY_VAR) {
      config.strategy = value.trim().to_string();
    }

    Ok(config)
  }

  pub fn with_plugin(
    mut self,
    path: impl Into<PathBuf>,
  ) -> Self {
    self.plugin = Some(path.into());
    self
  }
}

fn parse_count(
  key: &'static str,
  value: &str,
  allow_zero: bool,
) -> Result<usize, ConfigError> {
  let invalid = || ConfigError::InvalidNumber {
    key,
    value: value.to_string(),
  };

  let count = value.trim().parse::<usize>().map_err(|_| invalid())?;

  if count == 0 && !allow_zero {
    return Err(invalid());
  }

  Ok(count)
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn lookup(
    vars: &[(&str, &str)],
  ) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();

    move |key| vars.get(key).cloned()
  }

  #[test]
  fn test_defaults() {
    let config = HarnessConfig::from_lookup(lookup(&[])).unwrap();

    assert_eq!(config, HarnessConfig::default());
    assert_eq!(config.arena_size, 16 * 1024 * 1024);
    assert_eq!(config.ops, 100_000);
    assert_eq!(config.block_size, 32);
    assert_eq!(config.strategy, "buddy");
    assert!(config.plugin.is_none());
  }

  #[test]
  fn test_overrides() {
    let config = HarnessConfig::from_lookup(lookup(&[
      (ARENA_SIZE_VAR, "4096"),
      (OPS_VAR, " 10 "),
      (BLOCK_SIZE_VAR, "0"),
      (STRATEGY_VAR, "best-fit"),
    ]))
    .unwrap()
    .with_plugin("/tmp/libstrategy.so");

    assert_eq!(config.arena_size, 4096);
    assert_eq!(config.ops, 10);
    assert_eq!(config.block_size, 0);
    assert_eq!(config.strategy, "best-fit");
    assert_eq!(config.plugin, Some(PathBuf::from("/tmp/libstrategy.so")));
  }

  #[test]
  fn test_invalid_numbers() {
    let zero = HarnessConfig::from_lookup(lookup(&[(OPS_VAR, "0")]));
    assert_eq!(
      zero,
      Err(ConfigError::InvalidNumber {
        key: OPS_VAR,
        value: "0".to_string(),
      })
    );

    let garbage = HarnessConfig::from_lookup(lookup(&[(ARENA_SIZE_VAR, "16MB")]));
    assert!(matches!(garbage, Err(ConfigError::InvalidNumber { key: ARENA_SIZE_VAR, .. })));
  }
}
