use std::{io, path::PathBuf};

use thiserror::Error;

/// Strategy creation failed; the caller must not proceed with the arena.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreateError {
  #[error("arena of {capacity} bytes is smaller than the minimum of {minimum} bytes")]
  ArenaTooSmall { capacity: usize, minimum: usize },

  #[error("arena of {capacity} bytes exceeds the largest supported block")]
  ArenaTooLarge { capacity: usize },
}

#[derive(Error, Debug)]
pub enum ArenaError {
  #[error("arena size must be greater than zero")]
  ZeroSize,

  #[error("failed to map {size} byte arena: {source}")]
  Map {
    size: usize,
    #[source]
    source: io::Error,
  },
}

/// Reasons an external strategy library was rejected.
///
/// Never fatal to the harness: resolution falls back to the default strategy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
  #[error("cannot open strategy library {path}: {reason}")]
  Open { path: PathBuf, reason: String },

  #[error("strategy library {path} does not export `{symbol}`")]
  MissingSymbol { path: PathBuf, symbol: &'static str },

  #[error("strategy library returned a null handle")]
  CreateFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
  #[error("invalid value {value:?} for {key}")]
  InvalidNumber { key: &'static str, value: String },

  #[error("no strategy registered as {0:?}")]
  UnknownStrategy(String),
}

#[derive(Error, Debug)]
pub enum HarnessError {
  #[error(transparent)]
  Arena(#[from] ArenaError),

  #[error(transparent)]
  Create(#[from] CreateError),

  #[error(transparent)]
  Plugin(#[from] PluginError),

  #[error(transparent)]
  Config(#[from] ConfigError),
}
