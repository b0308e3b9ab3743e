use std::collections::BTreeMap;

use log::{debug, warn};

use crate::{
  arena::Arena,
  best_fit::BestFitAllocator,
  buddy::BuddyAllocator,
  error::{ConfigError, CreateError, HarnessError},
  plugin::Plugin,
  strategy::AllocStrategy,
  system::SystemAllocator,
};

/// Builds a strategy over the given arena.
pub type Constructor = for<'a> fn(Arena<'a>) -> Result<Box<dyn AllocStrategy + 'a>, CreateError>;

/// Name-keyed table of strategy constructors.
pub struct Registry {
  entries: BTreeMap<&'static str, Constructor>,
}

impl Registry {
  pub fn empty() -> Self {
    Self {
      entries: BTreeMap::new(),
    }
  }

  /// `buddy`, `best-fit` and `system`.
  pub fn builtin() -> Self {
    let mut registry = Self::empty();
    registry.register("buddy", buddy);
    registry.register("best-fit", best_fit);
    registry.register("system", system);
    registry
  }

  /// Adds or replaces `name`, returning the constructor it displaced.
  pub fn register(
    &mut self,
    name: &'static str,
    constructor: Constructor,
  ) -> Option<Constructor> {
    self.entries.insert(name, constructor)
  }

  pub fn contains(
    &self,
    name: &str,
  ) -> bool {
    self.entries.contains_key(name)
  }

  pub fn names(
    &self,
  ) -> impl Iterator<Item = &'static str> + '_ {
    self.entries.keys().copied()
  }

  pub fn create<'a>(
    &self,
    name: &str,
    arena: Arena<'a>,
  ) -> Result<Box<dyn AllocStrategy + 'a>, HarnessError> {
    let constructor = self
      .entries
      .get(name)
      .ok_or_else(|| ConfigError::UnknownStrategy(name.to_string()))?;

    Ok(constructor(arena)?)
  }

  /// Picks the strategy to drive: the plugin when one loaded, otherwise the
  /// registered `default`.
  pub fn resolve<'a>(
    &self,
    default: &str,
    plugin: Option<&'a Plugin>,
    arena: Arena<'a>,
  ) -> Result<Box<dyn AllocStrategy + 'a>, HarnessError> {
    match plugin {
      Some(plugin) => {
        debug!("driving strategy library {}", plugin.path().display());
        Ok(Box::new(plugin.instantiate(arena)?))
      }
      None => {
        debug!("driving built-in strategy {default}");
        self.create(default, arena)
      }
    }
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::builtin()
  }
}

/// Opens `path` as a strategy library. Any failure is logged and yields
/// `None` so the caller falls back to its default strategy.
pub fn load_plugin(
  path: Option<&std::path::Path>,
) -> Option<Plugin> {
  let path = path?;

  match Plugin::load(path) {
    Ok(plugin) => Some(plugin),
    Err(error) => {
      warn!("{error}; falling back to the built-in strategy");
      None
    }
  }
}

fn buddy<'a>(
  arena: Arena<'a>,
) -> Result<Box<dyn AllocStrategy + 'a>, CreateError> {
  Ok(Box::new(BuddyAllocator::new(arena)?))
}

fn best_fit<'a>(
  arena: Arena<'a>,
) -> Result<Box<dyn AllocStrategy + 'a>, CreateError> {
  Ok(Box::new(BestFitAllocator::new(arena)?))
}

fn system<'a>(
  _arena: Arena<'a>,
) -> Result<Box<dyn AllocStrategy + 'a>, CreateError> {
  Ok(Box::new(SystemAllocator::new()))
}
