use std::{
  fmt,
  ptr::NonNull,
  time::{Duration, Instant},
};

use log::{debug, info};

use crate::{
  arena::MappedArena,
  config::HarnessConfig,
  error::HarnessError,
  registry::{Registry, load_plugin},
  strategy::{AllocStrategy, AllocatorStats},
};

/// `ops` equal-size allocations, then every one of them freed in
/// allocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workload {
  pub ops: usize,
  pub block_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchReport {
  pub strategy: String,
  pub alloc_time: Duration,
  pub free_time: Duration,
  /// Counters sampled between the two phases.
  pub stats: AllocatorStats,
  pub failed_allocs: usize,
}

impl Workload {
  pub fn from_config(
    config: &HarnessConfig,
  ) -> Self {
    Self {
      ops: config.ops,
      block_size: config.block_size,
    }
  }

  pub fn run(
    &self,
    strategy: &mut dyn AllocStrategy,
  ) -> BenchReport {
    let mut blocks: Vec<Option<NonNull<u8>>> = Vec::with_capacity(self.ops);

    let start = Instant::now();
    for _ in 0..self.ops {
      blocks.push(strategy.alloc(self.block_size));
    }
    let alloc_time = start.elapsed();

    let stats = strategy.stats();
    let failed_allocs = blocks.iter().filter(|block| block.is_none()).count();

    let start = Instant::now();
    for block in &blocks {
      let ptr = block.map_or(std::ptr::null_mut(), NonNull::as_ptr);
      unsafe { strategy.free(ptr) };
    }
    let free_time = start.elapsed();

    debug!(
      "{}: {} ops of {} bytes, {failed_allocs} failed, {stats:?}",
      strategy.name(),
      self.ops,
      self.block_size
    );

    BenchReport {
      strategy: strategy.name().to_string(),
      alloc_time,
      free_time,
      stats,
      failed_allocs,
    }
  }
}

impl BenchReport {
  pub fn utilization(
    &self,
  ) -> f64 {
    self.stats.utilization()
  }
}

impl fmt::Display for BenchReport {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "Allocation time: {:.6} sec", self.alloc_time.as_secs_f64())?;
    writeln!(f, "Free time: {:.6} sec", self.free_time.as_secs_f64())?;
    writeln!(f, "Memory utilization: {:.2}%", self.utilization())
  }
}

/// Maps the arena, resolves the strategy and runs the workload once.
///
/// A plugin that fails to load is not an error: the registry default runs
/// instead. Mapping and creation failures are.
pub fn run(
  config: &HarnessConfig,
  registry: &Registry,
) -> Result<BenchReport, HarnessError> {
  let plugin = load_plugin(config.plugin.as_deref());
  let mut mapped = MappedArena::map(config.arena_size)?;
  let arena_size = mapped.size();

  let mut strategy = registry.resolve(&config.strategy, plugin.as_ref(), mapped.arena())?;
  info!(
    "running {} ops of {} bytes on {} over {arena_size} bytes",
    config.ops,
    config.block_size,
    strategy.name()
  );

  Ok(Workload::from_config(config).run(strategy.as_mut()))
}
