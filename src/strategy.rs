use std::ptr::NonNull;

/// Running byte counters of a strategy, as seen across the C ABI.
///
/// `requested` counts what live callers asked for, `allocated` what the
/// strategy reserved for them including headers and rounding. Both return to
/// zero once every allocation is freed.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
  pub requested: usize,
  pub allocated: usize,
}

impl AllocatorStats {
  /// `requested / allocated` as a percentage; `0.0` when nothing is reserved.
  pub fn utilization(
    &self,
  ) -> f64 {
    if self.allocated == 0 {
      return 0.0;
    }

    self.requested as f64 * 100.0 / self.allocated as f64
  }
}

/// The capability set every allocation strategy offers over one arena.
///
/// Creating a strategy is its constructor; destroying it is `Drop`, after
/// which every pointer it handed out is dangling. A handle is single
/// threaded: callers needing concurrency use one handle per arena.
pub trait AllocStrategy {
  fn name(
    &self,
  ) -> &str;

  /// Reserves at least `size` bytes. `size == 0` is valid and yields the
  /// strategy's minimum block. `None` when no block can satisfy the request.
  fn alloc(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>>;

  /// Returns a block to the strategy. A null `ptr` is a no-op.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by [`AllocStrategy::alloc`] on this same
  /// handle and not freed since, and the caller must not touch the block
  /// afterwards.
  unsafe fn free(
    &mut self,
    ptr: *mut u8,
  );

  fn stats(
    &self,
  ) -> AllocatorStats;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_utilization() {
    let stats = AllocatorStats {
      requested: 32,
      allocated: 64,
    };
    assert_eq!(stats.utilization(), 50.0);

    assert_eq!(AllocatorStats::default().utilization(), 0.0);
  }
}
