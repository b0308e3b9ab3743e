use std::ptr::NonNull;

use libc::c_void;

use crate::strategy::{AllocStrategy, AllocatorStats};

/// Passthrough to the host `malloc`/`free`.
///
/// Ignores the arena entirely and keeps no statistics, so its utilization
/// always reads as zero.
#[derive(Debug, Default)]
pub struct SystemAllocator;

impl SystemAllocator {
  pub fn new() -> Self {
    Self
  }
}

impl AllocStrategy for SystemAllocator {
  fn name(
    &self,
  ) -> &str {
    "system"
  }

  fn alloc(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    // malloc(0) may legally return null; ask for one byte instead.
    let address = unsafe { libc::malloc(size.max(1)) };
    NonNull::new(address.cast::<u8>())
  }

  unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    unsafe { libc::free(ptr.cast::<c_void>()) }
  }

  fn stats(
    &self,
  ) -> AllocatorStats {
    AllocatorStats::default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_system_round_trip() {
    let mut allocator = SystemAllocator::new();

    unsafe {
      let ptr = allocator.alloc(16).unwrap().as_ptr() as *mut u64;
      *ptr = 3;
      assert_eq!(*ptr, 3);
      allocator.free(ptr as *mut u8);

      let zero = allocator.alloc(0).unwrap();
      allocator.free(zero.as_ptr());
      allocator.free(std::ptr::null_mut());
    }

    assert_eq!(allocator.stats(), AllocatorStats::default());
    assert_eq!(allocator.name(), "system");
  }
}
