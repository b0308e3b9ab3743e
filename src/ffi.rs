//! C ABI of the allocator contract, exported when built with the `ffi`
//! feature so the `cdylib` can be handed to another harness as a strategy
//! library. Buddy is exported by default, best-fit with `ffi-best-fit`.

use std::ptr::{self, NonNull};

use libc::c_void;
use log::warn;

use crate::{
  arena::Arena,
  strategy::{AllocStrategy, AllocatorStats},
};

#[cfg(not(feature = "ffi-best-fit"))]
type Exported<'a> = crate::buddy::BuddyAllocator<'a>;
#[cfg(feature = "ffi-best-fit")]
type Exported<'a> = crate::best_fit::BestFitAllocator<'a>;

/// # Safety
///
/// `memory..memory + size` must stay valid, and untouched by anyone but this
/// handle's callers, until `allocator_destroy`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn allocator_create(
  memory: *mut c_void,
  size: usize,
) -> *mut c_void {
  let Some(base) = NonNull::new(memory.cast::<u8>()) else {
    return ptr::null_mut();
  };

  let arena = unsafe { Arena::from_raw_parts(base, size) };

  match Exported::new(arena) {
    Ok(allocator) => Box::into_raw(Box::new(allocator)).cast(),
    Err(error) => {
      warn!("allocator_create: {error}");
      ptr::null_mut()
    }
  }
}

/// # Safety
///
/// `allocator` must come from `allocator_create` and not be destroyed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn allocator_destroy(
  allocator: *mut c_void,
) {
  if !allocator.is_null() {
    drop(unsafe { Box::from_raw(allocator.cast::<Exported<'static>>()) });
  }
}

/// # Safety
///
/// `allocator` must be a live handle from `allocator_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn allocator_alloc(
  allocator: *mut c_void,
  size: usize,
) -> *mut c_void {
  let Some(allocator) = (unsafe { allocator.cast::<Exported<'static>>().as_mut() }) else {
    return ptr::null_mut();
  };

  allocator
    .alloc(size)
    .map_or(ptr::null_mut(), |block| block.as_ptr().cast())
}

/// # Safety
///
/// `allocator` must be a live handle and `memory` null or a pointer it
/// returned that was not freed since.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn allocator_free(
  allocator: *mut c_void,
  memory: *mut c_void,
) {
  if let Some(allocator) = unsafe { allocator.cast::<Exported<'static>>().as_mut() } {
    unsafe { allocator.free(memory.cast()) };
  }
}

/// # Safety
///
/// `allocator` must be a live handle from `allocator_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn allocator_get_stats(
  allocator: *mut c_void,
) -> AllocatorStats {
  unsafe { allocator.cast::<Exported<'static>>().as_ref() }
    .map(AllocStrategy::stats)
    .unwrap_or_default()
}
