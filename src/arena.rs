use std::{
  io,
  marker::PhantomData,
  mem,
  ptr::{self, NonNull},
};

use log::{debug, warn};

use crate::error::ArenaError;

/// A caller-owned contiguous region handed to exactly one strategy.
///
/// Strategies address the region by byte offset from `base`. Every metadata
/// read or write goes through [`Arena::load`] / [`Arena::store`], which are
/// bounds-checked against `capacity`, so a corrupted header or a foreign
/// pointer can damage allocator state but never reach memory outside the
/// region.
///
/// ```text
///   base                                               base + capacity
///   ┌────────┬─────────────┬────────┬─────────────────────────────┐
///   │ header │   payload   │ header │         payload ...         │
///   └────────┴─────────────┴────────┴─────────────────────────────┘
///   0        ▲                                                     capacity
///            └── offset handed back to the caller as a pointer
/// ```
pub struct Arena<'a> {
  base: NonNull<u8>,
  capacity: usize,
  _region: PhantomData<&'a mut [u8]>,
}

impl<'a> Arena<'a> {
  pub fn from_slice(
    region: &'a mut [u8],
  ) -> Self {
    let capacity = region.len();
    // A slice pointer is never null, even when the slice is empty.
    let base = NonNull::from(region).cast::<u8>();

    Self {
      base,
      capacity,
      _region: PhantomData,
    }
  }

  /// # Safety
  ///
  /// `base..base + capacity` must be valid for reads and writes for `'a`
  /// and must not be accessed through any other path except pointers
  /// handed out by the strategy that owns this arena.
  pub unsafe fn from_raw_parts(
    base: NonNull<u8>,
    capacity: usize,
  ) -> Self {
    Self {
      base,
      capacity,
      _region: PhantomData,
    }
  }

  pub fn base(
    &self,
  ) -> NonNull<u8> {
    self.base
  }

  pub fn capacity(
    &self,
  ) -> usize {
    self.capacity
  }

  /// Whether `ptr` points inside `[base, base + capacity)`.
  pub fn contains(
    &self,
    ptr: *const u8,
  ) -> bool {
    self.offset_of(ptr).is_some()
  }

  pub(crate) fn offset_of(
    &self,
    ptr: *const u8,
  ) -> Option<usize> {
    let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;
    (offset < self.capacity).then_some(offset)
  }

  pub(crate) fn ptr_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    assert!(
      offset < self.capacity,
      "offset {offset} outside arena of {} bytes",
      self.capacity
    );

    unsafe { self.base.add(offset) }
  }

  /// Whether a `T` starting at `offset` lies fully inside the arena.
  pub(crate) fn fits<T>(
    &self,
    offset: usize,
  ) -> bool {
    offset
      .checked_add(mem::size_of::<T>())
      .is_some_and(|end| end <= self.capacity)
  }

  pub(crate) fn load<T: Copy>(
    &self,
    offset: usize,
  ) -> T {
    assert!(
      self.fits::<T>(offset),
      "read of {} bytes at offset {offset} outside arena of {} bytes",
      mem::size_of::<T>(),
      self.capacity
    );

    unsafe { self.base.as_ptr().add(offset).cast::<T>().read_unaligned() }
  }

  pub(crate) fn store<T: Copy>(
    &mut self,
    offset: usize,
    value: T,
  ) {
    assert!(
      self.fits::<T>(offset),
      "write of {} bytes at offset {offset} outside arena of {} bytes",
      mem::size_of::<T>(),
      self.capacity
    );

    unsafe {
      self
        .base
        .as_ptr()
        .add(offset)
        .cast::<T>()
        .write_unaligned(value)
    }
  }
}

/// Anonymous private mapping used by the harness as its arena.
///
/// Unmapped on drop; every pointer a strategy handed out becomes invalid then.
pub struct MappedArena {
  base: NonNull<u8>,
  size: usize,
}

impl MappedArena {
  pub fn map(
    size: usize,
  ) -> Result<Self, ArenaError> {
    if size == 0 {
      return Err(ArenaError::ZeroSize);
    }

    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return Err(ArenaError::Map {
        size,
        source: io::Error::last_os_error(),
      });
    }

    let base = NonNull::new(address.cast::<u8>()).ok_or_else(|| ArenaError::Map {
      size,
      source: io::Error::other("mmap returned a null mapping"),
    })?;

    debug!("mapped {size} byte arena at {:?}", base);

    Ok(Self { base, size })
  }

  pub fn size(
    &self,
  ) -> usize {
    self.size
  }

  pub fn arena(
    &mut self,
  ) -> Arena<'_> {
    unsafe { Arena::from_raw_parts(self.base, self.size) }
  }
}

impl Drop for MappedArena {
  fn drop(
    &mut self,
  ) {
    let result = unsafe { libc::munmap(self.base.as_ptr().cast(), self.size) };

    if result != 0 {
      warn!(
        "munmap of {} byte arena failed: {}",
        self.size,
        io::Error::last_os_error()
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_load_store() {
    let mut buffer = vec![0u8; 64];
    let mut arena = Arena::from_slice(&mut buffer);

    arena.store::<u64>(3, 0xDEAD_BEEF);
    assert_eq!(arena.load::<u64>(3), 0xDEAD_BEEF);

    arena.store::<u32>(60, 7);
    assert_eq!(arena.load::<u32>(60), 7);
  }

  #[test]
  #[should_panic(expected = "outside arena")]
  fn test_store_past_end() {
    let mut buffer = vec![0u8; 16];
    let mut arena = Arena::from_slice(&mut buffer);

    arena.store::<u64>(9, 1);
  }

  #[test]
  fn test_offset_of() {
    let mut buffer = vec![0u8; 32];
    let arena = Arena::from_slice(&mut buffer);
    let base = arena.base().as_ptr();

    assert_eq!(arena.offset_of(base), Some(0));
    assert_eq!(arena.offset_of(base.wrapping_add(31)), Some(31));
    assert_eq!(arena.offset_of(base.wrapping_add(32)), None);
    assert_eq!(arena.offset_of(base.wrapping_sub(1)), None);
    assert!(!arena.contains(ptr::null()));
  }

  #[test]
  fn test_mapped_arena() {
    let mut mapped = MappedArena::map(1 << 16).unwrap();
    assert_eq!(mapped.size(), 1 << 16);

    let mut arena = mapped.arena();
    assert_eq!(arena.capacity(), 1 << 16);
    arena.store::<usize>((1 << 16) - mem::size_of::<usize>(), 42);
    assert_eq!(arena.load::<usize>((1 << 16) - mem::size_of::<usize>()), 42);
  }

  #[test]
  fn test_mapped_arena_zero_size() {
    assert!(matches!(MappedArena::map(0), Err(ArenaError::ZeroSize)));
  }
}
