//! Best-fit strategy over a boundary-tagged free list.
//!
//! ```text
//!   ┌─────────────────┬──────────┬─────────────────┬──────────┬─────
//!   │ size            │          │ size            │          │
//!   │ prev_size ──────┼──┐       │ prev_size       │          │
//!   │ tag | links     │  │       │ tag | links     │          │
//!   └─────────────────┴──┼───────┴─────────────────┴──────────┴─────
//!        header          │ payload      header     ▲  payload
//!                        └─────────────────────────┘
//!           (each header knows its physical predecessor's size)
//! ```
//!
//! Free blocks sit on one unordered list. Allocation scans all of it for the
//! smallest block that still fits; freeing merges with both physical
//! neighbours, found through `size` (forward) and `prev_size` (backward).

use std::{mem, ptr::NonNull};

use log::{debug, trace};

use crate::{
  align,
  arena::Arena,
  block::{BlockInfo, BlockState, FreeList, Header, Links, RETIRED_TAG, contract_violation, retire},
  error::CreateError,
  strategy::{AllocStrategy, AllocatorStats},
};

pub const HEADER_SIZE: usize = mem::size_of::<FitHeader>();
/// Payload handed out for `alloc(0)`.
pub const MIN_PAYLOAD: usize = mem::size_of::<usize>();

/// `prev_size` of the block at offset zero, which has no predecessor.
const NO_PREDECESSOR: usize = usize::MAX;

#[repr(C)]
#[derive(Clone, Copy)]
struct FitHeader {
  size: usize,
  prev_size: usize,
  tag: u32,
  links: Links,
}

impl FitHeader {
  fn new(
    size: usize,
    prev_size: usize,
    state: BlockState,
  ) -> Self {
    let (tag, links) = state.encode();

    Self {
      size,
      prev_size,
      tag,
      links,
    }
  }
}

impl Header for FitHeader {
  fn state(
    &self,
  ) -> Option<BlockState> {
    BlockState::decode(self.tag, self.links)
  }

  fn set_state(
    &mut self,
    state: BlockState,
  ) {
    (self.tag, self.links) = state.encode();
  }

  fn retire(
    &mut self,
  ) {
    self.tag = RETIRED_TAG;
  }
}

pub struct BestFitAllocator<'a> {
  arena: Arena<'a>,
  free: FreeList,
  stats: AllocatorStats,
}

impl<'a> BestFitAllocator<'a> {
  /// Takes over `arena` as a single free block spanning it minus one header.
  pub fn new(
    mut arena: Arena<'a>,
  ) -> Result<Self, CreateError> {
    let capacity = arena.capacity();

    if capacity < HEADER_SIZE {
      return Err(CreateError::ArenaTooSmall {
        capacity,
        minimum: HEADER_SIZE,
      });
    }

    arena.store(
      0,
      FitHeader::new(
        capacity - HEADER_SIZE,
        NO_PREDECESSOR,
        BlockState::Free {
          next: None,
          prev: None,
        },
      ),
    );

    let mut free = FreeList::default();
    free.push::<FitHeader>(&mut arena, 0);

    debug!("best-fit: {capacity} byte arena, {HEADER_SIZE} byte headers");

    Ok(Self {
      arena,
      free,
      stats: AllocatorStats::default(),
    })
  }

  /// Number of blocks on the free list.
  pub fn free_blocks(
    &self,
  ) -> usize {
    self.free.len()
  }

  /// Walks the arena front to back, one header per block.
  pub fn blocks(
    &self,
  ) -> Vec<BlockInfo> {
    let mut blocks = Vec::new();
    let mut offset = 0;

    while self.arena.fits::<FitHeader>(offset) {
      let header = self.arena.load::<FitHeader>(offset);
      let span = HEADER_SIZE + header.size;

      blocks.push(BlockInfo {
        offset,
        span,
        free: header.state().is_some_and(|state| state.is_free()),
      });

      offset += span;
    }

    blocks
  }

  /// Smallest free block whose payload holds `payload` bytes; the first one
  /// met wins a tie.
  fn best_fit(
    &self,
    payload: usize,
  ) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;

    for offset in self.free.iter::<FitHeader>(&self.arena) {
      let size = self.arena.load::<FitHeader>(offset).size;

      if size >= payload && best.is_none_or(|(_, best_size)| size < best_size) {
        best = Some((offset, size));
      }
    }

    best
  }

  /// Header offset of the block physically after the one at `offset`.
  fn successor(
    &self,
    offset: usize,
    size: usize,
  ) -> Option<usize> {
    let next = offset.checked_add(HEADER_SIZE)?.checked_add(size)?;
    self.arena.fits::<FitHeader>(next).then_some(next)
  }

  /// Header offset of the block physically before the one at `offset`.
  ///
  /// The first block is tagged with `NO_PREDECESSOR`, so nothing before the
  /// arena start is ever read.
  fn predecessor(
    &self,
    offset: usize,
    prev_size: usize,
  ) -> Option<usize> {
    if prev_size == NO_PREDECESSOR {
      return None;
    }

    offset.checked_sub(HEADER_SIZE)?.checked_sub(prev_size)
  }

  fn set_prev_size(
    &mut self,
    offset: usize,
    prev_size: usize,
  ) {
    let mut header = self.arena.load::<FitHeader>(offset);
    header.prev_size = prev_size;
    self.arena.store(offset, header);
  }

  /// The neighbour at `offset` if it is on the free list, with its header.
  fn free_neighbour(
    &self,
    offset: Option<usize>,
  ) -> Option<(usize, FitHeader)> {
    let offset = offset?;
    let header = self.arena.load::<FitHeader>(offset);

    header
      .state()
      .is_some_and(|state| state.is_free())
      .then_some((offset, header))
  }
}

impl AllocStrategy for BestFitAllocator<'_> {
  fn name(
    &self,
  ) -> &str {
    "best-fit"
  }

  fn alloc(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    if size > self.arena.capacity() {
      return None;
    }

    let payload = align!(size).max(MIN_PAYLOAD);
    let (block, available) = self.best_fit(payload)?;
    self.free.remove::<FitHeader>(&mut self.arena, block);

    let mut reserved = available;

    if available >= payload + HEADER_SIZE + MIN_PAYLOAD {
      let rest = block + HEADER_SIZE + payload;
      let rest_size = available - payload - HEADER_SIZE;
      trace!("best-fit: split {block} ({available}) at {rest} ({rest_size} left)");

      self.arena.store(
        rest,
        FitHeader::new(
          rest_size,
          payload,
          BlockState::Free {
            next: None,
            prev: None,
          },
        ),
      );

      if let Some(next) = self.successor(rest, rest_size) {
        self.set_prev_size(next, rest_size);
      }

      self.free.push::<FitHeader>(&mut self.arena, rest);
      reserved = payload;
    }

    let prev_size = self.arena.load::<FitHeader>(block).prev_size;
    self.arena.store(
      block,
      FitHeader::new(reserved, prev_size, BlockState::Allocated { requested: size }),
    );

    self.stats.requested += size;
    self.stats.allocated += reserved + HEADER_SIZE;

    Some(self.arena.ptr_at(block + HEADER_SIZE))
  }

  unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    if ptr.is_null() {
      return;
    }

    let Some(offset) = self
      .arena
      .offset_of(ptr)
      .and_then(|payload| payload.checked_sub(HEADER_SIZE))
    else {
      return contract_violation("best-fit", ptr, "pointer outside arena");
    };

    let header = self.arena.load::<FitHeader>(offset);

    let Some(BlockState::Allocated { requested }) = header.state() else {
      return contract_violation("best-fit", ptr, "block is not allocated");
    };

    let end = offset
      .checked_add(HEADER_SIZE)
      .and_then(|start| start.checked_add(header.size));
    if end.is_none_or(|end| end > self.arena.capacity()) {
      return contract_violation("best-fit", ptr, "corrupted block header");
    }

    self.stats.requested -= requested;
    self.stats.allocated -= header.size + HEADER_SIZE;
    retire::<FitHeader>(&mut self.arena, offset);

    let mut block = offset;
    let mut size = header.size;
    let mut prev_size = header.prev_size;

    let next = self.successor(block, size);
    if let Some((next, next_header)) = self.free_neighbour(next) {
      self.free.remove::<FitHeader>(&mut self.arena, next);
      retire::<FitHeader>(&mut self.arena, next);
      trace!("best-fit: absorb next {next} into {block}");
      size += HEADER_SIZE + next_header.size;
    }

    let prev = self.predecessor(block, prev_size);
    if let Some((prev, prev_header)) = self.free_neighbour(prev) {
      if prev + HEADER_SIZE + prev_header.size == block {
        self.free.remove::<FitHeader>(&mut self.arena, prev);
        trace!("best-fit: absorb {block} into previous {prev}");
        size += HEADER_SIZE + prev_header.size;
        block = prev;
        prev_size = prev_header.prev_size;
      }
    }

    self.arena.store(
      block,
      FitHeader::new(
        size,
        prev_size,
        BlockState::Free {
          next: None,
          prev: None,
        },
      ),
    );

    if let Some(next) = self.successor(block, size) {
      self.set_prev_size(next, size);
    }

    self.free.push::<FitHeader>(&mut self.arena, block);
  }

  fn stats(
    &self,
  ) -> AllocatorStats {
    self.stats
  }
}
