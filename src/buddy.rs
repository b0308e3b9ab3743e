//! Binary buddy strategy.
//!
//! ```text
//!   order 10  ┌───────────────────────────────────────────────┐
//!             │                     1024                      │
//!             └───────────────────────┬───────────────────────┘
//!                          split      │
//!   order 9   ┌───────────────────────┴┬──────────────────────┐
//!             │          512           │    512 (free list)   │
//!             └───────────┬────────────┴──────────────────────┘
//!                   ...   ▼
//!   order 7   ┌───────────┬───────────┐
//!             │ 128 live  │ 128 free  │   sibling = offset ^ 128
//!             └───────────┴───────────┘
//! ```
//!
//! Every block spans exactly `1 << order` bytes, header included, and starts
//! at an offset aligned to its own size, so a block's sibling is found by
//! flipping a single offset bit.

use std::{mem, ptr::NonNull};

use log::{debug, trace};

use crate::{
  align::{next_pow2, order_of},
  arena::Arena,
  block::{BlockInfo, BlockState, FreeList, Header, Links, RETIRED_TAG, contract_violation, retire},
  error::CreateError,
  strategy::{AllocStrategy, AllocatorStats},
};

/// Number of free lists; order `i` holds blocks of exactly `2^i` bytes.
pub const ORDER_COUNT: usize = 32;
/// Largest order a block may reach.
pub const MAX_ORDER: usize = ORDER_COUNT - 1;
/// Smallest order handed out, whatever the request (32 bytes).
pub const MIN_ORDER: usize = 5;
pub const MIN_BLOCK_SIZE: usize = 1 << MIN_ORDER;
pub const HEADER_SIZE: usize = mem::size_of::<BuddyHeader>();

#[repr(C)]
#[derive(Clone, Copy)]
struct BuddyHeader {
  order: u32,
  tag: u32,
  links: Links,
}

impl BuddyHeader {
  fn new(
    order: usize,
    state: BlockState,
  ) -> Self {
    let (tag, links) = state.encode();

    Self {
      order: order as u32,
      tag,
      links,
    }
  }

  fn order(
    &self,
  ) -> usize {
    self.order as usize
  }
}

impl Header for BuddyHeader {
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

pub struct BuddyAllocator<'a> {
  arena: Arena<'a>,
  top_order: usize,
  free_lists: [FreeList; ORDER_COUNT],
  stats: AllocatorStats,
}

impl<'a> BuddyAllocator<'a> {
  /// Takes over `arena`, whose capacity is rounded up to the next power of
  /// two to find the top order.
  ///
  /// A power-of-two arena starts as one free block of the top order. For any
  /// other size the part of the rounded block that lies past the arena end is
  /// never installed: the in-bounds prefix is seeded as the largest aligned
  /// blocks that fit, exactly the free blocks the rounded block would leave
  /// after permanently reserving its out-of-bounds tail.
  pub fn new(
    arena: Arena<'a>,
  ) -> Result<Self, CreateError> {
    let capacity = arena.capacity();

    if capacity < MIN_BLOCK_SIZE {
      return Err(CreateError::ArenaTooSmall {
        capacity,
        minimum: MIN_BLOCK_SIZE,
      });
    }

    let rounded = next_pow2(capacity).ok_or(CreateError::ArenaTooLarge { capacity })?;
    let top_order = order_of(rounded);

    if top_order > MAX_ORDER {
      return Err(CreateError::ArenaTooLarge { capacity });
    }

    let mut allocator = Self {
      arena,
      top_order,
      free_lists: [FreeList::default(); ORDER_COUNT],
      stats: AllocatorStats::default(),
    };

    let mut offset = 0;
    while capacity - offset >= MIN_BLOCK_SIZE {
      let order = order_of(prev_pow2(capacity - offset));
      allocator.release(offset, order);
      offset += 1 << order;
    }

    debug!(
      "buddy: {capacity} byte arena, top order {top_order}, {} unusable tail bytes",
      capacity - offset
    );

    Ok(allocator)
  }

  pub fn top_order(
    &self,
  ) -> usize {
    self.top_order
  }

  /// Number of free blocks currently on the list of `order`.
  pub fn free_blocks(
    &self,
    order: usize,
  ) -> usize {
    self.free_lists.get(order).map_or(0, FreeList::len)
  }

  /// Walks the arena front to back, one header per block.
  pub fn blocks(
    &self,
  ) -> Vec<BlockInfo> {
    let mut blocks = Vec::new();
    let mut offset = 0;

    while self.arena.capacity() - offset >= MIN_BLOCK_SIZE {
      let header = self.arena.load::<BuddyHeader>(offset);
      let span = 1 << header.order();

      blocks.push(BlockInfo {
        offset,
        span,
        free: header.state().is_some_and(|state| state.is_free()),
      });

      offset += span;
    }

    blocks
  }

  fn write_header(
    &mut self,
    offset: usize,
    order: usize,
    state: BlockState,
  ) {
    self.arena.store(offset, BuddyHeader::new(order, state));
  }

  /// Writes a fresh header at `offset` and puts it on the list of `order`.
  fn release(
    &mut self,
    offset: usize,
    order: usize,
  ) {
    self.write_header(
      offset,
      order,
      BlockState::Free {
        next: None,
        prev: None,
      },
    );
    self.free_lists[order].push::<BuddyHeader>(&mut self.arena, offset);
  }

  /// The free same-order sibling of the block at `offset`, if one exists
  /// inside the arena.
  fn free_sibling(
    &self,
    offset: usize,
    order: usize,
  ) -> Option<usize> {
    let size = 1usize << order;
    let sibling = offset ^ size;

    if sibling.checked_add(size)? > self.arena.capacity() {
      return None;
    }

    let header = self.arena.load::<BuddyHeader>(sibling);
    let free = header.state().is_some_and(|state| state.is_free());

    (free && header.order() == order).then_some(sibling)
  }
}

impl AllocStrategy for BuddyAllocator<'_> {
  fn name(
    &self,
  ) -> &str {
    "buddy"
  }

  fn alloc(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let required = size.checked_add(HEADER_SIZE)?;
    let block_size = next_pow2(required)?.max(MIN_BLOCK_SIZE);
    let order = order_of(block_size);

    if order > self.top_order {
      return None;
    }

    let mut current = (order..=self.top_order).find(|&o| !self.free_lists[o].is_empty())?;
    let block = self.free_lists[current].pop::<BuddyHeader>(&mut self.arena)?;

    while current > order {
      current -= 1;
      let sibling = block + (1 << current);
      trace!("buddy: split {block} into {block} and {sibling} at order {current}");
      self.release(sibling, current);
    }

    self.write_header(block, order, BlockState::Allocated { requested: size });
    self.stats.requested += size;
    self.stats.allocated += block_size;

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
      return contract_violation("buddy", ptr, "pointer outside arena");
    };

    let header = self.arena.load::<BuddyHeader>(offset);
    let order = header.order();

    let Some(BlockState::Allocated { requested }) = header.state() else {
      return contract_violation("buddy", ptr, "block is not allocated");
    };

    if !(MIN_ORDER..=self.top_order).contains(&order) || offset % (1 << order) != 0 {
      return contract_violation("buddy", ptr, "corrupted block header");
    }

    self.stats.requested -= requested;
    self.stats.allocated -= 1 << order;
    retire::<BuddyHeader>(&mut self.arena, offset);

    let mut block = offset;
    let mut order = order;

    while order < self.top_order {
      let Some(sibling) = self.free_sibling(block, order) else {
        break;
      };

      self.free_lists[order].remove::<BuddyHeader>(&mut self.arena, sibling);
      retire::<BuddyHeader>(&mut self.arena, sibling);
      trace!("buddy: merge {block} with {sibling} at order {order}");

      block = block.min(sibling);
      order += 1;
    }

    self.release(block, order);
  }

  fn stats(
    &self,
  ) -> AllocatorStats {
    self.stats
  }
}

/// Largest power of two `<= value`; `value` must be non-zero.
fn prev_pow2(
  value: usize,
) -> usize {
  1 << (usize::BITS - 1 - value.leading_zeros())
}
