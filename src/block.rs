use log::error;

use crate::arena::Arena;

/// Canary written into the header of every block on the free lists.
pub(crate) const FREE_TAG: u32 = 0xF4EE_B10C;
/// Canary written into the header of every block owned by a caller.
pub(crate) const LIVE_TAG: u32 = 0xA110_CA7E;
/// Tag left on a header that stopped being a block boundary: a freed block
/// absorbed into a neighbour, or the neighbour it absorbed.
pub(crate) const RETIRED_TAG: u32 = 0;

const NIL: usize = usize::MAX;

/// What a block's two link words mean right now.
///
/// The same header bytes hold free-list links while the block is free and
/// the caller's requested length while it is allocated. The tag decides which
/// reading is valid; the other one is never decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
  Free {
    next: Option<usize>,
    prev: Option<usize>,
  },
  Allocated {
    requested: usize,
  },
}

impl BlockState {
  pub fn is_free(
    &self,
  ) -> bool {
    matches!(self, BlockState::Free { .. })
  }

  pub(crate) fn encode(
    self,
  ) -> (u32, Links) {
    match self {
      BlockState::Free { next, prev } => (
        FREE_TAG,
        Links {
          first: next.unwrap_or(NIL),
          second: prev.unwrap_or(NIL),
        },
      ),
      BlockState::Allocated { requested } => (
        LIVE_TAG,
        Links {
          first: requested,
          second: NIL,
        },
      ),
    }
  }

  /// `None` when the tag is neither canary, i.e. the bytes are not a header.
  pub(crate) fn decode(
    tag: u32,
    links: Links,
  ) -> Option<Self> {
    let link = |word: usize| (word != NIL).then_some(word);

    match tag {
      FREE_TAG => Some(BlockState::Free {
        next: link(links.first),
        prev: link(links.second),
      }),
      LIVE_TAG => Some(BlockState::Allocated {
        requested: links.first,
      }),
      _ => None,
    }
  }
}

/// One physical block as found by walking an arena front to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Offset of the header from the arena base.
  pub offset: usize,
  /// Bytes the block spans, header included.
  pub span: usize,
  pub free: bool,
}

/// Reports a free of a pointer the strategy never handed out, or one freed
/// twice. Panics in debug builds; release builds log and ignore the call.
pub(crate) fn contract_violation(
  strategy: &str,
  ptr: *mut u8,
  reason: &str,
) {
  error!("{strategy}: ignoring free of {ptr:?}: {reason}");

  if cfg!(debug_assertions) {
    panic!("{strategy}: invalid free of {ptr:?}: {reason}");
  }
}

/// The two state-dependent words of a header.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Links {
  first: usize,
  second: usize,
}

/// A strategy-private header layout that embeds a tagged [`BlockState`].
pub(crate) trait Header: Copy {
  fn state(
    &self,
  ) -> Option<BlockState>;

  fn set_state(
    &mut self,
    state: BlockState,
  );

  /// Overwrites the tag with [`RETIRED_TAG`].
  fn retire(
    &mut self,
  );
}

/// Marks the header at `offset` as no longer describing a block, so a later
/// free of its payload is caught as a contract violation.
pub(crate) fn retire<H: Header>(
  arena: &mut Arena<'_>,
  offset: usize,
) {
  let mut header = arena.load::<H>(offset);
  header.retire();
  arena.store(offset, header);
}

/// Intrusive doubly linked list threaded through free block headers.
///
/// Offsets point at headers. Push and remove are O(1); the list itself is
/// unordered.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FreeList {
  head: Option<usize>,
  len: usize,
}

impl FreeList {
  pub(crate) fn len(
    &self,
  ) -> usize {
    self.len
  }

  pub(crate) fn is_empty(
    &self,
  ) -> bool {
    self.head.is_none()
  }

  /// Links the header at `offset` in at the head and tags it free.
  pub(crate) fn push<H: Header>(
    &mut self,
    arena: &mut Arena<'_>,
    offset: usize,
  ) {
    if let Some(head) = self.head {
      let next = next_of::<H>(arena, head);
      set_links::<H>(arena, head, next, Some(offset));
    }

    set_links::<H>(arena, offset, self.head, None);
    self.head = Some(offset);
    self.len += 1;
  }

  /// Unlinks the free header at `offset`. Its tag stays free until the
  /// caller rewrites the header.
  pub(crate) fn remove<H: Header>(
    &mut self,
    arena: &mut Arena<'_>,
    offset: usize,
  ) {
    let (next, prev) = links_of::<H>(arena, offset);

    match prev {
      Some(prev) => {
        let before = prev_of::<H>(arena, prev);
        set_links::<H>(arena, prev, next, before);
      }
      None => self.head = next,
    }

    if let Some(next) = next {
      let after = next_of::<H>(arena, next);
      set_links::<H>(arena, next, after, prev);
    }

    self.len -= 1;
  }

  pub(crate) fn pop<H: Header>(
    &mut self,
    arena: &mut Arena<'_>,
  ) -> Option<usize> {
    let head = self.head?;
    self.remove::<H>(arena, head);
    Some(head)
  }

  pub(crate) fn iter<H: Header>(
    &self,
    arena: &Arena<'_>,
  ) -> impl Iterator<Item = usize> {
    std::iter::successors(self.head, move |&offset| next_of::<H>(arena, offset))
  }
}

/// Panics in every build. A list member not tagged free means the metadata
/// itself was overwritten (typically a caller writing past its payload), and
/// the list cannot be walked any further.
fn links_of<H: Header>(
  arena: &Arena<'_>,
  offset: usize,
) -> (Option<usize>, Option<usize>) {
  match arena.load::<H>(offset).state() {
    Some(BlockState::Free { next, prev }) => (next, prev),
    other => panic!("free list corrupted: header at offset {offset} is {other:?}"),
  }
}

fn next_of<H: Header>(
  arena: &Arena<'_>,
  offset: usize,
) -> Option<usize> {
  links_of::<H>(arena, offset).0
}

fn prev_of<H: Header>(
  arena: &Arena<'_>,
  offset: usize,
) -> Option<usize> {
  links_of::<H>(arena, offset).1
}

fn set_links<H: Header>(
  arena: &mut Arena<'_>,
  offset: usize,
  next: Option<usize>,
  prev: Option<usize>,
) {
  let mut header = arena.load::<H>(offset);
  header.set_state(BlockState::Free { next, prev });
  arena.store(offset, header);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[repr(C)]
  #[derive(Clone, Copy)]
  struct TestHeader {
    tag: u32,
    links: Links,
  }

  impl Header for TestHeader {
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

  const STRIDE: usize = 64;

  fn collect(
    list: &FreeList,
    arena: &Arena<'_>,
  ) -> Vec<usize> {
    list.iter::<TestHeader>(arena).collect()
  }

  #[test]
  fn test_state_round_trip() {
    let states = [
      BlockState::Free {
        next: None,
        prev: None,
      },
      BlockState::Free {
        next: Some(64),
        prev: Some(0),
      },
      BlockState::Allocated { requested: 0 },
      BlockState::Allocated { requested: 100 },
    ];

    for state in states {
      let (tag, links) = state.encode();
      assert_eq!(BlockState::decode(tag, links), Some(state));
    }
  }

  #[test]
  fn test_unknown_tag() {
    let (_, links) = BlockState::Allocated { requested: 1 }.encode();
    assert_eq!(BlockState::decode(0, links), None);
    assert!(!BlockState::Allocated { requested: 1 }.is_free());
  }

  #[test]
  fn test_push_remove() {
    let mut buffer = vec![0u8; STRIDE * 4];
    let mut arena = Arena::from_slice(&mut buffer);
    let mut list = FreeList::default();

    for i in 0..4 {
      list.push::<TestHeader>(&mut arena, i * STRIDE);
    }

    assert_eq!(list.len(), 4);
    assert_eq!(collect(&list, &arena), vec![192, 128, 64, 0]);

    // middle, tail, head
    list.remove::<TestHeader>(&mut arena, 128);
    assert_eq!(collect(&list, &arena), vec![192, 64, 0]);
    list.remove::<TestHeader>(&mut arena, 0);
    assert_eq!(collect(&list, &arena), vec![192, 64]);
    list.remove::<TestHeader>(&mut arena, 192);
    assert_eq!(collect(&list, &arena), vec![64]);

    assert_eq!(list.pop::<TestHeader>(&mut arena), Some(64));
    assert_eq!(list.pop::<TestHeader>(&mut arena), None);
    assert!(list.is_empty());
    assert_eq!(list.len(), 0);
  }

  #[test]
  #[should_panic(expected = "free list corrupted")]
  fn test_remove_allocated_block() {
    let mut buffer = vec![0u8; STRIDE];
    let mut arena = Arena::from_slice(&mut buffer);
    let mut list = FreeList::default();

    let mut header = arena.load::<TestHeader>(0);
    header.set_state(BlockState::Allocated { requested: 8 });
    arena.store(0, header);

    list.remove::<TestHeader>(&mut arena, 0);
  }
}
