/// Rounds `value` up to the machine word size.
///
/// Best-fit payloads are word-rounded so that every header written into the
/// arena starts on a word boundary.
///
/// # Examples
///
/// ```rust
/// use arenalloc::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Smallest power of two `>= size`. `next_pow2(0) == 1`.
///
/// Returns `None` when the result does not fit in a `usize`.
pub fn next_pow2(
  size: usize,
) -> Option<usize> {
  size.max(1).checked_next_power_of_two()
}

/// Order (base-two logarithm) of a power-of-two block size.
pub fn order_of(
  size: usize,
) -> usize {
  debug_assert!(size.is_power_of_two(), "order of non power of two {size}");
  size.trailing_zeros() as usize
}

#[cfg(test)]
mod tests {
  use std::mem;

  use super::*;

  #[test]
  fn test_align() {
    let ptr_size = mem::size_of::<usize>();

    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ptr_size * i + 1)..=(ptr_size * (i + 1));

      let expected_alignment = ptr_size * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }

    assert_eq!(align!(0usize), 0);
  }

  #[test]
  fn test_next_pow2() {
    assert_eq!(next_pow2(0), Some(1));
    assert_eq!(next_pow2(1), Some(1));
    assert_eq!(next_pow2(100 + 24), Some(128));
    assert_eq!(next_pow2(128), Some(128));
    assert_eq!(next_pow2(129), Some(256));
    assert_eq!(next_pow2(usize::MAX), None);
  }

  #[test]
  fn test_order_of() {
    assert_eq!(order_of(1), 0);
    assert_eq!(order_of(32), 5);
    assert_eq!(order_of(1 << 24), 24);
  }
}
