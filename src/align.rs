/// Calculates the machine word alignment for the given size.
///
/// # Examples
///
/// ```rust
/// use core::mem;
/// use kheap::align;
///
/// match mem::size_of::<usize>() {
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

/// Rounds `value` up to the next multiple of `to`, which must be a power of two.
///
/// ```rust
/// use kheap::align_to;
///
/// assert_eq!(align_to!(0x1001, 0x1000), 0x2000);
/// assert_eq!(align_to!(0x2000, 0x1000), 0x2000);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $to:expr) => {
    ($value + $to - 1) & !($to - 1)
  };
}

#[cfg(test)]
mod tests {
  use std::mem;

  use crate::config::PAGE_SIZE;

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
  }

  #[test]
  fn test_align_to_page() {
    assert_eq!(align_to!(0usize, PAGE_SIZE), 0);
    assert_eq!(align_to!(1usize, PAGE_SIZE), PAGE_SIZE);
    assert_eq!(align_to!(PAGE_SIZE, PAGE_SIZE), PAGE_SIZE);
    assert_eq!(align_to!(PAGE_SIZE + 1, PAGE_SIZE), 2 * PAGE_SIZE);
    assert_eq!(align_to!(0x7fff_f000usize + 0x20, PAGE_SIZE), 0x8000_0000);
  }
}
