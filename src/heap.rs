use core::{mem, ptr::NonNull};

use crate::{
  arena::Arena,
  block::{Block, HEADER_SIZE},
  config::ALLOC_MAX,
  error::HeapError,
  event::{Event, Events},
  free_list::FreeList,
  split::Carve,
};

/// First-fit heap over one contiguous region.
///
/// ```text
///   ┌────────┬─────────┬────────┬─────────┬────────┬──────────────────┐
///   │ header │ used    │ header │ free    │ header │ free             │
///   └────────┴─────────┴────────┴─────────┴────────┴──────────────────┘
///                               ▲  │                ▲
///                       head ───┘  └── next ────────┘
/// ```
///
/// Free blocks are linked in address order. Allocation walks the list and
/// takes the first block that fits, splitting it when the rest can still
/// carry a header. Release puts the block back in order and merges it with
/// free neighbours until none are left.
pub struct Heap {
  pub(crate) arena: Arena,
  pub(crate) free: FreeList,
  pub(crate) events: Events,
}

impl Heap {
  /// Builds a heap whose single free block spans `len` bytes at `base`
  /// minus one header.
  ///
  /// # Safety
  /// - `base..base + len` must be valid, otherwise unused memory
  /// - the memory must outlive the heap and every pointer it hands out
  pub unsafe fn new(
    base: usize,
    len: usize,
  ) -> Result<Self, HeapError> {
    let mut heap = unsafe { Self::build(base, len)? };
    heap.flush_log();
    Ok(heap)
  }

  /// [`Heap::new`] without logging; the creation stays in the backlog.
  pub(crate) unsafe fn build(
    base: usize,
    len: usize,
  ) -> Result<Self, HeapError> {
    let mut arena = unsafe { Arena::new(base, len)? };
    let first = Block::new(arena.len() - HEADER_SIZE);
    arena.write(0, &first)?;

    let mut free = FreeList::new();
    free.reset(&mut arena, 0)?;

    let mut events = Events::default();
    events.record(Event::Created {
      base: arena.base(),
      len: arena.len(),
      first: first.size,
    });

    Ok(Self { arena, free, events })
  }

  pub fn base(&self) -> usize {
    self.arena.base()
  }

  pub fn len(&self) -> usize {
    self.arena.len()
  }

  /// Hands out `size` bytes, starting on a page boundary when `page_aligned` is set.
  pub fn allocate(
    &mut self,
    size: usize,
    page_aligned: bool,
  ) -> Result<NonNull<u8>, HeapError> {
    let granted = self.grant(size, page_aligned);
    self.flush_log();
    granted
  }

  /// Gives back a pointer obtained from [`Heap::allocate`].
  ///
  /// Pointers whose header does not check out are rejected without touching
  /// the heap. A failed merge leaves the block free and reports
  /// [`HeapError::MergeFailure`].
  pub fn release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), HeapError> {
    let released = self.reclaim(ptr);
    self.flush_log();
    released
  }

  /// Takes the events recorded so far, leaving an empty backlog.
  pub(crate) fn take_events(&mut self) -> Events {
    mem::take(&mut self.events)
  }

  fn flush_log(&mut self) {
    self.take_events().emit();
  }

  /// [`Heap::allocate`] with its events left in the backlog.
  pub(crate) fn grant(
    &mut self,
    size: usize,
    page_aligned: bool,
  ) -> Result<NonNull<u8>, HeapError> {
    if size > ALLOC_MAX {
      return Err(HeapError::SizeTooLarge);
    }

    let found = self.find(size, page_aligned);
    let granted = match found {
      Ok(None) => return Err(HeapError::OutOfMemory),
      Ok(Some((offset, carve))) => self.carve(offset, carve, size).and_then(|granted| {
        self.take(granted)?;
        Ok((granted, carve))
      }),
      Err(err) => Err(err),
    };

    match granted {
      Ok((granted, carve)) => {
        self.events.record(Event::Granted {
          size,
          addr: self.arena.addr(granted) + HEADER_SIZE,
          carve,
        });
        Ok(self.arena.payload(granted))
      }
      Err(err) => {
        self.events.record(Event::Abandoned { size, err });
        Err(HeapError::OutOfMemory)
      }
    }
  }

  /// [`Heap::release`] with its events left in the backlog.
  pub(crate) fn reclaim(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), HeapError> {
    let Some(offset) = self.arena.header_of(ptr) else {
      self.events.record(Event::Outside { ptr: ptr as usize });
      return Err(HeapError::InvalidPointer);
    };
    match self.arena.block(offset) {
      Ok(block) if block.is_used() => {}
      _ => {
        self.events.record(Event::Rejected { ptr: ptr as usize });
        return Err(HeapError::InvalidPointer);
      }
    }

    self.reinsert(offset)?;
    self.coalesce(offset)
  }

  // First block in list order that can satisfy the request, or an error if
  // the list cannot be walked.
  fn find(
    &self,
    size: usize,
    page_aligned: bool,
  ) -> Result<Option<(usize, Carve)>, HeapError> {
    for entry in self.free.cursor(&self.arena) {
      let (offset, block) = entry?;
      if let Some(carve) = self.plan(offset, &block, size, page_aligned) {
        return Ok(Some((offset, carve)));
      }
    }
    Ok(None)
  }

  fn take(
    &mut self,
    offset: usize,
  ) -> Result<(), HeapError> {
    self.free.unlink(&mut self.arena, offset)?;
    self.arena.update(offset, |block| block.set_used(true))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{config::PAGE_SIZE, host::MappedRegion};

  fn heap(region: &MappedRegion) -> Heap {
    unsafe { Heap::new(region.base(), region.len()).unwrap() }
  }

  fn free_offsets(heap: &Heap) -> Vec<usize> {
    heap.free.cursor(&heap.arena).map(|entry| entry.unwrap().0).collect()
  }

  fn offset_of(
    heap: &Heap,
    ptr: NonNull<u8>,
  ) -> usize {
    ptr.as_ptr() as usize - heap.base() - HEADER_SIZE
  }

  #[test]
  fn test_new_heap_has_one_free_block() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let heap = heap(&region);

    let stats = heap.stats();

    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes, region.len() - HEADER_SIZE);
    assert_eq!(stats.used_blocks, 0);
  }

  #[test]
  fn test_region_too_small() {
    let region = MappedRegion::new(4096).unwrap();

    let heap = unsafe { Heap::new(region.base(), HEADER_SIZE - 1) };

    assert_eq!(heap.err(), Some(HeapError::InvalidRegion));
  }

  #[test]
  fn test_alloc_write_read() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);

    unsafe {
      let first = heap.allocate(8, false).unwrap().as_ptr() as *mut u64;
      *first = 3;

      let second = heap.allocate(6 * 2, false).unwrap().as_ptr() as *mut u16;
      for i in 0..6 {
        *second.add(i) = (i + 1) as u16;
      }

      assert_eq!(*first, 3);
      for i in 0..6 {
        assert_eq!(*second.add(i), (i + 1) as u16);
      }
      assert!(second as usize >= first as usize + 8 + HEADER_SIZE);
    }
  }

  #[test]
  fn test_split_leaves_remainder_on_list() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);

    let ptr = heap.allocate(100, false).unwrap();

    assert_eq!(offset_of(&heap, ptr), 0);
    assert_eq!(free_offsets(&heap), vec![HEADER_SIZE + 100]);
    let rest = heap.arena.block(HEADER_SIZE + 100).unwrap();
    assert_eq!(rest.size, region.len() - 2 * HEADER_SIZE - 100);
  }

  #[test]
  fn test_size_ceiling() {
    let region = MappedRegion::new(8 * 1024 * 1024).unwrap();
    let mut heap = heap(&region);
    let before = heap.stats();

    assert_eq!(heap.allocate(ALLOC_MAX + 1, false), Err(HeapError::SizeTooLarge));
    assert_eq!(heap.allocate(ALLOC_MAX + 1, true), Err(HeapError::SizeTooLarge));
    assert_eq!(heap.stats(), before);

    assert!(heap.allocate(ALLOC_MAX, false).is_ok());
    assert_eq!(heap.allocate(usize::MAX, false), Err(HeapError::SizeTooLarge));
  }

  #[test]
  fn test_out_of_memory() {
    let region = MappedRegion::new(4096).unwrap();
    let mut heap = heap(&region);

    assert_eq!(heap.allocate(4096, false), Err(HeapError::OutOfMemory));

    let all = heap.allocate(4096 - HEADER_SIZE, false).unwrap();
    assert_eq!(heap.allocate(1, false), Err(HeapError::OutOfMemory));

    heap.release(all.as_ptr()).unwrap();
    assert!(heap.allocate(1, false).is_ok());
  }

  #[test]
  fn test_first_fit_not_best_fit() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);

    let a = heap.allocate(400, false).unwrap();
    let _b = heap.allocate(50, false).unwrap();
    let c = heap.allocate(100, false).unwrap();
    let _d = heap.allocate(50, false).unwrap();
    heap.release(a.as_ptr()).unwrap();
    heap.release(c.as_ptr()).unwrap();

    // c is an exact match further down the list, a comes first.
    let granted = heap.allocate(100, false).unwrap();

    assert_eq!(granted, a);
  }

  #[test]
  fn test_small_remainder_is_granted_whole() {
    let size = 57;
    let region = MappedRegion::new(4096).unwrap();
    let len = size + 2 * HEADER_SIZE - 1;
    let mut heap = unsafe { Heap::new(region.base(), len).unwrap() };
    assert_eq!(heap.arena.block(0).unwrap().size, size + HEADER_SIZE - 1);

    heap.allocate(size, false).unwrap();

    let stats = heap.stats();
    assert_eq!(stats.free_blocks, 0);
    assert_eq!(stats.used_blocks, 1);
    assert_eq!(stats.used_bytes, size + HEADER_SIZE - 1);
  }

  #[test]
  fn test_remainder_of_one_header_is_split() {
    let size = 64;
    let region = MappedRegion::new(4096).unwrap();
    let mut heap = unsafe { Heap::new(region.base(), size + 2 * HEADER_SIZE).unwrap() };

    heap.allocate(size, false).unwrap();

    let stats = heap.stats();
    assert_eq!(stats.used_bytes, size);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.free_bytes, 0);
  }

  #[test]
  fn test_round_trip_restores_free_list() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    let initial = heap.stats();

    for size in [0, 1, 31, 100, 4096, 60 * 1024] {
      let ptr = heap.allocate(size, false).unwrap();
      heap.release(ptr.as_ptr()).unwrap();

      assert_eq!(heap.stats(), initial);
      assert_eq!(free_offsets(&heap), vec![0]);
    }
  }

  #[test]
  fn test_release_rejects_foreign_pointers() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    let ptr = heap.allocate(100, false).unwrap();

    assert_eq!(heap.release(core::ptr::null_mut()), Err(HeapError::InvalidPointer));
    assert_eq!(heap.release(region.base() as *mut u8), Err(HeapError::InvalidPointer));
    assert_eq!(
      heap.release((region.base() + region.len() + 64) as *mut u8),
      Err(HeapError::InvalidPointer)
    );
    assert_eq!(heap.release(unsafe { ptr.as_ptr().add(8) }), Err(HeapError::InvalidPointer));
  }

  #[test]
  fn test_release_rejects_overwritten_header() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    let a = heap.allocate(100, false).unwrap();
    let b = heap.allocate(100, false).unwrap();
    heap.release(a.as_ptr()).unwrap();
    let before = free_offsets(&heap);

    unsafe { core::ptr::write_bytes(b.as_ptr().sub(HEADER_SIZE), 0xAB, HEADER_SIZE) };

    assert_eq!(heap.release(b.as_ptr()), Err(HeapError::InvalidPointer));
    assert_eq!(free_offsets(&heap), before);
    assert_eq!(heap.arena.block(0).unwrap().size, 100);
  }

  #[test]
  fn test_double_release_is_rejected() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    let a = heap.allocate(100, false).unwrap();
    let _b = heap.allocate(100, false).unwrap();

    heap.release(a.as_ptr()).unwrap();

    assert_eq!(heap.release(a.as_ptr()), Err(HeapError::InvalidPointer));
    assert!(heap.check().is_ok());
  }

  #[test]
  fn test_self_referential_list_terminates_scan() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    heap.allocate(100, false).unwrap();
    let rest = heap.free.head().unwrap();

    let mut block = heap.arena.read(rest).unwrap();
    block.next = rest;
    heap.arena.write(rest, &block).unwrap();

    assert_eq!(heap.allocate(64, false), Err(HeapError::OutOfMemory));
    assert_eq!(heap.allocate(64, true), Err(HeapError::OutOfMemory));
  }

  #[test]
  fn test_random_sequence_keeps_invariants() {
    let region = MappedRegion::new(256 * 1024).unwrap();
    let mut heap = heap(&region);
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = || {
      seed ^= seed << 13;
      seed ^= seed >> 7;
      seed ^= seed << 17;
      seed
    };

    for round in 0..2000 {
      let roll = next();
      if live.is_empty() || roll % 3 != 0 {
        let size = (next() % 3000) as usize;
        let page_aligned = next() % 8 == 0;
        if let Ok(ptr) = heap.allocate(size, page_aligned) {
          if page_aligned {
            assert_eq!(ptr.as_ptr() as usize % PAGE_SIZE, 0);
          }
          let fill = round as u8;
          unsafe { core::ptr::write_bytes(ptr.as_ptr(), fill, size) };
          live.push((ptr, size, fill));
        }
      } else {
        let (ptr, size, fill) = live.swap_remove((next() as usize) % live.len());
        let bytes = unsafe { core::slice::from_raw_parts(ptr.as_ptr(), size) };
        assert!(bytes.iter().all(|&b| b == fill));
        heap.release(ptr.as_ptr()).unwrap();
      }

      heap.check().unwrap();
      let stats = heap.stats();
      assert_eq!(stats.free_bytes + stats.used_bytes + stats.header_bytes, heap.len());
      assert_eq!(stats.used_blocks, live.len());
    }

    for (ptr, ..) in live.drain(..) {
      heap.release(ptr.as_ptr()).unwrap();
    }
    assert_eq!(free_offsets(&heap), vec![0]);
    assert_eq!(heap.stats().free_bytes, heap.len() - HEADER_SIZE);
  }
}
