use crate::{arena::Arena, block::HEADER_SIZE, error::HeapError, heap::Heap};

/// Occupancy of a heap. `free_bytes + used_bytes + header_bytes` is always the
/// region length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub free_blocks: usize,
  pub used_blocks: usize,
  pub free_bytes: usize,
  pub used_bytes: usize,
  pub header_bytes: usize,
  pub largest_free: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub offset: usize,
  pub address: usize,
  pub size: usize,
  pub used: bool,
}

/// Every block of the region in address order, found by hopping from header
/// to header.
pub struct Blocks<'a> {
  arena: &'a Arena,
  offset: usize,
  failed: bool,
}

impl Iterator for Blocks<'_> {
  type Item = Result<BlockInfo, HeapError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed || self.offset >= self.arena.len() {
      return None;
    }

    match self.arena.block(self.offset) {
      Ok(block) => {
        let info = BlockInfo {
          offset: self.offset,
          address: self.arena.addr(self.offset) + HEADER_SIZE,
          size: block.size,
          used: block.is_used(),
        };
        self.offset = block.end(self.offset);
        Some(Ok(info))
      }
      Err(err) => {
        self.failed = true;
        Some(Err(err))
      }
    }
  }
}

impl Heap {
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      arena: &self.arena,
      offset: 0,
      failed: false,
    }
  }

  /// Totals over the blocks reachable by the physical walk.
  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats::default();

    for info in self.blocks().map_while(Result::ok) {
      stats.header_bytes += HEADER_SIZE;
      if info.used {
        stats.used_blocks += 1;
        stats.used_bytes += info.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += info.size;
        stats.largest_free = stats.largest_free.max(info.size);
      }
    }
    stats
  }

  /// Verifies that the blocks tile the region and that the free list holds
  /// exactly the free blocks, in address order.
  pub fn check(&self) -> Result<(), HeapError> {
    let mut listed = self.free.cursor(&self.arena);
    let mut pending = listed.next();
    let mut end = 0;

    for info in self.blocks() {
      let info = info.map_err(|_| HeapError::Corrupted)?;
      if info.offset != end {
        return Err(HeapError::Corrupted);
      }
      end = info.address + info.size - self.arena.base();

      if !info.used {
        match pending {
          Some(Ok((offset, _))) if offset == info.offset => pending = listed.next(),
          _ => return Err(HeapError::Corrupted),
        }
      }
    }

    if end != self.arena.len() || pending.is_some() {
      return Err(HeapError::Corrupted);
    }
    Ok(())
  }

  /// Dumps the free list to the debug log.
  pub fn examine(&self) {
    log::debug!("free list of heap at {:#x}, head {:?}", self.arena.base(), self.free.head());
    for entry in self.free.cursor(&self.arena) {
      match entry {
        Ok((offset, block)) => {
          log::debug!("  node {:#x}: {} bytes", self.arena.addr(offset), block.size)
        }
        Err(err) => log::debug!("  walk stopped: {}", err),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::host::MappedRegion;

  fn heap(region: &MappedRegion) -> Heap {
    unsafe { Heap::new(region.base(), region.len()).unwrap() }
  }

  #[test]
  fn test_blocks_tile_the_region() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    let _a = heap.allocate(100, false).unwrap();
    let b = heap.allocate(300, true).unwrap();
    let _c = heap.allocate(7, false).unwrap();
    heap.release(b.as_ptr()).unwrap();

    let blocks: Vec<_> = heap.blocks().map(Result::unwrap).collect();

    let mut end = 0;
    for info in &blocks {
      assert_eq!(info.offset, end);
      end = info.offset + HEADER_SIZE + info.size;
    }
    assert_eq!(end, heap.len());
    assert_eq!(blocks[0], BlockInfo {
      offset: 0,
      address: region.base() + HEADER_SIZE,
      size: 100,
      used: true,
    });
  }

  #[test]
  fn test_stats_conserve_region() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    let a = heap.allocate(1000, false).unwrap();
    heap.allocate(2000, true).unwrap();
    heap.allocate(3, false).unwrap();
    heap.release(a.as_ptr()).unwrap();

    let stats = heap.stats();

    assert_eq!(stats.free_bytes + stats.used_bytes + stats.header_bytes, heap.len());
    assert_eq!(stats.used_blocks, 2);
    assert_eq!(stats.used_bytes, 2003);
    assert!(stats.largest_free <= stats.free_bytes);
  }

  #[test]
  fn test_check_catches_unlisted_free_block() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    let a = heap.allocate(100, false).unwrap();
    heap.allocate(100, false).unwrap();
    assert!(heap.check().is_ok());

    let offset = a.as_ptr() as usize - heap.base() - HEADER_SIZE;
    heap.arena.update(offset, |block| block.set_used(false)).unwrap();

    assert_eq!(heap.check(), Err(HeapError::Corrupted));
  }

  #[test]
  fn test_check_catches_bad_size() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    let a = heap.allocate(100, false).unwrap();

    let offset = a.as_ptr() as usize - heap.base() - HEADER_SIZE;
    heap.arena.update(offset, |block| block.size = 96).unwrap();

    assert_eq!(heap.check(), Err(HeapError::Corrupted));
  }

  #[test]
  fn test_examine_walks_free_list() {
    let region = MappedRegion::new(64 * 1024).unwrap();
    let mut heap = heap(&region);
    heap.allocate(100, true).unwrap();

    heap.examine();
  }
}
