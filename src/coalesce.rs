use crate::{block::HEADER_SIZE, error::HeapError, event::Event, heap::Heap};

impl Heap {
  /// Marks the used block at `offset` free and links it back in address order.
  pub(crate) fn reinsert(
    &mut self,
    offset: usize,
  ) -> Result<(), HeapError> {
    let linked = self
      .free
      .insert(&mut self.arena, offset)
      .and_then(|()| self.arena.update(offset, |block| block.set_used(false)));

    linked.map_err(|err| {
      self.events.record(Event::ReinsertFailed {
        addr: self.arena.addr(offset),
        err,
      });
      HeapError::MergeFailure
    })
  }

  /// Merges the free block at `offset` with address-adjacent free blocks
  /// until there are none left.
  ///
  /// Every merge removes one free block, so the loop runs at most once per
  /// free block.
  pub(crate) fn coalesce(
    &mut self,
    mut offset: usize,
  ) -> Result<(), HeapError> {
    loop {
      let merged = match self.adjacent(offset) {
        Ok(None) => return Ok(()),
        Ok(Some(neighbour)) => self.merge(offset, neighbour),
        Err(err) => Err(err),
      };

      offset = merged.map_err(|err| {
        self.events.record(Event::MergeFailed {
          addr: self.arena.addr(offset),
          err,
        });
        HeapError::MergeFailure
      })?;
    }
  }

  // A listed block that ends where `offset` starts or starts where it ends.
  fn adjacent(
    &self,
    offset: usize,
  ) -> Result<Option<usize>, HeapError> {
    let block = self.arena.block(offset)?;

    for entry in self.free.cursor(&self.arena) {
      let (listed, candidate) = entry?;
      if listed != offset && (candidate.end(listed) == offset || block.end(offset) == listed) {
        return Ok(Some(listed));
      }
    }
    Ok(None)
  }

  /// Folds the higher of two free blocks into the lower one and returns the
  /// survivor. Both headers must carry the tag, touch in memory and be each
  /// other's list neighbours.
  fn merge(
    &mut self,
    a: usize,
    b: usize,
  ) -> Result<usize, HeapError> {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let lower = self.arena.block(low).map_err(|_| HeapError::MergeFailure)?;
    let upper = self.arena.block(high).map_err(|_| HeapError::MergeFailure)?;

    if lower.end(low) != high || lower.next != high || upper.prev != low {
      return Err(HeapError::MergeFailure);
    }

    self.free.unlink(&mut self.arena, high)?;
    self.arena.update(low, |block| block.size += HEADER_SIZE + upper.size)?;
    // The absorbed header is payload now; a stale pointer to it must not pass.
    self.arena.update(high, |block| block.tag = 0)?;

    self.events.record(Event::Merged {
      high: self.arena.addr(high),
      low: self.arena.addr(low),
      size: lower.size + HEADER_SIZE + upper.size,
    });
    Ok(low)
  }
}
