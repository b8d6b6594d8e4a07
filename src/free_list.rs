use crate::{
  arena::Arena,
  block::{Block, HEADER_SIZE, NIL},
  error::HeapError,
};

/// Doubly linked list of free blocks, kept in ascending address order.
///
/// The nodes live inside the arena; the list itself only remembers the head.
pub struct FreeList {
  head: Option<usize>,
}

impl FreeList {
  pub const fn new() -> Self {
    Self { head: None }
  }

  pub fn head(&self) -> Option<usize> {
    self.head
  }

  /// Makes the list consist of the single block at `offset`.
  pub fn reset(
    &mut self,
    arena: &mut Arena,
    offset: usize,
  ) -> Result<(), HeapError> {
    arena.update(offset, |block| {
      block.prev = NIL;
      block.next = NIL;
    })?;
    self.head = Some(offset);
    Ok(())
  }

  pub fn cursor<'a>(
    &self,
    arena: &'a Arena,
  ) -> Cursor<'a> {
    Cursor {
      arena,
      next: self.head,
      prev: None,
      budget: arena.len() / HEADER_SIZE + 1,
      failed: false,
    }
  }

  /// Removes the block at `offset` and clears its links.
  ///
  /// Both neighbours are checked before anything is written.
  pub fn unlink(
    &mut self,
    arena: &mut Arena,
    offset: usize,
  ) -> Result<(), HeapError> {
    let block = arena.block(offset)?;
    for neighbour in [block.prev(), block.next()].into_iter().flatten() {
      arena.block(neighbour)?;
    }

    match block.prev() {
      Some(prev) => arena.update(prev, |b| b.next = block.next)?,
      None if self.head == Some(offset) => self.head = block.next(),
      None => return Err(HeapError::Corrupted),
    }
    if let Some(next) = block.next() {
      arena.update(next, |b| b.prev = block.prev)?;
    }

    arena.update(offset, |b| {
      b.prev = NIL;
      b.next = NIL;
    })
  }

  /// Links the block at `offset` directly behind the listed block `after`.
  pub fn insert_after(
    &mut self,
    arena: &mut Arena,
    after: usize,
    offset: usize,
  ) -> Result<(), HeapError> {
    let next = arena.block(after)?.next();
    self.link(arena, Some(after), next, offset)
  }

  /// Links the block at `offset` in address order.
  pub fn insert(
    &mut self,
    arena: &mut Arena,
    offset: usize,
  ) -> Result<(), HeapError> {
    let mut prev = None;
    let mut next = None;

    for entry in self.cursor(arena) {
      let (listed, _) = entry?;
      if listed == offset {
        return Err(HeapError::Corrupted);
      }
      if listed > offset {
        next = Some(listed);
        break;
      }
      prev = Some(listed);
    }

    self.link(arena, prev, next, offset)
  }

  fn link(
    &mut self,
    arena: &mut Arena,
    prev: Option<usize>,
    next: Option<usize>,
    offset: usize,
  ) -> Result<(), HeapError> {
    arena.update(offset, |b| {
      b.prev = prev.unwrap_or(NIL);
      b.next = next.unwrap_or(NIL);
    })?;

    match prev {
      Some(prev) => arena.update(prev, |b| b.next = offset)?,
      None => self.head = Some(offset),
    }
    if let Some(next) = next {
      arena.update(next, |b| b.prev = offset)?;
    }
    Ok(())
  }
}

/// Walks the free list from its head.
///
/// Yields an error and stops on the first node that cannot be trusted: a bad
/// tag, a used block, a link pointing at itself, a back-link that disagrees
/// with the walk, or more nodes than the arena could possibly hold.
pub struct Cursor<'a> {
  arena: &'a Arena,
  next: Option<usize>,
  prev: Option<usize>,
  budget: usize,
  failed: bool,
}

impl Cursor<'_> {
  fn step(
    &mut self,
    offset: usize,
  ) -> Result<(usize, Block), HeapError> {
    if self.budget == 0 {
      return Err(HeapError::Corrupted);
    }
    self.budget -= 1;

    let block = self.arena.block(offset)?;
    if block.is_used() || block.next == offset || block.prev() != self.prev {
      return Err(HeapError::Corrupted);
    }

    self.prev = Some(offset);
    self.next = block.next();
    Ok((offset, block))
  }
}

impl Iterator for Cursor<'_> {
  type Item = Result<(usize, Block), HeapError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed {
      return None;
    }
    let offset = self.next?;

    let entry = self.step(offset);
    self.failed = entry.is_err();
    Some(entry)
  }
}
