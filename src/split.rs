use crate::{
  align_to,
  block::{Block, HEADER_SIZE},
  config::PAGE_SIZE,
  error::HeapError,
  event::Event,
  heap::Heap,
};

/// How a free block that fits a request becomes the granted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Carve {
  /// The rest could not carry a header, hand out the whole block.
  Whole,
  /// Keep the request at the bottom, the rest becomes a new free block.
  Split,
  /// Leave a free filler at the bottom so that the block whose header sits
  /// at offset `at` has a page-aligned payload.
  Align { at: usize },
}

/// Sizing of a request against a free block of `free` bytes.
fn fit(
  free: usize,
  size: usize,
) -> Option<Carve> {
  if free < size {
    None
  } else if free < size + HEADER_SIZE {
    Some(Carve::Whole)
  } else {
    Some(Carve::Split)
  }
}

impl Heap {
  pub(crate) fn plan(
    &self,
    offset: usize,
    block: &Block,
    size: usize,
    page_aligned: bool,
  ) -> Option<Carve> {
    let payload = self.arena.addr(offset) + HEADER_SIZE;
    if !page_aligned || payload % PAGE_SIZE == 0 {
      return fit(block.size, size);
    }

    // The aligned block needs its own header above the filler's.
    let aligned = align_to!(payload + HEADER_SIZE, PAGE_SIZE);
    let at = aligned - HEADER_SIZE - self.arena.base();
    let needed = at.checked_add(HEADER_SIZE)?.checked_add(size)?;
    (needed <= block.end(offset)).then_some(Carve::Align { at })
  }

  /// Applies `carve` to the free block at `offset` and returns the offset of
  /// the block to grant. The granted block is still on the free list.
  pub(crate) fn carve(
    &mut self,
    offset: usize,
    carve: Carve,
    size: usize,
  ) -> Result<usize, HeapError> {
    let (offset, carve) = match carve {
      Carve::Align { at } => {
        self.split_at(offset, at)?;
        self.events.record(Event::Filler {
          size: at - offset - HEADER_SIZE,
          addr: self.arena.addr(offset),
        });
        let rest = self.arena.block(at)?;
        (at, fit(rest.size, size).ok_or(HeapError::Corrupted)?)
      }
      carve => (offset, carve),
    };

    if carve == Carve::Split {
      self.split_at(offset, offset + HEADER_SIZE + size)?;
    }
    Ok(offset)
  }

  /// Cuts the free block at `offset` in two. The upper part gets a fresh
  /// header at `at` and follows the lower part on the free list.
  fn split_at(
    &mut self,
    offset: usize,
    at: usize,
  ) -> Result<(), HeapError> {
    let block = self.arena.block(offset)?;
    let end = block.end(offset);
    if at < offset + HEADER_SIZE || at + HEADER_SIZE > end {
      return Err(HeapError::Corrupted);
    }

    self.arena.write(at, &Block::new(end - at - HEADER_SIZE))?;
    self.arena.update(offset, |b| b.size = at - offset - HEADER_SIZE)?;
    self.free.insert_after(&mut self.arena, offset, at)
  }
}
