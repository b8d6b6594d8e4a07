use core::{
  mem,
  ptr::{self, NonNull},
};

use crate::{
  align,
  block::{Block, HEADER_SIZE},
  error::HeapError,
};

/// The managed region, addressed by byte offsets from its base.
///
/// Every header access goes through [`Arena::read`] or [`Arena::write`],
/// which refuse offsets whose header would not fit inside the region.
pub struct Arena {
  base: NonNull<u8>,
  len: usize,
}

impl Arena {
  /// Takes ownership of `len` bytes at `base`.
  ///
  /// The base is rounded up and the length down to the machine word.
  ///
  /// # Safety
  /// - `base..base + len` must be valid for reads and writes
  /// - nothing else may use that memory while the arena is alive
  pub unsafe fn new(
    base: usize,
    len: usize,
  ) -> Result<Self, HeapError> {
    if base == 0 {
      return Err(HeapError::InvalidRegion);
    }
    let end = base.checked_add(len).ok_or(HeapError::InvalidRegion)?;
    base.checked_add(mem::size_of::<usize>()).ok_or(HeapError::InvalidRegion)?;
    let start = align!(base);
    if start >= end {
      return Err(HeapError::InvalidRegion);
    }
    let len = (end - start) & !(mem::size_of::<usize>() - 1);
    if len < HEADER_SIZE {
      return Err(HeapError::InvalidRegion);
    }

    Ok(Self {
      base: NonNull::new(start as *mut u8).ok_or(HeapError::InvalidRegion)?,
      len,
    })
  }

  pub fn base(&self) -> usize {
    self.base.as_ptr() as usize
  }

  pub fn len(&self) -> usize {
    self.len
  }

  /// Absolute address of `offset`.
  pub fn addr(
    &self,
    offset: usize,
  ) -> usize {
    self.base() + offset
  }

  pub fn contains_header(
    &self,
    offset: usize,
  ) -> bool {
    offset.checked_add(HEADER_SIZE).is_some_and(|end| end <= self.len)
  }

  /// Reads the header at `offset` without looking at its tag.
  pub fn read(
    &self,
    offset: usize,
  ) -> Result<Block, HeapError> {
    if !self.contains_header(offset) {
      return Err(HeapError::Corrupted);
    }
    Ok(unsafe { ptr::read_unaligned(self.base.as_ptr().add(offset) as *const Block) })
  }

  /// Reads the header at `offset` and rejects it unless it carries the tag
  /// and its payload stays inside the region.
  pub fn block(
    &self,
    offset: usize,
  ) -> Result<Block, HeapError> {
    let block = self.read(offset)?;
    if !block.is_tagged() {
      return Err(HeapError::Corrupted);
    }
    match offset.checked_add(HEADER_SIZE).and_then(|p| p.checked_add(block.size)) {
      Some(end) if end <= self.len => Ok(block),
      _ => Err(HeapError::Corrupted),
    }
  }

  pub fn write(
    &mut self,
    offset: usize,
    block: &Block,
  ) -> Result<(), HeapError> {
    if !self.contains_header(offset) {
      return Err(HeapError::Corrupted);
    }
    unsafe { ptr::write_unaligned(self.base.as_ptr().add(offset) as *mut Block, *block) };
    Ok(())
  }

  /// Read-modify-write of a tagged header.
  pub fn update<F>(
    &mut self,
    offset: usize,
    f: F,
  ) -> Result<(), HeapError>
  where
    F: FnOnce(&mut Block),
  {
    let mut block = self.block(offset)?;
    f(&mut block);
    self.write(offset, &block)
  }

  /// Payload pointer of the block at `offset`.
  pub fn payload(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset + HEADER_SIZE)) }
  }

  /// Header offset for a payload pointer, if the pointer can belong to this arena.
  pub fn header_of(
    &self,
    payload: *const u8,
  ) -> Option<usize> {
    let offset = (payload as usize).checked_sub(self.base())?.checked_sub(HEADER_SIZE)?;
    self.contains_header(offset).then_some(offset)
  }
}

// The arena is only reachable through its owner, which serialises access.
unsafe impl Send for Arena {}
