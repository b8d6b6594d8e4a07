use core::mem;

use crate::config::HEADER_TAG;

/// Link value for "no neighbour".
pub const NIL: usize = usize::MAX;

/// Bytes taken by one header in front of every payload.
pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Header prefixed to every block of the arena.
///
/// `prev` and `next` are arena offsets of the free-list neighbours and are
/// only meaningful while the block is free.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
  pub size: usize,
  pub prev: usize,
  pub next: usize,
  pub tag: u32,
  pub used: u32,
}

impl Block {
  pub fn new(size: usize) -> Self {
    Self {
      size,
      prev: NIL,
      next: NIL,
      tag: HEADER_TAG,
      used: 0,
    }
  }

  pub fn is_tagged(&self) -> bool {
    self.tag == HEADER_TAG
  }

  pub fn is_used(&self) -> bool {
    self.used != 0
  }

  pub fn set_used(
    &mut self,
    used: bool,
  ) {
    self.used = used as u32;
  }

  pub fn prev(&self) -> Option<usize> {
    link(self.prev)
  }

  pub fn next(&self) -> Option<usize> {
    link(self.next)
  }

  /// Offset one past the payload of the block living at `offset`.
  pub fn end(
    &self,
    offset: usize,
  ) -> usize {
    offset + HEADER_SIZE + self.size
  }
}

fn link(value: usize) -> Option<usize> {
  if value == NIL { None } else { Some(value) }
}
