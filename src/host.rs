//! Backing memory for running a heap inside an ordinary process.

use core::ptr::{self, NonNull};

/// Anonymous private mapping, unmapped on drop.
///
/// Mappings start on a page boundary and are zero-filled, which keeps the
/// layout of a heap built on top of one predictable.
pub struct MappedRegion {
  base: NonNull<u8>,
  len: usize,
}

impl MappedRegion {
  pub fn new(len: usize) -> Option<Self> {
    let addr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };
    if addr == libc::MAP_FAILED {
      return None;
    }

    NonNull::new(addr as *mut u8).map(|base| Self { base, len })
  }

  pub fn base(&self) -> usize {
    self.base.as_ptr() as usize
  }

  pub fn len(&self) -> usize {
    self.len
  }
}

impl Drop for MappedRegion {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
    }
  }
}
