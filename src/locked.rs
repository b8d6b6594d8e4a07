use core::{
  alloc::{GlobalAlloc, Layout},
  ptr::{self, NonNull},
};

use spin::Mutex;

use crate::{
  align,
  config::{ALLOC_MAX, PAGE_SIZE},
  error::HeapError,
  heap::Heap,
  stats::HeapStats,
};

/// A [`Heap`] behind a spin lock, usable as a static.
///
/// The lock is held for one whole allocate or release, including every split
/// and merge it performs. Calls must not nest on the same heap. What the heap
/// has to log is logged after the lock is released.
pub struct LockedHeap {
  heap: Mutex<Option<Heap>>,
}

impl LockedHeap {
  pub const fn empty() -> Self {
    Self {
      heap: Mutex::new(None),
    }
  }

  /// Hands the heap its region.
  ///
  /// # Safety
  /// Same contract as [`Heap::new`].
  pub unsafe fn init(
    &self,
    base: usize,
    len: usize,
  ) -> Result<(), HeapError> {
    let events = {
      let mut slot = self.heap.lock();
      if slot.is_some() {
        return Err(HeapError::AlreadyInitialized);
      }
      let heap = slot.insert(unsafe { Heap::build(base, len)? });
      heap.take_events()
    };
    events.emit();
    Ok(())
  }

  pub fn is_initialized(&self) -> bool {
    self.heap.lock().is_some()
  }

  pub fn allocate(
    &self,
    size: usize,
    page_aligned: bool,
  ) -> Result<NonNull<u8>, HeapError> {
    self.with_heap(|heap| heap.grant(size, page_aligned))
  }

  pub fn release(
    &self,
    ptr: *mut u8,
  ) -> Result<(), HeapError> {
    self.with_heap(|heap| heap.reclaim(ptr))
  }

  pub fn stats(&self) -> Result<HeapStats, HeapError> {
    self.with_heap(|heap| Ok(heap.stats()))
  }

  fn with_heap<F, R>(
    &self,
    f: F,
  ) -> Result<R, HeapError>
  where
    F: FnOnce(&mut Heap) -> Result<R, HeapError>,
  {
    let (result, events) = {
      let mut slot = self.heap.lock();
      let heap = slot.as_mut().ok_or(HeapError::Uninitialized)?;
      let result = f(heap);
      (result, heap.take_events())
    };
    events.emit();
    result
  }
}

unsafe impl GlobalAlloc for LockedHeap {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.size() > ALLOC_MAX || layout.align() > PAGE_SIZE {
      return ptr::null_mut();
    }

    let size = align!(layout.size().max(1));

    self.with_heap(|heap| {
      let ptr = heap.grant(size, false)?;
      if ptr.as_ptr() as usize % layout.align() == 0 {
        return Ok(ptr);
      }
      // First fit missed the alignment; only a page boundary is certain to
      // satisfy the layout.
      heap.reclaim(ptr.as_ptr())?;
      heap.grant(size, true)
    })
    .map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    if let Err(err) = self.release(ptr) {
      log::warn!("dealloc of {:p} ignored: {}", ptr, err);
    }
  }
}

/// The kernel's heap. With the `global` feature it also serves `alloc`,
/// except in this crate's own test build.
#[cfg_attr(all(feature = "global", not(test)), global_allocator)]
pub static KERNEL_HEAP: LockedHeap = LockedHeap::empty();

/// Hands the kernel heap its region. Must be called exactly once, before any
/// allocation.
///
/// # Safety
/// Same contract as [`Heap::new`].
pub unsafe fn initialize(
  base: usize,
  len: usize,
) {
  if let Err(err) = unsafe { KERNEL_HEAP.init(base, len) } {
    panic!("kernel heap at {:#x} ({} bytes): {}", base, len, err);
  }
}

/// Allocates from the kernel heap. Panics if [`initialize`] has not run.
pub fn allocate(
  size: usize,
  page_aligned: bool,
) -> Result<NonNull<u8>, HeapError> {
  expect_initialized(KERNEL_HEAP.allocate(size, page_aligned))
}

/// Releases into the kernel heap. Panics if [`initialize`] has not run.
pub fn release(ptr: *mut u8) -> Result<(), HeapError> {
  expect_initialized(KERNEL_HEAP.release(ptr))
}

pub fn stats() -> HeapStats {
  expect_initialized(KERNEL_HEAP.stats()).unwrap_or_default()
}

fn expect_initialized<T>(result: Result<T, HeapError>) -> Result<T, HeapError> {
  if result.as_ref().err() == Some(&HeapError::Uninitialized) {
    panic!("kernel heap used before initialize()");
  }
  result
}
