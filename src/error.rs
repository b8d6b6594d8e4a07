use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
  /// The request is above [`ALLOC_MAX`](crate::config::ALLOC_MAX).
  SizeTooLarge,
  /// No free block can hold the request, or the free list could not be walked.
  OutOfMemory,
  /// `release` was handed a pointer whose header does not check out.
  InvalidPointer,
  /// A coalescing step met a header pair that failed the tag or adjacency checks.
  MergeFailure,
  InvalidRegion,
  AlreadyInitialized,
  Uninitialized,
  /// An integrity walk found a broken invariant.
  Corrupted,
}

impl fmt::Display for HeapError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let msg = match self {
      HeapError::SizeTooLarge => "allocation exceeds the size ceiling",
      HeapError::OutOfMemory => "no free block large enough",
      HeapError::InvalidPointer => "pointer does not refer to a live heap block",
      HeapError::MergeFailure => "free block merge failed validation",
      HeapError::InvalidRegion => "heap region is unusable",
      HeapError::AlreadyInitialized => "heap already initialized",
      HeapError::Uninitialized => "heap used before initialization",
      HeapError::Corrupted => "heap metadata is corrupted",
    };
    f.write_str(msg)
  }
}
