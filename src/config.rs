//! Fixed heap policy. These are not runtime options.

/// Largest payload a single allocation may request: 4 MiB.
pub const ALLOC_MAX: usize = 4 * 1024 * 1024;

/// Boundary that page-aligned payloads start on.
pub const PAGE_SIZE: usize = 0x1000;

/// Written into every header at creation and checked before the header is trusted.
pub const HEADER_TAG: u32 = 0xAF00_BEA8;
