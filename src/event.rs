use crate::{error::HeapError, split::Carve};

const BACKLOG: usize = 8;

/// Something worth logging that happened inside the heap.
///
/// The heap only records events. Whoever holds the heap logs them once it is
/// no longer borrowed, so a logger that allocates never finds the heap locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
  Created { base: usize, len: usize, first: usize },
  Granted { size: usize, addr: usize, carve: Carve },
  Filler { size: usize, addr: usize },
  Abandoned { size: usize, err: HeapError },
  Outside { ptr: usize },
  Rejected { ptr: usize },
  Merged { high: usize, low: usize, size: usize },
  ReinsertFailed { addr: usize, err: HeapError },
  MergeFailed { addr: usize, err: HeapError },
}

impl Event {
  fn emit(&self) {
    match *self {
      Event::Created { base, len, first } => {
        log::info!("heap at {:#x}, {} bytes, first block holds {} bytes", base, len, first)
      }
      Event::Granted { size, addr, carve } => {
        log::debug!("granted {} bytes at {:#x} ({:?})", size, addr, carve)
      }
      Event::Filler { size, addr } => log::debug!("filler of {} bytes left at {:#x}", size, addr),
      Event::Abandoned { size, err } => {
        log::warn!("allocation of {} bytes abandoned: {}", size, err)
      }
      Event::Outside { ptr } => log::warn!("release of {:#x} outside the heap", ptr),
      Event::Rejected { ptr } => {
        log::warn!("release of {:#x} rejected, header does not check out", ptr)
      }
      Event::Merged { high, low, size } => {
        log::debug!("merged {:#x} into {:#x}, now {} bytes", high, low, size)
      }
      Event::ReinsertFailed { addr, err } => {
        log::error!("block at {:#x} could not be returned to the free list: {}", addr, err)
      }
      Event::MergeFailed { addr, err } => log::error!("merge at {:#x} failed: {}", addr, err),
    }
  }
}

/// Events recorded since the last [`Events::emit`], oldest first.
///
/// Holds a fixed number of them; anything past that is only counted.
#[derive(Debug, Default)]
pub(crate) struct Events {
  backlog: [Option<Event>; BACKLOG],
  len: usize,
  dropped: usize,
}

impl Events {
  pub(crate) fn record(
    &mut self,
    event: Event,
  ) {
    match self.backlog.get_mut(self.len) {
      Some(slot) => {
        *slot = Some(event);
        self.len += 1;
      }
      None => self.dropped += 1,
    }
  }

  pub(crate) fn iter(&self) -> impl Iterator<Item = &Event> {
    self.backlog.iter().flatten()
  }

  /// Hands every recorded event to the logger.
  pub(crate) fn emit(&self) {
    for event in self.iter() {
      event.emit();
    }
    if self.dropped > 0 {
      log::warn!("{} further heap events were not logged", self.dropped);
    }
  }
}
