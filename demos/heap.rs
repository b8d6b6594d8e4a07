use std::io::Read;

use kheap::{Heap, HeapStats, config::PAGE_SIZE, host::MappedRegion};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the mapping with tools like `pmap` or
/// `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints every block of the heap in address order followed by the totals.
fn print_heap(
  label: &str,
  heap: &Heap,
) {
  println!("[{}]", label);
  for info in heap.blocks() {
    match info {
      Ok(info) => println!(
        "    {:#x}  {:>8} bytes  {}",
        info.address,
        info.size,
        if info.used { "used" } else { "free" }
      ),
      Err(err) => println!("    walk stopped: {}", err),
    }
  }
  let HeapStats {
    free_blocks,
    free_bytes,
    used_blocks,
    used_bytes,
    header_bytes,
    ..
  } = heap.stats();
  println!(
    "    free {} in {} blocks, used {} in {} blocks, headers {}",
    free_bytes, free_blocks, used_bytes, used_blocks, header_bytes
  );
}

fn main() {
  // 64 KiB standing in for the region the boot code hands over.
  let region = MappedRegion::new(64 * 1024).expect("mmap failed");
  let mut heap = unsafe { Heap::new(region.base(), region.len()) }.expect("unusable region");

  print_heap("start", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Two small allocations back to back. The first free block is split
  //    each time and the remainder stays on the free list.
  // --------------------------------------------------------------------
  let first = heap.allocate(100, false).expect("allocation failed");
  let second = heap.allocate(100, false).expect("allocation failed");
  println!("\n[1] Allocated 100 bytes at {:?} and {:?}", first, second);
  unsafe { first.as_ptr().write_bytes(0xAB, 100) };
  print_heap("after two allocations", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) A page-aligned allocation, as needed for a page table. A filler
  //    block is left below it and remains free.
  // --------------------------------------------------------------------
  let table = heap.allocate(PAGE_SIZE, true).expect("allocation failed");
  println!(
    "\n[2] Page-aligned allocation at {:?}, addr % page = {}",
    table,
    table.as_ptr() as usize % PAGE_SIZE
  );
  print_heap("after page-aligned allocation", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A small request lands in the filler, first fit.
  // --------------------------------------------------------------------
  let small = heap.allocate(16, false).expect("allocation failed");
  println!("\n[3] Allocated 16 bytes at {:?}", small);
  print_heap("after filling the gap", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Release everything. Neighbouring free blocks merge until a single
  //    block spans the region again.
  // --------------------------------------------------------------------
  for ptr in [first, second, table, small] {
    match heap.release(ptr.as_ptr()) {
      Ok(()) => println!("\n[4] Released {:?}", ptr),
      Err(err) => println!("\n[4] Release of {:?} failed: {}", ptr, err),
    }
  }
  print_heap("after releasing everything", &heap);

  // --------------------------------------------------------------------
  // 5) Rejections: too large, and a pointer that was never handed out.
  // --------------------------------------------------------------------
  println!("\n[5] allocate(5 MiB) -> {:?}", heap.allocate(5 * 1024 * 1024, false));
  println!("[5] release(stack pointer) -> {:?}", heap.release(&mut 0u8 as *mut u8));

  println!("\n[6] End of example. The mapping is released on exit.");
}
