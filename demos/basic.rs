//! Walks through the life of a few blocks and prints the heap after each step.
//! Run with `RUST_LOG=trace` to see what the allocator does underneath.

use fitalloc::{Heap, HeapConfig};

fn log_alloc(heap: &Heap, label: &str) {
    println!("\n[{label}] arena: {} bytes", heap.arena_len());

    for block in heap.blocks() {
        let state = if block.free { "free" } else { "used" };
        println!("  {:#06x}  {:>6} bytes  {state}", block.offset, block.size);
    }
}

fn main() -> fitalloc::Result<()> {
    env_logger::init();

    let config = HeapConfig::from_env()?;
    let mut heap = Heap::from_config(&config)?;
    println!("Placement policy: {}", heap.placement());

    let a = heap.allocate(100)?;
    let b = heap.allocate(50)?;
    let c = heap.zero_allocate(8, 16)?;
    log_alloc(&heap, "three allocations");

    heap.release(b.as_ptr())?;
    log_alloc(&heap, "released b");

    let d = heap.allocate(8)?;
    log_alloc(&heap, "small allocation reuses b");

    let a = heap.reallocate(a.as_ptr(), 400)?.expect("non-zero size");
    log_alloc(&heap, "a moved by reallocate");

    heap.release(c.as_ptr())?;
    heap.release(d.as_ptr())?;
    heap.release(a.as_ptr())?;
    log_alloc(&heap, "everything released");

    // Statistics are printed to stderr when `heap` goes out of scope.
    Ok(())
}
