//! Runs the same allocation pattern under every placement policy and compares
//! how much arena each one ends up using.

use fitalloc::{FixedArena, Heap, Placement};

const ROUNDS: u32 = 2_000;

fn run(placement: Placement) -> fitalloc::Result<()> {
    let mut heap = Heap::with_arena(FixedArena::new(8 << 20), placement);
    heap.set_report_on_drop(false);

    let mut live = Vec::new();
    let mut seed: u32 = 0x9e37_79b9;

    for _ in 0..ROUNDS {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let size = (seed >> 8) as usize % 512 + 1;

        if seed % 3 == 0 && !live.is_empty() {
            let ptr: std::ptr::NonNull<u8> = live.swap_remove(seed as usize % live.len());
            heap.release(ptr.as_ptr())?;
        } else {
            live.push(heap.allocate(size)?);
        }
    }

    let stats = heap.stats();
    let free_blocks = heap.blocks().filter(|block| block.free).count();

    println!(
        "{placement:>10}: arena {:>8} bytes, {:>4} grows, {:>4} reuses, {:>4} splits, {:>4} free blocks",
        heap.arena_len(),
        stats.grows,
        stats.reuses,
        stats.splits,
        free_blocks,
    );

    Ok(())
}

fn main() -> fitalloc::Result<()> {
    env_logger::init();

    for placement in Placement::ALL {
        run(placement)?;
    }

    Ok(())
}
