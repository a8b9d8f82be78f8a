use std::ptr::NonNull;

use bestfit::{AllocError, Heap};

fn log_alloc(addr: NonNull<u8>, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() -> Result<(), AllocError> {
    let mut heap = Heap::system();

    let addr1 = heap.allocate(16)?;
    log_alloc(addr1, 16);

    let addr2 = heap.allocate(64)?;
    log_alloc(addr2, 64);

    let addr3 = heap.allocate(32)?;
    log_alloc(addr3, 32);

    unsafe {
        heap.release(addr1.as_ptr())?;
        heap.release(addr2.as_ptr())?;
        heap.release(addr3.as_ptr())?;
    }

    for block in heap.free_blocks() {
        println!("Free block of {} bytes at {:?}", block.size, block.addr);
    }

    // Best fit: the 16 byte block wins over the 32 and 64 byte ones.
    let addr4 = heap.allocate(16)?;
    println!("Should be first addr {addr4:?} (was {addr1:?})");

    println!("{:?}", heap.finalize());

    Ok(())
}
