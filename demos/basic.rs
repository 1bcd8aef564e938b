//! Minimal two-thread demonstration of the library: one thread acts as
//! producer, another as consumer, both opening the same backing file.
//!
//! Run with: `cargo run --example basic`

use std::thread;

use ringspsc::{OpenOptions, RingBuffer};

fn main() {
    env_logger::init();

    let path = std::env::temp_dir().join("ringspsc-demo-basic");
    let _ = std::fs::remove_file(&path);

    let consumer_path = path.clone();
    let consumer = thread::spawn(move || {
        let rb = RingBuffer::open(&consumer_path, OpenOptions::new(0)).expect("open");
        let mut total = 0usize;
        let mut size = 1;
        loop {
            let ptr = rb.get_data(&mut size);
            if size == 0 {
                break;
            }
            let window = unsafe { std::slice::from_raw_parts(ptr, size as usize) };
            total += window.len();
            rb.del(size);
            if total >= 1 << 20 {
                break;
            }
            size = 1;
        }
        println!("consumer read {total} bytes");
    });

    let producer = RingBuffer::open(&path, OpenOptions::new(1 << 16)).expect("open");
    let chunk = vec![0xABu8; 4096];
    let mut written = 0usize;
    while written < 1 << 20 {
        let mut size = chunk.len() as u32;
        let ptr = producer.get_free(&mut size);
        let n = size.min(chunk.len() as u32) as usize;
        unsafe { std::ptr::copy_nonoverlapping(chunk.as_ptr(), ptr, n) };
        producer.add(n as u32);
        written += n;
    }
    println!("producer wrote {written} bytes");

    consumer.join().unwrap();
    let _ = std::fs::remove_file(&path);
}
