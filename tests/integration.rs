//! Cross-handle scenarios exercised from the public API only, using
//! independent `RingBuffer` handles on separate OS threads against the same
//! backing file, the closest same-process analogue to two independent
//! processes sharing a path.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use ringspsc::{OpenOptions, RingBuffer};
use tempfile::tempdir;

#[test]
fn stream_fidelity_across_many_small_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ring");

    let source: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();

    let reader_path = path.clone();
    let expected = source.clone();
    let reader = thread::spawn(move || {
        let rb = RingBuffer::open(&reader_path, OpenOptions::new(0)).unwrap();
        let mut received = Vec::with_capacity(expected.len());
        while received.len() < expected.len() {
            let mut size = 1;
            let ptr = rb.get_data(&mut size);
            let n = size.min((expected.len() - received.len()) as u32);
            let window = unsafe { std::slice::from_raw_parts(ptr, n as usize) };
            received.extend_from_slice(window);
            rb.del(n);
        }
        assert_eq!(received, expected);
        rb.close();
    });

    let writer = RingBuffer::open(&path, OpenOptions::new(4096)).unwrap();
    let mut offset = 0;
    while offset < source.len() {
        let remaining = (source.len() - offset) as u32;
        let mut size = remaining.min(97);
        let ptr = writer.get_free(&mut size);
        let n = size.min(remaining) as usize;
        unsafe {
            std::ptr::copy_nonoverlapping(source[offset..].as_ptr(), ptr, n);
        }
        writer.add(n as u32);
        offset += n;
    }
    writer.close();

    reader.join().unwrap();
}

#[test]
fn crash_recovery_wakes_a_stale_waiter() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ring");

    let producer = RingBuffer::open(&path, OpenOptions::new(4096)).unwrap();
    let capacity = producer.get_capacity();

    // Fill the buffer completely so the next get_free blocks.
    let mut free = capacity;
    let ptr = producer.get_free(&mut free);
    let chunk = vec![0u8; capacity as usize];
    unsafe { std::ptr::copy_nonoverlapping(chunk.as_ptr(), ptr, capacity as usize) };
    producer.add(capacity);

    let (done_tx, done_rx) = mpsc::channel();
    let blocked_producer = thread::spawn(move || {
        let mut size = 1;
        producer.get_free(&mut size);
        done_tx.send(()).unwrap();
        producer
    });

    // Give the producer thread time to actually enter the futex wait and
    // set consumed_waited.
    thread::sleep(Duration::from_millis(100));

    // Simulate a crashed consumer: a third handle opens the same path. Since
    // consumed_waited is set, this must perform the crash-recovery wake,
    // but nothing has actually freed space yet, so the producer must not
    // have unblocked for real.
    let recovery_handle = RingBuffer::open(&path, OpenOptions::new(0)).unwrap();
    assert_eq!(
        done_rx.recv_timeout(Duration::from_millis(200)),
        Err(mpsc::RecvTimeoutError::Timeout),
        "producer must still be blocked: nothing has actually freed space"
    );

    // Now a real consumer shows up and releases one byte.
    let mut used = 1;
    recovery_handle.get_data(&mut used);
    recovery_handle.del(1);

    let producer = blocked_producer.join().unwrap();
    done_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("producer should have unblocked after del()");

    producer.close();
    recovery_handle.close();
}

#[test]
fn metrics_are_zero_unless_enabled() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ring");

    let rb = RingBuffer::open(&path, OpenOptions::new(4096)).unwrap();
    let mut size = 4;
    let ptr = rb.get_free(&mut size);
    unsafe { std::ptr::write_bytes(ptr, 1, 4) };
    rb.add(4);

    let m = rb.metrics();
    assert_eq!(m.bytes_produced, 0);

    rb.close();
}

#[test]
fn metrics_track_bytes_when_enabled() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ring");

    let rb = RingBuffer::open(&path, OpenOptions::new(4096).with_metrics(true)).unwrap();
    let mut size = 4;
    let ptr = rb.get_free(&mut size);
    unsafe { std::ptr::write_bytes(ptr, 1, 4) };
    rb.add(4);

    assert_eq!(rb.metrics().bytes_produced, 4);

    rb.close();
}
