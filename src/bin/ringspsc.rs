//! Command-line driver that pipes standard input or output through a
//! [`ringspsc::RingBuffer`].
//!
//! `ringspsc --write --size 65536 /dev/shm/pipe` copies stdin into the
//! buffer until EOF; `ringspsc --read /dev/shm/pipe` copies the buffer to
//! stdout until the writer stops producing. `--non-block` switches both
//! directions to `*size = 0` semantics: a single non-blocking poll instead
//! of waiting for data/space.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use ringspsc::{OpenOptions, RingBuffer};

/// Pipe a byte stream through a file-backed SPSC ring buffer.
#[derive(Parser, Debug)]
#[command(name = "ringspsc", version, about)]
struct Cli {
    /// Drain the buffer to stdout.
    #[arg(short = 'r', long)]
    read: bool,

    /// Feed the buffer from stdin.
    #[arg(short = 'w', long)]
    write: bool,

    /// Never block: poll once and stop instead of waiting for space/data.
    #[arg(short = 'n', long = "non-block")]
    non_block: bool,

    /// Capacity to request if this call wins the creation race. Ignored
    /// (and unnecessary) when joining an already-negotiated buffer.
    #[arg(short = 's', long, default_value_t = 0)]
    size: u32,

    /// Path to the backing file.
    path: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.read == cli.write {
        bail!("exactly one of --read or --write must be given");
    }

    let rb = RingBuffer::open(&cli.path, OpenOptions::new(cli.size))
        .with_context(|| format!("opening {}", cli.path.display()))?;
    info!("negotiated capacity: {} bytes", rb.get_capacity());

    if cli.write {
        run_writer(&rb, cli.non_block)
    } else {
        run_reader(&rb, cli.non_block)
    }
}

fn run_writer(rb: &RingBuffer, non_block: bool) -> Result<()> {
    let stdin = std::io::stdin();
    let mut lock = stdin.lock();

    loop {
        let mut size = if non_block { 0 } else { 1 };
        let ptr = rb.get_free(&mut size);
        if size == 0 {
            return Ok(());
        }

        let window = unsafe { std::slice::from_raw_parts_mut(ptr, size as usize) };
        let n = lock.read(window).context("reading stdin")?;
        if n == 0 {
            return Ok(());
        }
        rb.add(n as u32);
    }
}

fn run_reader(rb: &RingBuffer, non_block: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();

    loop {
        let mut size = if non_block { 0 } else { 1 };
        let ptr = rb.get_data(&mut size);
        if size == 0 {
            return Ok(());
        }

        let window = unsafe { std::slice::from_raw_parts(ptr, size as usize) };
        lock.write_all(window).context("writing stdout")?;
        rb.del(size);
    }
}
