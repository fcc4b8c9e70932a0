//! bufcat - Streams a file to stdout through a flow-controlled buffer.
//!
//! A background thread reads the file ahead into a ring buffer while the
//! main thread copies buffered bytes to stdout, which makes the threshold
//! and backpressure behavior of `bytepump-stream` observable from the
//! command line (run with `-v` to watch the refill lifecycle).

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytepump_stream::{BufferedStream, ReaderSource, StreamOptions};
use clap::Parser;
use tracing::{debug, info};

/// Stream a file to stdout through a read-ahead buffer.
#[derive(Parser, Debug)]
#[command(name = "bufcat")]
#[command(about = "Stream a file to stdout through a read-ahead buffer")]
struct Args {
    /// File to stream
    file: PathBuf,

    /// Ring buffer capacity in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    capacity: usize,

    /// Occupancy at or below which the refill thread is woken
    /// (default: capacity / 2)
    #[arg(long)]
    read_threshold: Option<usize>,

    /// Bytes requested from the file per refill read
    /// (default: capacity / 8)
    #[arg(long)]
    read_size: Option<usize>,

    /// Minimum occupancy to report the stream ready
    /// (default: capacity / 2)
    #[arg(long)]
    ready_threshold: Option<usize>,

    /// Maximum occupancy to report the stream not ready
    /// (default: capacity / 8)
    #[arg(long)]
    not_ready_threshold: Option<usize>,

    /// Chunk size used when copying buffered bytes to stdout
    #[arg(long, default_value_t = 8 * 1024)]
    chunk: usize,

    /// Verbose logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let file = File::open(&args.file)
        .with_context(|| format!("open {}", args.file.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("stat {}", args.file.display()))?
        .len() as usize;

    let opts = StreamOptions::new(
        args.capacity,
        args.read_threshold.unwrap_or(args.capacity / 2),
        args.read_size.unwrap_or_else(|| (args.capacity / 8).max(1)),
        args.ready_threshold.unwrap_or(args.capacity / 2),
        args.not_ready_threshold.unwrap_or(args.capacity / 8),
    )
    .with_wait_for_ready()
    .with_end_with_source();

    let stream = BufferedStream::new(opts).context("configure stream")?;
    stream
        .open(Arc::new(ReaderSource::with_size(file, len)))
        .context("open stream")?;
    debug!("streaming {} ({} bytes)", args.file.display(), len);

    let mut stdout = io::stdout().lock();
    let mut chunk = vec![0u8; args.chunk.max(1)];
    let mut total = 0usize;
    loop {
        let n = stream.read(&mut chunk);
        if n == 0 {
            break;
        }
        stdout.write_all(&chunk[..n]).context("write to stdout")?;
        total += n;
    }
    stdout.flush().context("flush stdout")?;
    stream.close();

    if let Some(err) = stream.error() {
        anyhow::bail!("source failed after {} bytes: {}", total, err);
    }
    info!("done: {} bytes", total);
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}
