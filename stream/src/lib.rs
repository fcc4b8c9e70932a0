//! Flow-controlled buffered byte streaming.
//!
//! This crate puts a fixed ring buffer between a slow or bursty byte source
//! and the code that consumes it. A background refill thread keeps the
//! buffer topped off from the source; consumers drain it at their own pace
//! through a small read/skip/position/size surface.
//!
//! # How it flows
//!
//! - The refill thread sleeps while the buffer holds comfortably more than
//!   `read_threshold` bytes. A drain that takes occupancy down past the
//!   threshold wakes it, and it then pulls `read_size`-byte chunks from the
//!   source until the ring is full again.
//! - Consumers pace themselves on [`BufferedStream::is_ready`] (at least
//!   `ready_threshold` bytes buffered — safe to read continuously) and
//!   [`BufferedStream::is_not_ready`] (at most `not_ready_threshold` —
//!   time to slow down), or block on [`BufferedStream::wait_ready`]. With
//!   [`StreamOptions::with_wait_for_ready`], `read` itself blocks while
//!   the buffer is empty.
//! - Closing the stream releases every blocked reader and waiter, and
//!   joins the refill thread before the source is let go.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use std::sync::Arc;
//! use bytepump_stream::{BufferedStream, ReaderSource, StreamOptions};
//!
//! let opts = StreamOptions::new(1024, 512, 128, 256, 64)
//!     .with_wait_for_ready()
//!     .with_end_with_source();
//! let stream = BufferedStream::new(opts).unwrap();
//!
//! let data: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
//! let source = ReaderSource::with_size(Cursor::new(data.clone()), data.len());
//! stream.open(Arc::new(source)).unwrap();
//!
//! let mut out = Vec::new();
//! let mut chunk = [0u8; 300];
//! loop {
//!     match stream.read(&mut chunk) {
//!         0 => break,
//!         n => out.extend_from_slice(&chunk[..n]),
//!     }
//! }
//! stream.close();
//! assert_eq!(out, data);
//! ```
//!
//! # Thread safety
//!
//! [`BufferedStream`] is `Send + Sync` and `Clone`; clones share the same
//! buffer and session via `Arc`. Exactly one refill thread runs per open
//! stream. Any number of threads may read, though fairness between them is
//! not guaranteed.

mod error;
mod ring;
mod semaphore;
mod source;
mod stream;

pub use error::StreamError;
pub use source::{ByteSource, ReaderSource};
pub use stream::{BufferedStream, StreamOptions};
