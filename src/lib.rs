//! Buffered, timestamp-aware input streams for signal-processing pipelines.
//!
//! Bulkflow sits between a producer pushing packets of samples and a consumer
//! that wants to read them like a file: in blocks of its own choosing, with
//! exact timing for every sample, and with clear signals when the stream's
//! metadata changes, data was lost, or the stream ends.
//!
//! # Features
//!
//! - **Sized reads**: re-slice arbitrary packets into fixed-size blocks
//! - **Overlapped reads**: re-deliver the tail of one block at the head of the next
//! - **Exact timing**: real time stamps at packet boundaries, interpolated ones
//!   mid-packet, drift measurement across a block
//! - **Zero copy**: whole-packet reads hand over the producer's buffer
//! - **Complex data**: counts in complex samples, `Complex<T>` views
//! - **Async integration**: packet sources, a tokio driver, and `Stream`
//!   adapters for new streams and blocks
//!
//! # Quick Start
//!
//! ```rust
//! use bulkflow::{InPort, PrecisionTime, StreamSri};
//!
//! let port = InPort::<f32>::new("dataFloat_in");
//! port.start();
//!
//! port.push_sri(StreamSri::new("rx").with_xdelta(1e-3));
//! port.push_packet(vec![0.0; 300], PrecisionTime::new(1000.0, 0.0), false, "rx");
//! port.push_packet(vec![1.0; 300], PrecisionTime::new(1000.0, 0.3), true, "rx");
//!
//! let stream = port.stream("rx").unwrap();
//! while let Some(block) = stream.read_count(256) {
//!     let start = block.start_time().unwrap();
//!     let drift = block.net_time_drift().unwrap();
//!     println!("{} samples at {} (drift {:.3e} s)", block.size(), start, drift);
//! }
//! assert!(stream.eos());
//! ```
//!
//! ## Driving a port from a source
//!
//! ```rust,no_run
//! use bulkflow::driver::Driver;
//! use bulkflow::providers::ToneSource;
//! use bulkflow::InPort;
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = Arc::new(InPort::<f32>::new("tone_in"));
//!     port.start();
//!
//!     let mut added = Box::pin(port.stream_added());
//!     let tone = ToneSource::new("tone", 440.0, 48_000.0, 1024)?.with_packet_count(100);
//!     let driver = Driver::spawn(tone, Arc::clone(&port));
//!
//!     let stream = added.next().await.unwrap();
//!     let mut blocks = Box::pin(stream.blocks(4800));
//!     while let Some(block) = blocks.next().await {
//!         println!("{} samples", block.size());
//!     }
//!
//!     driver.join().await?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod block;
pub mod buffer;
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Port and stream machinery
pub mod port;
mod queue;
pub mod stream;

// Upstream sources
pub mod driver;
pub mod providers;
pub mod source;

// Core exports
pub use block::DataBlock;
pub use buffer::SharedBuffer;
pub use config::PortConfig;
pub use error::*;
pub use port::InPort;
pub use stream::{InputStream, StreamState};
pub use types::*;

// Source exports
pub use source::{PacketSource, SourceEvent};

/// Input stream of signed 8-bit samples.
pub type InCharStream = InputStream<i8>;
/// Input stream of unsigned 8-bit samples.
pub type InOctetStream = InputStream<u8>;
pub type InShortStream = InputStream<i16>;
pub type InUShortStream = InputStream<u16>;
pub type InLongStream = InputStream<i32>;
pub type InULongStream = InputStream<u32>;
pub type InLongLongStream = InputStream<i64>;
pub type InULongLongStream = InputStream<u64>;
pub type InFloatStream = InputStream<f32>;
pub type InDoubleStream = InputStream<f64>;
/// Input stream of opaque string records.
pub type InXmlStream = InputStream<String>;
