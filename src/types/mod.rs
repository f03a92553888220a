//! Core value types for sample streams.
//!
//! - [`PrecisionTime`] is an absolute time split into whole and fractional seconds
//! - [`SampleTimestamp`] pins a time to a sample offset within a block
//! - [`StreamSri`] is the metadata snapshot for a stream, shared as [`SharedSri`]
//! - [`SriChangeFlags`] records which metadata fields changed between packets
//! - [`Element`] and [`Sample`] describe the element types a stream may carry
//! - [`Packet`] is the unit queued between producer and consumer
//!
//! ## Usage Example
//!
//! ```rust
//! use bulkflow::types::{PrecisionTime, SampleTimestamp, StreamSri, drift};
//!
//! let sri = StreamSri::new("rx").with_xdelta(0.001);
//! let start = SampleTimestamp::new(PrecisionTime::new(100.0, 0.0), 0);
//! let end = SampleTimestamp::new(PrecisionTime::new(100.0, 0.5), 500);
//!
//! // 500 samples at 1 ms each took exactly 0.5 s
//! assert_eq!(drift(&start, &end, sri.xdelta), 0.0);
//! ```

mod element;
mod packet;
pub mod sri;
mod time;
mod timestamp;

pub use element::{Element, ElementKind, Sample};
pub(crate) use element::elements_per_sample;
pub use packet::Packet;
pub use sri::{Keyword, KeywordValue, SharedSri, SriChangeFlags, StreamSri, compare_sri, units};
pub use time::{PrecisionTime, TimeCodeMode, TimeCodeStatus};
pub use timestamp::{SampleTimestamp, drift};
