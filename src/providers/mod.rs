//! Packet sources shipped with the crate
//!
//! - [`replay::ReplaySource`] plays back a recorded list of events
//! - [`tone::ToneSource`] generates a sine tone with advancing time stamps

pub mod replay;
pub mod tone;

pub use replay::ReplaySource;
pub use tone::ToneSource;
