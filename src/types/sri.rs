//! Stream-related information (SRI) metadata snapshots

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared, immutable SRI snapshot.
///
/// All blocks produced under the same metadata generation hold the same `Arc`.
/// A metadata update is always a new snapshot, never an in-place mutation.
pub type SharedSri = Arc<StreamSri>;

/// Unit codes for the `xunits` and `yunits` fields.
pub mod units {
    pub const NONE: i16 = 0;
    pub const TIME: i16 = 1;
    pub const DELAY: i16 = 2;
    pub const FREQUENCY: i16 = 3;
    pub const TIME_CODE: i16 = 4;
    pub const DISTANCE: i16 = 5;
    pub const VELOCITY: i16 = 6;
    pub const ACCELERATION: i16 = 7;
}

/// A stream keyword value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeywordValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
}

/// A named keyword attached to a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: String,
    pub value: KeywordValue,
}

/// Metadata describing a sample stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSri {
    pub hversion: i32,
    /// Abscissa value of the first sample
    pub xstart: f64,
    /// Seconds (or other `xunits`) per sample
    pub xdelta: f64,
    pub xunits: i16,
    /// Row length for framed data, 0 for contiguous
    pub subsize: i32,
    pub ystart: f64,
    pub ydelta: f64,
    pub yunits: i16,
    /// 0 for scalar data, 1 for complex (interleaved real/imaginary) data
    pub mode: i16,
    pub stream_id: String,
    /// When set, a full queue blocks the producer instead of flushing
    pub blocking: bool,
    pub keywords: Vec<Keyword>,
}

impl Default for StreamSri {
    fn default() -> Self {
        Self {
            hversion: 1,
            xstart: 0.0,
            xdelta: 1.0,
            xunits: units::TIME,
            subsize: 0,
            ystart: 0.0,
            ydelta: 0.0,
            yunits: units::NONE,
            mode: 0,
            stream_id: String::new(),
            blocking: false,
            keywords: Vec::new(),
        }
    }
}

impl StreamSri {
    /// Create an SRI with default fields for the given stream ID.
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self { stream_id: stream_id.into(), ..Self::default() }
    }

    /// Builder-style setter for `xdelta`.
    pub fn with_xdelta(mut self, xdelta: f64) -> Self {
        self.xdelta = xdelta;
        self
    }

    /// Builder-style setter for complex mode.
    pub fn with_complex(mut self, complex: bool) -> Self {
        self.mode = i16::from(complex);
        self
    }

    /// Builder-style setter for blocking mode.
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Add or replace a keyword.
    pub fn with_keyword(mut self, id: impl Into<String>, value: KeywordValue) -> Self {
        let id = id.into();
        match self.keywords.iter_mut().find(|k| k.id == id) {
            Some(existing) => existing.value = value,
            None => self.keywords.push(Keyword { id, value }),
        }
        self
    }

    /// Whether samples are complex (interleaved real/imaginary pairs).
    pub fn is_complex(&self) -> bool {
        self.mode != 0
    }

    /// Look up a keyword value by ID.
    pub fn keyword(&self, id: &str) -> Option<&KeywordValue> {
        self.keywords.iter().find(|k| k.id == id).map(|k| &k.value)
    }
}

/// Bitmask of SRI fields that changed between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SriChangeFlags(pub u32);

impl SriChangeFlags {
    pub const NONE: SriChangeFlags = SriChangeFlags(0);
    pub const HVERSION: SriChangeFlags = SriChangeFlags(1 << 0);
    pub const XSTART: SriChangeFlags = SriChangeFlags(1 << 1);
    pub const XDELTA: SriChangeFlags = SriChangeFlags(1 << 2);
    pub const XUNITS: SriChangeFlags = SriChangeFlags(1 << 3);
    pub const SUBSIZE: SriChangeFlags = SriChangeFlags(1 << 4);
    pub const YSTART: SriChangeFlags = SriChangeFlags(1 << 5);
    pub const YDELTA: SriChangeFlags = SriChangeFlags(1 << 6);
    pub const YUNITS: SriChangeFlags = SriChangeFlags(1 << 7);
    pub const MODE: SriChangeFlags = SriChangeFlags(1 << 8);
    pub const STREAMID: SriChangeFlags = SriChangeFlags(1 << 9);
    pub const BLOCKING: SriChangeFlags = SriChangeFlags(1 << 10);
    pub const KEYWORDS: SriChangeFlags = SriChangeFlags(1 << 11);

    /// Every field flag set; used for the first SRI of a stream.
    pub const ALL: SriChangeFlags = SriChangeFlags((1 << 12) - 1);

    /// Whether no field changed.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Check if all bits of `flag` are set.
    pub fn contains(&self, flag: SriChangeFlags) -> bool {
        (self.0 & flag.0) == flag.0
    }

    /// Get the raw value.
    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for SriChangeFlags {
    type Output = SriChangeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        SriChangeFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for SriChangeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Compare two SRIs field by field, returning the set of fields that differ.
pub fn compare_sri(previous: &StreamSri, current: &StreamSri) -> SriChangeFlags {
    let mut flags = SriChangeFlags::NONE;
    if previous.hversion != current.hversion {
        flags |= SriChangeFlags::HVERSION;
    }
    if previous.xstart != current.xstart {
        flags |= SriChangeFlags::XSTART;
    }
    if previous.xdelta != current.xdelta {
        flags |= SriChangeFlags::XDELTA;
    }
    if previous.xunits != current.xunits {
        flags |= SriChangeFlags::XUNITS;
    }
    if previous.subsize != current.subsize {
        flags |= SriChangeFlags::SUBSIZE;
    }
    if previous.ystart != current.ystart {
        flags |= SriChangeFlags::YSTART;
    }
    if previous.ydelta != current.ydelta {
        flags |= SriChangeFlags::YDELTA;
    }
    if previous.yunits != current.yunits {
        flags |= SriChangeFlags::YUNITS;
    }
    if previous.mode != current.mode {
        flags |= SriChangeFlags::MODE;
    }
    if previous.stream_id != current.stream_id {
        flags |= SriChangeFlags::STREAMID;
    }
    if previous.blocking != current.blocking {
        flags |= SriChangeFlags::BLOCKING;
    }
    if previous.keywords != current.keywords {
        flags |= SriChangeFlags::KEYWORDS;
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_sri_reports_no_change() {
        let sri = StreamSri::new("s1").with_xdelta(0.001);
        assert!(compare_sri(&sri, &sri.clone()).is_empty());
    }

    #[test]
    fn changed_fields_are_flagged_individually() {
        let before = StreamSri::new("s1");
        let after = before.clone().with_xdelta(0.5).with_complex(true);

        let flags = compare_sri(&before, &after);
        assert!(flags.contains(SriChangeFlags::XDELTA));
        assert!(flags.contains(SriChangeFlags::MODE));
        assert!(!flags.contains(SriChangeFlags::XSTART));
        assert_eq!(flags, SriChangeFlags::XDELTA | SriChangeFlags::MODE);
    }

    #[test]
    fn keyword_updates_replace_in_place() {
        let sri = StreamSri::new("s1")
            .with_keyword("COL_RF", KeywordValue::Double(100e6))
            .with_keyword("COL_RF", KeywordValue::Double(101e6));
        assert_eq!(sri.keywords.len(), 1);
        assert_eq!(sri.keyword("COL_RF"), Some(&KeywordValue::Double(101e6)));

        let flags = compare_sri(&StreamSri::new("s1"), &sri);
        assert_eq!(flags, SriChangeFlags::KEYWORDS);
    }

    #[test]
    fn all_covers_every_field_flag() {
        for flag in [
            SriChangeFlags::HVERSION,
            SriChangeFlags::XDELTA,
            SriChangeFlags::MODE,
            SriChangeFlags::KEYWORDS,
        ] {
            assert!(SriChangeFlags::ALL.contains(flag));
        }
    }
}
