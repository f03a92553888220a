//! Absolute time values attached to sample streams

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of a time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeCodeMode {
    /// No time code
    Off,
    /// Host CPU clock
    #[default]
    Cpu,
    /// Zero time code
    Ztc,
    /// SDN time code
    Sdn,
    /// SMS time code
    Sms,
    /// DTL time code
    Dtl,
    /// IRIG-B
    Irb,
    /// SDDS packet time
    Sdds,
}

/// Validity of a time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeCodeStatus {
    Invalid,
    #[default]
    Valid,
}

/// Absolute time split into whole and fractional seconds since the Unix epoch.
///
/// Keeping the two parts separate preserves sub-nanosecond resolution for
/// timestamps far from the epoch, which a single `f64` cannot. Values are kept
/// normalized so that `tfsec` lies in `[0, 1)`.
///
/// Equality and ordering only consider `twsec` and `tfsec`; the time code
/// fields describe where the value came from, not when it is.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PrecisionTime {
    pub tcmode: TimeCodeMode,
    pub tcstatus: TimeCodeStatus,
    /// Fractional sample offset of the time code
    pub toff: f64,
    /// Whole seconds since the epoch
    pub twsec: f64,
    /// Fractional seconds
    pub tfsec: f64,
}

impl PrecisionTime {
    /// Create a valid CPU time from whole and fractional seconds.
    pub fn new(twsec: f64, tfsec: f64) -> Self {
        let mut time = Self {
            tcmode: TimeCodeMode::Cpu,
            tcstatus: TimeCodeStatus::Valid,
            toff: 0.0,
            twsec,
            tfsec,
        };
        time.normalize();
        time
    }

    /// Create a time from a total number of seconds since the epoch.
    pub fn from_secs_f64(seconds: f64) -> Self {
        let whole = seconds.floor();
        Self::new(whole, seconds - whole)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self::new(elapsed.as_secs() as f64, f64::from(elapsed.subsec_nanos()) * 1e-9)
    }

    /// An invalid time, used when a producer supplies no time code.
    pub fn not_set() -> Self {
        Self {
            tcmode: TimeCodeMode::Off,
            tcstatus: TimeCodeStatus::Invalid,
            toff: 0.0,
            twsec: 0.0,
            tfsec: 0.0,
        }
    }

    /// Whether the time code status is valid.
    pub fn is_valid(&self) -> bool {
        self.tcstatus == TimeCodeStatus::Valid
    }

    /// Total seconds as a single `f64` (loses precision far from the epoch).
    pub fn as_secs_f64(&self) -> f64 {
        self.twsec + self.tfsec
    }

    fn normalize(&mut self) {
        let carry = self.tfsec.floor();
        if carry != 0.0 {
            self.twsec += carry;
            self.tfsec -= carry;
        }
        let whole_fraction = self.twsec.fract();
        if whole_fraction != 0.0 {
            self.twsec -= whole_fraction;
            self.tfsec += whole_fraction;
            let carry = self.tfsec.floor();
            self.twsec += carry;
            self.tfsec -= carry;
        }
    }
}

impl PartialEq for PrecisionTime {
    fn eq(&self, other: &Self) -> bool {
        self.twsec == other.twsec && self.tfsec == other.tfsec
    }
}

impl PartialOrd for PrecisionTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.twsec.partial_cmp(&other.twsec)? {
            Ordering::Equal => self.tfsec.partial_cmp(&other.tfsec),
            ordering => Some(ordering),
        }
    }
}

impl AddAssign<f64> for PrecisionTime {
    fn add_assign(&mut self, seconds: f64) {
        let whole = seconds.trunc();
        self.twsec += whole;
        self.tfsec += seconds - whole;
        self.normalize();
    }
}

impl Add<f64> for PrecisionTime {
    type Output = PrecisionTime;

    fn add(mut self, seconds: f64) -> Self::Output {
        self += seconds;
        self
    }
}

impl SubAssign<f64> for PrecisionTime {
    fn sub_assign(&mut self, seconds: f64) {
        *self += -seconds;
    }
}

impl Sub<f64> for PrecisionTime {
    type Output = PrecisionTime;

    fn sub(mut self, seconds: f64) -> Self::Output {
        self -= seconds;
        self
    }
}

/// Difference in seconds between two times.
impl Sub for PrecisionTime {
    type Output = f64;

    fn sub(self, other: PrecisionTime) -> f64 {
        (self.twsec - other.twsec) + (self.tfsec - other.tfsec)
    }
}

impl fmt::Display for PrecisionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:.9}s", self.twsec, self.tfsec)
    }
}
