use std::fmt;
use std::ops::Sub;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since UNIX_EPOCH as f64. The default value is invalid ("unset").
#[derive(Clone, Copy, PartialEq, PartialOrd)]
pub struct Timestamp(f64);

impl Timestamp {
    #[inline]
    pub const fn new(seconds: f64) -> Self {
        Self(seconds)
    }

    #[inline]
    pub const fn invalid() -> Self {
        Self(f64::MIN)
    }

    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self(secs)
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.0 == f64::MIN
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        !self.is_invalid()
    }

    #[inline]
    pub const fn seconds(self) -> f64 {
        self.0
    }

    /// The later of both timestamps; an invalid timestamp always loses.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        if self.0 >= other.0 { self } else { other }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::invalid()
    }
}

impl Sub for Timestamp {
    type Output = f64;

    fn sub(self, rhs: Self) -> f64 {
        self.0 - rhs.0
    }
}

impl From<f64> for Timestamp {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "Timestamp(invalid)")
        } else {
            write!(f, "Timestamp({})", self.0)
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "invalid")
        } else {
            write!(f, "{:.6}", self.0)
        }
    }
}
