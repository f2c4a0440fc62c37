//! Inclusive IP address ranges.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use super::error::LineErrorKind;

/// An inclusive range of addresses of one family.
///
/// IPv6 literals stay IPv6, including those in `::ffff:0:0/96`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpRange {
    min: IpAddr,
    max: IpAddr,
}

impl IpRange {
    /// Create a range from its two ends.
    ///
    /// # Errors
    ///
    /// Returns [`LineErrorKind::InvalidAddress`] if the ends are of different
    /// families or `max` is below `min`.
    pub fn new(min: IpAddr, max: IpAddr) -> Result<Self, LineErrorKind> {
        if min.is_ipv4() != max.is_ipv4() {
            return Err(LineErrorKind::InvalidAddress(format!(
                "address family mismatch in {min}-{max}"
            )));
        }
        if max < min {
            return Err(LineErrorKind::InvalidAddress(format!(
                "range end {max} is below range start {min}"
            )));
        }
        Ok(Self { min, max })
    }

    /// Build a range from ends already known to be ordered and of one family.
    pub(crate) fn from_bounds(min: IpAddr, max: IpAddr) -> Self {
        debug_assert!(min.is_ipv4() == max.is_ipv4() && min <= max);
        Self { min, max }
    }

    /// Range covering exactly one address.
    #[must_use]
    pub fn single(addr: IpAddr) -> Self {
        Self {
            min: addr,
            max: addr,
        }
    }

    /// Lowest address in the range.
    #[must_use]
    pub fn min(&self) -> IpAddr {
        self.min
    }

    /// Highest address in the range.
    #[must_use]
    pub fn max(&self) -> IpAddr {
        self.max
    }

    /// Check if the range covers a single address.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.min == self.max
    }

    /// Check if `addr` falls inside the range.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        addr.is_ipv4() == self.min.is_ipv4() && self.min <= addr && addr <= self.max
    }
}

impl FromStr for IpRange {
    type Err = LineErrorKind;

    /// Parse `addr` or `addr1-addr2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |text: &str| {
            text.trim()
                .parse::<IpAddr>()
                .map_err(|_| LineErrorKind::InvalidAddress(format!("'{}' is not an IP address", text.trim())))
        };

        match s.split_once('-') {
            Some((lo, hi)) => Self::new(parse(lo)?, parse(hi)?),
            None => parse(s).map(Self::single),
        }
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{} - {}", self.min, self.max)
        }
    }
}
