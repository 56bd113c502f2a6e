use crate::error::ScanError;
use std::ops::RangeInclusive;

/// Inclusive, ascending TCP port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self, ScanError> {
        if start > end {
            return Err(ScanError::InvalidPortRange(format!("{start}-{end}")));
        }
        Ok(Self { start, end })
    }

    /// Parse a port spec.
    ///
    /// Supported formats:
    /// - inclusive range: `80-100`
    /// - single port, treated as a one-port range: `22`
    ///
    /// Bounds must be integers in `0..=65535` with `start <= end`.
    pub fn parse(spec: &str) -> Result<Self, ScanError> {
        let spec = spec.trim();
        let invalid = || ScanError::InvalidPortRange(spec.to_string());

        let (a, b) = match spec.split_once('-') {
            // A leading '-' is a negative bound, not an empty start.
            Some(("", _)) => return Err(invalid()),
            Some((a, b)) => (a, b),
            None => (spec, spec),
        };
        let start = parse_port_str(a).ok_or_else(invalid)?;
        let end = parse_port_str(b).ok_or_else(invalid)?;
        if start > end {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl IntoIterator for PortRange {
    type Item = u16;
    type IntoIter = RangeInclusive<u16>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn parse_port_str(s: &str) -> Option<u16> {
    // Parse wide so "-1" and "70000" fail the same way.
    let val: i64 = s.trim().parse().ok()?;
    u16::try_from(val).ok()
}
