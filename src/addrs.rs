use crate::error::ScanError;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Inclusive range of IP addresses, walked by big-endian byte-wise increment.
///
/// Construction validates the endpoints, so iteration always terminates:
/// both ends share an address family and `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    start: IpAddr,
    end: IpAddr,
}

impl AddressRange {
    pub fn new(start: IpAddr, end: IpAddr) -> Result<Self, ScanError> {
        let ordered = match (start, end) {
            (IpAddr::V4(a), IpAddr::V4(b)) => a.octets() <= b.octets(),
            (IpAddr::V6(a), IpAddr::V6(b)) => a.octets() <= b.octets(),
            _ => false,
        };
        if !ordered {
            return Err(ScanError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(ip: IpAddr) -> Self {
        Self { start: ip, end: ip }
    }

    /// Parse an address spec.
    ///
    /// Supported forms:
    /// - single address: `192.168.0.1`
    /// - inclusive range: `192.168.0.1-192.168.1.24`
    /// - CIDR block, network to broadcast inclusive: `10.0.0.0/30`
    pub fn parse(spec: &str) -> Result<Self, ScanError> {
        let spec = spec.trim();
        if spec.contains('/') {
            let net = spec
                .parse::<IpNet>()
                .map_err(|_| ScanError::InvalidAddress(spec.to_string()))?;
            return Self::new(net.network(), net.broadcast());
        }

        let parts: Vec<&str> = spec.split('-').collect();
        match parts.as_slice() {
            [one] => Ok(Self::single(parse_ip(one)?)),
            [a, b] => Self::new(parse_ip(a)?, parse_ip(b)?),
            _ => Err(ScanError::InvalidAddress(spec.to_string())),
        }
    }

    pub fn start(&self) -> IpAddr {
        self.start
    }

    pub fn end(&self) -> IpAddr {
        self.end
    }

    /// Number of addresses in the range, saturating at `u64::MAX` for huge IPv6 spans.
    pub fn len(&self) -> u64 {
        let span = match (self.start, self.end) {
            (IpAddr::V4(a), IpAddr::V4(b)) => u128::from(u32::from(b) - u32::from(a)),
            (IpAddr::V6(a), IpAddr::V6(b)) => u128::from(b) - u128::from(a),
            _ => 0,
        };
        u64::try_from(span.saturating_add(1)).unwrap_or(u64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> AddressIter {
        AddressIter {
            next: Some(self.start),
            end: self.end,
        }
    }
}

impl IntoIterator for AddressRange {
    type Item = IpAddr;
    type IntoIter = AddressIter;

    fn into_iter(self) -> AddressIter {
        self.iter()
    }
}

impl IntoIterator for &AddressRange {
    type Item = IpAddr;
    type IntoIter = AddressIter;

    fn into_iter(self) -> AddressIter {
        self.iter()
    }
}

/// Iterator over an [`AddressRange`]. Stops after yielding the address equal to `end`.
#[derive(Debug, Clone)]
pub struct AddressIter {
    next: Option<IpAddr>,
    end: IpAddr,
}

impl Iterator for AddressIter {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        let current = self.next?;
        self.next = if current == self.end {
            None
        } else {
            increment(current)
        };
        Some(current)
    }
}

/// Big-endian byte-wise increment. Returns `None` when every byte wraps to zero.
pub fn increment(ip: IpAddr) -> Option<IpAddr> {
    match ip {
        IpAddr::V4(v4) => {
            let mut o = v4.octets();
            carry(&mut o).then(|| IpAddr::V4(Ipv4Addr::from(o)))
        }
        IpAddr::V6(v6) => {
            let mut o = v6.octets();
            carry(&mut o).then(|| IpAddr::V6(Ipv6Addr::from(o)))
        }
    }
}

fn carry(bytes: &mut [u8]) -> bool {
    for b in bytes.iter_mut().rev() {
        *b = b.wrapping_add(1);
        if *b != 0 {
            return true;
        }
    }
    false
}

fn parse_ip(s: &str) -> Result<IpAddr, ScanError> {
    let s = s.trim();
    s.parse::<IpAddr>()
        .map_err(|_| ScanError::InvalidAddress(s.to_string()))
}
