//! Network gate: decides whether an address may be used as a fetch target.
//!
//! One `BlockList` serves every call site: the initial URL, each redirect
//! target, and the connect-time DNS resolver. None of them carry their own
//! range checks.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("invalid network range '{input}': {reason}")]
pub struct RangeParseError {
    pub input: String,
    pub reason: &'static str,
}

/// A CIDR block. The network part is stored pre-masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRange {
    V4 { network: u32, prefix: u8 },
    V6 { network: u128, prefix: u8 },
}

impl IpRange {
    pub fn v4(addr: Ipv4Addr, prefix: u8) -> Self {
        let prefix = prefix.min(32);
        IpRange::V4 {
            network: u32::from(addr) & mask_v4(prefix),
            prefix,
        }
    }

    pub fn v6(addr: Ipv6Addr, prefix: u8) -> Self {
        let prefix = prefix.min(128);
        IpRange::V6 {
            network: u128::from(addr) & mask_v6(prefix),
            prefix,
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (*self, ip) {
            (IpRange::V4 { network, prefix }, IpAddr::V4(v4)) => {
                u32::from(v4) & mask_v4(prefix) == network
            }
            (IpRange::V6 { network, prefix }, IpAddr::V6(v6)) => {
                u128::from(v6) & mask_v6(prefix) == network
            }
            _ => false,
        }
    }
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

impl FromStr for IpRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let err = |reason| RangeParseError {
            input: input.to_string(),
            reason,
        };

        let (addr, prefix) = match input.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (input, None),
        };
        let addr: IpAddr = addr.parse().map_err(|_| err("not an IP address"))?;

        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| err("prefix is not a number"))?,
            None => max,
        };
        if prefix > max {
            return Err(err("prefix longer than the address"));
        }

        Ok(match addr {
            IpAddr::V4(v4) => IpRange::v4(v4, prefix),
            IpAddr::V6(v6) => IpRange::v6(v6, prefix),
        })
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            IpRange::V4 { network, prefix } => write!(f, "{}/{}", Ipv4Addr::from(network), prefix),
            IpRange::V6 { network, prefix } => write!(f, "{}/{}", Ipv6Addr::from(network), prefix),
        }
    }
}

/// Loopback, private, link-local and reserved blocks refused by default.
pub fn default_blocked_ranges() -> Vec<IpRange> {
    vec![
        IpRange::v4(Ipv4Addr::new(0, 0, 0, 0), 8),
        IpRange::v4(Ipv4Addr::new(10, 0, 0, 0), 8),
        IpRange::v4(Ipv4Addr::new(100, 64, 0, 0), 10),
        IpRange::v4(Ipv4Addr::new(127, 0, 0, 0), 8),
        IpRange::v4(Ipv4Addr::new(169, 254, 0, 0), 16),
        IpRange::v4(Ipv4Addr::new(172, 16, 0, 0), 12),
        IpRange::v4(Ipv4Addr::new(192, 0, 0, 0), 24),
        IpRange::v4(Ipv4Addr::new(192, 168, 0, 0), 16),
        IpRange::v4(Ipv4Addr::new(198, 18, 0, 0), 15),
        IpRange::v4(Ipv4Addr::new(224, 0, 0, 0), 4),
        IpRange::v4(Ipv4Addr::new(240, 0, 0, 0), 4),
        IpRange::v6(Ipv6Addr::UNSPECIFIED, 128),
        IpRange::v6(Ipv6Addr::LOCALHOST, 128),
        IpRange::v6(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7),
        IpRange::v6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10),
        IpRange::v6(Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0), 8),
    ]
}

/// The set of networks the fetcher refuses to talk to.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockList {
    ranges: Vec<IpRange>,
}

impl Default for BlockList {
    fn default() -> Self {
        Self::new(default_blocked_ranges())
    }
}

impl BlockList {
    pub fn new(ranges: Vec<IpRange>) -> Self {
        Self { ranges }
    }

    /// Parses a comma-separated CIDR list, e.g. `"10.0.0.0/8, ::1/128"`.
    pub fn parse_list(list: &str) -> Result<Self, RangeParseError> {
        let ranges = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<IpRange>, _>>()?;
        Ok(Self::new(ranges))
    }

    pub fn ranges(&self) -> &[IpRange] {
        &self.ranges
    }

    /// IPv6 addresses that carry an IPv4 target are judged as that IPv4
    /// address: mapped (`::ffff:a.b.c.d`), compatible (`::a.b.c.d`) and NAT64
    /// (`64:ff9b::a.b.c.d`).
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => embedded_ipv4(v6).map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };
        self.ranges.iter().any(|r| r.contains(ip))
    }

    /// Returns the first blocked address, if any. One bad address taints the whole set.
    pub fn first_blocked<I>(&self, addrs: I) -> Option<IpAddr>
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        addrs
            .into_iter()
            .map(|a| a.ip())
            .find(|ip| self.is_blocked(*ip))
    }
}

fn embedded_ipv4(v6: Ipv6Addr) -> Option<Ipv4Addr> {
    let seg = v6.segments();
    let tail = Ipv4Addr::new(
        (seg[6] >> 8) as u8,
        seg[6] as u8,
        (seg[7] >> 8) as u8,
        seg[7] as u8,
    );
    match &seg[..6] {
        [0, 0, 0, 0, 0, 0xffff] | [0x64, 0xff9b, 0, 0, 0, 0] => Some(tail),
        // `::` and `::1` stay IPv6.
        [0, 0, 0, 0, 0, 0] if seg[6] != 0 || seg[7] > 1 => Some(tail),
        _ => None,
    }
}
