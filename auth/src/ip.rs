//! IP allowlist entries: single addresses or CIDR blocks.

use std::net::IpAddr;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("invalid IP allowlist entry: {0}")]
pub struct InvalidIpRule(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IpRule {
    network: IpAddr,
    prefix_len: u8,
}

impl IpRule {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, normalize(ip)) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.prefix_len);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.prefix_len);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for IpRule {
    type Err = InvalidIpRule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidIpRule(s.to_string());
        let (addr, prefix_len) = match s.trim().split_once('/') {
            Some((addr, len)) => (addr, Some(len.parse::<u8>().map_err(|_| invalid())?)),
            None => (s.trim(), None),
        };

        let network = normalize(addr.parse::<IpAddr>().map_err(|_| invalid())?);
        let max_len = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = prefix_len.unwrap_or(max_len);
        if prefix_len > max_len {
            return Err(invalid());
        }

        Ok(IpRule {
            network,
            prefix_len,
        })
    }
}

/// True when `ip` matches any entry. Unparseable entries never match.
pub fn is_allowed(allowlist: &[String], ip: IpAddr) -> bool {
    allowlist.iter().any(|entry| match entry.parse::<IpRule>() {
        Ok(rule) => rule.contains(ip),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring allowlist entry");
            false
        }
    })
}

// IPv4-mapped IPv6 addresses compare as IPv4.
fn normalize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

fn mask_u32(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

fn mask_u128(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix_len))
    }
}
