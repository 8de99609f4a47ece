//! Static IP reputation lookups
//!
//! A block list plus known Tor exit and proxy addresses, loaded at startup.
//! Private, loopback and link-local addresses are always reported clean.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use async_trait::async_trait;
use stashguard_core::{AppResult, IpIntelligence, IpReputation, ThreatLevel};

#[derive(Debug, Clone, Default)]
pub struct StaticIpIntelligence {
    blocked: HashSet<IpAddr>,
    tor_exits: HashSet<IpAddr>,
    proxies: HashSet<IpAddr>,
    vpns: HashSet<IpAddr>,
    countries: HashMap<IpAddr, String>,
}

impl StaticIpIntelligence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(mut self, ip: IpAddr) -> Self {
        self.blocked.insert(ip);
        self
    }

    pub fn tor_exit(mut self, ip: IpAddr) -> Self {
        self.tor_exits.insert(ip);
        self
    }

    pub fn proxy(mut self, ip: IpAddr) -> Self {
        self.proxies.insert(ip);
        self
    }

    pub fn vpn(mut self, ip: IpAddr) -> Self {
        self.vpns.insert(ip);
        self
    }

    pub fn country(mut self, ip: IpAddr, code: impl Into<String>) -> Self {
        self.countries.insert(ip, code.into());
        self
    }

    /// Parse a comma separated block list (e.g. from an env var). Invalid
    /// entries are skipped with a warning.
    pub fn with_block_list(mut self, list: &str) -> Self {
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            match entry.parse::<IpAddr>() {
                Ok(ip) => {
                    self.blocked.insert(ip);
                }
                Err(_) => tracing::warn!(entry = %entry, "Skipping invalid block list entry"),
            }
        }
        self
    }
}

fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[async_trait]
impl IpIntelligence for StaticIpIntelligence {
    async fn lookup(&self, ip: IpAddr) -> AppResult<IpReputation> {
        let country = self.countries.get(&ip).cloned();
        if is_internal(ip) {
            return Ok(IpReputation {
                ip,
                threat_level: ThreatLevel::None,
                is_vpn: false,
                is_tor: false,
                is_proxy: false,
                country,
                blocked: false,
            });
        }

        let blocked = self.blocked.contains(&ip);
        let is_tor = self.tor_exits.contains(&ip);
        let is_proxy = self.proxies.contains(&ip);
        let is_vpn = self.vpns.contains(&ip);

        let threat_level = if blocked {
            ThreatLevel::High
        } else if is_tor {
            ThreatLevel::Medium
        } else if is_proxy || is_vpn {
            ThreatLevel::Low
        } else {
            ThreatLevel::None
        };

        if threat_level > ThreatLevel::None {
            tracing::debug!(ip = %ip, threat_level = ?threat_level, "IP reputation flagged");
        }

        Ok(IpReputation {
            ip,
            threat_level,
            is_vpn,
            is_tor,
            is_proxy,
            country,
            blocked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_threat_levels() {
        let intel = StaticIpIntelligence::new()
            .block(ip("203.0.113.9"))
            .tor_exit(ip("198.51.100.7"))
            .vpn(ip("198.51.100.8"))
            .country(ip("198.51.100.8"), "NL");

        let blocked = intel.lookup(ip("203.0.113.9")).await.unwrap();
        assert!(blocked.blocked);
        assert_eq!(blocked.threat_level, ThreatLevel::High);

        let tor = intel.lookup(ip("198.51.100.7")).await.unwrap();
        assert!(tor.is_tor && !tor.blocked);
        assert_eq!(tor.threat_level, ThreatLevel::Medium);

        let vpn = intel.lookup(ip("198.51.100.8")).await.unwrap();
        assert_eq!(vpn.threat_level, ThreatLevel::Low);
        assert_eq!(vpn.country.as_deref(), Some("NL"));

        let clean = intel.lookup(ip("192.0.2.1")).await.unwrap();
        assert_eq!(clean.threat_level, ThreatLevel::None);
    }

    #[tokio::test]
    async fn test_internal_addresses_are_never_blocked() {
        let intel = StaticIpIntelligence::new()
            .block(ip("10.0.0.1"))
            .block(ip("::1"));
        assert!(!intel.is_blocked(ip("10.0.0.1")).await.unwrap());
        assert!(!intel.is_blocked(ip("::1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_block_list_parsing() {
        let intel = StaticIpIntelligence::new().with_block_list("203.0.113.1, nonsense,,2001:db8::1");
        assert!(intel.is_blocked(ip("203.0.113.1")).await.unwrap());
        assert!(intel.is_blocked(ip("2001:db8::1")).await.unwrap());
        assert!(!intel.is_blocked(ip("203.0.113.2")).await.unwrap());
    }
}
