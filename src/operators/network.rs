//! Network operators: CIDR matching and DNS blocklist lookups.

use super::traits::Operator;
use crate::engine::Transaction;
use crate::error::{Error, Result};
use ipnetwork::IpNetwork;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn parse_network(entry: &str) -> Result<IpNetwork> {
    if entry.contains('/') {
        entry.parse::<IpNetwork>().map_err(|e| Error::InvalidIp {
            value: entry.to_string(),
            message: e.to_string(),
        })
    } else {
        // Bare addresses become host networks (/32 or /128).
        entry
            .parse::<IpAddr>()
            .map(IpNetwork::from)
            .map_err(|e| Error::InvalidIp {
                value: entry.to_string(),
                message: e.to_string(),
            })
    }
}

fn parse_network_list(entries: impl Iterator<Item = impl AsRef<str>>) -> Result<Vec<IpNetwork>> {
    let mut networks = Vec::new();
    for entry in entries {
        for part in entry
            .as_ref()
            .split(|c: char| c == ',' || c.is_whitespace())
        {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            networks.push(parse_network(part)?);
        }
    }
    Ok(networks)
}

/// Matches IP addresses against a list of CIDR networks.
pub struct IpMatch {
    networks: Vec<IpNetwork>,
}

impl IpMatch {
    /// Build from a comma-separated address/CIDR list.
    pub fn new(list: &str) -> Result<Self> {
        let networks = parse_network_list(std::iter::once(list))?;
        if networks.is_empty() {
            return Err(Error::operator_argument("ipMatch", "empty address list"));
        }
        Ok(Self { networks })
    }

    /// Build from a file, one address or CIDR per line.
    pub fn from_file(path: &str, search_paths: &[PathBuf]) -> Result<Self> {
        let lines = super::read_list_file(path, search_paths)?;
        let networks = parse_network_list(lines.iter())?;
        if networks.is_empty() {
            return Err(Error::operator_argument("ipMatchFromFile", "empty address file"));
        }
        Ok(Self { networks })
    }

    /// Build from a named dataset.
    pub fn from_dataset(name: &str, datasets: &HashMap<String, Vec<String>>) -> Result<Self> {
        let set = datasets
            .get(name)
            .filter(|set| !set.is_empty())
            .ok_or_else(|| Error::DatasetNotFound {
                name: name.to_string(),
            })?;
        let networks = parse_network_list(set.iter())?;
        Ok(Self { networks })
    }
}

impl Operator for IpMatch {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        match value.parse::<IpAddr>() {
            Ok(ip) => self.networks.iter().any(|net| net.contains(ip)),
            Err(_) => false,
        }
    }

    fn name(&self) -> &'static str {
        "ipMatch"
    }
}

/// DNS blocklist lookup. The octet-reversed address is resolved under the
/// configured zone; any answer means the address is listed. Lookups run on
/// a helper thread and are abandoned after the timeout.
pub struct Rbl {
    service: String,
    timeout: Duration,
}

impl Rbl {
    /// Create a lookup against the given blocklist zone.
    pub fn new(service: &str) -> Self {
        Self {
            service: service.trim_end_matches('.').to_string(),
            timeout: Duration::from_millis(500),
        }
    }
}

impl Operator for Rbl {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        let ip: Ipv4Addr = match value.parse() {
            Ok(ip) => ip,
            Err(_) => return false,
        };
        let o = ip.octets();
        let host = format!("{}.{}.{}.{}.{}", o[3], o[2], o[1], o[0], self.service);

        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let listed = (host.as_str(), 0u16)
                .to_socket_addrs()
                .map(|mut addrs| addrs.next().is_some())
                .unwrap_or(false);
            let _ = sender.send(listed);
        });
        matches!(receiver.recv_timeout(self.timeout), Ok(true))
    }

    fn name(&self) -> &'static str {
        "rbl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RuleGroup, Waf, WafConfig};

    fn test_tx() -> Transaction {
        Waf::new(WafConfig::default(), RuleGroup::new()).new_transaction()
    }

    #[test]
    fn single_address_becomes_host_network() {
        let op = IpMatch::new("192.168.1.1").unwrap();
        let mut tx = test_tx();
        assert!(op.evaluate(&mut tx, "192.168.1.1"));
        assert!(!op.evaluate(&mut tx, "192.168.1.2"));
    }

    #[test]
    fn cidr_and_comma_list() {
        let op = IpMatch::new("10.0.0.0/8,192.168.0.0/16").unwrap();
        let mut tx = test_tx();
        assert!(op.evaluate(&mut tx, "10.1.2.3"));
        assert!(op.evaluate(&mut tx, "192.168.1.1"));
        assert!(!op.evaluate(&mut tx, "172.16.0.1"));
    }

    #[test]
    fn ipv6_host_network() {
        let op = IpMatch::new("2001:db8::1,10.0.0.1").unwrap();
        let mut tx = test_tx();
        assert!(op.evaluate(&mut tx, "2001:db8::1"));
        assert!(!op.evaluate(&mut tx, "2001:db8::2"));
    }

    #[test]
    fn garbage_value_never_matches() {
        let op = IpMatch::new("10.0.0.0/8").unwrap();
        let mut tx = test_tx();
        assert!(!op.evaluate(&mut tx, "not-an-ip"));
    }

    #[test]
    fn invalid_entry_is_a_build_error() {
        assert!(IpMatch::new("10.0.0.0/33").is_err());
        assert!(IpMatch::new("bogus").is_err());
    }

    #[test]
    fn rbl_rejects_non_ip_values() {
        let op = Rbl::new("zen.spamhaus.org");
        let mut tx = test_tx();
        assert!(!op.evaluate(&mut tx, "hostname.example"));
    }
}
