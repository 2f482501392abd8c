use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::proto::error::{Error, Result};

/// Address of a server node.
///
/// Two addresses are equal when host and port match; the optional alias
/// (`"master"`, a node id, ...) is informational only.
#[derive(Debug, Clone)]
pub struct NodeAddr {
    host: String,
    port: u16,
    alias: Option<String>,
}

impl NodeAddr {
    /// Creates an address from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            alias: None,
        }
    }

    /// Attaches an alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Parses `host:port`, `[ipv6]:port` or `redis://host:port`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s
            .strip_prefix("redis://")
            .or_else(|| s.strip_prefix("rediss://"))
            .unwrap_or(s);
        let s = s.trim_end_matches('/');

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_argument(format!("missing port in address '{}'", s)))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(Error::invalid_argument(format!(
                "missing host in address '{}'",
                s
            )));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::invalid_argument(format!("invalid port in address '{}'", s)))?;

        Ok(Self::new(host, port))
    }

    /// Host name or IP.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Optional alias.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// `host:port` form suitable for connecting (IPv6 hosts are bracketed).
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl PartialEq for NodeAddr {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for NodeAddr {}

impl Hash for NodeAddr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

impl FromStr for NodeAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_host_port() {
        let addr = NodeAddr::parse("127.0.0.1:7000").unwrap();
        assert_eq!(addr.host(), "127.0.0.1");
        assert_eq!(addr.port(), 7000);
        assert_eq!(addr.to_string(), "127.0.0.1:7000");
    }

    #[test]
    fn test_parse_with_scheme_and_ipv6() {
        let addr = NodeAddr::parse("redis://localhost:6379").unwrap();
        assert_eq!(addr.host(), "localhost");

        let addr = NodeAddr::parse("[2001:db8::1]:6379").unwrap();
        assert_eq!(addr.host(), "2001:db8::1");
        assert_eq!(addr.address(), "[2001:db8::1]:6379");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(NodeAddr::parse("localhost").is_err());
        assert!(NodeAddr::parse(":6379").is_err());
        assert!(NodeAddr::parse("localhost:notaport").is_err());
    }

    #[test]
    fn test_equality_ignores_alias() {
        let a = NodeAddr::new("10.0.0.1", 6379).with_alias("master");
        let b = NodeAddr::new("10.0.0.1", 6379);
        assert_eq!(a, b);
        assert_eq!(a.alias(), Some("master"));

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
