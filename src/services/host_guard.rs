//! Upstream host policy for the relay proxy
//!
//! With an `ALLOWED_HOSTS` list, only those domains (and their subdomains)
//! are relayed. Without one, any public host is relayed and loopback,
//! private, link-local and unspecified addresses are refused.

use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// `host` is `domain` itself or one of its subdomains
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .map_or(false, |rest| rest.ends_with('.'))
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0xc0) == 64))
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(v4);
    }
    let first = ip.segments()[0];
    !(ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80) // link-local
}

#[derive(Debug, Clone, Default)]
pub struct HostGuard {
    allowed: Vec<String>,
}

impl HostGuard {
    pub fn new(allowed: &[String]) -> Self {
        Self {
            allowed: allowed
                .iter()
                .map(|h| h.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, url: &Url) -> bool {
        let Some(host) = url.host() else {
            return false;
        };

        if !self.allowed.is_empty() {
            let name = match host {
                Host::Domain(domain) => domain.to_ascii_lowercase(),
                Host::Ipv4(ip) => ip.to_string(),
                Host::Ipv6(ip) => ip.to_string(),
            };
            return self.allowed.iter().any(|domain| host_matches(&name, domain));
        }

        match host {
            Host::Domain(domain) => {
                let domain = domain.to_ascii_lowercase();
                !host_matches(&domain, "localhost")
            }
            Host::Ipv4(ip) => is_public_v4(ip),
            Host::Ipv6(ip) => is_public_v6(ip),
        }
    }

    /// Unparseable URLs are refused
    pub fn allows_str(&self, url: &str) -> bool {
        Url::parse(url).map(|u| self.allows(&u)).unwrap_or(false)
    }
}
