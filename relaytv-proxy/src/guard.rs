//! Upstream target validation (SSRF protection)

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::GatewayError;

/// Reject targets the gateway must never fetch: non-HTTP schemes always,
/// internal hosts when `block_private` is set.
pub fn check_target(url: &Url, block_private: bool) -> Result<(), GatewayError> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err(GatewayError::UnsupportedScheme(url.scheme().to_string()));
    }
    if !block_private {
        return Ok(());
    }

    match url.host() {
        None => Err(GatewayError::InvalidUrl(format!("{url} has no host"))),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if matches!(
                domain.as_str(),
                "localhost" | "metadata.google.internal" | "instance-data"
            ) || domain.ends_with(".localhost")
            {
                return Err(GatewayError::ForbiddenHost(domain));
            }
            Ok(())
        }
        Some(Host::Ipv4(v4)) => reject_private(IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => reject_private(IpAddr::V6(v6)),
    }
}

fn reject_private(ip: IpAddr) -> Result<(), GatewayError> {
    let internal = match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => is_internal_v6(v6),
    };
    if internal {
        Err(GatewayError::ForbiddenHost(ip.to_string()))
    } else {
        Ok(())
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [first, second, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_broadcast()
        || first == 0
        // 100.64.0.0/10, carrier-grade NAT
        || (first == 100 && (second & 0xc0) == 64)
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    // ::ffff:a.b.c.d reaches the embedded IPv4 host
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_internal_v4(v4);
    }
    let head = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || (head & 0xffc0) == 0xfe80
        || (head & 0xfe00) == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(url: &str) -> Result<(), GatewayError> {
        check_target(&Url::parse(url).unwrap(), true)
    }

    #[test]
    fn test_public_hosts_allowed() {
        assert!(check("http://cdn.example.com/a.ts").is_ok());
        assert!(check("https://8.8.8.8/a.m3u8").is_ok());
        assert!(check("http://[::ffff:8.8.8.8]/a.ts").is_ok());
        assert!(check("http://[2001:db8::1]/a.ts").is_ok());
    }

    #[test]
    fn test_internal_hosts_rejected() {
        for url in [
            "http://localhost/a",
            "http://LOCALHOST./a",
            "http://127.0.0.1:8080/a",
            "http://10.0.0.5/a",
            "http://192.168.1.1/a",
            "http://169.254.169.254/latest/meta-data",
            "http://100.64.0.1/a",
            "http://[::1]/a",
            "http://[fd00::1]/a",
            "http://[::ffff:127.0.0.1]/a",
            "http://[::ffff:10.1.2.3]/a",
            "http://[fe80::1]/a",
            "http://0.0.0.0/a",
            "http://metadata.google.internal/",
        ] {
            assert!(
                matches!(check(url), Err(GatewayError::ForbiddenHost(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_scheme_checked_even_when_guard_disabled() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        assert!(matches!(
            check_target(&url, false),
            Err(GatewayError::UnsupportedScheme(_))
        ));
        assert!(check_target(&Url::parse("http://127.0.0.1/").unwrap(), false).is_ok());
    }
}
