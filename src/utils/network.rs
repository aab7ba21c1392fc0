//! Network utilities
//!
//! Address text helpers shared by the listener, the connector and the FTP
//! data-channel negotiator.

use std::net::{IpAddr, Ipv4Addr};

/// Renders an address as text, turning IPv4-mapped IPv6 addresses
/// (`::ffff:a.b.c.d`) into plain dotted IPv4.
pub fn normalize_ip(ip: IpAddr) -> String {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        IpAddr::V4(v4) => v4.to_string(),
    }
}

/// Parses dotted IPv4 text, accepting the IPv4-mapped IPv6 form as well.
pub fn parse_ipv4(text: &str) -> Option<Ipv4Addr> {
    match text.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ip() {
        let mapped: IpAddr = "::ffff:192.168.0.20".parse().unwrap();
        assert_eq!(normalize_ip(mapped), "192.168.0.20");

        let v6: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(normalize_ip(v6), "fe80::1");

        let v4: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(normalize_ip(v4), "10.0.0.5");
    }

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4("10.0.0.5"), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(parse_ipv4("::ffff:10.0.0.5"), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(parse_ipv4("fe80::1"), None);
        assert_eq!(parse_ipv4("not an address"), None);
    }
}
