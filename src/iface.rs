//! IP classification and host interface scanning.
//!
//! The instance-data DNS zone answers with the private IPv4 addresses of the
//! host's `eth*`/`eno*` interfaces, unless a static override is configured.
//! Discovery happens once at startup; interface changes are not observed
//! while the process runs.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use pnet::datalink;
use tracing::{info, warn};

use crate::error::ConfigError;

/// Interface name prefixes considered for instance-data addresses.
pub const DATA_IFACE_PREFIXES: &[&str] = &["eth", "eno"];

/// Split a list of textual IPs into IPv4 and IPv6 buckets, preserving
/// the input order within each bucket.
///
/// Unparsable and unspecified (`0.0.0.0`, `::`) entries are rejected.
pub fn split_ips(ips: &[String]) -> Result<(Vec<Ipv4Addr>, Vec<Ipv6Addr>), ConfigError> {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();

    for raw in ips {
        let ip: IpAddr = raw
            .parse()
            .map_err(|_| ConfigError::InvalidIp { value: raw.clone() })?;

        if ip.is_unspecified() {
            return Err(ConfigError::UnspecifiedIp { value: raw.clone() });
        }

        match ip {
            IpAddr::V4(ip) => v4.push(ip),
            IpAddr::V6(ip) => v6.push(ip),
        }
    }

    Ok((v4, v6))
}

/// Determine the IPv4 addresses the `instance-data.` zone answers with.
///
/// With an override configured the result is exactly `[override]`; the
/// override must be a specified IPv4 address. Without one, the host's
/// interfaces are scanned. The result may be empty.
pub fn discover_data_ips(override_ip: Option<IpAddr>) -> Result<Vec<Ipv4Addr>, ConfigError> {
    if let Some(ip) = override_ip {
        return match ip {
            IpAddr::V4(v4) if !v4.is_unspecified() => Ok(vec![v4]),
            _ => Err(ConfigError::InvalidDataIp {
                value: ip.to_string(),
            }),
        };
    }

    let ifaces = datalink::interfaces()
        .into_iter()
        .map(|iface| (iface.name, iface.ips.iter().map(|net| net.ip()).collect()));

    Ok(collect_private_v4(ifaces))
}

/// Keep the private IPv4 addresses of allow-listed interfaces, in
/// enumeration order. Everything else is logged and skipped, never fatal.
pub fn collect_private_v4<I>(ifaces: I) -> Vec<Ipv4Addr>
where
    I: IntoIterator<Item = (String, Vec<IpAddr>)>,
{
    let mut out = Vec::new();

    for (name, addrs) in ifaces {
        if !DATA_IFACE_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
        {
            info!(iface = %name, "skip iface");
            continue;
        }

        if addrs.is_empty() {
            info!(iface = %name, "skip iface without addresses");
            continue;
        }

        for addr in addrs {
            let IpAddr::V4(ip) = addr else {
                warn!(iface = %name, ip = %addr, "skip non-v4 IP");
                continue;
            };

            if !ip.is_private() {
                warn!(iface = %name, ip = %ip, "skip non-private IP");
                continue;
            }

            info!(iface = %name, ip = %ip, "use IP for instance-data");
            out.push(ip);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ip(s: &str) -> IpAddr {
        IpAddr::from_str(s).unwrap()
    }

    #[test]
    fn should_split_ips_by_family_preserving_order() {
        let input = vec![
            "169.254.169.254".to_string(),
            "fd00:ec2::254".to_string(),
            "10.0.0.1".to_string(),
        ];

        let (v4, v6) = split_ips(&input).unwrap();

        assert_eq!(
            v4,
            vec![
                Ipv4Addr::new(169, 254, 169, 254),
                Ipv4Addr::new(10, 0, 0, 1)
            ]
        );
        assert_eq!(v6, vec![Ipv6Addr::from_str("fd00:ec2::254").unwrap()]);
    }

    #[test]
    fn should_reject_unparsable_ip() {
        let input = vec!["not-an-ip".to_string()];
        assert!(matches!(
            split_ips(&input),
            Err(ConfigError::InvalidIp { .. })
        ));
    }

    #[test]
    fn should_reject_unspecified_ips() {
        for raw in ["0.0.0.0", "::"] {
            let input = vec![raw.to_string()];
            assert!(matches!(
                split_ips(&input),
                Err(ConfigError::UnspecifiedIp { .. })
            ));
        }
    }

    #[test]
    fn should_keep_only_private_v4_of_allowed_ifaces() {
        let ifaces = vec![
            (
                "eth0".to_string(),
                vec![ip("10.0.0.5"), ip("8.8.8.8"), ip("fd00::1")],
            ),
            ("wlan0".to_string(), vec![ip("192.168.1.2")]),
            ("eno1".to_string(), vec![ip("172.16.0.9")]),
            ("lo".to_string(), vec![ip("127.0.0.1")]),
        ];

        let out = collect_private_v4(ifaces);

        assert_eq!(
            out,
            vec![Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(172, 16, 0, 9)]
        );
    }

    #[test]
    fn should_return_empty_when_no_iface_qualifies() {
        let ifaces = vec![
            ("wlan0".to_string(), vec![ip("192.168.1.2")]),
            ("eth0".to_string(), vec![]),
        ];

        assert!(collect_private_v4(ifaces).is_empty());
    }

    #[test]
    fn should_prefer_override_over_interfaces() {
        let out = discover_data_ips(Some(ip("10.1.2.3"))).unwrap();
        assert_eq!(out, vec![Ipv4Addr::new(10, 1, 2, 3)]);
    }

    #[test]
    fn should_reject_non_v4_override() {
        assert!(matches!(
            discover_data_ips(Some(ip("fd00::1"))),
            Err(ConfigError::InvalidDataIp { .. })
        ));
    }

    #[test]
    fn should_reject_unspecified_override() {
        assert!(matches!(
            discover_data_ips(Some(ip("0.0.0.0"))),
            Err(ConfigError::InvalidDataIp { .. })
        ));
    }
}
