//! Small helpers shared across options analysis and operations

use std::net::{IpAddr, ToSocketAddrs};

use crate::error::OpError;

/// Resolve raw host names to addresses of the requested family.
///
/// Hosts entering the engine must already be resolved; this is the one
/// place names are turned into addresses. Duplicates are rejected since a
/// host doubles as a map key everywhere downstream.
pub fn resolve_raw_hosts_to_addresses(
    raw_hosts: &[String],
    ipv6: bool,
) -> Result<Vec<String>, OpError> {
    let mut addresses = Vec::with_capacity(raw_hosts.len());
    for raw in raw_hosts {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OpError::Precondition {
                op: "resolve hosts".to_string(),
                detail: "empty host name in the host list".to_string(),
            });
        }

        // already an address of the right family
        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            if ip.is_ipv6() == ipv6 {
                push_unique(&mut addresses, ip.to_string())?;
                continue;
            }
        }

        let resolved = (trimmed, 0u16)
            .to_socket_addrs()
            .map_err(|e| OpError::Precondition {
                op: "resolve hosts".to_string(),
                detail: format!("cannot resolve host {}: {}", trimmed, e),
            })?
            .map(|sa| sa.ip())
            .find(|ip| ip.is_ipv6() == ipv6)
            .ok_or_else(|| OpError::Precondition {
                op: "resolve hosts".to_string(),
                detail: format!(
                    "host {} did not resolve to an {} address",
                    trimmed,
                    if ipv6 { "IPv6" } else { "IPv4" }
                ),
            })?;
        push_unique(&mut addresses, resolved.to_string())?;
    }
    Ok(addresses)
}

fn push_unique(addresses: &mut Vec<String>, addr: String) -> Result<(), OpError> {
    if addresses.contains(&addr) {
        return Err(OpError::Precondition {
            op: "resolve hosts".to_string(),
            detail: format!("host list contains duplicate address {}", addr),
        });
    }
    addresses.push(addr);
    Ok(())
}

/// Normalize a prefix path: trim whitespace and any trailing slash.
pub fn clean_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.len() > 1 {
        trimmed.trim_end_matches('/').to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn is_absolute_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Validate a path that operations will hand to the node-management agent.
pub fn validate_required_abs_path(path: &str, label: &str) -> Result<(), OpError> {
    if path.is_empty() {
        return Err(OpError::Precondition {
            op: "validate options".to_string(),
            detail: format!("{} must be specified", label),
        });
    }
    if !is_absolute_path(path) {
        return Err(OpError::Precondition {
            op: "validate options".to_string(),
            detail: format!("{} must be an absolute path, got {}", label, path),
        });
    }
    Ok(())
}

/// Database and node names: alphanumerics plus underscore, starting with a
/// letter or underscore.
pub fn validate_name(name: &str, label: &str) -> Result<(), OpError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_tail = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_head || !valid_tail {
        return Err(OpError::Precondition {
            op: "validate options".to_string(),
            detail: format!("invalid character in {} name {}", label, name),
        });
    }
    Ok(())
}

/// Password auth requires a username.
pub fn validate_username_and_password(
    op_name: &str,
    use_password: bool,
    username: &str,
) -> Result<(), OpError> {
    if use_password && username.is_empty() {
        return Err(OpError::Precondition {
            op: op_name.to_string(),
            detail: "empty username for password authentication".to_string(),
        });
    }
    Ok(())
}

/// Loopback addresses count as local; the engine may run off-cluster, in
/// which case no host is local and the caller falls back to the first host.
pub fn is_local_host(host: &str) -> bool {
    host.parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

/// Elements of `all` that are not in `exclude`, preserving order.
pub fn slice_diff(all: &[String], exclude: &[String]) -> Vec<String> {
    all.iter()
        .filter(|h| !exclude.contains(h))
        .cloned()
        .collect()
}

/// Elements of `a` that are also in `b`, preserving `a`'s order.
pub fn slice_common(a: &[String], b: &[String]) -> Vec<String> {
    a.iter().filter(|h| b.contains(h)).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_addresses_pass_through() {
        let hosts = vec!["192.168.1.101".to_string(), "192.168.1.102".to_string()];
        let resolved = resolve_raw_hosts_to_addresses(&hosts, false).expect("should resolve");
        assert_eq!(resolved, hosts);
    }

    #[test]
    fn test_duplicate_hosts_rejected() {
        let hosts = vec!["10.0.0.1".to_string(), "10.0.0.1".to_string()];
        assert!(resolve_raw_hosts_to_addresses(&hosts, false).is_err());
    }

    #[test]
    fn test_clean_path_trims_trailing_slash() {
        assert_eq!(clean_path("/data/db/"), "/data/db");
        assert_eq!(clean_path("  /data "), "/data");
        assert_eq!(clean_path("/"), "/");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("practice_db", "database").is_ok());
        assert!(validate_name("_hidden", "database").is_ok());
        assert!(validate_name("9lives", "database").is_err());
        assert!(validate_name("bad-name", "database").is_err());
        assert!(validate_name("", "database").is_err());
    }

    #[test]
    fn test_slice_helpers() {
        let all = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let some = vec!["b".to_string()];
        assert_eq!(slice_diff(&all, &some), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(slice_common(&all, &some), vec!["b".to_string()]);
    }

    #[test]
    fn test_is_local_host() {
        assert!(is_local_host("127.0.0.1"));
        assert!(is_local_host("::1"));
        assert!(!is_local_host("192.168.1.10"));
    }
}
