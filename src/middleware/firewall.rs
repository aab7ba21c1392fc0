//! Firewall middleware
//!
//! Connection filtering applied by listeners before a session is started.

use std::sync::Arc;

/// Decides whether a connection from `client_ip` to `server_ip` is accepted.
/// Both addresses are in normalised text form.
pub type Firewall = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Builds a firewall that only accepts clients matching one of `patterns`.
///
/// A pattern is either a full address or a prefix ending in `*`
/// (`192.168.1.*`). An empty list means no firewall at all.
pub fn allow_list(patterns: &[String]) -> Option<Firewall> {
    if patterns.is_empty() {
        return None;
    }
    let patterns: Vec<String> = patterns.to_vec();
    Some(Arc::new(move |client_ip: &str, _server_ip: &str| {
        patterns.iter().any(|pattern| matches(pattern, client_ip))
    }))
}

fn matches(pattern: &str, ip: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => ip.starts_with(prefix),
        None => pattern == ip,
    }
}
