//! Network peer attribute helpers.

use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::{NETWORK_PEER_ADDRESS, NETWORK_PEER_PORT};

/// Splits a `host:port` string without allocating.
///
/// Unlike `std::net::SocketAddr` parsing, this never fails: a value with
/// no port, a bracketed IPv6 literal, or a non-numeric tail comes back as
/// a host with no port. Brackets around an IPv6 host are stripped.
pub fn split_host_port(host_port: &str) -> (&str, Option<u16>) {
    let bytes = host_port.as_bytes();
    let mut port: u32 = 0;
    let mut multiplier: u32 = 1;

    for idx in (0..bytes.len()).rev() {
        let ch = bytes[idx];
        if ch == b':' {
            let host = strip_brackets(&host_port[..idx]);
            let port = u16::try_from(port).ok().filter(|p| *p > 0);
            return (host, port);
        }
        if ch.is_ascii_digit() {
            port = port.saturating_add(u32::from(ch - b'0').saturating_mul(multiplier));
            multiplier = multiplier.saturating_mul(10);
            if port > u32::from(u16::MAX) {
                return (host_port, None);
            }
        } else {
            return (host_port, None);
        }
    }

    ("", u16::try_from(port).ok().filter(|p| *p > 0))
}

fn strip_brackets(host: &str) -> &str {
    if host.len() > 2 && host.starts_with('[') && host.ends_with(']') {
        &host[1..host.len() - 1]
    } else {
        host
    }
}

/// Appends `network.peer.address` and `network.peer.port` attributes for a
/// connection's remote `host:port`, per the network semantic conventions.
pub fn append_net_peer_attrs(attrs: &mut Vec<KeyValue>, host_port: &str) {
    let (host, port) = split_host_port(host_port);
    if !host.is_empty() {
        attrs.push(KeyValue::new(NETWORK_PEER_ADDRESS, host.to_owned()));
    }
    if let Some(port) = port {
        attrs.push(KeyValue::new(NETWORK_PEER_PORT, i64::from(port)));
    }
}
