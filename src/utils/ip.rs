//! 客户端 IP 提取
//!
//! 只有来自可信代理的连接才采信 X-Forwarded-For / X-Real-IP。

use std::net::{IpAddr, SocketAddr};

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;
use tracing::trace;

use crate::config::get_config;

pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}

fn parse_peer(peer: &str) -> Option<IpAddr> {
    peer.parse::<SocketAddr>()
        .map(|addr| addr.ip())
        .or_else(|_| peer.parse::<IpAddr>())
        .ok()
}

pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let (Ok(prefix), Ok(network)) = (prefix.parse::<u32>(), network.parse::<IpAddr>()) else {
        return false;
    };

    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) if prefix <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            u32::from(*ip) & mask == u32::from(net) & mask
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) if prefix <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            u128::from(*ip) & mask == u128::from(net) & mask
        }
        _ => false,
    }
}

pub fn is_trusted_proxy(ip: &IpAddr, trusted: &[String]) -> bool {
    trusted.iter().any(|entry| {
        if entry.contains('/') {
            ip_in_cidr(ip, entry)
        } else {
            entry.parse::<IpAddr>().is_ok_and(|addr| addr == *ip)
        }
    })
}

pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
        })
}

/// 显式配置了可信代理时只认列表；否则来自私有地址的连接视为经过反向代理
pub fn resolve_client_ip(
    peer: Option<&str>,
    headers: &HeaderMap,
    trusted: &[String],
) -> Option<String> {
    let peer_raw = peer?;
    let Some(peer_ip) = parse_peer(peer_raw) else {
        return Some(peer_raw.to_string());
    };

    let behind_proxy = if trusted.is_empty() {
        is_private_or_local(&peer_ip)
    } else {
        is_trusted_proxy(&peer_ip, trusted)
    };

    if behind_proxy && let Some(real) = forwarded_ip(headers) {
        trace!("Client IP via proxy {}: {}", peer_ip, real);
        return Some(real);
    }
    Some(peer_ip.to_string())
}

pub fn extract_client_ip(req: &HttpRequest) -> Option<String> {
    let config = get_config();
    let conn = req.connection_info();
    resolve_client_ip(conn.peer_addr(), req.headers(), &config.server.trusted_proxies)
}
