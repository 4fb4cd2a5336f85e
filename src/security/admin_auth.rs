//! Gate for destructive admin routes
//!
//! A request passes only when
//! 1. it comes from loopback or an allowed network (403 otherwise)
//! 2. it carries `Authorization: Bearer <ADMIN_TOKEN>` (401 otherwise)
//!
//! The routes themselves are only mounted when a token is configured.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use ipnetwork::IpNetwork;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AdminGate {
    token: String,
    allowed_networks: Vec<IpNetwork>,
}

impl AdminGate {
    /// `None` when no admin token is configured
    pub fn new(token: Option<String>, allowed_networks: Vec<IpNetwork>) -> Option<Self> {
        token.filter(|t| !t.is_empty()).map(|token| Self {
            token,
            allowed_networks,
        })
    }

    fn admits_ip(&self, ip: IpAddr) -> bool {
        ip.is_loopback() || self.allowed_networks.iter().any(|n| n.contains(ip))
    }

    fn admits_token(&self, headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .is_some_and(|presented| constant_time_eq(presented.as_bytes(), self.token.as_bytes()))
    }
}

pub async fn require_admin(
    State(gate): State<Arc<AdminGate>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let source_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());

    let Some(source_ip) = source_ip else {
        warn!("Admin request without a known peer address");
        return Err(StatusCode::FORBIDDEN);
    };

    if !gate.admits_ip(source_ip) {
        warn!("Admin request from disallowed IP: {}", source_ip);
        return Err(StatusCode::FORBIDDEN);
    }

    if !gate.admits_token(req.headers()) {
        warn!("Admin request with missing or invalid token from IP: {}", source_ip);
        return Err(StatusCode::UNAUTHORIZED);
    }

    info!("Admin request authorized from IP: {}", source_ip);
    Ok(next.run(req).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
