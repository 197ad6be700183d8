//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod contacts;
pub mod health;
pub mod users;

use crate::audit::{client_ip, extract_user_agent};
use crate::auth::ClientContext;
use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Caller address and agent for audit records
pub(crate) fn client_context(
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> ClientContext {
    ClientContext {
        ip_address: client_ip(headers, peer.map(|ConnectInfo(addr)| addr)),
        user_agent: extract_user_agent(headers),
    }
}
