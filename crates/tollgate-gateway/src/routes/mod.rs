//! HTTP route handlers.

pub mod admin;
pub mod api_keys;
pub mod health;
pub mod protected;
pub mod token;
pub mod users;

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use tollgate_core::{Credentials, EndpointPolicy, Identity};

use crate::error::ApiError;
use crate::AppState;

/// Header carrying service API keys.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header set by reverse proxies with the originating client first.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Extract credentials from request headers.
pub fn credentials(headers: &HeaderMap) -> Credentials {
    let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    Credentials::from_headers(value("authorization"), value(API_KEY_HEADER))
}

/// Run the full access control chain for a request.
pub(crate) fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    policy: &EndpointPolicy,
) -> Result<Identity, ApiError> {
    Ok(state.gateway.authorize(&credentials(headers), policy)?)
}

/// Address used to rate limit unauthenticated requests.
///
/// The first `X-Forwarded-For` entry wins over the peer address. Without
/// either, every client shares the `unknown` bucket.
pub fn client_address(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(addr), _) => addr.to_string(),
        (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_address() {
        let peer = ConnectInfo(SocketAddr::from(([192, 0, 2, 10], 41000)));
        let mut headers = HeaderMap::new();
        assert_eq!(client_address(&headers, Some(&peer)), "192.0.2.10");
        assert_eq!(client_address(&headers, None), "unknown");

        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"),
        );
        assert_eq!(client_address(&headers, Some(&peer)), "203.0.113.7");

        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static(" "));
        assert_eq!(client_address(&headers, Some(&peer)), "192.0.2.10");
    }
}
