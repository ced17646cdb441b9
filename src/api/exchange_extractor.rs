use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{request::Parts, HeaderMap, StatusCode},
};
use std::collections::BTreeMap;

use crate::model::Exchange;

/// Headers never exposed to transformer scripts
const HIDDEN_HEADERS: &[&str] = &["authorization", "proxy-authorization", "cookie"];

/// Axum extractor for the HTTP-level [`Exchange`] handed to scripts
///
/// Captures the request path, the decoded query string and the request headers,
/// minus credentials. A query string that cannot be decoded is rejected with 400.
#[async_trait]
impl<S> FromRequestParts<S> for Exchange
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|_| StatusCode::BAD_REQUEST)?;

        Ok(Exchange {
            path: parts.uri.path().to_string(),
            query,
            headers: visible_headers(&parts.headers),
        })
    }
}

fn visible_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !HIDDEN_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
