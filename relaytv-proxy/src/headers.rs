//! Header policy shared by the upstream request and the relayed response
//!
//! One table names every header the gateway cares about and what happens to
//! it in each direction. Headers missing from the table are dropped.

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderAction {
    /// Copied unchanged
    Forward,
    /// Never copied
    Drop,
    /// Set by the gateway itself
    Override,
}

#[derive(Debug, Clone, Copy)]
pub struct HeaderRule {
    pub name: &'static str,
    pub request: HeaderAction,
    pub response: HeaderAction,
}

const fn rule(name: &'static str, request: HeaderAction, response: HeaderAction) -> HeaderRule {
    HeaderRule {
        name,
        request,
        response,
    }
}

use HeaderAction::{Drop, Forward, Override};

pub const HEADER_RULES: &[HeaderRule] = &[
    rule("range", Forward, Drop),
    rule("user-agent", Override, Drop),
    rule("host", Drop, Drop),
    rule("connection", Drop, Drop),
    rule("accept-encoding", Drop, Drop),
    rule("content-type", Drop, Override),
    rule("content-length", Drop, Forward),
    rule("accept-ranges", Drop, Forward),
    rule("content-range", Drop, Forward),
    rule("etag", Drop, Forward),
    rule("last-modified", Drop, Forward),
    rule("date", Drop, Forward),
    rule("access-control-allow-origin", Drop, Override),
];

fn lookup(name: &HeaderName) -> Option<&'static HeaderRule> {
    HEADER_RULES.iter().find(|r| r.name == name.as_str())
}

#[must_use]
pub fn request_action(name: &HeaderName) -> HeaderAction {
    lookup(name).map_or(Drop, |r| r.request)
}

#[must_use]
pub fn response_action(name: &HeaderName) -> HeaderAction {
    lookup(name).map_or(Drop, |r| r.response)
}

/// Headers sent upstream for one inbound request
#[must_use]
pub fn upstream_request_headers(inbound: &HeaderMap, user_agent: &HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        if request_action(name) == Forward {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(USER_AGENT, user_agent.clone());
    headers
}

/// Upstream response headers that pass through unchanged
#[must_use]
pub fn forwarded_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if response_action(name) == Forward {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{ACCEPT_ENCODING, CONTENT_TYPE, COOKIE, ETAG, HOST, RANGE, SET_COOKIE};

    #[test]
    fn test_request_side() {
        let mut inbound = HeaderMap::new();
        inbound.insert(RANGE, HeaderValue::from_static("bytes=0-99"));
        inbound.insert(HOST, HeaderValue::from_static("gateway.local"));
        inbound.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        inbound.insert(COOKIE, HeaderValue::from_static("session=abc"));
        inbound.insert(USER_AGENT, HeaderValue::from_static("curl/8"));

        let ua = HeaderValue::from_static("Mozilla/5.0");
        let headers = upstream_request_headers(&inbound, &ua);

        assert_eq!(headers.get(RANGE).unwrap(), "bytes=0-99");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "Mozilla/5.0");
        assert!(headers.get(HOST).is_none());
        assert!(headers.get(ACCEPT_ENCODING).is_none());
        assert!(headers.get(COOKIE).is_none());
    }

    #[test]
    fn test_response_side() {
        let mut upstream = HeaderMap::new();
        upstream.insert(ETAG, HeaderValue::from_static("\"v1\""));
        upstream.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        upstream.insert(SET_COOKIE, HeaderValue::from_static("tracking=1"));

        let headers = forwarded_response_headers(&upstream);
        assert_eq!(headers.get(ETAG).unwrap(), "\"v1\"");
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert!(headers.get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_table_names_are_lowercase() {
        for rule in HEADER_RULES {
            assert_eq!(rule.name, rule.name.to_ascii_lowercase());
        }
    }
}
