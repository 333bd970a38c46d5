//! Classification of inbound headers into a forwarding chain.
//!
//! # Responsibilities
//! - Merge deployment default headers under the request's own headers
//! - Decide whether a request is forwardable at all
//! - Reject partial or inconsistent chains before anything is dispatched
//! - Own the decoded chain and pop one hop at a time
//!
//! # Design Decisions
//! - Three outcomes, not two: "no forwarding requested" is a normal 200,
//!   "forwarding requested but incomplete" is a client error
//! - Per-hop lists must agree on length; a mismatch would silently drop hops

use std::collections::VecDeque;

use axum::http::{HeaderMap, HeaderName};
use thiserror::Error;

use crate::config::HeaderNames;
use crate::forwarding::codec::{decode_lines, HeaderEntry, HeaderSet};

/// Result of inspecting an inbound header set.
#[derive(Debug)]
pub enum Verdict {
    /// None of the per-hop headers are present.
    Unforwardable,
    /// Forwarding was requested but the chain cannot be used.
    Malformed(ChainError),
    /// Complete chain, ready for dispatch.
    Valid(ForwardingChain),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Unforwardable => "unforwardable",
            Verdict::Malformed(_) => "malformed",
            Verdict::Valid(_) => "valid",
        }
    }
}

/// Why a chain was rejected. `Display` is the message sent back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("{}", missing_message(.0))]
    MissingHeaders(Vec<String>),

    #[error("Forwarding headers disagree on hop count: {}", mismatch_message(.0))]
    LengthMismatch(Vec<(String, usize)>),
}

fn missing_message(missing: &[String]) -> String {
    match missing {
        [] => "Missing headers".to_string(),
        [only] => format!("Missing header {}", only),
        [head @ .., last] => format!("Missing headers {} and {}", head.join(", "), last),
    }
}

fn mismatch_message(counts: &[(String, usize)]) -> String {
    counts
        .iter()
        .map(|(name, count)| format!("{} has {}", name, count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One popped hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    /// Base URL; only scheme and authority are used.
    pub target: String,
    /// Query string for this hop, without the leading `?`.
    pub query: String,
    /// Upper-cased HTTP method.
    pub method: String,
}

/// A validated chain of remaining hops plus its fixed metadata.
///
/// Owned by exactly one dispatch task once validated.
#[derive(Debug, Clone)]
pub struct ForwardingChain {
    names: HeaderNames,
    correlation_id: Vec<String>,
    referer: Vec<String>,
    errors_to: Vec<String>,
    targets: VecDeque<String>,
    queries: VecDeque<String>,
    methods: VecDeque<String>,
}

impl ForwardingChain {
    /// Number of hops still to run, this relay's included.
    pub fn remaining_hops(&self) -> usize {
        self.targets.len()
    }

    pub fn correlation_id(&self) -> &str {
        self.correlation_id.first().map(String::as_str).unwrap_or_default()
    }

    pub fn errors_to(&self) -> Option<&str> {
        self.errors_to.first().map(String::as_str)
    }

    pub fn referer(&self) -> Option<&str> {
        self.referer.first().map(String::as_str)
    }

    /// Record the URL of the request being relayed as the next hop's referer.
    pub fn set_referer(&mut self, referer: impl Into<String>) {
        self.referer = vec![referer.into()];
    }

    /// Remove the head of every per-hop list.
    pub fn pop_hop(&mut self) -> Option<Hop> {
        let target = self.targets.pop_front()?;
        let query = self.queries.pop_front().unwrap_or_default();
        let method = self
            .methods
            .pop_front()
            .unwrap_or_default()
            .to_ascii_uppercase();
        Some(Hop {
            target,
            query,
            method,
        })
    }

    /// The chain as headers for the next relay, with whatever is left.
    pub fn to_header_set(&self) -> HeaderSet {
        let list = |items: &VecDeque<String>| HeaderEntry::List(items.iter().cloned().collect());
        let mut set = HeaderSet::new();
        set.insert(
            self.names.correlation_id.clone(),
            HeaderEntry::List(self.correlation_id.clone()),
        );
        set.insert(
            self.names.referer.clone(),
            HeaderEntry::List(self.referer.clone()),
        );
        set.insert(
            self.names.errors_to.clone(),
            HeaderEntry::List(self.errors_to.clone()),
        );
        set.insert(self.names.forward_to.clone(), list(&self.targets));
        set.insert(self.names.query_params.clone(), list(&self.queries));
        set.insert(self.names.method.clone(), list(&self.methods));
        set
    }
}

/// Overlay request headers on deployment defaults; the request wins per name.
pub fn merge_defaults(defaults: &HeaderMap, request: &HeaderMap) -> HeaderMap {
    let mut merged = defaults.clone();
    for name in request.keys() {
        merged.remove(name);
        for value in request.get_all(name) {
            merged.append(name.clone(), value.clone());
        }
    }
    merged
}

fn read_header(headers: &HeaderMap, name: &str) -> Option<Vec<String>> {
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    let lines: Vec<String> = headers
        .get_all(&name)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(decode_lines(lines.iter().map(String::as_str)))
    }
}

/// Classify a (default-merged) header set.
pub fn classify(headers: &HeaderMap, names: &HeaderNames) -> Verdict {
    let mut missing = Vec::new();
    let mut decoded = Vec::with_capacity(6);

    for name in names.all() {
        match read_header(headers, name) {
            Some(values) => decoded.push(values),
            None => {
                missing.push(name.to_string());
                decoded.push(Vec::new());
            }
        }
    }

    let forwarding_absent = names
        .to_forward()
        .iter()
        .all(|name| missing.iter().any(|m| m == name));
    if forwarding_absent {
        return Verdict::Unforwardable;
    }
    if !missing.is_empty() {
        return Verdict::Malformed(ChainError::MissingHeaders(missing));
    }

    let mut decoded = decoded.into_iter();
    let mut next = || decoded.next().unwrap_or_default();
    let (correlation_id, referer, errors_to) = (next(), next(), next());
    let (targets, queries, methods) = (next(), next(), next());

    let counts = [
        (names.forward_to.clone(), targets.len()),
        (names.query_params.clone(), queries.len()),
        (names.method.clone(), methods.len()),
    ];
    if counts.iter().any(|(_, count)| *count != targets.len()) {
        return Verdict::Malformed(ChainError::LengthMismatch(counts.to_vec()));
    }

    Verdict::Valid(ForwardingChain {
        names: names.clone(),
        correlation_id,
        referer,
        errors_to,
        targets: targets.into(),
        queries: queries.into(),
        methods: methods.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forwarding::codec::encode_header_set;
    use axum::http::HeaderValue;

    fn full_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("x-forward-id", "550e8400-e29b-41d4-a716-446655440000"),
            ("x-forward-referer", "ORIGIN"),
            ("x-forward-errors-to", "http://errors.example:12201"),
            ("x-forward-to", "http://a, http://b"),
            ("x-forward-query-params", "x=1, y=2"),
            ("x-forward-method", "post, PUT"),
        ] {
            headers.insert(name, HeaderValue::from_static(value));
        }
        headers
    }

    fn valid(headers: &HeaderMap) -> ForwardingChain {
        match classify(headers, &HeaderNames::default()) {
            Verdict::Valid(chain) => chain,
            other => panic!("expected valid chain, got {:?}", other),
        }
    }

    #[test]
    fn test_no_forwarding_headers_is_unforwardable() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/xml"));
        assert!(matches!(
            classify(&headers, &HeaderNames::default()),
            Verdict::Unforwardable
        ));
    }

    #[test]
    fn test_fixed_headers_alone_are_unforwardable() {
        let mut headers = full_headers();
        headers.remove("x-forward-to");
        headers.remove("x-forward-query-params");
        headers.remove("x-forward-method");
        assert!(matches!(
            classify(&headers, &HeaderNames::default()),
            Verdict::Unforwardable
        ));
    }

    #[test]
    fn test_each_single_missing_header() {
        let names = HeaderNames::default();
        for name in names.all() {
            let mut headers = full_headers();
            headers.remove(name);
            match classify(&headers, &names) {
                Verdict::Malformed(err) => {
                    assert_eq!(err.to_string(), format!("Missing header {}", name));
                }
                other => panic!("{} removed: expected malformed, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_multiple_missing_headers_in_check_order() {
        let mut headers = full_headers();
        headers.remove("x-forward-method");
        headers.remove("x-forward-id");
        headers.remove("x-forward-query-params");
        match classify(&headers, &HeaderNames::default()) {
            Verdict::Malformed(err) => {
                assert_eq!(
                    err,
                    ChainError::MissingHeaders(vec![
                        "X-Forward-Id".into(),
                        "X-Forward-Query-Params".into(),
                        "X-Forward-Method".into(),
                    ])
                );
                assert_eq!(
                    err.to_string(),
                    "Missing headers X-Forward-Id, X-Forward-Query-Params and X-Forward-Method"
                );
            }
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_two_missing_headers_message() {
        let err = ChainError::MissingHeaders(vec!["A".into(), "B".into()]);
        assert_eq!(err.to_string(), "Missing headers A and B");
    }

    #[test]
    fn test_length_mismatch_is_malformed() {
        let mut headers = full_headers();
        headers.insert("x-forward-method", HeaderValue::from_static("POST"));
        match classify(&headers, &HeaderNames::default()) {
            Verdict::Malformed(ChainError::LengthMismatch(counts)) => {
                assert_eq!(counts[0], ("X-Forward-To".to_string(), 2));
                assert_eq!(counts[2], ("X-Forward-Method".to_string(), 1));
            }
            other => panic!("expected length mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_pop_hop_shortens_every_list() {
        let mut chain = valid(&full_headers());
        assert_eq!(chain.remaining_hops(), 2);

        let hop = chain.pop_hop().unwrap();
        assert_eq!(
            hop,
            Hop {
                target: "http://a".into(),
                query: "x=1".into(),
                method: "POST".into(),
            }
        );
        assert_eq!(chain.remaining_hops(), 1);

        let wire = encode_header_set(&chain.to_header_set());
        let get = |name: &str| {
            wire.iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("X-Forward-To"), Some("http://b"));
        assert_eq!(get("X-Forward-Query-Params"), Some("y=2"));
        assert_eq!(get("X-Forward-Method"), Some("PUT"));
        assert_eq!(get("X-Forward-Id"), Some("550e8400-e29b-41d4-a716-446655440000"));
    }

    #[test]
    fn test_last_hop_drops_per_hop_headers() {
        let mut headers = full_headers();
        headers.insert("x-forward-to", HeaderValue::from_static("http://a"));
        headers.insert("x-forward-query-params", HeaderValue::from_static("x=1"));
        headers.insert("x-forward-method", HeaderValue::from_static("POST"));
        let mut chain = valid(&headers);

        chain.pop_hop().unwrap();
        assert!(chain.pop_hop().is_none());

        let wire = encode_header_set(&chain.to_header_set());
        assert!(wire.iter().all(|(name, _)| name != "X-Forward-To"));
        assert!(wire.iter().any(|(name, _)| name == "X-Forward-Errors-To"));
    }

    #[test]
    fn test_fixed_accessors() {
        let mut chain = valid(&full_headers());
        assert_eq!(chain.correlation_id(), "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(chain.errors_to(), Some("http://errors.example:12201"));
        assert_eq!(chain.referer(), Some("ORIGIN"));

        chain.set_referer("http://relay/doc.xml?x=1");
        assert_eq!(chain.referer(), Some("http://relay/doc.xml?x=1"));
    }

    #[test]
    fn test_merge_defaults_request_wins() {
        let mut defaults = HeaderMap::new();
        defaults.insert("x-forward-errors-to", HeaderValue::from_static("http://default:1"));
        defaults.insert("x-served-by", HeaderValue::from_static("relay-1"));

        let merged = merge_defaults(&defaults, &full_headers());
        assert_eq!(merged["x-forward-errors-to"], "http://errors.example:12201");
        assert_eq!(merged["x-served-by"], "relay-1");
        assert_eq!(merged.get_all("x-forward-errors-to").iter().count(), 1);
    }

    #[test]
    fn test_defaults_can_complete_a_chain() {
        let mut request = full_headers();
        request.remove("x-forward-errors-to");
        let mut defaults = HeaderMap::new();
        defaults.insert("x-forward-errors-to", HeaderValue::from_static("http://default:1"));

        let chain = valid(&merge_defaults(&defaults, &request));
        assert_eq!(chain.errors_to(), Some("http://default:1"));
    }

    #[test]
    fn test_repeated_header_lines_form_the_list() {
        let mut headers = full_headers();
        headers.insert("x-forward-query-params", HeaderValue::from_static("a=1, b=2"));
        headers.append("x-forward-query-params", HeaderValue::from_static("c=3"));

        let mut chain = valid(&headers);
        assert_eq!(chain.pop_hop().unwrap().query, "a=1, b=2");
        assert_eq!(chain.pop_hop().unwrap().query, "c=3");
    }
}
