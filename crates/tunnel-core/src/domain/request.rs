//! The proxied HTTP request and the rules for replaying it locally.
//!
//! A [`ProxiedRequest`] is the validated form of an inbound `request` event.
//! It knows how to build the local target URL and which relay headers may be
//! forwarded to the local service.

use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::protocol::error::ProtocolError;

/// Headers that are never copied from the relay onto the local call.
///
/// The entity length is recomputed by the HTTP layer from the actual body.
/// Names are compared case-insensitively.
pub const EXCLUDED_FORWARD_HEADERS: &[&str] = &["content-length"];

/// Header carrying the public scheme the original client used.
pub const FORWARDED_PROTO_HEADER: &str = "X-Forwarded-Proto";

/// Returns `true` if a relay-supplied header may be forwarded to the local call.
pub fn is_forwardable_header(name: &str) -> bool {
    !EXCLUDED_FORWARD_HEADERS
        .iter()
        .any(|excluded| excluded.eq_ignore_ascii_case(name))
}

// ── RequestId ─────────────────────────────────────────────────────────────────

/// Relay-assigned correlation id of one proxied request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl RequestId {
    /// Parses an id from a JSON value.
    ///
    /// Integers are accepted as-is; strings are accepted when they hold a
    /// decimal integer (the relay has historically sent both).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] for `null` and
    /// [`ProtocolError::NonNumericId`] for anything that is not an integer.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ProtocolError> {
        match value {
            serde_json::Value::Null => Err(ProtocolError::MissingField("id")),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(RequestId)
                .ok_or_else(|| ProtocolError::NonNumericId(n.to_string())),
            serde_json::Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(RequestId)
                .map_err(|_| ProtocolError::NonNumericId(s.clone())),
            other => Err(ProtocolError::NonNumericId(other.to_string())),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── HttpMethod ────────────────────────────────────────────────────────────────

/// The HTTP methods the relay may ask the client to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl HttpMethod {
    /// Canonical upper-case method token.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }

    /// Whether a call with this method carries the request body.
    pub fn carries_body(self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl FromStr for HttpMethod {
    type Err = ProtocolError;

    /// Exact, case-sensitive match.  `get` or `DELETE` are rejected rather
    /// than coerced.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            other => Err(ProtocolError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── OrderedMap ────────────────────────────────────────────────────────────────

/// A string-to-string map that keeps insertion order.
///
/// Used for request headers, query parameters and response headers, which
/// all travel as JSON objects whose key order is meaningful to the reader.
/// Inserting an existing key replaces its value in place (last value wins).
///
/// Backed by `serde_json::Map`, which keeps insertion order under the
/// `preserve_order` feature and indexes keys by hash.  Values are always
/// JSON strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedMap(serde_json::Map<String, Value>);

impl OrderedMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), Value::String(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Case-insensitive lookup, for header names.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.as_str(), v)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OrderedMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for OrderedMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedMapVisitor;

        impl<'de> Visitor<'de> for OrderedMapVisitor {
            type Value = OrderedMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = OrderedMap::new();
                while let Some((k, v)) = access.next_entry::<String, String>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedMapVisitor)
    }
}

// ── ProxiedRequest ────────────────────────────────────────────────────────────

/// A validated inbound `request` event.
///
/// Created when the relay asks for a request to be replayed; lives until the
/// local call completes or is cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxiedRequest {
    pub id: RequestId,
    pub method: HttpMethod,
    /// Path relative to the local base URL, e.g. `/rest/items/Kitchen_Light`.
    pub path: String,
    pub query: OrderedMap,
    pub headers: OrderedMap,
    pub body: Vec<u8>,
    /// Public scheme declared by the relay for this request, if any.
    pub protocol: Option<String>,
}

impl ProxiedRequest {
    /// Builds the local URL this request is replayed against.
    ///
    /// `local_base` and `path` are joined with exactly one `/`.  Query values
    /// are percent-encoded one by one and joined with `&`; keys are copied
    /// verbatim.  No `?` is appended for an empty query.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tunnel_core::{HttpMethod, OrderedMap, ProxiedRequest, RequestId};
    ///
    /// let req = ProxiedRequest {
    ///     id: RequestId(1),
    ///     method: HttpMethod::Get,
    ///     path: "/rest/items".to_string(),
    ///     query: [("type", "Switch Item")].into_iter().collect(),
    ///     headers: OrderedMap::new(),
    ///     body: Vec::new(),
    ///     protocol: None,
    /// };
    /// assert_eq!(
    ///     req.target_url("http://localhost:8080/"),
    ///     "http://localhost:8080/rest/items?type=Switch%20Item"
    /// );
    /// ```
    pub fn target_url(&self, local_base: &str) -> String {
        let mut url = format!(
            "{}/{}",
            local_base.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        if !self.query.is_empty() {
            let query = self
                .query
                .iter()
                .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url
    }

    /// Relay headers that may be copied onto the local call, in wire order.
    pub fn forwarded_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .filter(|(name, _)| is_forwardable_header(name))
    }

    /// The scheme to announce in `X-Forwarded-Proto`: the request's own
    /// declaration if present, else `session_scheme`.
    pub fn forwarded_proto<'a>(&'a self, session_scheme: &'a str) -> &'a str {
        self.protocol
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(session_scheme)
    }

    /// Body bytes to attach to the local call; `None` for GET.
    pub fn call_body(&self) -> Option<&[u8]> {
        self.method.carries_body().then_some(self.body.as_slice())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(path: &str, query: OrderedMap) -> ProxiedRequest {
        ProxiedRequest {
            id: RequestId(1),
            method: HttpMethod::Get,
            path: path.to_string(),
            query,
            headers: OrderedMap::new(),
            body: Vec::new(),
            protocol: None,
        }
    }

    #[test]
    fn test_request_id_accepts_integer_and_decimal_string() {
        assert_eq!(RequestId::from_json(&json!(7)).unwrap(), RequestId(7));
        assert_eq!(RequestId::from_json(&json!("42")).unwrap(), RequestId(42));
    }

    #[test]
    fn test_request_id_rejects_non_numeric_values() {
        assert!(matches!(
            RequestId::from_json(&json!("abc")),
            Err(ProtocolError::NonNumericId(_))
        ));
        assert!(matches!(
            RequestId::from_json(&json!(1.5)),
            Err(ProtocolError::NonNumericId(_))
        ));
        assert!(matches!(
            RequestId::from_json(&json!({"n": 1})),
            Err(ProtocolError::NonNumericId(_))
        ));
        assert_eq!(
            RequestId::from_json(&serde_json::Value::Null),
            Err(ProtocolError::MissingField("id"))
        );
    }

    #[test]
    fn test_method_parse_is_exact() {
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("POST".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!("PUT".parse::<HttpMethod>().unwrap(), HttpMethod::Put);
        // Lower case and other verbs are rejected, never coerced.
        assert!("get".parse::<HttpMethod>().is_err());
        assert_eq!(
            "DELETE".parse::<HttpMethod>(),
            Err(ProtocolError::UnsupportedMethod("DELETE".to_string()))
        );
    }

    #[test]
    fn test_target_url_joins_with_single_slash() {
        let req = request("/rest/items/Kitchen_Light", OrderedMap::new());
        assert_eq!(
            req.target_url("http://localhost:8080/"),
            "http://localhost:8080/rest/items/Kitchen_Light"
        );
        assert_eq!(
            req.target_url("http://localhost:8080"),
            "http://localhost:8080/rest/items/Kitchen_Light"
        );
    }

    #[test]
    fn test_target_url_encodes_values_but_not_keys() {
        let query: OrderedMap = [("a b", "x&y"), ("z", "1/2")].into_iter().collect();
        let req = request("/p", query);
        assert_eq!(
            req.target_url("http://h"),
            "http://h/p?a b=x%26y&z=1%2F2"
        );
    }

    #[test]
    fn test_target_url_keeps_query_order() {
        let query: OrderedMap = [("b", "2"), ("a", "1")].into_iter().collect();
        let req = request("/p", query);
        assert_eq!(req.target_url("http://h"), "http://h/p?b=2&a=1");
    }

    #[test]
    fn test_content_length_is_never_forwarded() {
        let mut req = request("/p", OrderedMap::new());
        req.headers = [
            ("Accept", "application/json"),
            ("Content-Length", "999"),
            ("X-Custom", "1"),
        ]
        .into_iter()
        .collect();

        let forwarded: Vec<_> = req.forwarded_headers().collect();

        assert_eq!(forwarded, vec![("Accept", "application/json"), ("X-Custom", "1")]);
    }

    #[test]
    fn test_forwarded_proto_prefers_event_protocol() {
        let mut req = request("/p", OrderedMap::new());
        assert_eq!(req.forwarded_proto("https"), "https");
        req.protocol = Some("http".to_string());
        assert_eq!(req.forwarded_proto("https"), "http");
        req.protocol = Some(String::new());
        assert_eq!(req.forwarded_proto("https"), "https");
    }

    #[test]
    fn test_get_carries_no_body() {
        let mut req = request("/p", OrderedMap::new());
        req.body = b"ignored".to_vec();
        assert_eq!(req.call_body(), None);
        req.method = HttpMethod::Put;
        assert_eq!(req.call_body(), Some(&b"ignored"[..]));
    }

    #[test]
    fn test_ordered_map_insert_replaces_in_place() {
        let mut map = OrderedMap::new();
        map.insert("a", "1");
        map.insert("b", "2");
        map.insert("a", "3");
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(entries, vec![("a", "3"), ("b", "2")]);
        assert_eq!(map.get_ignore_case("A"), Some("3"));
    }

    #[test]
    fn test_ordered_map_large_header_set_keeps_order_and_replaces() {
        // Arrange
        let mut map: OrderedMap = (0..2_000).map(|n| (format!("X-H{n}"), n.to_string())).collect();

        // Act
        map.insert("X-H0", "first");
        map.insert("X-H1999", "last");

        // Assert
        assert_eq!(map.len(), 2_000);
        let keys: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys.first(), Some(&"X-H0"));
        assert_eq!(keys.last(), Some(&"X-H1999"));
        assert_eq!(map.get("X-H0"), Some("first"));
        assert_eq!(map.get("X-H1000"), Some("1000"));
        assert_eq!(map.get("X-H1999"), Some("last"));
    }

    #[test]
    fn test_ordered_map_deserializes_in_wire_order() {
        let map: OrderedMap = serde_json::from_str(r#"{"z":"1","a":"2","m":"3"}"#).unwrap();
        let keys: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(serde_json::to_string(&map).unwrap(), r#"{"z":"1","a":"2","m":"3"}"#);
    }

    #[test]
    fn test_ordered_map_rejects_non_string_values() {
        let result: Result<OrderedMap, _> = serde_json::from_str(r#"{"a":1}"#);
        assert!(result.is_err());
    }
}
