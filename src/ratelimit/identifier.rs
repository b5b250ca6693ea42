//! Client identifier extraction from proxy headers.

use std::collections::{BTreeMap, HashMap};

/// Identifier shared by all requests that carry no usable address header.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Address headers in order of precedence.
pub const CLIENT_IP_HEADERS: [&str; 4] = [
    "cf-connecting-ip",
    "true-client-ip",
    "x-real-ip",
    "x-forwarded-for",
];

/// Read access to request headers.
///
/// Implementations must match header names ASCII case-insensitively.
pub trait HeaderSource {
    /// Get the value of a header, if present.
    fn header(&self, name: &str) -> Option<&str>;
}

fn find_ignore_case<'a, I>(mut pairs: I, name: &str) -> Option<&'a str>
where
    I: Iterator<Item = (&'a str, &'a str)>,
{
    pairs
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

impl HeaderSource for BTreeMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        find_ignore_case(self.iter().map(|(k, v)| (k.as_str(), v.as_str())), name)
    }
}

impl HeaderSource for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        find_ignore_case(self.iter().map(|(k, v)| (k.as_str(), v.as_str())), name)
    }
}

impl HeaderSource for [(&str, &str)] {
    fn header(&self, name: &str) -> Option<&str> {
        find_ignore_case(self.iter().copied(), name)
    }
}

/// Derive the client identifier for a request.
///
/// The first non-empty header in [`CLIENT_IP_HEADERS`] wins; for
/// `x-forwarded-for` only the first comma-separated hop is used. Falls back
/// to [`UNKNOWN_CLIENT`]. The value is not validated as an address.
pub fn extract_identifier<H: HeaderSource + ?Sized>(headers: &H) -> String {
    for name in CLIENT_IP_HEADERS {
        let Some(value) = headers.header(name) else {
            continue;
        };

        let value = if name == "x-forwarded-for" {
            value.split(',').next().unwrap_or_default()
        } else {
            value
        };

        let value = value.trim();
        if !value.is_empty() {
            return value.to_string();
        }
    }

    UNKNOWN_CLIENT.to_string()
}
