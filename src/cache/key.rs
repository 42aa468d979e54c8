//! Cache Key Module
//!
//! Derives storage keys from origin endpoints.

use std::fmt;

/// Prefix distinguishing text payloads from JSON payloads of the same endpoint.
///
/// A raw `%` in a JSON key is always the start of a two digit escape, so no
/// JSON key can begin with `%t`.
pub const TEXT_KEY_PREFIX: &str = "%text_";

// == Cache Key ==
/// Normalized storage key for a logical resource.
///
/// The first `?` and every query `&` become `_`. Characters that would make
/// the mapping ambiguous are percent-escaped, so two different endpoints
/// never share a key:
/// - `%` becomes `%25` and a literal `_` becomes `%5F` everywhere
/// - `&` in the path becomes `%26`
/// - a further `?` in the query becomes `%3F`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for a JSON payload of `endpoint`.
    pub fn for_json(endpoint: &str) -> Self {
        Self(normalize(endpoint))
    }

    /// Derives the key for a text payload of `endpoint`.
    pub fn for_text(endpoint: &str) -> Self {
        Self(format!("{}{}", TEXT_KEY_PREFIX, normalize(endpoint)))
    }

    /// Wraps an already normalized key.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the endpoint the key was derived from.
    ///
    /// Text keys yield their endpoint without the prefix. Escapes that are
    /// not produced by derivation are kept as they are.
    pub fn endpoint(&self) -> String {
        let key = self.0.strip_prefix(TEXT_KEY_PREFIX).unwrap_or(&self.0);
        let mut endpoint = String::with_capacity(key.len());
        let mut in_query = false;
        let mut rest = key;

        while let Some(c) = rest.chars().next() {
            let decoded = match c {
                '%' => match rest.get(..3) {
                    Some("%25") => Some('%'),
                    Some("%5F") => Some('_'),
                    Some("%26") => Some('&'),
                    Some("%3F") => Some('?'),
                    _ => None,
                },
                _ => None,
            };
            match decoded {
                Some(d) => {
                    endpoint.push(d);
                    rest = &rest[3..];
                    continue;
                }
                None if c == '_' => {
                    endpoint.push(if in_query { '&' } else { '?' });
                    in_query = true;
                }
                None => endpoint.push(c),
            }
            rest = &rest[c.len_utf8()..];
        }

        endpoint
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn normalize(endpoint: &str) -> String {
    let (path, query) = match endpoint.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (endpoint, None),
    };

    let mut key = String::with_capacity(endpoint.len() + 8);
    for c in path.chars() {
        match c {
            '%' => key.push_str("%25"),
            '_' => key.push_str("%5F"),
            '&' => key.push_str("%26"),
            _ => key.push(c),
        }
    }

    if let Some(query) = query {
        key.push('_');
        for c in query.chars() {
            match c {
                '%' => key.push_str("%25"),
                '_' => key.push_str("%5F"),
                '?' => key.push_str("%3F"),
                '&' => key.push('_'),
                _ => key.push(c),
            }
        }
    }

    key
}
