//! The upgrade request a connection was opened with.

use std::collections::HashMap;

/// Path and headers of a connection's opening request.
///
/// Header names are stored lowercase. Repeated `Cookie` headers are
/// joined with `"; "`, other repeated headers keep the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    path: String,
    headers: HashMap<String, String>,
}

impl Handshake {
    /// Creates a handshake for the given request path with no headers.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            headers: HashMap::new(),
        }
    }

    /// Adds a header, returning the updated handshake.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Self {
        self.insert_header(name.as_ref(), value.into());
        self
    }

    pub(crate) fn insert_header(&mut self, name: &str, value: String) {
        let name = name.to_ascii_lowercase();
        match self.headers.get_mut(&name) {
            Some(existing) if name == "cookie" => {
                existing.push_str("; ");
                existing.push_str(&value);
            }
            _ => {
                self.headers.insert(name, value);
            }
        }
    }

    /// The request path, e.g. `/socket`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the value of the named cookie, if the request carried it.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.header("cookie")?.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
    }

    /// Returns the token of an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|t| !t.is_empty())
    }

    /// Iterates over all `(name, value)` header pairs.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let hs = Handshake::new("/socket").with_header("X-Trace", "abc");
        assert_eq!(hs.header("x-trace"), Some("abc"));
        assert_eq!(hs.header("X-TRACE"), Some("abc"));
    }

    #[test]
    fn test_cookie_finds_named_pair() {
        let hs = Handshake::new("/socket")
            .with_header("Cookie", "theme=dark; tabletop_session=jwt.value.sig");
        assert_eq!(hs.cookie("tabletop_session"), Some("jwt.value.sig"));
        assert_eq!(hs.cookie("theme"), Some("dark"));
        assert_eq!(hs.cookie("missing"), None);
    }

    #[test]
    fn test_repeated_cookie_headers_are_joined() {
        let hs = Handshake::new("/socket")
            .with_header("cookie", "a=1")
            .with_header("cookie", "b=2");
        assert_eq!(hs.cookie("a"), Some("1"));
        assert_eq!(hs.cookie("b"), Some("2"));
    }

    #[test]
    fn test_bearer_token_parses_scheme() {
        let hs = Handshake::new("/socket")
            .with_header("Authorization", "Bearer abc.def");
        assert_eq!(hs.bearer_token(), Some("abc.def"));

        let basic = Handshake::new("/socket")
            .with_header("Authorization", "Basic dXNlcg==");
        assert_eq!(basic.bearer_token(), None);
    }

    #[test]
    fn test_empty_bearer_token_is_none() {
        let hs = Handshake::new("/socket").with_header("Authorization", "Bearer  ");
        assert_eq!(hs.bearer_token(), None);
    }
}
