//! Parsed HTTP message types.

use core::fmt;
use serde::Serialize;

/// Request methods recognised by the parser. Anything else maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Unknown,
}

impl HttpMethod {
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartLine {
    Request {
        method: HttpMethod,
        uri: String,
        version: String,
    },
    Response {
        version: String,
        status_code: u16,
        status_text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Header fields in order of first arrival.
///
/// Names are case-sensitive. A repeated name replaces the earlier value in
/// place instead of adding a second entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn insert(&mut self, name: &str, value: &str) {
        match self.0.iter_mut().find(|h| h.name == name) {
            Some(existing) => value.clone_into(&mut existing.value),
            None => self.0.push(Header {
                name: name.to_owned(),
                value: value.to_owned(),
            }),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One complete HTTP request or response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpMessage {
    pub start_line: StartLine,
    pub headers: Headers,
    pub body: String,
}

impl HttpMessage {
    #[must_use]
    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    #[must_use]
    pub fn method(&self) -> Option<HttpMethod> {
        match self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { uri, .. } => Some(uri),
            StartLine::Response { .. } => None,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self.start_line {
            StartLine::Response { status_code, .. } => Some(status_code),
            StartLine::Request { .. } => None,
        }
    }

    #[must_use]
    pub fn version(&self) -> &str {
        match &self.start_line {
            StartLine::Request { version, .. } | StartLine::Response { version, .. } => version,
        }
    }
}

impl fmt::Display for HttpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.start_line {
            StartLine::Request {
                method,
                uri,
                version,
            } => write!(f, "{method} {uri} {version}"),
            StartLine::Response {
                version,
                status_code,
                status_text,
            } => write!(f, "{version} {status_code} {status_text}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_keep_arrival_order_and_last_value() {
        let mut headers = Headers::default();
        headers.insert("Host", "a");
        headers.insert("Accept", "*/*");
        headers.insert("Host", "b");

        let names: Vec<_> = headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["Host", "Accept"]);
        assert_eq!(headers.get("Host"), Some("b"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_headers_are_case_sensitive() {
        let mut headers = Headers::default();
        headers.insert("Host", "a");
        headers.insert("host", "b");

        assert_eq!(headers.get("Host"), Some("a"));
        assert_eq!(headers.get("host"), Some("b"));
        assert_eq!(headers.get("HOST"), None);
    }

    #[test]
    fn test_method_tokens() {
        assert_eq!(HttpMethod::from_token("DELETE"), HttpMethod::Delete);
        assert_eq!(HttpMethod::from_token("PATCH"), HttpMethod::Unknown);
        assert_eq!(HttpMethod::from_token("get"), HttpMethod::Unknown);
        assert_eq!(HttpMethod::Options.to_string(), "OPTIONS");
    }
}
