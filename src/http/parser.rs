//! HTTP message detection, framing and parsing.
//!
//! These functions are stateless and operate on the front of a reassembled
//! byte stream: `looks_like_http` decides whether a message starts there,
//! `message_length` measures how many bytes it occupies, and `parse` turns
//! those bytes into an [`HttpMessage`].
//!
//! Bodies are framed by `Content-Length` only. Chunked or connection-close
//! delimited bodies are treated as empty, which leaves their bytes at the
//! front of the stream.

use memchr::memmem;

use super::message::{Headers, HttpMessage, HttpMethod, StartLine};

const MIN_MESSAGE_LEN: usize = 10;
const START_TOKENS: [&[u8]; 7] = [
    b"GET ",
    b"POST ",
    b"PUT ",
    b"DELETE ",
    b"HEAD ",
    b"OPTIONS ",
    b"HTTP/",
];
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &[u8] = b"Content-Length:";

/// Whether `data` starts with an HTTP request or status line.
///
/// This is a prefix test only; nothing past the first token is validated.
#[must_use]
pub fn looks_like_http(data: &[u8]) -> bool {
    data.len() >= MIN_MESSAGE_LEN && START_TOKENS.iter().any(|token| data.starts_with(token))
}

/// Number of bytes taken by the message at the front of `data`, or 0 while
/// the header block is still incomplete.
#[must_use]
pub fn message_length(data: &[u8]) -> usize {
    let Some(end) = memmem::find(data, HEADER_TERMINATOR) else {
        return 0;
    };
    let header_len = end + HEADER_TERMINATOR.len();

    content_length(&data[..header_len])
        .and_then(|body_len| header_len.checked_add(body_len))
        .unwrap_or(header_len)
}

fn content_length(headers: &[u8]) -> Option<usize> {
    let pos = memmem::find(headers, CONTENT_LENGTH)?;
    let value = &headers[pos + CONTENT_LENGTH.len()..];
    let spaces = value.iter().take_while(|&&b| b == b' ').count();
    let value = &value[spaces..];
    let digits = value.iter().take_while(|b| b.is_ascii_digit()).count();

    core::str::from_utf8(&value[..digits]).ok()?.parse().ok()
}

/// Parse one complete message. Malformed input never fails; missing pieces
/// come back empty.
#[must_use]
pub fn parse(data: &[u8]) -> HttpMessage {
    let text = String::from_utf8_lossy(data);
    let mut lines = text.split_inclusive('\n');

    let start_line = parse_start_line(lines.next().map_or("", strip_line_ending));

    let mut headers = Headers::default();
    for line in lines.by_ref() {
        let line = strip_line_ending(line);
        if line.is_empty() {
            break;
        }
        // Lines without a colon are skipped
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name, value.trim_start_matches(' '));
        }
    }

    let mut body = String::new();
    for line in lines {
        body.push_str(strip_line_ending(line));
        if line.ends_with('\n') {
            body.push('\n');
        }
    }

    HttpMessage {
        start_line,
        headers,
        body,
    }
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn parse_start_line(line: &str) -> StartLine {
    let line = line.trim_start();

    if line.starts_with("HTTP/") {
        let (version, rest) = split_token(line);
        let rest = rest.trim_start();
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (code, reason) = rest.split_at(digits);

        return StartLine::Response {
            version: version.to_owned(),
            status_code: code.parse().unwrap_or(0),
            status_text: reason.strip_prefix(' ').unwrap_or(reason).to_owned(),
        };
    }

    let mut tokens = line.split_whitespace();
    let method = HttpMethod::from_token(tokens.next().unwrap_or_default());
    let uri = tokens.next().unwrap_or_default().to_owned();
    let version = tokens.next().unwrap_or_default().to_owned();

    StartLine::Request {
        method,
        uri,
        version,
    }
}

fn split_token(s: &str) -> (&str, &str) {
    s.find(char::is_whitespace).map_or((s, ""), |i| s.split_at(i))
}
