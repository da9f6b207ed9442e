//! HTTP message framing and parsing.
//!
//! This module detects HTTP messages at the front of a reassembled TCP byte
//! stream, measures where each one ends, and parses complete messages into
//! structured requests and responses.

mod message;
mod parser;

pub use message::{Header, Headers, HttpMessage, HttpMethod, StartLine};
pub use parser::{looks_like_http, message_length, parse};
