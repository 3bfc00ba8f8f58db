//! Minimal HTTP/1.0 framing for the two pour exchanges.
//!
//! Requests are rendered in one buffer and written at once.  Responses are
//! buffered (bounded) until the peer closes, the read times out or the
//! declared `Content-Length` has arrived, then parsed in one pass.  Only
//! the status code, the auth header, `Content-Length` and the body are
//! interpreted.

use log::debug;

use crate::auth::{AUTH_HEADER, AuthHeader};

use super::ExchangeError;
use super::transport::Transport;

/// Longest accepted status or header line (bytes, without line ending).
pub const MAX_LINE_LEN: usize = 256;
/// Longest accepted response body.
pub const MAX_BODY_LEN: usize = 64;
/// Upper bound on a buffered response.
pub const MAX_RESPONSE_LEN: usize = 2_048;

const CRLF: &str = "\r\n";

// ── Requests ─────────────────────────────────────────────────

/// `GET <path>?u=<rfid> HTTP/1.0` (no line ending).
pub fn pour_request_line(path: &str, rfid: &str) -> String {
    format!("GET {path}?u={rfid} HTTP/1.0")
}

/// `POST <path> HTTP/1.0` (no line ending).
pub fn pour_result_line(path: &str) -> String {
    format!("POST {path} HTTP/1.0")
}

/// `u=<rfid>&v=<volume>` with the volume at two decimals.
pub fn pour_result_body(rfid: &str, volume_ml: f32) -> String {
    format!("u={rfid}&v={volume_ml:.2}")
}

pub fn render_get(request_line: &str, host: &str, user_agent: &str, auth: &AuthHeader) -> String {
    format!(
        "{request_line}{CRLF}\
         Host: {host}{CRLF}\
         User-Agent: {user_agent}{CRLF}\
         Content-Length: 0{CRLF}\
         {AUTH_HEADER}: {auth}{CRLF}\
         {CRLF}"
    )
}

pub fn render_post(
    request_line: &str,
    host: &str,
    user_agent: &str,
    auth: &AuthHeader,
    body: &str,
) -> String {
    format!(
        "{request_line}{CRLF}\
         Host: {host}{CRLF}\
         User-Agent: {user_agent}{CRLF}\
         {AUTH_HEADER}: {auth}{CRLF}\
         Content-Length: {len}{CRLF}\
         {CRLF}\
         {body}",
        len = body.len()
    )
}

// ── Responses ────────────────────────────────────────────────

/// A parsed response.  The body is raw text; callers trim and interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Raw value of the auth header, if present.
    pub auth: Option<String>,
    pub body: String,
}

/// Parse `HTTP/1.x <code> [reason]`.
pub fn parse_status_line(line: &str) -> Result<u16, ExchangeError> {
    let mut parts = line.split_whitespace();
    let version = parts.next().ok_or(ExchangeError::MalformedStatus)?;
    if !version.starts_with("HTTP/1.") {
        return Err(ExchangeError::MalformedStatus);
    }
    let code = parts.next().ok_or(ExchangeError::MalformedStatus)?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ExchangeError::MalformedStatus);
    }
    code.parse().map_err(|_| ExchangeError::MalformedStatus)
}

/// The signature part of an auth header value.
///
/// Servers send either the bare hex or the same `id:counter:hex` triple
/// the client uses; the signature is the last `:`-separated field.
pub fn signature_field(value: &str) -> &str {
    value.rsplit(':').next().unwrap_or(value).trim()
}

/// Returns `(head_len, body_start)` once the blank line has arrived.
fn header_end(raw: &[u8]) -> Option<(usize, usize)> {
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n");
    let lf = raw.windows(2).position(|w| w == b"\n\n");
    match (crlf, lf) {
        (Some(a), Some(b)) if b < a => Some((b, b + 2)),
        (Some(a), _) => Some((a, a + 4)),
        (None, Some(b)) => Some((b, b + 2)),
        (None, None) => None,
    }
}

fn lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    head.split(|&b| b == b'\n')
        .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
}

fn content_length(head: &[u8]) -> Result<Option<usize>, ExchangeError> {
    for line in lines(head).skip(1) {
        let Ok(line) = core::str::from_utf8(line) else {
            continue;
        };
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                return value
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| ExchangeError::MalformedBody);
            }
        }
    }
    Ok(None)
}

/// Parse a complete buffered response.
pub fn parse_response(raw: &[u8]) -> Result<Response, ExchangeError> {
    let (head, body) = match header_end(raw) {
        Some((head_len, body_start)) => (&raw[..head_len], &raw[body_start..]),
        None => (raw, &raw[raw.len()..]),
    };

    let mut status = None;
    let mut auth = None;
    for (i, line) in lines(head).enumerate() {
        if line.len() > MAX_LINE_LEN {
            return Err(ExchangeError::LineTooLong);
        }
        if i == 0 {
            let line = core::str::from_utf8(line).map_err(|_| ExchangeError::MalformedStatus)?;
            status = Some(parse_status_line(line)?);
            continue;
        }
        let Ok(line) = core::str::from_utf8(line) else {
            continue;
        };
        if let Some((name, value)) = line.split_once(':') {
            if auth.is_none() && name.trim().eq_ignore_ascii_case(AUTH_HEADER) {
                auth = Some(value.trim().to_owned());
            }
        }
    }
    let status = status.ok_or(ExchangeError::MalformedStatus)?;

    let body = match content_length(head)? {
        Some(n) if n > body.len() => return Err(ExchangeError::MalformedBody),
        Some(n) => &body[..n],
        None => body,
    };
    if body.len() > MAX_BODY_LEN {
        return Err(ExchangeError::MalformedBody);
    }
    let body = core::str::from_utf8(body)
        .map_err(|_| ExchangeError::MalformedBody)?
        .to_owned();

    Ok(Response { status, auth, body })
}

/// Buffer a response from `transport` and parse it.
pub fn read_response<T: Transport>(transport: &mut T) -> Result<Response, ExchangeError> {
    let mut raw = Vec::with_capacity(256);
    let mut chunk = [0u8; 128];

    loop {
        let n = transport.read(&mut chunk).map_err(|e| {
            debug!("http: read failed: {:?}", e);
            ExchangeError::Io
        })?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
        if raw.len() > MAX_RESPONSE_LEN {
            return Err(ExchangeError::ResponseTooLarge);
        }

        if let Some((head_len, body_start)) = header_end(&raw) {
            if let Some(len) = content_length(&raw[..head_len])? {
                if raw.len() >= body_start + len {
                    break;
                }
            }
        }
    }

    if raw.is_empty() {
        return Err(ExchangeError::MalformedStatus);
    }
    parse_response(&raw)
}

/// Discard whatever the peer still has buffered, then close.
pub fn drain_and_close<T: Transport>(transport: &mut T) {
    let mut chunk = [0u8; 128];
    // Bounded so a chatty peer cannot stall the pour loop.
    for _ in 0..(MAX_RESPONSE_LEN / chunk.len()) {
        match transport.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
    transport.close();
}
