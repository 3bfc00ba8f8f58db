//! Authenticated pour client.
//!
//! Two exchanges, both signed with the counter-based scheme in
//! [`crate::auth`]:
//!
//! | Exchange    | Request                          | Verified response body |
//! |-------------|----------------------------------|------------------------|
//! | pour request| `GET <request_path>?u=<rfid>`    | max volume (integer)   |
//! | pour result | `POST <result_path>` `u=..&v=..` | empty                  |
//!
//! The counter is incremented before every request is signed and the
//! response is verified against the same value; it is never echoed back.
//! Any failure (connect, I/O, malformed framing, non-200, bad or missing
//! signature) is reported as an [`ExchangeError`].

pub mod http;
pub mod transport;

use core::fmt;

use log::{debug, info, warn};

use crate::app::ports::ByteStore;
use crate::auth::counter::OtpCounter;
use crate::auth::{self, AuthHeader, SharedKey, hexstr};
use crate::config::ServerConfig;

use transport::Transport;

// ── Errors ───────────────────────────────────────────────────

/// Why an exchange failed.  Callers treat every variant as "denied".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeError {
    /// The tag contains characters that cannot go in a query string.
    InvalidTag,
    /// TCP connect failed.
    Connect,
    /// Read or write on an open connection failed.
    Io,
    /// The response exceeded the buffering limit.
    ResponseTooLarge,
    /// A status or header line exceeded the line limit.
    LineTooLong,
    MalformedStatus,
    /// Well-formed response with a status other than 200.
    Rejected(u16),
    /// No auth header in the response.
    MissingAuth,
    /// Auth header present but not a 32-byte hex digest.
    MalformedAuth,
    MalformedBody,
    /// The signature did not match.
    BadSignature,
    /// The counter reached `u32::MAX`; no fresh value is left to sign with.
    CounterExhausted,
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTag => write!(f, "tag not URL-safe"),
            Self::Connect => write!(f, "connect failed"),
            Self::Io => write!(f, "transport I/O error"),
            Self::ResponseTooLarge => write!(f, "response too large"),
            Self::LineTooLong => write!(f, "response line too long"),
            Self::MalformedStatus => write!(f, "malformed status line"),
            Self::Rejected(code) => write!(f, "server responded {}", code),
            Self::MissingAuth => write!(f, "missing auth header"),
            Self::MalformedAuth => write!(f, "malformed auth header"),
            Self::MalformedBody => write!(f, "malformed body"),
            Self::BadSignature => write!(f, "signature mismatch"),
            Self::CounterExhausted => write!(f, "counter exhausted"),
        }
    }
}

const STATUS_OK: u16 = 200;

fn is_url_safe_tag(rfid: &str) -> bool {
    !rfid.is_empty() && rfid.bytes().all(|b| b.is_ascii_alphanumeric())
}

// ── Client ───────────────────────────────────────────────────

/// Signs pour requests/results and verifies the server's answers.
pub struct PourLogicClient<S: ByteStore, T: Transport> {
    client_id: u32,
    key: SharedKey,
    counter: OtpCounter<S>,
    transport: T,
    server: ServerConfig,
    /// The current connection's response was read to its end.
    response_read: bool,
}

impl<S: ByteStore, T: Transport> PourLogicClient<S, T> {
    /// The key is derived from `passphrase` once, here.
    pub fn new(
        client_id: u32,
        passphrase: &[u8],
        counter: OtpCounter<S>,
        transport: T,
        server: ServerConfig,
    ) -> Self {
        Self {
            client_id,
            key: SharedKey::derive(passphrase),
            counter,
            transport,
            server,
            response_read: false,
        }
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Counter value used by the most recent request.
    pub fn counter(&self) -> u32 {
        self.counter.count()
    }

    pub fn otp(&self) -> &OtpCounter<S> {
        &self.counter
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Split into counter and transport, e.g. to simulate a power cycle.
    pub fn into_parts(self) -> (OtpCounter<S>, T) {
        (self.counter, self.transport)
    }

    // ── Pour request ──────────────────────────────────────────

    /// Connect and send a signed `GET` for `rfid`.
    pub fn send_pour_request(&mut self, rfid: &str) -> Result<(), ExchangeError> {
        if !is_url_safe_tag(rfid) {
            return Err(ExchangeError::InvalidTag);
        }
        self.connect()?;

        let line = http::pour_request_line(&self.server.request_path, rfid);
        let auth = self.sign(&line, "")?;
        let request = http::render_get(&line, &self.server.hostname, &self.server.user_agent, &auth);
        debug!("client: pour request counter={}", auth.counter);
        self.send(&request)
    }

    /// Read the response to [`send_pour_request`](Self::send_pour_request)
    /// and return the granted maximum volume in mL.
    pub fn get_pour_request_response(&mut self) -> Result<u32, ExchangeError> {
        let resp = self.read_response()?;
        self.check_status(&resp)?;
        let max_volume_ml: u32 = resp
            .body
            .trim()
            .parse()
            .map_err(|_| ExchangeError::MalformedBody)?;
        // Signed over the integer as the server renders it.
        self.verify(&resp, &max_volume_ml.to_string())?;
        info!("client: granted {} mL (counter={})", max_volume_ml, self.counter());
        Ok(max_volume_ml)
    }

    // ── Pour result ───────────────────────────────────────────

    /// Connect and send a signed `POST` reporting `volume_ml` for `rfid`.
    pub fn send_pour_result(&mut self, rfid: &str, volume_ml: f32) -> Result<(), ExchangeError> {
        if !is_url_safe_tag(rfid) {
            return Err(ExchangeError::InvalidTag);
        }
        self.connect()?;

        let line = http::pour_result_line(&self.server.result_path);
        let body = http::pour_result_body(rfid, volume_ml);
        let auth = self.sign(&line, &body)?;
        let request = http::render_post(
            &line,
            &self.server.hostname,
            &self.server.user_agent,
            &auth,
            &body,
        );
        debug!("client: pour result counter={} body={}", auth.counter, body);
        self.send(&request)
    }

    /// Read and verify the acknowledgement of a pour result.
    pub fn get_pour_result_response(&mut self) -> Result<(), ExchangeError> {
        let resp = self.read_response()?;
        self.check_status(&resp)?;
        self.verify(&resp, "")?;
        info!("client: result acknowledged (counter={})", self.counter());
        Ok(())
    }

    // ── Combined exchanges ────────────────────────────────────

    /// Request and verify in one go; the connection is always closed.
    pub fn request_max_volume(&mut self, rfid: &str) -> Result<u32, ExchangeError> {
        let result = self
            .send_pour_request(rfid)
            .and_then(|()| self.get_pour_request_response());
        self.stop();
        result
    }

    /// Report and verify in one go; the connection is always closed.
    pub fn report_poured_volume(&mut self, rfid: &str, volume_ml: f32) -> Result<(), ExchangeError> {
        let result = self
            .send_pour_result(rfid, volume_ml)
            .and_then(|()| self.get_pour_result_response());
        self.stop();
        result
    }

    /// Close the connection, first draining unread bytes unless the
    /// response was already read to its end.
    pub fn stop(&mut self) {
        if self.response_read {
            self.transport.close();
        } else {
            http::drain_and_close(&mut self.transport);
        }
        self.response_read = false;
    }

    // ── Internals ─────────────────────────────────────────────

    fn connect(&mut self) -> Result<(), ExchangeError> {
        self.response_read = false;
        self.transport
            .connect(self.server.ip_addr(), self.server.port)
            .map_err(|e| {
                warn!(
                    "client: connect {}:{} failed: {:?}",
                    self.server.ip_addr(),
                    self.server.port,
                    e
                );
                ExchangeError::Connect
            })
    }

    fn read_response(&mut self) -> Result<http::Response, ExchangeError> {
        let resp = http::read_response(&mut self.transport)?;
        self.response_read = true;
        Ok(resp)
    }

    fn send(&mut self, request: &str) -> Result<(), ExchangeError> {
        let result = self
            .transport
            .write_all(request.as_bytes())
            .and_then(|()| self.transport.flush());
        result.map_err(|e| {
            warn!("client: write failed: {:?}", e);
            self.transport.close();
            ExchangeError::Io
        })
    }

    /// Increment the counter, then sign `COUNTER\nLINE\nBODY`.
    fn sign(&mut self, request_line: &str, body: &str) -> Result<AuthHeader, ExchangeError> {
        let Some(counter) = self.counter.increment() else {
            warn!("client: counter exhausted, refusing to sign");
            self.transport.close();
            return Err(ExchangeError::CounterExhausted);
        };
        let message = auth::request_message(counter, request_line, body);
        Ok(AuthHeader {
            client_id: self.client_id,
            counter,
            signature: self.key.sign(message.as_bytes()),
        })
    }

    fn check_status(&self, resp: &http::Response) -> Result<(), ExchangeError> {
        if resp.status == STATUS_OK {
            Ok(())
        } else {
            warn!("client: server responded {}", resp.status);
            Err(ExchangeError::Rejected(resp.status))
        }
    }

    fn verify(&self, resp: &http::Response, body: &str) -> Result<(), ExchangeError> {
        let value = resp.auth.as_deref().ok_or_else(|| {
            warn!("client: response has no {} header", auth::AUTH_HEADER);
            ExchangeError::MissingAuth
        })?;
        let tag = hexstr::decode_digest(http::signature_field(value)).map_err(|e| {
            warn!("client: bad signature encoding: {}", e);
            ExchangeError::MalformedAuth
        })?;

        let message = auth::response_message(self.counter.count(), resp.status, body);
        if self.key.verify(message.as_bytes(), &tag) {
            Ok(())
        } else {
            warn!("client: response signature mismatch (counter={})", self.counter.count());
            Err(ExchangeError::BadSignature)
        }
    }
}
