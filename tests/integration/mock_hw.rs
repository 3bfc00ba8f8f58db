//! Mock hardware and a fake pour server for integration tests.
//!
//! [`MockServer`] plays the server side of the signed protocol: it checks
//! every request signature, enforces a strictly increasing counter per
//! client and signs its replies, so a test passes only when both ends
//! agree byte for byte.

#![allow(dead_code)]

use core::net::Ipv4Addr;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use pourlogic::adapters::eeprom::NvsEeprom;
use pourlogic::adapters::nvs::NvsAdapter;
use pourlogic::app::events::PourEvent;
use pourlogic::app::ports::{Clock, EventSink, PulseInterrupt, RfidTag, TagReader, ValvePort};
use pourlogic::auth::counter::OtpCounter;
use pourlogic::auth::{self, SharedKey, hexstr};
use pourlogic::client::PourLogicClient;
use pourlogic::client::transport::Transport;
use pourlogic::config::ServerConfig;
use pourlogic::sensors::flow;

pub const PASSPHRASE: &[u8] = b"secret";
pub const CLIENT_ID: u32 = 7;

/// The flow slot is process-wide; tests that pour hold this lock.
pub fn slot_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Persistence ───────────────────────────────────────────────

pub type Eeprom = NvsEeprom<NvsAdapter>;

pub fn fresh_counter() -> OtpCounter<Eeprom> {
    OtpCounter::begin(NvsEeprom::new(NvsAdapter::new().unwrap()), 0)
}

pub fn client_with(server: MockServer) -> PourLogicClient<Eeprom, MockServer> {
    PourLogicClient::new(
        CLIENT_ID,
        PASSPHRASE,
        fresh_counter(),
        server,
        ServerConfig::default(),
    )
}

// ── Fake pour server ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub request_line: String,
    pub counter: u32,
    pub body: String,
}

pub struct MockServer {
    key: SharedKey,
    last_counter: Option<u32>,
    /// Granted volumes, one per pour request; 0 once exhausted.
    pub grants: VecDeque<u32>,
    /// Accepted requests, in order.
    pub received: Vec<Received>,
    pub refuse_connect: bool,
    /// Flip a digit of the next reply's signature.
    pub tamper_next: bool,
    /// Bytes handed out per `read` call.
    pub chunk: usize,
    /// Hold the socket open after replying: reads past the reply time out
    /// instead of seeing EOF.
    pub keep_alive: bool,
    /// Reads issued after the whole reply was delivered.
    pub idle_reads: u32,
    connected: bool,
    request: Vec<u8>,
    reply: Vec<u8>,
    cursor: usize,
    pub connects: u32,
}

impl MockServer {
    pub fn new() -> Self {
        Self {
            key: SharedKey::derive(PASSPHRASE),
            last_counter: None,
            grants: VecDeque::new(),
            received: Vec::new(),
            refuse_connect: false,
            tamper_next: false,
            chunk: 5,
            keep_alive: false,
            idle_reads: 0,
            connected: false,
            request: Vec::new(),
            reply: Vec::new(),
            cursor: 0,
            connects: 0,
        }
    }

    pub fn granting(grants: &[u32]) -> Self {
        let mut s = Self::new();
        s.grants = grants.iter().copied().collect();
        s
    }

    pub fn last_counter(&self) -> Option<u32> {
        self.last_counter
    }

    fn respond(&mut self) {
        let (status, body, counter) = match self.handle() {
            Ok((status, body, counter)) => (status, body, counter),
            Err(status) => (status, String::new(), 0),
        };
        let message = auth::response_message(counter, status, &body);
        let mut sig = hexstr::encode_lower(&self.key.sign(message.as_bytes()));
        if self.tamper_next {
            self.tamper_next = false;
            let flipped = if sig.starts_with('0') { "1" } else { "0" };
            sig.replace_range(0..1, flipped);
        }
        self.reply = format!(
            "HTTP/1.0 {status} OK\r\nServer: mock\r\n{}: {CLIENT_ID}:{counter}:{sig}\r\nContent-Length: {}\r\n\r\n{body}",
            auth::AUTH_HEADER,
            body.len()
        )
        .into_bytes();
    }

    /// `Ok((status, body, counter))` for an authenticated request.
    fn handle(&mut self) -> Result<(u16, String, u32), u16> {
        let text = String::from_utf8(self.request.clone()).map_err(|_| 400u16)?;
        let (head, body) = text.split_once("\r\n\r\n").ok_or(400u16)?;
        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(400u16)?.to_string();
        let auth_value = lines
            .find_map(|l| l.strip_prefix(&format!("{}: ", auth::AUTH_HEADER)))
            .ok_or(401u16)?;

        let mut fields = auth_value.split(':');
        let id: u32 = fields.next().and_then(|f| f.parse().ok()).ok_or(401u16)?;
        let counter: u32 = fields.next().and_then(|f| f.parse().ok()).ok_or(401u16)?;
        let sig = fields
            .next()
            .and_then(|f| hexstr::decode_digest(f).ok())
            .ok_or(401u16)?;
        if id != CLIENT_ID {
            return Err(401);
        }
        let message = auth::request_message(counter, &request_line, body);
        if !self.key.verify(message.as_bytes(), &sig) {
            return Err(401);
        }
        if self.last_counter.is_some_and(|last| counter <= last) {
            return Err(401);
        }
        self.last_counter = Some(counter);
        self.received.push(Received {
            request_line: request_line.clone(),
            counter,
            body: body.to_string(),
        });

        if request_line.starts_with("GET ") {
            let grant = self.grants.pop_front().unwrap_or(0);
            Ok((200, grant.to_string(), counter))
        } else {
            Ok((200, String::new(), counter))
        }
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockServer {
    type Error = &'static str;

    fn connect(&mut self, _ip: Ipv4Addr, _port: u16) -> Result<(), &'static str> {
        if self.refuse_connect {
            return Err("refused");
        }
        self.connects += 1;
        self.connected = true;
        self.request.clear();
        self.reply.clear();
        self.cursor = 0;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, &'static str> {
        if !self.connected {
            return Err("not connected");
        }
        if self.reply.is_empty() {
            self.respond();
        }
        if self.cursor == self.reply.len() {
            self.idle_reads += 1;
            if self.keep_alive {
                return Err("timed out");
            }
        }
        let n = (self.reply.len() - self.cursor).min(buf.len()).min(self.chunk);
        buf[..n].copy_from_slice(&self.reply[self.cursor..self.cursor + n]);
        self.cursor += n;
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), &'static str> {
        if !self.connected {
            return Err("not connected");
        }
        self.request.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), &'static str> {
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ── Flow simulation ───────────────────────────────────────────

/// Virtual clock.  Every sleep advances time and fires the next scripted
/// number of pulses (then `tail` per sleep once the script runs out).
pub struct SimClock {
    pub now: u64,
    script: VecDeque<u32>,
    pub tail: u32,
}

impl SimClock {
    pub fn steady(pulses_per_poll: u32) -> Self {
        Self {
            now: 0,
            script: VecDeque::new(),
            tail: pulses_per_poll,
        }
    }

    pub fn scripted(script: &[u32]) -> Self {
        Self {
            now: 0,
            script: script.iter().copied().collect(),
            tail: 0,
        }
    }
}

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.now += u64::from(ms);
        let n = self.script.pop_front().unwrap_or(self.tail);
        for _ in 0..n {
            flow::pulse_isr();
        }
    }
}

#[derive(Debug, Default)]
pub struct MockIrq {
    pub attached: bool,
}

impl PulseInterrupt for MockIrq {
    fn attach(&mut self) {
        self.attached = true;
    }

    fn detach(&mut self) {
        self.attached = false;
    }
}

// ── Valve / reader / sink ─────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockValve {
    pub open: bool,
    pub opens: u32,
}

impl ValvePort for MockValve {
    fn open(&mut self) {
        self.open = true;
        self.opens += 1;
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Debug, Default)]
pub struct MockTagReader {
    pub tags: VecDeque<RfidTag>,
}

impl MockTagReader {
    pub fn with(tags: &[&str]) -> Self {
        Self {
            tags: tags.iter().map(|t| tag(t)).collect(),
        }
    }
}

impl TagReader for MockTagReader {
    fn read_tag(&mut self, _timeout_ms: u32) -> Option<RfidTag> {
        self.tags.pop_front()
    }
}

pub fn tag(s: &str) -> RfidTag {
    RfidTag::try_from(s).unwrap()
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<PourEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &PourEvent) {
        self.events.push(event.clone());
    }
}
