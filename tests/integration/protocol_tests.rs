//! End-to-end signed exchanges against the fake pour server.

use pourlogic::adapters::eeprom::NvsEeprom;
use pourlogic::adapters::nvs::{NvsAdapter, PASSPHRASE_KEY};
use pourlogic::auth::counter::OtpCounter;
use pourlogic::client::transport::Transport;
use pourlogic::client::{ExchangeError, PourLogicClient};
use pourlogic::config::ServerConfig;

use crate::mock_hw::{CLIENT_ID, MockServer, PASSPHRASE, client_with};

#[test]
fn pour_request_is_granted_and_counter_advances() {
    let mut client = client_with(MockServer::granting(&[330]));

    assert_eq!(client.request_max_volume("0415AB12CD"), Ok(330));
    assert_eq!(client.counter(), 1);

    let server = client.transport();
    assert_eq!(server.received.len(), 1);
    assert_eq!(server.received[0].request_line, "GET /pours/new/?u=0415AB12CD HTTP/1.0");
    assert_eq!(server.received[0].counter, 1);
    assert!(server.received[0].body.is_empty());
    assert!(!server.is_connected());
}

#[test]
fn pour_result_body_is_signed() {
    let mut client = client_with(MockServer::granting(&[500]));
    client.request_max_volume("0415AB12CD").unwrap();

    assert_eq!(client.report_poured_volume("0415AB12CD", 473.04), Ok(()));
    let server = client.transport();
    assert_eq!(server.received[1].request_line, "POST /pours/create/ HTTP/1.0");
    assert_eq!(server.received[1].body, "u=0415AB12CD&v=473.04");
    assert_eq!(server.received[1].counter, 2);
}

#[test]
fn counters_are_strictly_increasing_across_exchanges() {
    let mut client = client_with(MockServer::granting(&[10, 20, 30]));
    for _ in 0..3 {
        client.request_max_volume("AAAAAAAAAA").unwrap();
        client.report_poured_volume("AAAAAAAAAA", 1.0).unwrap();
    }
    let counters: Vec<u32> = client.transport().received.iter().map(|r| r.counter).collect();
    assert_eq!(counters, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn counter_survives_power_cycle() {
    let mut client = client_with(MockServer::granting(&[1, 2]));
    client.request_max_volume("AAAAAAAAAA").unwrap();
    client.request_max_volume("AAAAAAAAAA").unwrap();

    let (counter, server) = client.into_parts();
    let nvs = counter.into_store().into_inner();

    // Reboot: reload the EEPROM image from NVS and resume.
    let counter = OtpCounter::begin(NvsEeprom::new(nvs), 0);
    assert_eq!(counter.count(), 2);
    let mut client = PourLogicClient::new(
        CLIENT_ID,
        PASSPHRASE,
        counter,
        server,
        ServerConfig::default(),
    );
    // Grants exhausted: the server answers 0 but still authenticates.
    assert_eq!(client.request_max_volume("AAAAAAAAAA"), Ok(0));
    assert_eq!(client.transport().last_counter(), Some(3));
}

#[test]
fn replayed_counter_is_rejected_by_server() {
    let mut client = client_with(MockServer::granting(&[1, 1]));
    client.request_max_volume("AAAAAAAAAA").unwrap();
    client.request_max_volume("AAAAAAAAAA").unwrap();

    let (mut counter, server) = client.into_parts();
    counter.set(0);
    let mut client = PourLogicClient::new(
        CLIENT_ID,
        PASSPHRASE,
        counter,
        server,
        ServerConfig::default(),
    );
    assert_eq!(
        client.request_max_volume("AAAAAAAAAA"),
        Err(ExchangeError::Rejected(401))
    );
}

#[test]
fn wrong_passphrase_is_rejected() {
    let mut client = PourLogicClient::new(
        CLIENT_ID,
        b"not-the-secret",
        crate::mock_hw::fresh_counter(),
        MockServer::granting(&[100]),
        ServerConfig::default(),
    );
    assert_eq!(
        client.request_max_volume("AAAAAAAAAA"),
        Err(ExchangeError::Rejected(401))
    );
    assert!(client.transport().received.is_empty());
}

fn client_from_nvs(
    nvs: NvsAdapter,
    server: MockServer,
) -> PourLogicClient<NvsEeprom<NvsAdapter>, MockServer> {
    let passphrase = nvs.passphrase();
    PourLogicClient::new(
        CLIENT_ID,
        &passphrase,
        OtpCounter::begin(NvsEeprom::new(nvs), 0),
        server,
        ServerConfig::default(),
    )
}

#[test]
fn provisioned_passphrase_is_accepted_by_server() {
    let mut nvs = NvsAdapter::new().unwrap();
    let secret = std::str::from_utf8(PASSPHRASE).unwrap();
    assert_eq!(nvs.provision_credential(PASSPHRASE_KEY, Some(secret)), Ok(true));

    let mut client = client_from_nvs(nvs, MockServer::granting(&[77]));
    assert_eq!(client.request_max_volume("AAAAAAAAAA"), Ok(77));
}

#[test]
fn reprovisioned_passphrase_replaces_the_old_key() {
    let mut nvs = NvsAdapter::new().unwrap();
    let secret = std::str::from_utf8(PASSPHRASE).unwrap();
    nvs.provision_credential(PASSPHRASE_KEY, Some(secret)).unwrap();
    nvs.provision_credential(PASSPHRASE_KEY, Some("rotated-key")).unwrap();

    // The server still holds the old key.
    let mut client = client_from_nvs(nvs, MockServer::granting(&[77]));
    assert_eq!(
        client.request_max_volume("AAAAAAAAAA"),
        Err(ExchangeError::Rejected(401))
    );
}

#[test]
fn tampered_response_fails_verification() {
    let mut server = MockServer::granting(&[100]);
    server.tamper_next = true;
    let mut client = client_with(server);
    assert_eq!(
        client.request_max_volume("AAAAAAAAAA"),
        Err(ExchangeError::BadSignature)
    );
}

#[test]
fn exhausted_counter_refuses_to_sign() {
    let mut counter = crate::mock_hw::fresh_counter();
    counter.set(u32::MAX);
    let mut client = PourLogicClient::new(
        CLIENT_ID,
        PASSPHRASE,
        counter,
        MockServer::granting(&[100]),
        ServerConfig::default(),
    );
    assert_eq!(
        client.request_max_volume("AAAAAAAAAA"),
        Err(ExchangeError::CounterExhausted)
    );
    assert_eq!(client.counter(), u32::MAX);
    assert!(client.transport().received.is_empty());
    assert!(!client.transport().is_connected());
}

#[test]
fn refused_connection_keeps_counter() {
    let mut server = MockServer::new();
    server.refuse_connect = true;
    let mut client = client_with(server);
    assert_eq!(
        client.request_max_volume("AAAAAAAAAA"),
        Err(ExchangeError::Connect)
    );
    assert_eq!(client.counter(), 0);
}

#[test]
fn single_byte_reads_still_parse() {
    let mut server = MockServer::granting(&[42]);
    server.chunk = 1;
    let mut client = client_with(server);
    assert_eq!(client.request_max_volume("AAAAAAAAAA"), Ok(42));
}

#[test]
fn kept_alive_socket_is_closed_without_waiting() {
    let mut server = MockServer::granting(&[42]);
    server.keep_alive = true;
    let mut client = client_with(server);

    assert_eq!(client.request_max_volume("AAAAAAAAAA"), Ok(42));
    assert_eq!(client.report_poured_volume("AAAAAAAAAA", 12.5), Ok(()));
    assert_eq!(client.transport().idle_reads, 0);
    assert!(!client.transport().is_connected());
}

#[test]
fn tag_with_query_characters_is_not_sent() {
    let mut client = client_with(MockServer::granting(&[42]));
    assert_eq!(
        client.request_max_volume("AA&v=9999"),
        Err(ExchangeError::InvalidTag)
    );
    assert_eq!(client.transport().connects, 0);
    assert_eq!(client.counter(), 0);
}
