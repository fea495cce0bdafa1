//! Unit tests for the Frame struct and its constructors.

use iridium_stomp_ws::frame::{DEFAULT_CONTENT_TYPE, header};
use iridium_stomp_ws::{AckMode, Command, Frame, Heartbeat};

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn frame_new_creates_empty() {
    let frame = Frame::new(Command::Send);
    assert_eq!(frame.command, Command::Send);
    assert!(frame.headers.is_empty());
    assert!(frame.body.is_none());
}

#[test]
fn frame_header_builder_appends_in_order() {
    let frame = Frame::new(Command::Send)
        .header("destination", "/queue/test")
        .header("x-custom", "1");
    assert_eq!(
        frame.headers,
        vec![
            ("destination".to_string(), "/queue/test".to_string()),
            ("x-custom".to_string(), "1".to_string()),
        ]
    );
}

#[test]
fn frame_header_replaces_existing_in_place() {
    let frame = Frame::new(Command::Send)
        .header("a", "1")
        .header("b", "2")
        .header("a", "3");
    assert_eq!(frame.headers.len(), 2);
    assert_eq!(frame.headers[0], ("a".to_string(), "3".to_string()));
    assert_eq!(frame.get_header("a"), Some("3"));
}

#[test]
fn frame_get_header_is_case_sensitive() {
    let frame = Frame::new(Command::Send).header("destination", "/q");
    assert_eq!(frame.get_header("destination"), Some("/q"));
    assert_eq!(frame.get_header("Destination"), None);
}

#[test]
fn frame_receipt_sets_header() {
    let frame = Frame::begin("tx-1").receipt("r-9");
    assert_eq!(frame.get_header(header::RECEIPT), Some("r-9"));
}

// =============================================================================
// Command Tests
// =============================================================================

#[test]
fn command_wire_literals() {
    assert_eq!(Command::Connect.as_str(), "CONNECT");
    assert_eq!(Command::Unsubscribe.as_str(), "UNSUBSCRIBE");
    assert_eq!(Command::Disconnect.as_str(), "DISCONNECT");
    assert_eq!(Command::Ping.as_str(), "\n");
}

#[test]
fn command_from_inbound_only_knows_broker_commands() {
    assert_eq!(Command::from_inbound("CONNECTED"), Some(Command::Connected));
    assert_eq!(Command::from_inbound("MESSAGE"), Some(Command::Message));
    assert_eq!(Command::from_inbound("RECEIPT"), Some(Command::Receipt));
    assert_eq!(Command::from_inbound("ERROR"), Some(Command::Error));
    assert_eq!(Command::from_inbound("\n"), Some(Command::Ping));
    assert_eq!(Command::from_inbound("SEND"), None);
    assert_eq!(Command::from_inbound("message"), None);
}

#[test]
fn command_direction() {
    assert!(Command::Send.is_outbound());
    assert!(!Command::Send.is_inbound());
    assert!(Command::Message.is_inbound());
    assert!(!Command::Message.is_outbound());
    assert!(Command::Ping.is_inbound());
    assert!(Command::Ping.is_outbound());
}

#[test]
fn command_display_names_ping() {
    assert_eq!(Command::Ping.to_string(), "PING");
    assert_eq!(Command::Receipt.to_string(), "RECEIPT");
}

// =============================================================================
// Outbound Constructor Tests
// =============================================================================

#[test]
fn connect_carries_version_and_heartbeat() {
    let frame = Frame::connect("1.2", Some(Heartbeat::new(4000, 4000)));
    assert_eq!(frame.command, Command::Connect);
    assert_eq!(frame.get_header(header::ACCEPT_VERSION), Some("1.2"));
    assert_eq!(frame.get_header(header::HEART_BEAT), Some("4000,4000"));
    assert!(frame.body.is_none());
}

#[test]
fn connect_without_heartbeat_omits_header() {
    let frame = Frame::connect("1.2", None);
    assert_eq!(frame.get_header(header::HEART_BEAT), None);
}

#[test]
fn connect_with_login_sets_credentials() {
    let frame = Frame::connect_with_login("1.2", "guest", "secret", "/", None);
    assert_eq!(frame.get_header(header::LOGIN), Some("guest"));
    assert_eq!(frame.get_header(header::PASSCODE), Some("secret"));
    assert_eq!(frame.get_header(header::HOST), Some("/"));
}

#[test]
fn send_sets_destination_type_and_length() {
    let frame = Frame::send("/queue/a", "hi");
    assert_eq!(frame.get_header(header::DESTINATION), Some("/queue/a"));
    assert_eq!(frame.get_header(header::CONTENT_TYPE), Some(DEFAULT_CONTENT_TYPE));
    assert_eq!(frame.get_header(header::CONTENT_LENGTH), Some("2"));
    assert_eq!(frame.body.as_deref(), Some("hi"));
}

#[test]
fn send_content_length_counts_utf8_bytes() {
    let frame = Frame::send("/queue/a", "héllo");
    assert_eq!(frame.get_header(header::CONTENT_LENGTH), Some("6"));
}

#[test]
fn send_with_headers_overrides_reserved_headers() {
    let frame = Frame::send_with_headers(
        "/queue/real",
        "body",
        [
            ("destination", "/queue/ignored"),
            ("content-length", "999"),
            ("x-trace", "abc"),
        ],
        None,
    );
    assert_eq!(frame.get_header(header::DESTINATION), Some("/queue/real"));
    assert_eq!(frame.get_header(header::CONTENT_LENGTH), Some("4"));
    assert_eq!(frame.get_header("x-trace"), Some("abc"));
}

#[test]
fn send_with_headers_keeps_caller_content_type() {
    let frame = Frame::send_with_headers(
        "/queue/a",
        "{}",
        [("content-type", "application/json")],
        None,
    );
    assert_eq!(frame.get_header(header::CONTENT_TYPE), Some("application/json"));
}

#[test]
fn send_with_transaction() {
    let frame = Frame::send_with_headers(
        "/queue/a",
        "x",
        std::iter::empty::<(String, String)>(),
        Some("tx-1"),
    );
    assert_eq!(frame.get_header(header::TRANSACTION), Some("tx-1"));
}

#[test]
fn subscribe_sets_id_and_ack() {
    let frame = Frame::subscribe("/topic/t", "sub-0", AckMode::ClientIndividual);
    assert_eq!(frame.command, Command::Subscribe);
    assert_eq!(frame.get_header(header::DESTINATION), Some("/topic/t"));
    assert_eq!(frame.get_header(header::ID), Some("sub-0"));
    assert_eq!(frame.get_header(header::ACK), Some("client-individual"));
}

#[test]
fn subscribe_with_headers_forces_destination() {
    let frame = Frame::subscribe_with_headers(
        "/topic/t",
        [("destination", "/elsewhere"), ("id", "7")],
    );
    assert_eq!(frame.get_header(header::DESTINATION), Some("/topic/t"));
    assert_eq!(frame.get_header(header::ID), Some("7"));
}

#[test]
fn unsubscribe_ack_and_transactions() {
    assert_eq!(Frame::unsubscribe("sub-0").get_header(header::ID), Some("sub-0"));

    let ack = Frame::ack("m-1", Some("sub-0"));
    assert_eq!(ack.command, Command::Ack);
    assert_eq!(ack.get_header(header::ID), Some("m-1"));
    assert_eq!(ack.get_header(header::SUBSCRIPTION), Some("sub-0"));
    assert_eq!(Frame::ack("m-1", None).get_header(header::SUBSCRIPTION), None);

    for (frame, command) in [
        (Frame::begin("t"), Command::Begin),
        (Frame::commit("t"), Command::Commit),
        (Frame::abort("t"), Command::Abort),
    ] {
        assert_eq!(frame.command, command);
        assert_eq!(frame.get_header(header::TRANSACTION), Some("t"));
    }
}

#[test]
fn disconnect_is_timestamped() {
    let frame = Frame::disconnect();
    assert_eq!(frame.command, Command::Disconnect);
    let stamp: i64 = frame
        .get_header(header::DISCONNECTED)
        .expect("disconnected header")
        .parse()
        .expect("numeric timestamp");
    assert!(stamp > 1_600_000_000);
}

#[test]
fn ping_is_bare() {
    let frame = Frame::ping();
    assert!(frame.is_ping());
    assert!(frame.headers.is_empty());
    assert!(frame.body.is_none());
}

#[test]
fn ack_mode_strings() {
    assert_eq!(AckMode::default(), AckMode::Auto);
    assert_eq!(AckMode::Auto.as_str(), "auto");
    assert_eq!(AckMode::Client.as_str(), "client");
}
