//! End-to-end handshakes against a scripted SOCKS5 server over real TCP.

mod support;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use socks5_tunnel::socks5::{
    Address, ConnectTunnel, Credentials, HandshakeSession, Phase, ReplyStatus, SessionState,
    SocksError, UdpOverTcpTunnel,
};
use socks5_tunnel::telemetry;
use socks5_tunnel::TunnelClient;

use support::{AfterReply, Script, ScriptedServer};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn example_com_request() -> Vec<u8> {
    let mut frame = vec![0x05, 0x01, 0x00, 0x05, 0x01, 0x00, 0x03, 11];
    frame.extend_from_slice(b"example.com");
    frame.extend_from_slice(&[0x01, 0xBB]);
    frame
}

#[tokio::test]
async fn connect_without_credentials() {
    let expected = example_com_request();
    let server = ScriptedServer::spawn(Script::new(
        expected.len(),
        [0x05, 0x00, 0x05, 0x00, 0x00, 0x01, 93, 184, 216, 34, 0x01, 0xBB],
    ))
    .await
    .unwrap();

    let mut session = HandshakeSession::new(ConnectTunnel::new(Address::domain("example.com", 443)));
    session.connect("127.0.0.1", server.port()).await.unwrap();
    assert!(session.is_connected());

    timeout(TEST_TIMEOUT, session.handshake())
        .await
        .expect("handshake stalled")
        .unwrap();
    assert_eq!(session.state(), SessionState::Complete);
    assert_eq!(
        session.variant().bound_address(),
        Some(&Address::Ip("93.184.216.34:443".parse().unwrap()))
    );
    assert_eq!(server.received().await, vec![expected]);

    // The stream is left at the start of tunnel data.
    let mut stream = session.into_stream().unwrap();
    stream.write_all(b"ping").await.unwrap();
    let mut echo = [0u8; 4];
    timeout(TEST_TIMEOUT, stream.read_exact(&mut echo))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echo, b"ping");
}

#[tokio::test]
async fn client_with_credentials_pipelines_auth() {
    let server = ScriptedServer::spawn(Script::new(
        27,
        [
            0x05, 0x02, 0x01, 0x00, 0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x1F, 0x90,
        ],
    ))
    .await
    .unwrap();

    let client = TunnelClient::new("127.0.0.1", server.port())
        .with_credentials(Credentials::new("alice", "secret").unwrap())
        .with_connect_timeout(TEST_TIMEOUT);
    let (_stream, bound) = client
        .connect(Address::Ip("10.0.0.1:80".parse().unwrap()))
        .await
        .unwrap();
    assert_eq!(bound, Some(Address::Ip("127.0.0.1:8080".parse().unwrap())));

    let received = server.received().await;
    let frame = &received[0];
    assert_eq!(&frame[..3], &[0x05, 0x01, 0x02]);
    assert_eq!(&frame[3..5], &[0x01, 5]);
    assert_eq!(&frame[5..10], b"alice");
    assert_eq!(&frame[10..17], &[6, b's', b'e', b'c', b'r', b'e', b't']);
    assert_eq!(&frame[17..], &[0x05, 0x01, 0x00, 0x01, 10, 0, 0, 1, 0, 80]);
}

#[tokio::test]
async fn rejected_credentials_end_the_handshake() {
    let server = ScriptedServer::spawn(Script::new(26, [0x05, 0x02, 0x01, 0x01]).then(AfterReply::Hold))
        .await
        .unwrap();

    let client = TunnelClient::new("127.0.0.1", server.port())
        .with_credentials(Credentials::new("alice", "wrong").unwrap())
        .with_connect_timeout(TEST_TIMEOUT);
    let err = client
        .connect(Address::Ip("10.0.0.1:80".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, SocksError::AuthenticationRejected(0x01)));
}

#[tokio::test]
async fn tunnel_rejection_reports_status() {
    let server = ScriptedServer::spawn(
        Script::new(
            example_com_request().len(),
            [0x05, 0x00, 0x05, 0x05, 0x00, 0x01],
        )
        .then(AfterReply::Hold),
    )
    .await
    .unwrap();

    let client = TunnelClient::new("127.0.0.1", server.port()).with_connect_timeout(TEST_TIMEOUT);
    let err = client
        .connect(Address::domain("example.com", 443))
        .await
        .unwrap_err();
    assert_eq!(err.reply_status(), Some(ReplyStatus::ConnectionRefused));
}

#[tokio::test]
async fn udp_associate_uses_server_ip_for_unspecified_relay() {
    let server = ScriptedServer::spawn(
        Script::new(
            13,
            [0x05, 0x00, 0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0x9C, 0x40],
        )
        .then(AfterReply::Hold),
    )
    .await
    .unwrap();

    let client = TunnelClient::new("127.0.0.1", server.port()).with_connect_timeout(TEST_TIMEOUT);
    let association = client
        .udp_associate(Some("127.0.0.1:5353".parse().unwrap()))
        .await
        .unwrap();
    assert_eq!(association.relay, "127.0.0.1:40000".parse::<SocketAddr>().unwrap());

    let received = server.received().await;
    assert_eq!(
        received[0],
        vec![0x05, 0x01, 0x00, 0x05, 0x03, 0x00, 0x01, 127, 0, 0, 1, 0x14, 0xE9]
    );
}

#[tokio::test]
async fn udp_over_tcp_requests_forward_command() {
    let server = ScriptedServer::spawn(Script::new(
        13,
        [0x05, 0x00, 0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 0],
    ))
    .await
    .unwrap();

    let client = TunnelClient::new("127.0.0.1", server.port()).with_connect_timeout(TEST_TIMEOUT);
    let (tunnel, _stream) = client.establish(UdpOverTcpTunnel::new()).await.unwrap();
    assert_eq!(
        tunnel.relay_address(),
        Some(&Address::Ip("127.0.0.1:0".parse().unwrap()))
    );

    let received = server.received().await;
    assert_eq!(received[0][3..6], [0x05, 0x05, 0x00]);
    assert_eq!(received[0][6..], [0x01, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn silent_server_times_out() {
    let server = ScriptedServer::spawn(Script::new(13, Vec::new()).then(AfterReply::Hold))
        .await
        .unwrap();

    let client = TunnelClient::new("127.0.0.1", server.port())
        .with_connect_timeout(Duration::from_millis(200));
    let err = client
        .connect(Address::Ip("10.0.0.1:80".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, SocksError::Timeout(d) if d == Duration::from_millis(200)));
}

#[tokio::test]
async fn early_close_is_a_short_read() {
    let server = ScriptedServer::spawn(Script::new(13, [0x05]).then(AfterReply::Close))
        .await
        .unwrap();

    let mut session = HandshakeSession::new(ConnectTunnel::new(Address::Ip(
        "10.0.0.1:80".parse().unwrap(),
    )));
    session.connect("127.0.0.1", server.port()).await.unwrap();
    let err = timeout(TEST_TIMEOUT, session.handshake())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, SocksError::ShortRead(Phase::MethodSelection)));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn source_address_is_bound_before_connect() {
    let server = ScriptedServer::spawn(Script::new(
        13,
        [0x05, 0x00, 0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 80],
    ))
    .await
    .unwrap();

    let tunnel = ConnectTunnel::new(Address::Ip("10.0.0.1:80".parse().unwrap()))
        .with_source("127.0.0.1:0".parse().unwrap());
    let mut session = HandshakeSession::new(tunnel);
    session.connect("127.0.0.1", server.port()).await.unwrap();
    session.handshake().await.unwrap();

    let stream = session.into_stream().unwrap();
    assert!(stream.local_addr().unwrap().ip().is_loopback());
}

#[tokio::test]
async fn attach_std_socket() {
    let server = ScriptedServer::spawn(Script::new(
        13,
        [0x05, 0x00, 0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 80],
    ))
    .await
    .unwrap();
    let addr = server.addr;

    let std_stream = tokio::task::spawn_blocking(move || std::net::TcpStream::connect(addr))
        .await
        .unwrap()
        .unwrap();

    let mut session = HandshakeSession::new(ConnectTunnel::new(Address::Ip(
        "10.0.0.1:80".parse().unwrap(),
    )));
    session.attach_std(std_stream).unwrap();
    session.handshake().await.unwrap();
    assert_eq!(session.state(), SessionState::Complete);
}

#[tokio::test]
async fn unresolvable_server_is_unreachable() {
    let mut session = HandshakeSession::new(ConnectTunnel::new(Address::domain("example.com", 443)));
    let err = session
        .connect("no-such-host.invalid", 1080)
        .await
        .unwrap_err();
    assert!(matches!(err, SocksError::ServerUnreachable { .. }));
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn telemetry_counts_handshakes() {
    let server = ScriptedServer::spawn(Script::new(
        13,
        [0x05, 0x00, 0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0, 80],
    ))
    .await
    .unwrap();

    let before = telemetry::handshake_snapshot();
    let client = TunnelClient::new("127.0.0.1", server.port()).with_connect_timeout(TEST_TIMEOUT);
    client
        .connect(Address::Ip("10.0.0.1:80".parse().unwrap()))
        .await
        .unwrap();
    let delta = telemetry::handshake_snapshot().delta(before);

    if std::env::var("SOCKS5_TUNNEL_TELEMETRY").is_err() {
        assert!(delta.handshakes_succeeded >= 1);
        assert!(delta.frame_out_bytes >= 13);
        assert!(delta.reply_in_bytes >= 12);
    }
}
