//! §8 scenario 1: clean three-way handshake, both ends reach ESTABLISHED.

use std::thread;

use sham::{Connection, Listener, State};

#[test]
fn handshake_reaches_established_on_both_ends() {
    let mut listener = Listener::bind(0).expect("bind listener");
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || listener.accept().expect("accept"));

    let mut client = Connection::new().expect("new connection");
    client.connect("127.0.0.1", port).expect("connect");

    let server = server.join().expect("server thread panicked");

    assert_eq!(client.state(), State::Established);
    assert_eq!(server.state(), State::Established);
}

#[test]
fn connect_fails_fast_against_a_silent_peer() {
    // Nothing is listening on this port; the handshake must time out and
    // report HandshakeFailed rather than hang.
    let probe = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let dead_port = probe.local_addr().unwrap().port();
    drop(probe);

    let mut client = Connection::new().expect("new connection");
    let err = client.connect("127.0.0.1", dead_port).unwrap_err();
    assert!(matches!(err, sham::Error::HandshakeFailed(_)));
}
