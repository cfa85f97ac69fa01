//! §8 scenario 6: orderly shutdown after a successful transfer.

use std::thread;

use sham::{Connection, Listener, State};

#[test]
fn close_drives_both_ends_to_closed_after_a_transfer() {
    let mut listener = Listener::bind(0).expect("bind listener");
    let port = listener.local_addr().unwrap().port();

    let server_thread = thread::spawn(move || {
        let mut conn = listener.accept().expect("accept");
        let mut buf = [0u8; 32];
        let n = conn.recv(&mut buf).expect("recv");
        assert_eq!(&buf[..n], b"bye soon");

        // Observes the client's FIN during its own close handshake.
        let rc = conn.recv(&mut buf).expect("recv after client closed");
        assert_eq!(rc, 0, "orderly peer FIN surfaces as Ok(0)");

        conn.close().expect("server close");
        conn
    });

    let mut client = Connection::new().expect("new connection");
    client.connect("127.0.0.1", port).expect("connect");
    client.send(b"bye soon").expect("send");
    client.close().expect("client close");

    let server = server_thread.join().unwrap();
    assert_eq!(client.state(), State::Closed);
    assert_eq!(server.state(), State::Closed);
}

#[test]
fn close_is_rejected_outside_established() {
    let mut conn = Connection::new().expect("new connection");
    let err = conn.close().unwrap_err();
    assert!(matches!(err, sham::Error::InvalidState));
}

#[test]
fn send_and_recv_are_rejected_before_a_handshake() {
    let mut conn = Connection::new().expect("new connection");
    assert!(matches!(conn.send(b"x"), Err(sham::Error::InvalidState)));
    assert!(matches!(
        conn.recv(&mut [0u8; 8]),
        Err(sham::Error::InvalidState)
    ));
}
