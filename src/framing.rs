//! File-transfer framing helpers (§4.7, §6): the wire shape the (out of
//! scope) driver programs build their push/pull file transfer on top of.
//! The on-disk write and MD5 verification stay with the driver; this
//! crate only implements the framing contract over an established
//! [`Connection`].

use crate::conn::Connection;
use crate::Error;

/// Writes 1 byte of filename length, the filename, a 4-byte big-endian
/// file size, then the payload — each piece via [`Connection::send`].
pub fn send_framed(conn: &mut Connection, filename: &str, payload: &[u8]) -> Result<(), Error> {
    let name_bytes = filename.as_bytes();
    if name_bytes.len() > u8::MAX as usize {
        return Err(Error::MalformedDatagram("filename longer than 255 bytes"));
    }

    conn.send(&[name_bytes.len() as u8])?;
    if !name_bytes.is_empty() {
        conn.send(name_bytes)?;
    }
    conn.send(&(payload.len() as u32).to_be_bytes())?;
    if !payload.is_empty() {
        conn.send(payload)?;
    }
    Ok(())
}

/// Reads the shape [`send_framed`] writes. Blocks until the whole frame
/// (filename + announced payload size) has arrived.
pub fn recv_framed(conn: &mut Connection) -> Result<(String, Vec<u8>), Error> {
    let name_len = recv_exact(conn, 1)?[0] as usize;
    let name_bytes = if name_len > 0 {
        recv_exact(conn, name_len)?
    } else {
        Vec::new()
    };
    let filename = String::from_utf8(name_bytes)
        .map_err(|_| Error::MalformedDatagram("filename is not valid UTF-8"))?;

    let size_bytes = recv_exact(conn, 4)?;
    let size = u32::from_be_bytes(size_bytes.try_into().unwrap()) as usize;

    let payload = if size > 0 {
        recv_exact(conn, size)?
    } else {
        Vec::new()
    };

    Ok((filename, payload))
}

/// Repeatedly calls [`Connection::recv`] until exactly `len` bytes have
/// been accumulated. `Connection::recv` only ever returns `Ok(0)` on an
/// orderly peer FIN, which here means the frame was cut short.
fn recv_exact(conn: &mut Connection, len: usize) -> Result<Vec<u8>, Error> {
    let mut out = vec![0u8; len];
    let mut got = 0usize;
    while got < len {
        let n = conn.recv(&mut out[got..])?;
        if n == 0 {
            return Err(Error::MalformedDatagram("peer closed before frame completed"));
        }
        got += n;
    }
    Ok(out)
}
