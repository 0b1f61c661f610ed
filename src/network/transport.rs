//! The FNE peer's datagram transport: a real UDP socket or a null/loopback
//! stub, mirroring the `ModemPort` split in `modem::port`.

use std::io;
use std::net::UdpSocket;

/// Sends and receives whole datagrams to/from the configured FNE master.
pub trait NetworkTransport {
    fn connect(&mut self) -> io::Result<()>;
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
    /// Non-blocking receive: `Ok(None)` when nothing is pending.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

pub struct UdpTransport {
    remote: String,
    local_port: u16,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(remote_addr: String, remote_port: u16, local_port: u16) -> Self {
        Self {
            remote: format!("{remote_addr}:{remote_port}"),
            local_port,
            socket: None,
        }
    }
}

impl NetworkTransport for UdpTransport {
    fn connect(&mut self) -> io::Result<()> {
        let bind_addr = format!("0.0.0.0:{}", self.local_port);
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(&self.remote)?;
        socket.set_nonblocking(true)?;
        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.socket.as_ref() {
            Some(s) => s.send(buf),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "not connected")),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.socket.as_ref() {
            Some(s) => match s.recv(buf) {
                Ok(n) => Ok(Some(n)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    }
}

/// A loopback transport for tests: packets `inject`ed are returned by
/// `recv`, and `send` records what was sent without touching real sockets.
#[derive(Default)]
pub struct NullTransport {
    inbound: std::collections::VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, datagram: Vec<u8>) {
        self.inbound.push_back(datagram);
    }
}

impl NetworkTransport for NullTransport {
    fn connect(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sent.push(buf.to_vec());
        Ok(buf.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        match self.inbound.pop_front() {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(Some(n))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_transport_returns_injected_datagrams() {
        let mut t = NullTransport::new();
        t.inject(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        let n = t.recv(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
        assert_eq!(t.recv(&mut buf).unwrap(), None);
    }

    #[test]
    fn null_transport_records_sent_datagrams() {
        let mut t = NullTransport::new();
        t.send(&[9, 9]).unwrap();
        assert_eq!(t.sent, vec![vec![9, 9]]);
    }
}
