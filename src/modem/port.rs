//! The modem's byte transport: a real serial port or a null/loopback stub.
//!
//! Grounded on the teacher's `port::open` (opens a `Box<dyn
//! serialport::SerialPort>` with fixed settings) and on
//! `original_source/modem/port/ModemNullPort.cpp`, which exists purely so
//! the host can run its open/clock/dispatch logic without real hardware
//! attached, echoing nothing and reporting no bytes available.

use std::io;
use std::time::Duration;

/// The byte-level transport a `Modem` session reads framed messages from
/// and writes commands to.
pub trait ModemPort {
    fn open(&mut self) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    /// Number of bytes currently buffered and ready to read without
    /// blocking. Used by the receive loop to avoid blocking reads when
    /// nothing is pending.
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

/// A real serial port, opened with the same fixed settings style as the
/// teacher's `port::open` (explicit baud rate and read timeout rather than
/// a builder chain).
pub struct SerialPortImpl {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialPortImpl {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
        }
    }
}

impl ModemPort for SerialPortImpl {
    fn open(&mut self) -> io::Result<()> {
        let mut settings = serialport::SerialPortSettings::default();
        settings.baud_rate = self.baud_rate;
        settings.timeout = Duration::from_millis(100);
        let port = serialport::open_with_settings(&self.path, &settings)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.port = None;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.as_mut() {
            Some(p) => p.read(buf),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "port not open")),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.port.as_mut() {
            Some(p) => p.write(buf),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "port not open")),
        }
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        match self.port.as_mut() {
            Some(p) => p.bytes_to_read(),
            None => Ok(0),
        }
    }
}

/// A loopback/simulation port with no real hardware behind it: writes are
/// discarded (or optionally mirrored into the read side for loopback
/// tests), and reads always report nothing pending.
#[derive(Default)]
pub struct NullModemPort {
    loopback: std::collections::VecDeque<u8>,
    mirror_writes: bool,
}

impl NullModemPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// A null port that echoes everything written back to the reader, used
    /// to drive the Rx state machine in tests without real hardware.
    pub fn loopback() -> Self {
        Self {
            loopback: Default::default(),
            mirror_writes: true,
        }
    }

    /// Queues bytes as if they had arrived from the air interface.
    pub fn inject(&mut self, bytes: &[u8]) {
        self.loopback.extend(bytes.iter().copied());
    }
}

impl ModemPort for NullModemPort {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.loopback.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mirror_writes {
            self.loopback.extend(buf.iter().copied());
        }
        Ok(buf.len())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.loopback.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_port_loopback_echoes_writes() {
        let mut port = NullModemPort::loopback();
        port.write(&[1, 2, 3]).unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(port.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn null_port_without_loopback_never_has_data() {
        let mut port = NullModemPort::new();
        port.write(&[1, 2, 3]).unwrap();
        assert_eq!(port.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn null_port_inject_simulates_air_interface() {
        let mut port = NullModemPort::new();
        port.inject(&[0xFE, 0x05, 0x70, 0, 0]);
        let mut buf = [0u8; 5];
        assert_eq!(port.read(&mut buf).unwrap(), 5);
    }
}
