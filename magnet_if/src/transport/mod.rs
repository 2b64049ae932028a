//! # Transport Module
//!
//! Line oriented sessions to the power supply programmers. A transport only moves text, the
//! settle delays required by the programmer are applied by the caller.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

use crate::ami430::DEFAULT_PORT;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Terminator appended to every command.
pub const TERMINATOR: &str = "\n";

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A session with a single instrument.
pub trait Transport: Send {
    /// Send one command. The terminator is added by the transport.
    fn send(&mut self, command: &str) -> Result<(), TransportError>;

    /// Receive one reply line, with the line ending removed.
    fn receive(&mut self) -> Result<String, TransportError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Options applied when opening a [`TcpTransport`].
#[derive(Debug, Clone, Copy)]
pub struct TcpOptions {
    /// Maximum time to wait for the connection to be established
    pub connect_timeout: Duration,

    /// Maximum time a single `receive` may block
    pub read_timeout: Duration,

    /// How long to keep reading the greeting the programmer sends on connection
    pub banner_timeout: Duration,
}

/// A TCP session with an AMI430 programmer.
pub struct TcpTransport {
    addr: SocketAddr,
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    options: TcpOptions,

    /// A receive timed out, so its reply may still arrive
    stale: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Could not resolve the address \"{0}\"")]
    InvalidAddress(String),

    #[error("Could not connect to {0}: {1}")]
    ConnectError(String, io::Error),

    #[error("Could not configure the socket: {0}")]
    SocketOptionError(io::Error),

    #[error("Could not send the command: {0}")]
    SendError(io::Error),

    #[error("Could not receive a reply: {0}")]
    ReceiveError(io::Error),

    #[error("Timed out waiting for a reply")]
    Timeout,

    #[error("The instrument closed the connection")]
    Closed,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            banner_timeout: Duration::from_millis(500),
        }
    }
}

impl TcpTransport {
    /// Connect to the programmer at `address`.
    ///
    /// The address is `host:port`, if the port is omitted the programmer's default port is used.
    pub fn open(address: &str, options: TcpOptions) -> Result<Self, TransportError> {
        let addr = resolve(address)?;

        let stream = TcpStream::connect_timeout(&addr, options.connect_timeout)
            .map_err(|e| TransportError::ConnectError(address.to_string(), e))?;
        stream
            .set_nodelay(true)
            .map_err(TransportError::SocketOptionError)?;

        let reader = BufReader::new(
            stream
                .try_clone()
                .map_err(TransportError::SocketOptionError)?,
        );

        let mut transport = Self {
            addr,
            writer: stream,
            reader,
            options,
            stale: false,
        };

        // The programmer greets every new connection, which must not be mistaken for a reply
        transport.drain("banner")?;

        debug!("Connected to {}", transport.addr);

        Ok(transport)
    }

    /// The address of the connected instrument.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.writer
            .set_read_timeout(Some(timeout))
            .map_err(TransportError::SocketOptionError)
    }

    /// Discard everything the instrument sends until it has been quiet for `banner_timeout`.
    fn drain(&mut self, what: &str) -> Result<(), TransportError> {
        self.set_read_timeout(self.options.banner_timeout)?;

        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => trace!("{} {}: {}", self.addr, what, line.trim_end()),
            }
        }

        self.set_read_timeout(self.options.read_timeout)
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        // A late reply would otherwise be read as the answer to this command
        if self.stale {
            debug!("{}: discarding late replies", self.addr);
            self.drain("discarded")?;
            self.stale = false;
        }

        trace!("{} <- {}", self.addr, command);

        self.writer
            .write_all(command.as_bytes())
            .and_then(|_| self.writer.write_all(TERMINATOR.as_bytes()))
            .and_then(|_| self.writer.flush())
            .map_err(TransportError::SendError)
    }

    fn receive(&mut self) -> Result<String, TransportError> {
        let mut line = String::new();

        match self.reader.read_line(&mut line) {
            Ok(0) => Err(TransportError::Closed),
            Ok(_) => {
                let reply = line.trim_end_matches(&['\r', '\n'][..]).to_string();
                trace!("{} -> {}", self.addr, reply);
                Ok(reply)
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                self.stale = true;
                Err(TransportError::Timeout)
            }
            Err(e) => Err(TransportError::ReceiveError(e)),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn resolve(address: &str) -> Result<SocketAddr, TransportError> {
    let with_port = if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, DEFAULT_PORT)
    };

    with_port
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| TransportError::InvalidAddress(address.to_string()))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_resolve_default_port() {
        let addr = resolve("127.0.0.1").expect("should resolve");
        assert_eq!(addr.port(), DEFAULT_PORT);
        assert!(resolve("not an address").is_err());
    }

    #[test]
    fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            stream
                .write_all(b"American Magnetics Model 430 IP Interface\r\nHello.\r\n")
                .expect("banner");

            let mut buf = [0u8; 7];
            stream.read_exact(&mut buf).expect("read command");
            assert_eq!(&buf, b"STATE?\n");

            stream.write_all(b"2\r\n").expect("reply");
        });

        let options = TcpOptions {
            banner_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let mut transport =
            TcpTransport::open(&format!("127.0.0.1:{}", port), options).expect("open");

        transport.send("STATE?").expect("send");
        assert_eq!(transport.receive().expect("receive"), "2");

        server.join().expect("server thread");

        // Server has hung up
        assert!(matches!(transport.receive(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_late_reply_is_discarded() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");

            let mut buf = [0u8; 11];
            stream.read_exact(&mut buf).expect("read command");
            assert_eq!(&buf, b"FIELD:MAG?\n");

            // Answer after the client has given up
            thread::sleep(Duration::from_millis(300));
            stream.write_all(b"0.5000\r\n").expect("late reply");

            let mut buf = [0u8; 7];
            stream.read_exact(&mut buf).expect("read command");
            assert_eq!(&buf, b"STATE?\n");
            stream.write_all(b"2\r\n").expect("reply");
        });

        let options = TcpOptions {
            read_timeout: Duration::from_millis(100),
            banner_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let mut transport =
            TcpTransport::open(&format!("127.0.0.1:{}", port), options).expect("open");

        transport.send("FIELD:MAG?").expect("send");
        assert!(matches!(transport.receive(), Err(TransportError::Timeout)));

        transport.send("STATE?").expect("send");
        assert_eq!(transport.receive().expect("receive"), "2");

        server.join().expect("server thread");
    }
}
