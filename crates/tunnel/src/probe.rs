// Loopback probes for the forwarded database port.
//
// Both probes absorb every failure into `false` so status reporting can
// never crash on a dead tunnel.

use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Timeout for the bare liveness connect.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Timeout for the greeting probe (connect and read).
pub const GREETING_TIMEOUT: Duration = Duration::from_secs(5);

/// MariaDB announces itself in the first handshake packet.
const GREETING_READ_LIMIT: usize = 100;
const GREETING_SIGNATURES: &[&[u8]] = &[b"mariadb", b"mysql"];

fn local_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// True iff something accepts TCP connections on 127.0.0.1:`port`.
pub fn port_open(port: u16) -> bool {
    TcpStream::connect_timeout(&local_addr(port), CONNECT_TIMEOUT).is_ok()
}

/// True iff the service on 127.0.0.1:`port` greets like a MariaDB/MySQL
/// server within the timeout.
pub fn database_greeting(port: u16) -> bool {
    read_greeting(port)
        .map(|greeting| {
            let lowered = greeting.to_ascii_lowercase();
            GREETING_SIGNATURES
                .iter()
                .any(|sig| contains_subslice(&lowered, sig))
        })
        .unwrap_or(false)
}

fn read_greeting(port: u16) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect_timeout(&local_addr(port), GREETING_TIMEOUT)?;
    stream.set_read_timeout(Some(GREETING_TIMEOUT))?;
    let mut buffer = [0u8; GREETING_READ_LIMIT];
    let read = stream.read(&mut buffer)?;
    Ok(buffer[..read].to_vec())
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    /// Bind and immediately drop a listener to find a port with nothing
    /// listening on it.
    fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn closed_port_reports_false_without_panicking() {
        let port = unused_port();
        assert!(!port_open(port));
        assert!(!database_greeting(port));
    }

    #[test]
    fn open_port_reports_true() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_open(port));
    }

    #[test]
    fn mariadb_greeting_is_recognized() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                // Leading protocol byte and version string, as MariaDB
                // sends them.
                let _ = stream.write_all(b"\x0a11.4.2-MariaDB-log\x00");
            }
        });
        assert!(database_greeting(port));
    }

    #[test]
    fn silent_listener_is_not_a_database() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let _ = stream.write_all(b"SSH-2.0-OpenSSH_9.7");
            }
        });
        assert!(!database_greeting(port));
    }

    #[test]
    fn signature_match_is_case_insensitive() {
        let lowered = b"5.7.44 mysql community server".to_ascii_lowercase();
        assert!(contains_subslice(&lowered, b"mysql"));
        assert!(!contains_subslice(&lowered, b"mariadb"));
        assert!(!contains_subslice(b"", b"mysql"));
    }
}
