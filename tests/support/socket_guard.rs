//! Skips socket-backed tests where loopback binding is not permitted.

use std::net::TcpListener;

use wiremock::MockServer;

/// Starts a mock server, or returns `None` when loopback sockets are unavailable.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    match TcpListener::bind("127.0.0.1:0") {
        Ok(listener) => drop(listener),
        Err(error) => {
            eprintln!("skipping socket-backed test: cannot bind loopback ({error})");
            return None;
        }
    }
    Some(MockServer::start().await)
}

/// Return value for a skipped test.
pub fn socket_skip_return() {}
