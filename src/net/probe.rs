//! Connect-only reachability probe.
//!
//! Used by the proxy configurator before installing a backend and by the
//! liveness monitor on every tick. A TCP dial never reaches application code
//! on the backend, so probing has no side effects there.

use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;

/// Dial `host:port` and drop the connection immediately.
pub async fn probe_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<()> {
    match time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect timed out after {:?}", timeout),
        )),
    }
}
