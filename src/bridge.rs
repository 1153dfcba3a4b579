//! TCP bridge between the command feeder and the dealiaser.
//!
//! Two halves, run as separate processes. The `bridge` side listens on the
//! command port, confirms readiness with a handshake, and hosts the
//! dealiaser with its stdin fed from the accepted socket and its stdout
//! forwarded to the peer's results port. The `feed` side starts a receiver
//! task that tees the forwarded result stream to a file, then streams lookup
//! commands over the command socket and ends with a quit.
//!
//! Every socket here is single-connection, single-use: accept once, stream,
//! tear down. There is no reconnect, timeout, or authentication.

use crate::config::HarnessConfig;
use crate::dealiaser::Dealiaser;
use crate::error::{HarnessError, Result};
use crate::protocol::Command;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Bytes the bridge sends once the command connection is accepted.
pub const HANDSHAKE: &[u8] = b"begin";

/// Lifecycle of a single-shot connection: bound and waiting, peer attached
/// and bytes moving, or torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkState {
    AwaitingPeer,
    Streaming,
    Closed,
}

/// Tracks one connection's lifecycle. Transitions are one-way.
pub struct Link {
    name: &'static str,
    state: LinkState,
}

impl Link {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: LinkState::AwaitingPeer,
        }
    }

    pub fn advance(&mut self, next: LinkState) {
        debug_assert!(self.state < next, "link may not move backwards");
        debug!("{} link: {:?} -> {:?}", self.name, self.state, next);
        self.state = next;
    }

    pub fn state(&self) -> LinkState {
        self.state
    }
}

/// Background receiver: accepts one connection on the results port and
/// copies every byte into `output` until the peer closes.
pub struct ResultReceiver {
    local_addr: SocketAddr,
    handle: JoinHandle<Result<u64>>,
}

impl ResultReceiver {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the peer to close and the file to be flushed. Returns the
    /// number of bytes written.
    pub async fn join(self) -> Result<u64> {
        self.handle
            .await
            .map_err(|e| HarnessError::ExecutionFailed(format!("receiver task died: {e}")))?
    }
}

/// Bind the results listener and hand the accept-and-copy work to a task.
/// Binding happens before this returns, so the bridge can connect as soon as
/// the command stream is up.
pub async fn start_receiver(addr: &str, output: &Path) -> Result<ResultReceiver> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("Receiver bound to {local_addr}");

    let output = output.to_path_buf();
    let handle = tokio::spawn(async move {
        let mut link = Link::new("results");
        let (mut conn, peer) = listener.accept().await?;
        link.advance(LinkState::Streaming);
        info!("Receiving results from {peer}");

        let mut file = File::create(&output).await?;
        let copied = tokio::io::copy(&mut conn, &mut file).await?;
        file.flush().await?;
        link.advance(LinkState::Closed);
        info!("Result stream closed; wrote {copied} bytes to {}", output.display());
        Ok(copied)
    });

    Ok(ResultReceiver { local_addr, handle })
}

/// Read and verify the readiness handshake from the bridge.
pub async fn expect_handshake<R>(conn: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HANDSHAKE.len()];
    conn.read_exact(&mut buf).await?;
    if buf != HANDSHAKE {
        return Err(HarnessError::Protocol(format!(
            "unexpected handshake: {:?}",
            String::from_utf8_lossy(&buf)
        )));
    }
    Ok(())
}

/// Stream one lookup command per input line, flushing line by line, then a
/// terminal quit. Returns the number of lookups sent.
pub async fn stream_commands<I, W>(input: I, mut out: W) -> Result<u64>
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut sent = 0u64;
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let target = line.trim();
        if target.is_empty() {
            continue;
        }
        let command = Command::lookup(target)?;
        out.write_all(command.encode()?.as_bytes()).await?;
        out.flush().await?;
        sent += 1;
    }
    info!("Consumed inputs. Sending quit command.");
    out.write_all(Command::quit().encode()?.as_bytes()).await?;
    out.flush().await?;
    out.shutdown().await?;
    Ok(sent)
}

/// Sender side: host the dealiaser between the two sockets.
pub async fn run_bridge(config: &HarnessConfig) -> Result<()> {
    let bridge = &config.bridge;
    let listener = TcpListener::bind(bridge.command_addr()).await?;
    info!("Bound command socket on {}", listener.local_addr()?);

    let mut link = Link::new("command");
    let (mut conn, peer) = listener.accept().await?;
    info!("Accepted connection from {peer}");
    conn.write_all(HANDSHAKE).await?;
    link.advance(LinkState::Streaming);

    let mut results_conn = TcpStream::connect(bridge.results_addr()).await?;
    info!("Connected to results peer at {}", bridge.results_addr());

    let dealiaser = Dealiaser::new(config.dealiaser.clone());
    let mut child = dealiaser.spawn_piped()?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| HarnessError::Spawn("dealiaser stdin was not piped".into()))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| HarnessError::Spawn("dealiaser stdout was not piped".into()))?;

    let (mut command_read, _command_write) = conn.into_split();

    let inbound = async {
        // The dealiaser exits on a quit command, which can break the pipe
        // before the socket reaches EOF.
        let copied = match tokio::io::copy(&mut command_read, &mut stdin).await {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!("Dealiaser closed stdin early");
                0
            }
            Err(e) => return Err(HarnessError::Io(e)),
        };
        stdin.shutdown().await.map_err(HarnessError::Io)?;
        Ok(copied)
    };
    let outbound = async {
        let copied = tokio::io::copy(&mut stdout, &mut results_conn).await?;
        results_conn.shutdown().await?;
        Ok::<u64, HarnessError>(copied)
    };

    let (inbound, outbound) = tokio::join!(inbound, outbound);
    let (command_bytes, result_bytes) = (inbound?, outbound?);

    Dealiaser::wait(child).await?;
    link.advance(LinkState::Closed);
    info!("Bridge finished: {command_bytes} command bytes in, {result_bytes} result bytes out");
    Ok(())
}

/// Client side: start the receiver, connect to the bridge, stream the input
/// file, and wait for the teed result stream to be fully on disk.
pub async fn run_feed(
    config: &HarnessConfig,
    input_path: &Path,
    results_file: &Path,
) -> Result<()> {
    let bridge = &config.bridge;
    let receiver = start_receiver(&bridge.results_addr(), results_file).await?;

    let mut conn = TcpStream::connect(bridge.command_addr()).await?;
    let mut link = Link::new("command");
    expect_handshake(&mut conn).await?;
    link.advance(LinkState::Streaming);
    info!("Connected to bridge at {}", bridge.command_addr());

    let (_read_half, write_half) = conn.into_split();
    let input = BufReader::new(File::open(input_path).await?);
    let sent = stream_commands(input, write_half).await?;
    link.advance(LinkState::Closed);
    info!("Sent {sent} lookup commands");

    let received = receiver.join().await?;
    info!("Result stream complete: {received} bytes on disk");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn link_advances_one_way() {
        let mut link = Link::new("test");
        assert_eq!(link.state(), LinkState::AwaitingPeer);
        link.advance(LinkState::Streaming);
        assert_eq!(link.state(), LinkState::Streaming);
        link.advance(LinkState::Closed);
        assert_eq!(link.state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn receiver_writes_exactly_the_delivered_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("dealiasing_results");
        let receiver = start_receiver("127.0.0.1:0", &output).await.unwrap();

        let payload = vec![0xabu8; 4096 * 3 + 17];
        let mut conn = TcpStream::connect(receiver.local_addr()).await.unwrap();
        conn.write_all(&payload).await.unwrap();
        conn.shutdown().await.unwrap();
        drop(conn);

        let copied = receiver.join().await.unwrap();
        assert_eq!(copied, payload.len() as u64);
        let written = std::fs::read(&output).unwrap();
        assert_eq!(written, payload);
    }

    #[tokio::test]
    async fn handshake_accepts_begin_and_rejects_anything_else() {
        let (mut tx, mut rx) = duplex(64);
        tx.write_all(HANDSHAKE).await.unwrap();
        expect_handshake(&mut rx).await.unwrap();

        let (mut tx, mut rx) = duplex(64);
        tx.write_all(b"bogus").await.unwrap();
        let err = expect_handshake(&mut rx).await.unwrap_err();
        assert!(matches!(err, HarnessError::Protocol(_)));
    }

    #[tokio::test]
    async fn streams_commands_and_a_terminal_quit() {
        let (wire_tx, wire_rx) = duplex(1 << 16);
        let input = std::io::Cursor::new("2001:db8::1\n\n2001:db8::2\n");
        let sent = stream_commands(BufReader::new(input), wire_tx).await.unwrap();
        assert_eq!(sent, 2);

        let mut lines = BufReader::new(wire_rx).lines();
        let mut wire = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            wire.push(line);
        }
        assert_eq!(
            wire,
            vec![
                r#"{"Type":"lookup","Data":"2001:db8::1"}"#,
                r#"{"Type":"lookup","Data":"2001:db8::2"}"#,
                r#"{"Type":"quit"}"#,
            ]
        );
    }
}
