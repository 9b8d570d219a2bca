//! Newline-delimited text over TCP.
//!
//! One [`LineTransport`] per chat surface. Writes go through a shared handle
//! guarded by a mutex; reads run on a cloned socket so closing the transport
//! (which shuts the socket down) unblocks a reader parked in `read`.


use crate::device::Endpoint;
use crate::lock_or_recover;
use crate::{log_debug, log_debug_content};
use serde::Serialize;
use std::fmt;
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("line contains an embedded line separator")]
    EmbeddedSeparator,
    #[error("transport closed")]
    Closed,
}

/// Invoked on every status change, never with a transport lock held.
pub type StatusObserver = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

struct LinkState {
    status: ConnectionStatus,
    // Bumped by every connect and close; stale workers compare against it.
    generation: u64,
}

struct Link {
    endpoint: Endpoint,
    state: Mutex<LinkState>,
    writer: Mutex<Option<TcpStream>>,
    observer: Option<StatusObserver>,
}

impl Link {
    fn notify(&self, status: Option<ConnectionStatus>) {
        if let (Some(status), Some(observer)) = (status, &self.observer) {
            observer(status);
        }
    }

    fn status(&self) -> ConnectionStatus {
        lock_or_recover(&self.state, "transport status").status
    }

    /// Apply `status` if `generation` is still current; drops the writer unless connected.
    fn settle(&self, generation: u64, status: ConnectionStatus) -> bool {
        self.settle_from(generation, None, status)
    }

    /// Like [`settle`](Self::settle), but only while the link is still in `from`.
    fn settle_from(
        &self,
        generation: u64,
        from: Option<ConnectionStatus>,
        status: ConnectionStatus,
    ) -> bool {
        let changed = {
            let mut state = lock_or_recover(&self.state, "transport settle");
            if state.generation != generation {
                return false;
            }
            if from.is_some_and(|from| state.status != from) {
                return false;
            }
            if status != ConnectionStatus::Connected {
                if let Some(stream) = lock_or_recover(&self.writer, "transport settle").take() {
                    let _ = stream.shutdown(Shutdown::Both);
                }
            }
            transition(&mut state, status)
        };
        self.notify(changed);
        true
    }

    fn begin_connect(&self) -> u64 {
        let (generation, changed) = {
            let mut state = lock_or_recover(&self.state, "transport connect");
            state.generation = state.generation.wrapping_add(1);
            if let Some(stream) = lock_or_recover(&self.writer, "transport connect").take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            (
                state.generation,
                transition(&mut state, ConnectionStatus::Connecting),
            )
        };
        self.notify(changed);
        generation
    }

    fn commit(&self, generation: u64, stream: TcpStream) -> bool {
        let changed = {
            let mut state = lock_or_recover(&self.state, "transport commit");
            if state.generation != generation {
                let _ = stream.shutdown(Shutdown::Both);
                return false;
            }
            *lock_or_recover(&self.writer, "transport commit") = Some(stream);
            transition(&mut state, ConnectionStatus::Connected)
        };
        self.notify(changed);
        true
    }

    fn close(&self) {
        let changed = {
            let mut state = lock_or_recover(&self.state, "transport close");
            state.generation = state.generation.wrapping_add(1);
            if let Some(stream) = lock_or_recover(&self.writer, "transport close").take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            transition(&mut state, ConnectionStatus::Disconnected)
        };
        if changed.is_some() {
            log_debug(&format!("transport: closed {}", self.endpoint));
        }
        self.notify(changed);
    }

    /// A failed write ends the connection; the reader's EOF that follows keeps `Failed`.
    fn fail_write(&self, generation: u64, err: &io::Error) {
        log_debug(&format!("transport: write error on {}: {err}", self.endpoint));
        if self.settle(generation, ConnectionStatus::Failed) {
            tracing::warn!(endpoint = %self.endpoint, error = %err, "transport write failed");
        }
    }

    /// Reader-side end of a connection; a status already set by `send` or `close` wins.
    fn settle_reader(&self, generation: u64, status: ConnectionStatus) -> bool {
        self.settle_from(generation, Some(ConnectionStatus::Connected), status)
    }

    fn current_generation(&self) -> u64 {
        lock_or_recover(&self.state, "transport generation").generation
    }

    fn open_reader(&self) -> Result<(BufReader<TcpStream>, u64), TransportError> {
        let state = lock_or_recover(&self.state, "transport reader");
        let writer = lock_or_recover(&self.writer, "transport reader");
        let stream = writer.as_ref().ok_or(TransportError::NotConnected)?;
        let reader = stream.try_clone().map_err(|_| TransportError::NotConnected)?;
        Ok((BufReader::new(reader), state.generation))
    }

    fn read_lines<F>(&self, mut reader: BufReader<TcpStream>, generation: u64, mut on_line: F)
    where
        F: FnMut(&str),
    {
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => {
                    if self.settle_reader(generation, ConnectionStatus::Disconnected) {
                        log_debug(&format!("transport: {} closed by peer", self.endpoint));
                    }
                    break;
                }
                Ok(_) => {
                    if let Some(line) = decode_line(&buf) {
                        log_debug_content(&format!("transport: received {line:?}"));
                        on_line(&line);
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    if self.settle_reader(generation, ConnectionStatus::Failed) {
                        tracing::warn!(endpoint = %self.endpoint, error = %err, "transport read failed");
                        log_debug(&format!("transport: read error on {}: {err}", self.endpoint));
                    }
                    break;
                }
            }
        }
    }
}

fn transition(state: &mut LinkState, status: ConnectionStatus) -> Option<ConnectionStatus> {
    if state.status == status {
        None
    } else {
        state.status = status;
        Some(status)
    }
}

/// Strip the line terminator; empty lines yield `None`.
pub(crate) fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(raw).into_owned())
}

/// Blocking line-oriented TCP client.
pub struct LineTransport {
    link: Arc<Link>,
}

impl LineTransport {
    pub fn new(endpoint: Endpoint) -> Self {
        Self::build(endpoint, None)
    }

    pub fn with_status_observer<F>(self, observer: F) -> Self
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let endpoint = self.link.endpoint.clone();
        Self::build(endpoint, Some(Arc::new(observer)))
    }

    fn build(endpoint: Endpoint, observer: Option<StatusObserver>) -> Self {
        Self {
            link: Arc::new(Link {
                endpoint,
                state: Mutex::new(LinkState {
                    status: ConnectionStatus::Disconnected,
                    generation: 0,
                }),
                writer: Mutex::new(None),
                observer,
            }),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.link.endpoint
    }

    pub fn status(&self) -> ConnectionStatus {
        self.link.status()
    }

    /// Connect, trying each resolved address in turn. No retry on failure.
    pub fn connect(&self, timeout: Duration) -> Result<(), TransportError> {
        let link = &self.link;
        let generation = link.begin_connect();
        let endpoint = link.endpoint.to_string();
        tracing::info!(endpoint = %endpoint, timeout_ms = timeout.as_millis() as u64, "transport connecting");

        let result = resolve(&link.endpoint)
            .map_err(|source| TransportError::Resolve {
                endpoint: endpoint.clone(),
                source,
            })
            .and_then(|addrs| {
                connect_any(&addrs, timeout).map_err(|source| TransportError::Connect {
                    endpoint: endpoint.clone(),
                    source,
                })
            });

        match result {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                if !link.commit(generation, stream) {
                    log_debug(&format!("transport: discarding late connect to {endpoint}"));
                    return Err(TransportError::Closed);
                }
                tracing::info!(endpoint = %endpoint, "transport connected");
                log_debug(&format!("transport: connected to {endpoint}"));
                Ok(())
            }
            Err(err) => {
                if !link.settle(generation, ConnectionStatus::Failed) {
                    return Err(TransportError::Closed);
                }
                tracing::warn!(endpoint = %endpoint, error = %err, "transport connect failed");
                log_debug(&format!("transport: {err}"));
                Err(err)
            }
        }
    }

    /// Write `line` followed by `\n`.
    pub fn send(&self, line: &str) -> Result<(), TransportError> {
        if line.contains(['\n', '\r']) {
            return Err(TransportError::EmbeddedSeparator);
        }
        let generation = self.link.current_generation();
        let result = {
            let mut writer = lock_or_recover(&self.link.writer, "transport send");
            let stream = writer.as_mut().ok_or(TransportError::NotConnected)?;
            let mut framed = Vec::with_capacity(line.len() + 1);
            framed.extend_from_slice(line.as_bytes());
            framed.push(b'\n');
            stream.write_all(&framed).and_then(|()| stream.flush())
        };
        match result {
            Ok(()) => {
                log_debug_content(&format!("transport: sent {line:?}"));
                Ok(())
            }
            Err(err) => {
                self.link.fail_write(generation, &err);
                Err(TransportError::Write(err))
            }
        }
    }

    /// Read lines until EOF, error, or close, calling `on_line` for each non-empty one.
    pub fn receive_loop<F>(&self, on_line: F) -> Result<(), TransportError>
    where
        F: FnMut(&str),
    {
        let (reader, generation) = self.link.open_reader()?;
        self.link.read_lines(reader, generation, on_line);
        Ok(())
    }

    /// Run [`receive_loop`](Self::receive_loop) on a named background thread.
    pub fn spawn_receive_loop<F>(&self, on_line: F) -> Result<thread::JoinHandle<()>, TransportError>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let (reader, generation) = self.link.open_reader()?;
        let link = Arc::clone(&self.link);
        thread::Builder::new()
            .name("voxlink-line-reader".to_string())
            .spawn(move || link.read_lines(reader, generation, on_line))
            .map_err(|err| {
                log_debug(&format!("transport: reader thread spawn failed: {err}"));
                TransportError::Closed
            })
    }

    /// Shut the socket down and mark the transport disconnected. Idempotent.
    pub fn close(&self) {
        self.link.close();
    }
}

impl Drop for LineTransport {
    fn drop(&mut self) {
        self.link.close();
    }
}

fn resolve(endpoint: &Endpoint) -> io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (endpoint.host(), endpoint.port()).to_socket_addrs()?.collect();
    if addrs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::NotFound,
            "host resolved to no addresses",
        ));
    }
    Ok(addrs)
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(ErrorKind::NotFound, "no addresses to try")))
}
