use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bitcoin::Transaction;
use bitcoin::consensus::encode as consensus;
use bitcoin::hashes::Hash;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf, ReadHalf, WriteHalf,
    split,
};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tracing::{Instrument, debug, trace, warn};

use super::error::{ElectrumError, Result};
use super::wire::{BalanceResult, HistoryEntry, Request, Response, UtxoRef};
use crate::constants::DEFAULT_CONNECT_TIMEOUT_SECS;

/// Transport used to reach the Electrum server.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Tls,
}

/// Reconnect/keepalive policy for the persistent connection.
#[derive(Clone, Copy, Debug, Deserialize, serde::Serialize)]
pub struct PersistenceConfig {
    pub retry_period_ms: u64,
    pub max_retry: u32,
    pub ping_period_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            retry_period_ms: 1000,
            max_retry: 2,
            ping_period_ms: 120_000,
        }
    }
}

/// Connection parameters for an [`ElectrumGateway`].
#[derive(Clone, Debug, Deserialize, serde::Serialize)]
pub struct ElectrumConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub persistence: PersistenceConfig,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

impl Default for ElectrumConfig {
    fn default() -> Self {
        ElectrumConfig {
            host: "electrum.blockstream.info".to_string(),
            port: 50001,
            protocol: Protocol::Tcp,
            persistence: PersistenceConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Either side of the duplex socket, unified so the reader/writer halves don't need to be
/// generic over the transport. Both variants are `Unpin`, so delegating the poll methods
/// through `get_mut` is sound.
enum Stream {
    Tcp(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// The live half of a connection: the write side plus the bookkeeping the reader task and
/// keepalive task need to keep operating after this handle is cloned out of the gate.
#[derive(Clone)]
struct ConnectionHandle {
    writer: Arc<Mutex<WriteHalf<Stream>>>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
}

enum ConnectionState {
    Disconnected,
    Connected(ConnectionHandle),
}

/// Thin request/response client over the Electrum line-delimited JSON-RPC protocol.
///
/// Holds a single persistent duplex connection, established lazily on the first call. All public
/// methods call [`Self::ensure_ready`] first, which is gated by `state` so that at most one
/// connection attempt is in flight at a time; a caller that arrives while another is connecting
/// simply waits for the same mutex and observes the outcome.
pub struct ElectrumGateway {
    config: ElectrumConfig,
    state: Mutex<ConnectionState>,
    next_id: AtomicU64,
}

impl ElectrumGateway {
    pub fn new(config: ElectrumConfig) -> Self {
        ElectrumGateway {
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            next_id: AtomicU64::new(1),
        }
    }

    /// Closes the connection. A subsequent call reconnects lazily.
    pub async fn dispose(&self) {
        let mut state = self.state.lock().await;
        if let ConnectionState::Connected(handle) = &*state {
            handle.closed.store(true, Ordering::SeqCst);
        }
        *state = ConnectionState::Disconnected;
    }

    async fn ensure_ready(&self) -> Result<ConnectionHandle> {
        let mut state = self.state.lock().await;
        if let ConnectionState::Connected(handle) = &*state
            && !handle.closed.load(Ordering::SeqCst)
        {
            return Ok(handle.clone());
        }

        let connect_timeout = Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS);
        let mut last_err = None;
        for attempt in 0..=self.config.persistence.max_retry {
            match timeout(connect_timeout, self.connect_once()).await {
                Ok(Ok(handle)) => {
                    *state = ConnectionState::Connected(handle.clone());
                    return Ok(handle);
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "electrum connect attempt failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    last_err = Some(ElectrumError::ConnectTimeout(connect_timeout));
                }
            }
            if attempt < self.config.persistence.max_retry {
                tokio::time::sleep(Duration::from_millis(
                    self.config.persistence.retry_period_ms,
                ))
                .await;
            }
        }
        Err(last_err.unwrap_or(ElectrumError::ConnectionClosed))
    }

    async fn connect_once(&self) -> Result<ConnectionHandle> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let tcp = TcpStream::connect(&addr)
            .await
            .map_err(|e| ElectrumError::Connect(e.to_string()))?;

        let stream = match self.config.protocol {
            Protocol::Tcp => Stream::Tcp(tcp),
            Protocol::Tls => {
                let mut roots = tokio_rustls::rustls::RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                let tls_config = tokio_rustls::rustls::ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                let connector = TlsConnector::from(Arc::new(tls_config));
                let server_name = ServerName::try_from(self.config.host.clone())
                    .map_err(|e| ElectrumError::Connect(e.to_string()))?;
                let tls = connector
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| ElectrumError::Connect(e.to_string()))?;
                Stream::Tls(Box::new(tls))
            }
        };

        let (read_half, write_half) = split(stream);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let handle = ConnectionHandle {
            writer: Arc::new(Mutex::new(write_half)),
            pending: pending.clone(),
            closed: closed.clone(),
        };

        tokio::spawn(
            read_loop(read_half, pending, closed)
                .instrument(tracing::info_span!("electrum::read_loop")),
        );

        let ping_period = Duration::from_millis(self.config.persistence.ping_period_ms);
        tokio::spawn(
            ping_loop(handle.clone(), ping_period)
                .instrument(tracing::info_span!("electrum::ping_loop")),
        );

        debug!(host = %self.config.host, port = self.config.port, "electrum connection established");
        Ok(handle)
    }

    #[tracing::instrument(skip(self, params), fields(id))]
    async fn call(&self, method: &'static str, params: Vec<Value>) -> Result<Value> {
        let request_timeout = Duration::from_millis(self.config.request_timeout_ms);
        let handle = self.ensure_ready().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::Span::current().record("id", id);

        let (tx, rx) = oneshot::channel();
        handle.pending.lock().await.insert(id, tx);

        let request = Request::new(id, method, params);
        let mut line = serde_json::to_vec(&request)
            .map_err(|e| ElectrumError::MalformedResponse(e.to_string()))?;
        line.push(b'\n');

        {
            let mut writer = handle.writer.lock().await;
            if let Err(e) = writer.write_all(&line).await {
                handle.pending.lock().await.remove(&id);
                handle.closed.store(true, Ordering::SeqCst);
                return Err(ElectrumError::Connect(e.to_string()));
            }
        }

        let response = match timeout(request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(ElectrumError::ConnectionClosed),
            Err(_) => {
                handle.pending.lock().await.remove(&id);
                return Err(ElectrumError::RequestTimeout(request_timeout));
            }
        };

        if let Some(error) = response.error {
            return Err(ElectrumError::RpcError(error.message));
        }
        response
            .result
            .ok_or_else(|| ElectrumError::MalformedResponse("missing result".to_string()))
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| ElectrumError::MalformedResponse(e.to_string()))
    }

    /// Fee rate for next-block confirmation, in sat/vB, floored at 1.
    pub async fn estimate_fee_per_vbyte(&self) -> Result<u64> {
        let btc_per_kb: f64 = self
            .call_typed("blockchain.estimatefee", vec![Value::from(1)])
            .await?;
        if btc_per_kb <= 0.0 {
            return Ok(1);
        }
        let sat_per_vbyte = (btc_per_kb * 100_000_000.0 / 1000.0).ceil() as u64;
        Ok(sat_per_vbyte.max(1))
    }

    pub async fn script_balance(&self, script_hash_hex: &str) -> Result<BalanceResult> {
        self.call_typed(
            "blockchain.scripthash.get_balance",
            vec![Value::from(script_hash_hex)],
        )
        .await
    }

    pub async fn unspent(&self, script_hash_hex: &str) -> Result<Vec<UtxoRef>> {
        self.call_typed(
            "blockchain.scripthash.listunspent",
            vec![Value::from(script_hash_hex)],
        )
        .await
    }

    pub async fn history(&self, script_hash_hex: &str) -> Result<Vec<HistoryEntry>> {
        self.call_typed(
            "blockchain.scripthash.get_history",
            vec![Value::from(script_hash_hex)],
        )
        .await
    }

    pub async fn get_transaction(&self, txid_hex: &str) -> Result<Transaction> {
        let raw_hex: String = self
            .call_typed("blockchain.transaction.get", vec![Value::from(txid_hex)])
            .await?;
        let bytes = hex::decode(&raw_hex)
            .map_err(|e| ElectrumError::InvalidTransaction(e.to_string()))?;
        consensus::deserialize(&bytes).map_err(|e| ElectrumError::InvalidTransaction(e.to_string()))
    }

    pub async fn broadcast(&self, raw_hex: &str) -> Result<String> {
        self.call_typed(
            "blockchain.transaction.broadcast",
            vec![Value::from(raw_hex)],
        )
        .await
    }
}

/// Derives the Electrum *script hash* addressing primitive: `reverse_bytes(SHA256(script_pubkey))`
/// as hex.
pub fn script_hash_hex(script_pubkey: &bitcoin::Script) -> String {
    let digest = bitcoin::hashes::sha256::Hash::hash(script_pubkey.as_bytes());
    let mut bytes = digest.to_byte_array();
    bytes.reverse();
    hex::encode(bytes)
}

async fn read_loop(read_half: ReadHalf<Stream>, pending: PendingMap, closed: Arc<AtomicBool>) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Response>(trimmed) {
                    Ok(response) => {
                        let Some(id) = response.id else {
                            trace!("discarding electrum notification without request id");
                            continue;
                        };
                        if let Some(sender) = pending.lock().await.remove(&id) {
                            let _ = sender.send(response);
                        } else {
                            trace!(id, "discarding response for unknown request id");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "discarding malformed electrum frame");
                    }
                }
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    let mut pending = pending.lock().await;
    for (_, sender) in pending.drain() {
        let _ = sender.send(Response {
            id: None,
            result: None,
            error: Some(super::wire::ResponseError {
                message: "connection closed".to_string(),
            }),
        });
    }
}

async fn ping_loop(handle: ConnectionHandle, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        if handle.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut line = b"{\"jsonrpc\":\"2.0\",\"id\":0,\"method\":\"server.ping\",\"params\":[]}".to_vec();
        line.push(b'\n');
        let mut writer = handle.writer.lock().await;
        if writer.write_all(&line).await.is_err() {
            drop(writer);
            warn!("electrum keepalive ping failed, marking connection closed");
            handle.closed.store(true, Ordering::SeqCst);
            return;
        }
    }
}
