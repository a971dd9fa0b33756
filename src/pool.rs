/*!
 * @file pool.rs
 * @brief Worker connection pool: one socket-owning task per slot
 */

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::config::{Replica, TlsOptions, TlsProtocol};
use crate::error::{Error, Result};
use crate::wire::{self, Reply};

const CHANNEL_DEPTH: usize = 8;
const ACQUIRE_RETRY: Duration = Duration::from_millis(1);
const MAX_MESSAGE_SIZE: i32 = 48_000_000;

/// One worker task per (replica x pool slot). Callers hand a framed packet
/// to the slot's writer channel and await exactly one reply on its reader
/// channel, so request/response pairs stay FIFO within a slot.
pub(crate) struct ConnectionPool {
    state: Mutex<PoolState>,
}

struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
    request_counter: i32,
}

struct Slot {
    in_use: bool,
    authenticated: bool,
    writer: mpsc::Sender<Vec<u8>>,
    reader: Option<mpsc::Receiver<Result<Reply>>>,
}

/// An acquired slot. Must be returned through
/// [`ConnectionPool::release`]; the pool keeps the slot reserved until
/// then.
pub(crate) struct PooledSocket {
    pub(crate) index: usize,
    pub(crate) authenticated: bool,
    writer: mpsc::Sender<Vec<u8>>,
    reader: mpsc::Receiver<Result<Reply>>,
}

impl PooledSocket {
    /// Send one framed message and wait for its reply.
    pub(crate) async fn round_trip(&mut self, packet: Vec<u8>) -> Result<Reply> {
        self.writer
            .send(packet)
            .await
            .map_err(|_| Error::Communication("connection worker is gone".to_string()))?;
        match self.reader.recv().await {
            Some(reply) => reply,
            None => Err(Error::Communication("connection worker terminated".to_string())),
        }
    }
}

impl ConnectionPool {
    pub(crate) fn new(
        replicas: &[Replica],
        slots_per_replica: usize,
        tls: &TlsOptions,
    ) -> Result<ConnectionPool> {
        let tls_config = if replicas.iter().any(|r| r.tls) {
            Some(Arc::new(build_tls_config(tls)?))
        } else {
            None
        };
        let mut slots = Vec::with_capacity(slots_per_replica * replicas.len());
        for replica in replicas {
            for _ in 0..slots_per_replica {
                let (packet_tx, packet_rx) = mpsc::channel(CHANNEL_DEPTH);
                let (reply_tx, reply_rx) = mpsc::channel(CHANNEL_DEPTH);
                tokio::spawn(worker(replica.clone(), tls_config.clone(), packet_rx, reply_tx));
                slots.push(Slot {
                    in_use: false,
                    authenticated: false,
                    writer: packet_tx,
                    reader: Some(reply_rx),
                });
            }
        }
        Ok(ConnectionPool {
            state: Mutex::new(PoolState { slots, cursor: 0, request_counter: 0 }),
        })
    }

    /// Round-robin scan for a free slot, polling while the pool is
    /// saturated.
    pub(crate) async fn acquire(&self) -> Result<PooledSocket> {
        loop {
            {
                let mut state = self.state.lock();
                if state.slots.is_empty() {
                    return Err(Error::Config("connection pool has no slots".to_string()));
                }
                let in_use: Vec<bool> = state.slots.iter().map(|s| s.in_use).collect();
                if let Some(index) = free_slot_scan(&in_use, state.cursor) {
                    state.cursor = (index + 1) % state.slots.len();
                    let slot = &mut state.slots[index];
                    let reader = slot.reader.take().ok_or_else(|| {
                        Error::InvalidState("pool slot lost its reply channel".to_string())
                    })?;
                    slot.in_use = true;
                    return Ok(PooledSocket {
                        index,
                        authenticated: slot.authenticated,
                        writer: slot.writer.clone(),
                        reader,
                    });
                }
            }
            tokio::time::sleep(ACQUIRE_RETRY).await;
        }
    }

    pub(crate) fn release(&self, socket: PooledSocket) -> Result<()> {
        let mut state = self.state.lock();
        let slot = state
            .slots
            .get_mut(socket.index)
            .ok_or_else(|| Error::InvalidState(format!("unknown pool slot {}", socket.index)))?;
        if !slot.in_use {
            return Err(Error::InvalidState(format!(
                "double release of pool slot {}",
                socket.index
            )));
        }
        slot.in_use = false;
        slot.reader = Some(socket.reader);
        Ok(())
    }

    pub(crate) fn mark_authenticated(&self, index: usize) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slots.get_mut(index) {
            slot.authenticated = true;
        }
    }

    /// Allocates under the same lock as slot selection.
    pub(crate) fn next_request_id(&self) -> i32 {
        let mut state = self.state.lock();
        state.request_counter = wire::next_request_id(state.request_counter);
        state.request_counter
    }
}

/// First free slot at or after `start`, wrapping around once.
pub fn free_slot_scan(in_use: &[bool], start: usize) -> Option<usize> {
    let len = in_use.len();
    (0..len).map(|step| (start + step) % len).find(|&index| !in_use[index])
}

async fn worker(
    replica: Replica,
    tls: Option<Arc<rustls::ClientConfig>>,
    mut packets: mpsc::Receiver<Vec<u8>>,
    replies: mpsc::Sender<Result<Reply>>,
) {
    let outcome = match connect(&replica, tls).await {
        Ok(Stream::Tcp(stream)) => serve(stream, &mut packets, &replies).await,
        Ok(Stream::Tls(stream)) => serve(*stream, &mut packets, &replies).await,
        Err(err) => Err(err),
    };
    match outcome {
        Ok(()) => debug!(host = %replica.host, port = replica.port, "connection worker done"),
        Err(err) => {
            warn!(host = %replica.host, port = replica.port, error = %err, "connection worker failed");
            // Deliver the failure to whoever is (or will be) waiting on
            // this slot; the slot stays dead until the client is rebuilt.
            let _ = replies.send(Err(err)).await;
        }
    }
}

enum Stream {
    Tcp(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

async fn connect(replica: &Replica, tls: Option<Arc<rustls::ClientConfig>>) -> Result<Stream> {
    let tcp = TcpStream::connect((replica.host.as_str(), replica.port)).await?;
    tcp.set_nodelay(true)?;
    if !replica.tls {
        return Ok(Stream::Tcp(tcp));
    }
    let config = tls.ok_or_else(|| {
        Error::Config(format!("replica {}:{} requires TLS", replica.host, replica.port))
    })?;
    let server_name = rustls::ServerName::try_from(replica.host.as_str())
        .map_err(|_| Error::Config(format!("invalid TLS server name {:?}", replica.host)))?;
    let stream = TlsConnector::from(config).connect(server_name, tcp).await?;
    Ok(Stream::Tls(Box::new(stream)))
}

async fn serve<S>(
    mut stream: S,
    packets: &mut mpsc::Receiver<Vec<u8>>,
    replies: &mpsc::Sender<Result<Reply>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(packet) = packets.recv().await {
        if packet.is_empty() {
            break;
        }
        stream.write_all(&packet).await?;

        let mut length_prefix = [0u8; 4];
        stream.read_exact(&mut length_prefix).await?;
        let total = i32::from_le_bytes(length_prefix);
        if total < 16 || total > MAX_MESSAGE_SIZE {
            return Err(Error::Protocol(format!("unreasonable reply length {total}")));
        }
        let mut message = vec![0u8; total as usize];
        message[0..4].copy_from_slice(&length_prefix);
        stream.read_exact(&mut message[4..]).await?;

        let reply = wire::decode_reply(&message)?;
        if replies.send(Ok(reply)).await.is_err() {
            break;
        }
    }
    Ok(())
}

fn build_tls_config(options: &TlsOptions) -> Result<rustls::ClientConfig> {
    let builder = rustls::ClientConfig::builder();
    let builder = match options.protocol {
        TlsProtocol::Auto => builder.with_safe_defaults(),
        TlsProtocol::Tls12 => builder
            .with_safe_default_cipher_suites()
            .with_safe_default_kx_groups()
            .with_protocol_versions(&[&rustls::version::TLS12])
            .map_err(|e| Error::Config(format!("TLS 1.2 unavailable: {e}")))?,
        TlsProtocol::Tls13 => builder
            .with_safe_default_cipher_suites()
            .with_safe_default_kx_groups()
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| Error::Config(format!("TLS 1.3 unavailable: {e}")))?,
    };

    let mut roots = rustls::RootCertStore::empty();
    if let Some(ca_file) = &options.ca_file {
        for cert in read_certs(ca_file)? {
            roots
                .add(&cert)
                .map_err(|e| Error::Config(format!("bad CA certificate in {ca_file:?}: {e}")))?;
        }
    } else if options.verify_peer {
        return Err(Error::Config(
            "peer verification requires a CA file; set verify_peer = false to skip".to_string(),
        ));
    }
    let builder = builder.with_root_certificates(roots);

    let mut config = match (&options.cert_file, &options.key_file) {
        (Some(cert_file), Some(key_file)) => builder
            .with_client_auth_cert(read_certs(cert_file)?, read_private_key(key_file)?)
            .map_err(|e| Error::Config(format!("bad client certificate: {e}")))?,
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(Error::Config(
                "client TLS needs both cert_file and key_file".to_string(),
            ));
        }
    };

    if !options.verify_peer {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyCertificate));
    }
    Ok(config)
}

fn read_certs(path: &std::path::Path) -> Result<Vec<rustls::Certificate>> {
    let data = std::fs::read(path)
        .map_err(|e| Error::Config(format!("cannot read certificate file {path:?}: {e}")))?;
    let certs = rustls_pemfile::certs(&mut data.as_slice())
        .map_err(|e| Error::Config(format!("cannot parse certificates in {path:?}: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Config(format!("no certificates in {path:?}")));
    }
    Ok(certs.into_iter().map(rustls::Certificate).collect())
}

fn read_private_key(path: &std::path::Path) -> Result<rustls::PrivateKey> {
    let data = std::fs::read(path)
        .map_err(|e| Error::Config(format!("cannot read key file {path:?}: {e}")))?;
    let pkcs8 = rustls_pemfile::pkcs8_private_keys(&mut data.as_slice())
        .map_err(|e| Error::Config(format!("cannot parse key file {path:?}: {e}")))?;
    if let Some(key) = pkcs8.into_iter().next() {
        return Ok(rustls::PrivateKey(key));
    }
    let rsa = rustls_pemfile::rsa_private_keys(&mut data.as_slice())
        .map_err(|e| Error::Config(format!("cannot parse key file {path:?}: {e}")))?;
    if let Some(key) = rsa.into_iter().next() {
        return Ok(rustls::PrivateKey(key));
    }
    Err(Error::Config(format!("no private key in {path:?}")))
}

struct AcceptAnyCertificate;

impl rustls::client::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}
