//! IMAP session over rustls (or plain TCP), driven on the blocking pool.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imap::types::UnsolicitedResponse;
use imap_proto::types::StatusAttribute;
use rustls::{ClientConnection, StreamOwned};
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::lock::{FolderLock, FolderLocks};
use super::{EnvelopeFetch, MailSession, SeqRange};
use crate::config::ImapConfig;
use crate::error::SessionError;
use crate::types::Envelope;

type ImapClient = imap::Session<MailStream>;

/// Transport under the IMAP client.
enum MailStream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for MailStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MailStream::Plain(s) => s.read(buf),
            MailStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for MailStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MailStream::Plain(s) => s.write(buf),
            MailStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MailStream::Plain(s) => s.flush(),
            MailStream::Tls(s) => s.flush(),
        }
    }
}

/// Authenticated IMAP session.
///
/// The blocking `imap` client sits behind an async mutex. A command first
/// waits for the client, then runs on `spawn_blocking` bounded by the
/// configured I/O timeout, so queueing behind another command never eats
/// into that budget.
pub struct ImapSession {
    inner: Arc<Mutex<ImapClient>>,
    host: String,
    account: String,
    io_timeout: Duration,
    locks: &'static FolderLocks,
}

impl ImapSession {
    /// Connect, read the greeting and log in.
    pub async fn connect(config: &ImapConfig) -> Result<Self, SessionError> {
        info!(host = %config.host, port = config.port, "Login to IMAP server");

        let cfg = config.clone();
        let client = run_blocking("connect", config.connect_timeout, move || open(&cfg)).await?;

        info!(host = %config.host, "Logged in to IMAP server");
        Ok(Self {
            inner: Arc::new(Mutex::new(client)),
            host: config.host.clone(),
            account: format!("{}@{}:{}", config.username, config.host, config.port),
            io_timeout: config.io_timeout,
            locks: FolderLocks::global(),
        })
    }

    async fn with_client<T, F>(&self, operation: &'static str, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut ImapClient) -> Result<T, SessionError> + Send + 'static,
        T: Send + 'static,
    {
        let mut client = Arc::clone(&self.inner).lock_owned().await;
        run_blocking(operation, self.io_timeout, move || f(&mut client)).await
    }
}

#[async_trait]
impl MailSession for ImapSession {
    async fn message_count(&self, folder: &str) -> Result<u32, SessionError> {
        let name = folder.to_string();
        self.with_client("status", move |client| {
            // The MESSAGES count arrives as an untagged STATUS response, which
            // the client queues with the other unsolicited responses.
            while client.unsolicited_responses.try_recv().is_ok() {}
            let mailbox = client
                .status(&name, "(MESSAGES)")
                .map_err(|e| SessionError::MailboxUnavailable {
                    folder: name.clone(),
                    reason: e.to_string(),
                })?;

            let mut exact = None;
            let mut other = None;
            while let Ok(response) = client.unsolicited_responses.try_recv() {
                let UnsolicitedResponse::Status { mailbox, attributes } = response else {
                    continue;
                };
                let messages = attributes.iter().find_map(|attr| match attr {
                    StatusAttribute::Messages(n) => Some(*n),
                    _ => None,
                });
                if mailbox == name {
                    exact = messages.or(exact);
                } else {
                    other = messages.or(other);
                }
            }
            Ok(exact.or(other).unwrap_or(mailbox.exists))
        })
        .await
        .map_err(|e| match e {
            SessionError::MailboxUnavailable { .. } => e,
            other => SessionError::MailboxUnavailable {
                folder: folder.to_string(),
                reason: other.to_string(),
            },
        })
    }

    async fn lock_folder(&self, folder: &str) -> Result<FolderLock, SessionError> {
        let guard = self
            .locks
            .acquire(&format!("{}/{}", self.account, folder))
            .await;

        let name = folder.to_string();
        self.with_client("examine", move |client| {
            client
                .examine(&name)
                .map(|_| ())
                .map_err(|e| SessionError::FolderLock {
                    folder: name.clone(),
                    reason: e.to_string(),
                })
        })
        .await
        .map_err(|e| match e {
            SessionError::FolderLock { .. } => e,
            other => SessionError::FolderLock {
                folder: folder.to_string(),
                reason: other.to_string(),
            },
        })?;

        info!(folder, "Selected folder");
        let inner = Arc::clone(&self.inner);
        let timeout = self.io_timeout;
        Ok(FolderLock::new(folder, guard).on_release(move || close_folder(inner, timeout)))
    }

    async fn fetch_envelopes(&self, range: SeqRange) -> Result<Vec<EnvelopeFetch>, SessionError> {
        self.with_client("fetch", move |client| {
            let fetches = client
                .fetch(range.to_string(), "BODY.PEEK[HEADER]")
                .map_err(|e| SessionError::Fetch {
                    seq: range.start(),
                    reason: e.to_string(),
                })?;

            // Unsolicited FETCH responses (flag updates) can be interleaved,
            // so a header-less entry only counts if no real one shows up.
            let mut by_seq: BTreeMap<u32, Result<Envelope, SessionError>> = BTreeMap::new();
            for fetch in fetches.iter().filter(|f| range.contains(f.message)) {
                let seq = fetch.message;
                match fetch.header() {
                    Some(raw) => {
                        let envelope = Envelope::from_headers(raw).ok_or(SessionError::Fetch {
                            seq,
                            reason: "unparseable header block".into(),
                        });
                        by_seq.insert(seq, envelope);
                    }
                    None => {
                        by_seq.entry(seq).or_insert(Err(SessionError::Fetch {
                            seq,
                            reason: "no header in FETCH response".into(),
                        }));
                    }
                }
            }

            Ok(by_seq
                .into_iter()
                .map(|(seq, envelope)| EnvelopeFetch { seq, envelope })
                .collect())
        })
        .await
    }

    async fn fetch_raw(&self, seq: u32) -> Result<Option<Vec<u8>>, SessionError> {
        self.with_client("fetch", move |client| {
            let fetches = client
                .fetch(seq.to_string(), "BODY.PEEK[]")
                .map_err(|e| SessionError::Fetch {
                    seq,
                    reason: e.to_string(),
                })?;
            Ok(fetches
                .iter()
                .filter(|f| f.message == seq)
                .find_map(|f| f.body())
                .map(<[u8]>::to_vec))
        })
        .await
    }

    async fn logout(&self) -> Result<(), SessionError> {
        let host = self.host.clone();
        self.with_client("logout", move |client| {
            client.logout().map_err(|e| SessionError::Connection {
                host,
                reason: e.to_string(),
            })
        })
        .await
    }
}

/// Run a blocking IMAP call on the blocking pool, bounded by `timeout`.
///
/// On timeout the call keeps running in the background until its socket
/// timeout fires; the caller just stops waiting.
async fn run_blocking<T, F>(
    operation: &'static str,
    timeout: Duration,
    f: F,
) -> Result<T, SessionError>
where
    F: FnOnce() -> Result<T, SessionError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(SessionError::Worker(e.to_string())),
        Err(_) => Err(SessionError::Timeout { operation, timeout }),
    }
}

/// TCP connect + optional TLS + greeting + LOGIN.
fn open(config: &ImapConfig) -> Result<ImapClient, SessionError> {
    let connection_error = |reason: String| SessionError::Connection {
        host: config.host.clone(),
        reason,
    };

    let tcp = connect_tcp(&config.host, config.port, config.connect_timeout)
        .map_err(|e| connection_error(e.to_string()))?;
    tcp.set_read_timeout(Some(config.io_timeout))
        .and_then(|()| tcp.set_write_timeout(Some(config.io_timeout)))
        .map_err(|e| connection_error(e.to_string()))?;

    let stream = if config.use_tls {
        MailStream::Tls(Box::new(tls_stream(&config.host, tcp).map_err(connection_error)?))
    } else {
        MailStream::Plain(tcp)
    };

    let mut client = imap::Client::new(stream);
    client
        .read_greeting()
        .map_err(|e| connection_error(format!("no greeting: {e}")))?;

    client
        .login(&config.username, config.password.expose_secret())
        .map_err(|(e, _)| SessionError::Auth {
            user: config.username.clone(),
            reason: e.to_string(),
        })
}

/// Resolve and try every address in order with a connect timeout.
fn connect_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, "Connect failed: {e}");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {host}"))
    }))
}

fn tls_stream(
    host: &str,
    tcp: TcpStream,
) -> Result<StreamOwned<ClientConnection, TcpStream>, String> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let tls_config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| e.to_string())?
    .with_root_certificates(root_store)
    .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_string()).map_err(|e| e.to_string())?;
    let conn =
        ClientConnection::new(Arc::new(tls_config), server_name).map_err(|e| e.to_string())?;
    Ok(StreamOwned::new(conn, tcp))
}

/// CLOSE the examined folder. A failed CLOSE only matters to the log.
async fn close_folder(inner: Arc<Mutex<ImapClient>>, timeout: Duration) {
    let mut client = inner.lock_owned().await;
    let closed = run_blocking("close", timeout, move || {
        client.close().map_err(|e| SessionError::Worker(e.to_string()))
    })
    .await;
    if let Err(e) = closed {
        debug!("CLOSE failed: {e}");
    }
}
