//! Mail session abstraction: connection, folder lock, envelope and content fetch.
//!
//! The scanner only talks to a [`MailSession`]; [`ImapSession`] is the real
//! backend, tests plug in in-memory ones.

pub mod client;
pub mod lock;

use std::fmt;

use async_trait::async_trait;

use crate::error::SessionError;
use crate::types::Envelope;

pub use client::ImapSession;
pub use lock::{FolderLock, FolderLocks};

/// Inclusive, non-empty range of mailbox sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    start: u32,
    end: u32,
}

impl SeqRange {
    /// `None` unless `1 <= start <= end`.
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start >= 1 && start <= end).then_some(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of sequence numbers covered. Always at least 1.
    pub fn count(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, seq: u32) -> bool {
        (self.start..=self.end).contains(&seq)
    }
}

impl fmt::Display for SeqRange {
    /// IMAP sequence-set syntax.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// One message from an envelope fetch. A message whose header block could not
/// be read carries an error instead of an envelope.
#[derive(Debug)]
pub struct EnvelopeFetch {
    pub seq: u32,
    pub envelope: Result<Envelope, SessionError>,
}

/// Backend-agnostic mailbox access used by the scanner.
#[async_trait]
pub trait MailSession: Send + Sync {
    /// Total number of messages in `folder`.
    async fn message_count(&self, folder: &str) -> Result<u32, SessionError>;

    /// Open `folder` and hold it until the returned lock is released.
    async fn lock_folder(&self, folder: &str) -> Result<FolderLock, SessionError>;

    /// Header-only fetch over `range` in the locked folder, ascending.
    ///
    /// Sequence numbers past the end of the mailbox are not an error, they
    /// are simply absent from the result.
    async fn fetch_envelopes(&self, range: SeqRange) -> Result<Vec<EnvelopeFetch>, SessionError>;

    /// Full raw source of one message. `None` when the server returned no body.
    async fn fetch_raw(&self, seq: u32) -> Result<Option<Vec<u8>>, SessionError>;

    /// End the session.
    async fn logout(&self) -> Result<(), SessionError>;
}
