//! Retrieval pipeline: lock → select → fetch → normalize.
//!
//! Per-message content failures are logged and the message is dropped from
//! the output. Everything before content retrieval is fatal.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::selector::select_candidates;
use crate::config::ScanConfig;
use crate::error::Result;
use crate::normalize::normalize;
use crate::session::{ImapSession, MailSession};
use crate::types::{CandidateMessage, NormalizedEmail};

/// Connect to the configured IMAP server, scan once, log out.
pub async fn run(config: &ScanConfig) -> Result<Vec<NormalizedEmail>> {
    config.validate()?;

    let session = ImapSession::connect(&config.imap).await?;
    let result = scan(&session, config).await;

    if let Err(e) = session.logout().await {
        warn!("Logout failed: {e}");
    }
    result
}

/// Scan the configured folder over an established session.
///
/// The folder lock is held for the whole scan and released exactly once,
/// whatever the outcome. The release finishes before this returns, so the
/// session is idle afterwards. Records come back in ascending sequence order.
pub async fn scan(session: &dyn MailSession, config: &ScanConfig) -> Result<Vec<NormalizedEmail>> {
    info!(folder = %config.folder, "Select folder in webmail.");
    let mut lock = session.lock_folder(&config.folder).await?;

    let result = scan_locked(session, config).await;

    lock.release().await;
    result
}

async fn scan_locked(
    session: &dyn MailSession,
    config: &ScanConfig,
) -> Result<Vec<NormalizedEmail>> {
    let candidates = select_candidates(
        session,
        &config.folder,
        config.max_scan,
        &config.subject_filter,
        config.envelope_errors,
    )
    .await?;
    let selected = candidates.len();

    // `buffered` keeps input order while letting the next fetch run
    // during normalization of the current message.
    let emails: Vec<NormalizedEmail> = stream::iter(candidates)
        .map(|candidate| retrieve(session, candidate))
        .buffered(config.prefetch.max(1))
        .filter_map(|email| async move { email })
        .collect()
        .await;

    info!(selected, retrieved = emails.len(), "Scan finished");
    Ok(emails)
}

/// Fetch and normalize one candidate. `None` means it was skipped.
async fn retrieve(session: &dyn MailSession, candidate: CandidateMessage) -> Option<NormalizedEmail> {
    let seq = candidate.seq;
    let raw = match session.fetch_raw(seq).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            warn!(seq, "Email has no content, skip.");
            return None;
        }
        Err(e) => {
            warn!(seq, "Error while downloading email content, skip: {e}");
            return None;
        }
    };

    let Some(content) = normalize(&raw) else {
        warn!(seq, "Cannot parse email content, skip.");
        return None;
    };
    Some(content.into_email(candidate))
}
