//! Candidate selection: scan window + subject filter over envelopes.

use tracing::{error, info, warn};

use crate::config::{EnvelopeErrorPolicy, SubjectFilter};
use crate::error::ScanError;
use crate::session::{MailSession, SeqRange};
use crate::types::CandidateMessage;

/// Sequence range covering the `max_scan` most recent of `total` messages.
///
/// `None` for an empty mailbox. The range never extends past `total` and
/// its length is `min(total, max_scan)`.
pub fn scan_window(total: u32, max_scan: u32) -> Option<SeqRange> {
    if max_scan == 0 {
        return None;
    }
    let start = if total <= max_scan { 1 } else { total - max_scan + 1 };
    SeqRange::new(start, total)
}

/// Pick the messages in the scan window whose subject passes `filter`.
///
/// A message without a Subject header fails the whole selection. Envelope
/// read errors are handled per `policy`.
pub async fn select_candidates(
    session: &dyn MailSession,
    folder: &str,
    max_scan: u32,
    filter: &SubjectFilter,
    policy: EnvelopeErrorPolicy,
) -> Result<Vec<CandidateMessage>, ScanError> {
    info!("Scanning last {max_scan} emails.");

    let total = session.message_count(folder).await?;
    info!(folder, "Success retrieved {total} emails.");

    let Some(range) = scan_window(total, max_scan) else {
        return Ok(Vec::new());
    };

    info!(%range, "Looking for emails matching the filters.");
    let fetched = match session.fetch_envelopes(range).await {
        Ok(fetched) => fetched,
        Err(e) => {
            error!(%range, "Error while downloading envelopes: {e}");
            return Ok(Vec::new());
        }
    };

    let mut candidates = Vec::new();
    for fetch in fetched {
        let envelope = match fetch.envelope {
            Ok(envelope) => envelope,
            Err(e) => match policy {
                EnvelopeErrorPolicy::Abort => {
                    error!(seq = fetch.seq, "Error while downloading email, stopping scan: {e}");
                    break;
                }
                EnvelopeErrorPolicy::Skip => {
                    warn!(seq = fetch.seq, "Error while downloading email, skip: {e}");
                    continue;
                }
            },
        };

        let Some(subject) = envelope.subject.as_deref() else {
            return Err(ScanError::MissingSubject { seq: fetch.seq });
        };
        if filter.matches(subject) {
            candidates.push(CandidateMessage {
                seq: fetch.seq,
                envelope,
            });
        }
    }

    info!("Found {} matched emails.", candidates.len());
    Ok(candidates)
}
