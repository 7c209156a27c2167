//! Message records: envelopes, candidates and the normalized output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One address from a From/To/Reply-To header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl MailAddress {
    pub fn new(name: Option<&str>, address: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.map(str::to_string),
        }
    }
}

/// Lightweight message metadata, read from the header block only.
///
/// Absent address headers are empty vecs; an absent or unparseable Date is `None`.
/// `subject` is `None` when the header is missing and `Some("")` when it is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: Vec<MailAddress>,
    pub to: Vec<MailAddress>,
    pub reply_to: Vec<MailAddress>,
    pub date: Option<DateTime<Utc>>,
    pub subject: Option<String>,
}

impl Envelope {
    /// Parse an RFC 5322 header block (or a full message) into an envelope.
    pub fn from_headers(raw: &[u8]) -> Option<Self> {
        let parsed = mail_parser::MessageParser::default().parse(raw)?;
        Some(Self {
            from: extract_addresses(parsed.from()),
            to: extract_addresses(parsed.to()),
            reply_to: extract_addresses(parsed.reply_to()),
            date: parsed
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
            subject: parsed.subject().map(str::to_string).or_else(|| {
                parsed
                    .header(mail_parser::HeaderName::Subject)
                    .map(|_| String::new())
            }),
        })
    }
}

/// A message picked by the selector, pending content retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMessage {
    /// Mailbox sequence number.
    pub seq: u32,
    pub envelope: Envelope,
}

/// Attachment metadata plus payload. The payload is not serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: Option<String>,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    pub size: usize,
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// Final flattened record for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEmail {
    /// Mailbox sequence number.
    pub id: u32,
    pub from: Vec<MailAddress>,
    pub to: Vec<MailAddress>,
    pub reply_to: Vec<MailAddress>,
    pub date: Option<DateTime<Utc>>,
    /// Subject as parsed from the full message.
    pub subject: Option<String>,
    /// Visible text of the HTML body, whitespace-collapsed. Empty without HTML.
    pub content: String,
    /// Raw HTML body, untouched.
    pub content_html: Option<String>,
    /// Explicit text/plain body, when the message has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,
    pub links: Vec<String>,
    pub attachments: Vec<Attachment>,
}

/// Extract addresses from an optional mail_parser Address field.
///
/// Returns an empty vec if the address is None.
pub fn extract_addresses(addr: Option<&mail_parser::Address>) -> Vec<MailAddress> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    let convert = |a: &mail_parser::Addr| MailAddress::new(a.name.as_deref(), a.address.as_deref());
    match addr {
        mail_parser::Address::List(addrs) => addrs.iter().map(convert).collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter().map(convert))
            .collect(),
    }
}
