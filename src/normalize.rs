//! Raw MIME message → flat content record.

use mail_parser::{Message, MessageParser, MimeHeaders, PartType};
use scraper::Html;

use crate::links::extract_links;
use crate::types::{Attachment, CandidateMessage, NormalizedEmail};

/// Content fields derived from one raw message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedContent {
    pub subject: Option<String>,
    pub content_html: Option<String>,
    pub text_body: Option<String>,
    pub content: String,
    pub links: Vec<String>,
    pub attachments: Vec<Attachment>,
}

impl NormalizedContent {
    /// Pair content with the envelope of the candidate it was fetched for.
    pub fn into_email(self, candidate: CandidateMessage) -> NormalizedEmail {
        let envelope = candidate.envelope;
        NormalizedEmail {
            id: candidate.seq,
            from: envelope.from,
            to: envelope.to,
            reply_to: envelope.reply_to,
            date: envelope.date,
            subject: self.subject,
            content: self.content,
            content_html: self.content_html,
            text_body: self.text_body,
            links: self.links,
            attachments: self.attachments,
        }
    }
}

/// Parse a raw RFC 5322 message and flatten it.
///
/// Returns `None` only when the bytes cannot be read as a message at all.
/// A missing subject or body is not an error.
pub fn normalize(raw: &[u8]) -> Option<NormalizedContent> {
    let message = MessageParser::default().parse(raw)?;

    let content_html = html_body(&message).map(str::to_string);
    let content = content_html
        .as_deref()
        .map(|html| collapse_whitespace(&html_to_text(html)))
        .unwrap_or_default();
    let links = extract_links(&content);

    Some(NormalizedContent {
        subject: message.subject().map(str::to_string),
        text_body: text_body(&message).map(str::to_string),
        content_html,
        content,
        links,
        attachments: attachments(&message),
    })
}

/// Visible text of an HTML document. `<style>` contents count as text.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document.root_element().text().collect()
}

/// Strip layout noise from flattened HTML text.
///
/// Drops tabs and line breaks, removes double-space pairs, strips the first
/// literal `<!doctype html>` and trims. Lossy, but the same input always
/// gives the same output.
pub fn collapse_whitespace(text: &str) -> String {
    let flat: String = text
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect();
    flat.replace("  ", "")
        .replacen("<!doctype html>", "", 1)
        .trim()
        .to_string()
}

/// The first real text/html part. mail-parser synthesizes HTML from plain
/// text on `body_html`, so the part type is checked directly.
fn html_body<'a>(message: &'a Message<'_>) -> Option<&'a str> {
    message
        .html_body
        .iter()
        .filter_map(|id| message.part(*id))
        .find_map(|part| match &part.body {
            PartType::Html(html) => Some(html.as_ref()),
            _ => None,
        })
}

fn text_body<'a>(message: &'a Message<'_>) -> Option<&'a str> {
    message
        .text_body
        .iter()
        .filter_map(|id| message.part(*id))
        .find_map(|part| match &part.body {
            PartType::Text(text) => Some(text.as_ref()),
            _ => None,
        })
}

fn attachments(message: &Message<'_>) -> Vec<Attachment> {
    message
        .attachments()
        .map(|part| {
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let content = part.contents().to_vec();
            Attachment {
                filename: part.attachment_name().map(str::to_string),
                content_type,
                content_id: part.content_id().map(str::to_string),
                size: content.len(),
                content,
            }
        })
        .collect()
}
