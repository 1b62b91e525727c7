//! RFC 5322 rendering of the outgoing message.

use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Longest base64 body line
const BODY_LINE_LEN: usize = 76;
/// Raw bytes per encoded-word, keeps each word under 75 characters
const ENCODED_WORD_BYTES: usize = 45;

/// One message ready to hand to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl OutgoingMail {
    /// Build the message; the HTML part wraps the text verbatim in `<pre>`.
    pub fn new(from: &str, to: &str, subject: &str, message: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            text: message.to_string(),
            html: format!("<pre>{message}</pre>"),
        }
    }

    /// Render headers and a `multipart/alternative` body with CRLF line endings.
    pub fn render(&self, message_id: &str, date: DateTime<Utc>) -> Vec<u8> {
        let boundary = format!("----=_Part_{}", Uuid::new_v4().simple());
        let mut out = String::new();

        push_line(&mut out, &format!("From: <{}>", self.from));
        push_line(&mut out, &format!("To: <{}>", self.to));
        push_line(&mut out, &format!("Subject: {}", encode_header(&self.subject)));
        push_line(&mut out, &format!("Date: {}", date.to_rfc2822()));
        push_line(&mut out, &format!("Message-ID: {message_id}"));
        push_line(&mut out, "MIME-Version: 1.0");
        push_line(
            &mut out,
            &format!("Content-Type: multipart/alternative; boundary=\"{boundary}\""),
        );
        push_line(&mut out, "");

        push_part(&mut out, &boundary, "text/plain", &self.text);
        push_part(&mut out, &boundary, "text/html", &self.html);
        push_line(&mut out, &format!("--{boundary}--"));

        out.into_bytes()
    }
}

/// `<uuid@domain>` using the sender's domain
pub fn generate_message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
        .unwrap_or("localhost");
    format!("<{}@{domain}>", Uuid::new_v4())
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push_str("\r\n");
}

fn push_part(out: &mut String, boundary: &str, content_type: &str, content: &str) {
    push_line(out, &format!("--{boundary}"));
    push_line(out, &format!("Content-Type: {content_type}; charset=utf-8"));
    push_line(out, "Content-Transfer-Encoding: base64");
    push_line(out, "");

    let encoded = base64::engine::general_purpose::STANDARD.encode(content.as_bytes());
    // base64 output is ASCII, so byte chunks are valid str slices
    for chunk in encoded.as_bytes().chunks(BODY_LINE_LEN) {
        push_line(out, &String::from_utf8_lossy(chunk));
    }
}

/// Header values that are not plain printable ASCII become RFC 2047
/// encoded-words, folded onto continuation lines.
fn encode_header(value: &str) -> String {
    let plain = value.bytes().all(|b| (0x20..0x7f).contains(&b));
    if plain {
        return value.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in value.chars() {
        if chunk.len() + ch.len_utf8() > ENCODED_WORD_BYTES {
            words.push(encoded_word(&chunk));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(encoded_word(&chunk));
    }

    words.join("\r\n ")
}

fn encoded_word(chunk: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(chunk.as_bytes());
    format!("=?UTF-8?B?{encoded}?=")
}
