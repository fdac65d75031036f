//! The MIME message model.
//!
//! A [`Message`] is either being composed for sending or was received from a
//! FETCH. Composition is plain field assignment followed by a single
//! [`Message::to_bytes`] call. A received message keeps its raw bytes and
//! derives structured fields (sender, recipients, subject, date, body text,
//! attachments) on first access, caching each one so repeated reads never
//! re-walk the MIME tree.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use charset::Charset;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use log::warn;
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use ouroboros::self_referencing;
use regex::Regex;

use crate::error::{AttachmentError, Error, Result};
use crate::fetch::FetchResponse;
use crate::header::{decode_header, encode_header, format_address, parse_address_list, MailAddress};
use crate::types::{Flag, Uid};

static SHORT_MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

lazy_static! {
    static ref INLINE_MEDIA: Regex = Regex::new(r"^cid(\d+):(.+)$").unwrap();
    static ref DATE: Regex = Regex::new(
        r"(\d{1,2})\s+(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+(\d{4})\s+(\d{1,2}):(\d{1,2})(?::(\d{1,2}))?\s*([+-])?(\d{4})?"
    )
    .unwrap();
}

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn make_boundary() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let n = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("=_part_{:016x}_{:04x}", now, n)
}

/// The value [`Message::date`] returns when no date could be parsed out of
/// an incoming message.
pub fn min_date() -> DateTime<FixedOffset> {
    let naive = NaiveDateTime::new(
        NaiveDate::from_ymd_opt(1, 1, 1).unwrap(),
        NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
    );
    DateTime::from_naive_utc_and_offset(naive, FixedOffset::east_opt(0).unwrap())
}

/// MIME type guessed from a file extension.
///
/// Extensions whose conventional type implies a content encoding (gzip and
/// friends) map straight to the generic binary type, as does anything
/// unrecognized.
fn guess_mime(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" | "md" => "text/plain",
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/x-wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "mpeg" | "mpg" => "video/mpeg",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

fn decode_text(data: &[u8], charset_label: &str) -> String {
    match Charset::for_label(charset_label.as_bytes()) {
        Some(cs) => cs.decode(data).0.into_owned(),
        None => String::from_utf8_lossy(data).into_owned(),
    }
}

fn base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 76 * 2 + 2);
    for chunk in encoded.as_bytes().chunks(76) {
        // chunks of an ASCII string are still ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push_str("\r\n");
    }
    out
}

#[self_referencing]
struct RawMail {
    raw: Vec<u8>,
    #[borrows(raw)]
    #[covariant]
    mail: Option<ParsedMail<'this>>,
}

impl RawMail {
    fn parse(raw: Vec<u8>) -> Self {
        RawMailBuilder {
            raw,
            mail_builder: |raw| match parse_mail(raw) {
                Ok(mail) => Some(mail),
                Err(e) => {
                    warn!("could not parse message payload: {}", e);
                    None
                }
            },
        }
        .build()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.with_mail(|mail| {
            mail.as_ref()
                .and_then(|m| m.headers.get_first_value(name))
        })
    }
}

fn walk<'p, 'a>(mail: &'p ParsedMail<'a>, out: &mut Vec<&'p ParsedMail<'a>>) {
    out.push(mail);
    for sub in &mail.subparts {
        walk(sub, out);
    }
}

/// One attachment of a received message.
///
/// The decoded payload is materialized on first access and kept.
pub struct MailAttachment {
    raw: Vec<u8>,
    filename: String,
    content_type: String,
    payload: Option<Vec<u8>>,
}

impl MailAttachment {
    fn new(part: &ParsedMail<'_>, filename: String) -> Self {
        MailAttachment {
            raw: part.raw_bytes.to_vec(),
            filename,
            content_type: part.ctype.mimetype.clone(),
            payload: None,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The decoded binary payload.
    pub fn payload(&mut self) -> &[u8] {
        if self.payload.is_none() {
            self.payload = Some(extract_payload(&self.raw));
        }
        self.payload.as_deref().unwrap_or(&[])
    }

    /// Write the payload to `directory` (or the working directory) under
    /// `filename` (or the attachment's own name), returning the path written.
    pub fn download(&mut self, directory: Option<&Path>, filename: Option<&str>) -> Result<PathBuf> {
        let name = filename.unwrap_or(&self.filename).to_string();
        let path = match directory {
            Some(dir) => dir.join(&name),
            None => PathBuf::from(&name),
        };
        let payload = self.payload().to_vec();
        fs::write(&path, payload).map_err(|source| {
            Error::Attachment(AttachmentError::Io {
                path: path.display().to_string(),
                source,
            })
        })?;
        Ok(path)
    }
}

impl fmt::Debug for MailAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailAttachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .finish()
    }
}

fn extract_payload(raw: &[u8]) -> Vec<u8> {
    let part = match parse_mail(raw) {
        Ok(part) => part,
        Err(_) => return Vec::new(),
    };
    if let Ok(body) = part.get_body_raw() {
        if !body.is_empty() {
            return body;
        }
    }
    // a part with no direct payload, such as an embedded .eml: fall back to
    // the first sub-part, undoing the declared transfer encoding
    if let Some(sub) = part.subparts.first() {
        let cte = part
            .headers
            .get_first_value("Content-Transfer-Encoding")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        let sub_raw = sub.raw_bytes;
        match cte.as_str() {
            "base64" => {
                let compact: Vec<u8> = sub_raw
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                return STANDARD.decode(&compact).unwrap_or_default();
            }
            "7bit" | "8bit" | "quoted-printable" | "binary" => return sub_raw.to_vec(),
            _ => {}
        }
    }
    Vec::new()
}

#[derive(Default)]
struct ParsedFields {
    sender: Option<Option<MailAddress>>,
    recipient: Option<Vec<MailAddress>>,
    cc: Option<Vec<MailAddress>>,
    bcc: Option<Vec<MailAddress>>,
    reply_to: Option<Vec<MailAddress>>,
    subject: Option<String>,
    date: Option<DateTime<FixedOffset>>,
    content: Option<String>,
    attachments: Option<Vec<MailAttachment>>,
}

/// A mail message, either composed for sending or received from a FETCH.
pub struct Message {
    /// The author. Required for sending.
    pub sender: Option<MailAddress>,
    /// Primary recipients.
    pub recipient: Vec<MailAddress>,
    /// Carbon-copy recipients.
    pub cc: Vec<MailAddress>,
    /// Blind-carbon-copy recipients.
    pub bcc: Vec<MailAddress>,
    /// Reply-To addresses.
    pub reply_to: Vec<MailAddress>,
    /// The subject line, unencoded.
    pub subject: String,
    /// The body text.
    pub content: String,
    /// When set, the body part is sent as `text/html` regardless of whether
    /// the content carries a `<body>` tag.
    pub is_html: bool,
    /// Attachment references: plain file paths, or `cid<N>:<path>` for media
    /// referenced from HTML content by content id `N`.
    pub attachments: Vec<String>,
    /// Extra headers appended after the standard ones, in order.
    pub headers: Vec<(String, String)>,
    /// Character set recorded for the message. Header encoding always emits
    /// UTF-8 B-words; this only names the charset in the body part headers.
    pub charset: String,
    /// Server-assigned identifier. Only present on received messages.
    pub uid: Option<Uid>,
    /// Flags reported by the server alongside the FETCH.
    pub flags: Vec<Flag>,

    received: Option<RawMail>,
    parsed: ParsedFields,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            sender: None,
            recipient: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject: String::new(),
            content: String::new(),
            is_html: false,
            attachments: Vec::new(),
            headers: Vec::new(),
            charset: "utf-8".to_string(),
            uid: None,
            flags: Vec::new(),
            received: None,
            parsed: ParsedFields::default(),
        }
    }
}

impl Message {
    /// An empty message to be filled in for sending.
    pub fn new() -> Self {
        Message::default()
    }

    /// A received message holding raw RFC 822 bytes. Structured fields are
    /// derived lazily from the payload.
    pub fn from_bytes(raw: Vec<u8>) -> Self {
        Message {
            received: Some(RawMail::parse(raw)),
            ..Message::default()
        }
    }

    /// Build a received message out of a decoded FETCH response.
    pub(crate) fn from_fetch(fetch: FetchResponse) -> Self {
        let mut message = match fetch.body {
            Some(body) => Message::from_bytes(body),
            None => Message::new(),
        };
        message.uid = fetch.uid;
        message.flags = fetch.flags;
        message
    }

    /// Whether this message came from the server rather than being composed.
    pub fn is_received(&self) -> bool {
        self.received.is_some()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.received.as_ref().and_then(|raw| raw.header(name))
    }

    fn header_addresses(&self, name: &str) -> Vec<MailAddress> {
        self.header(name)
            .map(|raw| parse_address_list(&raw))
            .unwrap_or_default()
    }

    /// The first address in the `From` header, or the explicitly set sender.
    pub fn sender(&mut self) -> Option<&MailAddress> {
        if self.sender.is_some() {
            return self.sender.as_ref();
        }
        if self.parsed.sender.is_none() {
            let computed = self.header_addresses("From").into_iter().next();
            self.parsed.sender = Some(computed);
        }
        self.parsed.sender.as_ref().and_then(|s| s.as_ref())
    }

    /// Addresses in the `To` header, or the explicitly set recipients.
    pub fn recipients(&mut self) -> &[MailAddress] {
        if !self.recipient.is_empty() {
            return &self.recipient;
        }
        if self.parsed.recipient.is_none() {
            let computed = self.header_addresses("To");
            self.parsed.recipient = Some(computed);
        }
        self.parsed.recipient.as_deref().unwrap_or(&[])
    }

    /// Addresses in the `CC` header, or the explicitly set list.
    pub fn cc_recipients(&mut self) -> &[MailAddress] {
        if !self.cc.is_empty() {
            return &self.cc;
        }
        if self.parsed.cc.is_none() {
            let computed = self.header_addresses("CC");
            self.parsed.cc = Some(computed);
        }
        self.parsed.cc.as_deref().unwrap_or(&[])
    }

    /// Addresses in the `BCC` header, or the explicitly set list.
    pub fn bcc_recipients(&mut self) -> &[MailAddress] {
        if !self.bcc.is_empty() {
            return &self.bcc;
        }
        if self.parsed.bcc.is_none() {
            let computed = self.header_addresses("BCC");
            self.parsed.bcc = Some(computed);
        }
        self.parsed.bcc.as_deref().unwrap_or(&[])
    }

    /// Addresses in the `Reply-To` header, or the explicitly set list.
    pub fn reply_recipients(&mut self) -> &[MailAddress] {
        if !self.reply_to.is_empty() {
            return &self.reply_to;
        }
        if self.parsed.reply_to.is_none() {
            let computed = self.header_addresses("Reply-To");
            self.parsed.reply_to = Some(computed);
        }
        self.parsed.reply_to.as_deref().unwrap_or(&[])
    }

    /// The header-decoded subject line.
    pub fn subject(&mut self) -> &str {
        if !self.subject.is_empty() {
            return &self.subject;
        }
        if self.parsed.subject.is_none() {
            let computed = self
                .header("Subject")
                .map(|raw| decode_header(&raw).trim().to_string())
                .unwrap_or_default();
            self.parsed.subject = Some(computed);
        }
        self.parsed.subject.as_deref().unwrap_or("")
    }

    /// The message date, taken from the `Date` header with the `Received`
    /// header as fallback. Unparseable dates yield [`min_date`].
    pub fn date(&mut self) -> DateTime<FixedOffset> {
        if self.parsed.date.is_none() {
            let raw = self
                .header("Date")
                .or_else(|| self.header("Received"))
                .unwrap_or_default();
            self.parsed.date = Some(parse_date(&raw));
        }
        self.parsed.date.unwrap_or_else(min_date)
    }

    /// The text of the first non-multipart `text/plain` or `text/html` part,
    /// decoded per its declared charset, or the explicitly set content.
    pub fn content(&mut self) -> &str {
        if !self.content.is_empty() {
            return &self.content;
        }
        if self.parsed.content.is_none() {
            let computed = self
                .received
                .as_ref()
                .map(|raw| {
                    raw.with_mail(|mail| mail.as_ref().map(extract_content).unwrap_or_default())
                })
                .unwrap_or_default();
            self.parsed.content = Some(computed);
        }
        self.parsed.content.as_deref().unwrap_or("")
    }

    /// Every leaf part carrying a `Content-Disposition` and a filename.
    pub fn received_attachments(&mut self) -> &mut [MailAttachment] {
        if self.parsed.attachments.is_none() {
            let computed = self
                .received
                .as_ref()
                .map(|raw| {
                    raw.with_mail(|mail| {
                        mail.as_ref().map(extract_attachments).unwrap_or_default()
                    })
                })
                .unwrap_or_default();
            self.parsed.attachments = Some(computed);
        }
        match &mut self.parsed.attachments {
            Some(attachments) => attachments,
            None => &mut [],
        }
    }

    /// Everyone the message must reach: recipients, CC, BCC and Reply-To,
    /// in that order.
    pub fn to_addrs(&mut self) -> Vec<MailAddress> {
        let mut addrs = Vec::new();
        addrs.extend_from_slice(self.recipients());
        addrs.extend_from_slice(self.cc_recipients());
        addrs.extend_from_slice(self.bcc_recipients());
        addrs.extend_from_slice(self.reply_recipients());
        addrs
    }

    /// Serialize the message to wire bytes.
    ///
    /// A received message returns its raw payload verbatim. A composed
    /// message becomes one `multipart/mixed` container: headers, one text
    /// body part (`text/html` when the content carries a `<body>` tag or
    /// [`Message::is_html`] is set, else `text/plain`), then one part per
    /// attachment in list order.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        if let Some(received) = &self.received {
            return Ok(received.borrow_raw().clone());
        }

        let boundary = make_boundary();
        let mut out = String::new();

        out.push_str(&format!("Date: {}\r\n", Local::now().to_rfc2822()));
        out.push_str(&format!("Subject: {}\r\n", encode_header(&self.subject)));
        if let Some(sender) = &self.sender {
            out.push_str(&format!("From: {}\r\n", format_address(sender)));
        }
        for (name, list) in [
            ("To", &self.recipient),
            ("CC", &self.cc),
            ("BCC", &self.bcc),
            ("Reply-To", &self.reply_to),
        ] {
            if list.is_empty() {
                continue;
            }
            let joined = list
                .iter()
                .map(format_address)
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("{}: {}\r\n", name, joined));
        }
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, encode_header(value)));
        }
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
            boundary
        ));

        let subtype = if self.is_html || is_html_content(&self.content) {
            "html"
        } else {
            "plain"
        };
        out.push_str(&format!("--{}\r\n", boundary));
        out.push_str(&format!(
            "Content-Type: text/{}; charset=\"{}\"\r\n",
            subtype, self.charset
        ));
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        out.push_str(&base64_wrapped(self.content.as_bytes()));

        for attachment in &self.attachments {
            out.push_str(&render_attachment(attachment, &boundary, &self.charset)?);
        }

        out.push_str(&format!("--{}--\r\n", boundary));
        Ok(out.into_bytes())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("subject", &self.subject)
            .field("uid", &self.uid)
            .field("flags", &self.flags)
            .field("received", &self.received.is_some())
            .finish()
    }
}

fn is_html_content(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    lower.contains("<body") && lower.contains("</body>")
}

fn parse_date(raw: &str) -> DateTime<FixedOffset> {
    let cap = match DATE.captures(raw) {
        Some(cap) => cap,
        None => return min_date(),
    };
    let get = |i: usize| cap.get(i).map(|m| m.as_str());
    let num = |i: usize| get(i).and_then(|s| s.parse::<u32>().ok()).unwrap_or(0);

    let month = SHORT_MONTHS
        .iter()
        .position(|m| Some(*m) == get(2))
        .map(|p| p as u32 + 1)
        .unwrap_or(1);
    let date = NaiveDate::from_ymd_opt(num(3) as i32, month, num(1));
    let time = NaiveTime::from_hms_opt(num(4), num(5), num(6));
    let (date, time) = match (date, time) {
        (Some(d), Some(t)) => (d, t),
        _ => return min_date(),
    };

    let sign = if get(7) == Some("-") { -1 } else { 1 };
    let offset = get(8)
        .and_then(|zone| {
            let hours: i32 = zone[..2].parse().ok()?;
            let minutes: i32 = zone[2..].parse().ok()?;
            FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        })
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());

    let naive = NaiveDateTime::new(date, time);
    match naive.and_local_timezone(offset).single() {
        Some(dt) => dt,
        None => min_date(),
    }
}

fn extract_content(mail: &ParsedMail<'_>) -> String {
    let mut parts = Vec::new();
    walk(mail, &mut parts);
    for part in parts {
        if !part.subparts.is_empty() || part.ctype.mimetype.starts_with("multipart/") {
            continue;
        }
        let mimetype = part.ctype.mimetype.to_ascii_lowercase();
        if mimetype != "text/plain" && mimetype != "text/html" {
            continue;
        }
        let raw = part.get_body_raw().unwrap_or_default();
        let mut text = decode_text(&raw, &part.ctype.charset);
        // identity-encoded parts keep the line break that precedes the boundary
        let cte = part
            .headers
            .get_first_value("Content-Transfer-Encoding")
            .unwrap_or_default()
            .to_ascii_lowercase();
        if matches!(cte.as_str(), "" | "7bit" | "8bit" | "binary") {
            if text.ends_with("\r\n") {
                text.truncate(text.len() - 2);
            } else if text.ends_with('\n') {
                text.truncate(text.len() - 1);
            }
        }
        return text;
    }
    String::new()
}

fn extract_attachments(mail: &ParsedMail<'_>) -> Vec<MailAttachment> {
    let mut parts = Vec::new();
    walk(mail, &mut parts);
    let mut out = Vec::new();
    for part in parts {
        if part.headers.get_first_value("Content-Disposition").is_none() {
            continue;
        }
        let disposition = part.get_content_disposition();
        let filename = disposition
            .params
            .get("filename")
            .or_else(|| part.ctype.params.get("name"))
            .map(|name| decode_header(name).trim().to_string())
            .filter(|name| !name.is_empty());
        // no filename means an inline body part, not an attachment
        let filename = match filename {
            Some(name) => name,
            None => continue,
        };
        out.push(MailAttachment::new(part, filename));
    }
    out
}

fn read_attachment_file(path: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| {
        Error::Attachment(AttachmentError::Io {
            path: path.to_string(),
            source,
        })
    })
}

fn render_attachment(reference: &str, boundary: &str, charset: &str) -> Result<String> {
    let mut out = String::new();

    if let Some(cap) = INLINE_MEDIA.captures(reference) {
        let cid = &cap[1];
        let path = &cap[2];
        let mimetype = guess_mime(path);
        let maintype = mimetype.split('/').next().unwrap_or("");
        if maintype != "image" && maintype != "audio" {
            return Err(Error::Attachment(AttachmentError::UnsupportedInlineType {
                path: path.to_string(),
                mimetype: mimetype.to_string(),
            }));
        }
        let name = basename(path);
        let data = read_attachment_file(path)?;
        out.push_str(&format!("--{}\r\n", boundary));
        out.push_str(&format!("Content-Type: {}\r\n", mimetype));
        out.push_str("Content-Transfer-Encoding: base64\r\n");
        out.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{}\"\r\n",
            name
        ));
        out.push_str(&format!("Content-ID: <{}>\r\n", cid));
        out.push_str(&format!("X-Attachment-Id: {}\r\n\r\n", cid));
        out.push_str(&base64_wrapped(&data));
        return Ok(out);
    }

    let mimetype = guess_mime(reference);
    let name = basename(reference);
    let data = read_attachment_file(reference)?;
    out.push_str(&format!("--{}\r\n", boundary));
    if mimetype.starts_with("text/") {
        out.push_str(&format!(
            "Content-Type: {}; charset=\"{}\"\r\n",
            mimetype, charset
        ));
        out.push_str("Content-Transfer-Encoding: 8bit\r\n");
        out.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
            name
        ));
        out.push_str(&String::from_utf8_lossy(&data));
        if !data.ends_with(b"\r\n") {
            out.push_str("\r\n");
        }
    } else {
        out.push_str(&format!("Content-Type: {}\r\n", mimetype));
        out.push_str("Content-Transfer-Encoding: base64\r\n");
        out.push_str(&format!(
            "Content-Disposition: attachment; filename=\"{}\"\r\n\r\n",
            name
        ));
        out.push_str(&base64_wrapped(&data));
    }
    Ok(out)
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn outgoing() -> Message {
        let mut message = Message::new();
        message.sender = Some(MailAddress::parse("A<a@x.com>"));
        message.recipient = vec![MailAddress::parse("b@y.com")];
        message.subject = "Hi".to_string();
        message.content = "hello".to_string();
        message
    }

    #[test]
    fn serialize_parse_round_trip() {
        let bytes = outgoing().to_bytes().unwrap();
        let mut parsed = Message::from_bytes(bytes);
        assert_eq!(parsed.sender().unwrap().address, "a@x.com");
        assert_eq!(parsed.subject(), "Hi");
        assert_eq!(parsed.content(), "hello");
        assert_eq!(parsed.recipients()[0].address, "b@y.com");
    }

    #[test]
    fn html_body_selects_html_subtype() {
        let mut message = outgoing();
        message.content = "<html><body>hello</body></html>".to_string();
        let text = String::from_utf8(message.to_bytes().unwrap()).unwrap();
        assert!(text.contains("Content-Type: text/html"));

        let text = String::from_utf8(outgoing().to_bytes().unwrap()).unwrap();
        assert!(text.contains("Content-Type: text/plain"));
    }

    #[test]
    fn inline_media_part_carries_content_id() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("img.png");
        let mut file = std::fs::File::create(&img).unwrap();
        file.write_all(b"\x89PNG\r\n\x1a\nfakedata").unwrap();

        let mut message = outgoing();
        message.content = "<html><body><img src=\"cid:0\"></body></html>".to_string();
        message.attachments = vec![format!("cid0:{}", img.display())];
        let text = String::from_utf8(message.to_bytes().unwrap()).unwrap();
        assert!(text.contains("Content-ID: <0>"));
        assert!(text.contains("X-Attachment-Id: 0"));
        assert!(text.contains("Content-Type: image/png"));
        assert!(text.contains("Content-Disposition: attachment; filename=\"img.png\""));
    }

    #[test]
    fn text_attachment_is_not_base64() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, b"plain notes").unwrap();

        let mut message = outgoing();
        message.attachments = vec![notes.display().to_string()];
        let text = String::from_utf8(message.to_bytes().unwrap()).unwrap();
        assert!(text.contains("Content-Type: text/plain; charset=\"utf-8\""));
        assert!(text.contains("Content-Transfer-Encoding: 8bit\r\n"));
        assert!(text.contains(
            "Content-Disposition: attachment; filename=\"notes.txt\"\r\n\r\nplain notes\r\n"
        ));
    }

    #[test]
    fn inline_media_must_be_image_or_audio() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.pdf");
        std::fs::write(&notes, b"%PDF-1.4").unwrap();

        let mut message = outgoing();
        message.attachments = vec![format!("cid1:{}", notes.display())];
        match message.to_bytes() {
            Err(Error::Attachment(AttachmentError::UnsupportedInlineType {
                mimetype, ..
            })) => {
                assert_eq!(mimetype, "application/pdf");
            }
            other => panic!("expected attachment error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_attachment_file_fails() {
        let mut message = outgoing();
        message.attachments = vec!["/no/such/file.txt".to_string()];
        match message.to_bytes() {
            Err(Error::Attachment(AttachmentError::Io { path, .. })) => {
                assert_eq!(path, "/no/such/file.txt");
            }
            other => panic!("expected io error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn parses_dates_with_offset() {
        let parsed = parse_date("Tue, 5 Mar 2024 10:20:30 +0800");
        assert_eq!(parsed.offset(), &FixedOffset::east_opt(8 * 3600).unwrap());
        assert_eq!(parsed.to_rfc2822(), "Tue, 5 Mar 2024 10:20:30 +0800");
    }

    #[test]
    fn unparseable_date_is_sentinel() {
        assert_eq!(parse_date("not a date"), min_date());
        let mut message = Message::from_bytes(b"Subject: x\r\n\r\nbody".to_vec());
        assert_eq!(message.date(), min_date());
    }

    #[test]
    fn received_header_is_date_fallback() {
        let raw = b"Received: from relay (example.com) by mx; 5 Mar 2024 10:20:30 +0000\r\n\
                    Subject: x\r\n\r\nbody"
            .to_vec();
        let mut message = Message::from_bytes(raw);
        assert_eq!(message.date().to_rfc2822(), "Tue, 5 Mar 2024 10:20:30 +0000");
    }

    #[test]
    fn extracts_attachments_with_payload() {
        let raw = b"Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\n\
            --b\r\n\
            Content-Type: text/plain; charset=\"utf-8\"\r\n\r\n\
            body text\r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            Content-Transfer-Encoding: base64\r\n\
            Content-Disposition: attachment; filename=\"a.txt\"\r\n\r\n\
            aGVsbG8=\r\n\
            --b--\r\n"
            .to_vec();
        let mut message = Message::from_bytes(raw);
        assert_eq!(message.content(), "body text");
        let attachments = message.received_attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename(), "a.txt");
        assert_eq!(attachments[0].payload(), b"hello");
    }

    #[test]
    fn structured_fields_are_cached() {
        let raw = b"Subject: one\r\nFrom: a@x.com\r\n\r\nbody".to_vec();
        let mut message = Message::from_bytes(raw);
        assert_eq!(message.subject(), "one");
        assert_eq!(message.content(), "body");
        assert_eq!(message.sender().map(|a| a.address.clone()), Some("a@x.com".to_string()));

        // a second walk of the MIME tree would now come up empty, so only
        // the memos from the first access can answer
        message.received = None;
        assert_eq!(message.subject(), "one");
        assert_eq!(message.content(), "body");
        assert_eq!(message.sender().map(|a| a.address.clone()), Some("a@x.com".to_string()));

        // an explicit assignment afterwards wins over the cached parse
        message.subject = "Other".to_string();
        assert_eq!(message.subject(), "Other");
    }

    #[test]
    fn decoded_subject_header() {
        let raw = b"Subject: =?utf-8?B?aMOpbGxv?=\r\n\r\nbody".to_vec();
        let mut message = Message::from_bytes(raw);
        assert_eq!(message.subject(), "h\u{e9}llo");
    }

    #[test]
    fn received_message_serializes_verbatim() {
        let raw = b"Subject: x\r\n\r\nbody".to_vec();
        let mut message = Message::from_bytes(raw.clone());
        assert_eq!(message.to_bytes().unwrap(), raw);
    }

    #[test]
    fn mime_guesses_by_extension() {
        assert_eq!(guess_mime("photo.JPG"), "image/jpeg");
        assert_eq!(guess_mime("song.mp3"), "audio/mpeg");
        assert_eq!(guess_mime("archive.tar.gz"), "application/octet-stream");
        assert_eq!(guess_mime("mystery"), "application/octet-stream");
    }
}
