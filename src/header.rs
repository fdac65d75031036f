//! Decoding of RFC 2047 encoded headers and RFC 822 address lists.
//!
//! Everything in here deals with input that arrives from third parties, so
//! nothing returns an error: undecodable fragments degrade to best-effort
//! text instead of failing the message they came from.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use charset::Charset;
use lazy_static::lazy_static;
use mailparse::{addrparse, MailAddr};
use regex::Regex;

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([^?\s]+)\?([qQbB])\?([^?\s]*)\?=").unwrap();
    static ref NAME_ADDR: Regex = Regex::new(r"^(.*)<(.*@.*)>$").unwrap();
}

/// A name + address pair.
///
/// Displays as `name<address>` when a display name is present, otherwise as
/// the bare address, and parses back from either shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAddress {
    /// The display name, if one was given.
    pub name: Option<String>,
    /// The bare address, e.g. `someone@example.com`.
    pub address: String,
}

impl MailAddress {
    /// Make an address with an optional display name.
    pub fn new<A: Into<String>>(address: A, name: Option<String>) -> Self {
        MailAddress {
            name: name.filter(|n| !n.is_empty()),
            address: address.into(),
        }
    }

    /// Parse `name<address>` or a bare address.
    pub fn parse(raw: &str) -> Self {
        match NAME_ADDR.captures(raw.trim()) {
            Some(cap) => MailAddress::new(
                cap[2].trim().to_string(),
                Some(cap[1].trim().to_string()).filter(|n| !n.is_empty()),
            ),
            None => MailAddress::new(raw.trim().to_string(), None),
        }
    }
}

impl fmt::Display for MailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}<{}>", name, self.address),
            None => f.write_str(&self.address),
        }
    }
}

impl From<&str> for MailAddress {
    fn from(raw: &str) -> Self {
        MailAddress::parse(raw)
    }
}

fn decode_word(charset_label: &str, encoding: &str, payload: &str) -> Option<String> {
    let bytes = match encoding {
        "b" | "B" => STANDARD.decode(payload.as_bytes()).ok()?,
        _ => {
            // Q encoding is quoted-printable with `_` standing in for space
            let qp = payload.replace('_', " ");
            quoted_printable::decode(qp.as_bytes(), quoted_printable::ParseMode::Robust).ok()?
        }
    };
    match Charset::for_label(charset_label.as_bytes()) {
        Some(cs) => Some(cs.decode(&bytes).0.into_owned()),
        // unrecognized charset: best-effort bytes-as-utf8 with replacement
        None => Some(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Decode a header value containing zero or more RFC 2047 encoded words.
///
/// Whitespace between two adjacent encoded words is dropped, per the RFC.
/// Fragments that fail to decode are kept verbatim; this never fails.
pub fn decode_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_end = 0;
    let mut prev_was_word = false;

    for cap in ENCODED_WORD.captures_iter(raw) {
        let whole = cap.get(0).unwrap();
        let gap = &raw[last_end..whole.start()];
        if !(prev_was_word && gap.chars().all(char::is_whitespace)) {
            out.push_str(gap);
        }
        match decode_word(&cap[1], &cap[2], &cap[3]) {
            Some(decoded) => out.push_str(&decoded),
            None => out.push_str(whole.as_str()),
        }
        last_end = whole.end();
        prev_was_word = true;
    }
    out.push_str(&raw[last_end..]);
    out
}

/// Encode a header value as an RFC 2047 B-word when it is not plain ASCII.
pub(crate) fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

/// Format one mailbox for an outgoing address header, encoding the display
/// name as needed.
pub(crate) fn format_address(addr: &MailAddress) -> String {
    match &addr.name {
        Some(name) => format!("{} <{}>", encode_header(name), addr.address),
        None => addr.address.clone(),
    }
}

/// Split a header value into addresses per RFC 822, decoding display names
/// and silently dropping entries with an empty address.
pub fn parse_address_list(raw: &str) -> Vec<MailAddress> {
    let decoded = decode_header(raw);
    let parsed = match addrparse(&decoded) {
        Ok(list) => list,
        Err(_) => {
            // unparseable list: salvage a single name<addr> if one is there
            return if decoded.contains('@') {
                vec![MailAddress::parse(&decoded)]
            } else {
                Vec::new()
            };
        }
    };

    fn push(out: &mut Vec<MailAddress>, name: &Option<String>, addr: &str) {
        if addr.trim().is_empty() {
            return;
        }
        out.push(MailAddress::new(
            addr.trim().to_string(),
            name.as_ref().map(|n| n.trim().to_string()),
        ));
    }

    let mut out = Vec::new();
    for entry in parsed.iter() {
        match entry {
            MailAddr::Single(single) => push(&mut out, &single.display_name, &single.addr),
            MailAddr::Group(group) => {
                for single in &group.addrs {
                    push(&mut out, &single.display_name, &single.addr);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_header_is_untouched() {
        assert_eq!(decode_header("Hello there"), "Hello there");
    }

    #[test]
    fn decodes_b_words() {
        assert_eq!(decode_header("=?utf-8?B?aGVsbG8=?="), "hello");
    }

    #[test]
    fn decodes_q_words() {
        assert_eq!(
            decode_header("=?iso-8859-1?Q?Andr=E9?= Pirard"),
            "André Pirard"
        );
    }

    #[test]
    fn underscore_means_space_in_q() {
        assert_eq!(decode_header("=?utf-8?Q?a_b?="), "a b");
    }

    #[test]
    fn adjacent_words_drop_whitespace() {
        assert_eq!(
            decode_header("=?utf-8?B?aGVs?= =?utf-8?B?bG8=?="),
            "hello"
        );
    }

    #[test]
    fn unknown_charset_degrades_to_utf8() {
        assert_eq!(decode_header("=?x-weird?B?aGVsbG8=?="), "hello");
    }

    #[test]
    fn broken_base64_keeps_raw_word() {
        let raw = "=?utf-8?B?!!notbase64!!?=";
        assert_eq!(decode_header(raw), raw);
    }

    #[test]
    fn address_display_round_trip() {
        let a = MailAddress::parse("Alice<alice@example.com>");
        assert_eq!(a.name.as_deref(), Some("Alice"));
        assert_eq!(a.address, "alice@example.com");
        assert_eq!(a.to_string(), "Alice<alice@example.com>");

        let bare = MailAddress::parse("bob@example.com");
        assert_eq!(bare.name, None);
        assert_eq!(bare.to_string(), "bob@example.com");
    }

    #[test]
    fn parses_address_lists() {
        let list = parse_address_list("Alice <alice@x.com>, bob@y.com");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name.as_deref(), Some("Alice"));
        assert_eq!(list[0].address, "alice@x.com");
        assert_eq!(list[1].name, None);
        assert_eq!(list[1].address, "bob@y.com");
    }

    #[test]
    fn decodes_display_names_in_lists() {
        let list = parse_address_list("=?utf-8?B?QsO2Yg==?= <bob@y.com>");
        assert_eq!(list[0].name.as_deref(), Some("Böb"));
    }

    #[test]
    fn drops_empty_addresses() {
        let list = parse_address_list("undisclosed-recipients:;");
        assert!(list.is_empty());
    }

    #[test]
    fn encodes_non_ascii_headers() {
        assert_eq!(encode_header("plain"), "plain");
        assert_eq!(encode_header("héllo"), "=?utf-8?B?aMOpbGxv?=");
    }
}
