//! The modified UTF-7 encoding that IMAP uses for mailbox names, per
//! [RFC 3501 section 5.1.3](https://tools.ietf.org/html/rfc3501#section-5.1.3).
//!
//! Printable ASCII (except `&`) passes through unchanged. `&` encodes as the
//! literal sequence `&-`. Any run of other characters is UTF-16BE encoded,
//! base64 encoded with `/` remapped to `,` and padding stripped, and wrapped
//! in `&...-`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

fn modified_base64(run: &str) -> Vec<u8> {
    let mut utf16 = Vec::with_capacity(run.len() * 2);
    for unit in run.encode_utf16() {
        utf16.extend_from_slice(&unit.to_be_bytes());
    }
    STANDARD
        .encode(&utf16)
        .trim_end_matches('=')
        .replace('/', ",")
        .into_bytes()
}

fn modified_unbase64(run: &[u8]) -> String {
    let mut b64: String = run.iter().map(|&b| b as char).collect();
    b64 = b64.replace(',', "/");
    while b64.len() % 4 != 0 {
        b64.push('=');
    }
    match STANDARD.decode(b64.as_bytes()) {
        Ok(bytes) => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        // a run we cannot decode degrades to nothing rather than failing
        Err(_) => String::new(),
    }
}

/// Encode a Unicode mailbox name into modified UTF-7 wire bytes.
pub fn encode(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len());
    let mut run = String::new();

    let flush = |out: &mut Vec<u8>, run: &mut String| {
        if !run.is_empty() {
            out.push(b'&');
            out.extend_from_slice(&modified_base64(run));
            out.push(b'-');
            run.clear();
        }
    };

    for c in name.chars() {
        match c {
            '\x20'..='\x25' | '\x27'..='\x7e' => {
                flush(&mut out, &mut run);
                out.push(c as u8);
            }
            '&' => {
                flush(&mut out, &mut run);
                out.extend_from_slice(b"&-");
            }
            _ => run.push(c),
        }
    }
    flush(&mut out, &mut run);
    out
}

/// Decode modified UTF-7 wire bytes back into a Unicode mailbox name.
///
/// Malformed input degrades to a best-effort string; decoding never fails.
pub fn decode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    let mut run: Option<Vec<u8>> = None;

    for &b in data {
        match run {
            None => {
                if b == b'&' {
                    run = Some(Vec::new());
                } else {
                    out.push(b as char);
                }
            }
            Some(ref mut acc) => {
                if b == b'-' {
                    if acc.is_empty() {
                        out.push('&');
                    } else {
                        out.push_str(&modified_unbase64(acc));
                    }
                    run = None;
                } else {
                    acc.push(b);
                }
            }
        }
    }
    // an unterminated run still yields its characters
    if let Some(acc) = run {
        if !acc.is_empty() {
            out.push_str(&modified_unbase64(&acc));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(name: &str) {
        assert_eq!(decode(&encode(name)), name, "round trip of {:?}", name);
    }

    #[test]
    fn ascii_passes_through() {
        assert_eq!(encode("INBOX"), b"INBOX".to_vec());
        assert_eq!(decode(b"INBOX"), "INBOX");
    }

    #[test]
    fn ampersand_is_escaped() {
        assert_eq!(encode("Lost & Found"), b"Lost &- Found".to_vec());
        assert_eq!(decode(b"Lost &- Found"), "Lost & Found");
    }

    #[test]
    fn non_ascii_runs_are_wrapped() {
        // the RFC 3501 example
        assert_eq!(encode("~peter/mail/台北/日本語"), b"~peter/mail/&U,BTFw-/&ZeVnLIqe-".to_vec());
        assert_eq!(decode(b"~peter/mail/&U,BTFw-/&ZeVnLIqe-"), "~peter/mail/台北/日本語");
    }

    #[test]
    fn round_trips() {
        round_trip("INBOX");
        round_trip("Entw\u{fc}rfe");
        round_trip("钓鱼邮件");
        round_trip("R&D / 研究");
        round_trip("&&&");
        round_trip("mixed ascii 垃圾箱 & more");
        // astral plane forces surrogate pairs through UTF-16BE
        round_trip("mail 📬 box");
    }

    #[test]
    fn empty_run_decodes_to_ampersand() {
        assert_eq!(decode(b"&-"), "&");
    }

    #[test]
    fn garbage_run_degrades() {
        // not decodable base64; must not panic
        let _ = decode(b"&!!!-tail");
    }
}
