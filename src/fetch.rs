//! Decoding of FETCH response data.
//!
//! Servers interleave three shapes in a FETCH reply: a metadata line that
//! announces a `{n}` literal, the literal bytes themselves, and bare closing
//! tokens like `)`. [`split_fetch_items`] re-segments the raw byte stream
//! into those shapes, and [`FetchResponse::parse`] pulls the UID, flags, and
//! body out of each one.

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::types::Flag;

lazy_static! {
    static ref LITERAL: Regex = Regex::new(r"\{(\d+)\}\r?\n?$").unwrap();
    static ref UID: Regex = Regex::new(r"UID\s+(\d+)").unwrap();
    static ref FLAGS: Regex = Regex::new(r"FLAGS\s*\(([^)]*)\)").unwrap();
}

/// Pull a UID token out of FETCH metadata.
pub(crate) fn find_uid(meta: &str) -> Option<String> {
    UID.captures(meta)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// One lexical item of a FETCH reply.
#[derive(Debug, PartialEq, Eq)]
pub enum FetchItem {
    /// A metadata line, optionally followed by the literal it announced.
    Section { meta: Vec<u8>, body: Option<Vec<u8>> },
    /// A bare token between sections, usually a closing `)`.
    Token(Vec<u8>),
}

/// The decoded attributes of a single fetched message.
#[derive(Debug, Default)]
pub struct FetchResponse {
    pub uid: Option<String>,
    pub flags: Vec<Flag>,
    pub body: Option<Vec<u8>>,
}

fn find_line_end(data: &[u8], from: usize) -> usize {
    match data[from..].iter().position(|&b| b == b'\n') {
        Some(n) => from + n + 1,
        None => data.len(),
    }
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let mut line = line;
    while let Some((&last, rest)) = line.split_last() {
        if last == b'\n' || last == b'\r' {
            line = rest;
        } else {
            break;
        }
    }
    line
}

/// Segment raw FETCH reply bytes into sections and tokens, honoring `{n}`
/// literal lengths so message bodies are never split on line boundaries.
pub fn split_fetch_items(data: &[u8]) -> Vec<FetchItem> {
    let mut items = Vec::new();
    let mut at = 0;
    while at < data.len() {
        let line_end = find_line_end(data, at);
        let line = trim_crlf(&data[at..line_end]);
        at = line_end;

        let meta = String::from_utf8_lossy(line);
        let literal_len = LITERAL
            .captures(&meta)
            .and_then(|cap| cap.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok());

        match literal_len {
            Some(len) => {
                let end = (at + len).min(data.len());
                let body = data[at..end].to_vec();
                at = end;
                items.push(FetchItem::Section {
                    meta: line.to_vec(),
                    body: Some(body),
                });
            }
            None if line.starts_with(b"*") => {
                items.push(FetchItem::Section {
                    meta: line.to_vec(),
                    body: None,
                });
            }
            None => {
                if !line.is_empty() {
                    items.push(FetchItem::Token(line.to_vec()));
                }
            }
        }
    }
    items
}

impl FetchResponse {
    /// Decode one lexical item. Tokens and sections that carry none of the
    /// requested attributes yield `None` and are skipped with a warning.
    pub fn parse(item: &FetchItem) -> Option<FetchResponse> {
        let (meta, body) = match item {
            FetchItem::Section { meta, body } => (meta, body),
            FetchItem::Token(_) => return None,
        };

        let meta = String::from_utf8_lossy(meta);
        let uid = find_uid(&meta);
        let flags = FLAGS
            .captures(&meta)
            .and_then(|cap| cap.get(1))
            .map(|m| {
                m.as_str()
                    .split_whitespace()
                    .map(Flag::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if uid.is_none() && flags.is_empty() && body.is_none() {
            warn!("unrecognized FETCH section skipped: {}", meta);
            return None;
        }

        Some(FetchResponse {
            uid,
            flags,
            body: body.clone(),
        })
    }
}

/// Decode a whole FETCH reply into per-message responses. Some servers put
/// UID and FLAGS after the `BODY[]` literal; the bare tokens following a
/// section are folded into its metadata before decoding so those attributes
/// are not lost.
pub fn parse_fetches(data: &[u8]) -> Vec<FetchResponse> {
    let mut fetches = Vec::new();
    let mut items = split_fetch_items(data).into_iter().peekable();
    while let Some(item) = items.next() {
        let (mut meta, body) = match item {
            FetchItem::Section { meta, body } => (meta, body),
            FetchItem::Token(token) => {
                warn!(
                    "stray FETCH token skipped: {}",
                    String::from_utf8_lossy(&token)
                );
                continue;
            }
        };
        while let Some(FetchItem::Token(_)) = items.peek() {
            if let Some(FetchItem::Token(token)) = items.next() {
                meta.push(b' ');
                meta.extend_from_slice(&token);
            }
        }
        if let Some(fetch) = FetchResponse::parse(&FetchItem::Section { meta, body }) {
            fetches.push(fetch);
        }
    }
    fetches
}
