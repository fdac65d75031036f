//! The mail session: one lazily-dialed SMTP connection and one lazily-dialed
//! IMAP connection, with send/search/fetch/flag/move operations on top.
//!
//! Hosts can be given explicitly (`host` or `host:port`), through the
//! `POSTBOX_IMAP_HOST`/`POSTBOX_SMTP_HOST` environment variables, or derived
//! from the account's mail domain for well-known providers.

use std::collections::HashMap;
use std::convert::TryFrom;
use std::env;
use std::time::Duration;

use imap_proto::{MailboxDatum, NameAttribute, Response};
use lazy_static::lazy_static;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, SmtpTransport, Transport};
use log::{debug, info, warn};

use crate::client::{validate_str, Client};
use crate::conn::Connection;
use crate::error::{Error, ParseError, Result};
use crate::fetch::{find_uid, parse_fetches};
use crate::message::Message;
use crate::response::validate_ok;
use crate::types::{Flag, MailFolder, Seq, Uid};
use crate::utf7;

const USERNAME_VAR: &str = "POSTBOX_USERNAME";
const PASSWORD_VAR: &str = "POSTBOX_PASSWORD";
const IMAP_HOST_VAR: &str = "POSTBOX_IMAP_HOST";
const SMTP_HOST_VAR: &str = "POSTBOX_SMTP_HOST";

const IMAP_PORT: u16 = 143;
const IMAP_SSL_PORT: u16 = 993;
const SMTP_PORT: u16 = 25;
const SMTP_SSL_PORT: u16 = 465;

lazy_static! {
    static ref DEFAULT_IMAP_HOSTS: HashMap<&'static str, &'static str> = HashMap::from([
        ("gmail.com", "imap.gmail.com"),
        ("outlook.com", "outlook.office365.com"),
        ("qq.com", "imap.qq.com"),
        ("foxmail.com", "imap.qq.com"),
        ("163.com", "imap.163.com"),
        ("yeah.net", "imap.yeah.net"),
        ("139.com", "imap.139.com"),
    ]);
    static ref DEFAULT_SMTP_HOSTS: HashMap<&'static str, &'static str> = HashMap::from([
        ("gmail.com", "smtp.gmail.com"),
        ("outlook.com", "smtp.office365.com:587"),
        ("qq.com", "smtp.qq.com"),
        ("foxmail.com", "smtp.qq.com"),
        ("163.com", "smtp.163.com"),
        ("yeah.net", "smtp.yeah.net"),
        ("139.com", "smtp.139.com"),
    ]);
}

fn default_host(table: &HashMap<&str, &str>, address: Option<&str>) -> Option<String> {
    let domain = address?.rsplit('@').next()?;
    table.get(domain).map(|host| host.to_string())
}

fn split_host_port(host: &str, default_port: u16) -> (String, u16) {
    match host.rsplit_once(':') {
        Some((name, port)) => match port.parse() {
            Ok(port) => (name.to_string(), port),
            Err(_) => (host.to_string(), default_port),
        },
        None => (host.to_string(), default_port),
    }
}

/// Escape and quote a folder name for the wire, UTF-7-encoding non-ASCII.
fn encode_folder(name: &str) -> String {
    let encoded = String::from_utf8_lossy(&utf7::encode(name)).into_owned();
    format!(
        "\"{}\"",
        encoded.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

/// A cleaned, comma-joined set of message UIDs, validated before any
/// network traffic happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidSet(String);

impl UidSet {
    fn from_parts<'a, I>(parts: I) -> Result<UidSet>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut cleaned = Vec::new();
        for part in parts {
            let part = part.trim();
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::BadUidSet(part.to_string()));
            }
            cleaned.push(part);
        }
        Ok(UidSet(cleaned.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&str> for UidSet {
    type Error = Error;

    fn try_from(raw: &str) -> Result<UidSet> {
        UidSet::from_parts(raw.split(','))
    }
}

impl TryFrom<String> for UidSet {
    type Error = Error;

    fn try_from(raw: String) -> Result<UidSet> {
        UidSet::try_from(raw.as_str())
    }
}

impl TryFrom<&[String]> for UidSet {
    type Error = Error;

    fn try_from(uids: &[String]) -> Result<UidSet> {
        UidSet::from_parts(uids.iter().map(String::as_str))
    }
}

impl TryFrom<Vec<String>> for UidSet {
    type Error = Error;

    fn try_from(uids: Vec<String>) -> Result<UidSet> {
        UidSet::try_from(uids.as_slice())
    }
}

impl TryFrom<&[&str]> for UidSet {
    type Error = Error;

    fn try_from(uids: &[&str]) -> Result<UidSet> {
        UidSet::from_parts(uids.iter().copied())
    }
}

impl TryFrom<&Message> for UidSet {
    type Error = Error;

    fn try_from(message: &Message) -> Result<UidSet> {
        match &message.uid {
            Some(uid) => UidSet::from_parts([uid.as_str()]),
            None => Err(Error::BadUidSet("message without uid".to_string())),
        }
    }
}

impl TryFrom<&[Message]> for UidSet {
    type Error = Error;

    fn try_from(messages: &[Message]) -> Result<UidSet> {
        let mut uids = Vec::with_capacity(messages.len());
        for message in messages {
            match &message.uid {
                Some(uid) => uids.push(uid.as_str()),
                None => return Err(Error::BadUidSet("message without uid".to_string())),
            }
        }
        UidSet::from_parts(uids)
    }
}

/// A mail account session.
///
/// Holds at most one live SMTP and one live IMAP connection, each dialed on
/// first use. [`MailSession::close`] shuts both down and is idempotent.
pub struct MailSession {
    username: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    smtp_host: Option<String>,
    use_tls: bool,
    use_ssl: bool,
    timeout: Duration,
    debug: bool,

    smtp: Option<SmtpTransport>,
    imap: Option<Client<Connection>>,
}

impl Default for MailSession {
    fn default() -> Self {
        MailSession::new()
    }
}

impl MailSession {
    /// A session configured from the `POSTBOX_*` environment variables,
    /// to be refined with the builder methods.
    pub fn new() -> Self {
        MailSession {
            username: env::var(USERNAME_VAR).ok(),
            password: env::var(PASSWORD_VAR).ok(),
            imap_host: env::var(IMAP_HOST_VAR).ok(),
            smtp_host: env::var(SMTP_HOST_VAR).ok(),
            use_tls: false,
            use_ssl: false,
            timeout: Duration::from_secs(60),
            debug: false,
            smtp: None,
            imap: None,
        }
    }

    pub fn username<S: Into<String>>(mut self, username: S) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    /// The IMAP host, `host` or `host:port`.
    pub fn imap_host<S: Into<String>>(mut self, host: S) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// The SMTP host, `host` or `host:port`.
    pub fn smtp_host<S: Into<String>>(mut self, host: S) -> Self {
        self.smtp_host = Some(host.into());
        self
    }

    /// Upgrade plaintext connections with STARTTLS.
    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Connect through TLS-wrapped sockets (ports 993/465 by default).
    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Socket timeout applied at connection establishment.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Echo the IMAP wire conversation through `log::trace!`.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn imap_addr(&self) -> Result<(String, u16)> {
        let host = self
            .imap_host
            .clone()
            .or_else(|| default_host(&DEFAULT_IMAP_HOSTS, self.username.as_deref()))
            .ok_or_else(|| Error::Config("imap host".to_string()))?;
        let default_port = if self.use_ssl { IMAP_SSL_PORT } else { IMAP_PORT };
        Ok(split_host_port(&host, default_port))
    }

    fn smtp_addr(&self) -> Result<(String, u16)> {
        let host = self
            .smtp_host
            .clone()
            .or_else(|| default_host(&DEFAULT_SMTP_HOSTS, self.username.as_deref()))
            .ok_or_else(|| Error::Config("smtp host".to_string()))?;
        let default_port = if self.use_ssl { SMTP_SSL_PORT } else { SMTP_PORT };
        Ok(split_host_port(&host, default_port))
    }

    fn credentials(&self) -> Result<(String, String)> {
        let username = self
            .username
            .clone()
            .ok_or_else(|| Error::Config("username".to_string()))?;
        let password = self
            .password
            .clone()
            .ok_or_else(|| Error::Config("password".to_string()))?;
        Ok((username, password))
    }

    fn imap(&mut self) -> Result<&mut Client<Connection>> {
        if self.imap.is_none() {
            let (host, port) = self.imap_addr()?;
            let (username, password) = self.credentials()?;
            debug!("Logging in to imap server {}:{} as {}", host, port, username);
            let mut client = if self.use_ssl {
                Client::connect_ssl(&host, port, self.timeout)?
            } else if self.use_tls {
                Client::connect_starttls(&host, port, self.timeout)?
            } else {
                Client::connect(&host, port, self.timeout)?
            };
            client.debug = self.debug;
            let login = format!(
                "LOGIN {} {}",
                validate_str(&username)?,
                validate_str(&password)?
            );
            let response = client.run_command_and_read_response(&login)?;
            validate_ok(response, "login")?;
            declare_identity(&mut client)?;
            self.imap = Some(client);
        }
        // just populated above
        self.imap
            .as_mut()
            .ok_or(Error::ConnectionLost)
    }

    fn smtp(&mut self) -> Result<&SmtpTransport> {
        if self.smtp.is_none() {
            let (host, port) = self.smtp_addr()?;
            let (username, password) = self.credentials()?;
            debug!("Logging in to smtp server {}:{} as {}", host, port, username);
            let builder = if self.use_ssl {
                SmtpTransport::relay(&host)?
            } else if self.use_tls {
                SmtpTransport::starttls_relay(&host)?
            } else {
                SmtpTransport::builder_dangerous(&host)
            };
            let transport = builder
                .port(port)
                .credentials(Credentials::new(username, password))
                .timeout(Some(self.timeout))
                .build();
            self.smtp = Some(transport);
        }
        self.smtp.as_ref().ok_or(Error::ConnectionLost)
    }

    /// Send a composed message. Falls back to the session's username as
    /// sender when the message does not name one.
    pub fn send(&mut self, message: &mut Message) -> Result<()> {
        if message.sender.is_none() {
            let (username, _) = self.credentials()?;
            message.sender = Some(crate::MailAddress::parse(&username));
        }
        let from = message
            .sender
            .as_ref()
            .map(|sender| sender.address.parse::<Address>())
            .transpose()?;
        let to = message
            .to_addrs()
            .iter()
            .map(|addr| addr.address.parse::<Address>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let envelope = Envelope::new(from, to)?;
        let raw = message.to_bytes()?;
        info!("Sending mail to {:?}", envelope.to());
        self.smtp()?.send_raw(&envelope, &raw)?;
        Ok(())
    }

    /// Select the mailbox subsequent SEARCH/FETCH/STORE calls operate on.
    pub fn select(&mut self, folder: &str) -> Result<()> {
        info!("Selecting mail folder '{}'", folder);
        let command = format!("SELECT {}", encode_folder(folder));
        let response = self.imap()?.run_command_and_read_response(&command)?;
        validate_ok(response, "select").map(|_| ())
    }

    /// Like [`MailSession::select`], but read-only: no flags are altered by
    /// later fetches.
    pub fn examine(&mut self, folder: &str) -> Result<()> {
        let command = format!("EXAMINE {}", encode_folder(folder));
        let response = self.imap()?.run_command_and_read_response(&command)?;
        validate_ok(response, "examine").map(|_| ())
    }

    /// Run a SEARCH with the given criterion (`ALL` when empty), returning
    /// message sequence numbers.
    pub fn search(&mut self, criteria: &str) -> Result<Vec<Seq>> {
        let criteria = if criteria.trim().is_empty() {
            "ALL"
        } else {
            criteria
        };
        info!("Searching mails with criterion {}", criteria);
        let command = format!("SEARCH {}", criteria);
        let response = self.imap()?.run_command_and_read_response(&command)?;
        let data = validate_ok(response, "search")?;
        parse_ids(&data)
    }

    /// [`MailSession::search`] with an explicit charset for the criterion.
    pub fn search_charset(&mut self, criteria: &str, charset: &str) -> Result<Vec<Seq>> {
        let command = format!("SEARCH CHARSET {} {}", charset, criteria);
        let response = self.imap()?.run_command_and_read_response(&command)?;
        let data = validate_ok(response, "search")?;
        parse_ids(&data)
    }

    fn fetch_one(&mut self, seq: &str, mark_seen: bool) -> Result<Option<Message>> {
        let parts = if mark_seen {
            "(BODY[] UID FLAGS)"
        } else {
            "(BODY.PEEK[] UID FLAGS)"
        };
        let command = format!("FETCH {} {}", seq, parts);
        let response = self.imap()?.run_command_and_read_response(&command)?;
        let data = validate_ok(response, "fetch")?;
        let mut fetches = parse_fetches(&data);
        if fetches.is_empty() {
            warn!("No usable FETCH data for message {}", seq);
            return Ok(None);
        }
        Ok(Some(Message::from_fetch(fetches.remove(0))))
    }

    /// Fetch every message in `seqs` eagerly. Fetching with `mark_seen`
    /// uses `BODY[]`, which makes the server set `\Seen`; otherwise
    /// `BODY.PEEK[]` leaves flags untouched. Messages the server answers
    /// with unusable data are skipped.
    pub fn fetch_messages(&mut self, seqs: &[Seq], mark_seen: bool) -> Result<Vec<Message>> {
        let mut messages = Vec::with_capacity(seqs.len());
        for seq in seqs {
            if let Some(message) = self.fetch_one(seq, mark_seen)? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// Fetch lazily: each pulled entry performs one blocking FETCH
    /// round-trip. The iterator can be abandoned at any point.
    pub fn fetch_iter(&mut self, seqs: Vec<Seq>, mark_seen: bool) -> Messages<'_> {
        Messages {
            session: self,
            seqs: seqs.into_iter(),
            mark_seen,
        }
    }

    /// The UID of each message in `seqs`, skipping those the server reports
    /// none for.
    pub fn fetch_uids(&mut self, seqs: &[Seq]) -> Result<Vec<Uid>> {
        let mut uids = Vec::with_capacity(seqs.len());
        for seq in seqs {
            let command = format!("FETCH {} UID", seq);
            let response = self.imap()?.run_command_and_read_response(&command)?;
            let data = validate_ok(response, "fetch")?;
            match find_uid(&String::from_utf8_lossy(&data)) {
                Some(uid) => uids.push(uid),
                None => warn!("No UID in FETCH response for message {}", seq),
            }
        }
        Ok(uids)
    }

    pub fn all(&mut self, mark_seen: bool) -> Result<Vec<Message>> {
        let seqs = self.search("ALL")?;
        self.fetch_messages(&seqs, mark_seen)
    }

    pub fn unread(&mut self, mark_seen: bool) -> Result<Vec<Message>> {
        let seqs = self.search("UNSEEN")?;
        self.fetch_messages(&seqs, mark_seen)
    }

    pub fn recent(&mut self, mark_seen: bool) -> Result<Vec<Message>> {
        let seqs = self.search("RECENT")?;
        self.fetch_messages(&seqs, mark_seen)
    }

    pub fn new_messages(&mut self, mark_seen: bool) -> Result<Vec<Message>> {
        let seqs = self.search("NEW")?;
        self.fetch_messages(&seqs, mark_seen)
    }

    pub fn old(&mut self, mark_seen: bool) -> Result<Vec<Message>> {
        let seqs = self.search("OLD")?;
        self.fetch_messages(&seqs, mark_seen)
    }

    /// Messages whose envelope `From` contains `sender`.
    pub fn from_sender(&mut self, sender: &str, mark_seen: bool) -> Result<Vec<Message>> {
        let seqs = self.search(&format!("FROM \"{}\"", sender))?;
        self.fetch_messages(&seqs, mark_seen)
    }

    /// Add (`set` true) or remove the given flags on every message in the
    /// UID set, in a single `UID STORE`. An empty set is a no-op.
    pub fn flag(&mut self, uid_set: UidSet, flags: &[Flag], set: bool) -> Result<()> {
        if uid_set.is_empty() {
            return Ok(());
        }
        let list = flags.iter().map(Flag::to_imap).collect::<Vec<_>>().join(" ");
        let sign = if set { '+' } else { '-' };
        info!(
            "{} flags ({}) for uids {}",
            if set { "Setting" } else { "Removing" },
            list,
            uid_set.as_str()
        );
        let command = format!("UID STORE {} {}FLAGS ({})", uid_set.as_str(), sign, list);
        let response = self.imap()?.run_command_and_read_response(&command)?;
        validate_ok(response, "store").map(|_| ())
    }

    pub fn mark_as_delete<U>(&mut self, uids: U) -> Result<()>
    where
        U: TryInto<UidSet, Error = Error>,
    {
        self.flag(uids.try_into()?, &[Flag::Deleted], true)
    }

    pub fn mark_as_seen<U>(&mut self, uids: U) -> Result<()>
    where
        U: TryInto<UidSet, Error = Error>,
    {
        self.flag(uids.try_into()?, &[Flag::Seen], true)
    }

    pub fn mark_as_unseen<U>(&mut self, uids: U) -> Result<()>
    where
        U: TryInto<UidSet, Error = Error>,
    {
        self.flag(uids.try_into()?, &[Flag::Seen], false)
    }

    /// Permanently remove every message flagged `\Deleted` from the selected
    /// mailbox.
    pub fn expunge(&mut self) -> Result<()> {
        let response = self.imap()?.run_command_and_read_response("EXPUNGE")?;
        validate_ok(response, "expunge").map(|_| ())
    }

    /// All folders of the account, names decoded from modified UTF-7.
    pub fn folders(&mut self) -> Result<Vec<MailFolder>> {
        let response = self
            .imap()?
            .run_command_and_read_response("LIST \"\" \"*\"")?;
        let data = validate_ok(response, "list")?;
        parse_folders(&data)
    }

    /// Copy matching messages to `to_folder` and flag the originals deleted.
    ///
    /// Messages matching `criteria` (`NEW` when `None`) are fetched one by
    /// one without marking them seen; `keep` decides per message whether it
    /// moves. A failure on one message is recorded in that message's outcome
    /// and the remaining messages are still attempted.
    pub fn move_messages<F>(
        &mut self,
        to_folder: &str,
        criteria: Option<&str>,
        mut keep: F,
    ) -> Result<Vec<(Seq, Result<()>)>>
    where
        F: FnMut(&mut Message) -> bool,
    {
        let seqs = self.search(criteria.unwrap_or("NEW"))?;
        let folder = encode_folder(to_folder);
        let mut outcomes = Vec::new();
        for seq in seqs {
            match self.move_one(&seq, &folder, &mut keep) {
                Ok(true) => outcomes.push((seq, Ok(()))),
                Ok(false) => {}
                Err(e) => outcomes.push((seq, Err(e))),
            }
        }
        Ok(outcomes)
    }

    fn move_one<F>(&mut self, seq: &str, folder: &str, keep: &mut F) -> Result<bool>
    where
        F: FnMut(&mut Message) -> bool,
    {
        let mut message = match self.fetch_one(seq, false)? {
            Some(message) => message,
            None => return Ok(false),
        };
        if !keep(&mut message) {
            return Ok(false);
        }
        let uid = message
            .uid
            .clone()
            .ok_or_else(|| Error::BadUidSet("message without uid".to_string()))?;
        let command = format!("UID COPY {} {}", uid, folder);
        let response = self.imap()?.run_command_and_read_response(&command)?;
        validate_ok(response, "copy")?;
        self.flag(UidSet::try_from(uid.as_str())?, &[Flag::Deleted], true)?;
        info!("Moved message uid {} to {}", uid, folder);
        Ok(true)
    }

    /// Resend matching messages to `to_addrs` over SMTP, with the same
    /// per-message checkpointing as [`MailSession::move_messages`].
    pub fn relay<F>(
        &mut self,
        to_addrs: &[&str],
        criteria: Option<&str>,
        mut keep: F,
    ) -> Result<Vec<(Seq, Result<()>)>>
    where
        F: FnMut(&mut Message) -> bool,
    {
        let to = to_addrs
            .iter()
            .map(|addr| addr.parse::<Address>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let (username, _) = self.credentials()?;
        let from: Address = username.parse()?;
        let seqs = self.search(criteria.unwrap_or("NEW"))?;
        let mut outcomes = Vec::new();
        for seq in seqs {
            match self.relay_one(&seq, &from, &to, &mut keep) {
                Ok(true) => outcomes.push((seq, Ok(()))),
                Ok(false) => {}
                Err(e) => outcomes.push((seq, Err(e))),
            }
        }
        Ok(outcomes)
    }

    fn relay_one<F>(
        &mut self,
        seq: &str,
        from: &Address,
        to: &[Address],
        keep: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(&mut Message) -> bool,
    {
        let mut message = match self.fetch_one(seq, false)? {
            Some(message) => message,
            None => return Ok(false),
        };
        if !keep(&mut message) {
            return Ok(false);
        }
        let envelope = Envelope::new(Some(from.clone()), to.to_vec())?;
        let raw = message.to_bytes()?;
        self.smtp()?.send_raw(&envelope, &raw)?;
        info!("Relayed message {:?} to {:?}", message, to);
        Ok(true)
    }

    /// Shut down both connections. Safe to call repeatedly; a session with
    /// no live connection is left untouched.
    pub fn close(&mut self) -> Result<()> {
        self.smtp = None;
        if let Some(mut client) = self.imap.take() {
            // CLOSE fails when no mailbox is selected, which is fine
            let response = client.run_command_and_read_response("CLOSE")?;
            let _ = validate_ok(response, "close");
            let response = client.run_command_and_read_response("LOGOUT")?;
            validate_ok(response, "logout")?;
        }
        Ok(())
    }
}

impl Drop for MailSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Lazy FETCH sequence handed out by [`MailSession::fetch_iter`].
pub struct Messages<'a> {
    session: &'a mut MailSession,
    seqs: std::vec::IntoIter<Seq>,
    mark_seen: bool,
}

impl Iterator for Messages<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let seq = self.seqs.next()?;
            match self.session.fetch_one(&seq, self.mark_seen) {
                Ok(Some(message)) => return Some(Ok(message)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

fn declare_identity(client: &mut Client<Connection>) -> Result<()> {
    let command = format!(
        "ID (\"name\" \"postbox\" \"version\" \"{}\" \"vendor\" \"postbox\")",
        env!("CARGO_PKG_VERSION")
    );
    let response = client.run_command_and_read_response(&command)?;
    validate_ok(response, "id").map(|_| ())
}

fn parse_ids(data: &[u8]) -> Result<Vec<Seq>> {
    let mut ids = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        match imap_proto::parser::parse_response(rest) {
            Ok((remaining, Response::MailboxData(MailboxDatum::Search(seqs)))) => {
                rest = remaining;
                ids.extend(seqs.iter().map(|id| id.to_string()));
            }
            Ok((remaining, _)) => {
                rest = remaining;
            }
            Err(_) => {
                return Err(Error::Parse(ParseError::Invalid(rest.to_vec())));
            }
        }
    }
    Ok(ids)
}

fn attribute_name(attr: &NameAttribute) -> String {
    match attr {
        NameAttribute::NoInferiors => "\\Noinferiors".into(),
        NameAttribute::NoSelect => "\\Noselect".into(),
        NameAttribute::Marked => "\\Marked".into(),
        NameAttribute::Unmarked => "\\Unmarked".into(),
        NameAttribute::All => "\\All".into(),
        NameAttribute::Archive => "\\Archive".into(),
        NameAttribute::Drafts => "\\Drafts".into(),
        NameAttribute::Flagged => "\\Flagged".into(),
        NameAttribute::Junk => "\\Junk".into(),
        NameAttribute::Sent => "\\Sent".into(),
        NameAttribute::Trash => "\\Trash".into(),
        // extension attributes arrive with their leading backslash intact
        NameAttribute::Extension(s) => s.to_string(),
        // `NameAttribute` is #[non_exhaustive]; unreachable with the current
        // imap-proto version since every variant is matched above
        other => format!("{:?}", other),
    }
}

fn parse_folders(data: &[u8]) -> Result<Vec<MailFolder>> {
    let mut folders = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        match imap_proto::parser::parse_response(rest) {
            Ok((
                remaining,
                Response::MailboxData(MailboxDatum::List {
                    name_attributes,
                    delimiter,
                    name,
                }),
            )) => {
                rest = remaining;
                folders.push(MailFolder::new(
                    utf7::decode(name.as_bytes()),
                    name_attributes.iter().map(attribute_name).collect(),
                    delimiter.map(|d| d.to_string()),
                ));
            }
            Ok((remaining, _)) => {
                rest = remaining;
            }
            Err(_) => {
                return Err(Error::Parse(ParseError::Invalid(rest.to_vec())));
            }
        }
    }
    Ok(folders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_stream::MockStream;
    use std::sync::{Arc, Mutex};

    fn mock_session(response: &str) -> (MailSession, Arc<Mutex<Vec<u8>>>) {
        let mut stream = MockStream::new(response.as_bytes().to_vec());
        let tap = stream.tap();
        let mut session = MailSession::new();
        session.imap = Some(Client::new(Box::new(stream) as Connection));
        (session, tap)
    }

    fn written(tap: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&tap.lock().unwrap()).into_owned()
    }

    #[test]
    fn select_quotes_the_folder() {
        let (mut session, tap) = mock_session("a1 OK [READ-WRITE] SELECT completed\r\n");
        session.select("INBOX").unwrap();
        assert_eq!(written(&tap), "a1 SELECT \"INBOX\"\r\n");
    }

    #[test]
    fn select_encodes_non_ascii_folders() {
        let (mut session, tap) = mock_session("a1 OK SELECT completed\r\n");
        session.select("Boîte").unwrap();
        assert!(written(&tap).contains('&'));
        assert!(written(&tap).starts_with("a1 SELECT \""));
    }

    #[test]
    fn folder_escaping() {
        assert_eq!(encode_folder("INBOX"), "\"INBOX\"");
        assert_eq!(encode_folder("A&B"), "\"A&-B\"");
        assert_eq!(encode_folder("say \"hi\""), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn search_returns_sequence_numbers() {
        let (mut session, tap) = mock_session("* SEARCH 3 5 9\r\na1 OK SEARCH completed\r\n");
        let seqs = session.search("UNSEEN").unwrap();
        assert_eq!(seqs, vec!["3", "5", "9"]);
        assert_eq!(written(&tap), "a1 SEARCH UNSEEN\r\n");
    }

    #[test]
    fn empty_criteria_searches_all() {
        let (mut session, tap) = mock_session("* SEARCH\r\na1 OK SEARCH completed\r\n");
        let seqs = session.search("").unwrap();
        assert!(seqs.is_empty());
        assert_eq!(written(&tap), "a1 SEARCH ALL\r\n");
    }

    #[test]
    fn fetch_builds_a_message() {
        let (mut session, tap) = mock_session(
            "* 1 FETCH (UID 42 FLAGS (\\Seen) BODY[] {25}\r\nSubject: hello\r\n\r\nworld\r\n)\r\n\
             a1 OK FETCH completed\r\n",
        );
        let messages = session.fetch_messages(&["1".to_string()], false).unwrap();
        assert_eq!(messages.len(), 1);
        let mut message = messages.into_iter().next().unwrap();
        assert_eq!(message.uid.as_deref(), Some("42"));
        assert_eq!(message.flags, vec![Flag::Seen]);
        assert_eq!(message.subject(), "hello");
        assert_eq!(written(&tap), "a1 FETCH 1 (BODY.PEEK[] UID FLAGS)\r\n");
    }

    #[test]
    fn mark_seen_switches_the_part_specifier() {
        let (mut session, tap) = mock_session(
            "* 1 FETCH (UID 7 FLAGS () BODY[] {3}\r\nhi\n)\r\na1 OK FETCH completed\r\n",
        );
        session.fetch_messages(&["1".to_string()], true).unwrap();
        assert_eq!(written(&tap), "a1 FETCH 1 (BODY[] UID FLAGS)\r\n");
    }

    #[test]
    fn store_issues_one_batched_command() {
        let (mut session, tap) = mock_session("a1 OK STORE completed\r\n");
        session.mark_as_delete("1, 2,3").unwrap();
        assert_eq!(written(&tap), "a1 UID STORE 1,2,3 +FLAGS (\\Deleted)\r\n");
    }

    #[test]
    fn unseen_removes_the_flag() {
        let (mut session, tap) = mock_session("a1 OK STORE completed\r\n");
        session.mark_as_unseen(vec!["4".to_string(), "5".to_string()]).unwrap();
        assert_eq!(written(&tap), "a1 UID STORE 4,5 -FLAGS (\\Seen)\r\n");
    }

    #[test]
    fn empty_uid_set_is_a_no_op() {
        let (mut session, tap) = mock_session("");
        session
            .flag(UidSet::from_parts(Vec::<&str>::new()).unwrap(), &[Flag::Seen], true)
            .unwrap();
        assert_eq!(written(&tap), "");
    }

    #[test]
    fn bad_uids_fail_before_any_traffic() {
        let (mut session, tap) = mock_session("");
        match session.mark_as_seen("x") {
            Err(Error::BadUidSet(uid)) => assert_eq!(uid, "x"),
            other => panic!("expected bad uid error, got {:?}", other),
        }
        assert_eq!(written(&tap), "");
    }

    #[test]
    fn uid_set_cleaning() {
        assert_eq!(UidSet::try_from("1, 2,3").unwrap().as_str(), "1,2,3");
        assert_eq!(
            UidSet::try_from(vec!["4".to_string(), "5".to_string()])
                .unwrap()
                .as_str(),
            "4,5"
        );
        assert!(UidSet::try_from(vec!["x".to_string()]).is_err());
    }

    #[test]
    fn uid_set_from_messages() {
        let mut message = Message::new();
        message.uid = Some("17".to_string());
        assert_eq!(UidSet::try_from(&message).unwrap().as_str(), "17");

        let no_uid = Message::new();
        assert!(UidSet::try_from(&no_uid).is_err());
    }

    #[test]
    fn folders_decode_utf7_names() {
        let (mut session, tap) = mock_session(
            "* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n\
             * LIST (\\Noselect) \"/\" \"&U,BTFw-\"\r\n\
             a1 OK LIST completed\r\n",
        );
        let folders = session.folders().unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name(), "INBOX");
        assert_eq!(folders[0].flags(), &["\\HasNoChildren".to_string()]);
        assert_eq!(folders[0].delimiter(), Some("/"));
        assert_eq!(folders[1].name(), "\u{53f0}\u{5317}");
        assert_eq!(folders[1].flags(), &["\\Noselect".to_string()]);
        assert_eq!(written(&tap), "a1 LIST \"\" \"*\"\r\n");
    }

    #[test]
    fn close_logs_out_and_is_idempotent() {
        let (mut session, tap) = mock_session(
            "a1 OK CLOSE completed\r\n* BYE logging out\r\na2 OK LOGOUT completed\r\n",
        );
        session.close().unwrap();
        assert_eq!(written(&tap), "a1 CLOSE\r\na2 LOGOUT\r\n");
        session.close().unwrap();
        assert_eq!(written(&tap), "a1 CLOSE\r\na2 LOGOUT\r\n");
    }

    #[test]
    fn fetch_iter_is_lazy() {
        let (mut session, _tap) = mock_session(
            "* 1 FETCH (UID 1 FLAGS () BODY[] {2}\r\nhi)\r\na1 OK FETCH completed\r\n\
             * 2 FETCH (UID 2 FLAGS () BODY[] {2}\r\nho)\r\na2 OK FETCH completed\r\n",
        );
        let mut iter = session.fetch_iter(vec!["1".to_string(), "2".to_string()], true);
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first.uid.as_deref(), Some("1"));
        let second = iter.next().unwrap().unwrap();
        assert_eq!(second.uid.as_deref(), Some("2"));
        assert!(iter.next().is_none());
    }

    #[test]
    fn default_hosts_follow_the_account_domain() {
        assert_eq!(
            default_host(&DEFAULT_IMAP_HOSTS, Some("someone@gmail.com")),
            Some("imap.gmail.com".to_string())
        );
        assert_eq!(
            default_host(&DEFAULT_SMTP_HOSTS, Some("someone@outlook.com")),
            Some("smtp.office365.com:587".to_string())
        );
        assert_eq!(default_host(&DEFAULT_IMAP_HOSTS, Some("me@nowhere.example")), None);
        assert_eq!(default_host(&DEFAULT_IMAP_HOSTS, None), None);
    }

    #[test]
    fn explicit_ports_override_defaults() {
        assert_eq!(
            split_host_port("mail.example.com:1993", 143),
            ("mail.example.com".to_string(), 1993)
        );
        assert_eq!(
            split_host_port("mail.example.com", 993),
            ("mail.example.com".to_string(), 993)
        );
    }
}
