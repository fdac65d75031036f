//! A blocking SMTP/IMAP mailbox client.
//!
//! `postbox` sends mail over SMTP and reads and manages mail over IMAP from
//! one [`MailSession`]. Messages are modeled by [`Message`], which serializes
//! outgoing mail (text or HTML body, attachments, inline media referenced by
//! content id) and lazily derives structured fields from received raw bytes.
//!
//! # Usage
//!
//! ```no_run
//! use postbox::{MailSession, Message};
//!
//! fn main() -> postbox::Result<()> {
//!     let mut session = MailSession::new()
//!         .username("someone@example.com")
//!         .password("secret")
//!         .imap_host("mail.example.com")
//!         .smtp_host("mail.example.com")
//!         .use_ssl(true);
//!
//!     let mut message = Message::new();
//!     message.recipient = vec!["friend@example.com".into()];
//!     message.subject = "Hello".to_string();
//!     message.content = "How are you?".to_string();
//!     session.send(&mut message)?;
//!
//!     session.select("INBOX")?;
//!     for mut mail in session.unread(false)? {
//!         println!("{}: {}", mail.date(), mail.subject());
//!     }
//!
//!     session.close()
//! }
//! ```

mod client;
mod conn;
mod fetch;
mod header;
mod message;
mod response;
mod session;
mod types;
mod utf7;

pub mod error;

pub use crate::conn::{Connection, MailStream};
pub use crate::error::{AttachmentError, Error, ParseError, Result, ValidateError};
pub use crate::fetch::{parse_fetches, split_fetch_items, FetchItem, FetchResponse};
pub use crate::header::{decode_header, parse_address_list, MailAddress};
pub use crate::message::{min_date, MailAttachment, Message};
pub use crate::response::{validate, validate_ok, CommandResponse, Status};
pub use crate::session::{MailSession, Messages, UidSet};
pub use crate::types::{Flag, MailFolder, Seq, Uid};

/// The RFC 3501 modified UTF-7 folder-name codec.
pub mod imap_utf7 {
    pub use crate::utf7::{decode, encode};
}

#[cfg(test)]
mod mock_stream;
