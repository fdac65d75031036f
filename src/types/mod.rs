//! Types shared between the session, the message model and the wire layer.

use std::fmt;

mod folder;
pub use self::folder::MailFolder;

/// A server-assigned stable numeric identifier for a message within a folder,
/// distinct from its transient sequence number. See
/// [RFC 3501 section 2.3.1.1](https://tools.ietf.org/html/rfc3501#section-2.3.1.1).
///
/// UIDs are carried as text because they only ever travel back to the server
/// verbatim inside `UID STORE`/`UID COPY` sets.
pub type Uid = String;

/// A message sequence number: a relative position from 1 to the number of
/// messages in the selected mailbox. Reassigned by the server on EXPUNGE.
pub type Seq = String;

/// A per-message marker maintained by the mail server, normalized to the
/// upper-case, backslash-free form (`SEEN`, `DELETED`, ...).
///
/// System flags are pre-defined in
/// [RFC 3501 section 2.3.2](https://tools.ietf.org/html/rfc3501#section-2.3.2).
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for urgent/special attention.
    Flagged,
    /// Message is marked for removal by a later EXPUNGE.
    Deleted,
    /// Message has not completed composition.
    Draft,
    /// Message recently arrived in this mailbox. Cannot be altered by the
    /// client.
    Recent,
    /// A non-standard user- or server-defined flag.
    Custom(String),
}

impl Flag {
    fn system(s: &str) -> Option<Self> {
        match s {
            "SEEN" => Some(Flag::Seen),
            "ANSWERED" => Some(Flag::Answered),
            "FLAGGED" => Some(Flag::Flagged),
            "DELETED" => Some(Flag::Deleted),
            "DRAFT" => Some(Flag::Draft),
            "RECENT" => Some(Flag::Recent),
            _ => None,
        }
    }

    /// The normalized name of this flag, e.g. `SEEN`.
    pub fn as_str(&self) -> &str {
        match self {
            Flag::Seen => "SEEN",
            Flag::Answered => "ANSWERED",
            Flag::Flagged => "FLAGGED",
            Flag::Deleted => "DELETED",
            Flag::Draft => "DRAFT",
            Flag::Recent => "RECENT",
            Flag::Custom(name) => name,
        }
    }

    /// The wire form sent in a STORE command, e.g. `\Seen`.
    pub fn to_imap(&self) -> String {
        match self {
            Flag::Seen => r"\Seen".to_string(),
            Flag::Answered => r"\Answered".to_string(),
            Flag::Flagged => r"\Flagged".to_string(),
            Flag::Deleted => r"\Deleted".to_string(),
            Flag::Draft => r"\Draft".to_string(),
            Flag::Recent => r"\Recent".to_string(),
            Flag::Custom(name) => format!("\\{}", name),
        }
    }
}

impl From<&str> for Flag {
    /// Normalizes a wire token: leading backslashes are stripped and the name
    /// is upper-cased, so `\Seen`, `Seen` and `SEEN` all map to [`Flag::Seen`].
    fn from(s: &str) -> Self {
        let normalized = s.trim().trim_start_matches('\\').to_uppercase();
        match Flag::system(&normalized) {
            Some(f) => f,
            None => Flag::Custom(normalized),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tokens_normalize() {
        assert_eq!(Flag::from(r"\Seen"), Flag::Seen);
        assert_eq!(Flag::from("seen"), Flag::Seen);
        assert_eq!(Flag::from(r"\FLAGGED"), Flag::Flagged);
        assert_eq!(Flag::from(r"\Junk"), Flag::Custom("JUNK".to_string()));
    }

    #[test]
    fn store_form_round_trips() {
        assert_eq!(Flag::Deleted.to_imap(), r"\Deleted");
        assert_eq!(Flag::from(Flag::Deleted.to_imap().as_str()), Flag::Deleted);
    }
}
