//! The command/response contract: every IMAP command resolves to a
//! [`CommandResponse`], and [`validate`] is the single point where an
//! unexpected status becomes a typed error.

use std::fmt;

use log::debug;

use crate::error::{Error, Result};

/// The condition a tagged server response completed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// The command succeeded.
    Ok,
    /// An operational error; the command failed.
    No,
    /// A protocol-level error; the server rejected the command.
    Bad,
    /// The connection starts pre-authenticated.
    PreAuth,
    /// The server is closing the connection.
    Bye,
}

impl From<imap_proto::Status> for Status {
    fn from(s: imap_proto::Status) -> Self {
        match s {
            imap_proto::Status::Ok => Status::Ok,
            imap_proto::Status::No => Status::No,
            imap_proto::Status::Bad => Status::Bad,
            imap_proto::Status::PreAuth => Status::PreAuth,
            imap_proto::Status::Bye => Status::Bye,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bad => "BAD",
            Status::PreAuth => "PREAUTH",
            Status::Bye => "BYE",
        })
    }
}

/// The outcome of one command: the tagged completion status, the text the
/// server attached to it, and the untagged data lines that preceded it.
#[derive(Debug)]
pub struct CommandResponse {
    /// Status from the tagged completion line.
    pub status: Status,
    /// Human-readable text from the completion line.
    pub information: Option<String>,
    /// Raw untagged response data, CRLF-separated.
    pub data: Vec<u8>,
}

/// Check a response against the expected status, returning its data on a
/// match and an [`Error::Status`] carrying status, data and command name
/// otherwise.
pub fn validate(response: CommandResponse, expected: Status, command: &str) -> Result<Vec<u8>> {
    if response.status == expected {
        debug!("{} completed with {}", command.to_uppercase(), response.status);
        Ok(response.data)
    } else {
        Err(Error::Status {
            command: command.to_string(),
            status: response.status,
            information: response.information,
            data: response.data,
        })
    }
}

/// [`validate`] against the usual `OK`.
pub fn validate_ok(response: CommandResponse, command: &str) -> Result<Vec<u8>> {
    validate(response, Status::Ok, command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_status_passes_data_through() {
        let response = CommandResponse {
            status: Status::Ok,
            information: None,
            data: b"* SEARCH 1 2\r\n".to_vec(),
        };
        let data = validate(response, Status::Ok, "search").unwrap();
        assert_eq!(data, b"* SEARCH 1 2\r\n".to_vec());
    }

    #[test]
    fn unexpected_status_is_typed() {
        let response = CommandResponse {
            status: Status::No,
            information: Some("invalid credentials".to_string()),
            data: Vec::new(),
        };
        match validate(response, Status::Ok, "login") {
            Err(Error::Status {
                command,
                status,
                information,
                ..
            }) => {
                assert_eq!(command, "login");
                assert_eq!(status, Status::No);
                assert_eq!(information.as_deref(), Some("invalid credentials"));
            }
            other => panic!("expected status error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn error_text_carries_the_status() {
        let response = CommandResponse {
            status: Status::No,
            information: None,
            data: Vec::new(),
        };
        let err = validate(response, Status::Ok, "login").unwrap_err();
        assert!(err.to_string().contains("NO"));
    }
}
