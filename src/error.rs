use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;
use std::net::TcpStream;
use std::result;
use std::string::FromUtf8Error;

use bufstream::IntoInnerError as BufError;
use native_tls::Error as TlsError;
use native_tls::HandshakeError as TlsHandshakeError;

use crate::response::Status;

/// A convenience wrapper around `Result` for `postbox::Error`.
pub type Result<T> = result::Result<T, Error>;

/// A set of errors that can occur while talking to a mail server or building
/// a message.
#[derive(Debug)]
pub enum Error {
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    Io(IoError),
    /// An error from the `native_tls` library during the TLS handshake.
    TlsHandshake(TlsHandshakeError<TcpStream>),
    /// An error from the `native_tls` library while managing the socket.
    Tls(TlsError),
    /// The connection was terminated unexpectedly.
    ConnectionLost,
    /// A command completed with a status other than the expected one.
    ///
    /// This is the only place protocol-level failures surface; callers never
    /// see raw status strings.
    Status {
        /// The command that was being run.
        command: String,
        /// The status the server actually returned.
        status: Status,
        /// Human-readable text the server attached to the status, if any.
        information: Option<String>,
        /// The untagged data that accompanied the response.
        data: Vec<u8>,
    },
    /// A required connection setting is absent and no default applies.
    Config(String),
    /// The SMTP transport failed to deliver a message.
    Smtp(lettre::transport::smtp::Error),
    /// An SMTP envelope could not be assembled for a message.
    Envelope(lettre::error::Error),
    /// An address could not be converted into an SMTP envelope entry.
    Address(lettre::address::AddressError),
    /// An attachment could not be read or is of an unsupported kind.
    Attachment(AttachmentError),
    /// A UID set argument was neither numeric text nor a message with a UID.
    BadUidSet(String),
    /// Error parsing a server response.
    Parse(ParseError),
    /// Error validating input data before it is sent.
    Validate(ValidateError),
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl<T> From<BufError<T>> for Error {
    fn from(err: BufError<T>) -> Error {
        Error::Io(err.into())
    }
}

impl From<TlsHandshakeError<TcpStream>> for Error {
    fn from(err: TlsHandshakeError<TcpStream>) -> Error {
        Error::TlsHandshake(err)
    }
}

impl From<TlsError> for Error {
    fn from(err: TlsError) -> Error {
        Error::Tls(err)
    }
}

impl From<lettre::transport::smtp::Error> for Error {
    fn from(err: lettre::transport::smtp::Error) -> Error {
        Error::Smtp(err)
    }
}

impl From<lettre::error::Error> for Error {
    fn from(err: lettre::error::Error) -> Error {
        Error::Envelope(err)
    }
}

impl From<lettre::address::AddressError> for Error {
    fn from(err: lettre::address::AddressError) -> Error {
        Error::Address(err)
    }
}

impl From<AttachmentError> for Error {
    fn from(err: AttachmentError) -> Error {
        Error::Attachment(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => fmt::Display::fmt(e, f),
            Error::TlsHandshake(e) => fmt::Display::fmt(e, f),
            Error::Tls(e) => fmt::Display::fmt(e, f),
            Error::ConnectionLost => f.write_str("Connection lost"),
            Error::Status {
                command,
                status,
                information,
                data,
            } => {
                write!(f, "{} returned {}", command, status)?;
                if let Some(info) = information {
                    write!(f, ": {}", info)?;
                }
                if !data.is_empty() {
                    write!(f, " ({})", String::from_utf8_lossy(data))?;
                }
                Ok(())
            }
            Error::Config(what) => write!(f, "Missing configuration: {}", what),
            Error::Smtp(e) => fmt::Display::fmt(e, f),
            Error::Envelope(e) => fmt::Display::fmt(e, f),
            Error::Address(e) => fmt::Display::fmt(e, f),
            Error::Attachment(e) => fmt::Display::fmt(e, f),
            Error::BadUidSet(uid) => write!(f, "Wrong uid: {:?}", uid),
            Error::Parse(e) => fmt::Display::fmt(e, f),
            Error::Validate(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::TlsHandshake(e) => Some(e),
            Error::Tls(e) => Some(e),
            Error::Smtp(e) => Some(e),
            Error::Envelope(e) => Some(e),
            Error::Address(e) => Some(e),
            Error::Attachment(AttachmentError::Io { source, .. }) => Some(source),
            Error::Parse(ParseError::DataNotUtf8(e)) => Some(e),
            _ => None,
        }
    }
}

/// An attachment that could not be turned into a MIME part.
#[derive(Debug)]
pub enum AttachmentError {
    /// An inline-media reference (`cid<N>:path`) resolved to a MIME main type
    /// other than image or audio.
    UnsupportedInlineType {
        /// The offending attachment path.
        path: String,
        /// The MIME type guessed from the file extension.
        mimetype: String,
    },
    /// The attachment file could not be read.
    Io {
        /// The offending attachment path.
        path: String,
        /// The underlying I/O error.
        source: IoError,
    },
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::UnsupportedInlineType { path, mimetype } => write!(
                f,
                "Unsupported inline media type {} for attachment {}",
                mimetype, path
            ),
            AttachmentError::Io { path, source } => {
                write!(f, "Could not read attachment {}: {}", path, source)
            }
        }
    }
}

impl StdError for AttachmentError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AttachmentError::Io { source, .. } => Some(source),
            AttachmentError::UnsupportedInlineType { .. } => None,
        }
    }
}

/// Error parsing a server response.
#[derive(Debug)]
pub enum ParseError {
    /// The response could not be lexed into untagged data and a tagged status.
    Invalid(Vec<u8>),
    /// The response was not valid UTF-8 where text was required.
    DataNotUtf8(FromUtf8Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Invalid(data) => write!(
                f,
                "Unable to parse server response: {:?}",
                String::from_utf8_lossy(data)
            ),
            ParseError::DataNotUtf8(_) => f.write_str("Unable to parse data as UTF-8 text"),
        }
    }
}

impl StdError for ParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ParseError::DataNotUtf8(e) => Some(e),
            ParseError::Invalid(_) => None,
        }
    }
}

/// Invalid character found in a command argument.
#[derive(Debug)]
pub struct ValidateError(pub char);

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // print the character in debug form because invalid ones are often whitespaces
        write!(f, "Invalid character in input: {:?}", self.0)
    }
}

impl StdError for ValidateError {}
