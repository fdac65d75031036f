//! The tagged-command IMAP wire client.
//!
//! This layer only moves bytes: it writes one tagged command at a time and
//! reads untagged data until the matching tagged completion line arrives,
//! handling `{n}` literals along the way. Interpreting the completion status
//! is left to [`crate::response::validate`].

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bufstream::BufStream;
use imap_proto::Response;
use log::trace;
use native_tls::TlsConnector;

use crate::conn::Connection;
use crate::error::{Error, ParseError, Result, ValidateError};
use crate::response::{CommandResponse, Status};

static TAG_PREFIX: &str = "a";
const INITIAL_TAG: u32 = 0;
const CR: u8 = 0x0d;
const LF: u8 = 0x0a;

macro_rules! quote {
    ($x:expr) => {
        format!("\"{}\"", $x.replace('\\', "\\\\").replace('"', "\\\""))
    };
}

/// Quote a string argument, rejecting characters that would break the
/// single-line command grammar.
pub(crate) fn validate_str(value: &str) -> Result<String> {
    let quoted = quote!(value);
    if quoted.contains('\n') {
        return Err(Error::Validate(ValidateError('\n')));
    }
    if quoted.contains('\r') {
        return Err(Error::Validate(ValidateError('\r')));
    }
    Ok(quoted)
}

fn dial(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address for host"))?;
    Ok(TcpStream::connect_timeout(&addr, timeout)?)
}

/// Stream to interface with the IMAP server. This interface is only for the
/// command stream.
#[derive(Debug)]
pub struct Client<T: Read + Write> {
    stream: BufStream<T>,
    tag: u32,
    /// Echo the wire conversation through `log::trace!` when set.
    pub debug: bool,
}

impl Client<Connection> {
    /// Open a plaintext connection and consume the server greeting.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let tcp = dial(host, port, timeout)?;
        let mut client = Client::new(Box::new(tcp) as Connection);
        client.read_greeting()?;
        Ok(client)
    }

    /// Open an SSL-wrapped connection and consume the server greeting.
    pub fn connect_ssl(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let tcp = dial(host, port, timeout)?;
        let connector = TlsConnector::builder().build()?;
        let tls = connector.connect(host, tcp)?;
        let mut client = Client::new(Box::new(tls) as Connection);
        client.read_greeting()?;
        Ok(client)
    }

    /// Open a plaintext connection, upgrade it with `STARTTLS`, and return
    /// the encrypted client. The greeting is consumed before the upgrade.
    pub fn connect_starttls(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let tcp = dial(host, port, timeout)?;
        let mut plain = Client::new(tcp);
        plain.read_greeting()?;
        let response = plain.run_command_and_read_response("STARTTLS")?;
        crate::response::validate_ok(response, "starttls")?;
        let tcp = plain.into_inner()?;
        let connector = TlsConnector::builder().build()?;
        let tls = connector.connect(host, tcp)?;
        Ok(Client::new(Box::new(tls) as Connection))
    }
}

impl<T: Read + Write> Client<T> {
    /// Creates a new client over the given stream.
    pub fn new(stream: T) -> Client<T> {
        Client {
            stream: BufStream::new(stream),
            tag: INITIAL_TAG,
            debug: false,
        }
    }

    /// Take back the underlying stream, flushing any buffered writes.
    pub fn into_inner(self) -> Result<T> {
        Ok(self.stream.into_inner()?)
    }

    /// Runs any command passed to it, without waiting for the response.
    pub fn run_command(&mut self, untagged_command: &str) -> Result<()> {
        let command = self.create_command(untagged_command);
        self.write_line(command.as_bytes())
    }

    /// Runs a command and reads untagged data until its tagged completion
    /// line, returning both. Does not interpret the completion status.
    pub fn run_command_and_read_response(
        &mut self,
        untagged_command: &str,
    ) -> Result<CommandResponse> {
        self.run_command(untagged_command)?;
        self.read_response()
    }

    /// Consume the untagged server greeting sent right after connecting.
    pub fn read_greeting(&mut self) -> Result<()> {
        let mut v = Vec::new();
        self.readline(&mut v)?;
        Ok(())
    }

    pub(crate) fn read_response(&mut self) -> Result<CommandResponse> {
        enum Break {
            Done(Status, Option<String>),
            Keep,
            Fail,
        }

        let mut data: Vec<u8> = Vec::new();
        let mut continue_from = None;
        let match_tag = format!("{}{}", TAG_PREFIX, self.tag);
        loop {
            let line_start = {
                let start_new = data.len();
                self.readline(&mut data)?;
                continue_from.take().unwrap_or(start_new)
            };

            let decision = {
                let line = &data[line_start..];
                match imap_proto::parser::parse_response(line) {
                    Ok((
                        _,
                        Response::Done {
                            tag,
                            status,
                            information,
                            ..
                        },
                    )) if tag.as_bytes() == match_tag.as_bytes() => {
                        Break::Done(Status::from(status), information.map(|s| s.to_string()))
                    }
                    // untagged data (or a stale tag): keep accumulating
                    Ok(..) => Break::Keep,
                    // a literal is still streaming in; re-parse from the same
                    // offset once more bytes have arrived
                    Err(nom::Err::Incomplete(..)) => {
                        continue_from = Some(line_start);
                        Break::Keep
                    }
                    Err(_) => Break::Fail,
                }
            };

            match decision {
                Break::Done(status, information) => {
                    data.truncate(line_start);
                    return Ok(CommandResponse {
                        status,
                        information,
                        data,
                    });
                }
                Break::Keep => {}
                Break::Fail => {
                    return Err(Error::Parse(ParseError::Invalid(data.split_off(0))));
                }
            }
        }
    }

    fn readline(&mut self, into: &mut Vec<u8>) -> Result<usize> {
        use std::io::BufRead;
        let read = self.stream.read_until(LF, into)?;
        if read == 0 {
            return Err(Error::ConnectionLost);
        }

        if self.debug {
            let len = into.len();
            let line = &into[len - read..len];
            trace!("S: {}", String::from_utf8_lossy(line).trim_end());
        }

        Ok(read)
    }

    fn create_command(&mut self, command: &str) -> String {
        self.tag += 1;
        format!("{}{} {}", TAG_PREFIX, self.tag, command)
    }

    fn write_line(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        self.stream.write_all(&[CR, LF])?;
        self.stream.flush()?;
        if self.debug {
            trace!("C: {}", String::from_utf8_lossy(buf));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_stream::MockStream;

    #[test]
    fn read_response_collects_untagged_data() {
        let response = "* SEARCH 3 5\r\na1 OK SEARCH completed\r\n";
        let mut client = Client::new(MockStream::new(response.as_bytes().to_vec()));
        client.tag = 1;
        let response = client.read_response().unwrap();
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.information.as_deref(), Some("SEARCH completed"));
        assert_eq!(response.data, b"* SEARCH 3 5\r\n".to_vec());
    }

    #[test]
    fn read_response_reports_failure_status() {
        let response = "a1 NO [AUTHENTICATIONFAILED] bad credentials\r\n";
        let mut client = Client::new(MockStream::new(response.as_bytes().to_vec()));
        client.tag = 1;
        let response = client.read_response().unwrap();
        assert_eq!(response.status, Status::No);
        assert!(response.data.is_empty());
    }

    #[test]
    fn read_response_keeps_literals_intact() {
        let response = "* 1 FETCH (BODY[] {5}\r\nhello)\r\na1 OK FETCH completed\r\n";
        let mut client = Client::new(MockStream::new(response.as_bytes().to_vec()));
        client.tag = 1;
        let response = client.read_response().unwrap();
        assert_eq!(response.status, Status::Ok);
        assert_eq!(
            response.data,
            b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n".to_vec()
        );
    }

    #[test]
    fn commands_are_tagged_and_terminated() {
        let response = b"a1 OK LOGIN completed\r\n".to_vec();
        let mut client = Client::new(MockStream::new(response));
        client
            .run_command_and_read_response("LOGIN \"user\" \"pass\"")
            .unwrap();
        assert_eq!(
            client.stream.get_ref().written_buf,
            b"a1 LOGIN \"user\" \"pass\"\r\n".to_vec()
        );
    }

    #[test]
    fn readline_eof_is_connection_lost() {
        let mut client = Client::new(MockStream::default().with_eof());
        let mut v = Vec::new();
        match client.readline(&mut v) {
            Err(Error::ConnectionLost) => {}
            other => panic!("expected connection lost, got {:?}", other),
        }
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!("\"test\\\\text\"", quote!(r"test\text"));
        assert_eq!("\"test\\\"text\"", quote!("test\"text"));
    }

    #[test]
    fn newlines_are_rejected() {
        match validate_str("test\nstring") {
            Err(Error::Validate(ValidateError('\n'))) => {}
            other => panic!("expected validate error, got {:?}", other.map(|_| ())),
        }
    }
}
