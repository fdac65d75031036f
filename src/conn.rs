use std::fmt::{Debug, Formatter};
use std::io::{Read, Write};

/// Transport trait of a read/write stream carrying an IMAP conversation.
pub trait MailStream: Read + Write + Send + private::Sealed {}

impl<T> MailStream for T where T: Read + Write + Send {}

impl Debug for dyn MailStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Imap connection")
    }
}

/// A boxed connection type, so one session can hold plaintext and TLS
/// streams behind the same field.
pub type Connection = Box<dyn MailStream>;

mod private {
    use super::{Read, Write};

    pub trait Sealed {}

    impl<T> Sealed for T where T: Read + Write + Send {}
}
