use std::fmt;

/// One mailbox folder as reported by `LIST`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailFolder {
    /// The folder name, decoded from modified UTF-7.
    name: String,
    /// Name attributes such as `\HasNoChildren` or `\Noselect`.
    flags: Vec<String>,
    /// The hierarchy delimiter, `None` for a flat name.
    delimiter: Option<String>,
}

impl MailFolder {
    pub(crate) fn new(name: String, flags: Vec<String>, delimiter: Option<String>) -> Self {
        MailFolder {
            name,
            flags,
            delimiter,
        }
    }

    /// The decoded folder name, usable with [`crate::MailSession::select`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name attributes the server reported for this folder.
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// The hierarchy delimiter. All children of one top-level node use the
    /// same separator; `None` means the name is flat.
    pub fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }
}

impl fmt::Display for MailFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
