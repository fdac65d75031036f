//! Command-line mail tool over the `postbox` library.

use std::io::Read;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use postbox::{MailSession, Message, Result};

#[derive(Parser)]
#[command(name = "postbox", version, about = "Send and read mail over SMTP and IMAP")]
struct Args {
    /// Email account user name.
    #[arg(short, long, env = "POSTBOX_USERNAME")]
    user: String,
    /// Email account password.
    #[arg(short, long, env = "POSTBOX_PASSWORD")]
    password: String,
    /// IMAP server, `host` or `host:port`.
    #[arg(long, env = "POSTBOX_IMAP_HOST")]
    imap: Option<String>,
    /// SMTP server, `host` or `host:port`.
    #[arg(long, env = "POSTBOX_SMTP_HOST")]
    smtp: Option<String>,
    /// Upgrade plaintext connections with STARTTLS.
    #[arg(long)]
    use_tls: bool,
    /// Connect through TLS-wrapped sockets.
    #[arg(long)]
    use_ssl: bool,
    /// Connection timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,
    /// Echo the IMAP wire conversation.
    #[arg(short, long)]
    debug: bool,

    /// Mailbox folder to operate on.
    #[arg(long, default_value = "INBOX")]
    select: String,
    /// List mailbox folder names.
    #[arg(long)]
    list: bool,

    /// Send a mail composed from the arguments below.
    #[arg(long)]
    send: bool,
    /// Sender address.
    #[arg(short = 'f', long)]
    sender: Option<String>,
    /// Recipient addresses.
    #[arg(short = 't', long, num_args = 1..)]
    to: Vec<String>,
    /// Carbon-copy recipient addresses.
    #[arg(long, num_args = 0..)]
    cc: Vec<String>,
    /// Mail subject.
    #[arg(short, long)]
    subject: Option<String>,
    /// Mail content; read from stdin when omitted.
    #[arg(short, long)]
    content: Option<String>,
    /// Attachment paths, `cid<N>:<path>` for inline media.
    #[arg(short, long, num_args = 0..)]
    attachment: Vec<String>,

    /// Read all mails.
    #[arg(long)]
    all: bool,
    /// Read unread mails.
    #[arg(long)]
    unread: bool,
    /// Read recent mails.
    #[arg(long)]
    recent: bool,
    /// Read new mails.
    #[arg(long)]
    new: bool,
    /// Read old mails.
    #[arg(long)]
    old: bool,
    /// Print the mail body as well.
    #[arg(long)]
    verbose: bool,
    /// Mark mails as seen while reading them.
    #[arg(long)]
    mark_as_seen: bool,

    /// Flag the given uids deleted.
    #[arg(long)]
    delete: bool,
    /// Mark the given uids seen.
    #[arg(long)]
    seen: bool,
    /// Mark the given uids unseen.
    #[arg(long)]
    unseen: bool,
    /// Mail uid set, e.g. `1,2,3`.
    #[arg(long)]
    uid: Option<String>,

    /// Relay new mails to these addresses.
    #[arg(long, num_args = 1..)]
    relay_to: Vec<String>,
}

fn display(message: &mut Message, verbose: bool) {
    println!("======== {} ========", message.subject());
    if let Some(sender) = message.sender() {
        println!("Sender: {}", sender);
    }
    println!("Date: {}", message.date());
    let recipients = message
        .recipients()
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!("Recipient: {}", recipients);
    let flags = message
        .flags
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "UID: {}   Flags: {}",
        message.uid.as_deref().unwrap_or("-"),
        flags
    );
    let attachments = message
        .received_attachments()
        .iter()
        .map(|a| a.filename().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!("Attachments: {}", attachments);
    if verbose {
        println!("Content:");
        println!("{}", message.content());
    }
    println!();
}

fn run(args: Args) -> Result<()> {
    let mut session = MailSession::new()
        .username(&args.user)
        .password(&args.password)
        .use_tls(args.use_tls)
        .use_ssl(args.use_ssl)
        .timeout(Duration::from_secs(args.timeout))
        .debug(args.debug);
    if let Some(imap) = &args.imap {
        session = session.imap_host(imap);
    }
    if let Some(smtp) = &args.smtp {
        session = session.smtp_host(smtp);
    }

    if args.send {
        let mut message = Message::new();
        if let Some(sender) = &args.sender {
            message.sender = Some(sender.as_str().into());
        }
        message.recipient = args.to.iter().map(|a| a.as_str().into()).collect();
        message.cc = args.cc.iter().map(|a| a.as_str().into()).collect();
        message.attachments = args.attachment.clone();
        message.content = match &args.content {
            Some(content) => content.clone(),
            None => {
                let mut content = String::new();
                std::io::stdin().read_to_string(&mut content)?;
                content
            }
        };
        message.subject = args
            .subject
            .clone()
            .unwrap_or_else(|| message.content.chars().take(50).collect());
        session.send(&mut message)?;
        println!("Sent mail '{}' to {:?}", message.subject, args.to);
        return session.close();
    }

    if args.list {
        for folder in session.folders()? {
            println!("{}", folder.name());
        }
        return session.close();
    }

    session.select(&args.select)?;

    if args.delete || args.seen || args.unseen {
        let uids = args
            .uid
            .as_deref()
            .ok_or_else(|| postbox::Error::BadUidSet("no --uid given".to_string()))?;
        if args.delete {
            session.mark_as_delete(uids)?;
            session.expunge()?;
        }
        if args.seen {
            session.mark_as_seen(uids)?;
        }
        if args.unseen {
            session.mark_as_unseen(uids)?;
        }
        return session.close();
    }

    if !args.relay_to.is_empty() {
        let to: Vec<&str> = args.relay_to.iter().map(String::as_str).collect();
        for (seq, outcome) in session.relay(&to, None, |_| true)? {
            match outcome {
                Ok(()) => println!("Relayed message {}", seq),
                Err(e) => eprintln!("Could not relay message {}: {}", seq, e),
            }
        }
        return session.close();
    }

    let messages = if args.all {
        session.all(args.mark_as_seen)?
    } else if args.recent {
        session.recent(args.mark_as_seen)?
    } else if args.new {
        session.new_messages(args.mark_as_seen)?
    } else if args.old {
        session.old(args.mark_as_seen)?
    } else if args.unread {
        session.unread(args.mark_as_seen)?
    } else {
        // reading unread mail is the default mode
        session.unread(args.mark_as_seen)?
    };
    for mut message in messages {
        display(&mut message, args.verbose);
    }
    session.close()
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("postbox: {}", e);
            ExitCode::FAILURE
        }
    }
}
