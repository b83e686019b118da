//! SMTP client-command state machine.
//!
//! The parser frames the client side into CRLF lines and tracks just enough
//! of the dialogue to pull out login credentials, envelope addresses and the
//! `Subject` header. Server replies are framed and dropped.

use bytes::BytesMut;
use log::debug;
use tokio_util::codec::Decoder;

use super::ProtocolParser;
use crate::{
    direction::Side,
    line::LineDecoder,
    metadata::{MetaRecord, SmtpKind},
    protocol::Protocol,
};

/// Position of an SMTP dialogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmtpState {
    /// Nothing recognised yet.
    Start,
    /// Between commands.
    AwaitingCommand,
    /// The next line is a login name.
    AwaitingUser,
    /// The next line is a password.
    AwaitingPass,
    /// `MAIL FROM` arrived without an address; the next line supplies it.
    InMailFromArgs,
    /// `RCPT TO` arrived without an address; the next line supplies it.
    InRcptToArgs,
    /// Message headers after `DATA`.
    InDataHeaders,
    /// Message body after the blank line ending the headers.
    InDataBody,
    /// `QUIT` was seen; all further input is ignored.
    Closed,
}

/// Incremental SMTP parser.
///
/// Each complete client line is handled as soon as its CRLF arrives, with
/// one exception: a `Subject` header is reported only once the header ends,
/// that is when the next header line, the blank line or the terminating `.`
/// arrives, because any following line may be a folded continuation. A
/// buffer ending right after `Subject: ...\r\n` therefore yields nothing
/// yet.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use memerge::{MetaRecord, ProtocolParser, Side, SmtpKind, SmtpParser};
///
/// let mut parser = SmtpParser::new();
/// let mut events = Vec::new();
/// let mut buf = BytesMut::from(&b"MAIL FROM:<a@example.org> SIZE=12\r\n"[..]);
///
/// parser.parse(Side::Client, &mut buf, &mut events);
/// assert_eq!(events, vec![MetaRecord::smtp(SmtpKind::MailFrom, "a@example.org")]);
/// ```
#[derive(Debug)]
pub struct SmtpParser {
    state: SmtpState,
    client: LineDecoder,
    server: LineDecoder,
    // `AUTH LOGIN` exchange: the user line is followed by a password line.
    login: bool,
    // Subject header collected across folded lines.
    subject: Option<String>,
}

enum Command<'a> {
    User(&'a str),
    Pass(&'a str),
    Auth { mechanism: &'a str, initial: &'a str },
    MailFrom(&'a str),
    RcptTo(&'a str),
    Data,
    Reset,
    Quit,
    Other,
}

const OTHER_VERBS: &[&str] = &[
    "HELO", "EHLO", "NOOP", "STARTTLS", "VRFY", "EXPN", "HELP", "TURN", "ETRN", "BDAT",
];

impl Default for SmtpParser {
    fn default() -> Self { Self::new() }
}

impl SmtpParser {
    /// Create a parser in [`SmtpState::Start`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SmtpState::Start,
            client: LineDecoder::new(),
            server: LineDecoder::new(),
            login: false,
            subject: None,
        }
    }

    /// Current dialogue state.
    #[must_use]
    pub fn state(&self) -> SmtpState { self.state }

    fn on_line(&mut self, line: &str, events: &mut Vec<MetaRecord>) {
        match self.state {
            SmtpState::Start | SmtpState::AwaitingCommand => self.on_command(line, events),
            SmtpState::AwaitingUser => {
                if !cancelled(line) {
                    events.push(MetaRecord::smtp(SmtpKind::User, line.trim()));
                    if self.login {
                        self.state = SmtpState::AwaitingPass;
                        self.login = false;
                        return;
                    }
                }
                self.login = false;
                self.state = SmtpState::AwaitingCommand;
            }
            SmtpState::AwaitingPass => {
                if !cancelled(line) {
                    events.push(MetaRecord::smtp(SmtpKind::Pass, line.trim()));
                }
                self.state = SmtpState::AwaitingCommand;
            }
            SmtpState::InMailFromArgs => {
                events.push(MetaRecord::smtp(SmtpKind::MailFrom, address(line)));
                self.state = SmtpState::AwaitingCommand;
            }
            SmtpState::InRcptToArgs => {
                events.push(MetaRecord::smtp(SmtpKind::RcptTo, address(line)));
                self.state = SmtpState::AwaitingCommand;
            }
            SmtpState::InDataHeaders => self.on_header(line, events),
            SmtpState::InDataBody => {
                if line == "." {
                    self.state = SmtpState::AwaitingCommand;
                }
            }
            SmtpState::Closed => {}
        }
    }

    fn on_command(&mut self, line: &str, events: &mut Vec<MetaRecord>) {
        let Some(command) = parse_command(line) else {
            return;
        };
        self.state = match command {
            Command::User("") => SmtpState::AwaitingUser,
            Command::Pass("") => SmtpState::AwaitingPass,
            Command::User(name) => {
                events.push(MetaRecord::smtp(SmtpKind::User, name));
                SmtpState::AwaitingCommand
            }
            Command::Pass(secret) => {
                events.push(MetaRecord::smtp(SmtpKind::Pass, secret));
                SmtpState::AwaitingCommand
            }
            Command::Auth { mechanism, initial } => {
                let login = mechanism.eq_ignore_ascii_case("LOGIN");
                if initial.is_empty() {
                    self.login = login;
                    SmtpState::AwaitingUser
                } else {
                    events.push(MetaRecord::smtp(SmtpKind::User, initial));
                    if login {
                        SmtpState::AwaitingPass
                    } else {
                        SmtpState::AwaitingCommand
                    }
                }
            }
            Command::MailFrom("") => SmtpState::InMailFromArgs,
            Command::RcptTo("") => SmtpState::InRcptToArgs,
            Command::MailFrom(tail) => {
                events.push(MetaRecord::smtp(SmtpKind::MailFrom, address(tail)));
                SmtpState::AwaitingCommand
            }
            Command::RcptTo(tail) => {
                events.push(MetaRecord::smtp(SmtpKind::RcptTo, address(tail)));
                SmtpState::AwaitingCommand
            }
            Command::Data => {
                self.subject = None;
                SmtpState::InDataHeaders
            }
            Command::Reset | Command::Other => SmtpState::AwaitingCommand,
            Command::Quit => {
                debug!("smtp dialogue closed by QUIT");
                SmtpState::Closed
            }
        };
    }

    fn on_header(&mut self, line: &str, events: &mut Vec<MetaRecord>) {
        if line == "." {
            self.finish_subject(events);
            self.state = SmtpState::AwaitingCommand;
            return;
        }
        if line.is_empty() {
            self.finish_subject(events);
            self.state = SmtpState::InDataBody;
            return;
        }

        let line = line.strip_prefix('.').unwrap_or(line);
        if line.starts_with([' ', '\t']) {
            if let Some(subject) = self.subject.as_mut() {
                let folded = line.trim();
                if !folded.is_empty() {
                    if !subject.is_empty() {
                        subject.push(' ');
                    }
                    subject.push_str(folded);
                }
            }
            return;
        }

        self.finish_subject(events);
        if let Some((name, value)) = line.split_once(':') {
            if name.trim_end().eq_ignore_ascii_case("Subject") {
                self.subject = Some(value.trim().to_owned());
            }
        }
    }

    fn finish_subject(&mut self, events: &mut Vec<MetaRecord>) {
        if let Some(subject) = self.subject.take() {
            events.push(MetaRecord::smtp(SmtpKind::Subject, subject));
        }
    }

    fn parse_client(&mut self, buf: &mut BytesMut, events: &mut Vec<MetaRecord>) {
        while self.state != SmtpState::Closed {
            let Ok(Some(line)) = self.client.decode(buf) else {
                return;
            };
            let line = String::from_utf8_lossy(&line);
            self.on_line(&line, events);
        }
        buf.clear();
    }
}

impl ProtocolParser for SmtpParser {
    fn protocol(&self) -> Protocol { Protocol::Smtp }

    fn parse(&mut self, side: Side, buf: &mut BytesMut, events: &mut Vec<MetaRecord>) {
        match side {
            Side::Client => self.parse_client(buf, events),
            Side::Server if self.state == SmtpState::Closed => buf.clear(),
            Side::Server => {
                while let Ok(Some(_)) = self.server.decode(buf) {}
            }
        }
    }

    fn resync(&mut self, side: Side) {
        match side {
            Side::Client => {
                self.client.discard_current();
                // The oversized line was the awaited argument; do not let the
                // line after it take its place.
                if matches!(
                    self.state,
                    SmtpState::AwaitingUser
                        | SmtpState::AwaitingPass
                        | SmtpState::InMailFromArgs
                        | SmtpState::InRcptToArgs
                ) {
                    self.login = false;
                    self.state = SmtpState::AwaitingCommand;
                }
            }
            Side::Server => self.server.discard_current(),
        }
    }
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    let (verb, args) = line
        .split_once(|c: char| c.is_ascii_whitespace())
        .unwrap_or((line, ""));
    let args = args.trim();
    let is = |name: &str| verb.eq_ignore_ascii_case(name);

    let command = if is("USER") {
        Command::User(args)
    } else if is("PASS") {
        Command::Pass(args)
    } else if is("AUTH") {
        let (mechanism, initial) = args
            .split_once(|c: char| c.is_ascii_whitespace())
            .unwrap_or((args, ""));
        if mechanism.is_empty() {
            return None;
        }
        Command::Auth {
            mechanism,
            initial: initial.trim(),
        }
    } else if is("MAIL") {
        Command::MailFrom(envelope_tail(args, "FROM")?)
    } else if is("RCPT") {
        Command::RcptTo(envelope_tail(args, "TO")?)
    } else if is("DATA") {
        Command::Data
    } else if is("RSET") {
        Command::Reset
    } else if is("QUIT") {
        Command::Quit
    } else if OTHER_VERBS.iter().any(|name| is(name)) {
        Command::Other
    } else {
        return None;
    };
    Some(command)
}

// `FROM:<addr> params` -> `<addr> params`; `None` when the keyword is absent.
fn envelope_tail<'a>(args: &'a str, keyword: &str) -> Option<&'a str> {
    let head = args.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = args[keyword.len()..].trim_start();
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    Some(rest.trim())
}

// Path argument with angle brackets removed and ESMTP parameters ignored.
fn address(tail: &str) -> &str {
    let tail = tail.trim();
    if let Some(inner) = tail.strip_prefix('<') {
        return inner.split_once('>').map_or(inner, |(path, _)| path).trim();
    }
    tail.split_ascii_whitespace().next().unwrap_or("")
}

fn cancelled(line: &str) -> bool { line.trim() == "*" }
