//! SMTP reply parsing and aggregation.
//!
//! Grounded on `mailledger-smtp`'s `parser::parse_reply` / `is_last_reply_line`
//! and `types::reply::ReplyCode`, generalized to retain the code and
//! terminator flag of every individual line rather than collapsing a
//! multi-line reply down to one code, since the session state machine needs
//! to inspect each line as it arrives (continuation detection happens on the
//! terminal line of a 3xx run, not on the whole aggregated reply).

use crate::error::{Error, FailureType};

/// The category of an SMTP reply code, inferred from its first digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 1xx - positive preliminary reply.
    PositivePreliminary,
    /// 2xx - positive completion reply.
    PositiveCompletion,
    /// 3xx - positive intermediate reply (a continuation is expected).
    PositiveIntermediate,
    /// 4xx - transient negative completion reply.
    TransientNegative,
    /// 5xx - permanent negative completion reply.
    PermanentNegative,
}

impl ReplyClass {
    fn from_code(code: u16) -> Option<Self> {
        match code / 100 {
            1 => Some(Self::PositivePreliminary),
            2 => Some(Self::PositiveCompletion),
            3 => Some(Self::PositiveIntermediate),
            4 => Some(Self::TransientNegative),
            5 => Some(Self::PermanentNegative),
            _ => None,
        }
    }
}

/// A single parsed SMTP reply line: `NNN<sep>TEXT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// The three-digit reply code.
    pub code: u16,
    /// `true` when this is the final line of the reply (separator was a
    /// space, or the line was exactly three bytes long).
    pub is_last: bool,
    /// The text following the code and separator; empty if absent.
    pub message: String,
}

impl ReplyLine {
    /// Parses one line of server output (delimiter already stripped by the
    /// line framer).
    ///
    /// # Errors
    ///
    /// Returns [`FailureType::InvalidServerResponse`] if the line is shorter
    /// than three bytes, the first three bytes are not ASCII digits, or the
    /// fourth byte (when present) is neither `-` nor a space.
    pub fn parse(line: &str) -> Result<Self, Error> {
        let bytes = line.as_bytes();
        if bytes.len() < 3 {
            return Err(Error::new(FailureType::InvalidServerResponse)
                .with_detail(format!("reply line too short: {line:?}")));
        }

        let code_str = &line[0..3];
        if !code_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::new(FailureType::InvalidServerResponse)
                .with_detail(format!("non-numeric reply code: {code_str:?}")));
        }
        let code: u16 = code_str
            .parse()
            .map_err(|_| Error::new(FailureType::InvalidServerResponse).with_detail(format!("reply code out of range: {code_str}")))?;
        if !(100..=599).contains(&code) {
            return Err(Error::new(FailureType::InvalidServerResponse)
                .with_detail(format!("reply code out of range: {code}")));
        }

        let (is_last, message) = match bytes.get(3) {
            None => (true, String::new()),
            Some(b' ') => (true, line[4..].to_string()),
            Some(b'-') => (false, line[4..].to_string()),
            Some(other) => {
                return Err(Error::new(FailureType::InvalidServerResponse).with_detail(format!(
                    "expected '-' or ' ' after reply code, found {:?}",
                    *other as char
                )));
            }
        };

        Ok(Self {
            code,
            is_last,
            message,
        })
    }

    /// The reply class inferred from the first digit of [`Self::code`].
    #[must_use]
    pub fn class(&self) -> ReplyClass {
        ReplyClass::from_code(self.code).unwrap_or(ReplyClass::PermanentNegative)
    }

    /// `true` if this line's code is in the 3xx (continuation) class and it
    /// is the terminal line of its reply.
    #[must_use]
    pub fn is_continuation(&self) -> bool {
        self.is_last && self.class() == ReplyClass::PositiveIntermediate
    }
}

/// A complete, aggregated server reply: an ordered, non-empty sequence of
/// [`ReplyLine`]s whose final element is terminal and whose codes agree on
/// the first digit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedReply {
    lines: Vec<ReplyLine>,
}

impl AggregatedReply {
    /// Builds an aggregated reply from a non-empty run of lines whose final
    /// element is terminal and whose codes share a first digit. Only the
    /// session state machine constructs these, since it is the only place
    /// that knows a run of lines is complete; the first-digit check below
    /// is what makes that assumption load-bearing rather than assumed.
    ///
    /// # Panics
    ///
    /// Panics if `lines` is empty, if its last element is not terminal, or
    /// if any line's code disagrees with the last line's first digit — each
    /// a violation of the spec's "all codes share the same first digit"
    /// reply invariant that would indicate a session state machine bug
    /// rather than a malformed server response (those are rejected earlier,
    /// by [`ReplyLine::parse`]).
    pub(crate) fn new(lines: Vec<ReplyLine>) -> Self {
        assert!(!lines.is_empty(), "aggregated reply must have at least one line");
        let class = lines
            .last()
            .map(ReplyLine::class)
            .expect("checked non-empty above");
        assert!(
            lines.last().is_some_and(|l| l.is_last),
            "aggregated reply's last line must be terminal"
        );
        assert!(
            lines.iter().all(|l| l.class() == class),
            "aggregated reply lines must share the same reply class"
        );
        Self { lines }
    }

    /// The individual reply lines, in server order.
    #[must_use]
    pub fn lines(&self) -> &[ReplyLine] {
        &self.lines
    }

    /// The code of the final (terminal) line.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.lines
            .last()
            .map(|l| l.code)
            .unwrap_or_default()
    }

    /// The reply class of the terminal line.
    #[must_use]
    pub fn class(&self) -> ReplyClass {
        ReplyClass::from_code(self.code()).unwrap_or(ReplyClass::PermanentNegative)
    }

    /// `true` if the terminal code is a 2xx positive completion.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.class() == ReplyClass::PositiveCompletion
    }

    /// Joins every line's message text with `\n`.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
