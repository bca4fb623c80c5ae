//! # Bounded diagnostic message log
//!
//! Non-fatal warnings (e.g. a post-Newtonian velocity iteration that hit its cap) and the message
//! of a fatal data error are retained in a [`MessageLog`] so that callers can inspect them once a
//! run is over. Every message is also forwarded to the [`log`] facade, so an application that
//! installs a logger sees them as they happen.
//!
//! The log is bounded: at most [`MAX_MESSAGES`] entries of at most [`MAX_MESSAGE_LEN`] bytes.
//! When full, the oldest message is dropped.

use std::collections::VecDeque;
use std::fmt;

use crate::constants::{MAX_MESSAGES, MAX_MESSAGE_LEN};

/// Severity of a retained message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{tag}] {}", self.text)
    }
}

/// Ring buffer of the most recent diagnostic messages.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: VecDeque<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        MessageLog {
            messages: VecDeque::with_capacity(MAX_MESSAGES),
        }
    }

    /// Record a non-fatal warning and forward it to `log::warn!`.
    pub fn warn(&mut self, text: impl Into<String>) {
        let text = text.into();
        log::warn!("{text}");
        self.push(Severity::Warning, text);
    }

    /// Record a fatal error message and forward it to `log::error!`.
    pub fn error(&mut self, text: impl Into<String>) {
        let text = text.into();
        log::error!("{text}");
        self.push(Severity::Error, text);
    }

    fn push(&mut self, severity: Severity, mut text: String) {
        if text.len() > MAX_MESSAGE_LEN {
            let mut cut = MAX_MESSAGE_LEN;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        if self.messages.len() == MAX_MESSAGES {
            self.messages.pop_front();
        }
        self.messages.push_back(Message { severity, text });
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    /// Move every retained message out of the log, leaving it empty.
    pub fn drain(&mut self) -> Vec<Message> {
        self.messages.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
