//! Command-line tokenizer for inbound console traffic.
//!
//! Consoles send plain text commands, several of which may share one read:
//!
//! ```text
//! set throttle 0.5;advertise;set label "front camera";
//! ```
//!
//! Grammar: `command := NAME (SEP ARG)* ';'` where SEP is any run of space,
//! tab, CR or LF. A `"` toggles quoted mode; while quoted, separators and `;`
//! are ordinary bytes. Quote bytes themselves are dropped from the token.
//!
//! Reads can end anywhere, including inside a quoted span or a multi-byte
//! UTF-8 character, so [`CommandStream`] keeps the unterminated tail of each
//! read and prefixes it to the next one. Tokens are only decoded to UTF-8
//! once they are complete.

use crate::constants::{COMMAND_TERMINATOR, QUOTE};

/// One parsed command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCall {
    /// Command name (first token).
    pub name: String,
    /// Remaining tokens, in order.
    pub args: Vec<String>,
}

impl CommandCall {
    /// Build a call from a name and argument list.
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Render as a terminated command line that tokenizes back to `self`.
    ///
    /// Arguments that are empty or contain separators or `;` are quoted.
    /// Quote characters inside an argument cannot be represented and are
    /// removed.
    pub fn to_line(&self) -> String {
        let mut line = self.name.clone();
        for arg in &self.args {
            line.push(' ');
            let cleaned: String = arg.chars().filter(|&c| c != '"').collect();
            let needs_quotes = cleaned.is_empty()
                || cleaned
                    .bytes()
                    .any(|b| is_separator(b) || b == COMMAND_TERMINATOR);
            if needs_quotes {
                line.push('"');
                line.push_str(&cleaned);
                line.push('"');
            } else {
                line.push_str(&cleaned);
            }
        }
        line.push(char::from(COMMAND_TERMINATOR));
        line
    }
}

/// Result of scanning for the next command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStep {
    /// A full command was found; `next` is the index just past its `;`.
    Complete {
        /// The parsed command.
        call: CommandCall,
        /// Cursor position after the terminator.
        next: usize,
    },
    /// A terminator with no tokens before it (e.g. `;;`).
    Empty {
        /// Cursor position after the terminator.
        next: usize,
    },
    /// No unquoted terminator before the end of the buffer.
    Incomplete,
}

fn is_separator(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// Accumulates bytes for the token currently being scanned.
#[derive(Default)]
struct TokenBuilder {
    tokens: Vec<String>,
    current: Vec<u8>,
    // A quoted token is kept even when empty (`""`)
    quoted: bool,
}

impl TokenBuilder {
    fn flush(&mut self) {
        if !self.current.is_empty() || self.quoted {
            self.tokens
                .push(String::from_utf8_lossy(&self.current).into_owned());
        }
        self.current.clear();
        self.quoted = false;
    }
}

/// Scan `buf` from `start` for the next terminated command.
pub fn parse_next_command(buf: &[u8], start: usize) -> ParseStep {
    let mut builder = TokenBuilder::default();
    let mut in_quotes = false;

    for (offset, &byte) in buf.get(start..).unwrap_or_default().iter().enumerate() {
        if byte == QUOTE {
            in_quotes = !in_quotes;
            builder.quoted = true;
        } else if in_quotes {
            builder.current.push(byte);
        } else if byte == COMMAND_TERMINATOR {
            builder.flush();
            let next = start + offset + 1;
            let mut tokens = builder.tokens.into_iter();
            return match tokens.next() {
                Some(name) => ParseStep::Complete {
                    call: CommandCall {
                        name,
                        args: tokens.collect(),
                    },
                    next,
                },
                None => ParseStep::Empty { next },
            };
        } else if is_separator(byte) {
            builder.flush();
        } else {
            builder.current.push(byte);
        }
    }

    ParseStep::Incomplete
}

/// Incremental tokenizer for one connection's inbound byte stream.
///
/// Holds the remaining-message buffer: bytes after the last complete
/// command, carried over to the next [`CommandStream::feed`].
#[derive(Debug, Default)]
pub struct CommandStream {
    remaining: Vec<u8>,
}

impl CommandStream {
    /// Create a stream with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every command completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<CommandCall> {
        self.remaining.extend_from_slice(bytes);

        let mut calls = Vec::new();
        let mut cursor = 0;
        loop {
            match parse_next_command(&self.remaining, cursor) {
                ParseStep::Complete { call, next } => {
                    calls.push(call);
                    cursor = next;
                }
                ParseStep::Empty { next } => cursor = next,
                ParseStep::Incomplete => break,
            }
        }

        self.remaining.drain(..cursor);
        calls
    }

    /// Bytes received but not yet terminated.
    pub fn remaining(&self) -> &[u8] {
        &self.remaining
    }

    /// Returns true if a partial command is buffered.
    pub fn has_partial(&self) -> bool {
        self.remaining.iter().any(|&b| !is_separator(b))
    }
}
