//! Streaming extraction of event states from a V1 envelope
//!
//! The envelope looks like
//!
//! ```text
//! {"version":1,"value":{"topic":"cpu","event-states":{"host1":{...},"host2":{...}}}}
//! ```
//!
//! `EventStates` walks the document once and yields each entry of
//! `event-states` as the event ID plus the exact bytes of its value. Every
//! other field is validated and skipped. The whole document, including
//! anything after the last event, must be well formed; the first syntax
//! error is yielded once and ends the iteration.

use std::borrow::Cow;

use super::{CodecError, CodecResult};

const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Envelope { first: bool },
    Value { first: bool },
    Events { first: bool },
    Trailer,
    Done,
}

/// Lazy sequence of `(event ID, raw event bytes)` pairs
///
/// IDs borrow from the input unless they contain escape sequences.
pub struct EventStates<'a> {
    data: &'a [u8],
    pos: usize,
    state: State,
}

impl<'a> EventStates<'a> {
    pub fn new(envelope: &'a [u8]) -> Self {
        Self {
            data: envelope,
            pos: 0,
            state: State::Start,
        }
    }

    fn advance(&mut self) -> CodecResult<Option<(Cow<'a, str>, &'a [u8])>> {
        loop {
            match self.state {
                State::Start => {
                    self.skip_ws();
                    if self.eat_null() {
                        self.state = State::Trailer;
                    } else {
                        self.expect(b'{', "expected envelope object")?;
                        self.state = State::Envelope { first: true };
                    }
                }
                State::Envelope { first } => match self.member(first)? {
                    None => self.state = State::Trailer,
                    Some(key) if key == "value" => {
                        self.state = if self.eat_null() {
                            State::Envelope { first: false }
                        } else {
                            self.expect(b'{', "expected object for \"value\"")?;
                            State::Value { first: true }
                        };
                    }
                    Some(_) => {
                        self.skip_value(0)?;
                        self.state = State::Envelope { first: false };
                    }
                },
                State::Value { first } => match self.member(first)? {
                    None => self.state = State::Envelope { first: false },
                    Some(key) if key == "event-states" => {
                        self.state = if self.eat_null() {
                            State::Value { first: false }
                        } else {
                            self.expect(b'{', "expected object for \"event-states\"")?;
                            State::Events { first: true }
                        };
                    }
                    Some(_) => {
                        self.skip_value(0)?;
                        self.state = State::Value { first: false };
                    }
                },
                State::Events { first } => match self.member(first)? {
                    None => self.state = State::Value { first: false },
                    Some(id) => {
                        let data = self.data;
                        let start = self.pos;
                        self.skip_value(0)?;
                        self.state = State::Events { first: false };
                        return Ok(Some((id, &data[start..self.pos])));
                    }
                },
                State::Trailer => {
                    self.skip_ws();
                    if self.pos != self.data.len() {
                        return Err(self.error("trailing data after envelope"));
                    }
                    self.state = State::Done;
                }
                State::Done => return Ok(None),
            }
        }
    }

    /// Read the next `"key":` of an object, or consume its closing brace
    ///
    /// Leaves the position at the start of the member's value.
    fn member(&mut self, first: bool) -> CodecResult<Option<Cow<'a, str>>> {
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(None);
        }
        if !first {
            self.expect(b',', "expected ',' or '}'")?;
            self.skip_ws();
        }
        let key = self.read_string()?;
        self.skip_ws();
        self.expect(b':', "expected ':'")?;
        self.skip_ws();
        Ok(Some(key))
    }

    fn read_string(&mut self) -> CodecResult<Cow<'a, str>> {
        let data = self.data;
        let open = self.pos;
        let escaped = self.scan_string()?;
        let quoted = &data[open..self.pos];
        let inner = &quoted[1..quoted.len() - 1];
        if escaped {
            return Ok(Cow::Owned(serde_json::from_slice(quoted)?));
        }
        std::str::from_utf8(inner)
            .map(Cow::Borrowed)
            .map_err(|_| CodecError::Syntax {
                offset: open,
                message: "invalid UTF-8 in string",
            })
    }

    /// Skip a string starting at the current quote; returns whether it had escapes
    fn scan_string(&mut self) -> CodecResult<bool> {
        self.expect(b'"', "expected string")?;
        let mut escaped = false;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(escaped);
                }
                Some(b'\\') => {
                    escaped = true;
                    self.pos += 1;
                    match self.peek() {
                        Some(b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't') => self.pos += 1,
                        Some(b'u') => {
                            self.pos += 1;
                            for _ in 0..4 {
                                match self.peek() {
                                    Some(c) if c.is_ascii_hexdigit() => self.pos += 1,
                                    _ => return Err(self.error("invalid unicode escape")),
                                }
                            }
                        }
                        _ => return Err(self.error("invalid escape")),
                    }
                }
                Some(c) if c < 0x20 => return Err(self.error("control character in string")),
                Some(_) => self.pos += 1,
            }
        }
    }

    fn skip_value(&mut self, depth: usize) -> CodecResult<()> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.skip_ws();
        match self.peek() {
            Some(b'{') => {
                self.pos += 1;
                let mut first = true;
                while self.member(first)?.is_some() {
                    self.skip_value(depth + 1)?;
                    first = false;
                }
                Ok(())
            }
            Some(b'[') => {
                self.pos += 1;
                self.skip_ws();
                if self.peek() == Some(b']') {
                    self.pos += 1;
                    return Ok(());
                }
                loop {
                    self.skip_value(depth + 1)?;
                    self.skip_ws();
                    match self.peek() {
                        Some(b',') => self.pos += 1,
                        Some(b']') => {
                            self.pos += 1;
                            return Ok(());
                        }
                        _ => return Err(self.error("expected ',' or ']'")),
                    }
                }
            }
            Some(b'"') => self.scan_string().map(|_| ()),
            Some(b't') => self.literal(b"true"),
            Some(b'f') => self.literal(b"false"),
            Some(b'n') => self.literal(b"null"),
            Some(b'-' | b'0'..=b'9') => self.scan_number(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn scan_number(&mut self) -> CodecResult<()> {
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => self.digits(),
            _ => return Err(self.error("invalid number")),
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.require_digits()?;
        }
        if let Some(b'e' | b'E') = self.peek() {
            self.pos += 1;
            if let Some(b'+' | b'-') = self.peek() {
                self.pos += 1;
            }
            self.require_digits()?;
        }
        Ok(())
    }

    fn require_digits(&mut self) -> CodecResult<()> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => {
                self.digits();
                Ok(())
            }
            _ => Err(self.error("invalid number")),
        }
    }

    fn digits(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn literal(&mut self, word: &'static [u8]) -> CodecResult<()> {
        if self.data[self.pos..].starts_with(word) {
            self.pos += word.len();
            Ok(())
        } else {
            Err(self.error("invalid literal"))
        }
    }

    fn eat_null(&mut self) -> bool {
        self.skip_ws();
        self.literal(b"null").is_ok()
    }

    fn expect(&mut self, byte: u8, message: &'static str) -> CodecResult<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn error(&self, message: &'static str) -> CodecError {
        CodecError::Syntax {
            offset: self.pos,
            message,
        }
    }
}

impl<'a> Iterator for EventStates<'a> {
    type Item = CodecResult<(Cow<'a, str>, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => None,
            Err(e) => {
                self.state = State::Done;
                Some(Err(e))
            }
        }
    }
}
