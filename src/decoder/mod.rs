//! Lazy JSON cursor
//!
//! [`Decoder`] walks one document front to back without building a tree.
//! Callers peek at the kind of the next value and then either iterate it
//! (objects and arrays), take its raw token (scalars) or [`skip`](Decoder::skip)
//! it. Skipping tracks only bracket nesting and string boundaries, so its
//! cost is a linear byte scan no matter how deep the skipped value is.
//!
//! Values captured with [`raw_scalar`](Decoder::raw_scalar) are returned
//! exactly as encoded: strings keep their quotes and escapes, numbers keep
//! their textual form.

pub mod pool;

use crate::error::DecodeError;
use pool::Scratch;
use serde::de::IgnoredAny;
use std::borrow::Cow;

/// Kind of the next value in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
}

impl Kind {
    pub fn is_scalar(self) -> bool {
        !matches!(self, Kind::Object | Kind::Array)
    }
}

/// Cursor over one JSON document
pub struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
    scratch: Scratch,
}

impl Drop for Decoder<'_> {
    fn drop(&mut self) {
        pool::release(std::mem::take(&mut self.scratch));
    }
}

impl<'a> Decoder<'a> {
    /// Position a new cursor at the start of `input`
    pub fn new(input: &'a [u8]) -> Self {
        Decoder {
            input,
            pos: 0,
            scratch: pool::acquire(),
        }
    }

    /// Current byte offset
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Kind of the next value, without consuming it
    pub fn peek(&mut self) -> Result<Kind, DecodeError> {
        match self.peek_byte()? {
            b'{' => Ok(Kind::Object),
            b'[' => Ok(Kind::Array),
            b'"' => Ok(Kind::String),
            b'-' | b'0'..=b'9' => Ok(Kind::Number),
            b't' | b'f' => Ok(Kind::Bool),
            b'n' => Ok(Kind::Null),
            _ => Err(self.unexpected("a value")),
        }
    }

    /// Enter an object. Iterate its members with [`Members::next_key`].
    pub fn object(&mut self) -> Result<Members, DecodeError> {
        self.expect(b'{', "'{'")?;
        Ok(Members {
            first: true,
            done: false,
        })
    }

    /// Enter an array. Iterate its elements with [`Elements::next`].
    pub fn array(&mut self) -> Result<Elements, DecodeError> {
        self.expect(b'[', "'['")?;
        Ok(Elements {
            first: true,
            done: false,
        })
    }

    /// Consume a string, number, boolean or null and return its encoded token
    pub fn raw_scalar(&mut self) -> Result<&'a [u8], DecodeError> {
        let kind = self.peek()?;
        let start = self.pos;

        match kind {
            Kind::String => self.scan_string()?,
            Kind::Number => self.scan_number()?,
            Kind::Bool | Kind::Null => self.scan_literal()?,
            Kind::Object | Kind::Array => return Err(self.unexpected("a scalar")),
        }

        Ok(&self.input[start..self.pos])
    }

    /// Advance past the next value, however deeply nested
    pub fn skip(&mut self) -> Result<(), DecodeError> {
        match self.peek()? {
            Kind::Object | Kind::Array => {
                self.scratch.stack.clear();
                self.scratch.stack.push(self.input[self.pos]);
                self.pos += 1;
                self.skip_balanced()
            }
            Kind::String => self.scan_string(),
            Kind::Number => self.scan_number(),
            Kind::Bool | Kind::Null => self.scan_literal(),
        }
    }

    /// Skip the members `members` has not yet visited, including the
    /// closing brace. Must be called between members, never mid-value.
    pub fn finish_object(&mut self, members: Members) -> Result<(), DecodeError> {
        if members.done {
            return Ok(());
        }

        self.scratch.stack.clear();
        self.scratch.stack.push(b'{');
        self.skip_balanced()
    }

    fn skip_ws(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.input.get(self.pos) {
            self.pos += 1;
        }
    }

    fn peek_byte(&mut self) -> Result<u8, DecodeError> {
        self.skip_ws();
        self.input
            .get(self.pos)
            .copied()
            .ok_or(DecodeError::UnexpectedEof { offset: self.pos })
    }

    fn unexpected(&self, expected: &'static str) -> DecodeError {
        match self.input.get(self.pos) {
            Some(byte) => DecodeError::UnexpectedByte {
                offset: self.pos,
                found: char::from(*byte),
                expected,
            },
            None => DecodeError::UnexpectedEof { offset: self.pos },
        }
    }

    fn expect(&mut self, byte: u8, expected: &'static str) -> Result<(), DecodeError> {
        if self.peek_byte()? != byte {
            return Err(self.unexpected(expected));
        }
        self.pos += 1;
        Ok(())
    }

    /// Scan a quoted string starting at the opening quote
    fn scan_string(&mut self) -> Result<(), DecodeError> {
        let start = self.pos;
        self.pos += 1;

        while let Some(&byte) = self.input.get(self.pos) {
            match byte {
                b'"' => {
                    self.pos += 1;
                    return Ok(());
                }
                b'\\' => self.pos += 2,
                0x00..=0x1f => {
                    return Err(DecodeError::InvalidString {
                        offset: start,
                        reason: format!("control character at offset {}", self.pos),
                    })
                }
                _ => self.pos += 1,
            }
        }

        Err(DecodeError::UnexpectedEof {
            offset: self.input.len(),
        })
    }

    fn scan_number(&mut self) -> Result<(), DecodeError> {
        let start = self.pos;
        while let Some(b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E') = self.input.get(self.pos) {
            self.pos += 1;
        }

        serde_json::from_slice::<IgnoredAny>(&self.input[start..self.pos])
            .map(|_| ())
            .map_err(|_| DecodeError::InvalidNumber { offset: start })
    }

    fn scan_literal(&mut self) -> Result<(), DecodeError> {
        let rest = &self.input[self.pos..];
        let len = [&b"true"[..], &b"false"[..], &b"null"[..]]
            .into_iter()
            .find(|literal| rest.starts_with(literal))
            .map(<[u8]>::len)
            .ok_or_else(|| self.unexpected("true, false or null"))?;

        self.pos += len;
        Ok(())
    }

    /// Scan until every bracket on the scratch stack is closed
    fn skip_balanced(&mut self) -> Result<(), DecodeError> {
        while let Some(&byte) = self.input.get(self.pos) {
            match byte {
                b'"' => {
                    self.scan_string()?;
                    continue;
                }
                b'{' | b'[' => self.scratch.stack.push(byte),
                b'}' | b']' => {
                    let open = if byte == b'}' { b'{' } else { b'[' };
                    if self.scratch.stack.pop() != Some(open) {
                        return Err(DecodeError::MismatchedClose {
                            offset: self.pos,
                            found: char::from(byte),
                        });
                    }
                    if self.scratch.stack.is_empty() {
                        self.pos += 1;
                        return Ok(());
                    }
                }
                // separators, numbers and the letters of true/false/null
                b' ' | b'\t' | b'\n' | b'\r' | b',' | b':' | b'-' | b'+' | b'.' | b'0'..=b'9'
                | b'E' | b'a' | b'e' | b'f' | b'l' | b'n' | b'r' | b's' | b't' | b'u' => {}
                _ => return Err(self.unexpected("a JSON token")),
            }
            self.pos += 1;
        }

        Err(DecodeError::UnexpectedEof {
            offset: self.input.len(),
        })
    }

    /// Read an object key, borrowing it when it has no escapes
    fn key(&mut self) -> Result<Cow<'a, str>, DecodeError> {
        let start = self.pos;
        self.scan_string()?;

        let raw = &self.input[start..self.pos];
        let inner = &raw[1..raw.len() - 1];
        let invalid = |reason: String| DecodeError::InvalidString {
            offset: start,
            reason,
        };

        if inner.contains(&b'\\') {
            serde_json::from_slice::<String>(raw)
                .map(Cow::Owned)
                .map_err(|e| invalid(e.to_string()))
        } else {
            std::str::from_utf8(inner)
                .map(Cow::Borrowed)
                .map_err(|e| invalid(e.to_string()))
        }
    }
}

/// Iteration state for one object
#[derive(Debug)]
pub struct Members {
    first: bool,
    done: bool,
}

impl Members {
    /// Advance to the next member and return its key, leaving the cursor on
    /// the member's value. Returns `None` after consuming the closing brace.
    pub fn next_key<'a>(
        &mut self,
        dec: &mut Decoder<'a>,
    ) -> Result<Option<Cow<'a, str>>, DecodeError> {
        if self.done {
            return Ok(None);
        }

        let mut byte = dec.peek_byte()?;
        if self.first {
            self.first = false;
            if byte == b'}' {
                dec.pos += 1;
                self.done = true;
                return Ok(None);
            }
        } else {
            match byte {
                b'}' => {
                    dec.pos += 1;
                    self.done = true;
                    return Ok(None);
                }
                b',' => {
                    dec.pos += 1;
                    byte = dec.peek_byte()?;
                }
                _ => return Err(dec.unexpected("',' or '}'")),
            }
        }

        if byte != b'"' {
            return Err(dec.unexpected("an object key"));
        }

        let key = dec.key()?;
        dec.expect(b':', "':'")?;
        Ok(Some(key))
    }
}

/// Iteration state for one array
#[derive(Debug)]
pub struct Elements {
    first: bool,
    done: bool,
}

impl Elements {
    /// Advance to the next element, leaving the cursor on it. Returns
    /// `false` after consuming the closing bracket.
    pub fn next(&mut self, dec: &mut Decoder<'_>) -> Result<bool, DecodeError> {
        if self.done {
            return Ok(false);
        }

        let byte = dec.peek_byte()?;
        if self.first {
            self.first = false;
            if byte == b']' {
                dec.pos += 1;
                self.done = true;
                return Ok(false);
            }
            return Ok(true);
        }

        match byte {
            b']' => {
                dec.pos += 1;
                self.done = true;
                Ok(false)
            }
            b',' => {
                dec.pos += 1;
                Ok(true)
            }
            _ => Err(dec.unexpected("',' or ']'")),
        }
    }
}
