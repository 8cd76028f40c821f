//! Incremental input streams
//!
//! An [`Input`] is a file-like object the driver reads one token at a time
//! while it sits on the exec stack. Bytes arrive through [`Input::feed`] in
//! chunks of any size; until [`Input::close`] is called, running out of
//! buffered text raises `NeedInput` instead of ending the stream.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::errors::PsError;
use super::types::Obj;
use crate::reader::{self, Token};

struct InputStream {
    name: String,
    text: String,
    /// Trailing bytes of an unfinished UTF-8 sequence
    pending: Vec<u8>,
    pos: usize,
    closed: bool,
}

#[derive(Clone)]
pub struct Input(Rc<RefCell<InputStream>>);

impl Input {
    pub fn new(name: &str) -> Self {
        Input(Rc::new(RefCell::new(InputStream {
            name: name.to_string(),
            text: String::new(),
            pending: Vec::new(),
            pos: 0,
            closed: false,
        })))
    }

    /// A stream holding all of `source`, already closed
    pub fn from_source(name: &str, source: &str) -> Self {
        let input = Input::new(name);
        {
            let mut stream = input.0.borrow_mut();
            stream.text.push_str(source);
            stream.closed = true;
        }
        input
    }

    /// The stream `currentfile` returns when no input is executing
    pub fn invalid() -> Self {
        Input::from_source("%invalid", "")
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.0.borrow().closed
    }

    pub fn feed(&self, bytes: &[u8]) {
        let mut stream = self.0.borrow_mut();
        stream.pending.extend_from_slice(bytes);
        let pending = std::mem::take(&mut stream.pending);
        let mut rest = pending.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    stream.text.push_str(text);
                    break;
                }
                Err(err) => match err.error_len() {
                    // Invalid bytes become U+FFFD; decoding resumes after them
                    Some(bad) => {
                        let (head, tail) = rest.split_at(err.valid_up_to() + bad);
                        stream.text.push_str(&String::from_utf8_lossy(head));
                        rest = tail;
                    }
                    // A sequence cut off by the chunk end waits for the next feed
                    None => {
                        let (valid, tail) = rest.split_at(err.valid_up_to());
                        stream.text.push_str(&String::from_utf8_lossy(valid));
                        stream.pending = tail.to_vec();
                        break;
                    }
                },
            }
        }
    }

    pub fn close(&self) {
        let mut stream = self.0.borrow_mut();
        let pending = std::mem::take(&mut stream.pending);
        stream.text.push_str(&String::from_utf8_lossy(&pending));
        stream.closed = true;
    }

    /// Drop everything buffered so a bad token is not read twice
    pub fn discard(&self) {
        let mut stream = self.0.borrow_mut();
        stream.text.clear();
        stream.pending.clear();
        stream.pos = 0;
    }

    /// Next object, `None` at end of a closed stream
    pub fn next_token(&self) -> Result<Option<Obj>, PsError> {
        let mut stream = self.0.borrow_mut();
        let token = reader::read_token(&stream.text[stream.pos..], stream.closed);
        match token {
            Ok(Token::Object(obj, used)) => {
                stream.pos += used;
                if stream.pos * 2 > stream.text.len() {
                    let pos = stream.pos;
                    stream.text.drain(..pos);
                    stream.pos = 0;
                }
                trace!(input = %stream.name, token = %obj, "read");
                Ok(Some(obj))
            }
            Ok(Token::End) if stream.closed => Ok(None),
            Ok(Token::End) | Ok(Token::Incomplete) => Err(PsError::NeedInput),
            Err(err) => Err(err.into()),
        }
    }

    pub fn ptr_eq(&self, other: &Input) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Input {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stream = self.0.borrow();
        f.debug_struct("Input")
            .field("name", &stream.name)
            .field("buffered", &(stream.text.len() - stream.pos))
            .field("closed", &stream.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_stream_asks_for_more_input() {
        let input = Input::new("%stdin");
        input.feed(b"1 2");
        assert_eq!(input.next_token(), Ok(Some(Obj::int(1))));
        assert_eq!(input.next_token(), Err(PsError::NeedInput));
        input.feed(b"3 ");
        assert_eq!(input.next_token(), Ok(Some(Obj::int(23))));
        assert_eq!(input.next_token(), Err(PsError::NeedInput));
        input.close();
        assert_eq!(input.next_token(), Ok(None));
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let input = Input::new("%stdin");
        let bytes = "(\u{e9}) ".as_bytes();
        for b in bytes {
            input.feed(std::slice::from_ref(b));
        }
        input.close();
        let Ok(Some(obj)) = input.next_token() else {
            unreachable!("Expected a string token");
        };
        assert_eq!(obj, Obj::string("\u{e9}".as_bytes()));
    }

    #[test]
    fn test_invalid_byte_keeps_following_partial_sequence() {
        let input = Input::new("%stdin");
        input.feed(b"(\xff\xc3");
        input.feed(b"\xa9) ");
        input.close();
        let Ok(Some(obj)) = input.next_token() else {
            unreachable!("Expected a string token");
        };
        assert_eq!(obj, Obj::string("\u{fffd}\u{e9}".as_bytes()));
    }
}
