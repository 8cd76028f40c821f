//! Reader - PEST-based tokenizer for the PostScript subset
//!
//! Two entry points:
//! - [`parse_program`] reads a complete source text into objects
//! - [`read_token`] reads one object from a stream buffer that may still be
//!   growing, telling a complete object apart from an unfinished tail

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::interpreter::errors::PsError;
use crate::interpreter::types::Obj;


/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "reader/ps.pest"]
struct PsReader;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("unexpected token: {0}")]
    Unexpected(String),
}

impl From<pest::error::Error<Rule>> for ReadError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, column) = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        ReadError::Syntax {
            line,
            column,
            message: err.variant.message().to_string(),
        }
    }
}

impl From<ReadError> for PsError {
    fn from(err: ReadError) -> Self {
        PsError::SyntaxError(err.to_string())
    }
}

/// Result of reading from a stream buffer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// An object and the number of bytes it consumed, leading blanks included
    Object(Obj, usize),
    /// The next object may continue past the end of the buffer
    Incomplete,
    /// Only whitespace and comments remain
    End,
}

/* ===================== Public API ===================== */

pub fn parse_program(source: &str) -> Result<Vec<Obj>, ReadError> {
    let mut pairs = PsReader::parse(Rule::program, source)?;
    let Some(program) = pairs.next() else {
        return Ok(Vec::new());
    };
    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_object)
        .collect()
}

/// Read the first object of `text`
///
/// When `closed` is false the buffer may still grow, so a name or number
/// running up to the end of the buffer, or an unterminated string or
/// procedure, reports [`Token::Incomplete`] instead of an object or an error.
pub fn read_token(text: &str, closed: bool) -> Result<Token, ReadError> {
    match frame(text) {
        Frame::Blank => return Ok(Token::End),
        Frame::Partial if !closed => return Ok(Token::Incomplete),
        _ => {}
    }

    let mut pairs = PsReader::parse(Rule::next_object, text)?;
    let Some(top) = pairs.next() else {
        return Ok(Token::End);
    };
    let consumed = top.as_span().end();
    let Some(pair) = top.into_inner().next() else {
        return Ok(Token::End);
    };
    Ok(Token::Object(build_object(pair)?, consumed))
}

/* ===================== Object Building ===================== */

fn build_object(pair: Pair<Rule>) -> Result<Obj, ReadError> {
    match pair.as_rule() {
        Rule::procedure => {
            let items = pair
                .into_inner()
                .map(build_object)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Obj::procedure(items))
        }
        Rule::string => {
            let raw = pair.into_inner().next().map_or("", |p| p.as_str());
            Ok(Obj::string(&unescape(raw)))
        }
        Rule::hexstring => {
            let raw = pair.into_inner().next().map_or("", |p| p.as_str());
            Ok(Obj::string(&decode_hex(raw)))
        }
        Rule::literal_name => {
            let name = pair.into_inner().next().map_or("", |p| p.as_str());
            Ok(Obj::name(name))
        }
        Rule::integer => {
            let text = pair.as_str();
            match text.parse::<i64>() {
                Ok(i) => Ok(Obj::int(i)),
                // Out of integer range: PostScript reads it as a real
                Err(_) => parse_real(text),
            }
        }
        Rule::real => parse_real(pair.as_str()),
        Rule::radix => parse_radix(pair.as_str()),
        Rule::bracket | Rule::exec_name => Ok(Obj::exec_name(pair.as_str())),
        rule => Err(ReadError::Unexpected(format!("{:?}", rule))),
    }
}

fn parse_real(text: &str) -> Result<Obj, ReadError> {
    text.parse::<f64>()
        .map(Obj::real)
        .map_err(|_| ReadError::InvalidNumber(text.to_string()))
}

fn parse_radix(text: &str) -> Result<Obj, ReadError> {
    let invalid = || ReadError::InvalidNumber(text.to_string());
    let (base, digits) = text.split_once('#').ok_or_else(invalid)?;
    let base: u32 = base.parse().map_err(|_| invalid())?;
    if !(2..=36).contains(&base) {
        return Err(invalid());
    }
    let value = u64::from_str_radix(digits, base).map_err(|_| invalid())?;
    Ok(Obj::int(value as i64))
}

fn unescape(raw: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let Some(next) = chars.next() else {
            break;
        };
        match next {
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'b' => out.push(0x08),
            'f' => out.push(0x0C),
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '0'..='7' => {
                let mut code = next.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push((code & 0xFF) as u8);
            }
            other => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out
}

fn decode_hex(raw: &str) -> Vec<u8> {
    let digits: Vec<u8> = raw
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/* ===================== Stream Framing ===================== */

enum Frame {
    Blank,
    Partial,
    Complete,
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | 0x0C | 0x00)
}

fn is_delimiter(b: u8) -> bool {
    is_space(b) || b"()<>[]{}/%".contains(&b)
}

fn line_end(bytes: &[u8], from: usize) -> Option<usize> {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n' || b == b'\r')
        .map(|off| from + off)
}

/// Where the first object of the buffer ends, if it ends inside it
fn frame(text: &str) -> Frame {
    let bytes = text.as_bytes();
    let mut i = 0;
    loop {
        match bytes.get(i) {
            None => return Frame::Blank,
            Some(&b) if is_space(b) => i += 1,
            Some(b'%') => match line_end(bytes, i) {
                Some(end) => i = end,
                None => return Frame::Blank,
            },
            Some(_) => break,
        }
    }
    match scan_object(bytes, i) {
        Some(_) => Frame::Complete,
        None => Frame::Partial,
    }
}

fn scan_object(bytes: &[u8], start: usize) -> Option<usize> {
    match bytes[start] {
        b'(' => scan_string(bytes, start),
        b'<' => scan_hex(bytes, start),
        b'{' => scan_procedure(bytes, start),
        b')' | b'>' | b'}' | b'[' | b']' => Some(start + 1),
        b'/' => scan_regular(bytes, start + 1),
        _ => scan_regular(bytes, start),
    }
}

/// Names and numbers end at a delimiter; running into the end of the buffer
/// leaves them open
fn scan_regular(bytes: &[u8], start: usize) -> Option<usize> {
    bytes[start..]
        .iter()
        .position(|&b| is_delimiter(b))
        .map(|off| start + off)
}

fn scan_hex(bytes: &[u8], start: usize) -> Option<usize> {
    bytes[start..]
        .iter()
        .position(|&b| b == b'>')
        .map(|off| start + off + 1)
}

fn scan_string(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn scan_procedure(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'(' => i = scan_string(bytes, i)?,
            b'<' => i = scan_hex(bytes, i)?,
            b'%' => i = line_end(bytes, i)?,
            _ => i += 1,
        }
    }
    None
}
