//! Tokenizer for the classic encoding.
//!
//! Commas are whitespace and `#` starts a comment running to the end of the
//! line. Keywords depend on the active header: a keyword the header does not
//! enable scans as a plain identifier.

use std::fmt;

use scenic_core::{Dimension, FieldType};

use crate::error::Position;
use crate::header::HeaderKind;

const BOM: &str = "\u{FEFF}";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Symbol {
    Dot,
    NodeBegin,
    NodeEnd,
    FieldBegin,
    FieldEnd,
}

impl Symbol {
    pub const fn as_char(self) -> char {
        match self {
            Symbol::Dot => '.',
            Symbol::NodeBegin => '{',
            Symbol::NodeEnd => '}',
            Symbol::FieldBegin => '[',
            Symbol::FieldEnd => ']',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Def,
    Use,
    Route,
    To,
    Meta,
    Profile,
    Null,
    True,
    False,
    /// `SFFloat`, `MFNode`, ...: declares a dynamic field.
    FieldType(FieldType, Dimension),
}

impl Keyword {
    fn lookup(word: &str, header: Option<HeaderKind>) -> Option<Keyword> {
        let keyword = match word {
            "DEF" => Keyword::Def,
            "USE" => Keyword::Use,
            "ROUTE" => Keyword::Route,
            "TO" => Keyword::To,
            "META" => Keyword::Meta,
            "PROFILE" => Keyword::Profile,
            "NULL" => Keyword::Null,
            "TRUE" => Keyword::True,
            "FALSE" => Keyword::False,
            _ => {
                let (ty, dimension) = FieldType::from_keyword(word)?;
                Keyword::FieldType(ty, dimension)
            }
        };
        keyword.enabled(header).then_some(keyword)
    }

    fn enabled(self, header: Option<HeaderKind>) -> bool {
        match self {
            Keyword::Meta | Keyword::Profile => header.is_some_and(HeaderKind::has_x3d_keywords),
            Keyword::FieldType(ty, _) => {
                !ty.is_extended() || header.is_some_and(HeaderKind::has_extended_types)
            }
            _ => true,
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Keyword::Def => "DEF",
            Keyword::Use => "USE",
            Keyword::Route => "ROUTE",
            Keyword::To => "TO",
            Keyword::Meta => "META",
            Keyword::Profile => "PROFILE",
            Keyword::Null => "NULL",
            Keyword::True => "TRUE",
            Keyword::False => "FALSE",
            Keyword::FieldType(ty, dimension) => return f.write_str(&ty.keyword(*dimension)),
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Symbol(Symbol),
    Keyword(Keyword),
    Integer(i32),
    Number(f64),
    String(String),
    Identifier(String),
    EndOfFile,
    /// Text that forms no valid token, kept for diagnostics.
    Invalid(String),
}

impl Token {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, Token::EndOfFile)
    }

    #[inline]
    pub fn is_symbol(&self, symbol: Symbol) -> bool {
        matches!(self, Token::Symbol(s) if *s == symbol)
    }

    #[inline]
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self, Token::Keyword(k) if *k == keyword)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Symbol(s) => write!(f, "'{}'", s.as_char()),
            Token::Keyword(k) => write!(f, "'{k}'"),
            Token::Integer(v) => write!(f, "{v}"),
            Token::Number(v) => write!(f, "{v}"),
            Token::String(s) => write!(f, "\"{s}\""),
            Token::Identifier(s) => write!(f, "'{s}'"),
            Token::EndOfFile => f.write_str("end of file"),
            Token::Invalid(raw) => write!(f, "invalid token '{raw}'"),
        }
    }
}

pub struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    header: Option<HeaderKind>,
    peeked: Option<(Token, Position)>,
    last: Position,
}

impl<'a> Scanner<'a> {
    /// Skips a leading UTF-8 byte order mark.
    pub fn new(src: &'a str) -> Self {
        let pos = if src.starts_with(BOM) { BOM.len() } else { 0 };
        Self {
            src,
            pos,
            line: 1,
            column: 1,
            header: None,
            peeked: None,
            last: Position::START,
        }
    }

    #[inline]
    pub fn header(&self) -> Option<HeaderKind> {
        self.header
    }

    /// Selects the grammar variant. Call before the first token is peeked.
    pub fn set_header(&mut self, header: HeaderKind) {
        debug_assert!(self.peeked.is_none(), "header set after scanning started");
        self.header = Some(header);
    }

    /// Reads the rest of the current line verbatim, without its line break.
    pub fn read_line(&mut self) -> &'a str {
        debug_assert!(self.peeked.is_none(), "line read after scanning started");
        let rest = &self.src[self.pos..];
        match rest.find('\n') {
            Some(end) => {
                self.pos += end + 1;
                self.line += 1;
                self.column = 1;
                rest[..end].trim_end_matches('\r')
            }
            None => {
                self.pos = self.src.len();
                self.column += rest.len();
                rest
            }
        }
    }

    /// The next token, without consuming it.
    pub fn peek(&mut self) -> &Token {
        if self.peeked.is_none() {
            self.peeked = Some(self.scan());
        }
        match &self.peeked {
            Some((token, _)) => token,
            None => &Token::EndOfFile,
        }
    }

    /// Position of the next token.
    pub fn position(&mut self) -> Position {
        self.peek();
        self.peeked.as_ref().map_or(self.location(), |(_, p)| *p)
    }

    /// Consumes and returns the next token.
    pub fn pop(&mut self) -> Token {
        let (token, position) = match self.peeked.take() {
            Some(peeked) => peeked,
            None => self.scan(),
        };
        self.last = position;
        token
    }

    /// Consumes the next token if `accept` takes it; a refused token stays
    /// next.
    pub fn pop_with<T>(&mut self, accept: impl FnOnce(Token) -> Result<T, Token>) -> Option<T> {
        self.peek();
        let (token, position) = self.peeked.take()?;
        match accept(token) {
            Ok(value) => {
                self.last = position;
                Some(value)
            }
            Err(token) => {
                self.peeked = Some((token, position));
                None
            }
        }
    }

    /// Position of the token last returned by `pop`.
    #[inline]
    pub fn last_position(&self) -> Position {
        self.last
    }

    /// Bytes consumed so far, including a peeked token.
    #[inline]
    pub fn consumed(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.src.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    // -------------------- Scanning --------------------

    #[inline]
    fn location(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    #[inline]
    fn byte(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    #[inline]
    fn advance(&mut self, n: usize) {
        self.pos += n;
        self.column += n;
    }

    fn newline(&mut self) {
        self.pos += 1;
        self.line += 1;
        self.column = 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.byte(0) {
            match c {
                b' ' | b'\t' | b'\r' | b',' => self.advance(1),
                b'\n' => self.newline(),
                b'#' => {
                    while self.byte(0).is_some_and(|c| c != b'\n') {
                        self.advance(1);
                    }
                }
                _ => break,
            }
        }
    }

    fn scan(&mut self) -> (Token, Position) {
        self.skip_whitespace();
        let start = self.location();
        let Some(c) = self.byte(0) else {
            return (Token::EndOfFile, start);
        };

        let token = match c {
            b'{' => self.symbol(Symbol::NodeBegin),
            b'}' => self.symbol(Symbol::NodeEnd),
            b'[' => self.symbol(Symbol::FieldBegin),
            b']' => self.symbol(Symbol::FieldEnd),
            b'.' if !self.byte(1).is_some_and(|c| c.is_ascii_digit()) => self.symbol(Symbol::Dot),
            b'"' => self.scan_string(),
            b'0'..=b'9' | b'+' | b'-' | b'.' => self.scan_number(),
            c if is_identifier_start(c) => self.scan_word(),
            _ => self.scan_invalid(),
        };
        (token, start)
    }

    fn symbol(&mut self, symbol: Symbol) -> Token {
        self.advance(1);
        Token::Symbol(symbol)
    }

    fn scan_word(&mut self) -> Token {
        let start = self.pos;
        while self.byte(0).is_some_and(is_identifier_part) {
            self.advance(1);
        }
        let word = &self.src[start..self.pos];
        match Keyword::lookup(word, self.header) {
            Some(keyword) => Token::Keyword(keyword),
            None => Token::Identifier(word.to_string()),
        }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;
        let bytes = self.src.as_bytes();
        let mut end = start;
        let negative = bytes[end] == b'-';
        if matches!(bytes[end], b'+' | b'-') {
            end += 1;
        }

        if bytes.get(end) == Some(&b'0') && matches!(bytes.get(end + 1), Some(b'x' | b'X')) {
            let digits_start = end + 2;
            let mut digits_end = digits_start;
            while bytes.get(digits_end).is_some_and(u8::is_ascii_hexdigit) {
                digits_end += 1;
            }
            if digits_end == digits_start || bytes.get(digits_end).is_some_and(|c| is_identifier_part(*c)) {
                return self.scan_invalid();
            }
            let digits = &self.src[digits_start..digits_end];
            self.advance(digits_end - start);
            return match u32::from_str_radix(digits, 16) {
                Ok(value) if negative => Token::Integer((value as i32).wrapping_neg()),
                Ok(value) => Token::Integer(value as i32),
                Err(_) => Token::Invalid(self.src[start..digits_end].to_string()),
            };
        }

        let mut digits = 0usize;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
            digits += 1;
        }
        let mut fractional = false;
        if bytes.get(end) == Some(&b'.') {
            fractional = true;
            end += 1;
            while bytes.get(end).is_some_and(u8::is_ascii_digit) {
                end += 1;
                digits += 1;
            }
        }
        if digits == 0 {
            return self.scan_invalid();
        }

        let mut exponent = false;
        if matches!(bytes.get(end), Some(b'e' | b'E')) {
            let mut e = end + 1;
            if matches!(bytes.get(e), Some(b'+' | b'-')) {
                e += 1;
            }
            let exponent_start = e;
            while bytes.get(e).is_some_and(u8::is_ascii_digit) {
                e += 1;
            }
            if e == exponent_start {
                return self.scan_invalid();
            }
            exponent = true;
            end = e;
        }
        if bytes.get(end).is_some_and(|c| is_identifier_part(*c) || *c == b'.') {
            return self.scan_invalid();
        }

        let text = &self.src[start..end];
        self.advance(end - start);
        if !fractional && !exponent {
            if let Ok(value) = text.parse::<i32>() {
                return Token::Integer(value);
            }
        }
        match text.parse::<f64>() {
            Ok(value) => Token::Number(value),
            Err(_) => Token::Invalid(text.to_string()),
        }
    }

    /// `\"` and `\\` are unescaped; any other backslash is kept.
    fn scan_string(&mut self) -> Token {
        let start = self.pos;
        self.advance(1);
        let mut value = Vec::new();
        loop {
            let Some(c) = self.byte(0) else {
                return Token::Invalid(self.src[start..].to_string());
            };
            match c {
                b'"' => {
                    self.advance(1);
                    break;
                }
                b'\\' if matches!(self.byte(1), Some(b'"' | b'\\')) => {
                    value.push(self.byte(1).unwrap_or(b'\\'));
                    self.advance(2);
                }
                b'\n' => {
                    value.push(c);
                    self.newline();
                }
                _ => {
                    value.push(c);
                    self.advance(1);
                }
            }
        }
        Token::String(String::from_utf8_lossy(&value).into_owned())
    }

    /// Consumes up to the next whitespace or structural character.
    fn scan_invalid(&mut self) -> Token {
        let start = self.pos;
        self.advance(1);
        while self
            .byte(0)
            .is_some_and(|c| !c.is_ascii_whitespace() && !b",{}[]\"#".contains(&c))
        {
            self.advance(1);
        }
        Token::Invalid(self.src[start..self.pos].to_string())
    }
}

#[inline]
fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c >= 0x80
}

#[inline]
fn is_identifier_part(c: u8) -> bool {
    is_identifier_start(c) || c.is_ascii_digit()
}
