//! SQL tokenizer.
//!
//! Keywords are matched case-insensitively through a perfect-hash table.
//! Identifiers are bare words; string literals use single quotes with
//! `''` as the escaped quote, as SQL wants. Numeric literals split into
//! integers and reals on the presence of a decimal point; leading minus
//! is a separate token folded by the parser.

use phf::phf_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Create,
    Table,
    Insert,
    Into,
    Values,
    Select,
    From,
    Where,
    And,
    Or,
    Text,
    Integer,
    Numeric,
    Real,
    Blob,
}

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "CREATE" => Keyword::Create,
    "TABLE" => Keyword::Table,
    "INSERT" => Keyword::Insert,
    "INTO" => Keyword::Into,
    "VALUES" => Keyword::Values,
    "SELECT" => Keyword::Select,
    "FROM" => Keyword::From,
    "WHERE" => Keyword::Where,
    "AND" => Keyword::And,
    "OR" => Keyword::Or,
    "TEXT" => Keyword::Text,
    "INTEGER" => Keyword::Integer,
    "NUMERIC" => Keyword::Numeric,
    "REAL" => Keyword::Real,
    "BLOB" => Keyword::Blob,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    Ident(String),
    Integer(i64),
    Real(f64),
    StringLit(String),
    Star,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Minus,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eof,
    /// A character the grammar has no use for; surfaced as a parse error.
    Unknown(char),
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek_byte();
        if byte.is_some() {
            self.pos += 1;
        }
        byte
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let Some(byte) = self.peek_byte() else {
            return Token::Eof;
        };

        match byte {
            b'*' => {
                self.pos += 1;
                Token::Star
            }
            b'(' => {
                self.pos += 1;
                Token::LParen
            }
            b')' => {
                self.pos += 1;
                Token::RParen
            }
            b',' => {
                self.pos += 1;
                Token::Comma
            }
            b';' => {
                self.pos += 1;
                Token::Semicolon
            }
            b'-' => {
                self.pos += 1;
                Token::Minus
            }
            b'=' => {
                self.pos += 1;
                // tolerate == as =
                if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                }
                Token::Eq
            }
            b'!' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    Token::NotEq
                } else {
                    Token::Unknown('!')
                }
            }
            b'<' => {
                self.pos += 1;
                match self.peek_byte() {
                    Some(b'=') => {
                        self.pos += 1;
                        Token::LessEq
                    }
                    Some(b'>') => {
                        self.pos += 1;
                        Token::NotEq
                    }
                    _ => Token::Less,
                }
            }
            b'>' => {
                self.pos += 1;
                if self.peek_byte() == Some(b'=') {
                    self.pos += 1;
                    Token::GreaterEq
                } else {
                    Token::Greater
                }
            }
            b'\'' => self.string_literal(),
            b'0'..=b'9' => self.number(),
            b if b.is_ascii_alphabetic() || b == b'_' => self.word(),
            other => {
                self.pos += 1;
                Token::Unknown(other as char)
            }
        }
    }

    fn string_literal(&mut self) -> Token {
        self.pos += 1; // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                Some(b'\'') => {
                    // '' escapes a quote
                    if self.peek_byte() == Some(b'\'') {
                        self.pos += 1;
                        bytes.push(b'\'');
                    } else {
                        return match String::from_utf8(bytes) {
                            Ok(value) => Token::StringLit(value),
                            Err(_) => Token::Unknown('\''),
                        };
                    }
                }
                Some(byte) => bytes.push(byte),
                None => return Token::Unknown('\''),
            }
        }
    }

    fn number(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_real = false;
        if self.peek_byte() == Some(b'.') {
            is_real = true;
            self.pos += 1;
            while matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or_default();
        if is_real {
            match text.parse::<f64>() {
                Ok(value) => Token::Real(value),
                Err(_) => Token::Unknown('.'),
            }
        } else {
            match text.parse::<i64>() {
                Ok(value) => Token::Integer(value),
                Err(_) => Token::Unknown('9'),
            }
        }
    }

    fn word(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or_default();
        let upper = text.to_ascii_uppercase();
        match KEYWORDS.get(upper.as_str()) {
            Some(&keyword) => Token::Keyword(keyword),
            None => Token::Ident(text.to_string()),
        }
    }
}
