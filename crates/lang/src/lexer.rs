// Hand-written tokenizer. Single pass, one character of lookahead,
// line/col tracked for error reporting.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    Name(String),
    // Keywords
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    False,
    For,
    Function,
    If,
    Local,
    Nil,
    Not,
    Or,
    Return,
    Then,
    True,
    While,
    // Symbols
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Hash,
    EqEq,
    NotEq,
    LtEq,
    GtEq,
    Lt,
    Gt,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    DotDot,
    Semi,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    pub col: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        col: 1,
    }
    .run()
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.col)
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (line, col) = (self.line, self.col);
            let Some(c) = self.peek() else {
                tokens.push(Token { tok: Tok::Eof, line, col });
                return Ok(tokens);
            };
            let tok = match c {
                '+' => self.single(Tok::Plus),
                '-' => self.single(Tok::Minus),
                '*' => self.single(Tok::Star),
                '/' => self.single(Tok::Slash),
                '%' => self.single(Tok::Percent),
                '^' => self.single(Tok::Caret),
                '#' => self.single(Tok::Hash),
                '(' => self.single(Tok::LParen),
                ')' => self.single(Tok::RParen),
                '{' => self.single(Tok::LBrace),
                '}' => self.single(Tok::RBrace),
                '[' => self.single(Tok::LBracket),
                ']' => self.single(Tok::RBracket),
                ',' => self.single(Tok::Comma),
                ';' => self.single(Tok::Semi),
                '=' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        Tok::EqEq
                    } else {
                        Tok::Assign
                    }
                }
                '~' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        Tok::NotEq
                    } else {
                        return Err(self.error("unexpected character '~'"));
                    }
                }
                '<' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        Tok::LtEq
                    } else {
                        Tok::Lt
                    }
                }
                '>' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        Tok::GtEq
                    } else {
                        Tok::Gt
                    }
                }
                '.' => {
                    self.bump();
                    if self.peek() == Some('.') {
                        self.bump();
                        Tok::DotDot
                    } else {
                        Tok::Dot
                    }
                }
                '"' | '\'' => self.string_literal(c)?,
                '0'..='9' => self.number()?,
                c if c.is_ascii_alphabetic() || c == '_' => self.name(),
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            };
            tokens.push(Token { tok, line, col });
        }
    }

    fn single(&mut self, tok: Tok) -> Tok {
        self.bump();
        tok
    }

    /// Skip whitespace and `--` line comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.peek2() == Some('-') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn string_literal(&mut self, quote: char) -> Result<Tok, ParseError> {
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Tok::Str(s)),
                Some('\\') => match self.bump() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('\\') => s.push('\\'),
                    Some('"') => s.push('"'),
                    Some('\'') => s.push('\''),
                    Some(other) => {
                        return Err(self.error(format!("unknown escape '\\{other}'")));
                    }
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) => s.push(c),
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    fn number(&mut self) -> Result<Tok, ParseError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // Fraction: only if the dot is followed by a digit, so `t.1` never
        // lexes here and `1..2` stays number-concat-number.
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            text.push('e');
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.bump();
            }
            let mut digits = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                    digits = true;
                } else {
                    break;
                }
            }
            if !digits {
                return Err(self.error("malformed number: missing exponent digits"));
            }
        }
        text.parse::<f64>()
            .map(Tok::Number)
            .map_err(|_| self.error(format!("malformed number '{text}'")))
    }

    fn name(&mut self) -> Tok {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match ident.as_str() {
            "and" => Tok::And,
            "break" => Tok::Break,
            "do" => Tok::Do,
            "else" => Tok::Else,
            "elseif" => Tok::Elseif,
            "end" => Tok::End,
            "false" => Tok::False,
            "for" => Tok::For,
            "function" => Tok::Function,
            "if" => Tok::If,
            "local" => Tok::Local,
            "nil" => Tok::Nil,
            "not" => Tok::Not,
            "or" => Tok::Or,
            "return" => Tok::Return,
            "then" => Tok::Then,
            "true" => Tok::True,
            "while" => Tok::While,
            _ => Tok::Name(ident),
        }
    }
}
