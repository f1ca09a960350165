// Recursive-descent parser. Statements are parsed directly; expressions
// use one function per precedence level, lowest first:
//
//   or < and < comparison < .. (right) < + - < * / % < unary < ^ (right) < postfix

use std::sync::Arc;

use crate::ast::{BinOp, Block, Expr, Stmt, TableEntry, UnOp};
use crate::error::ParseError;
use crate::lexer::{tokenize, Tok, Token};

pub fn parse(source: &str) -> Result<Block, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let block = parser.block()?;
    parser.expect(Tok::Eof, "end of input")?;
    Ok(block)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn cur(&self) -> &Token {
        // The token stream always ends with Eof, which is never consumed.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn tok(&self) -> &Tok {
        &self.cur().tok
    }

    fn tok_at(&self, offset: usize) -> &Tok {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn advance(&mut self) -> Tok {
        let tok = self.cur().tok.clone();
        if !matches!(tok, Tok::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.tok() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), ParseError> {
        if self.tok() == &tok {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!("expected {what}, found {:?}", self.tok())))
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<String, ParseError> {
        match self.tok() {
            Tok::Name(n) => {
                let name = n.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!("expected {what}, found {other:?}"))),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let t = self.cur();
        ParseError::new(message, t.line, t.col)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn at_block_end(&self) -> bool {
        matches!(self.tok(), Tok::End | Tok::Else | Tok::Elseif | Tok::Eof)
    }

    fn block(&mut self) -> Result<Block, ParseError> {
        let mut stmts = Vec::new();
        while !self.at_block_end() {
            if self.eat(&Tok::Semi) {
                continue;
            }
            stmts.push(self.stmt()?);
        }
        Ok(Block { stmts })
    }

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.tok() {
            Tok::Local => self.local_stmt(),
            Tok::If => self.if_stmt(),
            Tok::While => self.while_stmt(),
            Tok::For => self.for_stmt(),
            Tok::Function => self.function_stmt(),
            Tok::Return => self.return_stmt(),
            Tok::Break => {
                self.advance();
                Ok(Stmt::Break)
            }
            _ => self.expr_stmt(),
        }
    }

    fn local_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // local
        let name = self.expect_name("variable name after 'local'")?;
        let value = if self.eat(&Tok::Assign) {
            self.expr()?
        } else {
            Expr::Nil
        };
        Ok(Stmt::Local { name, value })
    }

    fn if_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // if
        let mut arms = Vec::new();
        let cond = self.expr()?;
        self.expect(Tok::Then, "'then'")?;
        arms.push((cond, self.block()?));
        let mut otherwise = None;
        loop {
            match self.tok() {
                Tok::Elseif => {
                    self.advance();
                    let cond = self.expr()?;
                    self.expect(Tok::Then, "'then'")?;
                    arms.push((cond, self.block()?));
                }
                Tok::Else => {
                    self.advance();
                    otherwise = Some(self.block()?);
                    self.expect(Tok::End, "'end'")?;
                    break;
                }
                Tok::End => {
                    self.advance();
                    break;
                }
                other => {
                    return Err(self.error_here(format!(
                        "expected 'elseif', 'else' or 'end', found {other:?}"
                    )))
                }
            }
        }
        Ok(Stmt::If { arms, otherwise })
    }

    fn while_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // while
        let cond = self.expr()?;
        self.expect(Tok::Do, "'do'")?;
        let body = self.block()?;
        self.expect(Tok::End, "'end'")?;
        Ok(Stmt::While { cond, body })
    }

    fn for_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // for
        let var = self.expect_name("loop variable")?;
        self.expect(Tok::Assign, "'=' in numeric for")?;
        let start = self.expr()?;
        self.expect(Tok::Comma, "','")?;
        let stop = self.expr()?;
        let step = if self.eat(&Tok::Comma) {
            Some(self.expr()?)
        } else {
            None
        };
        self.expect(Tok::Do, "'do'")?;
        let body = self.block()?;
        self.expect(Tok::End, "'end'")?;
        Ok(Stmt::NumericFor { var, start, stop, step, body })
    }

    /// `function a.b.c(params) ... end` desugars into
    /// `a.b.c = function(params) ... end`.
    fn function_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // function
        let mut target = Expr::Var(self.expect_name("function name")?);
        while self.eat(&Tok::Dot) {
            let field = self.expect_name("field name after '.'")?;
            target = Expr::Index {
                object: Box::new(target),
                key: Box::new(Expr::Str(field)),
            };
        }
        let (params, body) = self.function_rest()?;
        Ok(Stmt::Assign {
            target,
            value: Expr::Function { params, body: Arc::new(body) },
        })
    }

    /// Parameter list and body, after the name (or `function` keyword for
    /// anonymous functions).
    fn function_rest(&mut self) -> Result<(Vec<String>, Block), ParseError> {
        self.expect(Tok::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.eat(&Tok::RParen) {
            loop {
                params.push(self.expect_name("parameter name")?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RParen, "')'")?;
        }
        let body = self.block()?;
        self.expect(Tok::End, "'end'")?;
        Ok((params, body))
    }

    fn return_stmt(&mut self) -> Result<Stmt, ParseError> {
        self.advance(); // return
        let mut values = Vec::new();
        if !self.at_block_end() && self.tok() != &Tok::Semi {
            values.push(self.expr()?);
            while self.eat(&Tok::Comma) {
                values.push(self.expr()?);
            }
        }
        Ok(Stmt::Return(values))
    }

    /// Assignment or call statement; both start with a suffixed expression.
    fn expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.suffixed_expr()?;
        if self.eat(&Tok::Assign) {
            match expr {
                Expr::Var(_) | Expr::Index { .. } => {
                    let value = self.expr()?;
                    Ok(Stmt::Assign { target: expr, value })
                }
                _ => Err(self.error_here("cannot assign to this expression")),
            }
        } else if matches!(expr, Expr::Call { .. }) {
            Ok(Stmt::Call(expr))
        } else {
            Err(self.error_here("expected statement"))
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat(&Tok::Or) {
            let rhs = self.and_expr()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.cmp_expr()?;
        while self.eat(&Tok::And) {
            let rhs = self.cmp_expr()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.concat_expr()?;
        loop {
            let op = match self.tok() {
                Tok::EqEq => BinOp::Eq,
                Tok::NotEq => BinOp::NotEq,
                Tok::Lt => BinOp::Lt,
                Tok::LtEq => BinOp::LtEq,
                Tok::Gt => BinOp::Gt,
                Tok::GtEq => BinOp::GtEq,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.concat_expr()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn concat_expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.additive_expr()?;
        if self.eat(&Tok::DotDot) {
            // Right-associative
            let rhs = self.concat_expr()?;
            Ok(binary(BinOp::Concat, lhs, rhs))
        } else {
            Ok(lhs)
        }
    }

    fn additive_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative_expr()?;
        loop {
            let op = match self.tok() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplicative_expr()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.tok() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        let op = match self.tok() {
            Tok::Not => UnOp::Not,
            Tok::Hash => UnOp::Len,
            Tok::Minus => UnOp::Neg,
            _ => return self.power_expr(),
        };
        self.advance();
        let operand = self.unary_expr()?;
        Ok(Expr::Unary { op, operand: Box::new(operand) })
    }

    fn power_expr(&mut self) -> Result<Expr, ParseError> {
        let base = self.suffixed_expr()?;
        if self.eat(&Tok::Caret) {
            // Right-associative; `-x^2` is `-(x^2)`, `2^-3` is allowed.
            let rhs = self.unary_expr()?;
            Ok(binary(BinOp::Pow, base, rhs))
        } else {
            Ok(base)
        }
    }

    /// Primary expression followed by any number of `.name`, `[expr]`,
    /// and `(args)` suffixes.
    fn suffixed_expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.tok() {
                Tok::Dot => {
                    self.advance();
                    let field = self.expect_name("field name after '.'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        key: Box::new(Expr::Str(field)),
                    };
                }
                Tok::LBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.expect(Tok::RBracket, "']'")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                Tok::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.eat(&Tok::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if !self.eat(&Tok::Comma) {
                                break;
                            }
                        }
                        self.expect(Tok::RParen, "')'")?;
                    }
                    expr = Expr::Call { callee: Box::new(expr), args };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.tok().clone() {
            Tok::Nil => {
                self.advance();
                Ok(Expr::Nil)
            }
            Tok::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Tok::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Tok::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Tok::Name(n) => {
                self.advance();
                Ok(Expr::Var(n))
            }
            Tok::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(inner)
            }
            Tok::LBrace => self.table_ctor(),
            Tok::Function => {
                self.advance();
                let (params, body) = self.function_rest()?;
                Ok(Expr::Function { params, body: Arc::new(body) })
            }
            other => Err(self.error_here(format!("unexpected token {other:?}"))),
        }
    }

    fn table_ctor(&mut self) -> Result<Expr, ParseError> {
        self.advance(); // {
        let mut entries = Vec::new();
        loop {
            if self.eat(&Tok::RBrace) {
                return Ok(Expr::TableCtor(entries));
            }
            let entry = match self.tok().clone() {
                Tok::LBracket => {
                    self.advance();
                    let key = self.expr()?;
                    self.expect(Tok::RBracket, "']'")?;
                    self.expect(Tok::Assign, "'=' in table entry")?;
                    let value = self.expr()?;
                    TableEntry::Keyed { key, value }
                }
                Tok::Name(key) if self.tok_at(1) == &Tok::Assign => {
                    self.advance();
                    self.advance();
                    let value = self.expr()?;
                    TableEntry::Named { key, value }
                }
                _ => TableEntry::Positional(self.expr()?),
            };
            entries.push(entry);
            if !self.eat(&Tok::Comma) && !self.eat(&Tok::Semi) {
                self.expect(Tok::RBrace, "'}' or ',' in table constructor")?;
                return Ok(Expr::TableCtor(entries));
            }
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
