//! Tokenizer and recursive-descent parser for the expression language used
//! inside directives.
//!
//! ```text
//! expr       := or_expr [ 'if' or_expr 'else' expr ]
//! or_expr    := and_expr ( 'or' and_expr )*
//! and_expr   := not_expr ( 'and' not_expr )*
//! not_expr   := 'not' not_expr | comparison
//! comparison := sum ( cmp_op sum )*
//! sum        := term ( ('+' | '-') term )*
//! term       := unary ( ('*' | '/' | '//' | '%') unary )*
//! unary      := ('-' | '+') unary | power
//! power      := postfix [ '**' unary ]
//! postfix    := primary ( '.' IDENT | '[' expr ']' | '(' args ')' )*
//! primary    := literal | IDENT | '(' ... ')' | '[' ... ']' | '{' ... '}'
//! ```

use crate::ast::{BinOp, CmpOp, Expr, Param, StatementKind, UnaryOp};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),

    // Keywords
    And,
    Or,
    Not,
    In,
    Is,
    If,
    Else,
    True,
    False,
    None,

    // Symbols
    Dot,       // .
    Comma,     // ,
    Colon,     // :
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    LBrace,    // {
    RBrace,    // }
    Pipe,      // |
    Plus,      // +
    Minus,     // -
    Star,      // *
    StarStar,  // **
    Slash,     // /
    SlashSlash, // //
    Percent,   // %
    EqEq,      // ==
    NotEq,     // !=
    Lt,        // <
    Le,        // <=
    Gt,        // >
    Ge,        // >=
    Assign,    // =
    AugAssign(BinOp), // += -= *= /=
}

pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, String> {
        let trimmed = self.remaining().trim_start();
        self.cursor = self.input.len() - trimmed.len();

        let rest = self.remaining();
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        const SYMBOLS: &[(&str, Token)] = &[
            ("**", Token::StarStar),
            ("//", Token::SlashSlash),
            ("==", Token::EqEq),
            ("!=", Token::NotEq),
            ("<=", Token::Le),
            (">=", Token::Ge),
            ("+=", Token::AugAssign(BinOp::Add)),
            ("-=", Token::AugAssign(BinOp::Sub)),
            ("*=", Token::AugAssign(BinOp::Mul)),
            ("/=", Token::AugAssign(BinOp::Div)),
            (".", Token::Dot),
            (",", Token::Comma),
            (":", Token::Colon),
            ("(", Token::LParen),
            (")", Token::RParen),
            ("[", Token::LBracket),
            ("]", Token::RBracket),
            ("{", Token::LBrace),
            ("}", Token::RBrace),
            ("|", Token::Pipe),
            ("+", Token::Plus),
            ("-", Token::Minus),
            ("*", Token::Star),
            ("/", Token::Slash),
            ("%", Token::Percent),
            ("<", Token::Lt),
            (">", Token::Gt),
            ("=", Token::Assign),
        ];
        for (symbol, token) in SYMBOLS {
            if rest.starts_with(symbol) {
                self.advance(symbol.len());
                return Ok(Some(token.clone()));
            }
        }

        if first == '\'' || first == '"' {
            return self.lex_string(first).map(Some);
        }

        if first.is_ascii_digit() {
            return self.lex_number().map(Some);
        }

        if first.is_alphabetic() || first == '_' {
            let len = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let ident = &rest[..len];
            self.advance(len);
            let token = match ident {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                "is" => Token::Is,
                "if" => Token::If,
                "else" => Token::Else,
                "True" | "true" => Token::True,
                "False" | "false" => Token::False,
                "None" | "none" => Token::None,
                _ => Token::Ident(ident.to_string()),
            };
            return Ok(Some(token));
        }

        Err(format!("unexpected character {:?}", first))
    }

    fn lex_string(&mut self, quote: char) -> Result<Token, String> {
        let rest = self.remaining();
        let mut s = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.advance(idx + c.len_utf8());
                return Ok(Token::Str(s));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, 'r')) => s.push('\r'),
                    Some((_, '0')) => s.push('\0'),
                    Some((_, esc)) => s.push(esc),
                    None => break,
                }
            } else {
                s.push(c);
            }
        }
        Err("unterminated string literal".to_string())
    }

    fn lex_number(&mut self) -> Result<Token, String> {
        let rest = self.remaining();
        let bytes = rest.as_bytes();
        let digits = |from: usize| {
            bytes[from..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count()
        };
        let mut len = digits(0);
        let mut is_float = false;
        if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit) {
            len += 1 + digits(len + 1);
            is_float = true;
        }
        if matches!(bytes.get(len), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(bytes.get(len + 1), Some(b'+' | b'-')));
            let exp = digits(len + 1 + sign);
            if exp > 0 {
                len += 1 + sign + exp;
                is_float = true;
            }
        }
        let text = &rest[..len];
        self.advance(len);
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|e| format!("invalid number {}: {}", text, e))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| format!("integer literal {} is too large", text))
        }
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

pub struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, String> {
        Ok(Self {
            tokens: tokenize(input)?,
            cursor: 0,
        })
    }

    fn peek(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + n)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek(0) == Some(token) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        match self.consume() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(format!("expected {:?}, got {:?}", token, t)),
            None => Err(format!("expected {:?}, got end of expression", token)),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, String> {
        match self.consume() {
            Some(Token::Ident(name)) => Ok(name),
            Some(t) => Err(format!("expected {}, got {:?}", what, t)),
            None => Err(format!("expected {}, got end of expression", what)),
        }
    }

    pub fn finish(&self) -> Result<(), String> {
        match self.peek(0) {
            None => Ok(()),
            Some(t) => Err(format!("unexpected {:?}", t)),
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr, String> {
        let expr = self.parse_or()?;
        if self.eat(&Token::If) {
            let cond = self.parse_or()?;
            self.expect(Token::Else)?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then: Box::new(expr),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(expr)
    }

    /// `a, b` without brackets, as on the right of an assignment.
    fn parse_bare_tuple(&mut self) -> Result<Expr, String> {
        let first = self.parse_expr()?;
        if self.peek(0) != Some(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&Token::Comma) {
            if self.peek(0).is_none() {
                break;
            }
            items.push(self.parse_expr()?);
        }
        Ok(Expr::List(items))
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_sum()?;
        let mut chain = Vec::new();
        loop {
            let op = match (self.peek(0), self.peek(1)) {
                (Some(Token::EqEq), _) => CmpOp::Eq,
                (Some(Token::NotEq), _) => CmpOp::Ne,
                (Some(Token::Lt), _) => CmpOp::Lt,
                (Some(Token::Le), _) => CmpOp::Le,
                (Some(Token::Gt), _) => CmpOp::Gt,
                (Some(Token::Ge), _) => CmpOp::Ge,
                (Some(Token::In), _) => CmpOp::In,
                (Some(Token::Not), Some(Token::In)) => {
                    self.consume();
                    CmpOp::NotIn
                }
                (Some(Token::Is), Some(Token::Not)) => {
                    self.consume();
                    CmpOp::IsNot
                }
                (Some(Token::Is), _) => CmpOp::Is,
                _ => break,
            };
            self.consume();
            chain.push((op, self.parse_sum()?));
        }
        if chain.is_empty() {
            Ok(lhs)
        } else {
            Ok(Expr::Compare(Box::new(lhs), chain))
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek(0) {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.consume();
            let rhs = self.parse_term()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek(0) {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::SlashSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.consume();
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let op = match self.peek(0) {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.consume();
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::StarStar) {
            let exp = self.parse_unary()?;
            return Ok(Expr::BinOp(Box::new(base), BinOp::Pow, Box::new(exp)));
        }
        Ok(base)
    }

    pub fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;

        // Handle suffixes: .attr, ['key'], (args)
        loop {
            match self.peek(0) {
                Some(Token::Dot) => {
                    self.consume();
                    let attr = self.expect_ident("attribute name after '.'")?;
                    expr = Expr::Attribute(Box::new(expr), attr);
                }
                Some(Token::LBracket) => {
                    self.consume();
                    let idx = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(idx));
                }
                Some(Token::LParen) => {
                    self.consume();
                    let (args, kwargs) = self.parse_args()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), String> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.eat(&Token::RParen) {
            if let (Some(Token::Ident(name)), Some(Token::Assign)) = (self.peek(0), self.peek(1)) {
                let name = name.clone();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(format!("keyword argument repeated: {}", name));
                }
                self.cursor += 2;
                kwargs.push((name, self.parse_expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err("positional argument follows keyword argument".to_string());
                }
                args.push(self.parse_expr()?);
            }
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen)?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn parse_sequence(&mut self, close: Token) -> Result<Vec<Expr>, String> {
        let mut items = Vec::new();
        while !self.eat(&close) {
            items.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let expr = match self.consume() {
            Some(Token::Int(i)) => Expr::Literal(Value::Int(i)),
            Some(Token::Float(f)) => Expr::Literal(Value::Float(f)),
            Some(Token::Str(s)) => {
                // Adjacent string literals concatenate
                let mut s = s;
                while let Some(Token::Str(next)) = self.peek(0) {
                    s.push_str(next);
                    self.cursor += 1;
                }
                Expr::Literal(Value::Str(s))
            }
            Some(Token::True) => Expr::Literal(Value::Bool(true)),
            Some(Token::False) => Expr::Literal(Value::Bool(false)),
            Some(Token::None) => Expr::Literal(Value::None),
            Some(Token::Ident(name)) => Expr::Var(name),
            Some(Token::LParen) => {
                if self.eat(&Token::RParen) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat(&Token::RParen) {
                    return Ok(first);
                }
                self.expect(Token::Comma)?;
                let mut items = vec![first];
                items.extend(self.parse_sequence(Token::RParen)?);
                Expr::List(items)
            }
            Some(Token::LBracket) => Expr::List(self.parse_sequence(Token::RBracket)?),
            Some(Token::LBrace) => {
                let mut pairs = Vec::new();
                while !self.eat(&Token::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(Token::Colon)?;
                    let value = self.parse_expr()?;
                    pairs.push((key, value));
                    if !self.eat(&Token::Comma) {
                        self.expect(Token::RBrace)?;
                        break;
                    }
                }
                Expr::Map(pairs)
            }
            Some(t) => return Err(format!("expected expression, got {:?}", t)),
            None => return Err("expected expression, got end of expression".to_string()),
        };
        Ok(expr)
    }

    /// `a`, `a, b` or `(a, b)` followed by `in`.
    fn parse_for_targets(&mut self) -> Result<Vec<String>, String> {
        let parens = self.eat(&Token::LParen);
        let mut targets = vec![self.expect_ident("loop variable")?];
        while self.eat(&Token::Comma) {
            if parens && self.peek(0) == Some(&Token::RParen) {
                break;
            }
            targets.push(self.expect_ident("loop variable")?);
        }
        if parens {
            self.expect(Token::RParen)?;
        }
        Ok(targets)
    }
}

/// `expr | filter | filter` as written in an output directive.
pub fn parse_output(input: &str) -> Result<(Expr, Vec<Expr>), String> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_expr()?;
    let mut filters = Vec::new();
    while parser.eat(&Token::Pipe) {
        filters.push(parser.parse_postfix()?);
    }
    parser.finish()?;
    Ok((expr, filters))
}

pub fn parse_expression(input: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_expr()?;
    parser.finish()?;
    Ok(expr)
}

/// The argument of a `for` directive: `targets in iterable`.
pub fn parse_for(input: &str) -> Result<(Vec<String>, Expr), String> {
    let mut parser = Parser::new(input)?;
    if !parser.tokens.contains(&Token::In) {
        return Err(format!("Bad for (no \"in\") in {:?}", input.trim()));
    }
    let targets = parser.parse_for_targets()?;
    parser.expect(Token::In)?;
    let iterable = parser.parse_expr()?;
    parser.finish()?;
    Ok((targets, iterable))
}

/// `name = expr` as written in a `default` directive.
pub fn parse_assignment(input: &str) -> Result<(String, Expr), String> {
    let mut parser = Parser::new(input)?;
    let name = parser.expect_ident("variable name")?;
    parser.expect(Token::Assign)?;
    let expr = parser.parse_expr()?;
    parser.finish()?;
    Ok((name, expr))
}

/// `name` or `name(param, param=default)` as written in a `def` directive.
pub fn parse_signature(input: &str) -> Result<(String, Vec<Param>), String> {
    let mut parser = Parser::new(input)?;
    let name = parser.expect_ident("block name")?;
    let mut params: Vec<Param> = Vec::new();
    if parser.eat(&Token::LParen) {
        while !parser.eat(&Token::RParen) {
            let param = parser.expect_ident("parameter name")?;
            if params.iter().any(|p| p.name == param) {
                return Err(format!("duplicate parameter {}", param));
            }
            let default = if parser.eat(&Token::Assign) {
                Some(parser.parse_expr()?)
            } else {
                if params.iter().any(|p| p.default.is_some()) {
                    return Err(format!(
                        "parameter {} without a default follows a parameter with one",
                        param
                    ));
                }
                None
            };
            params.push(Param { name: param, default });
            if !parser.eat(&Token::Comma) {
                parser.expect(Token::RParen)?;
                break;
            }
        }
    }
    parser.finish()?;
    Ok((name, params))
}

/// One statement of a code block.
pub fn parse_statement(input: &str) -> Result<StatementKind, String> {
    let mut parser = Parser::new(input)?;

    // name[, name]* = expr
    let mut n = 0;
    while let Some(Token::Ident(_)) = parser.peek(n) {
        match parser.peek(n + 1) {
            Some(Token::Comma) => n += 2,
            Some(Token::Assign) => {
                let targets = parser.tokens[..=n]
                    .iter()
                    .filter_map(|t| match t {
                        Token::Ident(name) => Some(name.clone()),
                        _ => None,
                    })
                    .collect();
                parser.cursor = n + 2;
                let value = parser.parse_bare_tuple()?;
                parser.finish()?;
                return Ok(StatementKind::Assign { targets, value });
            }
            _ => break,
        }
    }

    if let (Some(Token::Ident(name)), Some(Token::AugAssign(op))) = (parser.peek(0), parser.peek(1)) {
        let (name, op) = (name.clone(), *op);
        parser.cursor = 2;
        let value = parser.parse_expr()?;
        parser.finish()?;
        return Ok(StatementKind::AugAssign { name, op, value });
    }

    let expr = parser.parse_expr()?;
    parser.finish()?;
    Ok(StatementKind::Expr(expr))
}
