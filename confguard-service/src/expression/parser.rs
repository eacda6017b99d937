//! Parser for the constraint expression language
//!
//! Hand-rolled tokenizer and recursive-descent parser over the XPath-1.0
//! subset. `and`/`or`/`div`/`mod` are lexed as names and interpreted as
//! operators by position, the way XPath demands. Nesting depth and input
//! length are bounded.

use super::ast::{Axis, BinaryOp, Expr, Function, LocationPath, LocationStep, NameTest};
use super::error::ParseError;
use std::iter::Peekable;
use std::str::Chars;

/// Token types produced by the tokenizer
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Literal(String),
    Ident { prefix: Option<String>, name: String },

    Slash,
    Dot,
    DotDot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,

    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Plus,
    Minus,
    Star,

    Eof,
}

struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            position: 0,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.position += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace();

        let Some(&ch) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        match ch {
            '/' => {
                self.advance();
                Ok(Token::Slash)
            }
            '[' => {
                self.advance();
                Ok(Token::LBracket)
            }
            ']' => {
                self.advance();
                Ok(Token::RBracket)
            }
            '(' => {
                self.advance();
                Ok(Token::LParen)
            }
            ')' => {
                self.advance();
                Ok(Token::RParen)
            }
            ',' => {
                self.advance();
                Ok(Token::Comma)
            }
            '+' => {
                self.advance();
                Ok(Token::Plus)
            }
            '-' => {
                self.advance();
                Ok(Token::Minus)
            }
            '*' => {
                self.advance();
                Ok(Token::Star)
            }
            '=' => {
                self.advance();
                Ok(Token::Eq)
            }
            '!' => {
                self.advance();
                if self.chars.peek() == Some(&'=') {
                    self.advance();
                    Ok(Token::NotEq)
                } else {
                    Err(ParseError::UnexpectedToken {
                        token: "!".to_string(),
                        position: self.position - 1,
                    })
                }
            }
            '<' => {
                self.advance();
                if self.chars.peek() == Some(&'=') {
                    self.advance();
                    Ok(Token::LtEq)
                } else {
                    Ok(Token::Lt)
                }
            }
            '>' => {
                self.advance();
                if self.chars.peek() == Some(&'=') {
                    self.advance();
                    Ok(Token::GtEq)
                } else {
                    Ok(Token::Gt)
                }
            }
            '.' => {
                self.advance();
                if self.chars.peek() == Some(&'.') {
                    self.advance();
                    Ok(Token::DotDot)
                } else {
                    Ok(Token::Dot)
                }
            }
            '\'' | '"' => self.read_literal(ch),
            '0'..='9' => self.read_number(),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_ident()),
            other => Err(ParseError::UnexpectedToken {
                token: other.to_string(),
                position: self.position,
            }),
        }
    }

    fn read_literal(&mut self, quote: char) -> Result<Token, ParseError> {
        let start = self.position;
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote => return Ok(Token::Literal(text)),
                Some(c) => text.push(c),
                None => return Err(ParseError::UnterminatedLiteral { position: start }),
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, ParseError> {
        let start = self.position;
        let mut text = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap_or_default());
        }
        // A '.' only belongs to the number when digits follow; otherwise it
        // would swallow a trailing path step.
        if self.chars.peek() == Some(&'.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.peek(), Some(c) if c.is_ascii_digit()) {
                text.push('.');
                self.advance();
                while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
                    text.push(self.advance().unwrap_or_default());
                }
            }
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ParseError::InvalidNumber {
                value: text,
                position: start,
            })
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while matches!(self.chars.peek(), Some(&c) if c.is_alphanumeric() || c == '_' || c == '-')
        {
            name.push(self.advance().unwrap_or_default());
        }
        name
    }

    fn read_ident(&mut self) -> Token {
        let first = self.read_name();
        // A ':' not followed by another ':' qualifies the name.
        if self.chars.peek() == Some(&':') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.peek(), Some(&c) if c.is_alphabetic() || c == '_') {
                self.advance();
                let name = self.read_name();
                return Token::Ident {
                    prefix: Some(first),
                    name,
                };
            }
        }
        Token::Ident {
            prefix: None,
            name: first,
        }
    }
}

/// Expression parser with nesting and length bounds
#[derive(Debug, Clone)]
pub struct Parser {
    max_depth: usize,
    max_length: usize,
}

impl Parser {
    /// Parser with default bounds
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: 100,
            max_length: 10_000,
        }
    }

    /// Parser with custom bounds
    #[must_use]
    pub fn with_limits(max_depth: usize, max_length: usize) -> Self {
        Self {
            max_depth,
            max_length,
        }
    }

    /// Parse an expression string
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] for malformed input, unknown functions, or
    /// input exceeding the configured bounds.
    pub fn parse(&self, input: &str) -> Result<Expr, ParseError> {
        if input.len() > self.max_length {
            return Err(ParseError::TooLong {
                length: input.len(),
                max: self.max_length,
            });
        }

        let mut state = ParserState {
            tokenizer: Tokenizer::new(input),
            current: Token::Eof,
            depth: 0,
            max_depth: self.max_depth,
        };
        state.bump()?;
        let expr = state.parse_expr()?;
        if state.current != Token::Eof {
            return Err(ParseError::TrailingInput {
                input: format!("{:?}", state.current),
            });
        }
        Ok(expr)
    }

    /// Parse a bare location path (leafref target path syntax)
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the input is not a location path.
    pub fn parse_path(&self, input: &str) -> Result<LocationPath, ParseError> {
        match self.parse(input)? {
            Expr::Path(path) => Ok(path),
            other => Err(ParseError::UnexpectedToken {
                token: other.to_string(),
                position: 0,
            }),
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

struct ParserState<'a> {
    tokenizer: Tokenizer<'a>,
    current: Token,
    depth: usize,
    max_depth: usize,
}

impl ParserState<'_> {
    fn bump(&mut self) -> Result<(), ParseError> {
        self.current = self.tokenizer.next_token()?;
        Ok(())
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::TooDeep {
                depth: self.depth,
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// True when the current token is the bare operator name `name`
    fn at_operator_name(&self, name: &str) -> bool {
        matches!(&self.current, Token::Ident { prefix: None, name: n } if n == name)
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.at_operator_name("or") {
            self.enter()?;
            self.bump()?;
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
            self.leave();
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.at_operator_name("and") {
            self.enter()?;
            self.bump()?;
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
            self.leave();
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.current {
                Token::Eq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            self.enter()?;
            self.bump()?;
            let right = self.parse_relational()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            self.leave();
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current {
                Token::Lt => BinaryOp::Lt,
                Token::Gt => BinaryOp::Gt,
                Token::LtEq => BinaryOp::LtEq,
                Token::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.enter()?;
            self.bump()?;
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            self.leave();
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Subtract,
                _ => break,
            };
            self.enter()?;
            self.bump()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            self.leave();
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.current == Token::Star {
                BinaryOp::Multiply
            } else if self.at_operator_name("div") {
                BinaryOp::Div
            } else if self.at_operator_name("mod") {
                BinaryOp::Mod
            } else {
                break;
            };
            self.enter()?;
            self.bump()?;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            self.leave();
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.current == Token::Minus {
            self.enter()?;
            self.bump()?;
            let inner = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.current.clone() {
            Token::Number(n) => {
                self.bump()?;
                Ok(Expr::Number(n))
            }
            Token::Literal(s) => {
                self.bump()?;
                Ok(Expr::Literal(s))
            }
            Token::LParen => {
                self.enter()?;
                self.bump()?;
                let inner = self.parse_expr()?;
                self.expect_rparen()?;
                self.leave();
                Ok(inner)
            }
            Token::Slash => {
                let steps = self.parse_steps(true)?;
                Ok(Expr::Path(LocationPath {
                    absolute: true,
                    steps,
                }))
            }
            Token::Dot | Token::DotDot => {
                let steps = self.parse_steps(false)?;
                Ok(Expr::Path(LocationPath {
                    absolute: false,
                    steps,
                }))
            }
            Token::Ident { prefix, name } => {
                self.bump()?;
                if prefix.is_none() && self.current == Token::LParen {
                    let call = self.parse_call(&name)?;
                    // A call may continue as a path: current()/../key
                    if self.current == Token::Slash {
                        self.bump()?;
                        let steps = self.parse_steps_after_slash()?;
                        return Ok(Expr::PathFrom {
                            base: Box::new(call),
                            steps,
                        });
                    }
                    return Ok(call);
                }
                // A relative path starting with a name test
                let first = LocationStep {
                    axis: Axis::Child(NameTest {
                        module: prefix,
                        name,
                    }),
                    predicates: self.parse_predicates()?,
                };
                let mut steps = vec![first];
                if self.current == Token::Slash {
                    self.bump()?;
                    steps.extend(self.parse_steps_after_slash()?);
                }
                Ok(Expr::Path(LocationPath {
                    absolute: false,
                    steps,
                }))
            }
            Token::Eof => Err(ParseError::UnexpectedEof {
                position: self.tokenizer.position,
            }),
            other => Err(ParseError::UnexpectedToken {
                token: format!("{other:?}"),
                position: self.tokenizer.position,
            }),
        }
    }

    /// Parse steps, consuming the leading slash token when `absolute`
    fn parse_steps(&mut self, absolute: bool) -> Result<Vec<LocationStep>, ParseError> {
        if absolute {
            self.bump()?; // the leading '/'
        }
        self.parse_steps_after_slash()
    }

    fn parse_steps_after_slash(&mut self) -> Result<Vec<LocationStep>, ParseError> {
        let mut steps = Vec::new();
        loop {
            let axis = match self.current.clone() {
                Token::DotDot => {
                    self.bump()?;
                    Axis::Parent
                }
                Token::Dot => {
                    self.bump()?;
                    Axis::SelfNode
                }
                Token::Ident { prefix, name } => {
                    self.bump()?;
                    Axis::Child(NameTest {
                        module: prefix,
                        name,
                    })
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        token: format!("{other:?}"),
                        position: self.tokenizer.position,
                    });
                }
            };
            steps.push(LocationStep {
                axis,
                predicates: self.parse_predicates()?,
            });
            if self.current == Token::Slash {
                self.bump()?;
            } else {
                break;
            }
        }
        Ok(steps)
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut predicates = Vec::new();
        while self.current == Token::LBracket {
            self.enter()?;
            self.bump()?;
            predicates.push(self.parse_expr()?);
            if self.current != Token::RBracket {
                return Err(ParseError::MissingDelimiter {
                    delimiter: ']',
                    position: self.tokenizer.position,
                });
            }
            self.bump()?;
            self.leave();
        }
        Ok(predicates)
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, ParseError> {
        let function =
            Function::from_name(name).ok_or_else(|| ParseError::UnknownFunction {
                name: name.to_string(),
                position: self.tokenizer.position,
            })?;
        self.enter()?;
        self.bump()?; // '('
        let mut args = Vec::new();
        if self.current != Token::RParen {
            loop {
                args.push(self.parse_expr()?);
                match self.current {
                    Token::Comma => self.bump()?,
                    Token::RParen => break,
                    _ => {
                        return Err(ParseError::MissingDelimiter {
                            delimiter: ')',
                            position: self.tokenizer.position,
                        });
                    }
                }
            }
        }
        self.bump()?; // ')'
        self.leave();
        Ok(Expr::Call { function, args })
    }

    fn expect_rparen(&mut self) -> Result<(), ParseError> {
        if self.current != Token::RParen {
            return Err(ParseError::MissingDelimiter {
                delimiter: ')',
                position: self.tokenizer.position,
            });
        }
        self.bump()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_literals_and_numbers() {
        let parser = Parser::new();
        assert_eq!(
            parser.parse("'text'").expect("string literal"),
            Expr::Literal("text".to_string())
        );
        assert_eq!(parser.parse("42").expect("integer"), Expr::Number(42.0));
        assert_eq!(parser.parse("2.5").expect("decimal"), Expr::Number(2.5));
    }

    #[test]
    fn test_parse_relative_path_with_parent_steps() {
        let parser = Parser::new();
        let expr = parser.parse("../lrPoints/lrPointsToSibling").expect("path");
        let Expr::Path(path) = expr else {
            panic!("expected a path");
        };
        assert!(!path.absolute);
        assert_eq!(path.steps.len(), 3);
        assert_eq!(path.steps[0].axis, Axis::Parent);
        assert_eq!(path.to_string(), "../lrPoints/lrPointsToSibling");
    }

    #[test]
    fn test_parse_predicate_with_current() {
        let parser = Parser::new();
        let expr = parser
            .parse("../list1[key1=current()]/leaf2")
            .expect("keyed path");
        assert_eq!(expr.to_string(), "../list1[key1 = current()]/leaf2");
    }

    #[test]
    fn test_parse_count_with_nested_re_match_predicate() {
        let parser = Parser::new();
        let expr = parser
            .parse(r#"count(../interface[re-match(name, 'eth0\.\d+')]) > 1"#)
            .expect("count over predicate");
        let Expr::Binary { op, .. } = &expr else {
            panic!("expected a comparison");
        };
        assert_eq!(*op, BinaryOp::Gt);
    }

    #[test]
    fn test_operator_names_only_operators_by_position() {
        let parser = Parser::new();
        // "and" as a leading name is a path step, not an operator.
        let expr = parser.parse("and").expect("bare name is a path");
        assert_eq!(expr.to_string(), "and");

        let expr = parser.parse("a and b").expect("infix and");
        let Expr::Binary { op, .. } = &expr else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::And);
    }

    #[test]
    fn test_parse_path_from_current() {
        let parser = Parser::new();
        let expr = parser.parse("current()/../plug-type").expect("path from call");
        let Expr::PathFrom { base, steps } = &expr else {
            panic!("expected a continued path");
        };
        assert_eq!(
            **base,
            Expr::Call {
                function: Function::Current,
                args: Vec::new()
            }
        );
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_unknown_function_is_parse_error() {
        let parser = Parser::new();
        assert!(matches!(
            parser.parse("starts-with(a, 'b')"),
            Err(ParseError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_parse_errors() {
        let parser = Parser::new();
        assert!(matches!(
            parser.parse("'unterminated"),
            Err(ParseError::UnterminatedLiteral { .. })
        ));
        assert!(matches!(
            parser.parse("1 +"),
            Err(ParseError::UnexpectedEof { .. })
        ));
        assert!(matches!(
            parser.parse("a[b"),
            Err(ParseError::MissingDelimiter { delimiter: ']', .. })
        ));
        assert!(matches!(
            parser.parse("1 2"),
            Err(ParseError::TrailingInput { .. })
        ));
    }

    #[test]
    fn test_depth_limit_enforced() {
        let parser = Parser::with_limits(5, 10_000);
        let deep = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(matches!(
            parser.parse(&deep),
            Err(ParseError::TooDeep { .. })
        ));
    }

    #[test]
    fn test_parse_leafref_target_path() {
        let parser = Parser::new();
        let path = parser
            .parse_path("/sys:system/sys:interface/sys:name")
            .expect("absolute leafref path");
        assert!(path.absolute);
        assert_eq!(path.steps.len(), 3);
    }
}
