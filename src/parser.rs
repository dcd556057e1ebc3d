use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_till1, take_while},
    multi::many0,
    sequence::{preceded, terminated},
};
use tracing::warn;

use crate::ast::Value;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConfig {
    /// Deepest list nesting accepted before failing with `TooDeeplyNested`
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

/// Any amount of (Unicode) whitespace
fn blank(input: &str) -> IResult<&str, &str> {
    take_while(char::is_whitespace)(input)
}

fn paren(input: &str) -> IResult<&str, &str> {
    alt((tag("("), tag(")")))(input)
}

/// Longest run of characters that are neither whitespace nor parentheses
fn atom_text(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace() || c == '(' || c == ')')(input)
}

fn token(input: &str) -> IResult<&str, &str> {
    preceded(blank, alt((paren, atom_text)))(input)
}

/// Split source text into parenthesis and atom tokens
///
/// Same result as padding every parenthesis with spaces and splitting on whitespace.
/// Never fails; unbalanced input is the reader's problem.
pub fn tokenize(input: &str) -> Vec<&str> {
    terminated(many0(token), blank)(input)
        .map(|(_, tokens)| tokens)
        .unwrap_or_default()
}

/// Classify an atom token: integer, then float, then symbol
pub fn parse_atom(token: &str) -> Value {
    if let Ok(n) = token.parse::<i64>() {
        Value::Integer(n)
    } else if let Ok(x) = token.parse::<f64>() {
        Value::Float(x)
    } else {
        Value::Symbol(token.to_owned())
    }
}

fn unexpected_eof() -> Error {
    ParseError::new(ParseErrorKind::Incomplete, "unexpected end of input").into()
}

/// Recursive-descent reader over a token slice
///
/// Tokens are consumed through a cursor; the slice itself is never modified, so the same
/// tokens can be read again by another reader.
pub struct Reader<'t, 'a> {
    tokens: &'t [&'a str],
    position: usize,
    max_depth: usize,
}

impl<'t, 'a> Reader<'t, 'a> {
    pub fn new(tokens: &'t [&'a str], config: &ParseConfig) -> Self {
        Reader {
            tokens,
            position: 0,
            max_depth: config.max_depth,
        }
    }

    /// Number of tokens not consumed yet
    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Read one complete expression
    pub fn read(&mut self) -> Result<Value, Error> {
        self.read_at(0)
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.position).copied()
    }

    fn next_token(&mut self) -> Option<&'a str> {
        let token = self.peek()?;
        self.position += 1;
        Some(token)
    }

    fn read_at(&mut self, depth: usize) -> Result<Value, Error> {
        match self.next_token().ok_or_else(unexpected_eof)? {
            "(" => {
                if depth >= self.max_depth {
                    return Err(ParseError::new(
                        ParseErrorKind::TooDeeplyNested,
                        format!("nesting exceeds maximum depth of {}", self.max_depth),
                    )
                    .into());
                }
                let mut elements = Vec::new();
                loop {
                    match self.peek() {
                        None => return Err(unexpected_eof()),
                        Some(")") => {
                            self.position += 1;
                            return Ok(Value::list(elements));
                        }
                        Some(_) => elements.push(self.read_at(depth + 1)?),
                    }
                }
            }
            ")" => Err(ParseError::new(ParseErrorKind::UnexpectedClose, "unexpected )").into()),
            text => Ok(parse_atom(text)),
        }
    }
}

/// Read the first expression of a line
///
/// Tokens after the first complete expression are dropped (with a warning), matching
/// the line-at-a-time reading loop. Use [`parse_all`] to read every form.
pub fn parse(input: &str) -> Result<Value, Error> {
    parse_with_config(input, &ParseConfig::default())
}

/// Same as [`parse`]
pub fn translate(line: &str) -> Result<Value, Error> {
    parse(line)
}

pub fn parse_with_config(input: &str, config: &ParseConfig) -> Result<Value, Error> {
    let tokens = tokenize(input);
    let mut reader = Reader::new(&tokens, config);
    let expr = reader.read()?;
    if !reader.is_exhausted() {
        warn!(
            dropped_tokens = reader.remaining(),
            "ignoring input after the first expression"
        );
    }
    Ok(expr)
}

/// Read every top-level expression in the input
pub fn parse_all(input: &str) -> Result<Vec<Value>, Error> {
    let tokens = tokenize(input);
    let mut reader = Reader::new(&tokens, &ParseConfig::default());
    let mut forms = Vec::new();
    while !reader.is_exhausted() {
        forms.push(reader.read()?);
    }
    Ok(forms)
}
