// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Traversal-root expressions.
//!
//! A small subset of JSONPath decides which part of a document gets
//! flattened:
//!
//! - `$` is the document root, and must always come first.
//! - `.name` or `["name"]` selects an object field.
//! - `[N]` selects an array element.
//! - `.*` or `[*]` selects every child of an object or array.
//! - `..*` selects every descendant of the current selection. It can only
//!   appear at the very end of an expression.
//!
//! Quoted field names follow JSON string syntax, so `["say \"hi\""]` is the
//! field `say "hi"`. This is also exactly the syntax of the paths that the
//! flattener produces, which allows a full path to be fed back in as an
//! expression.

use crate::flatten::{children, Segment};

use serde_json::Value;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    num::ParseIntError,
    str::FromStr,
};

/// Parsed traversal-root expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    steps: Vec<Step>,
    descendants: bool,
}

impl Selector {
    /// Selector ends with a descendant wildcard.
    pub fn is_descendants(&self) -> bool {
        self.descendants
    }

    /// Selector names at most one node, i.e., it has no wildcards.
    pub fn is_exact(&self) -> bool {
        !self.descendants && !self.steps.iter().any(|step| matches!(step, Step::Children))
    }

    /// Match nodes of document, along with the path leading to each of them.
    pub(crate) fn select<'v>(&self, document: &'v Value) -> Vec<(Vec<Segment>, &'v Value)> {
        let mut matched = vec![(Vec::new(), document)];
        for step in &self.steps {
            matched = matched
                .into_iter()
                .flat_map(|(path, value)| step.apply(&path, value))
                .collect();
        }

        matched
    }
}

impl Default for Selector {
    /// Every node except the root.
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            descendants: true,
        }
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(expr.trim());
        if parser.peek() != Some(b'$') {
            return Err(SelectorError::MissingRoot);
        }
        parser.pos += 1;

        let mut steps = Vec::new();
        let mut descendants = false;
        while let Some(byte) = parser.peek() {
            // INVARIANT: Descendant wildcard must terminate the expression.
            if descendants {
                return Err(SelectorError::TrailingDescendants);
            }

            match byte {
                b'.' if parser.rest().starts_with("..") => {
                    parser.pos += 2;
                    parser.expect(b'*')?;
                    descendants = true;
                }
                b'.' => {
                    parser.pos += 1;
                    steps.push(parser.dotted()?);
                }
                b'[' => {
                    parser.pos += 1;
                    steps.push(parser.bracketed()?);
                }
                _ => return Err(parser.unexpected()),
            }
        }

        Ok(Self { steps, descendants })
    }
}

impl Display for Selector {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str("$")?;
        for step in &self.steps {
            match step {
                Step::Field(name) => write!(fmt, "{}", Segment::Field(name.clone()))?,
                Step::Index(index) => write!(fmt, "[{index}]")?,
                Step::Children => fmt.write_str("[*]")?,
            }
        }

        if self.descendants {
            fmt.write_str("..*")?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Step {
    Field(String),
    Index(usize),
    Children,
}

impl Step {
    fn apply<'v>(&self, path: &[Segment], value: &'v Value) -> Vec<(Vec<Segment>, &'v Value)> {
        let extend = |segment: Segment| {
            let mut next = path.to_vec();
            next.push(segment);
            next
        };

        match (self, value) {
            (Self::Field(name), Value::Object(map)) => map
                .get(name)
                .map(|child| (extend(Segment::Field(name.clone())), child))
                .into_iter()
                .collect(),
            (Self::Index(index), Value::Array(items)) => items
                .get(*index)
                .map(|child| (extend(Segment::Index(*index)), child))
                .into_iter()
                .collect(),
            (Self::Children, value) => children(value)
                .into_iter()
                .map(|(segment, child)| (extend(segment), child))
                .collect(),
            _ => Vec::new(),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() != Some(byte) {
            return Err(self.unexpected());
        }
        self.pos += 1;

        Ok(())
    }

    fn unexpected(&self) -> SelectorError {
        match self.rest().chars().next() {
            Some(found) => SelectorError::UnexpectedChar {
                found,
                offset: self.pos,
            },
            None => SelectorError::UnexpectedEnd,
        }
    }

    fn dotted(&mut self) -> Result<Step> {
        let rest = self.rest();
        let end = rest.find(['.', '[']).unwrap_or(rest.len());
        if end == 0 {
            return Err(self.unexpected());
        }
        self.pos += end;

        match &rest[..end] {
            "*" => Ok(Step::Children),
            name => Ok(Step::Field(name.to_owned())),
        }
    }

    fn bracketed(&mut self) -> Result<Step> {
        let step = match self.peek() {
            Some(b'*') => {
                self.pos += 1;
                Step::Children
            }
            Some(b'"') => Step::Field(self.quoted()?),
            Some(byte) if byte.is_ascii_digit() => {
                let rest = self.rest();
                let end = rest
                    .find(|ch: char| !ch.is_ascii_digit())
                    .unwrap_or(rest.len());
                let index = rest[..end].parse().map_err(SelectorError::Index)?;
                self.pos += end;
                Step::Index(index)
            }
            _ => return Err(self.unexpected()),
        };
        self.expect(b']')?;

        Ok(step)
    }

    fn quoted(&mut self) -> Result<String> {
        let rest = self.rest();
        let mut escaped = false;
        for (offset, byte) in rest.bytes().enumerate().skip(1) {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => {
                    let name = serde_json::from_str::<String>(&rest[..=offset])
                        .map_err(SelectorError::FieldName)?;
                    self.pos += offset + 1;
                    return Ok(name);
                }
                _ => {}
            }
        }

        Err(SelectorError::UnexpectedEnd)
    }
}

/// Traversal-root expression parsing error types.
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    /// Expression does not start at the document root.
    #[error("expression must start with '$'")]
    MissingRoot,

    /// Unexpected character found while parsing.
    #[error("unexpected {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    /// Expression ends too early.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// Descendant wildcard is followed by more steps.
    #[error("'..*' must be the last step of an expression")]
    TrailingDescendants,

    /// Array index is out of range for this platform.
    #[error("invalid array index")]
    Index(#[source] ParseIntError),

    /// Quoted field name is not a valid JSON string.
    #[error("invalid quoted field name")]
    FieldName(#[source] serde_json::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SelectorError> = std::result::Result<T, E>;
