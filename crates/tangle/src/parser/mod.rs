//! Online recognition and parsing.
//!
//! The parser keeps, for every offset, the set of terminal nodes that can
//! consume the next token, each tagged with the offset its enclosing rule
//! started at. Rule calls are shared per `(rule, start)` and rule completions
//! per `(rule, start, end)`, so the work per token is bounded by the grammar
//! size times the input length and left recursion needs no special handling.

mod closure;

use std::collections::HashMap;

use cranelift_bitset::CompoundBitSet;
use tangle_runtime::{AmbiguousMarks, Context, Mark, MarkList, Token};

use crate::{
    error::ParseError,
    grammar::{Grammar, RuleHandle},
    pattern::Node,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ParseOptions {
    /// Track marks. Without them a parse only answers yes or no.
    pub marks: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions { marks: true }
    }
}

impl ParseOptions {
    pub fn recognize() -> ParseOptions {
        ParseOptions { marks: false }
    }
}

/// A successful parse.
#[derive(Clone, Debug)]
pub struct Parse {
    marks: MarkList,
    root: Context,
    len: u32,
}

impl Parse {
    /// The marks of the unique derivation, in input order.
    pub fn marks(&self) -> Result<Vec<Mark>, AmbiguousMarks> {
        self.marks.flatten(self.root)
    }
    pub fn is_ambiguous(&self) -> bool {
        self.marks().is_err()
    }
    /// Number of tokens consumed.
    pub fn len(&self) -> u32 {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    pub fn mark_list(&self) -> &MarkList {
        &self.marks
    }
    pub fn context(&self) -> Context {
        self.root
    }
}

#[derive(Clone, Copy, Debug)]
enum Work {
    Start,
    Enter {
        node: Node,
        rule_offset: u32,
        context: Context,
    },
    Follow {
        node: Node,
        rule_offset: u32,
        context: Context,
    },
    Complete {
        rule: RuleHandle,
        rule_offset: u32,
        context: Context,
    },
}

/// A call site waiting for a rule to complete.
#[derive(Clone, Copy, Debug)]
struct Caller {
    site: Node,
    rule_offset: u32,
    context: Context,
}

/// A terminal waiting for the next token.
#[derive(Clone, Copy, Debug)]
struct Active {
    node: Node,
    rule_offset: u32,
    context: Context,
}

/// Completion state of one conjunction span. Both sides have to finish at
/// the same offset; only the left side's marks are kept.
#[derive(Clone, Copy, Default, Debug)]
struct Rendezvous {
    left: Option<Context>,
    right: bool,
}

/// Push-based parser, fed one token at a time.
pub struct Parser<'g> {
    grammar: &'g Grammar,
    marks: MarkList,
    offset: u32,
    pending: Vec<Work>,
    frontier: Vec<Active>,
    callers: HashMap<(RuleHandle, u32), Vec<Caller>>,
    // the following are only valid for the current offset
    started: CompoundBitSet,
    entered: HashMap<(Node, u32), Context>,
    completed: HashMap<(RuleHandle, u32), Context>,
    rendezvous: HashMap<(Node, u32, u32), Rendezvous>,
    accepted: Option<Context>,
    failed: Option<u32>,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g Grammar) -> Parser<'g> {
        Parser::with_options(grammar, ParseOptions::default())
    }

    pub fn with_options(grammar: &'g Grammar, options: ParseOptions) -> Parser<'g> {
        let marks = match options.marks {
            true => MarkList::new(),
            false => MarkList::disabled(),
        };
        Parser {
            grammar,
            marks,
            offset: 0,
            pending: vec![Work::Start],
            frontier: Vec::new(),
            callers: HashMap::new(),
            started: CompoundBitSet::new(),
            entered: HashMap::new(),
            completed: HashMap::new(),
            rendezvous: HashMap::new(),
            accepted: None,
            failed: None,
        }
    }

    /// Number of tokens consumed so far.
    pub fn offset(&self) -> u32 {
        self.offset
    }
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Consumes one token. Once a token is rejected every further call
    /// reports the same error.
    pub fn push(&mut self, token: impl Into<Token>) -> Result<(), ParseError> {
        if let Some(offset) = self.failed {
            return Err(ParseError::NoMatch { offset });
        }
        if self.offset == u32::MAX {
            return Err(ParseError::InputTooLong);
        }
        self.step(Some(token.into()));
        match self.failed {
            Some(offset) => Err(ParseError::NoMatch { offset }),
            None => Ok(()),
        }
    }

    /// Ends the input.
    pub fn finish(mut self) -> Result<Parse, ParseError> {
        if let Some(offset) = self.failed {
            return Err(ParseError::NoMatch { offset });
        }
        self.step(None);
        match self.accepted {
            Some(root) => Ok(Parse {
                marks: self.marks,
                root,
                len: self.offset,
            }),
            None => Err(ParseError::NoMatch {
                offset: self.offset,
            }),
        }
    }
}

impl Grammar {
    pub fn parse_with<I, T>(&self, input: I, options: ParseOptions) -> Result<Parse, ParseError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        let mut parser = Parser::with_options(self, options);
        for token in input {
            parser.push(token)?;
        }
        parser.finish()
    }

    pub fn parse<I, T>(&self, input: I) -> Result<Parse, ParseError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        self.parse_with(input, ParseOptions::default())
    }

    /// Whether the grammar matches the whole input. Never affected by ambiguity.
    pub fn recognize<I, T>(&self, input: I) -> bool
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        self.parse_with(input, ParseOptions::recognize()).is_ok()
    }

    pub fn parse_str(&self, input: &str) -> Result<Parse, ParseError> {
        self.parse(input.chars())
    }
    pub fn recognize_str(&self, input: &str) -> bool {
        self.recognize(input.chars())
    }
    pub fn parse_bytes(&self, input: &[u8]) -> Result<Parse, ParseError> {
        self.parse(input.iter().copied())
    }
    pub fn recognize_bytes(&self, input: &[u8]) -> bool {
        self.recognize(input.iter().copied())
    }
}
