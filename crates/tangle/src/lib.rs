//! Generalized parsing over composable grammar patterns.
//!
//! Grammars are assembled with a [`GrammarBuilder`], compiled once into an
//! immutable [`Grammar`] and then used to [recognize](Grammar::recognize) or
//! [parse](Grammar::parse) token sequences. Any context-free grammar is
//! accepted, including left recursion and ambiguity, plus conjunction and
//! lookahead guards. A successful parse yields the ordered marks of its
//! unique derivation.

pub mod analysis;
pub mod builder;
pub mod dsl;
pub mod error;
pub mod fixpoint;
pub mod grammar;
pub mod guard;
pub mod parser;
pub mod pattern;
pub mod prec;
pub mod token;

pub use builder::GrammarBuilder;
pub use error::{GrammarError, ParseError};
pub use grammar::{Grammar, RuleHandle, Target};
pub use guard::Guard;
pub use parser::{Parse, ParseOptions, Parser};
pub use pattern::{Node, PatternKind};
pub use prec::PrecHandle;
pub use token::TokenSet;

pub use tangle_runtime::{
    cursor, AmbiguousMarks, Context, CursorError, Mark, MarkCursor, MarkList, Token,
};
