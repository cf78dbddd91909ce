//! Derived pattern constructors built from the core ones.

use std::sync::Arc;

use tangle_runtime::Token;

use crate::{
    builder::GrammarBuilder, error::GrammarError, pattern::Node, pattern::PatternKind,
    token::TokenSet,
};

impl GrammarBuilder {
    /// Zero or one.
    pub fn maybe(&mut self, a: Node) -> Node {
        let empty = self.eps();
        self.alt(a, empty)
    }
    /// Zero or more.
    pub fn star(&mut self, a: Node) -> Node {
        let plus = self.plus(a);
        self.maybe(plus)
    }

    /// Sequence of all `nodes`, epsilon when there are none.
    pub fn seq_all(&mut self, nodes: impl IntoIterator<Item = Node>) -> Node {
        let mut iter = nodes.into_iter();
        let Some(mut acc) = iter.next() else {
            return self.eps();
        };
        for node in iter {
            acc = self.seq(acc, node);
        }
        acc
    }
    /// Alternation of all `nodes`, matching nothing when there are none.
    pub fn alt_all(&mut self, nodes: impl IntoIterator<Item = Node>) -> Node {
        let mut iter = nodes.into_iter();
        let Some(mut acc) = iter.next() else {
            return self.terminal(TokenSet::empty());
        };
        for node in iter {
            acc = self.alt(acc, node);
        }
        acc
    }

    /// The code points of `text` in order.
    pub fn string(&mut self, text: &str) -> Node {
        let tokens: Vec<Node> = text.chars().map(|c| self.token(c)).collect();
        self.seq_all(tokens)
    }
    pub fn bytes(&mut self, text: &[u8]) -> Node {
        let tokens: Vec<Node> = text.iter().map(|&b| self.token(b)).collect();
        self.seq_all(tokens)
    }

    /// Any single token in `start..=end`.
    pub fn range(&mut self, start: impl Into<Token>, end: impl Into<Token>) -> Node {
        let (start, end) = (start.into(), end.into());
        if end < start {
            self.err.error(GrammarError::InvalidRange { start, end });
        }
        self.terminal(TokenSet::range(start, end))
    }

    /// Any single token not matched by `pattern`, which must be a terminal
    /// or an alternation of terminals.
    pub fn inv(&mut self, pattern: Node) -> Node {
        match self.token_class(pattern) {
            Some(set) => self.terminal(set.complement()),
            None => {
                let pattern = self.render(pattern);
                self.err
                    .error(GrammarError::UnsupportedInversion { pattern });
                self.terminal(TokenSet::empty())
            }
        }
    }

    fn token_class(&self, node: Node) -> Option<TokenSet> {
        let mut set = TokenSet::empty();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            match &self.patterns[node] {
                PatternKind::Terminal(class) => set = set.union(class),
                &PatternKind::Alternation(a, b) => stack.extend([a, b]),
                _ => return None,
            }
        }
        Some(set)
    }

    /// `$name pattern`
    pub fn marked(&mut self, name: impl Into<Arc<str>>, pattern: Node) -> Node {
        let mark = self.mark(name);
        self.seq(mark, pattern)
    }

    /// One or more `item`s separated by `sep`.
    pub fn sep_by1(&mut self, item: Node, sep: Node) -> Node {
        let tail = self.seq(sep, item);
        let tail = self.star(tail);
        self.seq(item, tail)
    }
    /// Zero or more `item`s separated by `sep`.
    pub fn sep_by(&mut self, item: Node, sep: Node) -> Node {
        let list = self.sep_by1(item, sep);
        self.maybe(list)
    }
    /// One or more `item`s, each followed by `sep`.
    pub fn end_by1(&mut self, item: Node, sep: Node) -> Node {
        let pair = self.seq(item, sep);
        self.plus(pair)
    }
    /// Zero or more `item`s, each followed by `sep`.
    pub fn end_by(&mut self, item: Node, sep: Node) -> Node {
        let list = self.end_by1(item, sep);
        self.maybe(list)
    }
}
