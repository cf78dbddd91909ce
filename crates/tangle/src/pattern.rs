use std::{collections::HashMap, ops::Index, sync::Arc};

use cranelift_entity::{entity_impl, EntitySet, PrimaryMap};

use crate::{grammar::RuleHandle, prec::PrecHandle, token::TokenSet};

/// A position in the grammar. Every use of a pattern in a composite gets its
/// own node, so nodes double as identities for the transition table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node(u32);
entity_impl!(Node, "node");

#[derive(Clone, Debug)]
pub enum PatternKind {
    Terminal(TokenSet),
    /// Zero-width, records its name and the current offset.
    Marker(Arc<str>),
    Epsilon,
    Sequence(Node, Node),
    Alternation(Node, Node),
    /// Both sides must match the same span.
    Conjunction(Node, Node),
    /// One or more repetitions.
    Repeat(Node),
    Call(RuleHandle),
    /// Call of a precedence level, turned into a `Call` once all levels are known.
    UnresolvedPrec(PrecHandle, u32),
}

impl PatternKind {
    pub fn children(&self) -> impl Iterator<Item = Node> {
        let (a, b) = match *self {
            PatternKind::Sequence(a, b)
            | PatternKind::Alternation(a, b)
            | PatternKind::Conjunction(a, b) => (Some(a), Some(b)),
            PatternKind::Repeat(a) => (Some(a), None),
            _ => (None, None),
        };
        a.into_iter().chain(b)
    }

    fn map_children(&self, mut f: impl FnMut(Node) -> Node) -> PatternKind {
        match self {
            PatternKind::Sequence(a, b) => PatternKind::Sequence(f(*a), f(*b)),
            PatternKind::Alternation(a, b) => PatternKind::Alternation(f(*a), f(*b)),
            PatternKind::Conjunction(a, b) => PatternKind::Conjunction(f(*a), f(*b)),
            PatternKind::Repeat(a) => PatternKind::Repeat(f(*a)),
            other => other.clone(),
        }
    }
}

/// Arena of pattern nodes.
///
/// Children are always pushed before their parents, so arena order is a
/// valid post-order for bottom-up passes.
#[derive(Clone, Debug, Default)]
pub struct Patterns {
    nodes: PrimaryMap<Node, PatternKind>,
    consumed: EntitySet<Node>,
}

impl Patterns {
    pub fn new() -> Patterns {
        Self::default()
    }
    pub fn push(&mut self, kind: PatternKind) -> Node {
        self.nodes.push(kind)
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
    pub fn get(&self, node: Node) -> Option<&PatternKind> {
        self.nodes.get(node)
    }
    pub fn iter(&self) -> impl Iterator<Item = (Node, &PatternKind)> {
        self.nodes.iter()
    }
    pub(crate) fn set_kind(&mut self, node: Node, kind: PatternKind) {
        debug_assert!(self.nodes[node].children().next().is_none());
        debug_assert!(kind.children().next().is_none());
        self.nodes[node] = kind;
    }

    /// Claims `node` for a position. A node that already has a position is
    /// copied so that the two uses stay distinguishable.
    pub fn consume(&mut self, node: Node) -> Node {
        let node = match self.consumed.contains(node) {
            true => self.deep_copy(node),
            false => node,
        };
        self.consumed.insert(node);
        node
    }

    /// Nodes of the tree under `root`, children before parents.
    pub fn subtree(&self, root: Node) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.nodes[node].children());
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    fn deep_copy(&mut self, root: Node) -> Node {
        let mut copies: HashMap<Node, Node> = HashMap::new();
        for node in self.subtree(root) {
            let kind = self.nodes[node].map_children(|child| copies[&child]);
            let copy = self.nodes.push(kind);
            self.consumed.insert(copy);
            copies.insert(node, copy);
        }
        copies[&root]
    }

    /// Operands of a chain of binary nodes of the same kind, left to right.
    fn chain(&self, node: Node, split: fn(&PatternKind) -> Option<(Node, Node)>) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            match split(&self.nodes[node]) {
                Some((a, b)) => {
                    stack.push(b);
                    stack.push(a);
                }
                None => out.push(node),
            }
        }
        out
    }

    pub fn display_into(
        &self,
        buf: &mut dyn std::fmt::Write,
        node: Node,
        rule_name: &dyn Fn(RuleHandle) -> String,
    ) -> std::fmt::Result {
        match &self.nodes[node] {
            PatternKind::Terminal(set) => write!(buf, "{set}"),
            PatternKind::Marker(name) => write!(buf, "${name}"),
            PatternKind::Epsilon => write!(buf, "eps"),
            PatternKind::Sequence(..) => {
                let items = self.chain(node, |kind| match *kind {
                    PatternKind::Sequence(a, b) => Some((a, b)),
                    _ => None,
                });
                for (i, &item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(buf, " ")?;
                    }
                    self.display_into(buf, item, rule_name)?;
                }
                Ok(())
            }
            PatternKind::Alternation(..) => {
                let items = self.chain(node, |kind| match *kind {
                    PatternKind::Alternation(a, b) => Some((a, b)),
                    _ => None,
                });
                write!(buf, "(")?;
                for (i, &item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(buf, " | ")?;
                    }
                    self.display_into(buf, item, rule_name)?;
                }
                write!(buf, ")")
            }
            PatternKind::Conjunction(a, b) => {
                write!(buf, "(")?;
                self.display_into(buf, *a, rule_name)?;
                write!(buf, " & ")?;
                self.display_into(buf, *b, rule_name)?;
                write!(buf, ")")
            }
            PatternKind::Repeat(a) => {
                write!(buf, "(")?;
                self.display_into(buf, *a, rule_name)?;
                write!(buf, ")+")
            }
            PatternKind::Call(rule) => write!(buf, "{}", rule_name(*rule)),
            PatternKind::UnresolvedPrec(_, level) => write!(buf, "<prec {level}>"),
        }
    }

    pub fn render(&self, node: Node) -> String {
        let mut buf = String::new();
        // writing into a String cannot fail
        let _ = self.display_into(&mut buf, node, &|rule| format!("{rule}"));
        buf
    }
}

impl Index<Node> for Patterns {
    type Output = PatternKind;

    fn index(&self, node: Node) -> &PatternKind {
        &self.nodes[node]
    }
}

#[test]
fn test_consume_copies_reused_nodes() {
    let mut patterns = Patterns::new();
    let a = patterns.push(PatternKind::Terminal(TokenSet::exact('a')));
    let b = patterns.push(PatternKind::Terminal(TokenSet::exact('b')));
    let ab = patterns.push(PatternKind::Sequence(a, b));

    let first = patterns.consume(ab);
    assert_eq!(first, ab);

    let second = patterns.consume(ab);
    assert_ne!(second, ab);
    let PatternKind::Sequence(a2, b2) = patterns[second] else {
        panic!("copy changed the pattern shape");
    };
    assert!(a2 != a && b2 != b);
    assert!(a2 < second && b2 < second);
    assert!(matches!(&patterns[a2], PatternKind::Terminal(set) if set.contains('a' as u32)));

    // copies are claimed as soon as they are made
    let third = patterns.consume(second);
    assert_ne!(third, second);
    assert_eq!(patterns.render(third), "'a' 'b'");
}

#[test]
fn test_deep_chains() {
    let mut patterns = Patterns::new();
    let mut seq = patterns.push(PatternKind::Terminal(TokenSet::exact('a')));
    for _ in 0..50_000 {
        let next = patterns.push(PatternKind::Terminal(TokenSet::exact('a')));
        seq = patterns.push(PatternKind::Sequence(seq, next));
    }
    assert_eq!(patterns.subtree(seq).len(), 100_001);

    let first = patterns.consume(seq);
    let copy = patterns.consume(first);
    assert_eq!(patterns.len(), 200_002);
    assert_eq!(patterns.render(copy).len(), 50_001 * 4 - 1);
}

#[test]
fn test_node_formatting() {
    use cranelift_entity::EntityRef;

    let node = Node::new(3);
    assert_eq!(format!("{node} {node:?}"), "node3 node3");
}
