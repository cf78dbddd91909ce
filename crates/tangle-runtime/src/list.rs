//! Persistent list of marks with structural sharing.
//!
//! Lists are never mutated once built, except for branch nodes which gain
//! alternatives as the parser discovers more derivations of the same span.
//! Concatenation is constant time; flattening walks the structure once.

use std::fmt::Write;

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::Mark;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListNode(u32);
entity_impl!(ListNode, "list");

/// Handle to a list stored in a [`MarkList`]. The default value is the empty list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Context(Option<ListNode>);

impl Context {
    pub const EMPTY: Context = Context(None);

    pub fn is_empty(self) -> bool {
        self.0.is_none()
    }
    fn node(self) -> Option<ListNode> {
        self.0
    }
}

impl From<ListNode> for Context {
    fn from(value: ListNode) -> Self {
        Context(Some(value))
    }
}

#[derive(Clone, Debug)]
enum Entry {
    Push { parent: Context, mark: Mark },
    Concat { left: Context, right: Context },
    Branch { alternatives: Vec<Context> },
}

/// Flattening reached a span with more than one derivation.
#[derive(thiserror::Error, Clone, Copy, PartialEq, Eq, Debug)]
#[error("marks are ambiguous: a span has {alternatives} derivations")]
pub struct AmbiguousMarks {
    pub alternatives: usize,
}

/// Arena holding every list node created during one parse.
///
/// A disabled arena hands out [`Context::EMPTY`] for everything, which is how
/// recognition avoids paying for marks.
#[derive(Clone, Debug)]
pub struct MarkList {
    nodes: PrimaryMap<ListNode, Entry>,
    enabled: bool,
}

impl Default for MarkList {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkList {
    pub fn new() -> MarkList {
        MarkList {
            nodes: PrimaryMap::new(),
            enabled: true,
        }
    }
    pub fn disabled() -> MarkList {
        MarkList {
            nodes: PrimaryMap::new(),
            enabled: false,
        }
    }
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn push(&mut self, parent: Context, mark: Mark) -> Context {
        if !self.enabled {
            return Context::EMPTY;
        }
        self.nodes.push(Entry::Push { parent, mark }).into()
    }

    pub fn concat(&mut self, left: Context, right: Context) -> Context {
        if !self.enabled {
            return Context::EMPTY;
        }
        if left.is_empty() {
            return right;
        }
        if right.is_empty() {
            return left;
        }
        self.nodes.push(Entry::Concat { left, right }).into()
    }

    /// Starts a branch point with a single alternative, later ones are added by [`MarkList::merge`].
    pub fn branch(&mut self, first: Context) -> Context {
        if !self.enabled {
            return Context::EMPTY;
        }
        self.nodes
            .push(Entry::Branch {
                alternatives: vec![first],
            })
            .into()
    }

    /// Adds an alternative to a branch created by [`MarkList::branch`].
    pub fn merge(&mut self, branch: Context, alternative: Context) {
        let Some(node) = branch.node() else {
            return;
        };
        match &mut self.nodes[node] {
            Entry::Branch { alternatives } => {
                if !alternatives.contains(&alternative) {
                    alternatives.push(alternative);
                }
            }
            _ => unreachable!("Merging into a non-branch list node"),
        }
    }

    pub fn alternatives(&self, branch: Context) -> usize {
        match branch.node().map(|n| &self.nodes[n]) {
            Some(Entry::Branch { alternatives }) => alternatives.len(),
            _ => 1,
        }
    }

    /// Produces the marks of `context` in order, failing at the first branch
    /// with more than one alternative.
    pub fn flatten(&self, context: Context) -> Result<Vec<Mark>, AmbiguousMarks> {
        enum Visit<'a> {
            List(Context),
            Emit(&'a Mark),
        }

        let mut out = Vec::new();
        let mut stack = vec![Visit::List(context)];

        while let Some(visit) = stack.pop() {
            let node = match visit {
                Visit::Emit(mark) => {
                    out.push(mark.clone());
                    continue;
                }
                Visit::List(list) => match list.node() {
                    Some(node) => node,
                    None => continue,
                },
            };
            match &self.nodes[node] {
                Entry::Push { parent, mark } => {
                    stack.push(Visit::Emit(mark));
                    stack.push(Visit::List(*parent));
                }
                Entry::Concat { left, right } => {
                    stack.push(Visit::List(*right));
                    stack.push(Visit::List(*left));
                }
                Entry::Branch { alternatives } => match alternatives.as_slice() {
                    [only] => stack.push(Visit::List(*only)),
                    _ => {
                        return Err(AmbiguousMarks {
                            alternatives: alternatives.len(),
                        })
                    }
                },
            }
        }

        Ok(out)
    }

    /// Renders the list structure with alternatives written as `(a | b)`.
    pub fn display_into(&self, buf: &mut dyn Write, context: Context) -> std::fmt::Result {
        let mut on_path = Vec::new();
        self.display_node(buf, context, &mut on_path)
    }

    fn display_node(
        &self,
        buf: &mut dyn Write,
        context: Context,
        on_path: &mut Vec<ListNode>,
    ) -> std::fmt::Result {
        let Some(node) = context.node() else {
            return Ok(());
        };
        if on_path.contains(&node) {
            return write!(buf, "...");
        }
        on_path.push(node);
        match &self.nodes[node] {
            Entry::Push { parent, mark } => {
                self.display_node(buf, *parent, on_path)?;
                if !parent.is_empty() {
                    write!(buf, " ")?;
                }
                write!(buf, "{mark}")?;
            }
            Entry::Concat { left, right } => {
                self.display_node(buf, *left, on_path)?;
                write!(buf, " ")?;
                self.display_node(buf, *right, on_path)?;
            }
            Entry::Branch { alternatives } if alternatives.len() == 1 => {
                self.display_node(buf, alternatives[0], on_path)?;
            }
            Entry::Branch { alternatives } => {
                write!(buf, "(")?;
                for (i, alt) in alternatives.iter().enumerate() {
                    if i > 0 {
                        write!(buf, " | ")?;
                    }
                    self.display_node(buf, *alt, on_path)?;
                }
                write!(buf, ")")?;
            }
        }
        on_path.pop();
        Ok(())
    }

    pub fn display(&self, context: Context) -> ContextDisplay<'_> {
        ContextDisplay(self, context)
    }
}

#[derive(Clone, Copy)]
pub struct ContextDisplay<'a>(&'a MarkList, Context);
impl std::fmt::Display for ContextDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.display_into(f, self.1)
    }
}

#[test]
fn test_flatten_order() {
    let mut list = MarkList::new();
    let a = list.push(Context::EMPTY, Mark::new("a", 0));
    let ab = list.push(a, Mark::new("b", 1));
    let c = list.push(Context::EMPTY, Mark::new("c", 2));
    let d = list.push(c, Mark::new("d", 3));
    let joined = list.concat(ab, d);
    let branch = list.branch(joined);

    let marks = list.flatten(branch).unwrap();
    assert_eq!(marks, [("a", 0), ("b", 1), ("c", 2), ("d", 3)]);
    assert_eq!(list.display(branch).to_string(), "a@0 b@1 c@2 d@3");
}

#[test]
fn test_concat_empty() {
    let mut list = MarkList::new();
    let a = list.push(Context::EMPTY, Mark::new("a", 0));
    assert_eq!(list.concat(Context::EMPTY, a), a);
    assert_eq!(list.concat(a, Context::EMPTY), a);
    assert_eq!(list.len(), 1);
}

#[test]
fn test_sharing() {
    let mut list = MarkList::new();
    let base = list.push(Context::EMPTY, Mark::new("x", 0));
    let left = list.push(base, Mark::new("l", 1));
    let right = list.push(base, Mark::new("r", 1));

    assert_eq!(list.flatten(left).unwrap(), [("x", 0), ("l", 1)]);
    assert_eq!(list.flatten(right).unwrap(), [("x", 0), ("r", 1)]);
    assert_eq!(list.flatten(base).unwrap(), [("x", 0)]);
}

#[test]
fn test_ambiguous_branch() {
    let mut list = MarkList::new();
    let a = list.push(Context::EMPTY, Mark::new("a", 0));
    let b = list.push(Context::EMPTY, Mark::new("b", 0));
    let branch = list.branch(a);
    list.merge(branch, a);
    assert_eq!(list.alternatives(branch), 1);
    list.merge(branch, b);
    assert_eq!(list.alternatives(branch), 2);

    let tail = list.push(branch, Mark::new("t", 1));
    assert_eq!(
        list.flatten(tail),
        Err(AmbiguousMarks { alternatives: 2 })
    );
    assert_eq!(list.display(tail).to_string(), "(a@0 | b@0) t@1");
}

#[test]
fn test_cyclic_branch_terminates() {
    let mut list = MarkList::new();
    let a = list.push(Context::EMPTY, Mark::new("a", 0));
    let branch = list.branch(a);
    let looped = list.concat(branch, a);
    list.merge(branch, looped);

    assert!(list.flatten(branch).is_err());
    assert_eq!(list.display(branch).to_string(), "(a@0 | ... a@0)");
}

#[test]
fn test_disabled() {
    let mut list = MarkList::disabled();
    let a = list.push(Context::EMPTY, Mark::new("a", 0));
    let branch = list.branch(a);
    list.merge(branch, a);
    assert!(branch.is_empty());
    assert!(list.is_empty());
    assert!(list.flatten(branch).unwrap().is_empty());
}
