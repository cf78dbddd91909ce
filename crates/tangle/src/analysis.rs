use std::collections::HashMap;

use cranelift_entity::{PrimaryMap, SecondaryMap};

use crate::{
    fixpoint::Fixpoint,
    grammar::{Rule, RuleHandle},
    pattern::{Node, PatternKind, Patterns},
};

/// Static properties of a single pattern node.
#[derive(Clone, Debug, Default)]
pub struct NodeInfo {
    /// Can match the empty span without consulting a guard.
    pub nullable: bool,
    /// Terminal nodes that can begin a match, in a deterministic order.
    pub first: Vec<Node>,
    /// Terminal nodes that can end a match.
    pub last: Vec<Node>,
}

pub struct Analysis {
    /// Whether a rule's body can match the empty span. Calls of guarded
    /// rules count as non-nullable, their empty matches are completed at
    /// runtime so the guard gets to see the next token.
    pub nullable: SecondaryMap<RuleHandle, bool>,
    pub nodes: SecondaryMap<Node, NodeInfo>,
}

type Rules = PrimaryMap<RuleHandle, Rule>;

impl Analysis {
    /// Analyzes every node owned by one of the `reachable` rules.
    pub fn new(
        patterns: &Patterns,
        rules: &Rules,
        reachable: &[RuleHandle],
        owner: &SecondaryMap<Node, Option<RuleHandle>>,
    ) -> Analysis {
        let mut nullable = SecondaryMap::new();
        let mut fix = Fixpoint::new(false);
        for &rule in reachable {
            nullable[rule] = fix.calculate(rule, &mut |fix, rule| {
                nullable_rule(patterns, rules, rule, fix)
            });
        }

        let mut nodes: SecondaryMap<Node, NodeInfo> = SecondaryMap::new();
        for (node, kind) in patterns.iter() {
            if owner[node].is_none() {
                continue;
            }
            let info = match *kind {
                PatternKind::Terminal(_) | PatternKind::Marker(_) => NodeInfo::terminal(node, false),
                PatternKind::Call(rule) => {
                    NodeInfo::terminal(node, nullable[rule] && rules[rule].guard.is_none())
                }
                PatternKind::Conjunction(a, b) => {
                    NodeInfo::terminal(node, nodes[a].nullable && nodes[b].nullable)
                }
                PatternKind::Epsilon => NodeInfo {
                    nullable: true,
                    ..Default::default()
                },
                PatternKind::Sequence(a, b) => {
                    let (a, b) = (&nodes[a], &nodes[b]);
                    let mut first = a.first.clone();
                    if a.nullable {
                        union_into(&mut first, &b.first);
                    }
                    let mut last = b.last.clone();
                    if b.nullable {
                        union_into(&mut last, &a.last);
                    }
                    NodeInfo {
                        nullable: a.nullable && b.nullable,
                        first,
                        last,
                    }
                }
                PatternKind::Alternation(a, b) => {
                    let (a, b) = (&nodes[a], &nodes[b]);
                    let mut first = a.first.clone();
                    union_into(&mut first, &b.first);
                    let mut last = a.last.clone();
                    union_into(&mut last, &b.last);
                    NodeInfo {
                        nullable: a.nullable || b.nullable,
                        first,
                        last,
                    }
                }
                PatternKind::Repeat(a) => nodes[a].clone(),
                PatternKind::UnresolvedPrec(..) => unreachable!("Should have been resolved"),
            };
            nodes[node] = info;
        }

        Analysis { nullable, nodes }
    }

    /// Rules that can complete over an empty span while passing a marker.
    ///
    /// The parser steps over nullable parts through the transition table and
    /// never completes them, which would silently drop such marks.
    pub fn zero_width_marks(
        &self,
        patterns: &Patterns,
        rules: &Rules,
        reachable: &[RuleHandle],
    ) -> Vec<RuleHandle> {
        let mut fix = Fixpoint::new(false);
        reachable
            .iter()
            .copied()
            .filter(|&rule| {
                fix.calculate(rule, &mut |fix, rule| {
                    self.marks_empty_rule(patterns, rules, rule, fix)
                })
            })
            .collect()
    }

    fn marks_empty_rule(
        &self,
        patterns: &Patterns,
        rules: &Rules,
        rule: RuleHandle,
        fix: &mut Fixpoint<RuleHandle, bool>,
    ) -> bool {
        let Some(body) = rules[rule].body else {
            return false;
        };
        fold_body(patterns, body, |kind, value| match *kind {
            PatternKind::Marker(_) => true,
            // conjunction sides are rules of their own and checked as such
            PatternKind::Terminal(_)
            | PatternKind::Epsilon
            | PatternKind::Conjunction(..)
            | PatternKind::UnresolvedPrec(..) => false,
            PatternKind::Sequence(a, b) => {
                let (a_nullable, b_nullable) = (self.nodes[a].nullable, self.nodes[b].nullable);
                (value(a) && (b_nullable || value(b))) || (a_nullable && value(b))
            }
            PatternKind::Alternation(a, b) => value(a) || value(b),
            PatternKind::Repeat(a) => value(a),
            PatternKind::Call(callee) => {
                rules[callee].guard.is_none()
                    && fix.calculate(callee, &mut |fix, callee| {
                        self.marks_empty_rule(patterns, rules, callee, fix)
                    })
            }
        })
    }
}

impl NodeInfo {
    fn terminal(node: Node, nullable: bool) -> NodeInfo {
        NodeInfo {
            nullable,
            first: vec![node],
            last: vec![node],
        }
    }
}

fn union_into(set: &mut Vec<Node>, other: &[Node]) {
    for &node in other {
        if !set.contains(&node) {
            set.push(node);
        }
    }
}

/// Evaluates a boolean property over the tree under `body`, children first.
/// `eval` gets each node along with the values of its children.
fn fold_body<F>(patterns: &Patterns, body: Node, mut eval: F) -> bool
where
    F: FnMut(&PatternKind, &dyn Fn(Node) -> bool) -> bool,
{
    let mut values: HashMap<Node, bool> = HashMap::new();
    for node in patterns.subtree(body) {
        let value = eval(&patterns[node], &|child| values[&child]);
        values.insert(node, value);
    }
    values[&body]
}

fn nullable_rule(
    patterns: &Patterns,
    rules: &Rules,
    rule: RuleHandle,
    fix: &mut Fixpoint<RuleHandle, bool>,
) -> bool {
    let Some(body) = rules[rule].body else {
        return false;
    };
    fold_body(patterns, body, |kind, value| match *kind {
        PatternKind::Terminal(_) | PatternKind::Marker(_) | PatternKind::UnresolvedPrec(..) => false,
        PatternKind::Epsilon => true,
        PatternKind::Sequence(a, b) | PatternKind::Conjunction(a, b) => value(a) && value(b),
        PatternKind::Alternation(a, b) => value(a) || value(b),
        PatternKind::Repeat(a) => value(a),
        PatternKind::Call(callee) => {
            rules[callee].guard.is_none()
                && fix.calculate(callee, &mut |fix, callee| {
                    nullable_rule(patterns, rules, callee, fix)
                })
        }
    })
}

/// Whether `rule` can only ever match the empty span.
pub fn static_rule(
    patterns: &Patterns,
    rules: &Rules,
    rule: RuleHandle,
    fix: &mut Fixpoint<RuleHandle, bool>,
) -> bool {
    let Some(body) = rules[rule].body else {
        return false;
    };
    fold_body(patterns, body, |kind, value| match *kind {
        PatternKind::Terminal(_) | PatternKind::UnresolvedPrec(..) => false,
        PatternKind::Marker(_) | PatternKind::Epsilon => true,
        PatternKind::Sequence(a, b) | PatternKind::Alternation(a, b) => value(a) && value(b),
        PatternKind::Conjunction(a, b) => value(a) || value(b),
        PatternKind::Repeat(a) => value(a),
        PatternKind::Call(callee) => fix.calculate(callee, &mut |fix, callee| {
            static_rule(patterns, rules, callee, fix)
        }),
    })
}
