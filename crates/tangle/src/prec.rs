//! Precedence rule families.
//!
//! `prec_rule("expr")` stands for a chain of rules, one per registered
//! level. Level `n` matches its own alternatives or anything of the next
//! registered level, so higher levels bind tighter. `prec_call(expr, n)`
//! calls the lowest registered level at or above `n`.

use std::{collections::BTreeMap, sync::Arc};

use cranelift_entity::entity_impl;

use crate::{
    builder::{BodyThunk, GrammarBuilder},
    error::GrammarError,
    grammar::RuleHandle,
    pattern::{Node, PatternKind},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrecHandle(u32);
entity_impl!(PrecHandle, "prec");

pub(crate) struct PrecTable {
    name: Arc<str>,
    levels: BTreeMap<u32, PrecLevel>,
}

struct PrecLevel {
    rule: RuleHandle,
    alternatives: Vec<BodyThunk>,
}

impl GrammarBuilder {
    pub fn prec_rule(&mut self, name: impl Into<Arc<str>>) -> PrecHandle {
        self.precs.push(PrecTable {
            name: name.into(),
            levels: BTreeMap::new(),
        })
    }

    /// Adds an alternative at `level`, returning the rule of that level.
    pub fn prec_add(
        &mut self,
        prec: PrecHandle,
        level: u32,
        alternative: impl FnOnce(&mut GrammarBuilder) -> Node + 'static,
    ) -> RuleHandle {
        let existing = self.precs[prec].levels.get(&level).map(|l| l.rule);
        let rule = match existing {
            Some(rule) => rule,
            None => {
                let name = format!("{}^{level}", self.precs[prec].name);
                let rule = self.declare(name);
                self.precs[prec].levels.insert(
                    level,
                    PrecLevel {
                        rule,
                        alternatives: Vec::new(),
                    },
                );
                rule
            }
        };
        if let Some(entry) = self.precs[prec].levels.get_mut(&level) {
            entry.alternatives.push(Box::new(alternative));
        }
        rule
    }

    /// Calls the lowest level of `prec` that is at least `level`.
    pub fn prec_call(&mut self, prec: PrecHandle, level: u32) -> Node {
        self.patterns.push(PatternKind::UnresolvedPrec(prec, level))
    }

    pub(crate) fn build_precedence(&mut self) {
        let handles: Vec<PrecHandle> = self.precs.keys().collect();
        for prec in handles {
            let mut levels: Vec<(RuleHandle, Vec<BodyThunk>)> = self.precs[prec]
                .levels
                .values_mut()
                .map(|level| (level.rule, std::mem::take(&mut level.alternatives)))
                .collect();
            let next_rules: Vec<Option<RuleHandle>> = levels
                .iter()
                .skip(1)
                .map(|(rule, _)| Some(*rule))
                .chain([None])
                .collect();

            for ((rule, alternatives), next) in levels.drain(..).zip(next_rules) {
                let mut body = None;
                for alternative in alternatives {
                    let node = alternative(self);
                    body = Some(match body {
                        Some(prev) => self.alt(prev, node),
                        None => node,
                    });
                }
                if let Some(next) = next {
                    let call = self.call(next);
                    body = Some(match body {
                        Some(prev) => self.alt(prev, call),
                        None => call,
                    });
                }
                if let Some(body) = body {
                    self.set_body(rule, body);
                }
            }
        }
    }

    pub(crate) fn resolve_precedence(&mut self) {
        let unresolved: Vec<(Node, PrecHandle, u32)> = self
            .patterns
            .iter()
            .filter_map(|(node, kind)| match *kind {
                PatternKind::UnresolvedPrec(prec, level) => Some((node, prec, level)),
                _ => None,
            })
            .collect();

        for (node, prec, level) in unresolved {
            let table = &self.precs[prec];
            match table.levels.range(level..).next() {
                Some((_, found)) => {
                    let rule = found.rule;
                    self.patterns.set_kind(node, PatternKind::Call(rule));
                }
                None => {
                    let rule = table.name.to_string();
                    self.err
                        .error(GrammarError::UnknownPrecedence { rule, level });
                }
            }
        }
    }
}
