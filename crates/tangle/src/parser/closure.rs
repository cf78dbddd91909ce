use std::collections::hash_map::Entry;

use cranelift_entity::EntityRef;
use tangle_runtime::{Context, Mark, Token};

use crate::{
    grammar::{RuleHandle, RuleKind, Target},
    pattern::{Node, PatternKind},
};

use super::{Active, Caller, Parser, Work};

impl Parser<'_> {
    /// Runs everything that happens at the current offset before `token` is
    /// consumed, then consumes it. `None` is the end of input.
    pub(super) fn step(&mut self, token: Option<Token>) {
        self.started.clear();
        self.entered.clear();
        self.completed.clear();
        self.rendezvous.clear();

        let mut work = std::mem::take(&mut self.pending);
        while let Some(item) = work.pop() {
            self.process(item, token, &mut work);
        }
        self.pending = work;

        log::trace!(
            "offset {}: {} active terminals, {} rule calls",
            self.offset,
            self.frontier.len(),
            self.callers.len()
        );

        let Some(token) = token else {
            self.frontier.clear();
            return;
        };

        let grammar = self.grammar;
        for active in self.frontier.drain(..) {
            let PatternKind::Terminal(set) = grammar.pattern(active.node) else {
                unreachable!("Only terminals wait for tokens");
            };
            if set.contains(token) {
                self.pending.push(Work::Follow {
                    node: active.node,
                    rule_offset: active.rule_offset,
                    context: active.context,
                });
            }
        }

        if self.pending.is_empty() {
            log::debug!("no parse can consume token {token} at offset {}", self.offset);
            self.failed = Some(self.offset);
        }
        self.offset += 1;
    }

    fn process(&mut self, item: Work, token: Option<Token>, work: &mut Vec<Work>) {
        let grammar = self.grammar;
        match item {
            Work::Start => {
                let start = grammar.start();
                self.call_body(start, work);
                if grammar.is_nullable(start) {
                    self.accept(Context::EMPTY, token);
                }
            }
            Work::Enter {
                node,
                rule_offset,
                context,
            } => self.enter(node, rule_offset, context, work),
            Work::Follow {
                node,
                rule_offset,
                context,
            } => {
                for &target in grammar.transitions(node) {
                    match target {
                        Target::Node(next) => work.push(Work::Enter {
                            node: next,
                            rule_offset,
                            context,
                        }),
                        Target::Return(rule) => work.push(Work::Complete {
                            rule,
                            rule_offset,
                            context,
                        }),
                        Target::Accept => self.accept(context, token),
                    }
                }
            }
            Work::Complete {
                rule,
                rule_offset,
                context,
            } => self.complete(rule, rule_offset, context, token, work),
        }
    }

    fn enter(&mut self, node: Node, rule_offset: u32, context: Context, work: &mut Vec<Work>) {
        let context = match self.entered.entry((node, rule_offset)) {
            Entry::Occupied(entry) => {
                self.marks.merge(*entry.get(), context);
                return;
            }
            Entry::Vacant(entry) => *entry.insert(self.marks.branch(context)),
        };

        let grammar = self.grammar;
        match grammar.pattern(node) {
            PatternKind::Terminal(_) => self.frontier.push(Active {
                node,
                rule_offset,
                context,
            }),
            PatternKind::Marker(name) => {
                let context = match self.marks.is_enabled() {
                    true => self.marks.push(context, Mark::new(name.clone(), self.offset)),
                    false => context,
                };
                work.push(Work::Follow {
                    node,
                    rule_offset,
                    context,
                });
            }
            &PatternKind::Call(rule) => {
                let caller = Caller {
                    site: node,
                    rule_offset,
                    context,
                };
                match self.tail_callers(caller) {
                    Some(forwarded) => {
                        for caller in forwarded {
                            self.call(rule, caller, work);
                        }
                    }
                    None => self.call(rule, caller, work),
                }
            }
            PatternKind::Conjunction(..) => {
                let Some((left, right)) = grammar.conjunction_rules(node) else {
                    unreachable!("Conjunction without synthetic rules");
                };
                let caller = Caller {
                    site: node,
                    rule_offset,
                    context,
                };
                self.call(left, caller, work);
                self.call(right, caller, work);
            }
            _ => unreachable!("Only terminal nodes are entered"),
        }
    }

    fn call(&mut self, rule: RuleHandle, caller: Caller, work: &mut Vec<Work>) {
        self.callers
            .entry((rule, self.offset))
            .or_default()
            .push(caller);
        // the rule already finished over an empty span at this offset
        if let Some(&result) = self.completed.get(&(rule, self.offset)) {
            self.resume(rule, self.offset, caller, result, work);
        }
        self.call_body(rule, work);
    }

    /// The callers of the enclosing rule, when `caller` sits in tail position
    /// of a rule that started before the current offset. Their list is final
    /// by now, so the callee returns to them directly and the enclosing rule
    /// never completes.
    fn tail_callers(&mut self, caller: Caller) -> Option<Vec<Caller>> {
        let grammar = self.grammar;
        if caller.rule_offset == self.offset || !grammar.is_tail_call(caller.site) {
            return None;
        }
        let owner = grammar.owner(caller.site)?;
        let outer = self
            .callers
            .get(&(owner, caller.rule_offset))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut forwarded = Vec::with_capacity(outer.len());
        for outer in outer {
            forwarded.push(Caller {
                site: outer.site,
                rule_offset: outer.rule_offset,
                context: self.marks.concat(outer.context, caller.context),
            });
        }
        Some(forwarded)
    }

    /// Starts `rule` at the current offset, once.
    fn call_body(&mut self, rule: RuleHandle, work: &mut Vec<Work>) {
        if !self.started.insert(rule.index()) {
            return;
        }
        for &node in self.grammar.first(rule) {
            work.push(Work::Enter {
                node,
                rule_offset: self.offset,
                context: Context::EMPTY,
            });
        }
        if self.grammar.completes_empty(rule) {
            work.push(Work::Complete {
                rule,
                rule_offset: self.offset,
                context: Context::EMPTY,
            });
        }
    }

    fn complete(
        &mut self,
        rule: RuleHandle,
        rule_offset: u32,
        context: Context,
        token: Option<Token>,
        work: &mut Vec<Work>,
    ) {
        let grammar = self.grammar;
        let data = grammar.rule(rule);
        if let Some(guard) = &data.guard {
            if !guard.allows(token) {
                log::trace!(
                    "guard of `{}` rejected {rule_offset}..{}",
                    data.name,
                    self.offset
                );
                return;
            }
        }

        let key = (rule, rule_offset);
        let result = match self.completed.entry(key) {
            Entry::Occupied(entry) => {
                self.marks.merge(*entry.get(), context);
                return;
            }
            Entry::Vacant(entry) => *entry.insert(self.marks.branch(context)),
        };

        let Some(callers) = self.callers.get_mut(&key).map(std::mem::take) else {
            return;
        };
        for &caller in &callers {
            self.resume(rule, rule_offset, caller, result, work);
        }
        self.callers.insert(key, callers);
    }

    /// Hands a completion of `rule` over `rule_offset..offset` to one caller.
    fn resume(
        &mut self,
        rule: RuleHandle,
        rule_offset: u32,
        caller: Caller,
        result: Context,
        work: &mut Vec<Work>,
    ) {
        let inner = match self.grammar.rule(rule).kind {
            RuleKind::Named | RuleKind::Start => Some(result),
            RuleKind::ConjLeft(_) => {
                let meet = self
                    .rendezvous
                    .entry((caller.site, caller.rule_offset, rule_offset))
                    .or_default();
                meet.left = Some(result);
                meet.right.then_some(result)
            }
            RuleKind::ConjRight(_) => {
                let meet = self
                    .rendezvous
                    .entry((caller.site, caller.rule_offset, rule_offset))
                    .or_default();
                meet.right = true;
                meet.left
            }
        };
        if let Some(inner) = inner {
            work.push(Work::Follow {
                node: caller.site,
                rule_offset: caller.rule_offset,
                context: self.marks.concat(caller.context, inner),
            });
        }
    }

    fn accept(&mut self, context: Context, token: Option<Token>) {
        if token.is_some() {
            return;
        }
        match self.accepted {
            Some(accepted) => self.marks.merge(accepted, context),
            None => self.accepted = Some(self.marks.branch(context)),
        }
    }
}
