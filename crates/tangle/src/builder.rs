use std::sync::Arc;

use cranelift_entity::{EntityRef, EntitySet, PrimaryMap};
use tangle_runtime::Token;

use crate::{
    error::{ErrorAccumulator, GrammarError},
    grammar::{Grammar, Rule, RuleHandle, RuleKind},
    guard::Guard,
    pattern::{Node, PatternKind, Patterns},
    prec::{PrecHandle, PrecTable},
    token::TokenSet,
};

pub(crate) type BodyThunk = Box<dyn FnOnce(&mut GrammarBuilder) -> Node>;

/// Assembles patterns and rules, then compiles them with [`GrammarBuilder::build`].
///
/// Every pattern constructor returns a [`Node`]. Passing a node to a
/// composite claims it; passing the same node again claims a fresh copy, so a
/// pattern can be reused freely. Rule bodies are given as closures that run
/// once during `build`, which lets rules refer to rules declared later.
#[derive(Default)]
pub struct GrammarBuilder {
    pub(crate) patterns: Patterns,
    pub(crate) rules: PrimaryMap<RuleHandle, Rule>,
    pub(crate) precs: PrimaryMap<PrecHandle, PrecTable>,
    pub(crate) err: ErrorAccumulator,
    pending: Vec<(RuleHandle, BodyThunk)>,
    defined: EntitySet<RuleHandle>,
}

impl GrammarBuilder {
    pub fn new() -> GrammarBuilder {
        Self::default()
    }

    pub fn terminal(&mut self, set: TokenSet) -> Node {
        self.patterns.push(PatternKind::Terminal(set))
    }
    pub fn token(&mut self, token: impl Into<Token>) -> Node {
        self.terminal(TokenSet::exact(token))
    }
    pub fn any(&mut self) -> Node {
        self.terminal(TokenSet::any())
    }
    pub fn less(&mut self, token: impl Into<Token>) -> Node {
        self.terminal(TokenSet::less(token))
    }
    pub fn greater(&mut self, token: impl Into<Token>) -> Node {
        self.terminal(TokenSet::greater(token))
    }
    pub fn eps(&mut self) -> Node {
        self.patterns.push(PatternKind::Epsilon)
    }
    pub fn mark(&mut self, name: impl Into<Arc<str>>) -> Node {
        self.patterns.push(PatternKind::Marker(name.into()))
    }

    pub fn seq(&mut self, a: Node, b: Node) -> Node {
        let a = self.patterns.consume(a);
        let b = self.patterns.consume(b);
        self.patterns.push(PatternKind::Sequence(a, b))
    }
    pub fn alt(&mut self, a: Node, b: Node) -> Node {
        let a = self.patterns.consume(a);
        let b = self.patterns.consume(b);
        self.patterns.push(PatternKind::Alternation(a, b))
    }
    pub fn conj(&mut self, a: Node, b: Node) -> Node {
        let a = self.patterns.consume(a);
        let b = self.patterns.consume(b);
        self.patterns.push(PatternKind::Conjunction(a, b))
    }
    /// One or more repetitions.
    pub fn plus(&mut self, a: Node) -> Node {
        let a = self.patterns.consume(a);
        self.patterns.push(PatternKind::Repeat(a))
    }
    pub fn call(&mut self, rule: RuleHandle) -> Node {
        self.patterns.push(PatternKind::Call(rule))
    }

    pub fn declare(&mut self, name: impl Into<Arc<str>>) -> RuleHandle {
        self.rules.push(Rule::new(name.into(), RuleKind::Named))
    }

    pub fn define(
        &mut self,
        rule: RuleHandle,
        body: impl FnOnce(&mut GrammarBuilder) -> Node + 'static,
    ) {
        let Some(data) = self.rules.get(rule) else {
            self.err.error(GrammarError::ForeignRule {
                index: rule.index(),
            });
            return;
        };
        if !self.defined.insert(rule) {
            let rule = data.name.to_string();
            self.err.error(GrammarError::DuplicateDefinition { rule });
            return;
        }
        self.pending.push((rule, Box::new(body)));
    }

    /// Declares and defines a rule. The body closure receives the rule's own
    /// handle for self-reference.
    pub fn rule(
        &mut self,
        name: impl Into<Arc<str>>,
        body: impl FnOnce(&mut GrammarBuilder, RuleHandle) -> Node + 'static,
    ) -> RuleHandle {
        let rule = self.declare(name);
        self.define(rule, move |g| body(g, rule));
        rule
    }

    /// Lets `guard` veto completions of `rule` based on the next token.
    pub fn guard(&mut self, rule: RuleHandle, guard: Guard) -> RuleHandle {
        match self.rules.get_mut(rule) {
            Some(data) => data.guard = Some(guard),
            None => self.err.error(GrammarError::ForeignRule {
                index: rule.index(),
            }),
        }
        rule
    }

    pub fn rule_name(&self, rule: RuleHandle) -> Option<&str> {
        self.rules.get(rule).map(|r| &*r.name)
    }

    pub(crate) fn render(&self, node: Node) -> String {
        let mut buf = String::new();
        let name = |rule: RuleHandle| {
            self.rule_name(rule)
                .map_or_else(|| format!("{rule}"), str::to_owned)
        };
        // writing into a String cannot fail
        let _ = self.patterns.display_into(&mut buf, node, &name);
        buf
    }

    fn run_pending(&mut self) {
        while !self.pending.is_empty() {
            for (rule, body) in std::mem::take(&mut self.pending) {
                let body = body(self);
                self.set_body(rule, body);
            }
        }
    }

    pub(crate) fn set_body(&mut self, rule: RuleHandle, body: Node) {
        let body = self.patterns.consume(body);
        self.rules[rule].body = Some(body);
    }

    /// Runs all rule bodies and compiles the grammar starting at `start`.
    pub fn build(mut self, start: Node) -> Result<Grammar, GrammarError> {
        self.run_pending();
        self.build_precedence();
        self.run_pending();
        self.resolve_precedence();

        let GrammarBuilder {
            patterns,
            rules,
            err,
            ..
        } = self;
        err.finish()?;

        Grammar::compile(patterns, rules, start)
    }
}

#[test]
fn test_duplicate_definition() {
    let mut g = GrammarBuilder::new();
    let r = g.declare("r");
    g.define(r, |g| g.token('a'));
    g.define(r, |g| g.token('b'));
    let start = g.call(r);
    assert_eq!(
        g.build(start).err(),
        Some(GrammarError::DuplicateDefinition { rule: "r".into() })
    );
}

#[test]
fn test_forward_reference() {
    let mut g = GrammarBuilder::new();
    let later = g.declare("later");
    let first = g.rule("first", move |g, _| {
        let a = g.token('a');
        let rest = g.call(later);
        g.seq(a, rest)
    });
    g.define(later, |g| g.token('b'));
    let start = g.call(first);
    let grammar = g.build(start).unwrap();
    assert!(grammar.rule(later).body.is_some());
    assert!(grammar.recognize_str("ab"));
}
