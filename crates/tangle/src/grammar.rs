use std::{fmt::Display, sync::Arc};

use cranelift_entity::{entity_impl, EntityRef, EntitySet, PrimaryMap, SecondaryMap};

use crate::{
    analysis::{static_rule, Analysis, NodeInfo},
    error::GrammarError,
    fixpoint::Fixpoint,
    guard::Guard,
    pattern::{Node, PatternKind, Patterns},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleHandle(u32);
entity_impl!(RuleHandle, "rule");

impl RuleHandle {
    pub fn name(self, grammar: &Grammar) -> &str {
        &grammar.rule(self).name
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RuleKind {
    Named,
    /// Wraps the start pattern, completing it means accepting the input.
    Start,
    /// One side of a conjunction node.
    ConjLeft(Node),
    ConjRight(Node),
}

#[derive(Clone, Debug)]
pub struct Rule {
    pub name: Arc<str>,
    pub kind: RuleKind,
    pub body: Option<Node>,
    pub guard: Option<Guard>,
}

impl Rule {
    pub fn new(name: Arc<str>, kind: RuleKind) -> Rule {
        Rule {
            name,
            kind,
            body: None,
            guard: None,
        }
    }
    fn with_body(mut self, body: Node) -> Rule {
        self.body = Some(body);
        self
    }
}

/// Where the parser goes after matching a terminal node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Target {
    Node(Node),
    /// The rule owning the node is complete.
    Return(RuleHandle),
    /// The start pattern is complete.
    Accept,
}

/// A compiled grammar. Immutable, and safe to share between threads.
pub struct Grammar {
    patterns: Patterns,
    rules: PrimaryMap<RuleHandle, Rule>,
    start: RuleHandle,
    reachable: Vec<RuleHandle>,
    analysis: Analysis,
    owner: SecondaryMap<Node, Option<RuleHandle>>,
    conjunctions: SecondaryMap<Node, Option<(RuleHandle, RuleHandle)>>,
    transitions: SecondaryMap<Node, Vec<Target>>,
    tail_calls: EntitySet<Node>,
}

impl Grammar {
    pub(crate) fn compile(
        mut patterns: Patterns,
        mut rules: PrimaryMap<RuleHandle, Rule>,
        start: Node,
    ) -> Result<Grammar, GrammarError> {
        let body = patterns.consume(start);
        let start = rules.push(Rule::new("<start>".into(), RuleKind::Start).with_body(body));

        let mut owner = SecondaryMap::new();
        let mut conjunctions = SecondaryMap::new();
        let reachable =
            collect_reachable(&patterns, &mut rules, start, &mut owner, &mut conjunctions)?;

        let analysis = Analysis::new(&patterns, &rules, &reachable, &owner);
        // callers of an offending rule are flagged too, report the one found last
        if let Some(&rule) = analysis
            .zero_width_marks(&patterns, &rules, &reachable)
            .last()
        {
            return Err(GrammarError::ZeroWidthMark {
                rule: rules[rule].name.to_string(),
            });
        }

        let transitions = build_transitions(&patterns, &rules, &reachable, start, &owner, &analysis);
        let tail_calls = find_tail_calls(&patterns, &rules, &owner, &transitions);

        let grammar = Grammar {
            patterns,
            rules,
            start,
            reachable,
            analysis,
            owner,
            conjunctions,
            transitions,
            tail_calls,
        };

        log::debug!(
            "compiled grammar: {} reachable rules ({} nullable), {} transitions",
            grammar.reachable.len(),
            grammar
                .reachable
                .iter()
                .filter(|&&r| grammar.is_nullable(r))
                .count(),
            grammar.transitions.values().map(Vec::len).sum::<usize>()
        );
        log::trace!("{}", grammar.display());

        Ok(grammar)
    }

    pub fn start(&self) -> RuleHandle {
        self.start
    }
    pub fn rule(&self, handle: RuleHandle) -> &Rule {
        &self.rules[handle]
    }
    pub fn rules(&self) -> impl Iterator<Item = (RuleHandle, &Rule)> {
        self.rules.iter()
    }
    /// Rules the start pattern can reach, synthetic ones included. The start rule comes first.
    pub fn reachable(&self) -> &[RuleHandle] {
        &self.reachable
    }
    pub fn find_rule(&self, name: &str) -> Option<RuleHandle> {
        self.rules
            .iter()
            .find(|(_, rule)| &*rule.name == name)
            .map(|(handle, _)| handle)
    }

    pub fn patterns(&self) -> &Patterns {
        &self.patterns
    }
    pub fn pattern(&self, node: Node) -> &PatternKind {
        &self.patterns[node]
    }
    pub fn info(&self, node: Node) -> &NodeInfo {
        &self.analysis.nodes[node]
    }
    /// The rule whose body contains `node`, for nodes reachable from the start.
    pub fn owner(&self, node: Node) -> Option<RuleHandle> {
        self.owner[node]
    }

    pub fn is_nullable(&self, rule: RuleHandle) -> bool {
        self.analysis.nullable[rule]
    }
    /// Whether `rule` can only ever match the empty span. Not needed for
    /// parsing, so it is computed on each call.
    pub fn is_static(&self, rule: RuleHandle) -> bool {
        let mut fix = Fixpoint::new(false);
        fix.calculate(rule, &mut |fix, rule| {
            static_rule(&self.patterns, &self.rules, rule, fix)
        })
    }
    /// A guarded rule that can match the empty span. The parser completes it
    /// at its start offset so the guard can veto the empty match.
    pub fn completes_empty(&self, rule: RuleHandle) -> bool {
        self.rules[rule].guard.is_some() && self.analysis.nullable[rule]
    }
    /// A call whose return also completes the calling rule, so the callee can
    /// report directly to the callers of that rule.
    pub fn is_tail_call(&self, node: Node) -> bool {
        self.tail_calls.contains(node)
    }
    /// Entry nodes of a rule's body.
    pub fn first(&self, rule: RuleHandle) -> &[Node] {
        match self.rules[rule].body {
            Some(body) => &self.analysis.nodes[body].first,
            None => &[],
        }
    }
    pub fn transitions(&self, node: Node) -> &[Target] {
        &self.transitions[node]
    }
    /// The synthetic left and right rules of a conjunction node.
    pub fn conjunction_rules(&self, node: Node) -> Option<(RuleHandle, RuleHandle)> {
        self.conjunctions[node]
    }

    fn render_rule(&self, rule: RuleHandle) -> String {
        self.rules
            .get(rule)
            .map_or_else(|| format!("{rule}"), |r| r.name.to_string())
    }

    fn display_node_label(&self, buf: &mut dyn std::fmt::Write, node: Node) -> std::fmt::Result {
        match &self.patterns[node] {
            PatternKind::Conjunction(..) => write!(buf, "&"),
            _ => self
                .patterns
                .display_into(buf, node, &|rule| self.render_rule(rule)),
        }
    }

    pub fn display_into(&self, buf: &mut dyn std::fmt::Write) -> std::fmt::Result {
        for &rule in &self.reachable {
            let data = &self.rules[rule];
            write!(buf, "{}", data.name)?;
            if self.is_nullable(rule) {
                write!(buf, "?")?;
            }
            write!(buf, " = ")?;
            if let Some(body) = data.body {
                self.patterns
                    .display_into(buf, body, &|rule| self.render_rule(rule))?;
            }
            writeln!(buf)?;
        }

        for (node, targets) in self.transitions.iter() {
            if targets.is_empty() {
                continue;
            }
            write!(buf, "\n{node} ")?;
            self.display_node_label(buf, node)?;
            write!(buf, " ->")?;
            for target in targets {
                match *target {
                    Target::Node(next) => {
                        write!(buf, " {next}(")?;
                        self.display_node_label(buf, next)?;
                        write!(buf, ")")?;
                    }
                    Target::Return(rule) => write!(buf, " return {}", self.render_rule(rule))?,
                    Target::Accept => write!(buf, " accept")?,
                }
            }
        }
        writeln!(buf)
    }

    pub fn display(&self) -> GrammarDisplay<'_> {
        GrammarDisplay(self)
    }
}

#[derive(Clone, Copy)]
pub struct GrammarDisplay<'a>(&'a Grammar);
impl Display for GrammarDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.display_into(f)
    }
}

/// Walks rule bodies from the start rule, recording which rule owns each node
/// and giving each conjunction node its pair of synthetic rules.
fn collect_reachable(
    patterns: &Patterns,
    rules: &mut PrimaryMap<RuleHandle, Rule>,
    start: RuleHandle,
    owner: &mut SecondaryMap<Node, Option<RuleHandle>>,
    conjunctions: &mut SecondaryMap<Node, Option<(RuleHandle, RuleHandle)>>,
) -> Result<Vec<RuleHandle>, GrammarError> {
    let mut reachable = vec![start];
    let mut seen = EntitySet::new();
    seen.insert(start);

    let mut stack = Vec::new();
    let mut next = 0;
    while let Some(&rule) = reachable.get(next) {
        next += 1;

        let Some(body) = rules[rule].body else {
            return Err(GrammarError::UndefinedRule {
                rule: rules[rule].name.to_string(),
            });
        };

        stack.push(body);
        while let Some(node) = stack.pop() {
            owner[node] = Some(rule);
            match &patterns[node] {
                &PatternKind::Call(callee) => {
                    if rules.get(callee).is_none() {
                        return Err(GrammarError::ForeignRule {
                            index: callee.index(),
                        });
                    }
                    if seen.insert(callee) {
                        reachable.push(callee);
                    }
                }
                &PatternKind::Conjunction(left, right) => {
                    let name = rules[rule].name.clone();
                    let left = rules.push(
                        Rule::new(format!("{name}&left").into(), RuleKind::ConjLeft(node))
                            .with_body(left),
                    );
                    let right = rules.push(
                        Rule::new(format!("{name}&right").into(), RuleKind::ConjRight(node))
                            .with_body(right),
                    );
                    conjunctions[node] = Some((left, right));
                    seen.insert(left);
                    seen.insert(right);
                    reachable.push(left);
                    reachable.push(right);
                }
                kind => stack.extend(kind.children()),
            }
        }
    }

    Ok(reachable)
}

fn add_edge(transitions: &mut SecondaryMap<Node, Vec<Target>>, from: Node, target: Target) {
    let edges = &mut transitions[from];
    if !edges.contains(&target) {
        edges.push(target);
    }
}

fn build_transitions(
    patterns: &Patterns,
    rules: &PrimaryMap<RuleHandle, Rule>,
    reachable: &[RuleHandle],
    start: RuleHandle,
    owner: &SecondaryMap<Node, Option<RuleHandle>>,
    analysis: &Analysis,
) -> SecondaryMap<Node, Vec<Target>> {
    let mut transitions = SecondaryMap::new();

    // every adjacent pair inside sequences and repetitions
    for (node, kind) in patterns.iter() {
        if owner[node].is_none() {
            continue;
        }
        let (before, after) = match *kind {
            PatternKind::Sequence(a, b) => (a, b),
            PatternKind::Repeat(a) => (a, a),
            _ => continue,
        };
        for &from in &analysis.nodes[before].last {
            for &to in &analysis.nodes[after].first {
                add_edge(&mut transitions, from, Target::Node(to));
            }
        }
    }

    for &rule in reachable {
        let Some(body) = rules[rule].body else {
            continue;
        };
        let target = match rule == start {
            true => Target::Accept,
            false => Target::Return(rule),
        };
        for &from in &analysis.nodes[body].last {
            add_edge(&mut transitions, from, target);
        }
    }

    transitions
}

fn find_tail_calls(
    patterns: &Patterns,
    rules: &PrimaryMap<RuleHandle, Rule>,
    owner: &SecondaryMap<Node, Option<RuleHandle>>,
    transitions: &SecondaryMap<Node, Vec<Target>>,
) -> EntitySet<Node> {
    let mut tail_calls = EntitySet::new();
    for (node, kind) in patterns.iter() {
        let (PatternKind::Call(_), Some(rule)) = (kind, owner[node]) else {
            continue;
        };
        // the completion of the calling rule must not be observable
        let data = &rules[rule];
        if data.kind != RuleKind::Named || data.guard.is_some() {
            continue;
        }
        if transitions[node] == [Target::Return(rule)] {
            tail_calls.insert(node);
        }
    }
    tail_calls
}
