#![allow(dead_code)]

use tangle::{Grammar, GrammarBuilder, Mark, RuleHandle};

pub fn init_logger() {
    // several tests share one process, only the first install wins
    let _ = simplelog::TestLogger::init(simplelog::LevelFilter::Debug, simplelog::Config::default());
}

pub fn marks(grammar: &Grammar, input: &str) -> Vec<Mark> {
    grammar
        .parse_str(input)
        .unwrap_or_else(|err| panic!("{input:?}: {err}"))
        .marks()
        .unwrap_or_else(|err| panic!("{input:?}: {err}"))
}

/// Left recursive arithmetic with explicit layering.
///
/// ```text
/// add  = $add add "+" mul | mul
/// mul  = $mul mul "*" base | base
/// base = $n "n"
/// ```
pub fn layered_expr() -> Grammar {
    let mut g = GrammarBuilder::new();
    let add = g.declare("add");
    let mul = g.declare("mul");
    let base = g.rule("base", |g, _| {
        let n = g.token('n');
        g.marked("n", n)
    });
    g.define(add, move |g| binary(g, "add", add, '+', mul));
    g.define(mul, move |g| binary(g, "mul", mul, '*', base));
    let start = g.call(add);
    g.build(start).unwrap()
}

fn binary(
    g: &mut GrammarBuilder,
    name: &str,
    this: RuleHandle,
    op: char,
    next: RuleHandle,
) -> tangle::Node {
    let lhs = g.call(this);
    let op = g.token(op);
    let rhs = g.call(next);
    let node = g.seq_all([lhs, op, rhs]);
    let node = g.marked(name, node);
    let fallback = g.call(next);
    g.alt(node, fallback)
}

/// Arithmetic through a precedence family, `^` is right associative.
pub fn prec_expr() -> Grammar {
    let mut g = GrammarBuilder::new();
    let expr = g.prec_rule("expr");

    for (level, op, name) in [(1, '+', "add"), (1, '-', "sub"), (2, '*', "mul"), (2, '/', "div")] {
        g.prec_add(expr, level, move |g| {
            let lhs = g.prec_call(expr, level);
            let op = g.token(op);
            let rhs = g.prec_call(expr, level + 1);
            let node = g.seq_all([lhs, op, rhs]);
            g.marked(name, node)
        });
    }
    g.prec_add(expr, 3, move |g| {
        let lhs = g.prec_call(expr, 4);
        let op = g.token('^');
        let rhs = g.prec_call(expr, 3);
        let node = g.seq_all([lhs, op, rhs]);
        g.marked("pow", node)
    });
    g.prec_add(expr, 9, |g| {
        let n = g.token('n');
        g.marked("n", n)
    });
    g.prec_add(expr, 9, move |g| {
        let open = g.token('(');
        let inner = g.prec_call(expr, 0);
        let close = g.token(')');
        g.seq_all([open, inner, close])
    });

    let start = g.prec_call(expr, 0);
    g.build(start).unwrap()
}

/// `a^n b^n`, used on its own and inside conjunctions.
pub fn balanced(g: &mut GrammarBuilder, name: &str, a: char, b: char) -> RuleHandle {
    g.rule(name, move |g, this| {
        let a = g.token(a);
        let inner = g.call(this);
        let inner = g.maybe(inner);
        let b = g.token(b);
        g.seq_all([a, inner, b])
    })
}
