mod common;

use common::{balanced, init_logger, layered_expr, marks, prec_expr};
use tangle::{Grammar, GrammarBuilder, GrammarError, Guard, ParseError, Parser, TokenSet};

fn build(f: impl FnOnce(&mut GrammarBuilder) -> tangle::Node) -> Grammar {
    init_logger();
    let mut g = GrammarBuilder::new();
    let start = f(&mut g);
    g.build(start).unwrap()
}

fn build_err(f: impl FnOnce(&mut GrammarBuilder) -> tangle::Node) -> GrammarError {
    let mut g = GrammarBuilder::new();
    let start = f(&mut g);
    match g.build(start) {
        Ok(_) => panic!("grammar should have been rejected"),
        Err(err) => err,
    }
}

fn error_offset(grammar: &Grammar, input: &str) -> u32 {
    match grammar.parse_str(input) {
        Ok(_) => panic!("{input:?} should have been rejected"),
        Err(err) => err.offset().unwrap(),
    }
}

#[test]
fn test_paren() {
    // s = "(" s ")" | eps
    let grammar = build(|g| {
        let s = g.rule("s", |g, s| {
            let open = g.token('(');
            let inner = g.call(s);
            let close = g.token(')');
            let parens = g.seq_all([open, inner, close]);
            g.maybe(parens)
        });
        g.call(s)
    });

    for input in ["", "()", "(())", "((()))"] {
        assert!(grammar.recognize_str(input), "{input:?}");
    }
    for input in ["(", ")", ")(", "(()", "())"] {
        assert!(!grammar.recognize_str(input), "{input:?}");
    }
}

#[test]
fn test_left_recursion() {
    // s = s "1" | "1"
    let grammar = build(|g| {
        let s = g.rule("s", |g, s| {
            let lhs = g.call(s);
            let one = g.token('1');
            let rec = g.seq(lhs, one);
            let one = g.token('1');
            g.alt(rec, one)
        });
        g.call(s)
    });

    assert!(!grammar.recognize_str(""));
    for n in 1..40 {
        assert!(grammar.recognize_str(&"1".repeat(n)), "{n}");
    }
    assert!(!grammar.recognize_str("11a1"));
}

#[test]
fn test_long_right_recursion() {
    // s = "1" s | "1", deep enough that recursive completion would overflow
    let grammar = build(|g| {
        let s = g.rule("s", |g, s| {
            let one = g.token('1');
            let rest = g.call(s);
            let rest = g.maybe(rest);
            g.seq(one, rest)
        });
        g.call(s)
    });

    assert!(grammar.recognize_str(&"1".repeat(20_000)));
}

#[test]
fn test_empty_left_recursion() {
    // s = s "+" | eps
    let grammar = build(|g| {
        let s = g.rule("s", |g, s| {
            let lhs = g.call(s);
            let plus = g.token('+');
            let rec = g.seq(lhs, plus);
            g.maybe(rec)
        });
        g.call(s)
    });

    assert!(grammar.recognize_str(""));
    assert!(grammar.recognize_str("+"));
    assert!(grammar.recognize_str("++"));
    assert!(!grammar.recognize_str("++-"));
    assert_eq!(error_offset(&grammar, "++-"), 2);
}

#[test]
fn test_super_ambiguous() {
    // s = s s s | s s | "a"
    let grammar = build(|g| {
        let s = g.rule("s", |g, s| {
            let three = [g.call(s), g.call(s), g.call(s)];
            let three = g.seq_all(three);
            let two = [g.call(s), g.call(s)];
            let two = g.seq_all(two);
            let a = g.token('a');
            g.alt_all([three, two, a])
        });
        g.call(s)
    });

    for n in 1..=6 {
        assert!(grammar.recognize_str(&"a".repeat(n)), "{n}");
    }
    assert!(!grammar.recognize_str(""));

    let parse = grammar.parse_str("aaa").unwrap();
    assert!(parse.is_ambiguous());
    assert!(parse.marks().unwrap_err().alternatives > 1);

    // a single token has a single derivation
    assert!(grammar.parse_str("a").unwrap().marks().unwrap().is_empty());
}

#[test]
fn test_odd_repetition() {
    // s = "a" | "a" s "a"
    let grammar = build(|g| {
        let s = g.rule("s", |g, s| {
            let a = g.token('a');
            let outer = [g.token('a'), g.call(s), g.token('a')];
            let outer = g.seq_all(outer);
            g.alt(a, outer)
        });
        g.call(s)
    });

    for input in ["a", "aaa", "aaaaa"] {
        assert!(grammar.recognize_str(input), "{input:?}");
    }
    for input in ["", "aa", "aaaa"] {
        assert!(!grammar.recognize_str(input), "{input:?}");
    }
}

#[test]
fn test_layered_expression_marks() {
    let grammar = layered_expr();
    assert_eq!(marks(&grammar, "n"), [("n", 0)]);
    assert_eq!(marks(&grammar, "n+n"), [("add", 0), ("n", 0), ("n", 2)]);
    assert_eq!(
        marks(&grammar, "n+n*n"),
        [("add", 0), ("n", 0), ("mul", 2), ("n", 2), ("n", 4)]
    );
    assert_eq!(
        marks(&grammar, "n+n*n+n"),
        [
            ("add", 0),
            ("add", 0),
            ("n", 0),
            ("mul", 2),
            ("n", 2),
            ("n", 4),
            ("n", 6)
        ]
    );
    assert!(!grammar.recognize_str("n+"));
    assert!(!grammar.recognize_str("+n"));
}

#[test]
fn test_precedence_marks() {
    let grammar = prec_expr();
    assert_eq!(
        marks(&grammar, "n+n+n"),
        [("add", 0), ("add", 0), ("n", 0), ("n", 2), ("n", 4)]
    );
    assert_eq!(
        marks(&grammar, "n+n-n"),
        [("sub", 0), ("add", 0), ("n", 0), ("n", 2), ("n", 4)]
    );
    assert_eq!(
        marks(&grammar, "n^n^n"),
        [("pow", 0), ("n", 0), ("pow", 2), ("n", 2), ("n", 4)]
    );
    assert_eq!(
        marks(&grammar, "n*(n+n)"),
        [("mul", 0), ("n", 0), ("add", 3), ("n", 3), ("n", 5)]
    );
}

#[test]
fn test_error_offsets() {
    let grammar = prec_expr();
    assert_eq!(error_offset(&grammar, "n*n+n++n"), 6);
    assert_eq!(error_offset(&grammar, "n*n+n +n"), 5);
    assert_eq!(error_offset(&grammar, "n*n+n+"), 6);
    assert_eq!(error_offset(&grammar, "+"), 0);
    assert_eq!(error_offset(&grammar, ""), 0);
}

#[test]
fn test_comments() {
    // items = (comment | "x")*, comment = "#" !"\n"* "\n"
    let grammar = build(|g| {
        let comment = g.rule("comment", |g, _| {
            let hash = g.token('#');
            let newline = g.token('\n');
            let text = g.inv(newline);
            let text = g.star(text);
            let newline = g.token('\n');
            g.seq_all([hash, text, newline])
        });
        let comment = g.call(comment);
        let x = g.token('x');
        let item = g.alt(comment, x);
        g.star(item)
    });

    assert!(grammar.recognize_str("x#hello\nx"));
    assert!(grammar.recognize_str("#\n#two words\n"));
    assert!(!grammar.recognize_str("x#hello"));
    assert!(!grammar.recognize_str("x#hel\nlo\n"));
}

#[test]
fn test_ident_boundary_guard() {
    // ident = [a-z]+ guarded against running into another letter
    // start = ident " "* ident
    let grammar = build(|g| {
        let letters = TokenSet::range('a', 'z');
        let ident = g.rule("ident", |g, _| {
            let letter = g.range('a', 'z');
            g.plus(letter)
        });
        g.guard(ident, Guard::not_followed_by(letters));
        let first = g.call(ident);
        let space = g.token(' ');
        let spaces = g.star(space);
        let second = g.call(ident);
        g.seq_all([first, spaces, second])
    });

    assert!(!grammar.recognize_str("aa"));
    assert!(grammar.recognize_str("a a"));
    assert!(grammar.recognize_str("aabsdasd    asd"));
    assert!(!grammar.recognize_str("abc"));
}

#[test]
fn test_guard_on_nullable_rule() {
    // word = [a-z]* guarded against running into another letter
    // start = word "x"
    let grammar = build(|g| {
        let word = lower_word(g);
        let word = g.call(word);
        let x = g.token('x');
        g.seq(word, x)
    });

    // an empty word would be followed by the letter `x`
    assert!(!grammar.recognize_str("x"));
    assert!(!grammar.recognize_str("abx"));

    // start = word "1"
    let grammar = build(|g| {
        let word = lower_word(g);
        let word = g.call(word);
        let one = g.token('1');
        g.seq(word, one)
    });

    assert!(grammar.recognize_str("1"));
    assert!(grammar.recognize_str("ab1"));
    assert!(!grammar.recognize_str("a"));
    assert!(!grammar.recognize_str("a1a"));
}

fn lower_word(g: &mut GrammarBuilder) -> tangle::RuleHandle {
    let word = g.rule("word", |g, _| {
        let letter = g.range('a', 'z');
        g.star(letter)
    });
    g.guard(word, Guard::not_followed_by(TokenSet::range('a', 'z')))
}

#[test]
fn test_guarded_empty_rule_shared_by_call_sites() {
    // start = word "1" | word "2"
    let grammar = build(|g| {
        let word = lower_word(g);
        let first = [g.call(word), g.token('1')];
        let first = g.seq_all(first);
        let second = [g.call(word), g.token('2')];
        let second = g.seq_all(second);
        g.alt(first, second)
    });

    for input in ["1", "2", "ab2", "z1"] {
        assert!(grammar.recognize_str(input), "{input:?}");
    }
    for input in ["", "a", "12"] {
        assert!(!grammar.recognize_str(input), "{input:?}");
    }
}

#[test]
fn test_marks_around_guarded_empty_rule() {
    // start = $x word "1" $y
    let grammar = build(|g| {
        let word = lower_word(g);
        let parts = [g.mark("x"), g.call(word), g.token('1'), g.mark("y")];
        g.seq_all(parts)
    });

    assert_eq!(marks(&grammar, "1"), [("x", 0), ("y", 1)]);
    assert_eq!(marks(&grammar, "ab1"), [("x", 0), ("y", 3)]);
}

#[test]
fn test_guard_at_end_of_input() {
    // word = [a-z]+ only at the end of input
    // start = word | word ";" word
    let grammar = build(|g| {
        let word = g.rule("word", |g, _| {
            let letter = g.range('a', 'z');
            g.plus(letter)
        });
        g.guard(word, Guard::at_end());
        let single = g.call(word);
        let parts = [g.call(word), g.token(';'), g.call(word)];
        let pair = g.seq_all(parts);
        g.alt(single, pair)
    });

    assert!(grammar.recognize_str("ab"));
    assert!(!grammar.recognize_str("ab;cd"));
    assert!(!grammar.recognize_str("ab;"));

    // start = "x" digits_ahead [0-9]?, with digits_ahead = [a-z]*
    let grammar = build(|g| {
        let ahead = g.rule("digits_ahead", |g, _| {
            let letter = g.range('a', 'z');
            g.star(letter)
        });
        g.guard(ahead, Guard::followed_by(TokenSet::range('0', '9')));
        let parts = [g.token('x'), g.call(ahead)];
        let prefix = g.seq_all(parts);
        let digit = g.range('0', '9');
        let digit = g.maybe(digit);
        g.seq(prefix, digit)
    });

    assert!(grammar.recognize_str("x1"));
    assert!(grammar.recognize_str("xab1"));
    // the rule completes last, right before the end of input
    assert!(!grammar.recognize_str("x"));
    assert!(!grammar.recognize_str("xab"));
}

#[test]
fn test_long_literal() {
    let text = "a".repeat(20_000);
    let grammar = build(|g| {
        let literal = g.string(&text);
        // the second use copies the whole chain
        g.seq(literal, literal)
    });

    assert!(grammar.recognize_str(&text.repeat(2)));
    assert!(!grammar.recognize_str(&text));
    assert_eq!(error_offset(&grammar, &format!("{text}b")), 20_000);
}

#[test]
fn test_right_recursive_marks() {
    // list = $item "a" list?
    let grammar = build(|g| {
        let list = g.rule("list", |g, list| {
            let item = g.token('a');
            let item = g.marked("item", item);
            let rest = g.call(list);
            let rest = g.maybe(rest);
            g.seq(item, rest)
        });
        g.call(list)
    });

    assert_eq!(marks(&grammar, "a"), [("item", 0)]);
    assert_eq!(
        marks(&grammar, "aaa"),
        [("item", 0), ("item", 1), ("item", 2)]
    );

    let input = "a".repeat(5_000);
    let found = marks(&grammar, &input);
    assert_eq!(found.len(), 5_000);
    assert!(found.iter().enumerate().all(|(i, m)| *m == ("item", i as u32)));
}

#[test]
fn test_tail_call_inside_group() {
    // group = "(" items ")", items = "1" items?
    // start = group group
    let grammar = build(|g| {
        let items = g.rule("items", |g, items| {
            let one = g.token('1');
            let rest = g.call(items);
            let rest = g.maybe(rest);
            let one = g.marked("one", one);
            g.seq(one, rest)
        });
        let group = g.rule("group", move |g, _| {
            let parts = [g.token('('), g.call(items), g.token(')')];
            let body = g.seq_all(parts);
            g.marked("group", body)
        });
        let parts = [g.call(group), g.call(group)];
        g.seq_all(parts)
    });

    assert_eq!(
        marks(&grammar, "(11)(1)"),
        [("group", 0), ("one", 1), ("one", 2), ("group", 4), ("one", 5)]
    );
    assert!(!grammar.recognize_str("(11)"));
    assert!(!grammar.recognize_str("()(1)"));
    assert_eq!(error_offset(&grammar, "(11(1)"), 3);
}

#[test]
fn test_reused_pattern() {
    // foo = "a", main = foo foo foo
    let grammar = build(|g| {
        let foo = g.string("a");
        g.seq_all([foo, foo, foo])
    });

    assert!(grammar.recognize_str("aaa"));
    for input in ["", "a", "aa", "aaaa"] {
        assert!(!grammar.recognize_str(input), "{input:?}");
    }
}

#[test]
fn test_any_token() {
    // s = "a" any
    let grammar = build(|g| {
        let a = g.token('a');
        let any = g.any();
        g.seq(a, any)
    });

    assert!(grammar.recognize_str("ab"));
    assert!(grammar.recognize_str("aa"));
    assert!(!grammar.recognize_str("aaa"));
    assert!(!grammar.recognize_str("a"));
}

#[test]
fn test_nested_and_tail_calls() {
    // start = s | t
    // s = "s" b "a"?   b = "b"
    // t = "a" c "b"    c = "c" | "d" c
    let grammar = build(|g| {
        let b = g.rule("b", |g, _| g.token('b'));
        let s = g.rule("s", move |g, _| {
            let s = g.token('s');
            let b = g.call(b);
            let a = g.token('a');
            let a = g.maybe(a);
            g.seq_all([s, b, a])
        });
        let c = g.rule("c", |g, c| {
            let plain = g.token('c');
            let d = g.token('d');
            let rest = g.call(c);
            let nested = g.seq(d, rest);
            g.alt(plain, nested)
        });
        let t = g.rule("t", move |g, _| {
            let parts = [g.token('a'), g.call(c), g.token('b')];
            g.seq_all(parts)
        });
        let s = g.call(s);
        let t = g.call(t);
        g.alt(s, t)
    });

    for input in ["sba", "sb", "acb", "adcb", "addcb"] {
        assert!(grammar.recognize_str(input), "{input:?}");
    }
    for input in ["sa", "adb", "acbb"] {
        assert!(!grammar.recognize_str(input), "{input:?}");
    }
}

#[test]
fn test_rule_inside_sequence_start() {
    // start = "a" s "b", s = "1"
    let grammar = build(|g| {
        let s = g.rule("s", |g, _| g.token('1'));
        let parts = [g.token('a'), g.call(s), g.token('b')];
        g.seq_all(parts)
    });

    assert!(grammar.recognize_str("a1b"));
    assert!(!grammar.recognize_str("a1"));
}

#[test]
fn test_nested_rule_marks() {
    // rule   = $rule ident "=" pident
    // ident  = $ident [a-z]+ $end
    // pident = $pident ident
    let grammar = build(|g| {
        let ident = g.rule("ident", |g, _| {
            let start = g.mark("ident");
            let letter = g.range('a', 'z');
            let letters = g.plus(letter);
            let end = g.mark("end");
            g.seq_all([start, letters, end])
        });
        let pident = g.rule("pident", move |g, _| {
            let inner = g.call(ident);
            g.marked("pident", inner)
        });
        let rule = g.rule("rule", move |g, _| {
            let parts = [g.call(ident), g.token('='), g.call(pident)];
            let body = g.seq_all(parts);
            g.marked("rule", body)
        });
        g.call(rule)
    });

    assert_eq!(
        marks(&grammar, "a=b"),
        [
            ("rule", 0),
            ("ident", 0),
            ("end", 1),
            ("pident", 2),
            ("ident", 2),
            ("end", 3)
        ]
    );
    assert_eq!(
        marks(&grammar, "ab=cde"),
        [
            ("rule", 0),
            ("ident", 0),
            ("end", 2),
            ("pident", 3),
            ("ident", 3),
            ("end", 6)
        ]
    );
}

#[test]
fn test_marks_after_last_call() {
    // main = "b" a $done, a = "a"
    let grammar = build(|g| {
        let a = g.rule("a", |g, _| g.token('a'));
        let parts = [g.token('b'), g.call(a), g.mark("done")];
        g.seq_all(parts)
    });

    assert_eq!(marks(&grammar, "ba"), [("done", 2)]);
}

#[test]
fn test_conjunction_abc() {
    // s = ("a"+ b) & (a "c"+)
    // a = "a" a? "b", b = "b" b? "c"
    let grammar = build(|g| {
        let a = balanced(g, "a", 'a', 'b');
        let b = balanced(g, "b", 'b', 'c');
        let s = g.rule("s", move |g, _| {
            let a_plus = g.token('a');
            let a_plus = g.plus(a_plus);
            let b = g.call(b);
            let left = g.seq(a_plus, b);
            let a = g.call(a);
            let c_plus = g.token('c');
            let c_plus = g.plus(c_plus);
            let right = g.seq(a, c_plus);
            g.conj(left, right)
        });
        g.call(s)
    });

    for input in ["abc", "aabbcc", "aaabbbccc"] {
        assert!(grammar.recognize_str(input), "{input:?}");
    }
    for input in ["", "ab", "aabbc", "abbcc", "aabcc"] {
        assert!(!grammar.recognize_str(input), "{input:?}");
    }
}

#[test]
fn test_conjunction_keeps_left_marks() {
    // start = ($l "a"+ "b"+) & ($r ab), ab = "a" ab? "b"
    let grammar = build(|g| {
        let ab = balanced(g, "ab", 'a', 'b');
        let a = g.token('a');
        let a = g.plus(a);
        let b = g.token('b');
        let b = g.plus(b);
        let left = g.seq(a, b);
        let left = g.marked("l", left);
        let right = g.call(ab);
        let right = g.marked("r", right);
        g.conj(left, right)
    });

    assert_eq!(marks(&grammar, "aabb"), [("l", 0)]);
    assert!(grammar.recognize_str("ab"));
    assert!(!grammar.recognize_str("aab"));
    assert!(!grammar.recognize_str("abb"));
}

#[test]
fn test_conjunction_of_nullable_sides() {
    // start = "x" (("a"*) & ("a" | eps)) "y"
    let grammar = build(|g| {
        let a = g.token('a');
        let left = g.star(a);
        let a = g.token('a');
        let right = g.maybe(a);
        let both = g.conj(left, right);
        let parts = [g.token('x'), both, g.token('y')];
        g.seq_all(parts)
    });

    assert!(grammar.recognize_str("xy"));
    assert!(grammar.recognize_str("xay"));
    assert!(!grammar.recognize_str("xaay"));
}

#[test]
fn test_epsilon_start() {
    let grammar = build(|g| g.eps());
    assert!(grammar.recognize_str(""));
    assert_eq!(error_offset(&grammar, "a"), 0);
}

#[test]
fn test_zero_width_marks_are_rejected() {
    // m = $empty | $non_empty "a"
    let err = build_err(|g| {
        let m = g.rule("m", |g, _| {
            let empty = g.mark("empty");
            let a = g.token('a');
            let non_empty = g.marked("non_empty", a);
            g.alt(empty, non_empty)
        });
        g.call(m)
    });
    assert_eq!(err, GrammarError::ZeroWidthMark { rule: "m".into() });

    // m = $empty $empty
    let err = build_err(|g| {
        let m = g.rule("m", |g, _| {
            let a = g.mark("empty");
            let b = g.mark("empty");
            g.seq(a, b)
        });
        g.call(m)
    });
    assert_eq!(err, GrammarError::ZeroWidthMark { rule: "m".into() });

    // m = $empty+
    let err = build_err(|g| {
        let m = g.rule("m", |g, _| {
            let mark = g.mark("empty");
            g.plus(mark)
        });
        g.call(m)
    });
    assert_eq!(err, GrammarError::ZeroWidthMark { rule: "m".into() });

    // through a nullable call: m = $x n, n = eps
    let err = build_err(|g| {
        let n = g.rule("n", |g, _| g.eps());
        let m = g.rule("m", move |g, _| {
            let call = g.call(n);
            g.marked("x", call)
        });
        g.call(m)
    });
    assert_eq!(err, GrammarError::ZeroWidthMark { rule: "m".into() });
}

#[test]
fn test_final_mark_in_consuming_rule() {
    // ident = $ident fst rest* $end
    let grammar = build(|g| {
        let ident = g.rule("ident", |g, _| {
            let fst = g.range('a', 'z');
            let rest = g.range('0', '9');
            let rest = g.star(rest);
            let parts = [g.mark("ident"), fst, rest, g.mark("end")];
            g.seq_all(parts)
        });
        g.call(ident)
    });

    assert_eq!(marks(&grammar, "a12"), [("ident", 0), ("end", 3)]);
    assert_eq!(marks(&grammar, "b"), [("ident", 0), ("end", 1)]);
}

#[test]
fn test_push_parser() {
    let grammar = layered_expr();

    let mut parser = Parser::new(&grammar);
    for c in "n*n".chars() {
        parser.push(c).unwrap();
    }
    assert_eq!(parser.offset(), 3);
    let parse = parser.finish().unwrap();
    assert_eq!(parse.len(), 3);
    assert_eq!(parse.marks().unwrap(), [("mul", 0), ("n", 0), ("n", 2)]);

    let mut parser = Parser::new(&grammar);
    parser.push('n').unwrap();
    assert_eq!(parser.push('n'), Err(ParseError::NoMatch { offset: 1 }));
    assert!(parser.is_failed());
    assert_eq!(parser.push('+'), Err(ParseError::NoMatch { offset: 1 }));
    assert_eq!(parser.finish().err(), Some(ParseError::NoMatch { offset: 1 }));
}

#[test]
fn test_byte_input() {
    let grammar = build(|g| {
        let digit = g.range(b'0', b'9');
        let digits = g.plus(digit);
        g.marked("num", digits)
    });

    assert!(grammar.recognize_bytes(b"2024"));
    assert!(!grammar.recognize_bytes(b"20x4"));
    let parse = grammar.parse_bytes(b"42").unwrap();
    assert_eq!(parse.marks().unwrap(), [("num", 0)]);
}

#[test]
fn test_recognize_ignores_ambiguity() {
    // s = "a" | "a", ambiguous but recognizable
    let grammar = build(|g| {
        let s = g.rule("s", |g, _| {
            let a = g.mark("first");
            let x = g.token('a');
            let a = g.seq(a, x);
            let b = g.mark("second");
            let y = g.token('a');
            let b = g.seq(b, y);
            g.alt(a, b)
        });
        g.call(s)
    });

    assert!(grammar.recognize_str("a"));
    let parse = grammar.parse_str("a").unwrap();
    assert!(parse.is_ambiguous());
    let rendered = parse.mark_list().display(parse.context()).to_string();
    assert!(rendered.contains("first@0"), "{rendered}");
    assert!(rendered.contains("second@0"), "{rendered}");
}
