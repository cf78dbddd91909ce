use std::fmt::Display;

use tangle_runtime::{token_char, Token};

/// A class of tokens a terminal accepts, kept as sorted, disjoint and
/// non-adjacent inclusive ranges.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct TokenSet {
    ranges: Box<[(Token, Token)]>,
}

impl TokenSet {
    pub fn empty() -> TokenSet {
        TokenSet::default()
    }
    pub fn any() -> TokenSet {
        TokenSet::from_ranges([(0, Token::MAX)])
    }
    pub fn exact(token: impl Into<Token>) -> TokenSet {
        let token = token.into();
        TokenSet::from_ranges([(token, token)])
    }
    /// Inclusive range, empty when `end < start`.
    pub fn range(start: impl Into<Token>, end: impl Into<Token>) -> TokenSet {
        TokenSet::from_ranges([(start.into(), end.into())])
    }
    pub fn less(token: impl Into<Token>) -> TokenSet {
        match token.into().checked_sub(1) {
            Some(end) => TokenSet::from_ranges([(0, end)]),
            None => TokenSet::empty(),
        }
    }
    pub fn greater(token: impl Into<Token>) -> TokenSet {
        match token.into().checked_add(1) {
            Some(start) => TokenSet::from_ranges([(start, Token::MAX)]),
            None => TokenSet::empty(),
        }
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = (Token, Token)>) -> TokenSet {
        let mut ranges: Vec<_> = ranges.into_iter().filter(|(s, e)| s <= e).collect();
        ranges.sort_unstable();

        let mut merged: Vec<(Token, Token)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1.saturating_add(1) => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        TokenSet {
            ranges: merged.into_boxed_slice(),
        }
    }

    pub fn ranges(&self) -> &[(Token, Token)] {
        &self.ranges
    }
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
    pub fn is_any(&self) -> bool {
        *self.ranges == [(0, Token::MAX)]
    }

    pub fn contains(&self, token: Token) -> bool {
        self.ranges
            .binary_search_by(|&(start, end)| {
                if end < token {
                    std::cmp::Ordering::Less
                } else if start > token {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn union(&self, other: &TokenSet) -> TokenSet {
        TokenSet::from_ranges(self.ranges.iter().chain(other.ranges.iter()).copied())
    }

    pub fn complement(&self) -> TokenSet {
        let mut out = Vec::new();
        let mut next = Some(0);
        for &(start, end) in self.ranges.iter() {
            let Some(from) = next else {
                break;
            };
            if start > from {
                out.push((from, start - 1));
            }
            next = end.checked_add(1);
        }
        if let Some(from) = next {
            out.push((from, Token::MAX));
        }
        TokenSet {
            ranges: out.into_boxed_slice(),
        }
    }
}

fn display_token(buf: &mut dyn std::fmt::Write, token: Token) -> std::fmt::Result {
    match token_char(token) {
        Some(c) => write!(buf, "{c:?}"),
        None => write!(buf, "{token}"),
    }
}

impl Display for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_any() {
            return write!(f, "any");
        }
        if self.is_empty() {
            return write!(f, "[]");
        }
        let bracket = self.ranges.len() > 1 || self.ranges[0].0 != self.ranges[0].1;
        if bracket {
            write!(f, "[")?;
        }
        for (i, &(start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            display_token(f, start)?;
            if start != end {
                write!(f, "-")?;
                display_token(f, end)?;
            }
        }
        if bracket {
            write!(f, "]")?;
        }
        Ok(())
    }
}

#[test]
fn test_token_set() {
    let digits = TokenSet::range('0', '9');
    assert!(digits.contains('5' as u32));
    assert!(!digits.contains('a' as u32));
    assert!(TokenSet::range('9', '0').is_empty());

    let merged = TokenSet::from_ranges([(5, 9), (0, 3), (4, 4), (20, 30), (25, 26)]);
    assert_eq!(merged.ranges(), [(0, 9), (20, 30)]);

    assert_eq!(TokenSet::less(0u32), TokenSet::empty());
    assert_eq!(TokenSet::greater(Token::MAX), TokenSet::empty());
    assert_eq!(
        TokenSet::less(10u32).union(&TokenSet::greater(10u32)),
        TokenSet::exact(10u32).complement()
    );
    assert!(TokenSet::empty().complement().is_any());
    assert!(TokenSet::any().complement().is_empty());

    let not_newline = TokenSet::exact('\n').complement();
    assert!(not_newline.contains('a' as u32));
    assert!(!not_newline.contains('\n' as u32));
    assert_eq!(not_newline.complement(), TokenSet::exact('\n'));

    assert_eq!(digits.to_string(), "['0'-'9']");
    assert_eq!(TokenSet::exact('x').to_string(), "'x'");
}
