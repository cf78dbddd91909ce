use std::{fmt::Debug, sync::Arc};

use tangle_runtime::Token;

use crate::token::TokenSet;

/// Lookahead predicate attached to a rule. It sees the token right after a
/// completed span, or `None` at end of input, and can veto the completion.
#[derive(Clone)]
pub struct Guard(Arc<dyn Fn(Option<Token>) -> bool + Send + Sync>);

impl Guard {
    pub fn new(predicate: impl Fn(Option<Token>) -> bool + Send + Sync + 'static) -> Guard {
        Guard(Arc::new(predicate))
    }
    pub fn not_followed_by(set: TokenSet) -> Guard {
        Guard::new(move |next| next.map_or(true, |t| !set.contains(t)))
    }
    pub fn followed_by(set: TokenSet) -> Guard {
        Guard::new(move |next| next.map_or(false, |t| set.contains(t)))
    }
    pub fn at_end() -> Guard {
        Guard::new(|next| next.is_none())
    }
    pub fn allows(&self, next: Option<Token>) -> bool {
        (self.0)(next)
    }
}

impl Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Guard(..)")
    }
}

#[test]
fn test_guards() {
    let letters = TokenSet::range('a', 'z');
    let word_end = Guard::not_followed_by(letters.clone());
    assert!(word_end.allows(None));
    assert!(word_end.allows(Some(' ' as u32)));
    assert!(!word_end.allows(Some('q' as u32)));

    let before_letter = Guard::followed_by(letters);
    assert!(!before_letter.allows(None));
    assert!(before_letter.allows(Some('q' as u32)));

    assert!(Guard::at_end().allows(None));
    assert!(!Guard::at_end().allows(Some(0)));
}
