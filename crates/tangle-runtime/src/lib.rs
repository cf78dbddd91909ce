pub mod cursor;
pub mod list;

use std::{fmt::Display, sync::Arc};

pub use cursor::{CursorError, MarkCursor};
pub use list::{AmbiguousMarks, Context, MarkList};

/// Input symbol. Bytes and unicode scalar values both widen losslessly.
pub type Token = u32;

/// A named position in the input, emitted by a marker pattern.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Mark {
    pub name: Arc<str>,
    pub offset: u32,
}

impl Mark {
    pub fn new(name: impl Into<Arc<str>>, offset: u32) -> Mark {
        Mark {
            name: name.into(),
            offset,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn is(&self, name: &str) -> bool {
        &*self.name == name
    }
}

impl Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.offset)
    }
}

impl PartialEq<(&str, u32)> for Mark {
    fn eq(&self, other: &(&str, u32)) -> bool {
        self.is(other.0) && self.offset == other.1
    }
}

/// Widens a token back into a `char` for display, if it is one.
pub fn token_char(token: Token) -> Option<char> {
    char::from_u32(token)
}

#[test]
fn test_mark_compare() {
    let mark = Mark::new("add", 3);
    assert_eq!(mark, ("add", 3));
    assert_ne!(mark, ("add", 4));
    assert_ne!(mark, ("sub", 3));
    assert_eq!(mark.to_string(), "add@3");

    let marks = vec![Mark::new("n", 0), Mark::new("n", 2)];
    assert_eq!(marks, [("n", 0), ("n", 2)]);
}
