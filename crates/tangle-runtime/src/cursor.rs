use bstr::BStr;

use crate::Mark;

#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
pub enum CursorError {
    #[error("expected mark `{expected}`, found `{found}`")]
    Unexpected { expected: String, found: Mark },
    #[error("expected mark `{expected}`, found end of marks")]
    End { expected: String },
}

/// Forward cursor over a flat mark sequence, used to rebuild nested
/// structure from the prefix-ordered marks of a successful parse.
#[derive(Clone, Debug)]
pub struct MarkCursor<'a> {
    marks: &'a [Mark],
    index: usize,
}

impl<'a> MarkCursor<'a> {
    pub fn new(marks: &'a [Mark]) -> MarkCursor<'a> {
        MarkCursor { marks, index: 0 }
    }
    pub fn position(&self) -> usize {
        self.index
    }
    pub fn is_done(&self) -> bool {
        self.index >= self.marks.len()
    }
    pub fn peek(&self) -> Option<&'a Mark> {
        self.marks.get(self.index)
    }
    pub fn peek_nth(&self, n: usize) -> Option<&'a Mark> {
        self.marks.get(self.index + n)
    }
    pub fn peek_is(&self, name: &str) -> bool {
        self.peek().map_or(false, |m| m.is(name))
    }
    pub fn expect(&mut self, name: &str) -> Result<&'a Mark, CursorError> {
        match self.peek() {
            Some(mark) if mark.is(name) => {
                self.index += 1;
                Ok(mark)
            }
            Some(mark) => Err(CursorError::Unexpected {
                expected: name.to_owned(),
                found: mark.clone(),
            }),
            None => Err(CursorError::End {
                expected: name.to_owned(),
            }),
        }
    }
}

impl<'a> Iterator for MarkCursor<'a> {
    type Item = &'a Mark;

    fn next(&mut self) -> Option<&'a Mark> {
        let mark = self.marks.get(self.index)?;
        self.index += 1;
        Some(mark)
    }
}

/// Bytes between two mark offsets of a byte-tokenized input.
pub fn slice<'i>(input: &'i [u8], start: &Mark, end: &Mark) -> &'i BStr {
    let len = input.len();
    let start = (start.offset as usize).min(len);
    let end = (end.offset as usize).clamp(start, len);
    BStr::new(&input[start..end])
}

#[test]
fn test_cursor() {
    let marks = [Mark::new("ident", 0), Mark::new("end", 3), Mark::new("num", 4)];
    let mut cursor = MarkCursor::new(&marks);

    assert!(cursor.peek_is("ident"));
    let start = cursor.expect("ident").unwrap();
    assert_eq!(
        cursor.expect("ident"),
        Err(CursorError::Unexpected {
            expected: "ident".into(),
            found: Mark::new("end", 3)
        })
    );
    let end = cursor.expect("end").unwrap();
    assert_eq!(slice(b"abc 12", start, end).to_vec(), b"abc");
    assert_eq!(cursor.peek_nth(0), Some(&marks[2]));
    assert_eq!(cursor.next(), Some(&marks[2]));
    assert!(cursor.is_done());
    assert!(matches!(cursor.expect("num"), Err(CursorError::End { .. })));
}
