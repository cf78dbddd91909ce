#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
pub enum GrammarError {
    #[error("rule `{rule}` is referenced but never defined")]
    UndefinedRule { rule: String },
    #[error("rule `{rule}` is defined more than once")]
    DuplicateDefinition { rule: String },
    #[error("cannot invert `{pattern}`, only terminals and alternations of terminals")]
    UnsupportedInversion { pattern: String },
    #[error("rule `{rule}` can match an empty span while passing a mark")]
    ZeroWidthMark { rule: String },
    #[error("precedence rule `{rule}` has no level at or above {level}")]
    UnknownPrecedence { rule: String, level: u32 },
    #[error("invalid token range {start}..={end}")]
    InvalidRange { start: u32, end: u32 },
    #[error("rule handle {index} does not belong to this grammar")]
    ForeignRule { index: usize },
}

#[derive(thiserror::Error, Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParseError {
    /// `offset` is the index of the first token that could not be consumed,
    /// or the input length when the input ended too early.
    #[error("no parse, input rejected at offset {offset}")]
    NoMatch { offset: u32 },
    #[error("input is longer than {} tokens", u32::MAX)]
    InputTooLong,
}

impl ParseError {
    pub fn offset(&self) -> Option<u32> {
        match self {
            ParseError::NoMatch { offset } => Some(*offset),
            ParseError::InputTooLong => None,
        }
    }
}

/// Collects construction errors until the grammar is built.
#[derive(Default, Debug)]
pub(crate) struct ErrorAccumulator {
    errors: Vec<GrammarError>,
}

impl ErrorAccumulator {
    pub(crate) fn error(&mut self, err: GrammarError) {
        log::debug!("grammar error: {err}");
        self.errors.push(err);
    }
    /// Fails with the first recorded error.
    pub(crate) fn finish(self) -> Result<(), GrammarError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[test]
fn test_first_error_wins() {
    let mut err = ErrorAccumulator::default();
    assert_eq!(err.finish(), Ok(()));

    let mut err = ErrorAccumulator::default();
    err.error(GrammarError::InvalidRange { start: 2, end: 1 });
    err.error(GrammarError::ForeignRule { index: 7 });
    assert_eq!(
        err.finish(),
        Err(GrammarError::InvalidRange { start: 2, end: 1 })
    );
}
