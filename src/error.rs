//! Crate-wide error type.
//!
//! Every pipeline stage fails the same way: a short `problem` message at a
//! `Mark`, optionally preceded by a `context` message at an earlier mark
//! (where the construct that turned out to be malformed began). This
//! mirrors the two-mark shape described for YAML errors in every reference
//! implementation, without the Python exception bridging a language-binding
//! layer would add on top.

use crate::mark::Mark;
use thiserror::Error;

/// A marked problem: the message plus the two marks a caller needs to point
/// an editor at the right place.
#[derive(Debug, Clone)]
pub struct Problem {
    pub problem: String,
    pub problem_mark: Mark,
    pub context: Option<String>,
    pub context_mark: Option<Mark>,
}

impl Problem {
    pub fn new(problem: impl Into<String>, problem_mark: Mark) -> Self {
        Problem { problem: problem.into(), problem_mark, context: None, context_mark: None }
    }

    pub fn with_context(mut self, context: impl Into<String>, context_mark: Mark) -> Self {
        self.context = Some(context.into());
        self.context_mark = Some(context_mark);
        self
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(context), Some(context_mark)) = (&self.context, &self.context_mark) {
            write!(f, "{context} {context_mark}\n{} {}", self.problem, self.problem_mark)
        } else {
            write!(f, "{} {}", self.problem, self.problem_mark)
        }
    }
}

/// The crate's single error type. Each variant corresponds to one pipeline
/// stage so callers can `match` on category rather than parse messages.
#[derive(Debug, Error)]
pub enum Error {
    #[error("reader error: {0}")]
    Reader(Problem),

    #[error("scanner error: {0}")]
    Scanner(Problem),

    #[error("parser error: {0}")]
    Parser(Problem),

    #[error("composer error: {0}")]
    Composer(Problem),

    #[error("constructor error: {0}")]
    Constructor(Problem),

    #[error("representer error: {0}")]
    Representer(Problem),

    #[error("emitter error: {0}")]
    Emitter(Problem),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn reader(problem: impl Into<String>, mark: Mark) -> Self {
        Error::Reader(Problem::new(problem, mark))
    }

    pub fn scanner(problem: impl Into<String>, mark: Mark) -> Self {
        Error::Scanner(Problem::new(problem, mark))
    }

    pub fn scanner_ctx(
        problem: impl Into<String>,
        mark: Mark,
        context: impl Into<String>,
        context_mark: Mark,
    ) -> Self {
        Error::Scanner(Problem::new(problem, mark).with_context(context, context_mark))
    }

    pub fn parser(problem: impl Into<String>, mark: Mark) -> Self {
        Error::Parser(Problem::new(problem, mark))
    }

    pub fn parser_ctx(
        problem: impl Into<String>,
        mark: Mark,
        context: impl Into<String>,
        context_mark: Mark,
    ) -> Self {
        Error::Parser(Problem::new(problem, mark).with_context(context, context_mark))
    }

    pub fn composer(problem: impl Into<String>, mark: Mark) -> Self {
        Error::Composer(Problem::new(problem, mark))
    }

    pub fn constructor(problem: impl Into<String>, mark: Mark) -> Self {
        Error::Constructor(Problem::new(problem, mark))
    }

    pub fn representer(problem: impl Into<String>) -> Self {
        Error::Representer(Problem::new(problem, Mark::unknown()))
    }

    pub fn emitter(problem: impl Into<String>) -> Self {
        Error::Emitter(Problem::new(problem, Mark::unknown()))
    }

    /// The mark a caller should point a cursor at, if any.
    pub fn mark(&self) -> Option<&Mark> {
        match self {
            Error::Reader(p)
            | Error::Scanner(p)
            | Error::Parser(p)
            | Error::Composer(p)
            | Error::Constructor(p)
            | Error::Representer(p)
            | Error::Emitter(p) => Some(&p.problem_mark),
            Error::Io(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
