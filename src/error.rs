use std::fmt;

use crate::term::{Indicator, Term, Var};

/// A condition that aborts or suspends evaluation. `Ball` is a Prolog
/// exception and can be intercepted by `catch/3`; the other variants
/// are host-level and cannot.
#[derive(Debug, Clone)]
pub enum Exception {
    Ball(Term),
    Halt(i64),
    Interrupted,
}

/// The error surface of the embedding API. Uncaught Prolog exceptions
/// arrive as structured terms, never as panics.
#[derive(Debug, Clone)]
pub enum Error {
    /// An exception left the query uncaught; the payload is the ball.
    Uncaught(Term),
    /// `halt/0` or `halt/1` was executed.
    Halted(i64),
    /// The interrupt handle was triggered.
    Interrupted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Uncaught(ball) => write!(f, "uncaught exception: {}", ball),
            Error::Halted(code) => write!(f, "halted with exit code {}", code),
            Error::Interrupted => write!(f, "evaluation interrupted"),
        }
    }
}

impl std::error::Error for Error {}

impl From<Exception> for Error {
    fn from(e: Exception) -> Self {
        match e {
            Exception::Ball(t) => Error::Uncaught(t),
            Exception::Halt(code) => Error::Halted(code),
            Exception::Interrupted => Error::Interrupted,
        }
    }
}

// ISO error terms all have the shape error(Formal, Context). The
// context argument is left unbound except where the standard pins a
// predicate indicator.

fn error_term(formal: Term) -> Term {
    Term::compound("error", vec![formal, Term::Var(Var::fresh())])
}

fn error_term_in(formal: Term, context: Term) -> Term {
    Term::compound("error", vec![formal, context])
}

pub(crate) fn instantiation_error() -> Term {
    error_term(Term::atom("instantiation_error"))
}

pub(crate) fn type_error(kind: &str, culprit: Term) -> Term {
    error_term(Term::compound(
        "type_error",
        vec![Term::atom(kind), culprit],
    ))
}

pub(crate) fn domain_error(domain: &str, culprit: Term) -> Term {
    error_term(Term::compound(
        "domain_error",
        vec![Term::atom(domain), culprit],
    ))
}

pub(crate) fn existence_error_procedure(pi: Indicator) -> Term {
    error_term_in(
        Term::compound(
            "existence_error",
            vec![Term::atom("procedure"), pi.to_term()],
        ),
        pi.to_term(),
    )
}

pub(crate) fn permission_error(operation: &str, kind: &str, culprit: Term) -> Term {
    error_term(Term::compound(
        "permission_error",
        vec![Term::atom(operation), Term::atom(kind), culprit],
    ))
}

pub(crate) fn representation_error(flag: &str) -> Term {
    error_term(Term::compound(
        "representation_error",
        vec![Term::atom(flag)],
    ))
}

pub(crate) fn evaluation_error(what: &str) -> Term {
    error_term(Term::compound("evaluation_error", vec![Term::atom(what)]))
}

pub(crate) fn syntax_error(detail: &str) -> Term {
    error_term(Term::compound("syntax_error", vec![Term::atom(detail)]))
}

pub(crate) fn system_error(detail: &str) -> Term {
    error_term_in(Term::atom("system_error"), Term::atom(detail))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::atom::Atom;
    use crate::term::Indicator;

    #[test]
    fn error_terms_have_the_iso_shape() {
        let t = type_error("integer", Term::atom("a"));
        let (f, args) = t.as_callable().unwrap();
        assert_eq!(f.as_str(), "error");
        assert_eq!(args.len(), 2);
        assert_eq!(
            args[0],
            Term::compound("type_error", vec![Term::atom("integer"), Term::atom("a")])
        );
    }

    #[test]
    fn existence_error_carries_the_indicator() {
        let pi = Indicator::new(Atom::new("foo"), 2);
        let t = existence_error_procedure(pi);
        let (_, args) = t.as_callable().unwrap();
        assert_eq!(args[1], pi.to_term());
    }
}
