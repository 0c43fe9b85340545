use std::rc::Rc;

use crate::compile::Bytecode;
use crate::env::Env;
use crate::error;
use crate::machine::Machine;
use crate::solve::{Cont, Promise};
use crate::term::Term;

/// One user clause: the source head/body kept for `clause/2` and
/// `retract/1`, and the bytecode the VM runs. Compiled once at
/// assertion time.
pub(crate) struct Clause {
    pub head: Term,
    pub body: Term,
    pub code: Rc<Bytecode>,
}

#[derive(Default)]
pub(crate) struct Rules {
    pub clauses: Vec<Rc<Clause>>,
    pub dynamic: bool,
    pub discontiguous: bool,
}

/// A host predicate handler installed through `register_builtin`.
pub type HostFn = Rc<dyn Fn(&mut Machine, &[Term], &Cont, &Env) -> Promise>;

pub(crate) enum Procedure {
    Host(HostFn),
    Rules(Rules),
}

/// Splits a clause term into head and body, validating the head. Facts
/// get the body `true`.
pub(crate) fn split_clause(term: &Term, env: &Env) -> Result<(Term, Term), Term> {
    let term = env.resolve(term);
    let (head, body) = match &term {
        Term::Compound(c) if c.functor.as_str() == ":-" && c.args.len() == 2 => {
            (env.resolve(&c.args[0]), env.resolve(&c.args[1]))
        }
        _ => (term.clone(), Term::atom("true")),
    };
    match head {
        Term::Var(_) => Err(error::instantiation_error()),
        Term::Atom(_) | Term::Compound(_) => Ok((head, body)),
        other => Err(error::type_error("callable", env.resolve_deep(&other))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::term::Var;

    #[test]
    fn facts_get_body_true() {
        let env = Env::default();
        let (head, body) = split_clause(&Term::atom("p"), &env).unwrap();
        assert_eq!(head, Term::atom("p"));
        assert_eq!(body, Term::atom("true"));
    }

    #[test]
    fn rules_split_at_the_neck() {
        let env = Env::default();
        let clause = Term::compound(":-", vec![Term::atom("p"), Term::atom("q")]);
        let (head, body) = split_clause(&clause, &env).unwrap();
        assert_eq!(head, Term::atom("p"));
        assert_eq!(body, Term::atom("q"));
    }

    #[test]
    fn bad_heads_are_rejected() {
        let env = Env::default();
        assert!(split_clause(&Term::Var(Var::fresh()), &env).is_err());
        assert!(split_clause(&Term::Int(3), &env).is_err());
        let clause = Term::compound(":-", vec![Term::Int(3), Term::atom("q")]);
        assert!(split_clause(&clause, &env).is_err());
    }
}
