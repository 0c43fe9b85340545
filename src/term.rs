use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use ordered_float::OrderedFloat;

use crate::atom::Atom;
use crate::env::Env;

static VAR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A Prolog variable: an identity-bearing cell. Bindings live in the
/// [`Env`], never in the variable itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var {
    pub id: u64,
    pub name: Option<Atom>,
}

impl Var {
    /// A fresh generated (anonymous) variable.
    pub fn fresh() -> Self {
        Var {
            id: VAR_COUNTER.fetch_add(1, AtomicOrdering::Relaxed) + 1,
            name: None,
        }
    }

    /// A fresh variable carrying a source-level name.
    pub fn named(name: &str) -> Self {
        Var {
            name: Some(Atom::new(name)),
            ..Var::fresh()
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Compound {
    pub functor: Atom,
    pub args: Vec<Term>,
}

/// A Prolog term.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Var(Var),
    Atom(Atom),
    Int(i64),
    Float(f64),
    Compound(Rc<Compound>),
}

/// A procedure indicator `Name/Arity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Indicator {
    pub name: Atom,
    pub arity: usize,
}

impl Indicator {
    pub fn new(name: Atom, arity: usize) -> Self {
        Indicator { name, arity }
    }

    pub fn to_term(self) -> Term {
        Term::compound("/", vec![Term::Atom(self.name), Term::Int(self.arity as i64)])
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

impl Term {
    pub fn atom(name: &str) -> Term {
        Term::Atom(Atom::new(name))
    }

    pub fn nil() -> Term {
        Term::atom("[]")
    }

    pub fn compound(functor: &str, args: Vec<Term>) -> Term {
        debug_assert!(!args.is_empty());
        Term::Compound(Rc::new(Compound {
            functor: Atom::new(functor),
            args,
        }))
    }

    pub fn apply(functor: Atom, args: Vec<Term>) -> Term {
        if args.is_empty() {
            Term::Atom(functor)
        } else {
            Term::Compound(Rc::new(Compound { functor, args }))
        }
    }

    pub fn cons(head: Term, tail: Term) -> Term {
        Term::compound(".", vec![head, tail])
    }

    /// A proper list of `items`.
    pub fn list<I>(items: I) -> Term
    where
        I: IntoIterator<Item = Term>,
        I::IntoIter: DoubleEndedIterator,
    {
        Self::list_rest(items, Term::nil())
    }

    /// A list of `items` ending in `rest`.
    pub fn list_rest<I>(items: I, rest: Term) -> Term
    where
        I: IntoIterator<Item = Term>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(rest, |tail, head| Term::cons(head, tail))
    }

    pub fn is_atom(&self, name: &str) -> bool {
        matches!(self, Term::Atom(a) if a.as_str() == name)
    }

    pub fn is_nil(&self) -> bool {
        self.is_atom("[]")
    }

    /// The `functor/args` view of a callable term, if it is one.
    pub fn as_callable(&self) -> Option<(Atom, &[Term])> {
        match self {
            Term::Atom(a) => Some((*a, &[])),
            Term::Compound(c) => Some((c.functor, &c.args)),
            _ => None,
        }
    }

    pub fn indicator(&self) -> Option<Indicator> {
        self.as_callable()
            .map(|(name, args)| Indicator::new(name, args.len()))
    }

    /// Iterates the members of a list, resolving the spine against
    /// `env` as it goes. The iterator stops at `[]`; an unbound or
    /// non-list tail is reported through [`ListIter::tail`].
    pub fn list_iter<'a>(&self, env: &'a Env) -> ListIter<'a> {
        ListIter {
            env,
            next: env.resolve(self),
        }
    }
}

pub struct ListIter<'a> {
    env: &'a Env,
    next: Term,
}

impl<'a> ListIter<'a> {
    /// Whatever the spine ended in: `[]` for a proper list, an unbound
    /// variable for a partial list, anything else for a malformed one.
    pub fn tail(&self) -> &Term {
        &self.next
    }
}

impl<'a> Iterator for ListIter<'a> {
    type Item = Term;

    fn next(&mut self) -> Option<Term> {
        match self.next.clone() {
            Term::Compound(c) if c.functor.as_str() == "." && c.args.len() == 2 => {
                let head = self.env.resolve(&c.args[0]);
                self.next = self.env.resolve(&c.args[1]);
                Some(head)
            }
            _ => None,
        }
    }
}

/// Standard order of terms: Var < Number < Atom < Compound. Within
/// numbers a float sorts before an integer of equal value; compounds
/// compare by arity, then functor, then arguments left-to-right.
pub fn compare(a: &Term, b: &Term, env: &Env) -> Ordering {
    let a = env.resolve(a);
    let b = env.resolve(b);
    match (&a, &b) {
        (Term::Var(x), Term::Var(y)) => x.id.cmp(&y.id),
        (Term::Var(_), _) => Ordering::Less,
        (_, Term::Var(_)) => Ordering::Greater,

        (Term::Float(x), Term::Float(y)) => OrderedFloat(*x).cmp(&OrderedFloat(*y)),
        (Term::Int(x), Term::Int(y)) => x.cmp(y),
        (Term::Float(x), Term::Int(y)) => OrderedFloat(*x)
            .cmp(&OrderedFloat(*y as f64))
            .then(Ordering::Less),
        (Term::Int(x), Term::Float(y)) => OrderedFloat(*x as f64)
            .cmp(&OrderedFloat(*y))
            .then(Ordering::Greater),
        (Term::Int(_), _) | (Term::Float(_), _) => Ordering::Less,
        (_, Term::Int(_)) | (_, Term::Float(_)) => Ordering::Greater,

        (Term::Atom(x), Term::Atom(y)) => x.cmp(y),
        (Term::Atom(_), _) => Ordering::Less,
        (_, Term::Atom(_)) => Ordering::Greater,

        (Term::Compound(x), Term::Compound(y)) => x
            .args
            .len()
            .cmp(&y.args.len())
            .then_with(|| x.functor.cmp(&y.functor))
            .then_with(|| {
                for (p, q) in x.args.iter().zip(y.args.iter()) {
                    match compare(p, q, env) {
                        Ordering::Equal => {}
                        ord => return ord,
                    }
                }
                Ordering::Equal
            }),
    }
}

/// Structural equivalence up to a bijection on variables.
pub fn variant(a: &Term, b: &Term, env: &Env) -> bool {
    fn walk(
        a: &Term,
        b: &Term,
        env: &Env,
        map: &mut HashMap<u64, u64>,
        rev: &mut HashMap<u64, u64>,
    ) -> bool {
        let a = env.resolve(a);
        let b = env.resolve(b);
        match (&a, &b) {
            (Term::Var(x), Term::Var(y)) => match (map.get(&x.id), rev.get(&y.id)) {
                (None, None) => {
                    map.insert(x.id, y.id);
                    rev.insert(y.id, x.id);
                    true
                }
                (Some(&to), Some(&from)) => to == y.id && from == x.id,
                _ => false,
            },
            (Term::Atom(x), Term::Atom(y)) => x == y,
            (Term::Int(x), Term::Int(y)) => x == y,
            (Term::Float(x), Term::Float(y)) => x == y,
            (Term::Compound(x), Term::Compound(y)) => {
                x.functor == y.functor
                    && x.args.len() == y.args.len()
                    && x.args
                        .iter()
                        .zip(y.args.iter())
                        .all(|(p, q)| walk(p, q, env, map, rev))
            }
            _ => false,
        }
    }
    walk(a, b, env, &mut HashMap::new(), &mut HashMap::new())
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opts = crate::writer::WriteOptions::default();
        crate::writer::fmt_term(f, self, &Env::default(), &crate::operators::DEFAULT_TABLE, &opts)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_vars_are_distinct() {
        assert_ne!(Var::fresh().id, Var::fresh().id);
    }

    #[test]
    fn list_construction_and_iteration() {
        let env = Env::default();
        let l = Term::list(vec![Term::Int(1), Term::Int(2), Term::Int(3)]);
        let items: Vec<Term> = l.list_iter(&env).collect();
        assert_eq!(items, vec![Term::Int(1), Term::Int(2), Term::Int(3)]);

        let mut it = l.list_iter(&env);
        it.by_ref().for_each(drop);
        assert!(it.tail().is_nil());

        let partial = Term::list_rest(vec![Term::Int(1)], Term::Var(Var::fresh()));
        let mut it = partial.list_iter(&env);
        assert_eq!(it.next(), Some(Term::Int(1)));
        assert!(matches!(it.tail(), Term::Var(_)));
    }

    #[test]
    fn standard_order_across_types() {
        let env = Env::default();
        let v = Term::Var(Var::fresh());
        let terms = [
            v,
            Term::Float(1.0),
            Term::Int(1),
            Term::Int(2),
            Term::atom("a"),
            Term::atom("b"),
            Term::compound("f", vec![Term::Int(1)]),
            Term::compound("f", vec![Term::Int(1), Term::Int(2)]),
        ];
        for (i, a) in terms.iter().enumerate() {
            for (j, b) in terms.iter().enumerate() {
                assert_eq!(compare(a, b, &env), i.cmp(&j), "{} vs {}", i, j);
            }
        }
    }

    #[test]
    fn float_sorts_before_equal_int() {
        let env = Env::default();
        assert_eq!(compare(&Term::Float(1.0), &Term::Int(1), &env), Ordering::Less);
        assert_eq!(compare(&Term::Int(1), &Term::Float(1.0), &env), Ordering::Greater);
    }

    #[test]
    fn variant_is_a_bijection() {
        let env = Env::default();
        let x = Term::Var(Var::fresh());
        let y = Term::Var(Var::fresh());
        let a = Term::compound("f", vec![x.clone(), x.clone()]);
        let b = Term::compound("f", vec![y.clone(), y.clone()]);
        let c = Term::compound("f", vec![x.clone(), y]);
        assert!(variant(&a, &b, &env));
        assert!(!variant(&a, &c, &env));
    }
}
