use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::term::{Term, Var};

// Variable ids are allocated monotonically, which would degenerate a
// plain BST into a list; scattering the key keeps the persistent tree
// shallow without rebalancing.
fn scatter(id: u64) -> u64 {
    id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

#[derive(Debug)]
struct Node {
    key: u64,
    var: u64,
    term: Term,
    left: Option<Rc<Node>>,
    right: Option<Rc<Node>>,
}

/// A persistent, structurally shared map from variable identity to
/// term, accumulated during a proof. Extending an environment never
/// mutates it; backtracking is dropping the extension.
#[derive(Debug, Clone, Default)]
pub struct Env {
    root: Option<Rc<Node>>,
}

impl Env {
    fn lookup(&self, id: u64) -> Option<&Term> {
        let key = scatter(id);
        let mut node = self.root.as_deref();
        while let Some(n) = node {
            if key == n.key && id == n.var {
                return Some(&n.term);
            }
            node = if (key, id) < (n.key, n.var) {
                n.left.as_deref()
            } else {
                n.right.as_deref()
            };
        }
        None
    }

    /// A new environment in which `v` is bound to `t`. `v` must be
    /// unbound in `self`.
    pub fn bind(&self, v: Var, t: Term) -> Env {
        fn insert(node: &Option<Rc<Node>>, key: u64, var: u64, term: Term) -> Rc<Node> {
            match node {
                None => Rc::new(Node {
                    key,
                    var,
                    term,
                    left: None,
                    right: None,
                }),
                Some(n) => {
                    if (key, var) < (n.key, n.var) {
                        Rc::new(Node {
                            key: n.key,
                            var: n.var,
                            term: n.term.clone(),
                            left: Some(insert(&n.left, key, var, term)),
                            right: n.right.clone(),
                        })
                    } else {
                        Rc::new(Node {
                            key: n.key,
                            var: n.var,
                            term: n.term.clone(),
                            left: n.left.clone(),
                            right: Some(insert(&n.right, key, var, term)),
                        })
                    }
                }
            }
        }
        debug_assert!(self.lookup(v.id).is_none());
        Env {
            root: Some(insert(&self.root, scatter(v.id), v.id, t)),
        }
    }

    /// Walks bindings from `t` to a non-variable term or an unbound
    /// variable.
    pub fn resolve(&self, t: &Term) -> Term {
        let mut t = t.clone();
        while let Term::Var(v) = &t {
            match self.lookup(v.id) {
                Some(bound) => t = bound.clone(),
                None => break,
            }
        }
        t
    }

    /// Fully materialises `t` under the current bindings. Unbound
    /// variables remain; a visited set guards against the cyclic terms
    /// that unification without occurs check can build.
    pub fn resolve_deep(&self, t: &Term) -> Term {
        self.resolve_deep_guarded(t, &mut HashSet::new())
    }

    fn resolve_deep_guarded(&self, t: &Term, seen: &mut HashSet<u64>) -> Term {
        match self.resolve(t) {
            Term::Compound(c) => {
                if let Term::Var(v) = t {
                    if !seen.insert(v.id) {
                        return t.clone();
                    }
                }
                let args = c
                    .args
                    .iter()
                    .map(|a| self.resolve_deep_guarded(a, seen))
                    .collect();
                if let Term::Var(v) = t {
                    seen.remove(&v.id);
                }
                Term::apply(c.functor, args)
            }
            t => t,
        }
    }

    /// The unbound variables of `t`, in left-to-right first-encounter
    /// order.
    pub fn free_variables(&self, t: &Term) -> Vec<Var> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.walk_free(t, &mut seen, &mut out);
        out
    }

    fn walk_free(&self, t: &Term, seen: &mut HashSet<u64>, out: &mut Vec<Var>) {
        match self.resolve(t) {
            Term::Var(v) => {
                if seen.insert(v.id) {
                    out.push(v);
                }
            }
            Term::Compound(c) => {
                for a in &c.args {
                    self.walk_free(a, seen, out);
                }
            }
            _ => {}
        }
    }

    /// Does the resolved form of `t` mention the unbound variable `v`?
    pub fn contains_var(&self, t: &Term, v: &Var) -> bool {
        match self.resolve(t) {
            Term::Var(w) => w.id == v.id,
            Term::Compound(c) => c.args.iter().any(|a| self.contains_var(a, v)),
            _ => false,
        }
    }

    /// Syntactic unification. Returns the extended environment on
    /// success, `None` on mismatch; failure is never an error.
    pub fn unify(&self, a: &Term, b: &Term, occurs_check: bool) -> Option<Env> {
        let a = self.resolve(a);
        let b = self.resolve(b);
        match (&a, &b) {
            (Term::Var(x), Term::Var(y)) if x.id == y.id => Some(self.clone()),
            (Term::Var(x), _) => {
                if occurs_check && self.contains_var(&b, x) {
                    None
                } else {
                    Some(self.bind(*x, b))
                }
            }
            (_, Term::Var(y)) => {
                if occurs_check && self.contains_var(&a, y) {
                    None
                } else {
                    Some(self.bind(*y, a))
                }
            }
            (Term::Atom(x), Term::Atom(y)) if x == y => Some(self.clone()),
            (Term::Int(x), Term::Int(y)) if x == y => Some(self.clone()),
            (Term::Float(x), Term::Float(y)) if x == y => Some(self.clone()),
            (Term::Compound(x), Term::Compound(y))
                if x.functor == y.functor && x.args.len() == y.args.len() =>
            {
                x.args
                    .iter()
                    .zip(y.args.iter())
                    .try_fold(self.clone(), |env, (p, q)| env.unify(p, q, occurs_check))
            }
            _ => None,
        }
    }

    /// A structurally identical term with every unbound variable
    /// replaced by a fresh one; the same input variable always maps to
    /// the same fresh one within a single copy. Ground subterms are
    /// shared.
    pub fn copy_term(&self, t: &Term) -> Term {
        self.copy_term_shared(t, &mut HashMap::new())
    }

    fn copy_term_shared(&self, t: &Term, renaming: &mut HashMap<u64, Var>) -> Term {
        // None means "unchanged": the subterm is ground and can be
        // shared between source and copy.
        fn walk(env: &Env, t: &Term, renaming: &mut HashMap<u64, Var>) -> Option<Term> {
            match t {
                Term::Var(_) => {
                    let r = env.resolve(t);
                    match &r {
                        Term::Var(v) => {
                            Some(Term::Var(*renaming.entry(v.id).or_insert_with(Var::fresh)))
                        }
                        _ => Some(walk(env, &r, renaming).unwrap_or(r)),
                    }
                }
                Term::Compound(c) => {
                    let mut args: Option<Vec<Term>> = None;
                    for (i, a) in c.args.iter().enumerate() {
                        if let Some(copied) = walk(env, a, renaming) {
                            args.get_or_insert_with(|| c.args[..i].to_vec()).push(copied);
                        } else if let Some(args) = args.as_mut() {
                            args.push(a.clone());
                        }
                    }
                    args.map(|args| Term::apply(c.functor, args))
                }
                _ => None,
            }
        }
        walk(self, t, renaming).unwrap_or_else(|| t.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::term::{compare, variant};
    use std::cmp::Ordering;

    fn f(args: Vec<Term>) -> Term {
        Term::compound("f", args)
    }

    #[test]
    fn bind_and_resolve_chain() {
        let x = Var::fresh();
        let y = Var::fresh();
        let env = Env::default()
            .bind(x, Term::Var(y))
            .bind(y, Term::Int(42));
        assert_eq!(env.resolve(&Term::Var(x)), Term::Int(42));
    }

    #[test]
    fn binding_does_not_mutate_the_source_env() {
        let x = Var::fresh();
        let base = Env::default();
        let extended = base.bind(x, Term::Int(1));
        assert!(matches!(base.resolve(&Term::Var(x)), Term::Var(_)));
        assert_eq!(extended.resolve(&Term::Var(x)), Term::Int(1));
    }

    #[test]
    fn unify_is_symmetric_on_ground_terms() {
        let env = Env::default();
        let terms = [
            Term::Int(1),
            Term::Float(1.0),
            Term::atom("a"),
            f(vec![Term::Int(1), Term::atom("a")]),
            Term::list(vec![Term::Int(1), Term::Int(2)]),
        ];
        for a in &terms {
            for b in &terms {
                assert_eq!(
                    env.unify(a, b, false).is_some(),
                    env.unify(b, a, false).is_some()
                );
            }
        }
    }

    #[test]
    fn int_and_float_do_not_unify() {
        let env = Env::default();
        assert!(env.unify(&Term::Int(1), &Term::Float(1.0), false).is_none());
    }

    #[test]
    fn compound_unification_threads_bindings() {
        let env = Env::default();
        let x = Var::fresh();
        let a = f(vec![Term::Var(x), Term::Var(x)]);
        let b = f(vec![Term::Int(1), Term::Int(2)]);
        assert!(env.unify(&a, &b, false).is_none());
        let c = f(vec![Term::Int(1), Term::Int(1)]);
        let env = env.unify(&a, &c, false).unwrap();
        assert_eq!(env.resolve(&Term::Var(x)), Term::Int(1));
    }

    #[test]
    fn occurs_check_rejects_only_proper_self_reference() {
        let env = Env::default();
        let x = Var::fresh();
        let t = f(vec![Term::Var(x)]);
        assert!(env.unify(&Term::Var(x), &t, true).is_none());
        assert!(env.unify(&Term::Var(x), &t, false).is_some());
        assert!(env.unify(&Term::Var(x), &Term::Var(x), true).is_some());
    }

    #[test]
    fn free_variables_in_encounter_order() {
        let env = Env::default();
        let x = Var::fresh();
        let y = Var::fresh();
        let t = f(vec![Term::Var(y), Term::Var(x), Term::Var(y)]);
        assert_eq!(env.free_variables(&t), vec![y, x]);
    }

    #[test]
    fn copy_term_fidelity() {
        let env = Env::default();
        let x = Var::fresh();
        let t = f(vec![Term::Var(x), Term::Var(x), Term::Int(7)]);
        let c1 = env.copy_term(&t);
        let c2 = env.copy_term(&t);
        assert!(variant(&t, &c1, &env));
        assert!(variant(&c1, &c2, &env));
        // Disjoint identities: unifying the copy's var leaves t's alone.
        let vars = env.free_variables(&c1);
        assert_eq!(vars.len(), 1);
        assert_ne!(vars[0].id, x.id);
    }

    #[test]
    fn resolve_deep_materialises_bindings() {
        let x = Var::fresh();
        let env = Env::default().bind(x, Term::Int(3));
        let t = f(vec![Term::Var(x)]);
        assert_eq!(env.resolve_deep(&t), f(vec![Term::Int(3)]));
    }

    #[test]
    fn resolve_deep_survives_cyclic_bindings() {
        let x = Var::fresh();
        let env = Env::default();
        let cyclic = f(vec![Term::Var(x)]);
        let env = env.unify(&Term::Var(x), &cyclic, false).unwrap();
        // Must terminate; the inner occurrence stays a variable.
        let out = env.resolve_deep(&Term::Var(x));
        assert!(matches!(out, Term::Compound(_)));
    }

    #[test]
    fn standard_order_total_on_bound_terms() {
        let x = Var::fresh();
        let env = Env::default().bind(x, Term::Int(5));
        assert_eq!(compare(&Term::Var(x), &Term::Int(5), &env), Ordering::Equal);
    }

    #[test]
    fn many_bindings_stay_consistent() {
        let mut env = Env::default();
        let vars: Vec<Var> = (0..500).map(|_| Var::fresh()).collect();
        for (i, v) in vars.iter().enumerate() {
            env = env.bind(*v, Term::Int(i as i64));
        }
        for (i, v) in vars.iter().enumerate() {
            assert_eq!(env.resolve(&Term::Var(*v)), Term::Int(i as i64));
        }
    }
}
