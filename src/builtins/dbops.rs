use std::rc::Rc;

use crate::db::{Procedure, Rules};
use crate::env::Env;
use crate::error;
use crate::flags::Flags;
use crate::machine::Machine;
use crate::solve::{Cont, Promise, Thunk};
use crate::db;
use crate::term::{Indicator, Term};

pub(crate) fn solve_asserta(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match m.assert_term(&args[0], env, false, true) {
        Ok(()) => k(m, env),
        Err(ball) => Promise::ball(ball),
    }
}

pub(crate) fn solve_assertz(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match m.assert_term(&args[0], env, true, true) {
        Ok(()) => k(m, env),
        Err(ball) => Promise::ball(ball),
    }
}

/// A renamed copy of a stored clause, sharing variables between head
/// and body.
fn rename_clause(clause: &db::Clause) -> (Term, Term) {
    let scratch = Env::default();
    let pair = Term::compound("-", vec![clause.head.clone(), clause.body.clone()]);
    match scratch.copy_term(&pair) {
        Term::Compound(c) => (c.args[0].clone(), c.args[1].clone()),
        _ => unreachable!("copy of -/2 stays -/2"),
    }
}

pub(crate) fn solve_retract(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let (head, body) = match db::split_clause(&args[0], env) {
        Ok(x) => x,
        Err(ball) => return Promise::ball(ball),
    };
    let pi = head.indicator().expect("split_clause returns callable heads");
    if m.is_reserved(pi) {
        return Promise::ball(error::permission_error(
            "modify",
            "static_procedure",
            pi.to_term(),
        ));
    }
    let clauses = match m.procedures.get(&pi) {
        None => return Promise::Fail,
        Some(Procedure::Host(_)) => {
            return Promise::ball(error::permission_error(
                "modify",
                "static_procedure",
                pi.to_term(),
            ))
        }
        Some(Procedure::Rules(rules)) => {
            if !rules.dynamic {
                return Promise::ball(error::permission_error(
                    "modify",
                    "static_procedure",
                    pi.to_term(),
                ));
            }
            rules.clauses.clone()
        }
    };
    let alts: Vec<Thunk> = clauses
        .into_iter()
        .map(|clause| {
            let head = head.clone();
            let body = body.clone();
            let k = k.clone();
            let env = env.clone();
            Box::new(move |m: &mut Machine| {
                let (ch, cb) = rename_clause(&clause);
                let bound = env
                    .unify(&head, &ch, false)
                    .and_then(|env| env.unify(&body, &cb, false));
                match bound {
                    Some(env) => {
                        // First match wins; remove it from the live
                        // list, leaving the snapshot untouched.
                        if let Some(Procedure::Rules(rules)) = m.procedures.get_mut(&pi) {
                            rules.clauses.retain(|c| !Rc::ptr_eq(c, &clause));
                        }
                        k(m, &env)
                    }
                    None => Promise::Fail,
                }
            }) as Thunk
        })
        .collect();
    Promise::delay(alts)
}

/// Extracts and validates a `Name/Arity` indicator term.
fn indicator_of(t: &Term, env: &Env) -> Result<Indicator, Term> {
    let t = env.resolve(t);
    let c = match &t {
        Term::Var(_) => return Err(error::instantiation_error()),
        Term::Compound(c) if c.functor.as_str() == "/" && c.args.len() == 2 => c,
        other => {
            return Err(error::type_error(
                "predicate_indicator",
                env.resolve_deep(other),
            ))
        }
    };
    let name = env.resolve(&c.args[0]);
    let arity = env.resolve(&c.args[1]);
    match (&name, &arity) {
        (Term::Var(_), _) | (_, Term::Var(_)) => Err(error::instantiation_error()),
        (Term::Atom(a), Term::Int(n)) => {
            if *n < 0 {
                Err(error::domain_error("not_less_than_zero", Term::Int(*n)))
            } else if *n as usize > Flags::MAX_ARITY {
                Err(error::representation_error("max_arity"))
            } else {
                Ok(Indicator::new(*a, *n as usize))
            }
        }
        (Term::Atom(_), other) => Err(error::type_error("integer", env.resolve_deep(other))),
        (other, _) => Err(error::type_error("atom", env.resolve_deep(other))),
    }
}

pub(crate) fn solve_abolish(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let pi = match indicator_of(&args[0], env) {
        Ok(pi) => pi,
        Err(ball) => return Promise::ball(ball),
    };
    if m.is_reserved(pi) {
        return Promise::ball(error::permission_error(
            "modify",
            "static_procedure",
            pi.to_term(),
        ));
    }
    let removable = match m.procedures.get(&pi) {
        None => return k(m, env),
        Some(Procedure::Host(_)) => false,
        Some(Procedure::Rules(rules)) => rules.dynamic,
    };
    if !removable {
        return Promise::ball(error::permission_error(
            "modify",
            "static_procedure",
            pi.to_term(),
        ));
    }
    m.procedures.shift_remove(&pi);
    k(m, env)
}

pub(crate) fn solve_clause(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let head = env.resolve(&args[0]);
    let pi = match &head {
        Term::Var(_) => return Promise::ball(error::instantiation_error()),
        t => match t.indicator() {
            Some(pi) => pi,
            None => {
                return Promise::ball(error::type_error("callable", env.resolve_deep(t)))
            }
        },
    };
    match env.resolve(&args[1]) {
        Term::Var(_) | Term::Atom(_) | Term::Compound(_) => {}
        other => {
            return Promise::ball(error::type_error("callable", env.resolve_deep(&other)))
        }
    }
    if m.is_reserved(pi) {
        return Promise::ball(error::permission_error(
            "access",
            "private_procedure",
            pi.to_term(),
        ));
    }
    let clauses = match m.procedures.get(&pi) {
        None => return Promise::Fail,
        Some(Procedure::Host(_)) => {
            return Promise::ball(error::permission_error(
                "access",
                "private_procedure",
                pi.to_term(),
            ))
        }
        Some(Procedure::Rules(rules)) => rules.clauses.clone(),
    };
    let alts: Vec<Thunk> = clauses
        .into_iter()
        .map(|clause| {
            let head = head.clone();
            let body_pattern = args[1].clone();
            let k = k.clone();
            let env = env.clone();
            Box::new(move |m: &mut Machine| {
                let (ch, cb) = rename_clause(&clause);
                let bound = env
                    .unify(&head, &ch, false)
                    .and_then(|env| env.unify(&body_pattern, &cb, false));
                match bound {
                    Some(env) => k(m, &env),
                    None => Promise::Fail,
                }
            }) as Thunk
        })
        .collect();
    Promise::delay(alts)
}

pub(crate) fn solve_current_predicate(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
) -> Promise {
    match env.resolve(&args[0]) {
        Term::Var(_) => {}
        Term::Compound(c) if c.functor.as_str() == "/" && c.args.len() == 2 => {}
        other => {
            return Promise::ball(error::type_error(
                "predicate_indicator",
                env.resolve_deep(&other),
            ))
        }
    }
    let pis: Vec<Indicator> = m.procedures.keys().copied().collect();
    let alts: Vec<Thunk> = pis
        .into_iter()
        .map(|pi| {
            let pattern = args[0].clone();
            let k = k.clone();
            let env = env.clone();
            Box::new(move |m: &mut Machine| {
                Promise::unify(m, &pattern, &pi.to_term(), &k, &env)
            }) as Thunk
        })
        .collect();
    Promise::delay(alts)
}

/// Walks a `dynamic/1`- or `discontiguous/1`-style specification:
/// a single indicator, a `,` tree, or a list.
fn each_indicator(
    t: &Term,
    env: &Env,
    out: &mut Vec<Indicator>,
) -> Result<(), Term> {
    let t = env.resolve(t);
    match &t {
        Term::Compound(c) if c.functor.as_str() == "," && c.args.len() == 2 => {
            each_indicator(&c.args[0], env, out)?;
            each_indicator(&c.args[1], env, out)
        }
        Term::Compound(c) if c.functor.as_str() == "." && c.args.len() == 2 => {
            let mut it = t.list_iter(env);
            for item in it.by_ref() {
                each_indicator(&item, env, out)?;
            }
            match it.tail() {
                t if t.is_nil() => Ok(()),
                Term::Var(_) => Err(error::instantiation_error()),
                _ => Err(error::type_error("list", env.resolve_deep(&t))),
            }
        }
        _ => {
            out.push(indicator_of(&t, env)?);
            Ok(())
        }
    }
}

fn declare(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
    mark: fn(&mut Rules),
) -> Promise {
    let mut pis = Vec::new();
    if let Err(ball) = each_indicator(&args[0], env, &mut pis) {
        return Promise::ball(ball);
    }
    for pi in pis {
        if m.is_reserved(pi) {
            return Promise::ball(error::permission_error(
                "modify",
                "static_procedure",
                pi.to_term(),
            ));
        }
        match m.procedures.entry(pi) {
            indexmap::map::Entry::Occupied(mut entry) => match entry.get_mut() {
                Procedure::Host(_) => {
                    return Promise::ball(error::permission_error(
                        "modify",
                        "static_procedure",
                        pi.to_term(),
                    ))
                }
                Procedure::Rules(rules) => mark(rules),
            },
            indexmap::map::Entry::Vacant(entry) => {
                let mut rules = Rules::default();
                mark(&mut rules);
                entry.insert(Procedure::Rules(rules));
            }
        }
    }
    k(m, env)
}

pub(crate) fn solve_dynamic(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    declare(m, args, k, env, |rules| rules.dynamic = true)
}

pub(crate) fn solve_discontiguous(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
) -> Promise {
    declare(m, args, k, env, |rules| rules.discontiguous = true)
}
