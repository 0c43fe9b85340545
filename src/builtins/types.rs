use std::cmp::Ordering;

use crate::env::Env;
use crate::error;
use crate::machine::Machine;
use crate::solve::{Cont, Promise};
use crate::term::{compare, Term};

fn type_test(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
    test: fn(&Term) -> bool,
) -> Promise {
    if test(&env.resolve(&args[0])) {
        k(m, env)
    } else {
        Promise::Fail
    }
}

pub(crate) fn solve_var(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    type_test(m, args, k, env, |t| matches!(t, Term::Var(_)))
}

pub(crate) fn solve_nonvar(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    type_test(m, args, k, env, |t| !matches!(t, Term::Var(_)))
}

pub(crate) fn solve_atom(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    type_test(m, args, k, env, |t| matches!(t, Term::Atom(_)))
}

pub(crate) fn solve_atomic(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    type_test(m, args, k, env, |t| {
        matches!(t, Term::Atom(_) | Term::Int(_) | Term::Float(_))
    })
}

pub(crate) fn solve_number(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    type_test(m, args, k, env, |t| {
        matches!(t, Term::Int(_) | Term::Float(_))
    })
}

pub(crate) fn solve_integer(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    type_test(m, args, k, env, |t| matches!(t, Term::Int(_)))
}

pub(crate) fn solve_float(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    type_test(m, args, k, env, |t| matches!(t, Term::Float(_)))
}

pub(crate) fn solve_compound(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    type_test(m, args, k, env, |t| matches!(t, Term::Compound(_)))
}

pub(crate) fn solve_callable(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    type_test(m, args, k, env, |t| {
        matches!(t, Term::Atom(_) | Term::Compound(_))
    })
}

fn order_test(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
    accept: fn(Ordering) -> bool,
) -> Promise {
    if accept(compare(&args[0], &args[1], env)) {
        k(m, env)
    } else {
        Promise::Fail
    }
}

pub(crate) fn solve_term_eq(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    order_test(m, args, k, env, |o| o == Ordering::Equal)
}

pub(crate) fn solve_term_neq(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    order_test(m, args, k, env, |o| o != Ordering::Equal)
}

pub(crate) fn solve_term_lss(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    order_test(m, args, k, env, |o| o == Ordering::Less)
}

pub(crate) fn solve_term_leq(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    order_test(m, args, k, env, |o| o != Ordering::Greater)
}

pub(crate) fn solve_term_gtr(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    order_test(m, args, k, env, |o| o == Ordering::Greater)
}

pub(crate) fn solve_term_geq(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    order_test(m, args, k, env, |o| o != Ordering::Less)
}

pub(crate) fn solve_compare(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match env.resolve(&args[0]) {
        Term::Var(_) => {}
        Term::Atom(a) if matches!(a.as_str(), "<" | "=" | ">") => {}
        Term::Atom(a) => {
            return Promise::ball(error::domain_error("order", Term::Atom(a)));
        }
        other => {
            return Promise::ball(error::type_error("atom", env.resolve_deep(&other)));
        }
    }
    let order = match compare(&args[1], &args[2], env) {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };
    Promise::unify(m, &args[0], &Term::atom(order), k, env)
}
