use crate::env::Env;
use crate::error;
use crate::flags::Flags;
use crate::machine::Machine;
use crate::solve::{Cont, Promise};
use crate::term::{Term, Var};

pub(crate) fn solve_unify(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    Promise::unify(m, &args[0], &args[1], k, env)
}

pub(crate) fn solve_unify_occurs(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match env.unify(&args[0], &args[1], true) {
        Some(env) => k(m, &env),
        None => Promise::Fail,
    }
}

pub(crate) fn solve_copy_term(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let copy = env.copy_term(&args[0]);
    Promise::unify(m, &copy, &args[1], k, env)
}

pub(crate) fn solve_functor(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match env.resolve(&args[0]) {
        Term::Compound(c) => {
            let name = Term::Atom(c.functor);
            let arity = Term::Int(c.args.len() as i64);
            match env
                .unify(&args[1], &name, false)
                .and_then(|env| env.unify(&args[2], &arity, false))
            {
                Some(env) => k(m, &env),
                None => Promise::Fail,
            }
        }
        Term::Var(_) => build_functor(m, args, k, env),
        atomic => match env
            .unify(&args[1], &atomic, false)
            .and_then(|env| env.unify(&args[2], &Term::Int(0), false))
        {
            Some(env) => k(m, &env),
            None => Promise::Fail,
        },
    }
}

fn build_functor(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let name = env.resolve(&args[1]);
    let arity = env.resolve(&args[2]);
    let arity = match (&name, &arity) {
        (Term::Var(_), _) | (_, Term::Var(_)) => {
            return Promise::ball(error::instantiation_error())
        }
        (_, Term::Int(i)) => *i,
        (_, other) => {
            return Promise::ball(error::type_error("integer", env.resolve_deep(other)))
        }
    };
    if arity < 0 {
        return Promise::ball(error::domain_error(
            "not_less_than_zero",
            Term::Int(arity),
        ));
    }
    if arity == 0 {
        return match &name {
            Term::Compound(_) => {
                Promise::ball(error::type_error("atomic", env.resolve_deep(&name)))
            }
            _ => Promise::unify(m, &args[0], &name, k, env),
        };
    }
    match name {
        Term::Atom(f) => {
            if arity as usize > Flags::MAX_ARITY {
                return Promise::ball(error::representation_error("max_arity"));
            }
            let fresh: Vec<Term> = (0..arity).map(|_| Term::Var(Var::fresh())).collect();
            Promise::unify(m, &args[0], &Term::apply(f, fresh), k, env)
        }
        Term::Int(_) | Term::Float(_) => {
            Promise::ball(error::type_error("atom", env.resolve_deep(&name)))
        }
        other => Promise::ball(error::type_error("atomic", env.resolve_deep(&other))),
    }
}

pub(crate) fn solve_arg(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let n = env.resolve(&args[0]);
    let t = env.resolve(&args[1]);
    match (&n, &t) {
        (Term::Var(_), _) | (_, Term::Var(_)) => Promise::ball(error::instantiation_error()),
        (Term::Int(i), Term::Compound(c)) => {
            if *i < 0 {
                Promise::ball(error::domain_error("not_less_than_zero", Term::Int(*i)))
            } else if *i >= 1 && (*i as usize) <= c.args.len() {
                Promise::unify(m, &c.args[(*i - 1) as usize].clone(), &args[2], k, env)
            } else {
                Promise::Fail
            }
        }
        (Term::Int(_), other) => {
            Promise::ball(error::type_error("compound", env.resolve_deep(other)))
        }
        (other, _) => Promise::ball(error::type_error("integer", env.resolve_deep(other))),
    }
}

pub(crate) fn solve_univ(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match env.resolve(&args[0]) {
        Term::Compound(c) => {
            let list = Term::list_rest(
                std::iter::once(Term::Atom(c.functor)).chain(c.args.iter().cloned()),
                Term::nil(),
            );
            Promise::unify(m, &list, &args[1], k, env)
        }
        Term::Var(_) => build_univ(m, args, k, env),
        atomic => {
            let list = Term::list(vec![atomic]);
            Promise::unify(m, &list, &args[1], k, env)
        }
    }
}

fn build_univ(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let mut it = args[1].list_iter(env);
    let items: Vec<Term> = it.by_ref().collect();
    match it.tail() {
        Term::Var(_) => return Promise::ball(error::instantiation_error()),
        t if t.is_nil() => {}
        _ => {
            return Promise::ball(error::type_error(
                "list",
                env.resolve_deep(&args[1]),
            ))
        }
    }
    let (head, rest) = match items.split_first() {
        None => {
            return Promise::ball(error::domain_error("non_empty_list", Term::nil()));
        }
        Some(x) => x,
    };
    if rest.is_empty() {
        return match head {
            Term::Var(_) => Promise::ball(error::instantiation_error()),
            Term::Compound(_) => {
                Promise::ball(error::type_error("atomic", env.resolve_deep(head)))
            }
            atomic => Promise::unify(m, &args[0], atomic, k, env),
        };
    }
    match head {
        Term::Var(_) => Promise::ball(error::instantiation_error()),
        Term::Atom(f) => {
            if rest.len() > Flags::MAX_ARITY {
                return Promise::ball(error::representation_error("max_arity"));
            }
            Promise::unify(m, &args[0], &Term::apply(*f, rest.to_vec()), k, env)
        }
        other => Promise::ball(error::type_error("atom", env.resolve_deep(other))),
    }
}
