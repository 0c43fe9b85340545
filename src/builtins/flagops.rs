use crate::atom::Atom;
use crate::env::Env;
use crate::error;
use crate::machine::Machine;
use crate::operators::Operator;
use crate::solve::{Cont, Promise, Thunk};
use crate::term::Term;

pub(crate) fn solve_set_prolog_flag(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
) -> Promise {
    match m.set_flag_checked(&args[0], &args[1], env) {
        Ok(()) => k(m, env),
        Err(ball) => Promise::ball(ball),
    }
}

pub(crate) fn solve_current_prolog_flag(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
) -> Promise {
    match env.resolve(&args[0]) {
        Term::Atom(a) => match m.flag_value(a.as_str()) {
            Some(value) => Promise::unify(m, &args[1], &value, k, env),
            None => Promise::ball(error::domain_error("prolog_flag", Term::Atom(a))),
        },
        Term::Var(_) => {
            let alts: Vec<Thunk> = Machine::flag_names()
                .iter()
                .map(|name| {
                    let flag = args[0].clone();
                    let value_pattern = args[1].clone();
                    let k = k.clone();
                    let env = env.clone();
                    let name = *name;
                    Box::new(move |m: &mut Machine| {
                        let value = m.flag_value(name).expect("flag_names are all readable");
                        let bound = env
                            .unify(&flag, &Term::atom(name), false)
                            .and_then(|env| env.unify(&value_pattern, &value, false));
                        match bound {
                            Some(env) => k(m, &env),
                            None => Promise::Fail,
                        }
                    }) as Thunk
                })
                .collect();
            Promise::delay(alts)
        }
        other => Promise::ball(error::type_error("atom", env.resolve_deep(&other))),
    }
}

fn operator_names(t: &Term, env: &Env) -> Result<Vec<Atom>, Term> {
    let t = env.resolve(t);
    match &t {
        Term::Var(_) => Err(error::instantiation_error()),
        Term::Atom(a) => Ok(vec![*a]),
        Term::Compound(c) if c.functor.as_str() == "." && c.args.len() == 2 => {
            let mut names = Vec::new();
            let mut it = t.list_iter(env);
            for item in it.by_ref() {
                match item {
                    Term::Var(_) => return Err(error::instantiation_error()),
                    Term::Atom(a) => names.push(a),
                    other => {
                        return Err(error::type_error("atom", env.resolve_deep(&other)))
                    }
                }
            }
            match it.tail() {
                t if t.is_nil() => Ok(names),
                Term::Var(_) => Err(error::instantiation_error()),
                _ => Err(error::type_error("list", env.resolve_deep(&t))),
            }
        }
        other => Err(error::type_error("list", env.resolve_deep(other))),
    }
}

pub(crate) fn solve_op(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let priority = match env.resolve(&args[0]) {
        Term::Var(_) => return Promise::ball(error::instantiation_error()),
        Term::Int(p) => {
            if !(0..=1200).contains(&p) {
                return Promise::ball(error::domain_error("operator_priority", Term::Int(p)));
            }
            p as u16
        }
        other => {
            return Promise::ball(error::type_error("integer", env.resolve_deep(&other)))
        }
    };
    let spec = match env.resolve(&args[1]) {
        Term::Var(_) => return Promise::ball(error::instantiation_error()),
        Term::Atom(a) => match Operator::from_specifier(a.as_str(), priority) {
            Some(_) => a,
            None => {
                return Promise::ball(error::domain_error("operator_specifier", Term::Atom(a)))
            }
        },
        other => return Promise::ball(error::type_error("atom", env.resolve_deep(&other))),
    };
    let names = match operator_names(&args[2], env) {
        Ok(names) => names,
        Err(ball) => return Promise::ball(ball),
    };
    let op = Operator::from_specifier(spec.as_str(), priority).expect("specifier checked above");
    for name in &names {
        if name.as_str() == "," {
            return Promise::ball(error::permission_error(
                "modify",
                "operator",
                Term::Atom(*name),
            ));
        }
        // An atom may not be an infix and a postfix operator at once.
        let conflicting = if op.is_infix() {
            m.operators
                .infix_or_postfix(*name)
                .map(|o| o.is_postfix())
                .unwrap_or(false)
        } else if op.is_postfix() {
            m.operators
                .infix_or_postfix(*name)
                .map(|o| o.is_infix())
                .unwrap_or(false)
        } else {
            false
        };
        if conflicting && priority > 0 {
            return Promise::ball(error::permission_error(
                "create",
                "operator",
                Term::Atom(*name),
            ));
        }
    }
    for name in names {
        m.operators.define(name, spec.as_str(), priority);
    }
    k(m, env)
}

pub(crate) fn solve_current_op(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match env.resolve(&args[0]) {
        Term::Var(_) | Term::Int(_) => {}
        other => return Promise::ball(error::type_error("integer", env.resolve_deep(&other))),
    }
    match env.resolve(&args[1]) {
        Term::Var(_) | Term::Atom(_) => {}
        other => return Promise::ball(error::type_error("atom", env.resolve_deep(&other))),
    }
    match env.resolve(&args[2]) {
        Term::Var(_) | Term::Atom(_) => {}
        other => return Promise::ball(error::type_error("atom", env.resolve_deep(&other))),
    }
    let entries: Vec<(Atom, Operator)> = m.operators.iter().collect();
    let alts: Vec<Thunk> = entries
        .into_iter()
        .map(|(name, op)| {
            let p = args[0].clone();
            let s = args[1].clone();
            let n = args[2].clone();
            let k = k.clone();
            let env = env.clone();
            Box::new(move |m: &mut Machine| {
                let bound = env
                    .unify(&p, &Term::Int(op.priority() as i64), false)
                    .and_then(|env| env.unify(&s, &Term::atom(op.specifier()), false))
                    .and_then(|env| env.unify(&n, &Term::Atom(name), false));
                match bound {
                    Some(env) => k(m, &env),
                    None => Promise::Fail,
                }
            }) as Thunk
        })
        .collect();
    Promise::delay(alts)
}

fn one_char(t: &Term, env: &Env) -> Result<Option<char>, Term> {
    match env.resolve(t) {
        Term::Var(_) => Ok(None),
        Term::Atom(a) if a.as_str().chars().count() == 1 => {
            Ok(Some(a.as_str().chars().next().unwrap()))
        }
        other => Err(error::type_error("character", env.resolve_deep(&other))),
    }
}

pub(crate) fn solve_char_conversion(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
) -> Promise {
    let from = match one_char(&args[0], env) {
        Ok(Some(c)) => c,
        Ok(None) => return Promise::ball(error::instantiation_error()),
        Err(ball) => return Promise::ball(ball),
    };
    let to = match one_char(&args[1], env) {
        Ok(Some(c)) => c,
        Ok(None) => return Promise::ball(error::instantiation_error()),
        Err(ball) => return Promise::ball(ball),
    };
    if from == to {
        m.char_conversion.remove(&from);
    } else {
        m.char_conversion.insert(from, to);
    }
    k(m, env)
}

pub(crate) fn solve_current_char_conversion(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
) -> Promise {
    if let Err(ball) = one_char(&args[0], env).and(one_char(&args[1], env)) {
        return Promise::ball(ball);
    }
    let entries: Vec<(char, char)> = m
        .char_conversion
        .iter()
        .map(|(a, b)| (*a, *b))
        .collect();
    let alts: Vec<Thunk> = entries
        .into_iter()
        .map(|(from, to)| {
            let a = args[0].clone();
            let b = args[1].clone();
            let k = k.clone();
            let env = env.clone();
            Box::new(move |m: &mut Machine| {
                let bound = env
                    .unify(&a, &Term::atom(&from.to_string()), false)
                    .and_then(|env| env.unify(&b, &Term::atom(&to.to_string()), false));
                match bound {
                    Some(env) => k(m, &env),
                    None => Promise::Fail,
                }
            }) as Thunk
        })
        .collect();
    Promise::delay(alts)
}
