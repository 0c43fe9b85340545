use std::io::Write;

use crate::env::Env;
use crate::error;
use crate::machine::Machine;
use crate::solve::{Cont, Promise};
use crate::term::Term;
use crate::writer::{term_to_string, WriteOptions};

fn emit(m: &mut Machine, text: &str, k: &Cont, env: &Env) -> Promise {
    match m.out.write_all(text.as_bytes()) {
        Ok(()) => k(m, env),
        Err(e) => Promise::ball(error::system_error(&e.to_string())),
    }
}

fn write_with(m: &mut Machine, args: &[Term], k: &Cont, env: &Env, opts: WriteOptions) -> Promise {
    let text = term_to_string(&args[0], env, &m.operators, &opts);
    emit(m, &text, k, env)
}

pub(crate) fn solve_write(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    write_with(m, args, k, env, WriteOptions::default())
}

pub(crate) fn solve_writeq(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    write_with(m, args, k, env, WriteOptions::quoted())
}

pub(crate) fn solve_write_canonical(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
) -> Promise {
    write_with(m, args, k, env, WriteOptions::canonical())
}

pub(crate) fn solve_nl(m: &mut Machine, _: &[Term], k: &Cont, env: &Env) -> Promise {
    emit(m, "\n", k, env)
}

/// `write_term(Term, Options)` with the quoted/ignore_ops/numbervars
/// option list.
pub(crate) fn solve_write_term(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let mut opts = WriteOptions {
        quoted: false,
        ignore_ops: false,
        numbervars: false,
    };
    let mut it = args[1].list_iter(env);
    for option in it.by_ref() {
        let (name, value) = match &option {
            Term::Var(_) => return Promise::ball(error::instantiation_error()),
            Term::Compound(c) if c.args.len() == 1 => {
                let value = match env.resolve(&c.args[0]) {
                    Term::Atom(a) if a.as_str() == "true" => true,
                    Term::Atom(a) if a.as_str() == "false" => false,
                    _ => {
                        return Promise::ball(error::domain_error(
                            "write_option",
                            env.resolve_deep(&option),
                        ))
                    }
                };
                (c.functor.as_str(), value)
            }
            other => {
                return Promise::ball(error::domain_error(
                    "write_option",
                    env.resolve_deep(other),
                ))
            }
        };
        match name {
            "quoted" => opts.quoted = value,
            "ignore_ops" => opts.ignore_ops = value,
            "numbervars" => opts.numbervars = value,
            _ => {
                return Promise::ball(error::domain_error(
                    "write_option",
                    env.resolve_deep(&option),
                ))
            }
        }
    }
    match it.tail() {
        t if t.is_nil() => {}
        Term::Var(_) => return Promise::ball(error::instantiation_error()),
        _ => {
            return Promise::ball(error::type_error("list", env.resolve_deep(&args[1])))
        }
    }
    write_with(m, args, k, env, opts)
}
