use std::rc::Rc;

use crate::compile::{Bytecode, Op};
use crate::db::Clause;
use crate::env::Env;
use crate::machine::Machine;
use crate::solve::{Barrier, Cont, Promise};
use crate::term::{Term, Var};

/// One clause activation. `args` is the list being consumed (head
/// matching) or produced (body building); `astack` stacks the pending
/// outer lists while a nested compound is walked. After `Enter` the
/// two registers are seeded with the same fresh variable, so emitting
/// argument cells through `args` instantiates the list `astack` sees.
struct Activation {
    code: Rc<Bytecode>,
    pc: usize,
    vars: Rc<Vec<Term>>,
    args: Term,
    astack: Term,
    barrier: Barrier,
    k: Cont,
    env: Env,
}

/// Tries one clause against a call: fresh variables, head match, body
/// execution, continuation threading. Non-determinism only ever
/// appears through the promises `Call` dispatch returns.
pub(crate) fn solve_clause(
    clause: &Rc<Clause>,
    args: &[Term],
    barrier: Barrier,
    k: &Cont,
    env: &Env,
) -> Promise {
    let vars: Vec<Term> = (0..clause.code.nvars)
        .map(|_| Term::Var(Var::fresh()))
        .collect();
    let r = Activation {
        code: clause.code.clone(),
        pc: 0,
        vars: Rc::new(vars),
        args: Term::list(args.to_vec()),
        astack: Term::nil(),
        barrier,
        k: k.clone(),
        env: env.clone(),
    };
    exec_promise(r)
}

fn exec_promise(r: Activation) -> Promise {
    Promise::delay(vec![Box::new(move |m| exec(m, r))])
}

/// Takes the next cell off an argument list, materialising it when the
/// list is still an unbound tail (building direction).
fn take_arg(args: &Term, env: &Env) -> Option<(Term, Term, Env)> {
    match env.resolve(args) {
        Term::Compound(c) if c.functor.as_str() == "." && c.args.len() == 2 => {
            Some((c.args[0].clone(), c.args[1].clone(), env.clone()))
        }
        Term::Var(v) => {
            let head = Term::Var(Var::fresh());
            let tail = Term::Var(Var::fresh());
            let env = env.bind(v, Term::cons(head.clone(), tail.clone()));
            Some((head, tail, env))
        }
        _ => None,
    }
}

/// Unifies a register with `[]`, closing the list it denotes.
fn close_list(t: &Term, env: &Env) -> Option<Env> {
    env.unify(t, &Term::nil(), false)
}

fn exec(m: &mut Machine, mut r: Activation) -> Promise {
    loop {
        let op = r.code.code[r.pc];
        match op {
            Op::Const(slot) => {
                let (head, tail, env) = match take_arg(&r.args, &r.env) {
                    Some(x) => x,
                    None => return Promise::Fail,
                };
                match env.unify(&head, &r.code.consts[slot], false) {
                    Some(env) => {
                        r.env = env;
                        r.args = tail;
                        r.pc += 1;
                    }
                    None => return Promise::Fail,
                }
            }
            Op::Var(slot) => {
                let (head, tail, env) = match take_arg(&r.args, &r.env) {
                    Some(x) => x,
                    None => return Promise::Fail,
                };
                match env.unify(&head, &r.vars[slot], false) {
                    Some(env) => {
                        r.env = env;
                        r.args = tail;
                        r.pc += 1;
                    }
                    None => return Promise::Fail,
                }
            }
            Op::Functor(slot) => {
                let (head, tail, env) = match take_arg(&r.args, &r.env) {
                    Some(x) => x,
                    None => return Promise::Fail,
                };
                let pi = r.code.pis[slot];
                match env.resolve(&head) {
                    Term::Compound(c) if c.functor == pi.name && c.args.len() == pi.arity => {
                        r.env = env;
                        r.astack = Term::cons(tail, r.astack);
                        r.args = Term::list(c.args.clone());
                        r.pc += 1;
                    }
                    Term::Var(v) => {
                        let fresh: Vec<Term> =
                            (0..pi.arity).map(|_| Term::Var(Var::fresh())).collect();
                        let built = Term::apply(pi.name, fresh.clone());
                        r.env = env.bind(v, built);
                        r.astack = Term::cons(tail, r.astack);
                        r.args = Term::list(fresh);
                        r.pc += 1;
                    }
                    _ => return Promise::Fail,
                }
            }
            Op::Pop => {
                let env = match close_list(&r.args, &r.env) {
                    Some(env) => env,
                    None => return Promise::Fail,
                };
                match env.resolve(&r.astack) {
                    Term::Compound(c) if c.functor.as_str() == "." && c.args.len() == 2 => {
                        r.env = env;
                        r.args = c.args[0].clone();
                        r.astack = c.args[1].clone();
                        r.pc += 1;
                    }
                    _ => return Promise::Fail,
                }
            }
            Op::Enter => {
                let env = match close_list(&r.args, &r.env) {
                    Some(env) => env,
                    None => return Promise::Fail,
                };
                let env = match close_list(&r.astack, &env) {
                    Some(env) => env,
                    None => return Promise::Fail,
                };
                let v = Term::Var(Var::fresh());
                r.env = env;
                r.args = v.clone();
                r.astack = v;
                r.pc += 1;
            }
            Op::Call(slot) => {
                let env = match close_list(&r.args, &r.env) {
                    Some(env) => env,
                    None => return Promise::Fail,
                };
                let argv: Vec<Term> = r.astack.list_iter(&env).collect();
                let pi = r.code.pis[slot];
                let code = r.code.clone();
                let vars = r.vars.clone();
                let barrier = r.barrier;
                let k = r.k.clone();
                let pc = r.pc + 1;
                let resume: Cont = Rc::new(move |_, env: &Env| {
                    let v = Term::Var(Var::fresh());
                    exec_promise(Activation {
                        code: code.clone(),
                        pc,
                        vars: vars.clone(),
                        args: v.clone(),
                        astack: v,
                        barrier,
                        k: k.clone(),
                        env: env.clone(),
                    })
                });
                return Promise::delay(vec![Box::new(move |m| {
                    m.arrive(pi, argv, barrier, &resume, &env)
                })]);
            }
            Op::Exit => return (r.k)(m, &r.env),
            Op::Cut => {
                r.pc += 1;
                return Promise::Cut {
                    barrier: r.barrier,
                    then: Box::new(move |m| exec(m, r)),
                };
            }
        }
    }
}
