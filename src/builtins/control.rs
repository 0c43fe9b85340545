use std::rc::Rc;

use crate::env::Env;
use crate::error::{self, Exception};
use crate::flags::Flags;
use crate::machine::Machine;
use crate::solve::{Barrier, CatchData, Cont, Outcome, Promise, Thunk};
use crate::term::Term;

pub(crate) fn solve_true(m: &mut Machine, _: &[Term], k: &Cont, env: &Env) -> Promise {
    k(m, env)
}

pub(crate) fn solve_fail(_: &mut Machine, _: &[Term], _: &Cont, _: &Env) -> Promise {
    Promise::Fail
}

pub(crate) fn solve_cut(
    _: &mut Machine,
    _: &[Term],
    barrier: Barrier,
    k: &Cont,
    env: &Env,
) -> Promise {
    let k = k.clone();
    let env = env.clone();
    Promise::Cut {
        barrier,
        then: Box::new(move |m| k(m, &env)),
    }
}

pub(crate) fn solve_and(
    m: &mut Machine,
    args: &[Term],
    barrier: Barrier,
    k: &Cont,
    env: &Env,
) -> Promise {
    let second = args[1].clone();
    let k = k.clone();
    let rest: Cont = Rc::new(move |m, env| m.solve_goal(&second, barrier, &k, env));
    m.solve_goal(&args[0], barrier, &rest, env)
}

pub(crate) fn solve_or(
    m: &mut Machine,
    args: &[Term],
    barrier: Barrier,
    k: &Cont,
    env: &Env,
) -> Promise {
    // The if-then-else triad claims the disjunction.
    if let Term::Compound(c) = env.resolve(&args[0]) {
        if c.functor.as_str() == "->" && c.args.len() == 2 {
            return if_then_else(
                c.args[0].clone(),
                c.args[1].clone(),
                Some(args[1].clone()),
                barrier,
                k,
                env,
            );
        }
    }
    let alts = [&args[0], &args[1]]
        .into_iter()
        .map(|goal| {
            let goal = goal.clone();
            let k = k.clone();
            let env = env.clone();
            Box::new(move |m: &mut Machine| m.solve_goal(&goal, barrier, &k, &env)) as Thunk
        })
        .collect();
    Promise::delay(alts)
}

pub(crate) fn solve_if_then(
    _: &mut Machine,
    args: &[Term],
    barrier: Barrier,
    k: &Cont,
    env: &Env,
) -> Promise {
    if_then_else(args[0].clone(), args[1].clone(), None, barrier, k, env)
}

/// The local cut of `->`: the condition runs under its own barrier;
/// its first solution commits, pruning both the condition's
/// choice points and the pending else branch.
fn if_then_else(
    cond: Term,
    then: Term,
    els: Option<Term>,
    barrier: Barrier,
    k: &Cont,
    env: &Env,
) -> Promise {
    let local = Barrier::fresh();
    let mut alts: Vec<Thunk> = Vec::new();
    {
        let k = k.clone();
        let env = env.clone();
        alts.push(Box::new(move |m: &mut Machine| {
            let commit: Cont = Rc::new(move |_, env| {
                let then = then.clone();
                let k = k.clone();
                let env = env.clone();
                Promise::Cut {
                    barrier: local,
                    then: Box::new(move |m| m.solve_goal(&then, barrier, &k, &env)),
                }
            });
            m.solve_goal(&cond, local, &commit, &env)
        }));
    }
    if let Some(els) = els {
        let k = k.clone();
        let env = env.clone();
        alts.push(Box::new(move |m: &mut Machine| {
            m.solve_goal(&els, barrier, &k, &env)
        }));
    }
    Promise::Delay {
        barrier: Some(local),
        alts,
    }
}

/// `call/N`: the first argument applied to the remaining ones, opaque
/// to cut.
pub(crate) fn call_n(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let goal = env.resolve(&args[0]);
    let extra = &args[1..];
    let combined = match goal.as_callable() {
        Some((f, goal_args)) => {
            if goal_args.len() + extra.len() > Flags::MAX_ARITY {
                return Promise::ball(error::representation_error("max_arity"));
            }
            let mut all = goal_args.to_vec();
            all.extend_from_slice(extra);
            Term::apply(f, all)
        }
        None => {
            return match goal {
                Term::Var(_) => Promise::ball(error::instantiation_error()),
                other => Promise::ball(error::type_error("callable", env.resolve_deep(&other))),
            }
        }
    };
    m.solve_call(&combined, k, env)
}

/// Negation as failure: committed, and opaque to cut.
pub(crate) fn solve_not_provable(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let mut eval = m.eval_goal(&args[0], env);
    match eval.next_solution(m) {
        Outcome::Solution(_) => Promise::Fail,
        Outcome::Exhausted => k(m, env),
        Outcome::Error(e) => Promise::Raise(e),
    }
}

pub(crate) fn solve_catch(_: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    Promise::Catch(Box::new(CatchData {
        goal: args[0].clone(),
        catcher: args[1].clone(),
        recovery: args[2].clone(),
        k: k.clone(),
        env: env.clone(),
    }))
}

pub(crate) fn solve_throw(_: &mut Machine, args: &[Term], _: &Cont, env: &Env) -> Promise {
    // The ball leaves the environment it was built in, so it must be
    // fully instantiated and is materialised at throw time.
    let ball = env.resolve_deep(&args[0]);
    if !env.free_variables(&ball).is_empty() {
        return Promise::ball(error::instantiation_error());
    }
    Promise::ball(ball)
}

pub(crate) fn solve_repeat(_: &mut Machine, _: &[Term], k: &Cont, env: &Env) -> Promise {
    repeat(k.clone(), env.clone())
}

fn repeat(k: Cont, env: Env) -> Promise {
    let again_k = k.clone();
    let again_env = env.clone();
    Promise::delay(vec![
        Box::new(move |m: &mut Machine| k(m, &env)),
        Box::new(move |_: &mut Machine| repeat(again_k, again_env)),
    ])
}

pub(crate) fn solve_halt(m: &mut Machine, args: &[Term], _: &Cont, env: &Env) -> Promise {
    let code = if args.is_empty() {
        0
    } else {
        match env.resolve(&args[0]) {
            Term::Int(i) => i,
            Term::Var(_) => return Promise::ball(error::instantiation_error()),
            other => {
                return Promise::ball(error::type_error("integer", env.resolve_deep(&other)))
            }
        }
    };
    m.run_halt_hooks(code);
    Promise::Raise(Exception::Halt(code))
}
