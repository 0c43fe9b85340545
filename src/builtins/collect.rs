use std::collections::HashSet;

use crate::env::Env;
use crate::error;
use crate::machine::Machine;
use crate::solve::{Cont, Outcome, Promise, Thunk};
use crate::term::{compare, variant, Term};

/// Drives `goal` to exhaustion, returning one renamed copy of
/// `template` per solution.
fn collect_all(
    m: &mut Machine,
    goal: &Term,
    template: &Term,
    env: &Env,
) -> Result<Vec<Term>, Promise> {
    let mut eval = m.eval_goal(goal, env);
    let mut out = Vec::new();
    loop {
        match eval.next_solution(m) {
            Outcome::Solution(solution_env) => out.push(solution_env.copy_term(template)),
            Outcome::Exhausted => return Ok(out),
            Outcome::Error(e) => return Err(Promise::Raise(e)),
        }
    }
}

pub(crate) fn solve_findall(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    // The output argument must be a list, a partial list or unbound.
    let mut it = args[2].list_iter(env);
    it.by_ref().for_each(drop);
    match it.tail() {
        Term::Var(_) => {}
        t if t.is_nil() => {}
        _ => {
            return Promise::ball(error::type_error("list", env.resolve_deep(&args[2])));
        }
    }
    match collect_all(m, &args[1], &args[0], env) {
        Ok(solutions) => Promise::unify(m, &Term::list(solutions), &args[2], k, env),
        Err(p) => p,
    }
}

/// Peels `V ^ Goal` qualifiers, recording the variables of each `V` as
/// existential.
fn strip_existential(goal: &Term, env: &Env, existential: &mut HashSet<u64>) -> Term {
    match env.resolve(goal) {
        Term::Compound(c) if c.functor.as_str() == "^" && c.args.len() == 2 => {
            for v in env.free_variables(&c.args[0]) {
                existential.insert(v.id);
            }
            strip_existential(&c.args[1], env, existential)
        }
        t => t,
    }
}

fn grouped_solutions(
    m: &mut Machine,
    args: &[Term],
    env: &Env,
) -> Result<(Term, Vec<(Term, Vec<Term>)>), Promise> {
    let mut existential = HashSet::new();
    let goal = strip_existential(&args[1], env, &mut existential);
    for v in env.free_variables(&args[0]) {
        existential.insert(v.id);
    }
    let witnesses: Vec<Term> = env
        .free_variables(&goal)
        .into_iter()
        .filter(|v| !existential.contains(&v.id))
        .map(Term::Var)
        .collect();
    let witness = Term::list(witnesses);

    // One copy per solution keeps witness/template sharing intact.
    let pair_template = Term::compound("-", vec![witness.clone(), args[0].clone()]);
    let pairs = collect_all(m, &goal, &pair_template, env)?;

    let scratch = Env::default();
    let mut groups: Vec<(Term, Vec<Term>)> = Vec::new();
    for pair in pairs {
        let (w, instance) = match &pair {
            Term::Compound(c) if c.args.len() == 2 => (c.args[0].clone(), c.args[1].clone()),
            _ => unreachable!("pair template is -/2"),
        };
        // Solutions whose witnesses are variants share a group.
        match groups.iter_mut().find(|(gw, _)| variant(gw, &w, &scratch)) {
            Some((_, instances)) => instances.push(instance),
            None => groups.push((w, vec![instance])),
        }
    }
    Ok((witness, groups))
}

fn group_alternatives(
    witness: Term,
    groups: Vec<(Term, Vec<Term>)>,
    out: &Term,
    k: &Cont,
    env: &Env,
) -> Promise {
    if groups.is_empty() {
        return Promise::Fail;
    }
    let alts: Vec<Thunk> = groups
        .into_iter()
        .map(|(group_witness, instances)| {
            let witness = witness.clone();
            let out = out.clone();
            let k = k.clone();
            let env = env.clone();
            Box::new(move |m: &mut Machine| {
                let bound = env
                    .unify(&witness, &group_witness, false)
                    .and_then(|env| env.unify(&out, &Term::list(instances), false));
                match bound {
                    Some(env) => k(m, &env),
                    None => Promise::Fail,
                }
            }) as Thunk
        })
        .collect();
    Promise::delay(alts)
}

pub(crate) fn solve_bagof(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match grouped_solutions(m, args, env) {
        Ok((witness, groups)) => group_alternatives(witness, groups, &args[2], k, env),
        Err(p) => p,
    }
}

pub(crate) fn solve_setof(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match grouped_solutions(m, args, env) {
        Ok((witness, mut groups)) => {
            let scratch = Env::default();
            for (_, instances) in groups.iter_mut() {
                instances.sort_by(|a, b| compare(a, b, &scratch));
                instances.dedup_by(|a, b| compare(a, b, &scratch) == std::cmp::Ordering::Equal);
            }
            groups.sort_by(|(a, _), (b, _)| compare(a, b, &scratch));
            group_alternatives(witness, groups, &args[2], k, env)
        }
        Err(p) => p,
    }
}
