use std::collections::HashMap;
use std::io::{self, Read};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};

use crate::builtins::{self, Builtin};
use crate::db::{HostFn, Procedure, Rules};
use crate::env::Env;
use crate::error::{self, Error};
use crate::flags::{Flags, UnknownFlag};
use crate::operators::OperatorTable;
use crate::reader::Reader;
use crate::solve::{Barrier, Cont, Eval, Outcome, Promise, Thunk};
use crate::term::{Indicator, Term, Var};
use crate::{compile, db, vm};

/// A binding snapshot: named top-level variables mapped to their
/// resolved terms, in first-encounter order.
pub type Bindings = IndexMap<String, Term>;

/// A cancellation handle; clone it into another thread and call
/// [`Interrupt::interrupt`] to abort the evaluation in progress.
#[derive(Clone)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A Prolog engine: clause database, flag set, operator table and the
/// evaluation machinery, bundled in one value. A single engine is
/// single-threaded; holding the [`Solutions`] of a query mutably
/// borrows the engine, so a second concurrent query is rejected at
/// compile time. Independent engines are independent.
pub struct Machine {
    pub(crate) procedures: IndexMap<Indicator, Procedure>,
    pub(crate) flags: Flags,
    pub(crate) operators: OperatorTable,
    pub(crate) char_conversion: HashMap<char, char>,
    pub(crate) out: Box<dyn io::Write>,
    halt_hooks: Vec<Box<dyn Fn(i64)>>,
    on_unknown: Option<Box<dyn FnMut(Indicator)>>,
    interrupt: Arc<AtomicBool>,
}

const BOOTSTRAP: &str = include_str!("boot.pl");

impl Default for Machine {
    fn default() -> Self {
        Machine::new()
    }
}

impl Machine {
    /// A new engine with the default flags, the ISO operator table and
    /// the bootstrap library loaded.
    pub fn new() -> Self {
        let mut m = Machine {
            procedures: IndexMap::new(),
            flags: Flags::default(),
            operators: OperatorTable::default(),
            char_conversion: HashMap::new(),
            out: Box::new(io::stdout()),
            halt_hooks: Vec::new(),
            on_unknown: None,
            interrupt: Arc::new(AtomicBool::new(false)),
        };
        m.consult(BOOTSTRAP).expect("bootstrap is well-formed");
        m
    }

    // ------------------------------------------------------------------
    // Embedding API

    /// Reads a program from `source`, executing `:- Goal` directives as
    /// they are encountered and asserting every other term as a static
    /// clause.
    pub fn load_program<R: Read>(&mut self, mut source: R) -> Result<(), Error> {
        let mut text = String::new();
        source
            .read_to_string(&mut text)
            .map_err(|e| Error::Uncaught(error::system_error(&e.to_string())))?;
        self.consult(&text)
    }

    /// [`Machine::load_program`] over a string.
    pub fn consult(&mut self, text: &str) -> Result<(), Error> {
        let mut offset = 0;
        loop {
            // The reader borrows the live operator table, so a term is
            // read and dropped before its directive can mutate it.
            let (term, next_offset) = {
                let mut reader = Reader::new(
                    &text[offset..],
                    &self.operators,
                    &self.flags,
                    Some(&self.char_conversion),
                );
                let term = reader
                    .next_term()
                    .map_err(|e| Error::Uncaught(e.into_ball()))?;
                (term, offset + reader.offset())
            };
            offset = next_offset;
            let term = match term {
                None => return Ok(()),
                Some(t) => t,
            };
            match &term {
                Term::Compound(c) if c.functor.as_str() == ":-" && c.args.len() == 1 => {
                    self.run_directive(&c.args[0])?;
                }
                _ => {
                    if let Err(ball) = self.assert_term(&term, &Env::default(), true, false) {
                        return Err(Error::Uncaught(ball));
                    }
                }
            }
        }
    }

    fn run_directive(&mut self, goal: &Term) -> Result<(), Error> {
        let mut eval = self.eval_goal(goal, &Env::default());
        match eval.next_solution(self) {
            Outcome::Solution(_) => Ok(()),
            Outcome::Exhausted => {
                warn!("directive failed: {}", goal);
                Ok(())
            }
            Outcome::Error(e) => Err(e.into()),
        }
    }

    /// Runs a query; each solution is a binding snapshot for the named
    /// variables of the query text. Dropping the iterator discards the
    /// remaining proof tree.
    pub fn query(&mut self, text: &str) -> Result<Solutions<'_>, Error> {
        let text = {
            let trimmed = text.trim_end();
            if trimmed.ends_with('.') {
                trimmed.to_string()
            } else {
                format!("{}.", trimmed)
            }
        };
        let (goal, vars) = {
            let mut reader = Reader::new(
                &text,
                &self.operators,
                &self.flags,
                Some(&self.char_conversion),
            );
            let goal = reader
                .next_term()
                .map_err(|e| Error::Uncaught(e.into_ball()))?
                .ok_or_else(|| Error::Uncaught(error::syntax_error("empty query")))?;
            (goal, reader.named_variables().to_vec())
        };
        Ok(self.query_term(goal, vars))
    }

    /// Runs an already-constructed goal term.
    pub fn query_term(&mut self, goal: Term, vars: Vec<Var>) -> Solutions<'_> {
        let eval = self.eval_goal(&goal, &Env::default());
        Solutions {
            machine: self,
            eval,
            vars,
            done: false,
        }
    }

    /// Installs a host-defined predicate for `name/arity`.
    pub fn register_builtin<F>(&mut self, name: &str, arity: usize, handler: F)
    where
        F: Fn(&mut Machine, &[Term], &Cont, &Env) -> Promise + 'static,
    {
        let pi = Indicator::new(crate::atom::Atom::new(name), arity);
        self.procedures
            .insert(pi, Procedure::Host(Rc::new(handler) as HostFn));
    }

    /// Reads a flag by name.
    pub fn get_flag(&self, name: &str) -> Option<Term> {
        self.flag_value(name)
    }

    /// Sets a writable flag; read-only flags and bad values produce the
    /// same ISO errors `set_prolog_flag/2` raises.
    pub fn set_flag(&mut self, name: &str, value: &Term) -> Result<(), Error> {
        self.set_flag_checked(&Term::atom(name), value, &Env::default())
            .map_err(Error::Uncaught)
    }

    /// Registers a hook run before `halt/0` and `halt/1` surface.
    pub fn on_halt<F: Fn(i64) + 'static>(&mut self, hook: F) {
        self.halt_hooks.push(Box::new(hook));
    }

    /// Registers the callback invoked when an unknown procedure is
    /// reached under `unknown=warning`.
    pub fn on_unknown<F: FnMut(Indicator) + 'static>(&mut self, hook: F) {
        self.on_unknown = Some(Box::new(hook));
    }

    /// A handle that cancels the evaluation in progress.
    pub fn interrupt_handle(&self) -> Interrupt {
        Interrupt(self.interrupt.clone())
    }

    /// Redirects the writer builtins (`write/1` and friends).
    pub fn set_output<W: io::Write + 'static>(&mut self, out: W) {
        self.out = Box::new(out);
    }

    // ------------------------------------------------------------------
    // Goal dispatch

    pub(crate) fn take_interrupt(&self) -> bool {
        if self.interrupt.load(Ordering::Relaxed) {
            self.interrupt.store(false, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub(crate) fn eval_goal(&mut self, goal: &Term, env: &Env) -> Eval {
        let k: Cont = Rc::new(|_, env| Promise::solution(env));
        let goal = goal.clone();
        let env = env.clone();
        let barrier = Barrier::fresh();
        Eval::new(Box::new(move |_| {
            Promise::barrier(
                barrier,
                Box::new(move |m| m.solve_goal(&goal, barrier, &k, &env)),
            )
        }))
    }

    /// Resolves a goal term and dispatches it. Control constructs see
    /// `barrier` so that a cut inside them prunes the enclosing clause.
    pub(crate) fn solve_goal(
        &mut self,
        goal: &Term,
        barrier: Barrier,
        k: &Cont,
        env: &Env,
    ) -> Promise {
        match env.resolve(goal) {
            Term::Var(_) => Promise::ball(error::instantiation_error()),
            Term::Int(_) | Term::Float(_) => {
                Promise::ball(error::type_error("callable", env.resolve_deep(goal)))
            }
            Term::Atom(a) => self.arrive(Indicator::new(a, 0), Vec::new(), barrier, k, env),
            Term::Compound(c) => self.arrive(
                Indicator::new(c.functor, c.args.len()),
                c.args.clone(),
                barrier,
                k,
                env,
            ),
        }
    }

    /// `call/1` semantics: a fresh barrier makes the goal opaque to
    /// cut. This is the entry point host predicates use to call back
    /// into Prolog.
    pub fn solve_call(&mut self, goal: &Term, k: &Cont, env: &Env) -> Promise {
        let barrier = Barrier::fresh();
        let goal = env.resolve(goal);
        let k = k.clone();
        let env = env.clone();
        Promise::barrier(
            barrier,
            Box::new(move |m| m.solve_goal(&goal, barrier, &k, &env)),
        )
    }

    /// The procedure dispatch state machine: builtin lookup, then the
    /// user database, then the `unknown` flag.
    pub(crate) fn arrive(
        &mut self,
        pi: Indicator,
        args: Vec<Term>,
        barrier: Barrier,
        k: &Cont,
        env: &Env,
    ) -> Promise {
        if self.flags.debug {
            debug!("call {}", pi);
        }

        // call/N is resolved generically for every arity.
        if pi.name.as_str() == "call" && pi.arity >= 1 {
            return builtins::control::call_n(self, &args, k, env);
        }

        if let Some(b) = builtins::lookup(pi) {
            return match b {
                Builtin::Solve(f) => f(self, &args, k, env),
                Builtin::Control(f) => f(self, &args, barrier, k, env),
            };
        }

        match self.procedures.get(&pi) {
            Some(Procedure::Host(f)) => {
                let f = f.clone();
                f(self, &args, k, env)
            }
            Some(Procedure::Rules(rules)) => {
                // Snapshot the clause list: the logical update view.
                let clauses = rules.clauses.clone();
                let clause_barrier = Barrier::fresh();
                let alts: Vec<Thunk> = clauses
                    .into_iter()
                    .map(|clause| {
                        let k = k.clone();
                        let env = env.clone();
                        let args = args.clone();
                        Box::new(move |_: &mut Machine| {
                            vm::solve_clause(&clause, &args, clause_barrier, &k, &env)
                        }) as Thunk
                    })
                    .collect();
                Promise::Delay {
                    barrier: Some(clause_barrier),
                    alts,
                }
            }
            None => match self.flags.unknown {
                UnknownFlag::Error => Promise::ball(error::existence_error_procedure(pi)),
                UnknownFlag::Warning => {
                    warn!("unknown procedure {}", pi);
                    if let Some(mut hook) = self.on_unknown.take() {
                        hook(pi);
                        self.on_unknown = Some(hook);
                    }
                    Promise::Fail
                }
                UnknownFlag::Fail => Promise::Fail,
            },
        }
    }

    // ------------------------------------------------------------------
    // Clause store

    pub(crate) fn is_reserved(&self, pi: Indicator) -> bool {
        builtins::lookup(pi).is_some() || (pi.name.as_str() == "call" && pi.arity >= 1)
    }

    /// Asserts one clause. `front` prepends; `runtime` marks asserts
    /// coming from `asserta/assertz` (which require a dynamic
    /// procedure and create one), as opposed to consulted clauses
    /// (static unless declared otherwise). The error is a Prolog ball.
    pub(crate) fn assert_term(
        &mut self,
        term: &Term,
        env: &Env,
        append: bool,
        runtime: bool,
    ) -> Result<(), Term> {
        let (head, body) = db::split_clause(term, env)?;
        let pi = head.indicator().expect("split_clause returns callable heads");
        if self.is_reserved(pi) {
            return Err(error::permission_error(
                "modify",
                "static_procedure",
                pi.to_term(),
            ));
        }
        let code = compile::compile_clause(&head, &body, env)?;
        let clause = Rc::new(db::Clause {
            head: env.resolve_deep(&head),
            body: env.resolve_deep(&body),
            code: Rc::new(code),
        });
        match self.procedures.entry(pi) {
            indexmap::map::Entry::Occupied(mut entry) => match entry.get_mut() {
                Procedure::Host(_) => Err(error::permission_error(
                    "modify",
                    "static_procedure",
                    pi.to_term(),
                )),
                Procedure::Rules(rules) => {
                    if runtime && !rules.dynamic {
                        return Err(error::permission_error(
                            "modify",
                            "static_procedure",
                            pi.to_term(),
                        ));
                    }
                    if append {
                        rules.clauses.push(clause);
                    } else {
                        rules.clauses.insert(0, clause);
                    }
                    Ok(())
                }
            },
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(Procedure::Rules(Rules {
                    clauses: vec![clause],
                    dynamic: runtime,
                    discontiguous: false,
                }));
                Ok(())
            }
        }
    }

    /// Runs the registered before-halt hooks.
    pub(crate) fn run_halt_hooks(&self, code: i64) {
        debug!("halting with exit code {}", code);
        for hook in &self.halt_hooks {
            hook(code);
        }
    }

    // ------------------------------------------------------------------
    // Flags

    pub(crate) fn flag_value(&self, name: &str) -> Option<Term> {
        Some(match name {
            "bounded" => Term::atom("true"),
            "max_integer" => Term::Int(i64::MAX),
            "min_integer" => Term::Int(i64::MIN),
            "integer_rounding_function" => Term::atom("toward_zero"),
            "max_arity" => Term::Int(Flags::MAX_ARITY as i64),
            "unknown" => Term::atom(match self.flags.unknown {
                UnknownFlag::Error => "error",
                UnknownFlag::Fail => "fail",
                UnknownFlag::Warning => "warning",
            }),
            "double_quotes" => Term::atom(match self.flags.double_quotes {
                crate::flags::QuoteFlag::Codes => "codes",
                crate::flags::QuoteFlag::Chars => "chars",
                crate::flags::QuoteFlag::Atom => "atom",
            }),
            "char_conversion" => Term::atom(if self.flags.char_conversion { "on" } else { "off" }),
            "debug" => Term::atom(if self.flags.debug { "on" } else { "off" }),
            _ => return None,
        })
    }

    pub(crate) fn flag_names() -> &'static [&'static str] {
        &[
            "bounded",
            "max_integer",
            "min_integer",
            "integer_rounding_function",
            "max_arity",
            "unknown",
            "double_quotes",
            "char_conversion",
            "debug",
        ]
    }

    pub(crate) fn set_flag_checked(
        &mut self,
        name: &Term,
        value: &Term,
        env: &Env,
    ) -> Result<(), Term> {
        let name = env.resolve(name);
        let value = env.resolve(value);
        let flag = match &name {
            Term::Var(_) => return Err(error::instantiation_error()),
            Term::Atom(a) => a.as_str(),
            other => return Err(error::type_error("atom", other.clone())),
        };
        if let Term::Var(_) = value {
            return Err(error::instantiation_error());
        }
        let atom_value = match &value {
            Term::Atom(a) => Some(a.as_str()),
            _ => None,
        };
        let bad_value = || {
            error::domain_error(
                "flag_value",
                Term::compound("+", vec![name.clone(), value.clone()]),
            )
        };
        match flag {
            "unknown" => {
                self.flags.unknown = match atom_value {
                    Some("error") => UnknownFlag::Error,
                    Some("fail") => UnknownFlag::Fail,
                    Some("warning") => UnknownFlag::Warning,
                    _ => return Err(bad_value()),
                };
                Ok(())
            }
            "double_quotes" => {
                self.flags.double_quotes = match atom_value {
                    Some("codes") => crate::flags::QuoteFlag::Codes,
                    Some("chars") => crate::flags::QuoteFlag::Chars,
                    Some("atom") => crate::flags::QuoteFlag::Atom,
                    _ => return Err(bad_value()),
                };
                Ok(())
            }
            "char_conversion" => {
                self.flags.char_conversion = match atom_value {
                    Some("on") => true,
                    Some("off") => false,
                    _ => return Err(bad_value()),
                };
                Ok(())
            }
            "debug" => {
                self.flags.debug = match atom_value {
                    Some("on") => true,
                    Some("off") => false,
                    _ => return Err(bad_value()),
                };
                Ok(())
            }
            "bounded" | "max_integer" | "min_integer" | "integer_rounding_function"
            | "max_arity" => Err(error::permission_error("modify", "flag", name.clone())),
            _ => Err(error::domain_error("prolog_flag", name.clone())),
        }
    }
}

/// The solutions of one query, yielded in depth-first, clause-order
/// sequence.
pub struct Solutions<'m> {
    machine: &'m mut Machine,
    eval: Eval,
    vars: Vec<Var>,
    done: bool,
}

impl<'m> Solutions<'m> {
    /// Discards the remaining proof tree.
    pub fn close(self) {}

    fn snapshot(&self, env: &Env) -> Bindings {
        let mut out = Bindings::new();
        for v in &self.vars {
            let name = v.name.expect("query variables are named").as_str();
            out.insert(name.to_string(), env.resolve_deep(&Term::Var(*v)));
        }
        out
    }
}

impl<'m> Iterator for Solutions<'m> {
    type Item = Result<Bindings, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.eval.next_solution(self.machine) {
            Outcome::Solution(env) => Some(Ok(self.snapshot(&env))),
            Outcome::Exhausted => {
                self.done = true;
                None
            }
            Outcome::Error(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn machine(program: &str) -> Machine {
        let mut m = Machine::new();
        m.consult(program).unwrap();
        m
    }

    /// Each solution rendered as "X=v,Y=w" in variable order.
    fn render(m: &mut Machine, query: &str) -> Vec<String> {
        m.query(query)
            .unwrap()
            .map(|s| {
                let s = s.unwrap();
                s.iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect()
    }

    fn succeeds(m: &mut Machine, query: &str) -> bool {
        m.query(query).unwrap().next().map(|r| r.is_ok()) == Some(true)
    }

    fn fails(m: &mut Machine, query: &str) -> bool {
        m.query(query).unwrap().next().is_none()
    }

    fn error_of(m: &mut Machine, query: &str) -> Error {
        m.query(query)
            .unwrap()
            .find_map(|r| r.err())
            .expect("query should raise")
    }

    fn formal_of(e: Error) -> String {
        match e {
            Error::Uncaught(ball) => {
                let (_, args) = ball.as_callable().unwrap();
                crate::writer::term_to_string(
                    &args[0],
                    &Env::default(),
                    &crate::operators::DEFAULT_TABLE,
                    &crate::writer::WriteOptions::quoted(),
                )
            }
            other => panic!("expected an uncaught ball, got {:?}", other),
        }
    }

    #[test]
    fn ancestor_solutions_in_clause_order() {
        let mut m = machine(
            "parent(a, b). parent(b, c).
             ancestor(X, Y) :- parent(X, Y).
             ancestor(X, Y) :- parent(X, Z), ancestor(Z, Y).",
        );
        assert_eq!(render(&mut m, "ancestor(a, Y)"), vec!["Y=b", "Y=c"]);
    }

    /// The part of each rendered solution from `marker` on; the
    /// template variable of a collector stays unbound in snapshots and
    /// renders with an unpredictable number.
    fn from_marker(solutions: Vec<String>, marker: &str) -> Vec<String> {
        solutions
            .into_iter()
            .map(|s| {
                let at = s.find(marker).expect("marker in solution");
                s[at..].to_string()
            })
            .collect()
    }

    #[test]
    fn findall_collects_in_order() {
        let mut m = Machine::new();
        let solutions = render(&mut m, "findall(X, member(X, [1,2,3]), L)");
        assert_eq!(from_marker(solutions, "L="), vec!["L=[1,2,3]"]);
    }

    #[test]
    fn findall_of_failing_goal_is_empty_list() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "findall(X, fail, [])"));
    }

    #[test]
    fn catch_consumes_matching_balls() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "catch(throw(my_error), E, E = my_error)"));
        let e = error_of(&mut m, "catch(throw(a), b, true)");
        match e {
            Error::Uncaught(ball) => assert_eq!(ball.to_string(), "a"),
            other => panic!("expected uncaught a, got {:?}", other),
        }
    }

    #[test]
    fn catch_rearms_on_backtracking_into_the_goal() {
        let mut m = Machine::new();
        assert_eq!(
            render(
                &mut m,
                "catch((member(X, [1,2]), (X =:= 2 -> throw(two) ; true)), two, X = caught)"
            ),
            vec!["X=1", "X=caught"]
        );
    }

    #[test]
    fn exceptions_from_the_continuation_escape_the_catch() {
        let mut m = Machine::new();
        let e = error_of(&mut m, "catch(true, E, true), throw(out)");
        match e {
            Error::Uncaught(ball) => assert_eq!(ball.to_string(), "out"),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn arithmetic_scenarios() {
        let mut m = Machine::new();
        assert_eq!(render(&mut m, "X is 2 + 3 * 4"), vec!["X=14"]);
        assert_eq!(
            formal_of(error_of(&mut m, "X is 1 / 0")),
            "evaluation_error(zero_divisor)"
        );
        assert_eq!(
            formal_of(error_of(&mut m, "X is foo")),
            "type_error(evaluable,foo/0)"
        );
        assert!(succeeds(&mut m, "1 + 1 =:= 2"));
        assert!(fails(&mut m, "1 > 2"));
        assert!(succeeds(&mut m, "1.0 =:= 1"));
    }

    #[test]
    fn if_then_else_commits() {
        let mut m = Machine::new();
        assert_eq!(
            render(&mut m, "((true ; fail) -> X = a ; X = b)"),
            vec!["X=a"]
        );
        assert_eq!(render(&mut m, "(fail -> X = a ; X = b)"), vec!["X=b"]);
        assert!(fails(&mut m, "(fail -> true)"));
    }

    #[test]
    fn cut_prunes_to_the_clause_barrier() {
        let mut m = machine("p(1). p(2). p(3).");
        assert_eq!(
            render(&mut m, "p(X), !, p(Y)"),
            vec!["X=1,Y=1", "X=1,Y=2", "X=1,Y=3"]
        );
    }

    #[test]
    fn cut_in_call_is_local() {
        let mut m = machine("s(a). s(b). u(X, Y) :- s(X), call((s(Y), !)).");
        assert_eq!(render(&mut m, "u(X, Y)"), vec!["X=a,Y=a", "X=b,Y=a"]);
    }

    #[test]
    fn cut_inside_clause_drops_later_clauses() {
        let mut m = machine("max(X, Y, X) :- X >= Y, !. max(_, Y, Y).");
        assert_eq!(render(&mut m, "max(3, 2, M)"), vec!["M=3"]);
        assert_eq!(render(&mut m, "max(2, 3, M)"), vec!["M=3"]);
    }

    #[test]
    fn negation_as_failure() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "\\+ fail"));
        assert!(fails(&mut m, "\\+ true"));
        assert!(succeeds(&mut m, "\\+ member(4, [1,2,3])"));
    }

    #[test]
    fn repeat_with_cut_terminates() {
        let mut m = Machine::new();
        assert_eq!(render(&mut m, "repeat, !, X = done"), vec!["X=done"]);
    }

    #[test]
    fn bagof_groups_by_witness_in_first_occurrence_order() {
        let mut m = machine("age(peter, 7). age(ann, 11). age(pat, 8). age(tom, 5).");
        let solutions = render(&mut m, "bagof(C, age(C, A), L)");
        assert_eq!(
            from_marker(solutions, "A="),
            vec![
                "A=7,L=[peter]",
                "A=11,L=[ann]",
                "A=8,L=[pat]",
                "A=5,L=[tom]"
            ]
        );
    }

    #[test]
    fn bagof_preserves_duplicates_and_order() {
        let mut m = Machine::new();
        let solutions = render(&mut m, "bagof(X, member(X, [3,1,2,1]), L)");
        assert_eq!(from_marker(solutions, "L="), vec!["L=[3,1,2,1]"]);
    }

    #[test]
    fn setof_sorts_and_dedups() {
        let mut m = Machine::new();
        assert_eq!(
            render(&mut m, "setof(X, member(X, [3,1,2,1]), L)")
                .into_iter()
                .map(|s| s.split("L=").nth(1).unwrap().to_string())
                .collect::<Vec<_>>(),
            vec!["[1,2,3]"]
        );
        assert!(fails(&mut m, "setof(X, member(X, []), L)"));
        assert!(fails(&mut m, "bagof(X, fail, L)"));
    }

    #[test]
    fn setof_existential_qualifier_suppresses_grouping() {
        let mut m = machine("age(peter, 7). age(ann, 11). age(pat, 8).");
        assert_eq!(
            render(&mut m, "setof(C, A^age(C, A), L)")
                .into_iter()
                .map(|s| s.split("L=").nth(1).unwrap().to_string())
                .collect::<Vec<_>>(),
            vec!["[ann,pat,peter]"]
        );
    }

    #[test]
    fn assert_and_retract() {
        let mut m = Machine::new();
        assert!(succeeds(
            &mut m,
            "assertz(q(1)), assertz(q(2)), asserta(q(0))"
        ));
        assert_eq!(
            render(&mut m, "findall(X, q(X), L)")
                .into_iter()
                .map(|s| s.split("L=").nth(1).unwrap().to_string())
                .collect::<Vec<_>>(),
            vec!["[0,1,2]"]
        );
        assert!(succeeds(&mut m, "retract(q(1))"));
        assert_eq!(
            render(&mut m, "findall(X, q(X), L)")
                .into_iter()
                .map(|s| s.split("L=").nth(1).unwrap().to_string())
                .collect::<Vec<_>>(),
            vec!["[0,2]"]
        );
        assert_eq!(render(&mut m, "retract(q(X))"), vec!["X=0", "X=2"]);
        assert!(fails(&mut m, "q(_)"));
    }

    #[test]
    fn retracting_a_running_predicate_keeps_the_snapshot() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "assertz(r(1)), assertz(r(2))"));
        // The first solution retracts everything; the snapshot taken at
        // call time still delivers both.
        assert_eq!(
            render(&mut m, "r(X), (retract(r(1)) -> true ; true), (retract(r(2)) -> true ; true)"),
            vec!["X=1", "X=2"]
        );
    }

    #[test]
    fn asserting_into_static_procedures_is_denied() {
        let mut m = machine("static_fact(1).");
        assert_eq!(
            formal_of(error_of(&mut m, "assertz(static_fact(2))")),
            "permission_error(modify,static_procedure,static_fact/1)"
        );
        assert_eq!(
            formal_of(error_of(&mut m, "assertz(atom(x))")),
            "permission_error(modify,static_procedure,atom/1)"
        );
    }

    #[test]
    fn clause_enumerates_user_clauses() {
        let mut m = machine("f(1). f(X) :- g(X). g(2).");
        assert_eq!(
            render(&mut m, "clause(f(1), B)"),
            vec!["B=true", "B=g(1)"]
        );
        assert_eq!(
            formal_of(error_of(&mut m, "clause(atom(X), B)")),
            "permission_error(access,private_procedure,atom/1)"
        );
    }

    #[test]
    fn dynamic_declaration_makes_retract_fail_instead_of_raise() {
        let mut m = machine(":- dynamic(d/1).");
        assert!(fails(&mut m, "retract(d(1))"));
        assert!(fails(&mut m, "clause(d(X), _)"));
        assert!(succeeds(&mut m, "assertz(d(1)), retract(d(1))"));
    }

    #[test]
    fn current_predicate_enumerates() {
        let mut m = machine("zebra(1). quagga(2).");
        assert!(succeeds(&mut m, "current_predicate(zebra/1)"));
        assert!(succeeds(&mut m, "current_predicate(quagga/_)"));
        assert!(fails(&mut m, "current_predicate(okapi/3)"));
    }

    #[test]
    fn abolish_removes_dynamic_procedures() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "assertz(tmp(1)), abolish(tmp/1)"));
        assert!(fails(&mut m, "clause(tmp(_), _)"));
    }

    #[test]
    fn boot_library_list_predicates() {
        let mut m = Machine::new();
        assert_eq!(
            render(&mut m, "append(X, Y, [1,2])")
                .len(),
            3
        );
        assert!(succeeds(&mut m, "append([1], [2], [1,2])"));
        assert_eq!(render(&mut m, "length([a,b,c], N)"), vec!["N=3"]);
        assert!(succeeds(&mut m, "reverse([1,2,3], [3,2,1])"));
        assert_eq!(render(&mut m, "between(1, 3, X)"), vec!["X=1", "X=2", "X=3"]);
        assert_eq!(render(&mut m, "once(member(X, [1,2]))"), vec!["X=1"]);
        assert!(succeeds(&mut m, "a \\= b"));
        assert!(fails(&mut m, "a \\= a"));
        assert!(succeeds(&mut m, "last([1,2,3], 3)"));
        assert!(succeeds(&mut m, "maplist(integer, [1,2,3])"));
        assert!(succeeds(
            &mut m,
            "maplist(atom_length, [ab, abc], [2, 3])"
        ));
        assert!(succeeds(&mut m, "select(2, [1,2,3], [1,3])"));
        assert!(succeeds(&mut m, "memberchk(2, [1,2,3])"));
        assert!(succeeds(&mut m, "ignore(fail)"));
        assert!(fails(&mut m, "not(true)"));
    }

    #[test]
    fn term_inspection() {
        let mut m = Machine::new();
        assert_eq!(
            render(&mut m, "functor(f(a, b), N, A)"),
            vec!["N=f,A=2"]
        );
        assert_eq!(render(&mut m, "functor(T, f, 2), arg(1, T, X)").len(), 1);
        assert_eq!(render(&mut m, "functor(T, foo, 0)"), vec!["T=foo"]);
        assert_eq!(render(&mut m, "f(a, b) =.. L"), vec!["L=[f,a,b]"]);
        assert_eq!(render(&mut m, "T =.. [g, 1]"), vec!["T=g(1)"]);
        assert_eq!(render(&mut m, "arg(2, f(a, b), X)"), vec!["X=b"]);
        assert!(fails(&mut m, "arg(3, f(a, b), _)"));
        assert!(succeeds(&mut m, "copy_term(f(A, A), f(B, C)), B == C"));
        assert!(succeeds(&mut m, "copy_term(f(A, b), f(_, b))"));
    }

    #[test]
    fn standard_order_builtins() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "compare(<, 1, 2)"));
        assert!(succeeds(&mut m, "compare(Order, f(a), f(b)), Order == (<)"));
        assert!(succeeds(&mut m, "1.0 @< 1"));
        assert!(succeeds(&mut m, "a @< f(1)"));
        assert!(succeeds(&mut m, "f(a) == f(a)"));
        assert!(succeeds(&mut m, "X == X"));
        assert!(fails(&mut m, "X == Y"));
    }

    #[test]
    fn type_tests() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "atom(foo)"));
        assert!(fails(&mut m, "atom(1)"));
        assert!(succeeds(&mut m, "var(_)"));
        assert!(succeeds(&mut m, "X = f(Y), compound(X)"));
        assert!(succeeds(&mut m, "callable(foo), callable(f(1))"));
        assert!(fails(&mut m, "callable(1)"));
        assert!(succeeds(&mut m, "number(1), number(1.5), integer(1), float(1.5)"));
    }

    #[test]
    fn atom_builtins() {
        let mut m = Machine::new();
        assert_eq!(render(&mut m, "atom_length(hello, N)"), vec!["N=5"]);
        assert_eq!(render(&mut m, "atom_concat(foo, bar, X)"), vec!["X=foobar"]);
        assert_eq!(render(&mut m, "atom_concat(A, B, ab)").len(), 3);
        assert!(succeeds(&mut m, "sub_atom(abcde, 1, 3, 1, bcd)"));
        assert_eq!(
            render(&mut m, "findall(S, sub_atom(ab, _, 1, _, S), L)")
                .into_iter()
                .map(|s| s.split("L=").nth(1).unwrap().to_string())
                .collect::<Vec<_>>(),
            vec!["[a,b]"]
        );
        assert_eq!(render(&mut m, "atom_chars(abc, L)"), vec!["L=[a,b,c]"]);
        assert_eq!(render(&mut m, "atom_chars(X, [a, b])"), vec!["X=ab"]);
        assert_eq!(render(&mut m, "atom_codes(a, L)"), vec!["L=[97]"]);
        assert_eq!(render(&mut m, "char_code(a, X)"), vec!["X=97"]);
        assert_eq!(render(&mut m, "char_code(X, 98)"), vec!["X=b"]);
        assert_eq!(render(&mut m, "number_chars(X, ['4', '2'])"), vec!["X=42"]);
        assert_eq!(render(&mut m, "number_chars(12, L)"), vec!["L=[1,2]"]);
        assert_eq!(
            formal_of(error_of(&mut m, "number_chars(X, [a])")),
            "syntax_error(illegal_number)"
        );
        assert_eq!(
            formal_of(error_of(&mut m, "atom_length(1, _)")),
            "type_error(atom,1)"
        );
    }

    #[test]
    fn number_text_roundtrip() {
        let mut m = Machine::new();
        for n in ["0", "1", "-1", "42", "9223372036854775807", "-9223372036854775808", "3.5", "-0.25"] {
            let q = format!("X = {}, number_codes(X, Cs), number_codes(Y, Cs), Y == X", n);
            assert!(succeeds(&mut m, &q), "roundtrip failed for {}", n);
        }
    }

    #[test]
    fn unification_builtins() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "X = f(X)"));
        assert!(fails(&mut m, "unify_with_occurs_check(X, f(X))"));
        assert!(succeeds(&mut m, "unify_with_occurs_check(X, f(Y))"));
        assert!(fails(&mut m, "1 = 1.0"));
        assert!(succeeds(&mut m, "f(X, b) = f(a, Y), X == a, Y == b"));
    }

    #[test]
    fn flags_are_readable_and_guarded() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "current_prolog_flag(bounded, true)"));
        assert!(succeeds(&mut m, "current_prolog_flag(integer_rounding_function, toward_zero)"));
        assert_eq!(
            formal_of(error_of(&mut m, "set_prolog_flag(bounded, false)")),
            "permission_error(modify,flag,bounded)"
        );
        assert_eq!(
            formal_of(error_of(&mut m, "set_prolog_flag(no_such_flag, 1)")),
            "domain_error(prolog_flag,no_such_flag)"
        );
        assert!(succeeds(&mut m, "set_prolog_flag(unknown, fail)"));
        assert!(fails(&mut m, "no_such_predicate(1)"));
    }

    #[test]
    fn unknown_procedure_raises_existence_error_by_default() {
        let mut m = Machine::new();
        assert_eq!(
            formal_of(error_of(&mut m, "no_such_predicate(1)")),
            "existence_error(procedure,no_such_predicate/1)"
        );
    }

    #[test]
    fn unknown_warning_invokes_the_hook_and_fails() {
        let mut m = Machine::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen2 = seen.clone();
        m.on_unknown(move |pi| seen2.borrow_mut().push(pi.to_string()));
        m.set_flag("unknown", &Term::atom("warning")).unwrap();
        assert!(fails(&mut m, "ghost(1)"));
        assert_eq!(&*seen.borrow(), &["ghost/1".to_string()]);
    }

    #[test]
    fn double_quotes_flag_changes_reification() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "\"ab\" = [97, 98]"));
        m.set_flag("double_quotes", &Term::atom("atom")).unwrap();
        assert!(succeeds(&mut m, "\"ab\" = ab"));
    }

    #[test]
    fn user_defined_operators_parse_after_op() {
        let mut m = Machine::new();
        assert!(succeeds(&mut m, "op(700, xfx, ===)"));
        m.consult("fact(a === b).").unwrap();
        assert_eq!(render(&mut m, "fact(X === Y)"), vec!["X=a,Y=b"]);
        assert!(succeeds(&mut m, "current_op(700, xfx, ===)"));
        assert!(succeeds(&mut m, "current_op(1200, xfx, :-)"));
        assert_eq!(
            formal_of(error_of(&mut m, "op(600, xfx, ',')")),
            "permission_error(modify,operator,',')"
        );
    }

    #[test]
    fn halt_runs_hooks_and_surfaces() {
        let mut m = Machine::new();
        let code = Rc::new(RefCell::new(None));
        let code2 = code.clone();
        m.on_halt(move |c| *code2.borrow_mut() = Some(c));
        match m.query("halt(3)").unwrap().next() {
            Some(Err(Error::Halted(3))) => {}
            other => panic!("expected Halted(3), got {:?}", other),
        }
        assert_eq!(*code.borrow(), Some(3));
    }

    #[test]
    fn interrupt_aborts_the_search() {
        let mut m = machine("loop :- loop.");
        let handle = m.interrupt_handle();
        let mut solutions = m.query("loop").unwrap();
        handle.interrupt();
        match solutions.next() {
            Some(Err(Error::Interrupted)) => {}
            other => panic!("expected Interrupted, got {:?}", other),
        }
    }

    #[test]
    fn interrupts_are_not_catchable() {
        let mut m = machine("loop :- loop.");
        let handle = m.interrupt_handle();
        let mut solutions = m.query("catch(loop, _, true)").unwrap();
        handle.interrupt();
        assert!(matches!(solutions.next(), Some(Err(Error::Interrupted))));
    }

    #[test]
    fn solutions_are_lazy_and_disposable() {
        let mut m = Machine::new();
        let first_three: Vec<String> = m
            .query("between(1, 1000000, X)")
            .unwrap()
            .take(3)
            .map(|s| s.unwrap()["X"].to_string())
            .collect();
        assert_eq!(first_three, vec!["1", "2", "3"]);
    }

    #[test]
    fn register_builtin_installs_host_predicates() {
        let mut m = Machine::new();
        m.register_builtin("triple", 2, |m, args, k, env| {
            match env.resolve(&args[0]) {
                Term::Int(i) => Promise::unify(m, &args[1], &Term::Int(i * 3), k, env),
                _ => Promise::ball(crate::error::type_error(
                    "integer",
                    env.resolve_deep(&args[0]),
                )),
            }
        });
        assert_eq!(render(&mut m, "triple(4, X)"), vec!["X=12"]);
        assert_eq!(
            render(&mut m, "findall(X-Y, (member(X, [1,2]), triple(X, Y)), L)")
                .into_iter()
                .map(|s| s.split("L=").nth(1).unwrap().to_string())
                .collect::<Vec<_>>(),
            vec!["[1-3,2-6]"]
        );
    }

    #[test]
    fn writer_builtins_use_the_output_sink() {
        #[derive(Clone)]
        struct Sink(Rc<RefCell<Vec<u8>>>);
        impl std::io::Write for Sink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let sink = Sink(Rc::new(RefCell::new(Vec::new())));
        let mut m = Machine::new();
        m.set_output(sink.clone());
        assert!(succeeds(&mut m, "write(f(a, 'b c')), nl, writeq('b c')"));
        assert_eq!(
            String::from_utf8(sink.0.borrow().clone()).unwrap(),
            "f(a,b c)\n'b c'"
        );
    }

    #[test]
    fn calling_a_number_is_a_type_error() {
        let mut m = Machine::new();
        assert_eq!(
            formal_of(error_of(&mut m, "X = 3, call(X)")),
            "type_error(callable,3)"
        );
        assert_eq!(
            formal_of(error_of(&mut m, "call(G)")),
            "instantiation_error"
        );
    }

    #[test]
    fn call_n_appends_arguments() {
        let mut m = machine("add(X, Y, Z) :- Z is X + Y.");
        assert_eq!(render(&mut m, "call(add(1), 2, Z)"), vec!["Z=3"]);
        assert_eq!(render(&mut m, "call(add, 1, 2, Z)"), vec!["Z=3"]);
        assert_eq!(render(&mut m, "G = add(1, 2), call(G, Z)"), vec![
            "G=add(1,2),Z=3"
        ]);
    }

    #[test]
    fn throw_requires_an_instantiated_ball() {
        let mut m = Machine::new();
        assert_eq!(
            formal_of(error_of(&mut m, "throw(f(X))")),
            "instantiation_error"
        );
    }

    #[test]
    fn directives_run_during_consult() {
        let mut m = Machine::new();
        m.consult(":- assertz(made_by_directive(1)).").unwrap();
        assert!(succeeds(&mut m, "made_by_directive(1)"));
        // A failing directive is reported, not fatal.
        m.consult(":- fail. after(1).").unwrap();
        assert!(succeeds(&mut m, "after(1)"));
        // An erroring directive aborts the load.
        assert!(m.consult(":- throw(oops). never(1).").is_err());
        assert!(fails(&mut m, "never(1)"));
    }

    #[test]
    fn load_program_reads_from_io() {
        let mut m = Machine::new();
        m.load_program(&b"from_reader(ok)."[..]).unwrap();
        assert!(succeeds(&mut m, "from_reader(ok)"));
    }

    #[test]
    fn variable_goals_in_bodies_dispatch_at_run_time() {
        let mut m = machine("run(G) :- G.");
        assert!(succeeds(&mut m, "run(member(2, [1,2]))"));
        assert!(fails(&mut m, "run(fail)"));
    }
}
