use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::env::Env;
use crate::error::Exception;
use crate::machine::Machine;
use crate::term::Term;

static BARRIER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifies the choice frame a `!` prunes back to. Fresh per clause
/// activation, `call/N` invocation, `catch/3` goal, `\+/1` goal,
/// if-then condition, and query top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier(u64);

impl Barrier {
    pub fn fresh() -> Self {
        Barrier(BARRIER_COUNTER.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// A suspended sub-proof.
pub type Thunk = Box<dyn FnOnce(&mut Machine) -> Promise>;

/// A success continuation: given the environment a goal succeeded in,
/// produce the rest of the proof.
pub type Cont = Rc<dyn Fn(&mut Machine, &Env) -> Promise>;

/// A node of the lazy proof tree driven by [`Eval`].
pub enum Promise {
    /// A solution at this environment; the host decides whether to
    /// resume.
    Yield(Env),
    Fail,
    Raise(Exception),
    /// Suspended alternatives, tried in order. A tagged frame is the
    /// target of `Cut` nodes referring to the same barrier.
    Delay {
        barrier: Option<Barrier>,
        alts: Vec<Thunk>,
    },
    /// Prune every pending alternative up to and including the frame
    /// tagged `barrier`, then continue.
    Cut { barrier: Barrier, then: Thunk },
    /// Run `catch/3`: plant a catcher frame, then prove the goal.
    Catch(Box<CatchData>),
    /// The continuation of a `catch/3` has been entered: disarm its
    /// catcher until backtracking re-enters the goal.
    Disarm {
        armed: Rc<Cell<bool>>,
        then: Thunk,
    },
}

pub struct CatchData {
    pub(crate) goal: Term,
    pub(crate) catcher: Term,
    pub(crate) recovery: Term,
    pub(crate) k: Cont,
    pub(crate) env: Env,
}

impl Promise {
    pub fn solution(env: &Env) -> Promise {
        Promise::Yield(env.clone())
    }

    pub fn ball(ball: Term) -> Promise {
        Promise::Raise(Exception::Ball(ball))
    }

    pub fn delay(alts: Vec<Thunk>) -> Promise {
        Promise::Delay {
            barrier: None,
            alts,
        }
    }

    /// A single suspended proof under a fresh cut barrier.
    pub fn barrier(barrier: Barrier, then: Thunk) -> Promise {
        Promise::Delay {
            barrier: Some(barrier),
            alts: vec![then],
        }
    }

    /// Unify and continue; failure to unify is failure, never an error.
    pub fn unify(m: &mut Machine, a: &Term, b: &Term, k: &Cont, env: &Env) -> Promise {
        match env.unify(a, b, false) {
            Some(env) => k(m, &env),
            None => Promise::Fail,
        }
    }
}

enum Frame {
    /// Pending alternatives, innermost last (popped first).
    Choice {
        barrier: Option<Barrier>,
        alts: Vec<Thunk>,
    },
    Catcher {
        catcher: Term,
        recovery: Term,
        k: Cont,
        env: Env,
        armed: Rc<Cell<bool>>,
    },
    /// Re-arm a disarmed catcher when failure backtracks past this
    /// point. Exception unwinding and cut discard it instead.
    Rearm(Rc<Cell<bool>>),
}

pub(crate) enum Outcome {
    Solution(Env),
    Exhausted,
    Error(Exception),
}

/// The depth-first force loop: an explicit trampoline over a stack of
/// choice frames. Between solutions the stack is retained, so repeated
/// [`Eval::next_solution`] calls enumerate the proof tree one success
/// at a time; dropping the value discards the remainder.
pub(crate) struct Eval {
    stack: Vec<Frame>,
}

impl Eval {
    pub fn new(root: Thunk) -> Eval {
        Eval {
            stack: vec![Frame::Choice {
                barrier: None,
                alts: vec![root],
            }],
        }
    }

    pub fn next_solution(&mut self, m: &mut Machine) -> Outcome {
        loop {
            if m.take_interrupt() {
                self.stack.clear();
                return Outcome::Error(Exception::Interrupted);
            }

            let thunk = match self.stack.last_mut() {
                None => return Outcome::Exhausted,
                Some(Frame::Choice { alts, .. }) => match alts.pop() {
                    Some(t) => t,
                    None => {
                        self.stack.pop();
                        continue;
                    }
                },
                Some(Frame::Rearm(armed)) => {
                    armed.set(true);
                    self.stack.pop();
                    continue;
                }
                Some(Frame::Catcher { .. }) => {
                    // The goal and all its alternatives are exhausted.
                    self.stack.pop();
                    continue;
                }
            };

            let mut p = thunk(m);
            loop {
                match p {
                    Promise::Yield(env) => return Outcome::Solution(env),
                    Promise::Fail => break,
                    Promise::Raise(e) => match self.unwind(m, e) {
                        Ok(next) => p = next,
                        Err(e) => return Outcome::Error(e),
                    },
                    Promise::Delay { barrier, mut alts } => {
                        alts.reverse();
                        self.stack.push(Frame::Choice { barrier, alts });
                        break;
                    }
                    Promise::Cut { barrier, then } => {
                        self.cut_to(barrier);
                        p = then(m);
                    }
                    Promise::Catch(data) => {
                        let CatchData {
                            goal,
                            catcher,
                            recovery,
                            k,
                            env,
                        } = *data;
                        let armed = Rc::new(Cell::new(true));
                        self.stack.push(Frame::Catcher {
                            catcher,
                            recovery,
                            k: k.clone(),
                            env: env.clone(),
                            armed: armed.clone(),
                        });
                        let barrier = Barrier::fresh();
                        self.stack.push(Frame::Choice {
                            barrier: Some(barrier),
                            alts: Vec::new(),
                        });
                        let wrapped: Cont = Rc::new(move |_, env| {
                            let armed = armed.clone();
                            let k = k.clone();
                            let env = env.clone();
                            Promise::Disarm {
                                armed,
                                then: Box::new(move |m| k(m, &env)),
                            }
                        });
                        p = m.solve_goal(&goal, barrier, &wrapped, &env);
                    }
                    Promise::Disarm { armed, then } => {
                        armed.set(false);
                        self.stack.push(Frame::Rearm(armed));
                        p = then(m);
                    }
                }
            }
        }
    }

    /// Prune pending work up to and including the frame tagged with
    /// `barrier`. A cut with no surviving barrier frame prunes nothing.
    fn cut_to(&mut self, barrier: Barrier) {
        if let Some(idx) = self.stack.iter().rposition(
            |f| matches!(f, Frame::Choice { barrier: Some(b), .. } if *b == barrier),
        ) {
            self.stack.truncate(idx);
        }
    }

    /// Propagate an exception down the stack. Prolog balls stop at the
    /// first armed catcher whose pattern unifies; host conditions
    /// discard everything.
    fn unwind(&mut self, m: &mut Machine, e: Exception) -> Result<Promise, Exception> {
        let ball = match e {
            Exception::Ball(t) => t,
            fatal => {
                self.stack.clear();
                return Err(fatal);
            }
        };
        while let Some(frame) = self.stack.pop() {
            if let Frame::Catcher {
                catcher,
                recovery,
                k,
                env,
                armed,
            } = frame
            {
                if !armed.get() {
                    continue;
                }
                if let Some(env) = env.unify(&ball, &catcher, false) {
                    // The recovery goal runs like call(Recovery).
                    let barrier = Barrier::fresh();
                    self.stack.push(Frame::Choice {
                        barrier: Some(barrier),
                        alts: Vec::new(),
                    });
                    return Ok(m.solve_goal(&recovery, barrier, &k, &env));
                }
            }
        }
        Err(Exception::Ball(ball))
    }
}
