use crate::atom::Atom;
use crate::env::Env;
use crate::error;
use crate::term::{Indicator, Term};

/// The opcode set. Head matching and body argument building share the
/// same instructions; unification gives them their direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Op {
    /// Head fully matched; switch the register pair to building mode.
    Enter,
    /// Match or emit the constant at the given table slot.
    Const(usize),
    /// Match or emit the clause variable at the given slot.
    Var(usize),
    /// Descend into a compound with the indicator at the given slot.
    Functor(usize),
    /// Ascend from a completed compound.
    Pop,
    /// Invoke the procedure at the given indicator slot.
    Call(usize),
    /// Fire the clause's success continuation.
    Exit,
    /// Prune to the activation's cut barrier.
    Cut,
}

/// A compiled clause: the opcode sequence plus its three tables.
#[derive(Debug)]
pub(crate) struct Bytecode {
    pub code: Vec<Op>,
    pub consts: Vec<Term>,
    pub pis: Vec<Indicator>,
    pub nvars: usize,
}

struct Compiler {
    code: Vec<Op>,
    consts: Vec<Term>,
    pis: Vec<Indicator>,
    vars: Vec<u64>,
}

impl Compiler {
    fn const_slot(&mut self, t: &Term) -> usize {
        match self.consts.iter().position(|c| c == t) {
            Some(i) => i,
            None => {
                self.consts.push(t.clone());
                self.consts.len() - 1
            }
        }
    }

    fn pi_slot(&mut self, name: Atom, arity: usize) -> usize {
        let pi = Indicator::new(name, arity);
        match self.pis.iter().position(|p| *p == pi) {
            Some(i) => i,
            None => {
                self.pis.push(pi);
                self.pis.len() - 1
            }
        }
    }

    fn var_slot(&mut self, id: u64) -> usize {
        match self.vars.iter().position(|v| *v == id) {
            Some(i) => i,
            None => {
                self.vars.push(id);
                self.vars.len() - 1
            }
        }
    }

    fn arg(&mut self, t: &Term) {
        match t {
            Term::Var(v) => {
                let slot = self.var_slot(v.id);
                self.code.push(Op::Var(slot));
            }
            Term::Atom(_) | Term::Int(_) | Term::Float(_) => {
                let slot = self.const_slot(t);
                self.code.push(Op::Const(slot));
            }
            Term::Compound(c) => {
                let slot = self.pi_slot(c.functor, c.args.len());
                self.code.push(Op::Functor(slot));
                for a in &c.args {
                    self.arg(a);
                }
                self.code.push(Op::Pop);
            }
        }
    }

    fn body(&mut self, t: &Term) -> Result<(), Term> {
        match t {
            Term::Atom(a) if a.as_str() == "true" => Ok(()),
            Term::Atom(a) if a.as_str() == "!" => {
                self.code.push(Op::Cut);
                Ok(())
            }
            Term::Compound(c) if c.functor.as_str() == "," && c.args.len() == 2 => {
                self.body(&c.args[0])?;
                self.body(&c.args[1])
            }
            _ => self.goal(t),
        }
    }

    fn goal(&mut self, t: &Term) -> Result<(), Term> {
        match t {
            // A variable goal is a call/1 resolved at run time.
            Term::Var(v) => {
                let slot = self.var_slot(v.id);
                self.code.push(Op::Var(slot));
                let pi = self.pi_slot(Atom::new("call"), 1);
                self.code.push(Op::Call(pi));
                Ok(())
            }
            Term::Atom(a) => {
                let pi = self.pi_slot(*a, 0);
                self.code.push(Op::Call(pi));
                Ok(())
            }
            Term::Compound(c) => {
                for a in &c.args {
                    self.arg(a);
                }
                let pi = self.pi_slot(c.functor, c.args.len());
                self.code.push(Op::Call(pi));
                Ok(())
            }
            other => Err(error::type_error("callable", other.clone())),
        }
    }
}

/// Compiles a clause whose head and body have already been resolved
/// against the asserting environment. The error is a Prolog ball.
pub(crate) fn compile_clause(head: &Term, body: &Term, env: &Env) -> Result<Bytecode, Term> {
    let head = env.resolve_deep(head);
    let body = env.resolve_deep(body);
    let mut c = Compiler {
        code: Vec::new(),
        consts: Vec::new(),
        pis: Vec::new(),
        vars: Vec::new(),
    };
    if let Term::Compound(h) = &head {
        for a in &h.args {
            c.arg(a);
        }
    }
    c.code.push(Op::Enter);
    c.body(&body)?;
    c.code.push(Op::Exit);
    Ok(Bytecode {
        code: c.code,
        consts: c.consts,
        pis: c.pis,
        nvars: c.vars.len(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::term::Var;

    #[test]
    fn fact_compiles_to_enter_exit() {
        let env = Env::default();
        let code = compile_clause(&Term::atom("p"), &Term::atom("true"), &env).unwrap();
        assert_eq!(code.code, vec![Op::Enter, Op::Exit]);
        assert_eq!(code.nvars, 0);
    }

    #[test]
    fn head_arguments_compile_in_order() {
        let env = Env::default();
        let x = Term::Var(Var::fresh());
        let head = Term::compound("p", vec![Term::atom("a"), x.clone(), Term::compound("f", vec![x])]);
        let code = compile_clause(&head, &Term::atom("true"), &env).unwrap();
        assert_eq!(
            code.code,
            vec![
                Op::Const(0),
                Op::Var(0),
                Op::Functor(0),
                Op::Var(0),
                Op::Pop,
                Op::Enter,
                Op::Exit
            ]
        );
        assert_eq!(code.nvars, 1);
        assert_eq!(code.consts, vec![Term::atom("a")]);
    }

    #[test]
    fn conjunctions_flatten_and_cut_is_an_opcode() {
        let env = Env::default();
        let body = Term::compound(
            ",",
            vec![
                Term::atom("q"),
                Term::compound(",", vec![Term::atom("!"), Term::atom("r")]),
            ],
        );
        let code = compile_clause(&Term::atom("p"), &body, &env).unwrap();
        assert_eq!(
            code.code,
            vec![Op::Enter, Op::Call(0), Op::Cut, Op::Call(1), Op::Exit]
        );
        assert_eq!(code.pis.len(), 2);
    }

    #[test]
    fn numeric_goals_are_rejected() {
        let env = Env::default();
        let body = Term::compound(",", vec![Term::atom("q"), Term::Int(3)]);
        assert!(compile_clause(&Term::atom("p"), &body, &env).is_err());
    }

    #[test]
    fn body_goal_arguments_build_structures() {
        let env = Env::default();
        let x = Term::Var(Var::fresh());
        let head = Term::compound("p", vec![x.clone()]);
        let body = Term::compound("q", vec![Term::compound("f", vec![x, Term::Int(1)])]);
        let code = compile_clause(&head, &body, &env).unwrap();
        assert_eq!(
            code.code,
            vec![
                Op::Var(0),
                Op::Enter,
                Op::Functor(0),
                Op::Var(0),
                Op::Const(0),
                Op::Pop,
                Op::Call(1),
                Op::Exit
            ]
        );
    }
}
