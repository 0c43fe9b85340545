pub(crate) mod arith;
pub(crate) mod atoms;
pub(crate) mod collect;
pub(crate) mod control;
pub(crate) mod dbops;
pub(crate) mod flagops;
pub(crate) mod io;
pub(crate) mod terms;
pub(crate) mod types;

use phf::phf_map;

use crate::env::Env;
use crate::machine::Machine;
use crate::solve::{Barrier, Cont, Promise};
use crate::term::{Indicator, Term};

pub(crate) type SolveFn = fn(&mut Machine, &[Term], &Cont, &Env) -> Promise;

/// Control builtins additionally see the caller's cut barrier, making
/// them transparent to `!`.
pub(crate) type ControlFn = fn(&mut Machine, &[Term], Barrier, &Cont, &Env) -> Promise;

pub(crate) enum Builtin {
    Solve(SolveFn),
    Control(ControlFn),
}

static BUILTINS: phf::Map<&'static str, Builtin> = phf_map! {
    // control
    "true/0" => Builtin::Solve(control::solve_true),
    "fail/0" => Builtin::Solve(control::solve_fail),
    "!/0" => Builtin::Control(control::solve_cut),
    ",/2" => Builtin::Control(control::solve_and),
    ";/2" => Builtin::Control(control::solve_or),
    "->/2" => Builtin::Control(control::solve_if_then),
    "\\+/1" => Builtin::Solve(control::solve_not_provable),
    "catch/3" => Builtin::Solve(control::solve_catch),
    "throw/1" => Builtin::Solve(control::solve_throw),
    "repeat/0" => Builtin::Solve(control::solve_repeat),
    "halt/0" => Builtin::Solve(control::solve_halt),
    "halt/1" => Builtin::Solve(control::solve_halt),

    // unification
    "=/2" => Builtin::Solve(terms::solve_unify),
    "unify_with_occurs_check/2" => Builtin::Solve(terms::solve_unify_occurs),

    // type tests
    "var/1" => Builtin::Solve(types::solve_var),
    "nonvar/1" => Builtin::Solve(types::solve_nonvar),
    "atom/1" => Builtin::Solve(types::solve_atom),
    "atomic/1" => Builtin::Solve(types::solve_atomic),
    "number/1" => Builtin::Solve(types::solve_number),
    "integer/1" => Builtin::Solve(types::solve_integer),
    "float/1" => Builtin::Solve(types::solve_float),
    "compound/1" => Builtin::Solve(types::solve_compound),
    "callable/1" => Builtin::Solve(types::solve_callable),

    // standard order
    "==/2" => Builtin::Solve(types::solve_term_eq),
    "\\==/2" => Builtin::Solve(types::solve_term_neq),
    "@</2" => Builtin::Solve(types::solve_term_lss),
    "@=</2" => Builtin::Solve(types::solve_term_leq),
    "@>/2" => Builtin::Solve(types::solve_term_gtr),
    "@>=/2" => Builtin::Solve(types::solve_term_geq),
    "compare/3" => Builtin::Solve(types::solve_compare),

    // term inspection
    "functor/3" => Builtin::Solve(terms::solve_functor),
    "arg/3" => Builtin::Solve(terms::solve_arg),
    "=../2" => Builtin::Solve(terms::solve_univ),
    "copy_term/2" => Builtin::Solve(terms::solve_copy_term),

    // arithmetic
    "is/2" => Builtin::Solve(arith::solve_is),
    "=:=/2" => Builtin::Solve(arith::solve_eq),
    "=\\=/2" => Builtin::Solve(arith::solve_neq),
    "</2" => Builtin::Solve(arith::solve_lss),
    "=</2" => Builtin::Solve(arith::solve_leq),
    ">/2" => Builtin::Solve(arith::solve_gtr),
    ">=/2" => Builtin::Solve(arith::solve_geq),

    // solution collection
    "findall/3" => Builtin::Solve(collect::solve_findall),
    "bagof/3" => Builtin::Solve(collect::solve_bagof),
    "setof/3" => Builtin::Solve(collect::solve_setof),

    // clause database
    "asserta/1" => Builtin::Solve(dbops::solve_asserta),
    "assertz/1" => Builtin::Solve(dbops::solve_assertz),
    "retract/1" => Builtin::Solve(dbops::solve_retract),
    "abolish/1" => Builtin::Solve(dbops::solve_abolish),
    "clause/2" => Builtin::Solve(dbops::solve_clause),
    "current_predicate/1" => Builtin::Solve(dbops::solve_current_predicate),
    "dynamic/1" => Builtin::Solve(dbops::solve_dynamic),
    "discontiguous/1" => Builtin::Solve(dbops::solve_discontiguous),

    // atoms and numbers
    "atom_length/2" => Builtin::Solve(atoms::solve_atom_length),
    "atom_concat/3" => Builtin::Solve(atoms::solve_atom_concat),
    "sub_atom/5" => Builtin::Solve(atoms::solve_sub_atom),
    "atom_chars/2" => Builtin::Solve(atoms::solve_atom_chars),
    "atom_codes/2" => Builtin::Solve(atoms::solve_atom_codes),
    "char_code/2" => Builtin::Solve(atoms::solve_char_code),
    "number_chars/2" => Builtin::Solve(atoms::solve_number_chars),
    "number_codes/2" => Builtin::Solve(atoms::solve_number_codes),

    // flags and operators
    "set_prolog_flag/2" => Builtin::Solve(flagops::solve_set_prolog_flag),
    "current_prolog_flag/2" => Builtin::Solve(flagops::solve_current_prolog_flag),
    "op/3" => Builtin::Solve(flagops::solve_op),
    "current_op/3" => Builtin::Solve(flagops::solve_current_op),
    "char_conversion/2" => Builtin::Solve(flagops::solve_char_conversion),
    "current_char_conversion/2" => Builtin::Solve(flagops::solve_current_char_conversion),

    // writers
    "write/1" => Builtin::Solve(io::solve_write),
    "writeq/1" => Builtin::Solve(io::solve_writeq),
    "write_canonical/1" => Builtin::Solve(io::solve_write_canonical),
    "write_term/2" => Builtin::Solve(io::solve_write_term),
    "nl/0" => Builtin::Solve(io::solve_nl),
};

pub(crate) fn lookup(pi: Indicator) -> Option<&'static Builtin> {
    BUILTINS.get(format!("{}/{}", pi.name, pi.arity).as_str())
}
