//! An embeddable ISO Prolog interpreter.
//!
//! The engine is a [`Machine`]: a clause database, flag set and
//! operator table bundled with the evaluation machinery. Programs are
//! loaded with [`Machine::consult`] or [`Machine::load_program`];
//! queries stream solutions back through the [`Solutions`] iterator.
//!
//! ```
//! use horn::Machine;
//!
//! let mut m = Machine::new();
//! m.consult("parent(a, b). parent(b, c).").unwrap();
//! let names: Vec<String> = m
//!     .query("parent(a, X)")
//!     .unwrap()
//!     .map(|solution| solution.unwrap()["X"].to_string())
//!     .collect();
//! assert_eq!(names, vec!["b"]);
//! ```
//!
//! Evaluation is continuation-passing over an explicitly trampolined
//! proof tree: goals produce [`Promise`] values, and the engine forces
//! them depth-first, left-to-right, retaining the pending alternatives
//! between solutions. Variable bindings live in a persistent
//! environment, so backtracking is dropping a reference; there is no
//! trail.
//!
//! Host predicates install with [`Machine::register_builtin`] using
//! the same continuation-passing signature the native builtins use.

mod atom;
mod builtins;
mod compile;
mod db;
mod env;
mod error;
mod flags;
mod lexer;
mod machine;
mod operators;
mod reader;
mod solve;
mod term;
mod vm;
mod writer;

pub use atom::Atom;
pub use db::HostFn;
pub use env::Env;
pub use error::{Error, Exception};
pub use machine::{Bindings, Interrupt, Machine, Solutions};
pub use solve::{Barrier, Cont, Promise, Thunk};
pub use term::{Compound, Indicator, Term, Var};
pub use writer::WriteOptions;
