use std::collections::HashSet;
use std::fmt::{self, Write};

use crate::atom::Atom;
use crate::env::Env;
use crate::lexer;
use crate::operators::{Operator, OperatorTable};
use crate::term::Term;

#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub quoted: bool,
    pub ignore_ops: bool,
    pub numbervars: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            quoted: false,
            ignore_ops: false,
            numbervars: true,
        }
    }
}

impl WriteOptions {
    pub fn quoted() -> Self {
        WriteOptions {
            quoted: true,
            ..WriteOptions::default()
        }
    }

    pub fn canonical() -> Self {
        WriteOptions {
            quoted: true,
            ignore_ops: true,
            numbervars: false,
        }
    }
}

pub(crate) fn term_to_string(
    term: &Term,
    env: &Env,
    ops: &OperatorTable,
    opts: &WriteOptions,
) -> String {
    let mut out = String::new();
    let _ = fmt_term(&mut out, term, env, ops, opts);
    out
}

pub(crate) fn fmt_term(
    w: &mut dyn Write,
    term: &Term,
    env: &Env,
    ops: &OperatorTable,
    opts: &WriteOptions,
) -> fmt::Result {
    let mut writer = TermWriter {
        env,
        ops,
        opts,
        expanding: HashSet::new(),
    };
    writer.write(w, term, 1200)
}

struct TermWriter<'a> {
    env: &'a Env,
    ops: &'a OperatorTable,
    opts: &'a WriteOptions,
    // Variables currently being expanded; meeting one again means the
    // term is cyclic and the variable is printed instead.
    expanding: HashSet<u64>,
}

impl<'a> TermWriter<'a> {
    fn write(&mut self, w: &mut dyn Write, term: &Term, max: u16) -> fmt::Result {
        match term {
            Term::Var(v) => {
                let resolved = self.env.resolve(term);
                match &resolved {
                    Term::Var(v) => self.write_var(w, v),
                    _ => {
                        if !self.expanding.insert(v.id) {
                            return self.write_var(w, v);
                        }
                        let r = self.write(w, &resolved, max);
                        self.expanding.remove(&v.id);
                        r
                    }
                }
            }
            Term::Atom(a) => self.write_atom(w, *a),
            Term::Int(i) => write!(w, "{}", i),
            Term::Float(f) => write!(w, "{}", fmt_float(*f)),
            Term::Compound(c) => {
                // '$VAR'(N) renders as a variable name under numbervars.
                if self.opts.numbervars
                    && c.functor.as_str() == "$VAR"
                    && c.args.len() == 1
                {
                    if let Term::Int(n) = self.env.resolve(&c.args[0]) {
                        if n >= 0 {
                            let letter = (b'A' + (n % 26) as u8) as char;
                            return if n < 26 {
                                write!(w, "{}", letter)
                            } else {
                                write!(w, "{}{}", letter, n / 26)
                            };
                        }
                    }
                }

                if !self.opts.ignore_ops {
                    if c.functor.as_str() == "." && c.args.len() == 2 {
                        return self.write_list(w, term);
                    }
                    if c.functor.as_str() == "{}" && c.args.len() == 1 {
                        w.write_char('{')?;
                        self.write(w, &c.args[0], 1200)?;
                        return w.write_char('}');
                    }
                    if c.args.len() == 2 {
                        if let Some(op) = self.ops.infix_or_postfix(c.functor) {
                            if op.is_infix() {
                                return self.write_infix(w, c.functor, op, &c.args, max);
                            }
                        }
                    }
                    if c.args.len() == 1 {
                        if let Some(op) = self.ops.infix_or_postfix(c.functor) {
                            if op.is_postfix() {
                                return self.write_postfix(w, c.functor, op, &c.args[0], max);
                            }
                        }
                        if let Some(op) = self.ops.prefix(c.functor) {
                            return self.write_prefix(w, c.functor, op, &c.args[0], max);
                        }
                    }
                }

                self.write_atom(w, c.functor)?;
                w.write_char('(')?;
                for (i, a) in c.args.iter().enumerate() {
                    if i > 0 {
                        w.write_char(',')?;
                    }
                    self.write(w, a, 999)?;
                }
                w.write_char(')')
            }
        }
    }

    fn write_var(&self, w: &mut dyn Write, v: &crate::term::Var) -> fmt::Result {
        match v.name {
            Some(name) => write!(w, "{}", name),
            None => write!(w, "_{}", v.id),
        }
    }

    fn write_atom(&self, w: &mut dyn Write, a: Atom) -> fmt::Result {
        let s = a.as_str();
        if self.opts.quoted && needs_quotes(s) {
            w.write_char('\'')?;
            for c in s.chars() {
                match c {
                    '\'' => w.write_str("\\'")?,
                    '\\' => w.write_str("\\\\")?,
                    '\n' => w.write_str("\\n")?,
                    '\t' => w.write_str("\\t")?,
                    '\r' => w.write_str("\\r")?,
                    c if (c as u32) < 0x20 => write!(w, "\\x{:x}\\", c as u32)?,
                    c => w.write_char(c)?,
                }
            }
            w.write_char('\'')
        } else {
            w.write_str(s)
        }
    }

    fn write_list(&mut self, w: &mut dyn Write, term: &Term) -> fmt::Result {
        w.write_char('[')?;
        let mut t = self.env.resolve(term);
        let mut first = true;
        let mut spine = Vec::new();
        let result = loop {
            let (head, tail) = match &t {
                Term::Compound(c) if c.functor.as_str() == "." && c.args.len() == 2 => {
                    (c.args[0].clone(), c.args[1].clone())
                }
                Term::Atom(a) if a.as_str() == "[]" => break Ok(()),
                other => {
                    w.write_char('|')?;
                    break self.write(w, other, 999);
                }
            };
            if !first {
                w.write_char(',')?;
            }
            first = false;
            if let Err(e) = self.write(w, &head, 999) {
                break Err(e);
            }
            // Cyclic spine guard: print the variable and stop.
            if let Term::Var(v) = &tail {
                if self.expanding.contains(&v.id) {
                    w.write_char('|')?;
                    break self.write_var(w, v);
                }
                self.expanding.insert(v.id);
                spine.push(v.id);
            }
            t = self.env.resolve(&tail);
        };
        for id in spine {
            self.expanding.remove(&id);
        }
        result?;
        w.write_char(']')
    }

    fn write_infix(
        &mut self,
        w: &mut dyn Write,
        name: Atom,
        op: Operator,
        args: &[Term],
        max: u16,
    ) -> fmt::Result {
        let p = op.priority();
        let (left_max, right_max) = match op {
            Operator::xfx(_) => (p - 1, p - 1),
            Operator::xfy(_) => (p - 1, p),
            Operator::yfx(_) => (p, p - 1),
            _ => unreachable!(),
        };
        let parens = p > max;
        if parens {
            w.write_char('(')?;
        }
        let mut left = String::new();
        self.write(&mut left, &args[0], left_max)?;
        let mut right = String::new();
        self.write(&mut right, &args[1], right_max)?;
        w.write_str(&left)?;
        if name.as_str() == "," {
            w.write_char(',')?;
        } else {
            let mut middle = String::new();
            self.write_atom(&mut middle, name)?;
            if joins_badly(left.chars().last(), middle.chars().next()) {
                w.write_char(' ')?;
            }
            w.write_str(&middle)?;
            if joins_badly(middle.chars().last(), right.chars().next()) {
                w.write_char(' ')?;
            }
        }
        w.write_str(&right)?;
        if parens {
            w.write_char(')')?;
        }
        Ok(())
    }

    fn write_prefix(
        &mut self,
        w: &mut dyn Write,
        name: Atom,
        op: Operator,
        arg: &Term,
        max: u16,
    ) -> fmt::Result {
        // A numeric operand would lex together with a '-' sign, so the
        // functional notation keeps the term readable back.
        if matches!(self.env.resolve(arg), Term::Int(_) | Term::Float(_)) {
            self.write_atom(w, name)?;
            w.write_char('(')?;
            self.write(w, arg, 999)?;
            return w.write_char(')');
        }
        let p = op.priority();
        let arg_max = match op {
            Operator::fy(_) => p,
            _ => p - 1,
        };
        let parens = p > max;
        if parens {
            w.write_char('(')?;
        }
        let mut head = String::new();
        self.write_atom(&mut head, name)?;
        let mut operand = String::new();
        self.write(&mut operand, arg, arg_max)?;
        w.write_str(&head)?;
        if joins_badly(head.chars().last(), operand.chars().next()) {
            w.write_char(' ')?;
        }
        w.write_str(&operand)?;
        if parens {
            w.write_char(')')?;
        }
        Ok(())
    }

    fn write_postfix(
        &mut self,
        w: &mut dyn Write,
        name: Atom,
        op: Operator,
        arg: &Term,
        max: u16,
    ) -> fmt::Result {
        let p = op.priority();
        let arg_max = match op {
            Operator::yf(_) => p,
            _ => p - 1,
        };
        let parens = p > max;
        if parens {
            w.write_char('(')?;
        }
        let mut operand = String::new();
        self.write(&mut operand, arg, arg_max)?;
        let mut tail = String::new();
        self.write_atom(&mut tail, name)?;
        w.write_str(&operand)?;
        if joins_badly(operand.chars().last(), tail.chars().next()) {
            w.write_char(' ')?;
        }
        w.write_str(&tail)?;
        if parens {
            w.write_char(')')?;
        }
        Ok(())
    }
}

// Two adjacent tokens merge when both boundary characters belong to
// the same lexical class.
fn joins_badly(left: Option<char>, right: Option<char>) -> bool {
    let (left, right) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        _ => return false,
    };
    let alnum = |c: char| c.is_alphanumeric() || c == '_';
    (lexer::is_graphic_char(left) && lexer::is_graphic_char(right))
        || (alnum(left) && alnum(right))
        || (left == '\'' && right == '\'')
}

fn needs_quotes(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }
    if lexer::is_alpha_numeric_atom(s) {
        return false;
    }
    if s.chars().all(lexer::is_graphic_char) {
        return false;
    }
    match s {
        ";" | "!" | "[]" | "{}" => false,
        _ => true,
    }
}

// Floats print in a shape the reader accepts back: always a '.' or an
// exponent with a fractional part.
fn fmt_float(f: f64) -> String {
    if !f.is_finite() {
        return if f.is_nan() {
            "nan".to_string()
        } else if f > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    let s = format!("{:?}", f);
    if s.contains('.') {
        s
    } else if let Some(pos) = s.find(['e', 'E']) {
        format!("{}.0{}", &s[..pos], &s[pos..])
    } else {
        format!("{}.0", s)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flags::Flags;
    use crate::reader::Reader;
    use crate::term::Var;

    fn roundtrip(s: &str) -> String {
        let ops = OperatorTable::default();
        let flags = Flags::default();
        let mut r = Reader::new(s, &ops, &flags, None);
        let t = r.next_term().unwrap().unwrap();
        term_to_string(&t, &Env::default(), &ops, &WriteOptions::quoted())
    }

    #[test]
    fn writes_operators_back() {
        assert_eq!(roundtrip("1 + 2 * 3."), "1+2*3");
        assert_eq!(roundtrip("(1 + 2) * 3."), "(1+2)*3");
        assert_eq!(roundtrip("a :- b, c."), "a:-b,c");
        assert_eq!(roundtrip("\\+ a."), "\\+a");
        assert_eq!(roundtrip("X is Y mod 2."), "X is Y mod 2");
        assert_eq!(roundtrip("foo/0."), "foo/0");
    }

    #[test]
    fn merging_boundaries_get_a_space() {
        // -(a, -(b)) must not print as a- -b without separation.
        let t = Term::compound(
            "-",
            vec![Term::atom("a"), Term::compound("-", vec![Term::atom("b")])],
        );
        let s = term_to_string(
            &t,
            &Env::default(),
            &OperatorTable::default(),
            &WriteOptions::quoted(),
        );
        assert_eq!(s, "a- -b");
    }

    #[test]
    fn writes_lists() {
        assert_eq!(roundtrip("[1, 2, 3]."), "[1,2,3]");
        assert_eq!(roundtrip("[a | b]."), "[a|b]");
        assert_eq!(roundtrip("[]."), "[]");
    }

    #[test]
    fn quotes_when_needed() {
        assert_eq!(roundtrip("'hello world'."), "'hello world'");
        assert_eq!(roundtrip("abc."), "abc");
        assert_eq!(roundtrip("'It''s'."), "'It\\'s'");
        assert_eq!(roundtrip("+."), "+");
        assert_eq!(roundtrip("[]."), "[]");
    }

    #[test]
    fn negative_operand_uses_functional_form() {
        let t = Term::compound("-", vec![Term::Int(1)]);
        let s = term_to_string(
            &t,
            &Env::default(),
            &OperatorTable::default(),
            &WriteOptions::quoted(),
        );
        assert_eq!(s, "-(1)");
    }

    #[test]
    fn floats_roundtrip() {
        assert_eq!(roundtrip("1.5."), "1.5");
        assert_eq!(roundtrip("1.0."), "1.0");
        let s = fmt_float(1e30);
        assert!(s.contains('.') || s.contains('e'));
        let ops = OperatorTable::default();
        let flags = Flags::default();
        let src = format!("{}.", s);
        let mut r = Reader::new(&src, &ops, &flags, None);
        assert_eq!(r.next_term().unwrap().unwrap(), Term::Float(1e30));
    }

    #[test]
    fn numbervars_renders_letters() {
        let t = Term::compound("$VAR", vec![Term::Int(0)]);
        let s = term_to_string(
            &t,
            &Env::default(),
            &OperatorTable::default(),
            &WriteOptions::default(),
        );
        assert_eq!(s, "A");
        let t = Term::compound("$VAR", vec![Term::Int(27)]);
        let s = term_to_string(
            &t,
            &Env::default(),
            &OperatorTable::default(),
            &WriteOptions::default(),
        );
        assert_eq!(s, "B1");
    }

    #[test]
    fn canonical_ignores_operators() {
        let ops = OperatorTable::default();
        let flags = Flags::default();
        let mut r = Reader::new("1 + 2.", &ops, &flags, None);
        let t = r.next_term().unwrap().unwrap();
        assert_eq!(
            term_to_string(&t, &Env::default(), &ops, &WriteOptions::canonical()),
            "+(1,2)"
        );
    }

    #[test]
    fn bound_variables_print_their_values() {
        let x = Var::fresh();
        let env = Env::default().bind(x, Term::Int(3));
        let t = Term::compound("f", vec![Term::Var(x)]);
        assert_eq!(
            term_to_string(&t, &env, &OperatorTable::default(), &WriteOptions::default()),
            "f(3)"
        );
    }

    #[test]
    fn cyclic_terms_terminate() {
        let x = Var::fresh();
        let env = Env::default();
        let cyclic = Term::compound("f", vec![Term::Var(x)]);
        let env = env.unify(&Term::Var(x), &cyclic, false).unwrap();
        let s = term_to_string(&Term::Var(x), &env, &OperatorTable::default(), &WriteOptions::default());
        assert!(s.starts_with("f("));
    }
}
