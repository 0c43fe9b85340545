use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::atom::Atom;

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    fx(u16),
    fy(u16),
    xfx(u16),
    xfy(u16),
    yfx(u16),
    xf(u16),
    yf(u16),
}

impl Operator {
    pub fn priority(&self) -> u16 {
        match *self {
            Operator::fx(p)
            | Operator::fy(p)
            | Operator::xfx(p)
            | Operator::xfy(p)
            | Operator::yfx(p)
            | Operator::xf(p)
            | Operator::yf(p) => p,
        }
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, Operator::fx(_) | Operator::fy(_))
    }

    pub fn is_infix(&self) -> bool {
        matches!(self, Operator::xfx(_) | Operator::xfy(_) | Operator::yfx(_))
    }

    pub fn is_postfix(&self) -> bool {
        matches!(self, Operator::xf(_) | Operator::yf(_))
    }

    pub fn specifier(&self) -> &'static str {
        match self {
            Operator::fx(_) => "fx",
            Operator::fy(_) => "fy",
            Operator::xfx(_) => "xfx",
            Operator::xfy(_) => "xfy",
            Operator::yfx(_) => "yfx",
            Operator::xf(_) => "xf",
            Operator::yf(_) => "yf",
        }
    }

    pub fn from_specifier(spec: &str, priority: u16) -> Option<Operator> {
        Some(match spec {
            "fx" => Operator::fx(priority),
            "fy" => Operator::fy(priority),
            "xfx" => Operator::xfx(priority),
            "xfy" => Operator::xfy(priority),
            "yfx" => Operator::yfx(priority),
            "xf" => Operator::xf(priority),
            "yf" => Operator::yf(priority),
            _ => return None,
        })
    }
}

/// The operator table, consulted by the reader and the writer and
/// mutated by `op/3`. A name holds at most one prefix and one
/// infix-or-postfix definition.
#[derive(Debug, Clone)]
pub struct OperatorTable {
    ops: HashMap<Atom, Vec<Operator>>,
}

lazy_static! {
    pub(crate) static ref DEFAULT_TABLE: OperatorTable = OperatorTable::default();
}

impl Default for OperatorTable {
    fn default() -> Self {
        let mut table = OperatorTable {
            ops: HashMap::new(),
        };
        for (name, op) in [
            (":-", Operator::xfx(1200)),
            ("-->", Operator::xfx(1200)),
            (":-", Operator::fx(1200)),
            ("?-", Operator::fx(1200)),
            (";", Operator::xfy(1100)),
            ("->", Operator::xfy(1050)),
            (",", Operator::xfy(1000)),
            ("\\+", Operator::fy(900)),
            ("=", Operator::xfx(700)),
            ("\\=", Operator::xfx(700)),
            ("==", Operator::xfx(700)),
            ("\\==", Operator::xfx(700)),
            ("@<", Operator::xfx(700)),
            ("@>", Operator::xfx(700)),
            ("@=<", Operator::xfx(700)),
            ("@>=", Operator::xfx(700)),
            ("=..", Operator::xfx(700)),
            ("is", Operator::xfx(700)),
            ("=:=", Operator::xfx(700)),
            ("=\\=", Operator::xfx(700)),
            ("<", Operator::xfx(700)),
            ("=<", Operator::xfx(700)),
            (">", Operator::xfx(700)),
            (">=", Operator::xfx(700)),
            ("+", Operator::yfx(500)),
            ("-", Operator::yfx(500)),
            ("/\\", Operator::yfx(500)),
            ("\\/", Operator::yfx(500)),
            ("xor", Operator::yfx(500)),
            ("*", Operator::yfx(400)),
            ("/", Operator::yfx(400)),
            ("//", Operator::yfx(400)),
            ("rem", Operator::yfx(400)),
            ("mod", Operator::yfx(400)),
            ("<<", Operator::yfx(400)),
            (">>", Operator::yfx(400)),
            ("**", Operator::xfx(200)),
            ("^", Operator::xfy(200)),
            ("-", Operator::fy(200)),
            ("+", Operator::fy(200)),
            ("\\", Operator::fy(200)),
        ] {
            table.insert(Atom::new(name), op);
        }
        table
    }
}

impl OperatorTable {
    fn insert(&mut self, name: Atom, op: Operator) {
        let defs = self.ops.entry(name).or_default();
        defs.retain(|d| {
            !(d.is_prefix() == op.is_prefix()
                && (d.is_infix() || d.is_postfix()) == (op.is_infix() || op.is_postfix()))
        });
        defs.push(op);
    }

    /// Defines (priority > 0) or removes (priority 0) an operator.
    pub fn define(&mut self, name: Atom, spec: &str, priority: u16) -> Option<()> {
        let op = Operator::from_specifier(spec, priority)?;
        if priority == 0 {
            // Priority 0 removes whatever definition the name has in
            // the specifier's class (prefix vs infix/postfix).
            if let Some(defs) = self.ops.get_mut(&name) {
                defs.retain(|d| d.is_prefix() != op.is_prefix());
                if defs.is_empty() {
                    self.ops.remove(&name);
                }
            }
        } else {
            self.insert(name, op);
        }
        Some(())
    }

    pub fn prefix(&self, name: Atom) -> Option<Operator> {
        self.ops
            .get(&name)?
            .iter()
            .copied()
            .find(Operator::is_prefix)
    }

    pub fn infix_or_postfix(&self, name: Atom) -> Option<Operator> {
        self.ops
            .get(&name)?
            .iter()
            .copied()
            .find(|o| o.is_infix() || o.is_postfix())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Atom, Operator)> + '_ {
        self.ops
            .iter()
            .flat_map(|(name, defs)| defs.iter().map(move |op| (*name, *op)))
    }
}
