use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use lazy_static::lazy_static;

lazy_static! {
    static ref SYMBOLS: Mutex<HashSet<&'static str>> = Mutex::new(HashSet::new());
}

/// An interned symbolic constant.
///
/// Atoms are cheap `Copy` handles; two atoms with the same characters
/// compare equal and share storage. Interned strings live for the
/// lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom(&'static str);

impl Atom {
    pub fn new(name: &str) -> Self {
        let mut table = SYMBOLS.lock().unwrap();
        match table.get(name) {
            Some(s) => Atom(s),
            None => {
                let s: &'static str = Box::leak(name.to_string().into_boxed_str());
                table.insert(s);
                Atom(s)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(other.0)
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::new(s)
    }
}
