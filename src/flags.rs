/// How double-quoted (and back-quoted) text is reified by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteFlag {
    Chars,
    Codes,
    Atom,
}

/// What happens when a goal reaches a procedure nobody defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownFlag {
    Error,
    Fail,
    Warning,
}

/// The Prolog flag set. `bounded`, `max_integer`, `min_integer` and
/// `integer_rounding_function` are fixed properties of the engine and
/// only appear through `current_prolog_flag/2`.
#[derive(Debug, Clone)]
pub struct Flags {
    pub unknown: UnknownFlag,
    pub double_quotes: QuoteFlag,
    pub char_conversion: bool,
    pub debug: bool,
}

impl Flags {
    pub const MAX_ARITY: usize = 255;
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            unknown: UnknownFlag::Error,
            double_quotes: QuoteFlag::Codes,
            char_conversion: false,
            debug: false,
        }
    }
}
