use std::collections::HashMap;

use crate::atom::Atom;
use crate::error;
use crate::flags::{Flags, QuoteFlag};
use crate::lexer::{Cursor, LexError, Lexer, Token};
use crate::operators::{Operator, OperatorTable};
use crate::term::{Term, Var};

#[derive(Debug)]
pub(crate) struct ReadError {
    pub detail: String,
    pub line: u32,
    pub column: u32,
}

impl ReadError {
    pub fn into_ball(self) -> Term {
        error::syntax_error(&format!(
            "{} at {}:{}",
            self.detail, self.line, self.column
        ))
    }
}

impl From<LexError> for ReadError {
    fn from(e: LexError) -> Self {
        ReadError {
            detail: e.detail,
            line: e.line,
            column: e.column,
        }
    }
}

/// Reads terms one at a time from program text, consulting the live
/// operator table. Variable scope is a single term; named variables of
/// the most recent term are kept for binding snapshots.
pub(crate) struct Reader<'a> {
    lexer: Lexer<'a>,
    operators: &'a OperatorTable,
    flags: &'a Flags,
    varmap: HashMap<String, Var>,
    var_order: Vec<Var>,
}

impl<'a> Reader<'a> {
    pub fn new(
        text: &'a str,
        operators: &'a OperatorTable,
        flags: &'a Flags,
        conversion: Option<&'a HashMap<char, char>>,
    ) -> Self {
        let conversion = if flags.char_conversion {
            conversion
        } else {
            None
        };
        Reader {
            lexer: Lexer::new(Cursor::new(text), conversion),
            operators,
            flags,
            varmap: HashMap::new(),
            var_order: Vec::new(),
        }
    }

    /// The named variables of the last term read, in first-encounter
    /// order.
    pub fn named_variables(&self) -> &[Var] {
        &self.var_order
    }

    /// Byte offset of the reader into the source text, for resuming
    /// after a term.
    pub fn offset(&self) -> usize {
        self.lexer.offset()
    }

    pub fn next_term(&mut self) -> Result<Option<Term>, ReadError> {
        self.varmap.clear();
        self.var_order.clear();

        let token = self.next_token()?;
        if token == Token::Eof {
            return Ok(None);
        }
        let (term, _, next) = self.parse(token, 1200)?;
        match next {
            Token::End => Ok(Some(term)),
            t => Err(self.error(format!("operator or end of clause expected, found {:?}", t))),
        }
    }

    fn error(&self, detail: String) -> ReadError {
        let (line, column) = self.lexer.position();
        ReadError {
            detail,
            line,
            column,
        }
    }

    fn next_token(&mut self) -> Result<Token, ReadError> {
        Ok(self.lexer.next()?)
    }

    fn variable(&mut self, name: &str) -> Term {
        if name == "_" {
            return Term::Var(Var::fresh());
        }
        if let Some(v) = self.varmap.get(name) {
            return Term::Var(*v);
        }
        let v = Var::named(name);
        self.varmap.insert(name.to_string(), v);
        self.var_order.push(v);
        Term::Var(v)
    }

    fn integer(&self, digits: &str, radix: u32, negative: bool) -> Result<Term, ReadError> {
        let text = if negative {
            format!("-{}", digits)
        } else {
            digits.to_string()
        };
        i64::from_str_radix(&text, radix)
            .map(Term::Int)
            .map_err(|_| self.error(format!("integer out of range: {}", text)))
    }

    fn float(&self, digits: &str, negative: bool) -> Result<Term, ReadError> {
        digits
            .parse::<f64>()
            .map(|f| Term::Float(if negative { -f } else { f }))
            .map_err(|_| self.error(format!("malformed float: {}", digits)))
    }

    fn reify_quoted(&self, s: String) -> Term {
        match self.flags.double_quotes {
            QuoteFlag::Codes => Term::list(s.chars().map(|c| Term::Int(c as i64)).collect::<Vec<_>>()),
            QuoteFlag::Chars => Term::list(
                s.chars()
                    .map(|c| Term::atom(&c.to_string()))
                    .collect::<Vec<_>>(),
            ),
            QuoteFlag::Atom => Term::atom(&s),
        }
    }

    fn parse_arg(&mut self, token: Token) -> Result<(Term, Token), ReadError> {
        let (term, _, next) = self.parse(token, 999)?;
        Ok((term, next))
    }

    fn compound_args(&mut self, functor: &str) -> Result<Term, ReadError> {
        let mut args = Vec::new();
        let mut token = self.next_token()?;
        loop {
            let (arg, next) = self.parse_arg(token)?;
            args.push(arg);
            match next {
                Token::Comma => token = self.next_token()?,
                Token::Close => return Ok(Term::compound(functor, args)),
                t => return Err(self.error(format!("expected , or ) in arguments, found {:?}", t))),
            }
        }
    }

    fn list(&mut self) -> Result<Term, ReadError> {
        let mut items = Vec::new();
        let mut token = self.next_token()?;
        if token == Token::CloseL {
            return Ok(Term::nil());
        }
        loop {
            let (item, next) = self.parse_arg(token)?;
            items.push(item);
            token = next;
            match token {
                Token::Comma => token = self.next_token()?,
                _ => break,
            }
        }
        let tail = match token {
            Token::Bar => {
                let t = self.next_token()?;
                let (tail, next) = self.parse_arg(t)?;
                token = next;
                tail
            }
            _ => Term::nil(),
        };
        if token != Token::CloseL {
            return Err(self.error(format!("expected ] to close list, found {:?}", token)));
        }
        Ok(Term::list_rest(items, tail))
    }

    fn name(&mut self, s: String, max: u16) -> Result<(Term, u16, Token), ReadError> {
        let next = self.next_token()?;
        match next {
            Token::OpenCt => {
                let t = self.compound_args(&s)?;
                Ok((t, 0, self.next_token()?))
            }
            Token::Int(t, r) if s == "-" => {
                let t = self.integer(&t, r, true)?;
                Ok((t, 0, self.next_token()?))
            }
            Token::Float(t) if s == "-" => {
                let t = self.float(&t, true)?;
                Ok((t, 0, self.next_token()?))
            }
            Token::CharCode(c) if s == "-" => {
                Ok((Term::Int(-(c as i64)), 0, self.next_token()?))
            }
            // Tokens that cannot begin an operand: the name stands for
            // itself even when it is a prefix operator.
            Token::Comma
            | Token::Close
            | Token::CloseL
            | Token::CloseC
            | Token::Bar
            | Token::End
            | Token::Eof => Ok((Term::atom(&s), 0, next)),
            _ => match self.operators.prefix(Atom::new(&s)) {
                Some(Operator::fx(p)) if p <= max => {
                    let (operand, _, after) = self.parse(next, p - 1)?;
                    Ok((Term::compound(&s, vec![operand]), p, after))
                }
                Some(Operator::fy(p)) if p <= max => {
                    let (operand, _, after) = self.parse(next, p)?;
                    Ok((Term::compound(&s, vec![operand]), p, after))
                }
                _ => Ok((Term::atom(&s), 0, next)),
            },
        }
    }

    fn primary(&mut self, token: Token, max: u16) -> Result<(Term, u16, Token), ReadError> {
        match token {
            Token::Eof => Err(self.error("unexpected end of input".to_string())),
            Token::Name(s) => self.name(s, max),
            Token::Var(s) => {
                let t = self.variable(&s);
                Ok((t, 0, self.next_token()?))
            }
            Token::Int(s, r) => {
                let t = self.integer(&s, r, false)?;
                Ok((t, 0, self.next_token()?))
            }
            Token::CharCode(c) => Ok((Term::Int(c as i64), 0, self.next_token()?)),
            Token::Float(s) => {
                let t = self.float(&s, false)?;
                Ok((t, 0, self.next_token()?))
            }
            Token::DoubleQuoted(s) => {
                let t = self.reify_quoted(s);
                Ok((t, 0, self.next_token()?))
            }
            Token::Open | Token::OpenCt => {
                let inner = self.next_token()?;
                let (term, _, next) = self.parse(inner, 1200)?;
                match next {
                    Token::Close => Ok((term, 0, self.next_token()?)),
                    t => Err(self.error(format!("expected ) found {:?}", t))),
                }
            }
            Token::OpenC => {
                let inner = self.next_token()?;
                if inner == Token::CloseC {
                    return Ok((Term::atom("{}"), 0, self.next_token()?));
                }
                let (term, _, next) = self.parse(inner, 1200)?;
                match next {
                    Token::CloseC => Ok((
                        Term::compound("{}", vec![term]),
                        0,
                        self.next_token()?,
                    )),
                    t => Err(self.error(format!("expected }} found {:?}", t))),
                }
            }
            Token::OpenL => {
                let t = self.list()?;
                Ok((t, 0, self.next_token()?))
            }
            t => Err(self.error(format!("unexpected token {:?}", t))),
        }
    }

    fn parse(&mut self, token: Token, max: u16) -> Result<(Term, u16, Token), ReadError> {
        let (mut term, mut prec, mut next) = self.primary(token, max)?;

        // Precedence climbing over infix and postfix operators.
        loop {
            let (name, p, left_max, right_max, postfix) = match &next {
                Token::Name(s) => match self.operators.infix_or_postfix(Atom::new(s)) {
                    Some(op) => decode(Atom::new(s), op),
                    None => break,
                },
                // ',' and '|' are solo tokens but still operators here
                // (ISO/IEC 13211-1 Cor.2 for '|').
                Token::Comma => (Atom::new(","), 1000, 999, 1000, false),
                Token::Bar => match self.operators.infix_or_postfix(Atom::new("|")) {
                    Some(op) => decode(Atom::new("|"), op),
                    None => break,
                },
                _ => break,
            };

            if p > max || prec > left_max {
                break;
            }

            if postfix {
                term = Term::apply(name, vec![term]);
                prec = p;
                next = self.next_token()?;
            } else {
                let t = self.next_token()?;
                let (rhs, _, after) = self.parse(t, right_max)?;
                term = Term::apply(name, vec![term, rhs]);
                prec = p;
                next = after;
            }
        }
        Ok((term, prec, next))
    }
}

fn decode(name: Atom, op: Operator) -> (Atom, u16, u16, u16, bool) {
    match op {
        Operator::xfx(p) => (name, p, p - 1, p - 1, false),
        Operator::xfy(p) => (name, p, p - 1, p, false),
        Operator::yfx(p) => (name, p, p, p - 1, false),
        Operator::xf(p) => (name, p, p - 1, 0, true),
        Operator::yf(p) => (name, p, p, 0, true),
        // Prefix definitions never reach the climb.
        Operator::fx(p) | Operator::fy(p) => (name, p, 0, 0, false),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::env::Env;

    fn read(s: &str) -> Term {
        let ops = OperatorTable::default();
        let flags = Flags::default();
        let mut r = Reader::new(s, &ops, &flags, None);
        r.next_term().unwrap().unwrap()
    }

    #[test]
    fn atoms_and_numbers() {
        assert_eq!(read("foo."), Term::atom("foo"));
        assert_eq!(read("'hi there'."), Term::atom("hi there"));
        assert_eq!(read("42."), Term::Int(42));
        assert_eq!(read("-42."), Term::Int(-42));
        assert_eq!(read("0xff."), Term::Int(255));
        assert_eq!(read("0'a."), Term::Int(97));
        assert_eq!(read("3.5."), Term::Float(3.5));
        assert_eq!(read("-3.5."), Term::Float(-3.5));
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(
            read("1 + 2 * 3."),
            Term::compound(
                "+",
                vec![
                    Term::Int(1),
                    Term::compound("*", vec![Term::Int(2), Term::Int(3)])
                ]
            )
        );
    }

    #[test]
    fn left_associativity() {
        assert_eq!(
            read("1 - 2 - 3."),
            Term::compound(
                "-",
                vec![
                    Term::compound("-", vec![Term::Int(1), Term::Int(2)]),
                    Term::Int(3)
                ]
            )
        );
    }

    #[test]
    fn clause_syntax() {
        let t = read("a :- b, c.");
        let (f, args) = t.as_callable().unwrap();
        assert_eq!(f.as_str(), ":-");
        assert_eq!(args[0], Term::atom("a"));
        assert_eq!(
            args[1],
            Term::compound(",", vec![Term::atom("b"), Term::atom("c")])
        );
    }

    #[test]
    fn conjunction_is_right_associative() {
        assert_eq!(
            read("a, b, c."),
            Term::compound(
                ",",
                vec![
                    Term::atom("a"),
                    Term::compound(",", vec![Term::atom("b"), Term::atom("c")])
                ]
            )
        );
    }

    #[test]
    fn lists_and_tails() {
        assert_eq!(
            read("[1, 2]."),
            Term::list(vec![Term::Int(1), Term::Int(2)])
        );
        assert_eq!(read("[]."), Term::nil());
        let t = read("[a | T].");
        let env = Env::default();
        let mut it = t.list_iter(&env);
        assert_eq!(it.next(), Some(Term::atom("a")));
        assert!(matches!(it.tail(), Term::Var(_)));
    }

    #[test]
    fn curly_braces() {
        assert_eq!(read("{}."), Term::atom("{}"));
        assert_eq!(read("{x}."), Term::compound("{}", vec![Term::atom("x")]));
    }

    #[test]
    fn variables_share_within_a_term() {
        let t = read("f(X, X, Y).");
        let (_, args) = t.as_callable().unwrap();
        assert_eq!(args[0], args[1]);
        assert_ne!(args[0], args[2]);
        // but '_' never shares
        let t = read("g(_, _).");
        let (_, args) = t.as_callable().unwrap();
        assert_ne!(args[0], args[1]);
    }

    #[test]
    fn named_variables_are_recorded_in_order() {
        let ops = OperatorTable::default();
        let flags = Flags::default();
        let mut r = Reader::new("f(Y, X, Y, _).", &ops, &flags, None);
        r.next_term().unwrap().unwrap();
        let names: Vec<&str> = r
            .named_variables()
            .iter()
            .map(|v| v.name.unwrap().as_str())
            .collect();
        assert_eq!(names, vec!["Y", "X"]);
    }

    #[test]
    fn double_quotes_follow_the_flag() {
        assert_eq!(
            read("\"ab\"."),
            Term::list(vec![Term::Int(97), Term::Int(98)])
        );
        let ops = OperatorTable::default();
        let flags = Flags {
            double_quotes: QuoteFlag::Chars,
            ..Flags::default()
        };
        let mut r = Reader::new("\"ab\".", &ops, &flags, None);
        assert_eq!(
            r.next_term().unwrap().unwrap(),
            Term::list(vec![Term::atom("a"), Term::atom("b")])
        );
    }

    #[test]
    fn operator_atom_in_argument_position() {
        let t = read("f(-, +).");
        let (_, args) = t.as_callable().unwrap();
        assert_eq!(args[0], Term::atom("-"));
        assert_eq!(args[1], Term::atom("+"));
    }

    #[test]
    fn prefix_operator_on_parenthesised_operand() {
        assert_eq!(
            read("- (1)."),
            Term::compound("-", vec![Term::Int(1)])
        );
        assert_eq!(read("\\+ a."), Term::compound("\\+", vec![Term::atom("a")]));
    }

    #[test]
    fn several_terms_from_one_source() {
        let ops = OperatorTable::default();
        let flags = Flags::default();
        let mut r = Reader::new("a. b. c.", &ops, &flags, None);
        assert_eq!(r.next_term().unwrap(), Some(Term::atom("a")));
        assert_eq!(r.next_term().unwrap(), Some(Term::atom("b")));
        assert_eq!(r.next_term().unwrap(), Some(Term::atom("c")));
        assert_eq!(r.next_term().unwrap(), None);
    }

    #[test]
    fn custom_operators_take_effect() {
        let mut ops = OperatorTable::default();
        ops.define(Atom::new("==>"), "xfx", 800).unwrap();
        let flags = Flags::default();
        let mut r = Reader::new("a ==> b.", &ops, &flags, None);
        assert_eq!(
            r.next_term().unwrap().unwrap(),
            Term::compound("==>", vec![Term::atom("a"), Term::atom("b")])
        );
    }

    #[test]
    fn missing_end_is_a_syntax_error() {
        let ops = OperatorTable::default();
        let flags = Flags::default();
        let mut r = Reader::new("foo", &ops, &flags, None);
        assert!(r.next_term().is_err());
    }
}
