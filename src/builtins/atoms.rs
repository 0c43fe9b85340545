use crate::env::Env;
use crate::error;
use crate::lexer::{Cursor, Lexer, Token};
use crate::machine::Machine;
use crate::solve::{Cont, Promise, Thunk};
use crate::term::Term;

pub(crate) fn solve_atom_length(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let a = match env.resolve(&args[0]) {
        Term::Var(_) => return Promise::ball(error::instantiation_error()),
        Term::Atom(a) => a,
        other => return Promise::ball(error::type_error("atom", env.resolve_deep(&other))),
    };
    match env.resolve(&args[1]) {
        Term::Int(n) if n < 0 => {
            return Promise::ball(error::domain_error("not_less_than_zero", Term::Int(n)))
        }
        Term::Var(_) | Term::Int(_) => {}
        other => return Promise::ball(error::type_error("integer", env.resolve_deep(&other))),
    }
    let len = a.as_str().chars().count() as i64;
    Promise::unify(m, &args[1], &Term::Int(len), k, env)
}

pub(crate) fn solve_atom_concat(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let left = env.resolve(&args[0]);
    let right = env.resolve(&args[1]);
    let whole = env.resolve(&args[2]);
    for t in [&left, &right, &whole] {
        match t {
            Term::Var(_) | Term::Atom(_) => {}
            other => {
                return Promise::ball(error::type_error("atom", env.resolve_deep(other)))
            }
        }
    }
    if let (Term::Atom(a), Term::Atom(b)) = (&left, &right) {
        let joined = Term::atom(&format!("{}{}", a, b));
        return Promise::unify(m, &joined, &args[2], k, env);
    }
    let whole = match &whole {
        Term::Atom(a) => *a,
        _ => return Promise::ball(error::instantiation_error()),
    };
    // Enumerate every split of the known whole.
    let s = whole.as_str();
    let mut splits: Vec<usize> = vec![0];
    splits.extend(s.char_indices().map(|(i, c)| i + c.len_utf8()));
    let alts: Vec<Thunk> = splits
        .into_iter()
        .map(|at| {
            let a = args[0].clone();
            let b = args[1].clone();
            let k = k.clone();
            let env = env.clone();
            Box::new(move |m: &mut Machine| {
                match env
                    .unify(&a, &Term::atom(&s[..at]), false)
                    .and_then(|env| env.unify(&b, &Term::atom(&s[at..]), false))
                {
                    Some(env) => k(m, &env),
                    None => Promise::Fail,
                }
            }) as Thunk
        })
        .collect();
    Promise::delay(alts)
}

pub(crate) fn solve_sub_atom(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    let whole = match env.resolve(&args[0]) {
        Term::Var(_) => return Promise::ball(error::instantiation_error()),
        Term::Atom(a) => a,
        other => return Promise::ball(error::type_error("atom", env.resolve_deep(&other))),
    };
    match env.resolve(&args[4]) {
        Term::Var(_) | Term::Atom(_) => {}
        other => return Promise::ball(error::type_error("atom", env.resolve_deep(&other))),
    }
    for t in &args[1..4] {
        match env.resolve(t) {
            Term::Var(_) | Term::Int(_) => {}
            other => {
                return Promise::ball(error::type_error("integer", env.resolve_deep(&other)))
            }
        }
    }
    let chars: Vec<char> = whole.as_str().chars().collect();
    let n = chars.len();
    let mut alts: Vec<Thunk> = Vec::new();
    for before in 0..=n {
        for len in 0..=(n - before) {
            let sub: String = chars[before..before + len].iter().collect();
            let b = args[1].clone();
            let l = args[2].clone();
            let a = args[3].clone();
            let s = args[4].clone();
            let k = k.clone();
            let env = env.clone();
            alts.push(Box::new(move |m: &mut Machine| {
                let bound = env
                    .unify(&b, &Term::Int(before as i64), false)
                    .and_then(|env| env.unify(&l, &Term::Int(len as i64), false))
                    .and_then(|env| {
                        env.unify(&a, &Term::Int((n - before - len) as i64), false)
                    })
                    .and_then(|env| env.unify(&s, &Term::atom(&sub), false));
                match bound {
                    Some(env) => k(m, &env),
                    None => Promise::Fail,
                }
            }) as Thunk);
        }
    }
    Promise::delay(alts)
}

enum TextKind {
    Chars,
    Codes,
}

fn text_to_list(s: &str, kind: &TextKind) -> Term {
    match kind {
        TextKind::Chars => Term::list(
            s.chars()
                .map(|c| Term::atom(&c.to_string()))
                .collect::<Vec<_>>(),
        ),
        TextKind::Codes => Term::list(s.chars().map(|c| Term::Int(c as i64)).collect::<Vec<_>>()),
    }
}

/// Collects a proper list of chars/codes into a string. `Ok(None)`
/// means the list was incomplete (instantiation error at the caller).
fn list_to_text(list: &Term, kind: &TextKind, env: &Env) -> Result<Option<String>, Term> {
    let mut out = String::new();
    let mut it = list.list_iter(env);
    for item in it.by_ref() {
        match (&kind, &item) {
            (_, Term::Var(_)) => return Ok(None),
            (TextKind::Chars, Term::Atom(a)) if a.as_str().chars().count() == 1 => {
                out.push(a.as_str().chars().next().unwrap());
            }
            (TextKind::Chars, other) => {
                return Err(error::type_error("character", env.resolve_deep(other)))
            }
            (TextKind::Codes, Term::Int(i)) => {
                match u32::try_from(*i).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => return Err(error::representation_error("character_code")),
                }
            }
            (TextKind::Codes, other) => {
                return Err(error::type_error("integer", env.resolve_deep(other)))
            }
        }
    }
    match it.tail() {
        Term::Var(_) => Ok(None),
        t if t.is_nil() => Ok(Some(out)),
        _ => Err(error::type_error("list", env.resolve_deep(list))),
    }
}

fn solve_atom_text(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
    kind: TextKind,
) -> Promise {
    match env.resolve(&args[0]) {
        Term::Atom(a) => {
            let list = text_to_list(a.as_str(), &kind);
            Promise::unify(m, &list, &args[1], k, env)
        }
        Term::Var(_) => match list_to_text(&args[1], &kind, env) {
            Ok(Some(text)) => Promise::unify(m, &args[0], &Term::atom(&text), k, env),
            Ok(None) => Promise::ball(error::instantiation_error()),
            Err(ball) => Promise::ball(ball),
        },
        other => Promise::ball(error::type_error("atom", env.resolve_deep(&other))),
    }
}

pub(crate) fn solve_atom_chars(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    solve_atom_text(m, args, k, env, TextKind::Chars)
}

pub(crate) fn solve_atom_codes(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    solve_atom_text(m, args, k, env, TextKind::Codes)
}

pub(crate) fn solve_char_code(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    match env.resolve(&args[0]) {
        Term::Atom(a) if a.as_str().chars().count() == 1 => {
            let code = a.as_str().chars().next().unwrap() as i64;
            Promise::unify(m, &args[1], &Term::Int(code), k, env)
        }
        Term::Var(_) => match env.resolve(&args[1]) {
            Term::Var(_) => Promise::ball(error::instantiation_error()),
            Term::Int(i) => match u32::try_from(i).ok().and_then(char::from_u32) {
                Some(c) => {
                    Promise::unify(m, &args[0], &Term::atom(&c.to_string()), k, env)
                }
                None => Promise::ball(error::representation_error("character_code")),
            },
            other => Promise::ball(error::type_error("integer", env.resolve_deep(&other))),
        },
        other => Promise::ball(error::type_error("character", env.resolve_deep(&other))),
    }
}

/// Parses the text of a number the way the reader lexes one: optional
/// layout, optional sign, any radix form.
fn parse_number(text: &str) -> Option<Term> {
    let mut lexer = Lexer::new(Cursor::new(text), None);
    let first = lexer.next().ok()?;
    let (negative, number) = match first {
        Token::Name(ref s) if s == "-" => (true, lexer.next().ok()?),
        t => (false, t),
    };
    let value = match number {
        Token::Int(digits, radix) => {
            let text = if negative {
                format!("-{}", digits)
            } else {
                digits
            };
            Term::Int(i64::from_str_radix(&text, radix).ok()?)
        }
        Token::Float(digits) => {
            let f: f64 = digits.parse().ok()?;
            Term::Float(if negative { -f } else { f })
        }
        Token::CharCode(c) => Term::Int(if negative { -(c as i64) } else { c as i64 }),
        _ => return None,
    };
    match lexer.next().ok()? {
        Token::Eof => Some(value),
        _ => None,
    }
}

fn number_to_text(t: &Term) -> String {
    crate::writer::term_to_string(
        t,
        &Env::default(),
        &crate::operators::DEFAULT_TABLE,
        &crate::writer::WriteOptions::canonical(),
    )
}

fn solve_number_text(
    m: &mut Machine,
    args: &[Term],
    k: &Cont,
    env: &Env,
    kind: TextKind,
) -> Promise {
    match env.resolve(&args[0]) {
        n @ (Term::Int(_) | Term::Float(_)) => {
            let list = text_to_list(&number_to_text(&n), &kind);
            Promise::unify(m, &list, &args[1], k, env)
        }
        Term::Var(_) => match list_to_text(&args[1], &kind, env) {
            Ok(Some(text)) => match parse_number(&text) {
                Some(n) => Promise::unify(m, &args[0], &n, k, env),
                None => Promise::ball(error::syntax_error("illegal_number")),
            },
            Ok(None) => Promise::ball(error::instantiation_error()),
            Err(ball) => Promise::ball(ball),
        },
        other => Promise::ball(error::type_error("number", env.resolve_deep(&other))),
    }
}

pub(crate) fn solve_number_chars(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    solve_number_text(m, args, k, env, TextKind::Chars)
}

pub(crate) fn solve_number_codes(m: &mut Machine, args: &[Term], k: &Cont, env: &Env) -> Promise {
    solve_number_text(m, args, k, env, TextKind::Codes)
}
