use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

/// A position-tracking cursor over program text.
pub(crate) struct Cursor<'a> {
    chars: Peekable<Chars<'a>>,
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Cursor {
            chars: text.chars().peekable(),
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    fn next_raw(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
                self.offset += 1;
            }
            Some(c) => {
                self.column += 1;
                self.offset += c.len_utf8();
            }
            None => {}
        }
        c
    }

    fn peek_raw(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum Token {
    Eof,
    Name(String),
    Var(String),
    Int(String, u32),
    CharCode(char),
    Float(String),
    DoubleQuoted(String),
    Open,
    OpenCt,
    Close,
    OpenL,
    CloseL,
    OpenC,
    CloseC,
    Bar,
    Comma,
    End,
}

#[derive(Debug)]
pub(crate) struct LexError {
    pub detail: String,
    pub line: u32,
    pub column: u32,
}

enum Char {
    Layout(char),
    Solo(char),
    Meta(char),
    Digit(char),
    Underscore,
    CapitalLetter(char),
    SmallLetter(char),
    Graphic(char),
    Invalid(char),
    Eof,
}

pub(crate) fn is_graphic_char(c: char) -> bool {
    matches!(
        c,
        '#' | '$' | '&' | '*' | '+' | '-' | '.' | '/' | ':' | '<' | '=' | '>' | '?' | '@' | '^'
            | '~' | '\\'
    )
}

pub(crate) fn is_alpha_numeric_atom(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some('a'..='z'))
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn classify(c: Option<char>) -> Char {
    match c {
        None => Char::Eof,
        Some(c) => match c {
            ' ' | '\t' | '\r' | '\n' => Char::Layout(c),
            '!' | '(' | ')' | ',' | ';' | '[' | ']' | '{' | '}' | '|' | '%' => Char::Solo(c),
            '\'' | '"' | '`' => Char::Meta(c),
            '0'..='9' => Char::Digit(c),
            '_' => Char::Underscore,
            'A'..='Z' => Char::CapitalLetter(c),
            'a'..='z' => Char::SmallLetter(c),
            c if is_graphic_char(c) => Char::Graphic(c),
            c => Char::Invalid(c),
        },
    }
}

/// The token reader. Character conversion applies outside quoted
/// tokens when the `char_conversion` flag is on.
pub(crate) struct Lexer<'a> {
    cursor: Cursor<'a>,
    conversion: Option<&'a HashMap<char, char>>,
}

impl<'a> Lexer<'a> {
    pub fn new(cursor: Cursor<'a>, conversion: Option<&'a HashMap<char, char>>) -> Self {
        Lexer { cursor, conversion }
    }

    /// Byte offset of the cursor into the source text.
    pub fn offset(&self) -> usize {
        self.cursor.offset
    }

    /// Line and column of the cursor, for error reporting.
    pub fn position(&self) -> (u32, u32) {
        (self.cursor.line, self.cursor.column)
    }

    fn error(&self, detail: impl Into<String>) -> LexError {
        LexError {
            detail: detail.into(),
            line: self.cursor.line,
            column: self.cursor.column,
        }
    }

    fn convert(&self, c: Option<char>) -> Option<char> {
        match (c, self.conversion) {
            (Some(c), Some(table)) => Some(*table.get(&c).unwrap_or(&c)),
            _ => c,
        }
    }

    fn next_char(&mut self) -> Char {
        let c = self.cursor.next_raw();
        classify(self.convert(c))
    }

    fn peek_char(&mut self) -> Char {
        let c = self.cursor.peek_raw();
        classify(self.convert(c))
    }

    fn eat(&mut self) {
        self.cursor.next_raw();
    }

    // bracketed comment (* 6.4.1 *)
    fn multiline_comment(&mut self) -> Result<Char, LexError> {
        loop {
            match self.next_char() {
                Char::Eof => return Err(self.error("unterminated block comment")),
                Char::Graphic('*') => {
                    if let Char::Graphic('/') = self.peek_char() {
                        self.eat();
                        return Ok(self.next_char());
                    }
                }
                _ => {}
            }
        }
    }

    fn integral(&mut self, radix: u32) -> Result<Token, LexError> {
        let mut t = String::new();
        while let Some(c) = self.cursor.peek_raw() {
            if c.is_digit(radix) {
                t.push(c);
                self.eat();
            } else {
                break;
            }
        }
        if t.is_empty() {
            Err(self.error(format!("missing digits after radix {} prefix", radix)))
        } else {
            Ok(Token::Int(t, radix))
        }
    }

    // integer and float number (* 6.4 *)
    fn numeric(&mut self, c: char) -> Result<Token, LexError> {
        let mut t = c.to_string();
        loop {
            match self.peek_char() {
                Char::Digit(c) => {
                    t.push(c);
                    self.eat();
                }
                Char::Graphic('.') => {
                    // A '.' only continues the number when a digit
                    // follows; otherwise it ends the term.
                    let mut ahead = self.cursor.chars.clone();
                    ahead.next();
                    match ahead.next() {
                        Some(d) if d.is_ascii_digit() => {
                            self.eat();
                            t.push('.');
                            return self.fraction(t);
                        }
                        _ => return Ok(Token::Int(t, 10)),
                    }
                }
                _ => return Ok(Token::Int(t, 10)),
            }
        }
    }

    fn fraction(&mut self, mut t: String) -> Result<Token, LexError> {
        loop {
            match self.peek_char() {
                Char::Digit(c) => {
                    t.push(c);
                    self.eat();
                }
                Char::CapitalLetter('E') | Char::SmallLetter('e') => {
                    let mut ahead = self.cursor.chars.clone();
                    ahead.next();
                    let exp_head = ahead.next();
                    let signed = matches!(exp_head, Some('+') | Some('-'));
                    let has_digit = if signed {
                        matches!(ahead.next(), Some(d) if d.is_ascii_digit())
                    } else {
                        matches!(exp_head, Some(d) if d.is_ascii_digit())
                    };
                    if !has_digit {
                        return Ok(Token::Float(t));
                    }
                    t.push('e');
                    self.eat();
                    if signed {
                        t.push(self.cursor.next_raw().unwrap());
                    }
                    loop {
                        match self.peek_char() {
                            Char::Digit(c) => {
                                t.push(c);
                                self.eat();
                            }
                            _ => return Ok(Token::Float(t)),
                        }
                    }
                }
                _ => return Ok(Token::Float(t)),
            }
        }
    }

    fn alpha_numeric(&mut self, c: char) -> String {
        let mut t = c.to_string();
        loop {
            match self.peek_char() {
                Char::Underscore => t.push('_'),
                Char::SmallLetter(c) | Char::CapitalLetter(c) | Char::Digit(c) => t.push(c),
                _ => return t,
            }
            self.eat();
        }
    }

    fn graphic(&mut self, c: char) -> String {
        let mut t = c.to_string();
        while let Some(c) = self.cursor.peek_raw() {
            if is_graphic_char(c) {
                t.push(c);
                self.eat();
            } else {
                break;
            }
        }
        t
    }

    // escape sequence (* 6.4.2.1 *)
    fn escape(&mut self) -> Result<Option<char>, LexError> {
        match self.cursor.next_raw() {
            None => Err(self.error("unterminated escape sequence")),
            Some('\n') => Ok(None),
            Some('\\') => Ok(Some('\\')),
            Some('\'') => Ok(Some('\'')),
            Some('"') => Ok(Some('"')),
            Some('`') => Ok(Some('`')),
            Some('a') => Ok(Some('\x07')),
            Some('b') => Ok(Some('\x08')),
            Some('f') => Ok(Some('\x0C')),
            Some('n') => Ok(Some('\n')),
            Some('r') => Ok(Some('\r')),
            Some('t') => Ok(Some('\t')),
            Some('v') => Ok(Some('\x0B')),
            Some('x') => self.coded_escape(16).map(Some),
            Some(c) if ('0'..='7').contains(&c) => {
                let mut code = c.to_digit(8).unwrap();
                loop {
                    match self.cursor.peek_raw() {
                        Some(d) if d.is_digit(8) => {
                            code = code * 8 + d.to_digit(8).unwrap();
                            self.eat();
                        }
                        Some('\\') => {
                            self.eat();
                            break;
                        }
                        _ => return Err(self.error("octal escape missing closing backslash")),
                    }
                }
                char::from_u32(code)
                    .map(Some)
                    .ok_or_else(|| self.error("escape out of range"))
            }
            Some(c) => Err(self.error(format!("invalid escape character '{}'", c))),
        }
    }

    fn coded_escape(&mut self, radix: u32) -> Result<char, LexError> {
        let mut code: u32 = 0;
        let mut any = false;
        loop {
            match self.cursor.peek_raw() {
                Some(d) if d.is_digit(radix) => {
                    any = true;
                    code = code
                        .checked_mul(radix)
                        .and_then(|c| c.checked_add(d.to_digit(radix).unwrap()))
                        .ok_or_else(|| self.error("escape out of range"))?;
                    self.eat();
                }
                Some('\\') if any => {
                    self.eat();
                    return char::from_u32(code).ok_or_else(|| self.error("escape out of range"));
                }
                _ => return Err(self.error("malformed hexadecimal escape")),
            }
        }
    }

    // quoted token (* 6.4.2 *)
    fn quoted(&mut self, quote: char) -> Result<String, LexError> {
        let mut t = String::new();
        loop {
            match self.cursor.next_raw() {
                None => return Err(self.error(format!("missing closing {}", quote))),
                Some('\\') => {
                    if let Some(c) = self.escape()? {
                        t.push(c);
                    }
                }
                Some(c) if c == quote => match self.cursor.peek_raw() {
                    Some(d) if d == quote => {
                        t.push(c);
                        self.eat();
                    }
                    _ => return Ok(t),
                },
                Some(c) => t.push(c),
            }
        }
    }

    // 0'c character code (* 6.4.4 *)
    fn char_code(&mut self) -> Result<Token, LexError> {
        match self.cursor.next_raw() {
            None => Err(self.error("missing character after 0'")),
            Some('\\') => match self.escape()? {
                Some(c) => Ok(Token::CharCode(c)),
                None => Err(self.error("invalid character code escape")),
            },
            Some('\'') => {
                // 0''' and 0'' both denote the quote character.
                if self.cursor.peek_raw() == Some('\'') {
                    self.eat();
                }
                Ok(Token::CharCode('\''))
            }
            Some(c) => Ok(Token::CharCode(c)),
        }
    }

    pub fn next(&mut self) -> Result<Token, LexError> {
        let mut c = self.next_char();

        // open ct (* 6.4 *)
        if let Char::Solo('(') = c {
            return Ok(Token::OpenCt);
        }

        loop {
            match c {
                Char::Eof => return Ok(Token::Eof),

                // layout text sequence (* 6.4.1 *)
                Char::Layout(_) => c = self.next_char(),

                // single line comment (* 6.4.1 *)
                Char::Solo('%') => loop {
                    match self.next_char() {
                        Char::Eof => return Ok(Token::Eof),
                        Char::Layout('\n') => {
                            c = self.next_char();
                            break;
                        }
                        _ => {}
                    }
                },

                // letter digit token (* 6.4.2 *)
                Char::SmallLetter(c) => return Ok(Token::Name(self.alpha_numeric(c))),

                // graphic token (* 6.4.2 *)
                Char::Graphic('.') => {
                    match self.peek_char() {
                        Char::Solo('%') | Char::Layout(_) | Char::Eof => return Ok(Token::End),
                        _ => {}
                    }
                    return Ok(Token::Name(self.graphic('.')));
                }
                Char::Graphic('/') => {
                    if let Char::Graphic('*') = self.peek_char() {
                        self.eat();
                        c = self.multiline_comment()?;
                    } else {
                        return Ok(Token::Name(self.graphic('/')));
                    }
                }
                Char::Graphic(c) => return Ok(Token::Name(self.graphic(c))),

                Char::Meta('\'') => return Ok(Token::Name(self.quoted('\'')?)),

                // semicolon and cut tokens (* 6.4.2 *)
                Char::Solo(';') => return Ok(Token::Name(";".to_string())),
                Char::Solo('!') => return Ok(Token::Name("!".to_string())),

                // variable (* 6.4 *)
                Char::Underscore => return Ok(Token::Var(self.alpha_numeric('_'))),
                Char::CapitalLetter(c) => return Ok(Token::Var(self.alpha_numeric(c))),

                Char::Digit('0') => {
                    return match self.peek_char() {
                        Char::Meta('\'') => {
                            self.eat();
                            self.char_code()
                        }
                        Char::SmallLetter('b') => {
                            self.eat();
                            self.integral(2)
                        }
                        Char::SmallLetter('o') => {
                            self.eat();
                            self.integral(8)
                        }
                        Char::SmallLetter('x') => {
                            self.eat();
                            self.integral(16)
                        }
                        _ => self.numeric('0'),
                    };
                }
                Char::Digit(c) => return self.numeric(c),

                // double quoted list (* 6.4 *)
                Char::Meta('"') => return Ok(Token::DoubleQuoted(self.quoted('"')?)),

                Char::Solo('(') => return Ok(Token::Open),
                Char::Solo(')') => return Ok(Token::Close),
                Char::Solo('[') => return Ok(Token::OpenL),
                Char::Solo(']') => return Ok(Token::CloseL),
                Char::Solo('{') => return Ok(Token::OpenC),
                Char::Solo('}') => return Ok(Token::CloseC),
                Char::Solo('|') => return Ok(Token::Bar),
                Char::Solo(',') => return Ok(Token::Comma),

                Char::Meta(c) | Char::Solo(c) | Char::Invalid(c) => {
                    return Err(self.error(format!("unexpected character '{}'", c)))
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tokens(s: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(Cursor::new(s), None);
        let mut out = Vec::new();
        loop {
            let t = lexer.next().unwrap();
            if t == Token::Eof {
                return out;
            }
            out.push(t);
        }
    }

    #[test]
    fn names_and_variables() {
        assert_eq!(
            tokens("foo Bar _baz _"),
            vec![
                Token::Name("foo".into()),
                Token::Var("Bar".into()),
                Token::Var("_baz".into()),
                Token::Var("_".into()),
            ]
        );
    }

    #[test]
    fn graphic_and_solo_names() {
        assert_eq!(
            tokens(":- =.. ; !"),
            vec![
                Token::Name(":-".into()),
                Token::Name("=..".into()),
                Token::Name(";".into()),
                Token::Name("!".into()),
            ]
        );
    }

    #[test]
    fn numbers_in_all_radixes() {
        assert_eq!(
            tokens("42 0b101 0o17 0xff 3.25 1.0e3 0'a 0'\\n"),
            vec![
                Token::Int("42".into(), 10),
                Token::Int("101".into(), 2),
                Token::Int("17".into(), 8),
                Token::Int("ff".into(), 16),
                Token::Float("3.25".into()),
                Token::Float("1.0e3".into()),
                Token::CharCode('a'),
                Token::CharCode('\n'),
            ]
        );
    }

    #[test]
    fn integer_then_end_dot() {
        assert_eq!(
            tokens("7."),
            vec![Token::Int("7".into(), 10), Token::End]
        );
    }

    #[test]
    fn quoted_atoms_with_escapes() {
        assert_eq!(
            tokens(r"'hello world' 'it''s' 'a\nb' '\x41\'"),
            vec![
                Token::Name("hello world".into()),
                Token::Name("it's".into()),
                Token::Name("a\nb".into()),
                Token::Name("A".into()),
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            tokens("a % line\nb /* block\nstill */ c"),
            vec![
                Token::Name("a".into()),
                Token::Name("b".into()),
                Token::Name("c".into()),
            ]
        );
    }

    #[test]
    fn open_ct_only_without_layout() {
        assert_eq!(
            tokens("f(x)"),
            vec![
                Token::Name("f".into()),
                Token::OpenCt,
                Token::Name("x".into()),
                Token::Close,
            ]
        );
        assert_eq!(
            tokens("f (x)"),
            vec![
                Token::Name("f".into()),
                Token::Open,
                Token::Name("x".into()),
                Token::Close,
            ]
        );
    }

    #[test]
    fn end_token_requires_layout_or_eof() {
        assert_eq!(
            tokens("a. b"),
            vec![Token::Name("a".into()), Token::End, Token::Name("b".into())]
        );
        assert_eq!(tokens("a.b"), {
            vec![
                Token::Name("a".into()),
                Token::Name(".".into()),
                Token::Name("b".into()),
            ]
        });
    }
}
