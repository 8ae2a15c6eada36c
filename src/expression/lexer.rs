//! Tokenizer for the expression/script language.

use super::error::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    /// Template literal: alternating literal text and `${...}` sources.
    Template(Vec<TemplatePart>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Lit(String),
    /// Source of an interpolated expression and its offset in the input.
    Expr(String, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub pos: usize,
    /// A line break precedes this token (for `return` on its own line).
    pub newline_before: bool,
}

// Longest first so that `===` wins over `==` and `=`.
const PUNCTS: &[&str] = &[
    "...", "===", "!==", "**", "?.", "??", "=>", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=",
    "*=", "/=", "++", "--", "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/",
    "%", "!", "?", ":", ".", "=",
];

pub fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
        base: 0,
    }
    .run()
}

/// Tokenize a fragment whose offsets should be reported relative to `base`.
pub fn tokenize_at(src: &str, base: usize) -> Result<Vec<Token>, ExprError> {
    Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
        base,
    }
    .run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>, ExprError> {
        let mut out = Vec::new();
        loop {
            let newline_before = self.skip_trivia()?;
            let start = self.pos;
            let Some(&c) = self.bytes.get(self.pos) else {
                out.push(Token {
                    tok: Tok::Eof,
                    pos: self.base + start,
                    newline_before,
                });
                return Ok(out);
            };
            let tok = match c {
                b'0'..=b'9' => self.number()?,
                b'.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                b'"' | b'\'' => self.string(c)?,
                b'`' => self.template()?,
                c if is_ident_start(c) => self.ident(),
                _ => self.punct()?,
            };
            out.push(Token {
                tok,
                pos: self.base + start,
                newline_before,
            });
        }
    }

    fn err(&self, at: usize, msg: impl Into<String>) -> ExprError {
        ExprError::syntax(self.base + at, msg)
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.bytes.get(self.pos + off).copied()
    }

    /// Skip whitespace and comments; report whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ExprError> {
        let mut newline = false;
        while let Some(&c) = self.bytes.get(self.pos) {
            match c {
                b'\n' => {
                    newline = true;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while let Some(&c) = self.bytes.get(self.pos) {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.bytes.get(self.pos) {
                            None => return Err(self.err(start, "unterminated comment")),
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(b'\n') => {
                                newline = true;
                                self.pos += 1;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                _ if c >= 0x80 && self.src[self.pos..].starts_with('\u{a0}') => {
                    self.pos += '\u{a0}'.len_utf8();
                }
                _ => break,
            }
        }
        Ok(newline)
    }

    fn number(&mut self) -> Result<Tok, ExprError> {
        let start = self.pos;
        if self.bytes[self.pos] == b'0' && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.bytes.get(self.pos).is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = &self.src[digits_start..self.pos];
            return u64::from_str_radix(digits, 16)
                .map(|n| Tok::Number(n as f64))
                .map_err(|_| self.err(start, "invalid hex literal"));
        }
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == b'_')
        {
            self.pos += 1;
        }
        if self.bytes.get(self.pos) == Some(&b'.')
            && self.peek_at(1).is_none_or(|c| c.is_ascii_digit() || !is_ident_start(c))
        {
            self.pos += 1;
            while self.bytes.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.bytes.get(self.pos), Some(b'e' | b'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.bytes.get(self.pos), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.bytes.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
                while self.bytes.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        text.parse::<f64>()
            .map(Tok::Number)
            .map_err(|_| self.err(start, format!("invalid number '{text}'")))
    }

    fn string(&mut self, quote: u8) -> Result<Tok, ExprError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(ch) = self.src[self.pos..].chars().next() else {
                return Err(self.err(start, "unterminated string literal"));
            };
            match ch {
                c if c as u32 == quote as u32 => {
                    self.pos += 1;
                    return Ok(Tok::Str(out));
                }
                '\n' => return Err(self.err(start, "unterminated string literal")),
                '\\' => {
                    self.pos += 1;
                    self.escape(&mut out, start)?;
                }
                c => {
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn escape(&mut self, out: &mut String, start: usize) -> Result<(), ExprError> {
        let Some(ch) = self.src[self.pos..].chars().next() else {
            return Err(self.err(start, "unterminated escape sequence"));
        };
        self.pos += ch.len_utf8();
        match ch {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            '\n' => {}
            'u' => {
                let hex = if self.bytes.get(self.pos) == Some(&b'{') {
                    let end = self.src[self.pos..]
                        .find('}')
                        .ok_or_else(|| self.err(start, "bad unicode escape"))?;
                    let h = &self.src[self.pos + 1..self.pos + end];
                    self.pos += end + 1;
                    h
                } else {
                    let h = self
                        .src
                        .get(self.pos..self.pos + 4)
                        .ok_or_else(|| self.err(start, "bad unicode escape"))?;
                    self.pos += 4;
                    h
                };
                let code =
                    u32::from_str_radix(hex, 16).map_err(|_| self.err(start, "bad unicode escape"))?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            'x' => {
                let h = self
                    .src
                    .get(self.pos..self.pos + 2)
                    .ok_or_else(|| self.err(start, "bad hex escape"))?;
                self.pos += 2;
                let code = u32::from_str_radix(h, 16).map_err(|_| self.err(start, "bad hex escape"))?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            other => out.push(other),
        }
        Ok(())
    }

    fn template(&mut self) -> Result<Tok, ExprError> {
        let start = self.pos;
        self.pos += 1;
        let mut parts = Vec::new();
        let mut lit = String::new();
        loop {
            let Some(ch) = self.src[self.pos..].chars().next() else {
                return Err(self.err(start, "unterminated template literal"));
            };
            match ch {
                '`' => {
                    self.pos += 1;
                    if !lit.is_empty() {
                        parts.push(TemplatePart::Lit(lit));
                    }
                    return Ok(Tok::Template(parts));
                }
                '\\' => {
                    self.pos += 1;
                    self.escape(&mut lit, start)?;
                }
                '$' if self.peek_at(1) == Some(b'{') => {
                    if !lit.is_empty() {
                        parts.push(TemplatePart::Lit(std::mem::take(&mut lit)));
                    }
                    self.pos += 2;
                    let expr_start = self.pos;
                    let end = self.matching_brace(start)?;
                    parts.push(TemplatePart::Expr(
                        self.src[expr_start..end].to_string(),
                        self.base + expr_start,
                    ));
                    self.pos = end + 1;
                }
                c => {
                    lit.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    /// Offset of the `}` closing a `${` whose body starts at `self.pos`.
    fn matching_brace(&self, start: usize) -> Result<usize, ExprError> {
        let mut depth = 0usize;
        let mut i = self.pos;
        let mut quote: Option<u8> = None;
        while let Some(&c) = self.bytes.get(i) {
            match quote {
                Some(q) => {
                    if c == b'\\' {
                        i += 1;
                    } else if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    b'\'' | b'"' | b'`' => quote = Some(c),
                    b'{' => depth += 1,
                    b'}' if depth == 0 => return Ok(i),
                    b'}' => depth -= 1,
                    _ => {}
                },
            }
            i += 1;
        }
        Err(self.err(start, "unterminated template expression"))
    }

    fn ident(&mut self) -> Tok {
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|c| is_ident_part(*c)) {
            self.pos += 1;
        }
        Tok::Ident(self.src[start..self.pos].to_string())
    }

    fn punct(&mut self) -> Result<Tok, ExprError> {
        let rest = &self.src[self.pos..];
        for p in PUNCTS {
            if rest.starts_with(p) {
                // `a?.5:1` is a conditional, not optional chaining.
                if *p == "?." && rest[2..].starts_with(|c: char| c.is_ascii_digit()) {
                    continue;
                }
                self.pos += p.len();
                return Ok(Tok::Punct(p));
            }
        }
        let ch = rest.chars().next().unwrap_or('?');
        Err(self.err(self.pos, format!("unexpected character '{ch}'")))
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$' || c >= 0x80
}

fn is_ident_part(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_member_chain_and_index() {
        assert_eq!(
            toks("$context.executors[0]?.data"),
            vec![
                Tok::Ident("$context".into()),
                Tok::Punct("."),
                Tok::Ident("executors".into()),
                Tok::Punct("["),
                Tok::Number(0.0),
                Tok::Punct("]"),
                Tok::Punct("?."),
                Tok::Ident("data".into()),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            toks(r#"'it\'s' "a\nb" "A""#),
            vec![
                Tok::Str("it's".into()),
                Tok::Str("a\nb".into()),
                Tok::Str("A".into()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_template_literal_parts() {
        let t = toks("`Hi ${user.name}!`");
        assert_eq!(
            t[0],
            Tok::Template(vec![
                TemplatePart::Lit("Hi ".into()),
                TemplatePart::Expr("user.name".into(), 6),
                TemplatePart::Lit("!".into()),
            ])
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        let tokens = tokenize("a // note\n/* block */ b").unwrap();
        assert_eq!(tokens[1].tok, Tok::Ident("b".into()));
        assert!(tokens[1].newline_before);
    }

    #[test]
    fn test_optional_chain_vs_conditional() {
        assert_eq!(
            toks("a?.5:1"),
            vec![
                Tok::Ident("a".into()),
                Tok::Punct("?"),
                Tok::Number(0.5),
                Tok::Punct(":"),
                Tok::Number(1.0),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(toks("1.5e2 0x1f 10"), vec![
            Tok::Number(150.0),
            Tok::Number(31.0),
            Tok::Number(10.0),
            Tok::Eof
        ]);
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        assert!(matches!(tokenize("'abc"), Err(ExprError::Syntax { .. })));
    }
}
