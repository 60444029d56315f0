//! Hand-written lexer for the declaration subset.
//!
//! Byte-oriented with a running line counter; comments are discarded,
//! string escapes are decoded here. `let` and `const` lex to the same
//! token as `var`, which makes the evaluator tolerant even when the
//! assembler's normalization pass missed a site.

use crate::vm::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    // keywords
    Var,
    Function,
    Return,
    If,
    Else,
    For,
    While,
    In,
    Break,
    Continue,
    True,
    False,
    Null,
    Undefined,
    // punctuation
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Semi,
    Colon,
    Dot,
    Question,
    // operators
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    AndAnd,
    OrOr,
    Not,
    PlusPlus,
    MinusMinus,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, EvalError> {
    let mut lx = Lexer {
        bytes: src.as_bytes(),
        pos: 0,
        line: 1,
    };
    let mut out = Vec::new();
    loop {
        let token = lx.next_token()?;
        let done = token.tok == Tok::Eof;
        out.push(token);
        if done {
            return Ok(out);
        }
    }
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_trivia(&mut self) {
        loop {
            match (self.peek(), self.peek2()) {
                (Some(b), _) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                (Some(b'/'), Some(b'/')) => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek2()) {
                            (Some(b'*'), Some(b'/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => break,
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, EvalError> {
        self.skip_trivia();
        let line = self.line;
        let Some(b) = self.peek() else {
            return Ok(Token { tok: Tok::Eof, line });
        };

        let tok = match b {
            b'\'' | b'"' | b'`' => self.read_string()?,
            b'0'..=b'9' => self.read_number()?,
            b if b.is_ascii_alphabetic() || b == b'_' || b == b'$' => self.read_word(),
            _ => self.read_operator()?,
        };
        Ok(Token { tok, line })
    }

    fn read_string(&mut self) -> Result<Tok, EvalError> {
        let quote = self.bump().unwrap_or(0);
        let start_line = self.line;
        let mut s = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(EvalError::Parse {
                        line: start_line,
                        message: "unterminated string literal".into(),
                    });
                }
                Some(b'\\') => match self.bump() {
                    Some(b'n') => s.push('\n'),
                    Some(b't') => s.push('\t'),
                    Some(b'r') => s.push('\r'),
                    Some(b'0') => s.push('\0'),
                    Some(c) => s.push(c as char),
                    None => {
                        return Err(EvalError::Parse {
                            line: start_line,
                            message: "unterminated string escape".into(),
                        });
                    }
                },
                Some(c) if c == quote => return Ok(Tok::Str(s)),
                Some(c) if c < 0x80 => s.push(c as char),
                Some(c) => {
                    // re-join a multi-byte character
                    let len = match c {
                        b if b >= 0xF0 => 4,
                        b if b >= 0xE0 => 3,
                        _ => 2,
                    };
                    let start = self.pos - 1;
                    for _ in 1..len {
                        self.bump();
                    }
                    let end = (start + len).min(self.bytes.len());
                    s.push_str(std::str::from_utf8(&self.bytes[start..end]).unwrap_or(""));
                }
            }
        }
    }

    fn read_number(&mut self) -> Result<Tok, EvalError> {
        let start = self.pos;
        let line = self.line;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(b'.') && matches!(self.peek2(), Some(b) if b.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.bump();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.bump();
            }
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        text.parse::<f64>().map(Tok::Num).map_err(|_| EvalError::Parse {
            line,
            message: format!("bad number literal `{text}`"),
        })
    }

    fn read_word(&mut self) -> Tok {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
        {
            self.bump();
        }
        let word = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap_or("");
        match word {
            "var" | "let" | "const" => Tok::Var,
            "function" => Tok::Function,
            "return" => Tok::Return,
            "if" => Tok::If,
            "else" => Tok::Else,
            "for" => Tok::For,
            "while" => Tok::While,
            "in" => Tok::In,
            "break" => Tok::Break,
            "continue" => Tok::Continue,
            "true" => Tok::True,
            "false" => Tok::False,
            "null" => Tok::Null,
            "undefined" => Tok::Undefined,
            other => Tok::Ident(other.to_string()),
        }
    }

    fn read_operator(&mut self) -> Result<Tok, EvalError> {
        let line = self.line;
        let b = self.bump().unwrap_or(0);
        let tok = match b {
            b'{' => Tok::LBrace,
            b'}' => Tok::RBrace,
            b'[' => Tok::LBracket,
            b']' => Tok::RBracket,
            b'(' => Tok::LParen,
            b')' => Tok::RParen,
            b',' => Tok::Comma,
            b';' => Tok::Semi,
            b':' => Tok::Colon,
            b'.' => Tok::Dot,
            b'?' => Tok::Question,
            b'%' => Tok::Percent,
            b'+' => match self.peek() {
                Some(b'+') => {
                    self.bump();
                    Tok::PlusPlus
                }
                Some(b'=') => {
                    self.bump();
                    Tok::PlusAssign
                }
                _ => Tok::Plus,
            },
            b'-' => match self.peek() {
                Some(b'-') => {
                    self.bump();
                    Tok::MinusMinus
                }
                Some(b'=') => {
                    self.bump();
                    Tok::MinusAssign
                }
                _ => Tok::Minus,
            },
            b'*' => match self.peek() {
                Some(b'=') => {
                    self.bump();
                    Tok::StarAssign
                }
                _ => Tok::Star,
            },
            b'/' => match self.peek() {
                Some(b'=') => {
                    self.bump();
                    Tok::SlashAssign
                }
                _ => Tok::Slash,
            },
            b'=' => match (self.peek(), self.peek2()) {
                (Some(b'='), Some(b'=')) => {
                    self.bump();
                    self.bump();
                    Tok::EqEqEq
                }
                (Some(b'='), _) => {
                    self.bump();
                    Tok::EqEq
                }
                _ => Tok::Assign,
            },
            b'!' => match (self.peek(), self.peek2()) {
                (Some(b'='), Some(b'=')) => {
                    self.bump();
                    self.bump();
                    Tok::NotEqEq
                }
                (Some(b'='), _) => {
                    self.bump();
                    Tok::NotEq
                }
                _ => Tok::Not,
            },
            b'<' => match self.peek() {
                Some(b'=') => {
                    self.bump();
                    Tok::Le
                }
                _ => Tok::Lt,
            },
            b'>' => match self.peek() {
                Some(b'=') => {
                    self.bump();
                    Tok::Ge
                }
                _ => Tok::Gt,
            },
            b'&' => match self.peek() {
                Some(b'&') => {
                    self.bump();
                    Tok::AndAnd
                }
                _ => {
                    return Err(EvalError::Parse {
                        line,
                        message: "single `&` is not supported".into(),
                    });
                }
            },
            b'|' => match self.peek() {
                Some(b'|') => {
                    self.bump();
                    Tok::OrOr
                }
                _ => {
                    return Err(EvalError::Parse {
                        line,
                        message: "single `|` is not supported".into(),
                    });
                }
            },
            other => {
                return Err(EvalError::Parse {
                    line,
                    message: format!("unexpected character `{}`", other as char),
                });
            }
        };
        Ok(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_tokenisation() {
        assert_eq!(
            toks("var x = { a: 'b', n: 1.5 };"),
            vec![
                Tok::Var,
                Tok::Ident("x".into()),
                Tok::Assign,
                Tok::LBrace,
                Tok::Ident("a".into()),
                Tok::Colon,
                Tok::Str("b".into()),
                Tok::Comma,
                Tok::Ident("n".into()),
                Tok::Colon,
                Tok::Num(1.5),
                Tok::RBrace,
                Tok::Semi,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_let_and_const_fold_into_var() {
        assert_eq!(toks("let a;")[0], Tok::Var);
        assert_eq!(toks("const b;")[0], Tok::Var);
    }

    #[test]
    fn test_comments_are_trivia() {
        assert_eq!(
            toks("1 // one\n/* two\nlines */ 2"),
            vec![Tok::Num(1.0), Tok::Num(2.0), Tok::Eof]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            toks(r#"'a\'b' "c\nd""#),
            vec![Tok::Str("a'b".into()), Tok::Str("c\nd".into()), Tok::Eof]
        );
    }

    #[test]
    fn test_line_numbers() {
        let tokens = tokenize("a;\nb;\n\nc;").unwrap();
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 1, 2, 2, 4, 4, 4]);
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            toks("a += 1; b++; c === d; e !== f; g <= h;"),
            vec![
                Tok::Ident("a".into()),
                Tok::PlusAssign,
                Tok::Num(1.0),
                Tok::Semi,
                Tok::Ident("b".into()),
                Tok::PlusPlus,
                Tok::Semi,
                Tok::Ident("c".into()),
                Tok::EqEqEq,
                Tok::Ident("d".into()),
                Tok::Semi,
                Tok::Ident("e".into()),
                Tok::NotEqEq,
                Tok::Ident("f".into()),
                Tok::Semi,
                Tok::Ident("g".into()),
                Tok::Le,
                Tok::Ident("h".into()),
                Tok::Semi,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_a_parse_error() {
        assert!(matches!(
            tokenize("'oops"),
            Err(EvalError::Parse { line: 1, .. })
        ));
    }
}
