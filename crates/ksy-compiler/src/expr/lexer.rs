use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Int(i128),
    Float(f64),
    Str(String),
    Ident(String),
    DoubleColon,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Question,
    Colon,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
}

/// Lexing failure with the byte offset where it occurred.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub offset: usize,
    pub message: String,
}

pub fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, LexError> {
    let mut lexer = Lexer {
        src,
        chars: src.char_indices().peekable(),
    };
    let mut tokens = Vec::new();
    while let Some(tok) = lexer.next_token()? {
        tokens.push(tok);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl Lexer<'_> {
    fn error(offset: usize, message: impl Into<String>) -> LexError {
        LexError {
            offset,
            message: message.into(),
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek().map(|&(_, c)| c) == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn next_token(&mut self) -> Result<Option<(usize, Token)>, LexError> {
        while self.chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}
        let Some((start, c)) = self.chars.next() else {
            return Ok(None);
        };
        let tok = match c {
            '0'..='9' => self.number(start)?,
            'a'..='z' | 'A'..='Z' | '_' => self.ident(start),
            '"' | '\'' => self.string(start, c)?,
            ':' if self.eat(':') => Token::DoubleColon,
            ':' => Token::Colon,
            '.' => Token::Dot,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '?' => Token::Question,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '&' => Token::Amp,
            '|' => Token::Pipe,
            '^' => Token::Caret,
            '~' => Token::Tilde,
            '<' if self.eat('<') => Token::Shl,
            '<' if self.eat('=') => Token::Le,
            '<' => Token::Lt,
            '>' if self.eat('>') => Token::Shr,
            '>' if self.eat('=') => Token::Ge,
            '>' => Token::Gt,
            '=' if self.eat('=') => Token::EqEq,
            '!' if self.eat('=') => Token::NotEq,
            other => return Err(Self::error(start, format!("unexpected character {other:?}"))),
        };
        Ok(Some((start, tok)))
    }

    fn ident(&mut self, start: usize) -> Token {
        let mut end = start + 1;
        while let Some((i, c)) = self
            .chars
            .next_if(|&(_, c)| c.is_ascii_alphanumeric() || c == '_')
        {
            end = i + c.len_utf8();
        }
        Token::Ident(self.src[start..end].to_owned())
    }

    fn number(&mut self, start: usize) -> Result<Token, LexError> {
        let mut end = start + 1;
        while let Some((i, c)) = self
            .chars
            .next_if(|&(_, c)| c.is_ascii_alphanumeric() || c == '_')
        {
            end = i + c.len_utf8();
        }
        let mut is_float = false;
        // A '.' followed by a digit continues a float; otherwise it is
        // member access on an integer.
        if self.chars.peek().map(|&(_, c)| c) == Some('.') {
            let mut ahead = self.chars.clone();
            ahead.next();
            if ahead.peek().is_some_and(|&(_, c)| c.is_ascii_digit()) {
                self.chars.next();
                is_float = true;
                while let Some((i, c)) = self.chars.next_if(|&(_, c)| {
                    c.is_ascii_alphanumeric() || c == '_'
                }) {
                    end = i + c.len_utf8();
                }
            }
        }
        let text: String = self.src[start..end].chars().filter(|&c| c != '_').collect();
        let lower = text.to_ascii_lowercase();
        if is_float || (lower.contains('e') && !lower.starts_with("0x")) {
            // Exponent with a sign, e.g. `1e-3`.
            let mut text = text;
            if lower.ends_with('e') && matches!(self.chars.peek(), Some(&(_, '+' | '-'))) {
                if let Some((_, sign)) = self.chars.next() {
                    text.push(sign);
                }
                while let Some((_, c)) = self.chars.next_if(|&(_, c)| c.is_ascii_digit()) {
                    text.push(c);
                }
            }
            return text
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| Self::error(start, format!("invalid number {text:?}")));
        }
        let (radix, digits) = if let Some(rest) = lower.strip_prefix("0x") {
            (16, rest)
        } else if let Some(rest) = lower.strip_prefix("0b") {
            (2, rest)
        } else if let Some(rest) = lower.strip_prefix("0o") {
            (8, rest)
        } else {
            (10, lower.as_str())
        };
        i128::from_str_radix(digits, radix)
            .map(Token::Int)
            .map_err(|_| Self::error(start, format!("invalid integer {text:?}")))
    }

    fn string(&mut self, start: usize, quote: char) -> Result<Token, LexError> {
        let mut out = String::new();
        loop {
            let Some((_, c)) = self.chars.next() else {
                return Err(Self::error(start, "unterminated string literal"));
            };
            match c {
                c if c == quote => return Ok(Token::Str(out)),
                // Single-quoted strings are literal; double-quoted ones
                // understand the usual escapes.
                '\\' if quote == '"' => {
                    let Some((at, esc)) = self.chars.next() else {
                        return Err(Self::error(start, "unterminated string literal"));
                    };
                    out.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        '\\' => '\\',
                        '"' => '"',
                        '\'' => '\'',
                        other => {
                            return Err(Self::error(at, format!("unknown escape \\{other}")));
                        }
                    });
                }
                c => out.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|(_, t)| t).collect()
    }

    #[test]
    fn numbers_in_all_radixes() {
        assert_eq!(
            kinds("12 0x1F 0b101 0o17 1_000 2.5"),
            vec![
                Token::Int(12),
                Token::Int(31),
                Token::Int(5),
                Token::Int(15),
                Token::Int(1000),
                Token::Float(2.5)
            ]
        );
    }

    #[test]
    fn integer_member_access_is_not_a_float() {
        assert_eq!(
            kinds("3.to_s"),
            vec![Token::Int(3), Token::Dot, Token::Ident("to_s".into())]
        );
    }

    #[test]
    fn operators_and_paths() {
        assert_eq!(
            kinds("a::b << 2 >= c != d"),
            vec![
                Token::Ident("a".into()),
                Token::DoubleColon,
                Token::Ident("b".into()),
                Token::Shl,
                Token::Int(2),
                Token::Ge,
                Token::Ident("c".into()),
                Token::NotEq,
                Token::Ident("d".into())
            ]
        );
    }

    #[test]
    fn string_quoting_rules() {
        assert_eq!(kinds(r#""a\n""#), vec![Token::Str("a\n".into())]);
        assert_eq!(kinds(r"'a\n'"), vec![Token::Str("a\\n".into())]);
        assert!(tokenize("\"open").is_err());
    }

    #[test]
    fn rejects_stray_characters() {
        let err = tokenize("a $ b").unwrap_err();
        assert_eq!(err.offset, 2);
    }
}
