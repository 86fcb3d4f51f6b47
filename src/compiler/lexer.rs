//! Hand-rolled tokenizer for the bridge compiler's source subset.

use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Var,
    Fn,
    Return,
    Sizeof,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unexpected character {0:?} at byte offset {1}")]
pub struct LexError(pub char, pub usize);

pub struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { chars: src.char_indices().peekable(), src }
    }

    pub fn tokenize(src: &'a str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer::new(src);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let done = tok == Token::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            match self.chars.peek().copied() {
                None => return Ok(Token::Eof),
                Some((_, c)) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some((_, '/')) => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if matches!(lookahead.peek(), Some((_, '/'))) {
                        while !matches!(self.chars.peek(), None | Some((_, '\n'))) {
                            self.chars.next();
                        }
                    } else {
                        self.chars.next();
                        return Ok(Token::Slash);
                    }
                }
                Some((i, c)) if c.is_ascii_digit() => return Ok(self.lex_number(i)),
                Some((i, '"')) => return self.lex_string(i),
                Some((i, c)) if c.is_ascii_alphabetic() || c == '_' => return Ok(self.lex_ident(i)),
                Some((_, '+')) => {
                    self.chars.next();
                    return Ok(Token::Plus);
                }
                Some((_, '-')) => {
                    self.chars.next();
                    return Ok(Token::Minus);
                }
                Some((_, '*')) => {
                    self.chars.next();
                    return Ok(Token::Star);
                }
                Some((_, '(')) => {
                    self.chars.next();
                    return Ok(Token::LParen);
                }
                Some((_, ')')) => {
                    self.chars.next();
                    return Ok(Token::RParen);
                }
                Some((_, '{')) => {
                    self.chars.next();
                    return Ok(Token::LBrace);
                }
                Some((_, '}')) => {
                    self.chars.next();
                    return Ok(Token::RBrace);
                }
                Some((_, '[')) => {
                    self.chars.next();
                    return Ok(Token::LBracket);
                }
                Some((_, ']')) => {
                    self.chars.next();
                    return Ok(Token::RBracket);
                }
                Some((_, ';')) => {
                    self.chars.next();
                    return Ok(Token::Semi);
                }
                Some((_, ',')) => {
                    self.chars.next();
                    return Ok(Token::Comma);
                }
                Some((_, '=')) => {
                    self.chars.next();
                    return Ok(Token::Assign);
                }
                Some((i, c)) => return Err(LexError(c, i)),
            }
        }
    }

    fn lex_number(&mut self, start: usize) -> Token {
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_digit() {
                end = i;
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.src[start..=end];
        Token::Int(text.parse().expect("scanned only ascii digits"))
    }

    fn lex_string(&mut self, start: usize) -> Result<Token, LexError> {
        self.chars.next(); // opening quote
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some((_, '"')) => return Ok(Token::Str(s)),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, c)) => s.push(c),
                    None => return Err(LexError('\\', self.src.len())),
                },
                Some((_, c)) => s.push(c),
                None => return Err(LexError('"', start)),
            }
        }
    }

    fn lex_ident(&mut self, start: usize) -> Token {
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                end = i;
                self.chars.next();
            } else {
                break;
            }
        }
        match &self.src[start..=end] {
            "var" => Token::Var,
            "fn" => Token::Fn,
            "return" => Token::Return,
            "sizeof" => Token::Sizeof,
            other => Token::Ident(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_var_binding() {
        let tokens = Lexer::tokenize("var a = 1 + 2;").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Var,
                Token::Ident("a".into()),
                Token::Assign,
                Token::Int(1),
                Token::Plus,
                Token::Int(2),
                Token::Semi,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_string_escapes() {
        let tokens = Lexer::tokenize(r#" "a\nb" "#).unwrap();
        assert_eq!(tokens, vec![Token::Str("a\nb".into()), Token::Eof]);
    }

    #[test]
    fn skips_line_comments() {
        let tokens = Lexer::tokenize("1; // trailing comment\n2;").unwrap();
        assert_eq!(tokens, vec![Token::Int(1), Token::Semi, Token::Int(2), Token::Semi, Token::Eof]);
    }

    #[test]
    fn rejects_unknown_characters() {
        assert!(Lexer::tokenize("1 ~ 2").is_err());
    }
}
