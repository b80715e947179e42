//! Tokenizer for rule expressions.

use crate::error::RuleError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

/// A token plus the character offset it started at, for error positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

fn syntax(message: impl Into<String>, position: usize) -> RuleError {
    RuleError::Parse {
        message: message.into(),
        position,
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, RuleError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let start = i;
        let single = |token: Token| Spanned { token, pos: start };

        match ch {
            c if c.is_whitespace() => {
                i += 1;
            }
            '0'..='9' | '.' if ch != '.' || chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) => {
                let mut num_str = String::new();
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    num_str.push(chars[i]);
                    i += 1;
                }
                // Exponent part: 1e-4, 2.5E+3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        num_str.extend(&chars[i..j]);
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            num_str.push(chars[i]);
                            i += 1;
                        }
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| syntax(format!("Invalid number: {}", num_str), start))?;
                tokens.push(single(Token::Number(num)));
            }
            '\'' | '"' => {
                let quote = ch;
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(syntax("Unterminated string literal", start)),
                        Some(&c) if c == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(&c) => s.push(c),
                                None => return Err(syntax("Unterminated string literal", start)),
                            }
                            i += 2;
                        }
                        Some(&c) => {
                            s.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push(single(Token::Str(s)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    ident.push(chars[i]);
                    i += 1;
                }
                let token = match ident.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "True" | "true" => Token::True,
                    "False" | "false" => Token::False,
                    _ => Token::Ident(ident),
                };
                tokens.push(single(token));
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (token, width) = match (ch, next) {
                    ('<', Some('=')) => (Token::Le, 2),
                    ('>', Some('=')) => (Token::Ge, 2),
                    ('=', Some('=')) => (Token::EqEq, 2),
                    ('!', Some('=')) => (Token::NotEq, 2),
                    ('&', Some('&')) => (Token::And, 2),
                    ('|', Some('|')) => (Token::Or, 2),
                    ('<', _) => (Token::Lt, 1),
                    ('>', _) => (Token::Gt, 1),
                    ('!', _) => (Token::Not, 1),
                    ('+', _) => (Token::Plus, 1),
                    ('-', _) => (Token::Minus, 1),
                    ('*', _) => (Token::Star, 1),
                    ('/', _) => (Token::Slash, 1),
                    ('%', _) => (Token::Percent, 1),
                    ('(', _) => (Token::LParen, 1),
                    (')', _) => (Token::RParen, 1),
                    ('[', _) => (Token::LBracket, 1),
                    (']', _) => (Token::RBracket, 1),
                    (',', _) => (Token::Comma, 1),
                    ('.', _) => (Token::Dot, 1),
                    _ => return Err(syntax(format!("Unexpected character: '{}'", ch), start)),
                };
                tokens.push(single(token));
                i += width;
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_comparison_tokens() {
        assert_eq!(
            kinds("loss <= 0.5"),
            vec![Token::Ident("loss".into()), Token::Le, Token::Number(0.5)]
        );
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(kinds("1e-4"), vec![Token::Number(1e-4)]);
        assert_eq!(kinds("2.5E+3"), vec![Token::Number(2500.0)]);
        assert_eq!(kinds(".5"), vec![Token::Number(0.5)]);
    }

    #[test]
    fn test_keywords_and_symbol_aliases() {
        assert_eq!(
            kinds("not a and b or c && d || !e"),
            vec![
                Token::Not,
                Token::Ident("a".into()),
                Token::And,
                Token::Ident("b".into()),
                Token::Or,
                Token::Ident("c".into()),
                Token::And,
                Token::Ident("d".into()),
                Token::Or,
                Token::Not,
                Token::Ident("e".into()),
            ]
        );
    }

    #[test]
    fn test_string_literals_and_member_access() {
        assert_eq!(
            kinds("h['loss'] . x \"q\""),
            vec![
                Token::Ident("h".into()),
                Token::LBracket,
                Token::Str("loss".into()),
                Token::RBracket,
                Token::Dot,
                Token::Ident("x".into()),
                Token::Str("q".into()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let err = tokenize("a == 'oops").unwrap_err();
        assert_eq!(
            err,
            RuleError::Parse {
                message: "Unterminated string literal".into(),
                position: 5
            }
        );
    }

    #[test]
    fn test_unexpected_character() {
        assert!(matches!(tokenize("loss ^ 2"), Err(RuleError::Parse { position: 5, .. })));
    }
}
