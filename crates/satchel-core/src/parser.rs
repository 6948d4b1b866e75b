//! The search-string grammar.
//!
//! Turns expressions like `email == @e && (age >= 21 || status in ('a','b'))`
//! into the [`Query`] tree the search compiler accepts. Values are
//! single-quoted strings (doubling escapes an embedded quote), numbers,
//! `true`/`false`, or `@name` references resolved from the caller's
//! parameter map. `&&` binds tighter than `||`; parentheses group.

use std::{collections::BTreeMap, iter::Peekable, str::CharIndices};

use serde_json::Value;

use crate::{
  Error, Result,
  query::{Comparison, Query},
};

/// Parse one search-string expression.
pub fn parse_query(
  input: &str,
  params: &BTreeMap<String, Value>,
) -> Result<Query> {
  let tokens = lex(input)?;
  if tokens.is_empty() {
    return Err(Error::QueryParse("empty query".to_string()));
  }
  let mut parser = Parser { tokens, pos: 0, params };
  let query = parser.or_group()?;
  if parser.pos < parser.tokens.len() {
    return Err(Error::QueryParse(format!(
      "unexpected input after expression: {}",
      describe(parser.tokens.get(parser.pos)),
    )));
  }
  Ok(query)
}

// ─── Lexer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Ident(String),
  Comparator(String),
  And,
  Or,
  In,
  Not,
  Str(String),
  Num(f64),
  Bool(bool),
  Param(String),
  LParen,
  RParen,
  Comma,
}

type Chars<'a> = Peekable<CharIndices<'a>>;

fn lex(input: &str) -> Result<Vec<Token>> {
  let mut tokens = Vec::new();
  let mut chars = input.char_indices().peekable();

  while let Some(&(at, c)) = chars.peek() {
    match c {
      c if c.is_whitespace() => {
        chars.next();
      }
      '(' => {
        chars.next();
        tokens.push(Token::LParen);
      }
      ')' => {
        chars.next();
        tokens.push(Token::RParen);
      }
      ',' => {
        chars.next();
        tokens.push(Token::Comma);
      }
      '\'' => {
        chars.next();
        tokens.push(Token::Str(lex_string(&mut chars, at)?));
      }
      '@' => {
        chars.next();
        let name = lex_word(&mut chars);
        if name.is_empty() {
          return Err(Error::QueryParse(format!(
            "expected a parameter name after '@' at byte {at}"
          )));
        }
        tokens.push(Token::Param(name));
      }
      '&' => {
        chars.next();
        match chars.peek() {
          Some(&(_, '&')) => {
            chars.next();
            tokens.push(Token::And);
          }
          _ => {
            return Err(Error::QueryParse(format!(
              "expected '&&' at byte {at}"
            )));
          }
        }
      }
      '|' => {
        chars.next();
        match chars.peek() {
          Some(&(_, '|')) => {
            chars.next();
            tokens.push(Token::Or);
          }
          _ => {
            return Err(Error::QueryParse(format!(
              "expected '||' at byte {at}"
            )));
          }
        }
      }
      '=' => {
        let mut op = String::new();
        while let Some(&(_, '=')) = chars.peek() {
          chars.next();
          op.push('=');
          if op.len() == 3 {
            break;
          }
        }
        tokens.push(Token::Comparator(op));
      }
      '!' => {
        chars.next();
        match chars.peek() {
          Some(&(_, '=')) => {
            chars.next();
            tokens.push(Token::Comparator("!=".to_string()));
          }
          _ => {
            return Err(Error::QueryParse(format!(
              "expected '!=' at byte {at}"
            )));
          }
        }
      }
      '<' => {
        chars.next();
        let op = match chars.peek() {
          Some(&(_, '=')) => {
            chars.next();
            "<="
          }
          Some(&(_, '>')) => {
            chars.next();
            "<>"
          }
          _ => "<",
        };
        tokens.push(Token::Comparator(op.to_string()));
      }
      '>' => {
        chars.next();
        let op = match chars.peek() {
          Some(&(_, '=')) => {
            chars.next();
            ">="
          }
          _ => ">",
        };
        tokens.push(Token::Comparator(op.to_string()));
      }
      c if c.is_ascii_digit() || c == '-' => {
        tokens.push(Token::Num(lex_number(&mut chars, at)?));
      }
      c if c.is_ascii_alphabetic() || c == '_' => {
        let word = lex_word(&mut chars);
        tokens.push(match word.as_str() {
          "in" => Token::In,
          "not" => Token::Not,
          "true" => Token::Bool(true),
          "false" => Token::Bool(false),
          _ => Token::Ident(word),
        });
      }
      other => {
        return Err(Error::QueryParse(format!(
          "unexpected character '{other}' at byte {at}"
        )));
      }
    }
  }

  Ok(tokens)
}

fn lex_string(chars: &mut Chars, start: usize) -> Result<String> {
  let mut out = String::new();
  loop {
    match chars.next() {
      Some((_, '\'')) => {
        // a doubled quote is an escaped quote
        if let Some(&(_, '\'')) = chars.peek() {
          chars.next();
          out.push('\'');
        } else {
          return Ok(out);
        }
      }
      Some((_, c)) => out.push(c),
      None => {
        return Err(Error::QueryParse(format!(
          "unterminated string starting at byte {start}"
        )));
      }
    }
  }
}

fn lex_number(chars: &mut Chars, at: usize) -> Result<f64> {
  let mut text = String::new();
  if let Some(&(_, '-')) = chars.peek() {
    chars.next();
    text.push('-');
  }
  while let Some(&(_, c)) = chars.peek() {
    if c.is_ascii_digit() || c == '.' {
      text.push(c);
      chars.next();
    } else {
      break;
    }
  }
  text
    .parse::<f64>()
    .map_err(|_| Error::QueryParse(format!("invalid number '{text}' at byte {at}")))
}

/// Identifier characters, dots included so paths lex as one token.
fn lex_word(chars: &mut Chars) -> String {
  let mut out = String::new();
  while let Some(&(_, c)) = chars.peek() {
    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
      out.push(c);
      chars.next();
    } else {
      break;
    }
  }
  out
}

// ─── Parser ──────────────────────────────────────────────────────────────────

struct Parser<'a> {
  tokens: Vec<Token>,
  pos:    usize,
  params: &'a BTreeMap<String, Value>,
}

impl Parser<'_> {
  fn peek(&self) -> Option<&Token> { self.tokens.get(self.pos) }

  fn bump(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).cloned();
    if token.is_some() {
      self.pos += 1;
    }
    token
  }

  fn or_group(&mut self) -> Result<Query> {
    let mut items = vec![self.and_group()?];
    while matches!(self.peek(), Some(Token::Or)) {
      self.pos += 1;
      items.push(self.and_group()?);
    }
    if items.len() == 1 {
      return Ok(items.remove(0));
    }
    Ok(Query::Or(items))
  }

  fn and_group(&mut self) -> Result<Query> {
    let mut items = vec![self.unit()?];
    while matches!(self.peek(), Some(Token::And)) {
      self.pos += 1;
      items.push(self.unit()?);
    }
    if items.len() == 1 {
      return Ok(items.remove(0));
    }
    Ok(Query::And(items))
  }

  fn unit(&mut self) -> Result<Query> {
    if matches!(self.peek(), Some(Token::LParen)) {
      self.pos += 1;
      let inner = self.or_group()?;
      match self.bump() {
        Some(Token::RParen) => Ok(inner),
        other => Err(Error::QueryParse(format!(
          "expected ')', found {}",
          describe(other.as_ref()),
        ))),
      }
    } else {
      self.comparison().map(Query::Cmp)
    }
  }

  fn comparison(&mut self) -> Result<Comparison> {
    let prop = match self.bump() {
      Some(Token::Ident(name)) => name,
      other => {
        return Err(Error::QueryParse(format!(
          "expected a property name, found {}",
          describe(other.as_ref()),
        )));
      }
    };

    match self.bump() {
      Some(Token::Comparator(op)) => {
        let value = self.scalar()?;
        Ok(Comparison { prop, comparator: op, value })
      }
      Some(Token::In) => {
        let value = self.list()?;
        Ok(Comparison { prop, comparator: "in".to_string(), value })
      }
      Some(Token::Not) => match self.bump() {
        Some(Token::In) => {
          let value = self.list()?;
          Ok(Comparison { prop, comparator: "not in".to_string(), value })
        }
        other => Err(Error::QueryParse(format!(
          "expected 'in' after 'not', found {}",
          describe(other.as_ref()),
        ))),
      },
      other => Err(Error::QueryParse(format!(
        "expected a comparator after '{prop}', found {}",
        describe(other.as_ref()),
      ))),
    }
  }

  fn scalar(&mut self) -> Result<Value> {
    match self.bump() {
      Some(Token::Str(s)) => Ok(Value::String(s)),
      Some(Token::Num(n)) => Ok(number_value(n)),
      Some(Token::Bool(b)) => Ok(Value::Bool(b)),
      Some(Token::Param(name)) => self
        .params
        .get(&name)
        .cloned()
        .ok_or(Error::UnknownParameter(name)),
      other => Err(Error::QueryParse(format!(
        "expected a value, found {}",
        describe(other.as_ref()),
      ))),
    }
  }

  fn list(&mut self) -> Result<Value> {
    match self.bump() {
      Some(Token::LParen) => {}
      other => {
        return Err(Error::QueryParse(format!(
          "expected '(' to open a value list, found {}",
          describe(other.as_ref()),
        )));
      }
    }
    let mut items = vec![self.scalar()?];
    while matches!(self.peek(), Some(Token::Comma)) {
      self.pos += 1;
      items.push(self.scalar()?);
    }
    match self.bump() {
      Some(Token::RParen) => Ok(Value::Array(items)),
      other => Err(Error::QueryParse(format!(
        "expected ')' to close a value list, found {}",
        describe(other.as_ref()),
      ))),
    }
  }
}

fn number_value(n: f64) -> Value {
  if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
    Value::from(n as i64)
  } else {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
  }
}

fn describe(token: Option<&Token>) -> String {
  match token {
    None => "end of input".to_string(),
    Some(Token::Ident(name)) => format!("'{name}'"),
    Some(Token::Comparator(op)) => format!("'{op}'"),
    Some(Token::And) => "'&&'".to_string(),
    Some(Token::Or) => "'||'".to_string(),
    Some(Token::In) => "'in'".to_string(),
    Some(Token::Not) => "'not'".to_string(),
    Some(Token::Str(_)) => "a string".to_string(),
    Some(Token::Num(n)) => format!("{n}"),
    Some(Token::Bool(b)) => format!("{b}"),
    Some(Token::Param(name)) => format!("'@{name}'"),
    Some(Token::LParen) => "'('".to_string(),
    Some(Token::RParen) => "')'".to_string(),
    Some(Token::Comma) => "','".to_string(),
  }
}
