//! Script driver
//!
//! A deliberately small statement evaluator backing `run_string` and
//! `run_file`: `;`-separated expression statements over literals, global
//! identifiers, member access, indexing, calls, and assignment. That is
//! exactly the surface needed to exercise exposed objects from script
//! text; anything resembling real language semantics belongs to an
//! external execution driver, not to the bridge.

use logos::Logos;
use std::ops::Range;

use wisp_script::{JsValue, Thrown};

use crate::dispatch::IndexKey;
use crate::engine::Engine;
use crate::error::ScriptError;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
enum Token {
    #[token(".")]
    Dot,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token("=")]
    Assign,
    #[token("-")]
    Minus,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    #[regex(r#""([^"\\\n]|\\.)*""#, lex_string)]
    #[regex(r"'([^'\\\n]|\\.)*'", lex_string)]
    Str(String),
}

fn lex_string(lex: &mut logos::Lexer<'_, Token>) -> String {
    let slice = lex.slice();
    unescape(&slice[1..slice.len() - 1])
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Evaluation aborts: parse failures and thrown script errors, both
/// carrying the byte offset they surfaced at
enum EvalError {
    Parse { message: String, offset: usize },
    Thrown { thrown: Thrown, offset: usize },
}

/// An unresolved access path. Resolution is deferred so that the last
/// segment can serve as an assignment target or supply the `this` of a
/// call.
enum Place {
    Value(JsValue),
    Member { obj: JsValue, name: String },
    Index { obj: JsValue, key: IndexKey },
}

/// Run a program, recording failures in the engine's error list. Returns
/// the value of the last statement, or nothing on error.
pub(crate) fn run_program(engine: &mut Engine, source: &str, script: &str) -> Option<JsValue> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    while let Some(item) = lexer.next() {
        match item {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                record(engine, source, script, lexer.span().start, "SyntaxError: unexpected character");
                return None;
            }
        }
    }
    let end = source.len();
    let mut exec = Exec {
        engine,
        tokens,
        pos: 0,
        offset: 0,
        end,
    };
    let mut last = JsValue::Undefined;
    loop {
        while exec.eat(&Token::Semi) {}
        if exec.at_end() {
            break;
        }
        match exec.statement() {
            Ok(value) => last = value,
            Err(EvalError::Parse { message, offset }) => {
                record(exec.engine, source, script, offset, &message);
                return None;
            }
            Err(EvalError::Thrown { thrown, offset }) => {
                record(exec.engine, source, script, offset, &thrown.to_string());
                return None;
            }
        }
    }
    Some(last)
}

fn record(engine: &mut Engine, source: &str, script: &str, offset: usize, message: &str) {
    let (line, column) = position(source, offset);
    engine.record_error(ScriptError {
        message: message.to_string(),
        script: script.to_string(),
        line,
        column,
    });
}

/// 1-based (line, column) of a byte offset
fn position(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let prefix = &source[..offset];
    let line = prefix.bytes().filter(|b| *b == b'\n').count() as u32 + 1;
    let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = (offset - line_start) as u32 + 1;
    (line, column)
}

struct Exec<'e> {
    engine: &'e mut Engine,
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    /// Offset of the most recently consumed token, for error positions
    offset: usize,
    end: usize,
}

impl Exec<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn advance(&mut self) -> Option<Token> {
        let (token, span) = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        self.offset = span.start;
        Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), EvalError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.parse_error(format!("SyntaxError: expected {}", what)))
        }
    }

    fn parse_error(&self, message: String) -> EvalError {
        let offset = self
            .tokens
            .get(self.pos)
            .map(|(_, s)| s.start)
            .unwrap_or(self.end);
        EvalError::Parse { message, offset }
    }

    fn statement(&mut self) -> Result<JsValue, EvalError> {
        let place = self.postfix()?;
        if self.eat(&Token::Assign) {
            let value = self.expression()?;
            self.assign(place, value.clone())?;
            Ok(value)
        } else {
            self.resolve(place)
        }
    }

    fn expression(&mut self) -> Result<JsValue, EvalError> {
        let place = self.postfix()?;
        self.resolve(place)
    }

    fn postfix(&mut self) -> Result<Place, EvalError> {
        let mut place = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    _ => return Err(self.parse_error("SyntaxError: expected property name".into())),
                };
                let obj = self.resolve(place)?;
                place = Place::Member { obj, name };
            } else if self.eat(&Token::LBracket) {
                let key_value = self.expression()?;
                self.expect(Token::RBracket, "]")?;
                let obj = self.resolve(place)?;
                let key = self.index_key(key_value)?;
                place = Place::Index { obj, key };
            } else if self.eat(&Token::LParen) {
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen, ")")?;
                let (callee, this) = match place {
                    Place::Member { obj, name } => {
                        let f = self.get_member(&obj, &name)?;
                        (f, obj)
                    }
                    Place::Index { obj, key } => {
                        let f = self.get_index(&obj, &key)?;
                        (f, obj)
                    }
                    Place::Value(v) => {
                        let this = self
                            .engine
                            .global_value()
                            .unwrap_or(JsValue::Undefined);
                        (v, this)
                    }
                };
                let result = self
                    .engine
                    .call_value(&callee, &this, args)
                    .map_err(|t| self.thrown_at(t))?;
                place = Place::Value(result);
            } else {
                break;
            }
        }
        Ok(place)
    }

    fn primary(&mut self) -> Result<Place, EvalError> {
        match self.advance() {
            Some(Token::Ident(name)) => {
                let global = self
                    .engine
                    .global_value()
                    .unwrap_or(JsValue::Undefined);
                Ok(Place::Member { obj: global, name })
            }
            Some(Token::Int(i)) => Ok(Place::Value(int_value(i))),
            Some(Token::Float(f)) => Ok(Place::Value(JsValue::Number(f))),
            Some(Token::Str(s)) => Ok(Place::Value(JsValue::string(s))),
            Some(Token::True) => Ok(Place::Value(JsValue::Bool(true))),
            Some(Token::False) => Ok(Place::Value(JsValue::Bool(false))),
            Some(Token::Null) => Ok(Place::Value(JsValue::Null)),
            Some(Token::Undefined) => Ok(Place::Value(JsValue::Undefined)),
            Some(Token::Minus) => {
                if let Some(Token::Int(_)) = self.peek() {
                    if let Some(Token::Int(i)) = self.advance() {
                        return Ok(Place::Value(int_value(-i)));
                    }
                    unreachable!()
                }
                let operand = self.expression()?;
                Ok(Place::Value(JsValue::Number(-operand.to_number())))
            }
            Some(Token::LParen) => {
                let value = self.expression()?;
                self.expect(Token::RParen, ")")?;
                Ok(Place::Value(value))
            }
            _ => Err(self.parse_error("SyntaxError: unexpected token".into())),
        }
    }

    fn index_key(&self, value: JsValue) -> Result<IndexKey, EvalError> {
        match value {
            JsValue::String(s) => Ok(IndexKey::Name(s.to_string())),
            v if v.is_number() => {
                let n = v.to_number();
                if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 {
                    Ok(IndexKey::Index(n as u32))
                } else {
                    // negatives and non-integers index as string keys
                    Ok(IndexKey::Name(v.to_int32().to_string()))
                }
            }
            other => Err(self.thrown_at(Thrown::type_error(format!(
                "cannot index with a {}",
                other.type_name()
            )))),
        }
    }

    fn resolve(&mut self, place: Place) -> Result<JsValue, EvalError> {
        match place {
            Place::Value(v) => Ok(v),
            Place::Member { obj, name } => self.get_member(&obj, &name),
            Place::Index { obj, key } => self.get_index(&obj, &key),
        }
    }

    fn assign(&mut self, place: Place, value: JsValue) -> Result<(), EvalError> {
        match place {
            Place::Member { obj, name } => self
                .engine
                .set_member(&obj, &name, value)
                .map_err(|t| self.thrown_at(t)),
            Place::Index { obj, key } => self
                .engine
                .set_index_value(&obj, &key, value)
                .map_err(|t| self.thrown_at(t)),
            Place::Value(_) => {
                Err(self.parse_error("SyntaxError: invalid assignment target".into()))
            }
        }
    }

    fn get_member(&mut self, obj: &JsValue, name: &str) -> Result<JsValue, EvalError> {
        self.engine
            .get_member(obj, name)
            .map_err(|t| self.thrown_at(t))
    }

    fn get_index(&mut self, obj: &JsValue, key: &IndexKey) -> Result<JsValue, EvalError> {
        self.engine
            .get_index_value(obj, key)
            .map_err(|t| self.thrown_at(t))
    }

    fn thrown_at(&self, thrown: Thrown) -> EvalError {
        EvalError::Thrown {
            thrown,
            offset: self.offset,
        }
    }
}

fn int_value(i: i64) -> JsValue {
    if let Ok(v) = i32::try_from(i) {
        JsValue::Int32(v)
    } else {
        JsValue::Number(i as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_is_one_based() {
        let src = "a;\nbb;\nccc";
        assert_eq!(position(src, 0), (1, 1));
        assert_eq!(position(src, 3), (2, 1));
        assert_eq!(position(src, 8), (3, 2));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb"), "a\nb");
        assert_eq!(unescape(r#"\"x\""#), "\"x\"");
        assert_eq!(unescape(r"back\\slash"), "back\\slash");
    }

    #[test]
    fn test_lexer_tokens() {
        let tokens: Vec<_> = Token::lexer("origin.X = 4.5; // note")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("origin".to_string()),
                Token::Dot,
                Token::Ident("X".to_string()),
                Token::Assign,
                Token::Float(4.5),
                Token::Semi,
            ]
        );
    }

    #[test]
    fn test_lexer_strings() {
        let tokens: Vec<_> = Token::lexer(r#"items["key"] = 'va\'l'"#)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("items".to_string()),
                Token::LBracket,
                Token::Str("key".to_string()),
                Token::RBracket,
                Token::Assign,
                Token::Str("va'l".to_string()),
            ]
        );
    }
}
