//! Type expression syntax.
//!
//! ```text
//! expr    := primary ('|' primary)*
//! primary := NAME ('[' expr (',' expr)* ']')?
//!          | '...'
//!          | '(' ')'
//!          | QUOTED-NAME
//! ```
//!
//! Names are resolved later against a [`SchemaSet`](super::SchemaSet); the
//! parser only checks shape.
use crate::error::SchemaError;

#[derive(Debug, Clone, PartialEq)]
pub enum TyExpr {
    Name(String),
    Apply(String, Vec<TyExpr>),
    /// `A | B | ...`
    Union(Vec<TyExpr>),
    /// `...` in `tuple[T, ...]`
    Ellipsis,
    /// `()` in `tuple[()]`
    Unit,
}

pub fn parse(src: &str) -> Result<TyExpr, SchemaError> {
    let mut parser = Parser { src, pos: 0 };
    let expr = parser.expr()?;
    parser.skip_ws();
    if parser.pos < src.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn expr(&mut self) -> Result<TyExpr, SchemaError> {
        let mut alts = vec![self.primary()?];
        while self.eat('|') {
            alts.push(self.primary()?);
        }
        Ok(if alts.len() == 1 { alts.remove(0) } else { TyExpr::Union(alts) })
    }

    fn primary(&mut self) -> Result<TyExpr, SchemaError> {
        self.skip_ws();
        let rest = &self.src[self.pos..];
        if rest.starts_with("...") {
            self.pos += 3;
            return Ok(TyExpr::Ellipsis);
        }
        if self.eat('(') {
            return if self.eat(')') {
                Ok(TyExpr::Unit)
            } else {
                Err(self.error("expected `)`"))
            };
        }
        if let Some(quote @ ('"' | '\'')) = rest.chars().next() {
            self.pos += 1;
            let name = self.name()?;
            if !self.eat(quote) {
                return Err(self.error("unterminated quoted name"));
            }
            return Ok(TyExpr::Name(name));
        }

        let name = self.name()?;
        if !self.eat('[') {
            return Ok(TyExpr::Name(name));
        }
        let mut args = vec![self.expr()?];
        while self.eat(',') {
            args.push(self.expr()?);
        }
        if !self.eat(']') {
            return Err(self.error("expected `,` or `]`"));
        }
        Ok(TyExpr::Apply(name, args))
    }

    fn name(&mut self) -> Result<String, SchemaError> {
        self.skip_ws();
        let start = self.pos;
        for (i, c) in self.src[start..].char_indices() {
            let ok = if i == 0 { c.is_alphabetic() || c == '_' } else { c.is_alphanumeric() || c == '_' || c == '.' };
            if !ok {
                break;
            }
            self.pos = start + i + c.len_utf8();
        }
        if self.pos == start {
            return Err(self.error("expected a type name"));
        }
        // `typing.List` → `List`
        let full = &self.src[start..self.pos];
        Ok(full.rsplit('.').next().unwrap_or(full).to_string())
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self, message: &str) -> SchemaError {
        SchemaError::Syntax {
            expr: self.src.to_string(),
            offset: self.pos,
            message: message.to_string(),
        }
    }
}
