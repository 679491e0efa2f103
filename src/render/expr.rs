//! Expression syntax for view code.
//!
//! Clauses copied verbatim out of directives (`$user->name`, `$x > 5`,
//! `money($price)`) are parsed here with a small recursive-descent parser.
//! Precedence, low to high: assignment, ternary, `or`, `and`, equality,
//! comparison, additive (`+ - .`), multiplicative (`* / %`), unary,
//! postfix (`[..]`, `->field`, `++`, `--`).

use crate::error::{Result, TemplateError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    /// `[v, 'k' => v2]`; entries without `=>` get positional keys.
    Array(Vec<(Option<Expr>, Expr)>),
    Var(String),
    Index(Box<Expr>, Box<Expr>),
    Field(Box<Expr>, String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// Function-registry dispatch: `name(args)`.
    Call(String, Vec<Expr>),
    /// Helper-registry dispatch: `:name(args)`.
    Helper(String, Vec<Expr>),
    /// `isset($x)` — set and non-null, never an evaluation error.
    Isset(Box<Expr>),
    /// `empty($x)` — unset or falsy.
    Empty(Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    /// Postfix `++` / `--`; yields the value before the step.
    PostStep(Box<Expr>, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Concat,
    Lt,
    Le,
    Gt,
    Ge,
    EqLoose,
    NeLoose,
    EqStrict,
    NeStrict,
    And,
    Or,
}

/// Parse a full expression; trailing input is an error.
pub(crate) fn parse_expr(src: &str) -> Result<Expr> {
    let mut p = Parser::new(src);
    let e = p.expr()?;
    p.skip_ws();
    if !p.at_end() {
        return Err(p.error("unexpected trailing input"));
    }
    Ok(e)
}

/// Parse a `;`-separated statement list (each statement is an expression
/// evaluated for effect). Empty input yields an empty list.
pub(crate) fn parse_stmts(src: &str) -> Result<Vec<Expr>> {
    let mut p = Parser::new(src);
    let mut stmts = Vec::new();
    loop {
        p.skip_ws();
        while p.eat(";") {
            p.skip_ws();
        }
        if p.at_end() {
            return Ok(stmts);
        }
        stmts.push(p.expr()?);
        p.skip_ws();
        if !p.at_end() && !p.eat(";") {
            return Err(p.error("expected ';' between statements"));
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.as_bytes().get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Consume a word token only at a word boundary ("or" but not "order").
    fn eat_word(&mut self, word: &str) -> bool {
        if self.rest().starts_with(word) {
            let next = self.src.as_bytes().get(self.pos + word.len());
            if !next.is_some_and(|b| is_ident_byte(*b)) {
                self.pos += word.len();
                return true;
            }
        }
        false
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        self.skip_ws();
        if self.eat(token) { Ok(()) } else { Err(self.error(&format!("expected '{token}'"))) }
    }

    fn error(&self, msg: &str) -> TemplateError {
        TemplateError::Parse(format!("{msg} at offset {} in `{}`", self.pos, self.src))
    }

    // --- Grammar, lowest precedence first -----------------------------------

    fn expr(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        let lhs = self.ternary()?;
        self.skip_ws();
        // Plain '=' only: '==', '===' and '=>' belong to other productions.
        if self.peek() == Some(b'=') && !matches!(self.peek_at(1), Some(b'=' | b'>')) {
            if !matches!(lhs, Expr::Var(_) | Expr::Index(..) | Expr::Field(..)) {
                return Err(self.error("left side of '=' is not assignable"));
            }
            self.pos += 1;
            let rhs = self.assignment()?;
            return Ok(Expr::Assign(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn ternary(&mut self) -> Result<Expr> {
        let cond = self.logic_or()?;
        self.skip_ws();
        if self.eat("?") {
            let then = self.expr()?;
            self.expect(":")?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)));
        }
        Ok(cond)
    }

    fn logic_or(&mut self) -> Result<Expr> {
        let mut lhs = self.logic_and()?;
        loop {
            self.skip_ws();
            if self.eat("||") || self.eat_word("or") {
                let rhs = self.logic_and()?;
                lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn logic_and(&mut self) -> Result<Expr> {
        let mut lhs = self.equality()?;
        loop {
            self.skip_ws();
            if self.eat("&&") || self.eat_word("and") {
                let rhs = self.equality()?;
                lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn equality(&mut self) -> Result<Expr> {
        let mut lhs = self.comparison()?;
        loop {
            self.skip_ws();
            let op = if self.eat("===") {
                BinOp::EqStrict
            } else if self.eat("!==") {
                BinOp::NeStrict
            } else if self.eat("==") {
                BinOp::EqLoose
            } else if self.eat("!=") {
                BinOp::NeLoose
            } else {
                return Ok(lhs);
            };
            let rhs = self.comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.additive()?;
        loop {
            self.skip_ws();
            let op = if self.eat("<=") {
                BinOp::Le
            } else if self.eat(">=") {
                BinOp::Ge
            } else if self.peek() == Some(b'<') {
                self.pos += 1;
                BinOp::Lt
            } else if self.peek() == Some(b'>') {
                self.pos += 1;
                BinOp::Gt
            } else {
                return Ok(lhs);
            };
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            self.skip_ws();
            let op = if self.eat("+") {
                BinOp::Add
            } else if self.peek() == Some(b'-') && self.peek_at(1) != Some(b'>') {
                self.pos += 1;
                BinOp::Sub
            } else if self.eat(".") {
                BinOp::Concat
            } else {
                return Ok(lhs);
            };
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            self.skip_ws();
            let op = if self.eat("*") {
                BinOp::Mul
            } else if self.eat("/") {
                BinOp::Div
            } else if self.eat("%") {
                BinOp::Mod
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        self.skip_ws();
        if self.eat("!") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(b'-') && self.peek_at(1) != Some(b'>') {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut e = self.primary()?;
        loop {
            self.skip_ws();
            if self.eat("[") {
                let idx = self.expr()?;
                self.expect("]")?;
                e = Expr::Index(Box::new(e), Box::new(idx));
            } else if self.eat("->") {
                let field = self.ident()?;
                e = Expr::Field(Box::new(e), field);
            } else if self.eat("++") {
                e = Expr::PostStep(Box::new(e), 1.0);
            } else if self.eat("--") {
                e = Expr::PostStep(Box::new(e), -1.0);
            } else {
                return Ok(e);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        self.skip_ws();
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let e = self.expr()?;
                self.expect(")")?;
                Ok(e)
            }
            Some(q @ (b'\'' | b'"')) => self.string(q),
            Some(b'0'..=b'9') => self.number(),
            Some(b'.') if matches!(self.peek_at(1), Some(b'0'..=b'9')) => self.number(),
            Some(b'$') => {
                self.pos += 1;
                Ok(Expr::Var(self.ident()?))
            }
            Some(b'[') => self.array_literal(),
            Some(b':') => {
                self.pos += 1;
                let name = self.ident()?;
                self.expect("(")?;
                let args = self.args()?;
                Ok(Expr::Helper(name, args))
            }
            Some(b) if is_ident_start(b) => self.word(),
            _ => Err(self.error("expected expression")),
        }
    }

    fn word(&mut self) -> Result<Expr> {
        if self.eat_word("true") {
            return Ok(Expr::Bool(true));
        }
        if self.eat_word("false") {
            return Ok(Expr::Bool(false));
        }
        if self.eat_word("null") {
            return Ok(Expr::Null);
        }
        if self.eat_word("isset") {
            self.expect("(")?;
            let e = self.expr()?;
            self.expect(")")?;
            return Ok(Expr::Isset(Box::new(e)));
        }
        if self.eat_word("empty") {
            self.expect("(")?;
            let e = self.expr()?;
            self.expect(")")?;
            return Ok(Expr::Empty(Box::new(e)));
        }

        let mut name = self.ident()?;
        // Static-call spelling `Type::method(...)` dispatches on the full name.
        if self.eat("::") {
            name.push_str("::");
            name.push_str(&self.ident()?);
        }
        self.skip_ws();
        if self.eat("(") {
            let args = self.args()?;
            return Ok(Expr::Call(name, args));
        }
        Err(self.error(&format!("unexpected identifier `{name}`")))
    }

    fn args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.eat(")") {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            self.skip_ws();
            if self.eat(")") {
                return Ok(args);
            }
            self.expect(",")?;
        }
    }

    fn array_literal(&mut self) -> Result<Expr> {
        self.expect("[")?;
        let mut entries = Vec::new();
        self.skip_ws();
        if self.eat("]") {
            return Ok(Expr::Array(entries));
        }
        loop {
            let first = self.expr()?;
            self.skip_ws();
            if self.eat("=>") {
                let value = self.expr()?;
                entries.push((Some(first), value));
            } else {
                entries.push((None, first));
            }
            self.skip_ws();
            if self.eat("]") {
                return Ok(Expr::Array(entries));
            }
            self.expect(",")?;
            self.skip_ws();
            // Allow a trailing comma.
            if self.eat("]") {
                return Ok(Expr::Array(entries));
            }
        }
    }

    fn string(&mut self, quote: u8) -> Result<Expr> {
        self.pos += 1;
        let mut out = String::new();
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            let b = bytes[self.pos];
            if b == quote {
                self.pos += 1;
                return Ok(Expr::Str(out));
            }
            if b == b'\\' {
                self.pos += 1;
                match bytes.get(self.pos) {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(&c) => out.push(c as char),
                    None => break,
                }
                self.pos += 1;
                continue;
            }
            // Copy one full UTF-8 scalar.
            let ch = self.rest().chars().next().expect("in-bounds char");
            out.push(ch);
            self.pos += ch.len_utf8();
        }
        Err(self.error("unterminated string literal"))
    }

    fn number(&mut self) -> Result<Expr> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        self.src[start..self.pos]
            .parse::<f64>()
            .map(Expr::Num)
            .map_err(|_| self.error("invalid number literal"))
    }

    fn ident(&mut self) -> Result<String> {
        self.skip_ws();
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return Err(self.error("expected identifier"));
        }
        while self.peek().is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        Ok(self.src[start..self.pos].to_string())
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_postfix() {
        let e = parse_expr("$a + $b * 2").unwrap();
        assert_eq!(
            e,
            Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Var("a".into())),
                Box::new(Expr::Binary(
                    BinOp::Mul,
                    Box::new(Expr::Var("b".into())),
                    Box::new(Expr::Num(2.0))
                ))
            )
        );

        let e = parse_expr("$user->name").unwrap();
        assert_eq!(e, Expr::Field(Box::new(Expr::Var("user".into())), "name".into()));

        let e = parse_expr("$rows[0]['id']").unwrap();
        assert_eq!(
            e,
            Expr::Index(
                Box::new(Expr::Index(Box::new(Expr::Var("rows".into())), Box::new(Expr::Num(0.0)))),
                Box::new(Expr::Str("id".into()))
            )
        );
    }

    #[test]
    fn word_operators_respect_boundaries() {
        // `order(...)` must not be split into `or` + `der(...)`.
        let e = parse_expr("$a or order($b)").unwrap();
        assert_eq!(
            e,
            Expr::Binary(
                BinOp::Or,
                Box::new(Expr::Var("a".into())),
                Box::new(Expr::Call("order".into(), vec![Expr::Var("b".into())]))
            )
        );
    }

    #[test]
    fn ternary_and_special_forms() {
        let e = parse_expr(r#"(isset($d) and $d!=="0000-00-00")?$d:"""#).unwrap();
        let Expr::Ternary(cond, then, otherwise) = e else { panic!("not a ternary") };
        assert!(matches!(*cond, Expr::Binary(BinOp::And, ..)));
        assert_eq!(*then, Expr::Var("d".into()));
        assert_eq!(*otherwise, Expr::Str(String::new()));

        let e = parse_expr("!empty($x)?$x:'fallback'").unwrap();
        assert!(matches!(e, Expr::Ternary(..)));
    }

    #[test]
    fn calls_helpers_and_static_spelling() {
        assert_eq!(
            parse_expr("date('Y-m-d', $now)").unwrap(),
            Expr::Call("date".into(), vec![Expr::Str("Y-m-d".into()), Expr::Var("now".into())])
        );
        assert_eq!(parse_expr(":money($p)").unwrap(), Expr::Helper("money".into(), vec![Expr::Var("p".into())]));
        assert_eq!(parse_expr("MUser::getName($id)").unwrap(), Expr::Call("MUser::getName".into(), vec![Expr::Var("id".into())]));
    }

    #[test]
    fn statement_lists_and_steps() {
        let stmts = parse_stmts("$i = 0; $i++").unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0], Expr::Assign(..)));
        assert!(matches!(stmts[1], Expr::PostStep(..)));

        assert!(parse_stmts("").unwrap().is_empty());
    }

    #[test]
    fn array_literals() {
        let e = parse_expr("['id' => $id, 'tag' => 'new', 7]").unwrap();
        let Expr::Array(entries) = e else { panic!("not an array") };
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, Some(Expr::Str("id".into())));
        assert_eq!(entries[2], (None, Expr::Num(7.0)));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse_expr("$a }").is_err());
        assert!(parse_expr("5 =").is_err());
    }
}
