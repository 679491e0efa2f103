//! Evaluates a node tree against a variable-binding scope.
//!
//! Value semantics follow the template language's loose conventions:
//! `false`, `0`, `""`, `"0"`, `null` and empty containers are falsy; loose
//! equality coerces numerically when both sides look numeric; strict
//! equality compares type and value. Reading an undefined variable is an
//! error — only the `isset`/`empty` special forms probe leniently.

use serde_json::{Map, Value};

use crate::api::{Bindings, Engine, RenderContext};
use crate::error::{Result, TemplateError};
use crate::render::expr::{BinOp, Expr};
use crate::render::parse::Node;

/// Nested includes deeper than this abort the render; a template that
/// includes itself would otherwise never terminate.
const MAX_INCLUDE_DEPTH: usize = 64;

#[derive(Debug, Default)]
pub(crate) struct Scope {
    vars: Map<String, Value>,
}

impl Scope {
    pub fn from_bindings(bindings: Bindings) -> Self {
        Self { vars: bindings }
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    fn set(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }
}

pub(crate) struct Evaluator<'a> {
    pub engine: &'a Engine,
    pub ctx: &'a RenderContext,
    pub depth: usize,
}

impl Evaluator<'_> {
    pub fn exec_block(&self, nodes: &[Node], scope: &mut Scope, out: &mut String) -> Result<()> {
        for node in nodes {
            self.exec_node(node, scope, out)?;
        }
        Ok(())
    }

    fn exec_node(&self, node: &Node, scope: &mut Scope, out: &mut String) -> Result<()> {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Echo(e) => {
                let v = self.eval(e, scope)?;
                out.push_str(&to_display(&v));
            }
            Node::Stmts(stmts) => {
                for stmt in stmts {
                    self.eval(stmt, scope)?;
                }
            }
            Node::Include(args) => self.include(args, scope, out)?,
            Node::If { arms, otherwise } => {
                for (cond, body) in arms {
                    if truthy(&self.eval(cond, scope)?) {
                        return self.exec_block(body, scope, out);
                    }
                }
                self.exec_block(otherwise, scope, out)?;
            }
            Node::For { init, cond, step, body } => {
                for stmt in init {
                    self.eval(stmt, scope)?;
                }
                loop {
                    if let Some(cond) = cond {
                        if !truthy(&self.eval(cond, scope)?) {
                            break;
                        }
                    }
                    self.exec_block(body, scope, out)?;
                    for stmt in step {
                        self.eval(stmt, scope)?;
                    }
                }
            }
            Node::Foreach { subject, key, value, body } => {
                match self.eval(subject, scope)? {
                    Value::Array(items) => {
                        for (i, item) in items.into_iter().enumerate() {
                            if let Some(key) = key {
                                scope.set(key, Value::from(i as u64));
                            }
                            scope.set(value, item);
                            self.exec_block(body, scope, out)?;
                        }
                    }
                    Value::Object(map) => {
                        for (k, item) in map {
                            if let Some(key) = key {
                                scope.set(key, Value::String(k));
                            }
                            scope.set(value, item);
                            self.exec_block(body, scope, out)?;
                        }
                    }
                    other => {
                        return Err(TemplateError::Eval(format!(
                            "foreach subject is not iterable: {}",
                            to_display(&other)
                        )));
                    }
                }
            }
            Node::While { cond, body } => {
                while truthy(&self.eval(cond, scope)?) {
                    self.exec_block(body, scope, out)?;
                }
            }
        }
        Ok(())
    }

    fn include(&self, args: &[Expr], scope: &mut Scope, out: &mut String) -> Result<()> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(TemplateError::Eval(format!("include depth exceeds {MAX_INCLUDE_DEPTH}")));
        }
        let Some(view_expr) = args.first() else {
            return Err(TemplateError::Eval("include() needs a view name".to_string()));
        };
        let view = to_display(&self.eval(view_expr, scope)?);

        let bindings = match args.get(1) {
            None => Map::new(),
            Some(e) => match self.eval(e, scope)? {
                Value::Object(map) => map,
                Value::Array(items) if items.is_empty() => Map::new(),
                other => {
                    return Err(TemplateError::Eval(format!(
                        "include() params must have string keys, got {}",
                        to_display(&other)
                    )));
                }
            },
        };

        // The sub-view renders into the same output buffer: nesting is
        // structural here, so no reentrancy flag can leak between renders.
        self.engine.render_nested(&view, self.ctx, bindings, out, self.depth + 1)
    }

    pub fn eval(&self, e: &Expr, scope: &mut Scope) -> Result<Value> {
        match e {
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Num(n) => num(*n),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Array(entries) => self.array_literal(entries, scope),
            Expr::Var(_) | Expr::Index(..) | Expr::Field(..) => match self.try_read(e, scope)? {
                Some(v) => Ok(v),
                None => Err(TemplateError::Eval(format!("undefined: {e:?}"))),
            },
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&self.eval(inner, scope)?))),
            Expr::Neg(inner) => {
                let v = self.eval(inner, scope)?;
                num(-numeric(&v)?)
            }
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, scope),
            Expr::Ternary(cond, then, otherwise) => {
                if truthy(&self.eval(cond, scope)?) {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Call(name, args) => {
                let values = self.eval_args(args, scope)?;
                let Some(f) = self.engine.function(name) else {
                    return Err(TemplateError::Eval(format!("unknown function `{name}`")));
                };
                f(self.engine, self.ctx, &values)
            }
            Expr::Helper(name, args) => {
                let values = self.eval_args(args, scope)?;
                let Some(f) = self.engine.helper(name) else {
                    return Err(TemplateError::Eval(format!("unknown helper `{name}`")));
                };
                f(self.engine, self.ctx, &values)
            }
            Expr::Isset(inner) => Ok(Value::Bool(matches!(
                self.try_read(inner, scope)?,
                Some(v) if !v.is_null()
            ))),
            Expr::Empty(inner) => {
                let v = self.try_read(inner, scope)?;
                Ok(Value::Bool(v.as_ref().is_none_or(|v| !truthy(v))))
            }
            Expr::Assign(target, value) => {
                let v = self.eval(value, scope)?;
                self.write(target, v.clone(), scope)?;
                Ok(v)
            }
            Expr::PostStep(target, delta) => {
                let old = self.eval(target, scope)?;
                let stepped = num(numeric(&old)? + delta)?;
                self.write(target, stepped, scope)?;
                Ok(old)
            }
        }
    }

    fn eval_args(&self, args: &[Expr], scope: &mut Scope) -> Result<Vec<Value>> {
        args.iter().map(|a| self.eval(a, scope)).collect()
    }

    fn array_literal(&self, entries: &[(Option<Expr>, Expr)], scope: &mut Scope) -> Result<Value> {
        if entries.iter().all(|(k, _)| k.is_none()) {
            let mut items = Vec::with_capacity(entries.len());
            for (_, e) in entries {
                items.push(self.eval(e, scope)?);
            }
            return Ok(Value::Array(items));
        }
        let mut map = Map::new();
        for (i, (key, e)) in entries.iter().enumerate() {
            let key = match key {
                Some(k) => to_display(&self.eval(k, scope)?),
                None => i.to_string(),
            };
            let value = self.eval(e, scope)?;
            map.insert(key, value);
        }
        Ok(Value::Object(map))
    }

    /// Read a variable / index / field chain. `Ok(None)` means "not set",
    /// which only `isset`/`empty` treat as benign.
    fn try_read(&self, e: &Expr, scope: &mut Scope) -> Result<Option<Value>> {
        match e {
            Expr::Var(name) => Ok(scope.get(name).cloned()),
            Expr::Index(base, idx) => {
                let Some(base) = self.try_read(base, scope)? else {
                    return Ok(None);
                };
                let idx = self.eval(idx, scope)?;
                Ok(index_value(&base, &idx))
            }
            Expr::Field(base, field) => {
                let Some(base) = self.try_read(base, scope)? else {
                    return Ok(None);
                };
                Ok(base.as_object().and_then(|m| m.get(field)).cloned())
            }
            other => self.eval(other, scope).map(Some),
        }
    }

    fn binary(&self, op: BinOp, lhs: &Expr, rhs: &Expr, scope: &mut Scope) -> Result<Value> {
        // Short-circuit forms first.
        match op {
            BinOp::And => {
                let l = self.eval(lhs, scope)?;
                if !truthy(&l) {
                    return Ok(Value::Bool(false));
                }
                let r = self.eval(rhs, scope)?;
                return Ok(Value::Bool(truthy(&r)));
            }
            BinOp::Or => {
                let l = self.eval(lhs, scope)?;
                if truthy(&l) {
                    return Ok(Value::Bool(true));
                }
                let r = self.eval(rhs, scope)?;
                return Ok(Value::Bool(truthy(&r)));
            }
            _ => {}
        }

        let l = self.eval(lhs, scope)?;
        let r = self.eval(rhs, scope)?;
        match op {
            BinOp::Mul => num(numeric(&l)? * numeric(&r)?),
            BinOp::Div => {
                let d = numeric(&r)?;
                if d == 0.0 {
                    return Err(TemplateError::Eval("division by zero".to_string()));
                }
                num(numeric(&l)? / d)
            }
            BinOp::Mod => {
                let d = numeric(&r)?;
                if d == 0.0 {
                    return Err(TemplateError::Eval("division by zero".to_string()));
                }
                num(numeric(&l)? % d)
            }
            BinOp::Add => num(numeric(&l)? + numeric(&r)?),
            BinOp::Sub => num(numeric(&l)? - numeric(&r)?),
            BinOp::Concat => Ok(Value::String(format!("{}{}", to_display(&l), to_display(&r)))),
            BinOp::Lt => compare(&l, &r, |o| o == std::cmp::Ordering::Less),
            BinOp::Le => compare(&l, &r, |o| o != std::cmp::Ordering::Greater),
            BinOp::Gt => compare(&l, &r, |o| o == std::cmp::Ordering::Greater),
            BinOp::Ge => compare(&l, &r, |o| o != std::cmp::Ordering::Less),
            BinOp::EqLoose => Ok(Value::Bool(loose_eq(&l, &r))),
            BinOp::NeLoose => Ok(Value::Bool(!loose_eq(&l, &r))),
            BinOp::EqStrict => Ok(Value::Bool(strict_eq(&l, &r))),
            BinOp::NeStrict => Ok(Value::Bool(!strict_eq(&l, &r))),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn write(&self, target: &Expr, value: Value, scope: &mut Scope) -> Result<()> {
        let (root, path) = self.path_of(target, scope)?;
        let slot = scope.vars.entry(root).or_insert(Value::Null);
        let mut cur = slot;
        for seg in path {
            match seg {
                Seg::Key(k) => {
                    if !cur.is_object() {
                        *cur = Value::Object(Map::new());
                    }
                    cur = cur.as_object_mut().expect("just ensured object").entry(k).or_insert(Value::Null);
                }
                Seg::Idx(i) => {
                    if !cur.is_array() {
                        *cur = Value::Array(Vec::new());
                    }
                    let arr = cur.as_array_mut().expect("just ensured array");
                    while arr.len() <= i {
                        arr.push(Value::Null);
                    }
                    cur = &mut arr[i];
                }
            }
        }
        *cur = value;
        Ok(())
    }

    fn path_of(&self, e: &Expr, scope: &mut Scope) -> Result<(String, Vec<Seg>)> {
        match e {
            Expr::Var(name) => Ok((name.clone(), Vec::new())),
            Expr::Index(base, idx) => {
                let (root, mut path) = self.path_of(base, scope)?;
                let idx = self.eval(idx, scope)?;
                path.push(match idx.as_u64() {
                    Some(i) => Seg::Idx(i as usize),
                    None => Seg::Key(to_display(&idx)),
                });
                Ok((root, path))
            }
            Expr::Field(base, field) => {
                let (root, mut path) = self.path_of(base, scope)?;
                path.push(Seg::Key(field.clone()));
                Ok((root, path))
            }
            other => Err(TemplateError::Eval(format!("not assignable: {other:?}"))),
        }
    }
}

enum Seg {
    Key(String),
    Idx(usize),
}

fn index_value(base: &Value, idx: &Value) -> Option<Value> {
    match base {
        Value::Array(items) => idx.as_u64().and_then(|i| items.get(i as usize)).cloned(),
        Value::Object(map) => map.get(&to_display(idx)).cloned(),
        _ => None,
    }
}

fn num(n: f64) -> Result<Value> {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| TemplateError::Eval(format!("non-finite arithmetic result: {n}")))
}

fn numeric(v: &Value) -> Result<f64> {
    as_f64(v).ok_or_else(|| TemplateError::Eval(format!("non-numeric operand: {}", to_display(v))))
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(l: &Value, r: &Value, test: impl Fn(std::cmp::Ordering) -> bool) -> Result<Value> {
    let ord = match (as_f64(l), as_f64(r)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(|| TemplateError::Eval("incomparable values".to_string()))?,
        _ => to_display(l).cmp(&to_display(r)),
    };
    Ok(Value::Bool(test(ord)))
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_f64(l), as_f64(r)) {
        return a == b;
    }
    to_display(l) == to_display(r)
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => std::mem::discriminant(l) == std::mem::discriminant(r) && l == r,
    }
}

/// Template truthiness: `false`, `0`, `""`, `"0"`, `null` and empty
/// containers are falsy.
pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a value into output text. Integral numbers print without a
/// fractional part; containers fall back to their JSON spelling.
pub(crate) fn to_display(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => {
            if *b {
                "1".to_string()
            } else {
                String::new()
            }
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_template_conventions() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&Value::String("0".into())));
        assert!(!truthy(&Value::String(String::new())));
        assert!(!truthy(&serde_json::json!(0)));
        assert!(!truthy(&serde_json::json!([])));
        assert!(truthy(&Value::String("0000-00-00".into())));
        assert!(truthy(&serde_json::json!([1])));
    }

    #[test]
    fn display_formats_integral_numbers_plainly() {
        assert_eq!(to_display(&serde_json::json!(3.0)), "3");
        assert_eq!(to_display(&serde_json::json!(3.5)), "3.5");
        assert_eq!(to_display(&Value::Null), "");
        assert_eq!(to_display(&Value::Bool(true)), "1");
    }

    #[test]
    fn loose_and_strict_equality_differ_on_type() {
        assert!(loose_eq(&serde_json::json!(1), &Value::String("1".into())));
        assert!(!strict_eq(&serde_json::json!(1), &Value::String("1".into())));
        assert!(strict_eq(&serde_json::json!(1.0), &serde_json::json!(1)));
    }
}
