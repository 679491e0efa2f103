//! Assembles lexed islands into an executable node tree.
//!
//! Statement islands carry a small fixed statement language: block openers
//! (`if(...)`, `for(...)`, `foreach(...)`, `while(...)`, all suffixed with
//! `:`), their closers (`end<kind>`), `include(...)`, and `;`-separated
//! expression statements. Anything unbalanced is a malformed artifact and
//! surfaces as [`TemplateError::Parse`].

use crate::error::{Result, TemplateError};
use crate::render::expr::{self, Expr};
use crate::render::lexer::{self, Island};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Echo(Expr),
    /// Expression statements run for effect.
    Stmts(Vec<Expr>),
    /// Sub-template inclusion; args are forwarded to the engine.
    Include(Vec<Expr>),
    If {
        arms: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    For {
        init: Vec<Expr>,
        cond: Option<Expr>,
        step: Vec<Expr>,
        body: Vec<Node>,
    },
    Foreach {
        subject: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Node>,
    },
    While {
        cond: Expr,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone)]
enum Piece {
    Text(String),
    Echo(Expr),
    Stmts(Vec<Expr>),
    Include(Vec<Expr>),
    IfOpen(Expr),
    Elseif(Expr),
    Else,
    EndIf,
    ForOpen { init: Vec<Expr>, cond: Option<Expr>, step: Vec<Expr> },
    EndFor,
    ForeachOpen { subject: Expr, key: Option<String>, value: String },
    EndForeach,
    WhileOpen(Expr),
    EndWhile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermKind {
    Eof,
    EndIf,
    Elseif,
    Else,
    EndFor,
    EndForeach,
    EndWhile,
}

#[derive(Debug)]
enum Term {
    Eof,
    EndIf,
    Elseif(Expr),
    Else,
    EndFor,
    EndForeach,
    EndWhile,
}

impl Term {
    fn kind(&self) -> TermKind {
        match self {
            Term::Eof => TermKind::Eof,
            Term::EndIf => TermKind::EndIf,
            Term::Elseif(_) => TermKind::Elseif,
            Term::Else => TermKind::Else,
            Term::EndFor => TermKind::EndFor,
            Term::EndForeach => TermKind::EndForeach,
            Term::EndWhile => TermKind::EndWhile,
        }
    }
}

/// Parse a compiled artifact into a node tree.
pub(crate) fn parse(compiled: &str) -> Result<Vec<Node>> {
    let islands = lexer::lex(compiled)?;
    let mut pieces = Vec::with_capacity(islands.len());
    for island in islands {
        pieces.push(classify(island)?);
    }

    let mut idx = 0;
    let (nodes, term) = build_nodes(&pieces, &mut idx, &[TermKind::Eof])?;
    debug_assert!(matches!(term, Term::Eof));
    Ok(nodes)
}

fn classify(island: Island) -> Result<Piece> {
    let s = match island {
        Island::Text(t) => return Ok(Piece::Text(t)),
        Island::Echo(e) => return Ok(Piece::Echo(expr::parse_expr(&e)?)),
        Island::Stmt(s) => s,
    };

    match s.as_str() {
        "endif" => return Ok(Piece::EndIf),
        "endfor" => return Ok(Piece::EndFor),
        "endforeach" => return Ok(Piece::EndForeach),
        "endwhile" => return Ok(Piece::EndWhile),
        "else:" | "else" => return Ok(Piece::Else),
        _ => {}
    }

    if let Some(clause) = opener_clause(&s, "if") {
        return Ok(Piece::IfOpen(expr::parse_expr(clause)?));
    }
    if let Some(clause) = opener_clause(&s, "elseif") {
        return Ok(Piece::Elseif(expr::parse_expr(clause)?));
    }
    if let Some(clause) = opener_clause(&s, "while") {
        return Ok(Piece::WhileOpen(expr::parse_expr(clause)?));
    }
    if let Some(clause) = opener_clause(&s, "for") {
        return for_header(clause);
    }
    if let Some(clause) = opener_clause(&s, "foreach") {
        return foreach_header(clause);
    }

    let stmts = expr::parse_stmts(&s)?;
    if let [Expr::Call(name, args)] = stmts.as_slice() {
        if name == "include" {
            return Ok(Piece::Include(args.clone()));
        }
    }
    Ok(Piece::Stmts(stmts))
}

/// `if(COND):` → `(COND)`. The parenthesized clause is left intact; the
/// expression parser strips the outer parens naturally.
fn opener_clause<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(keyword)?.strip_suffix(':')?;
    let rest = rest.trim();
    (rest.starts_with('(') && rest.ends_with(')')).then_some(rest)
}

/// `(init; cond; step)` — each part optional, `;`-separated at top level.
fn for_header(clause: &str) -> Result<Piece> {
    let inner = &clause[1..clause.len() - 1];
    let parts = split_top(inner, ';');
    if parts.len() != 3 {
        return Err(TemplateError::Parse(format!("malformed for header `{clause}`")));
    }
    let init = expr::parse_stmts(&parts[0])?;
    let cond = if parts[1].trim().is_empty() { None } else { Some(expr::parse_expr(&parts[1])?) };
    let step = expr::parse_stmts(&parts[2])?;
    Ok(Piece::ForOpen { init, cond, step })
}

/// `(subject as $v)` or `(subject as $k => $v)`.
fn foreach_header(clause: &str) -> Result<Piece> {
    let inner = &clause[1..clause.len() - 1];
    let Some(as_pos) = find_top(inner, " as ") else {
        return Err(TemplateError::Parse(format!("malformed foreach header `{clause}`")));
    };
    let subject = expr::parse_expr(&inner[..as_pos])?;
    let binding = inner[as_pos + 4..].trim();

    let (key, value) = match binding.split_once("=>") {
        Some((k, v)) => (Some(var_name(k)?), var_name(v)?),
        None => (None, var_name(binding)?),
    };
    Ok(Piece::ForeachOpen { subject, key, value })
}

fn var_name(s: &str) -> Result<String> {
    let s = s.trim();
    s.strip_prefix('$')
        .filter(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'))
        .map(str::to_string)
        .ok_or_else(|| TemplateError::Parse(format!("expected loop variable, got `{s}`")))
}

/// Split on `sep` at paren/bracket/quote top level.
fn split_top(src: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            _ if c == sep && depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Byte offset of `needle` at top level, or None.
fn find_top(src: &str, needle: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else {
            match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                _ if depth == 0 && src[i..].starts_with(needle) => return Some(i),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn build_nodes(pieces: &[Piece], idx: &mut usize, stops: &[TermKind]) -> Result<(Vec<Node>, Term)> {
    let mut nodes = Vec::new();

    loop {
        let Some(piece) = pieces.get(*idx) else {
            if stops.contains(&TermKind::Eof) {
                return Ok((nodes, Term::Eof));
            }
            return Err(TemplateError::Parse("unclosed block at end of artifact".to_string()));
        };
        *idx += 1;

        let term = match piece {
            Piece::Text(t) => {
                nodes.push(Node::Text(t.clone()));
                continue;
            }
            Piece::Echo(e) => {
                nodes.push(Node::Echo(e.clone()));
                continue;
            }
            Piece::Stmts(stmts) => {
                nodes.push(Node::Stmts(stmts.clone()));
                continue;
            }
            Piece::Include(args) => {
                nodes.push(Node::Include(args.clone()));
                continue;
            }
            Piece::IfOpen(cond) => {
                nodes.push(build_if(pieces, idx, cond.clone())?);
                continue;
            }
            Piece::ForOpen { init, cond, step } => {
                let (body, _) = build_nodes(pieces, idx, &[TermKind::EndFor])?;
                nodes.push(Node::For { init: init.clone(), cond: cond.clone(), step: step.clone(), body });
                continue;
            }
            Piece::ForeachOpen { subject, key, value } => {
                let (body, _) = build_nodes(pieces, idx, &[TermKind::EndForeach])?;
                nodes.push(Node::Foreach { subject: subject.clone(), key: key.clone(), value: value.clone(), body });
                continue;
            }
            Piece::WhileOpen(cond) => {
                let (body, _) = build_nodes(pieces, idx, &[TermKind::EndWhile])?;
                nodes.push(Node::While { cond: cond.clone(), body });
                continue;
            }
            Piece::EndIf => Term::EndIf,
            Piece::Elseif(cond) => Term::Elseif(cond.clone()),
            Piece::Else => Term::Else,
            Piece::EndFor => Term::EndFor,
            Piece::EndForeach => Term::EndForeach,
            Piece::EndWhile => Term::EndWhile,
        };

        if stops.contains(&term.kind()) {
            return Ok((nodes, term));
        }
        return Err(TemplateError::Parse(format!("unbalanced block close `{term:?}`")));
    }
}

fn build_if(pieces: &[Piece], idx: &mut usize, first_cond: Expr) -> Result<Node> {
    let mut arms = Vec::new();
    let mut otherwise = Vec::new();
    let mut cond = first_cond;

    loop {
        let (body, term) =
            build_nodes(pieces, idx, &[TermKind::EndIf, TermKind::Elseif, TermKind::Else])?;
        arms.push((cond, body));
        match term {
            Term::Elseif(next) => cond = next,
            Term::Else => {
                let (body, _) = build_nodes(pieces, idx, &[TermKind::EndIf])?;
                otherwise = body;
                break;
            }
            Term::EndIf => break,
            _ => unreachable!("terminator filtered by stops"),
        }
    }
    Ok(Node::If { arms, otherwise })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_artifact() {
        let nodes = parse("Hello <?=$name?>!").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], Node::Text("Hello ".into()));
        assert!(matches!(nodes[1], Node::Echo(Expr::Var(ref v)) if v == "name"));
    }

    #[test]
    fn if_elseif_else_chain() {
        let nodes = parse("<?if($x>5):?>big<?elseif($x>2):?>mid<?else:?>small<?endif?>").unwrap();
        let [Node::If { arms, otherwise }] = nodes.as_slice() else { panic!("expected if") };
        assert_eq!(arms.len(), 2);
        assert_eq!(arms[0].1, vec![Node::Text("big".into())]);
        assert_eq!(arms[1].1, vec![Node::Text("mid".into())]);
        assert_eq!(*otherwise, vec![Node::Text("small".into())]);
    }

    #[test]
    fn nested_loops() {
        let nodes = parse("<?foreach($rows as $i=>$row):?><?for($j=0;$j<$i;$j++):?>.<?endfor?><?endforeach?>").unwrap();
        let [Node::Foreach { key, value, body, .. }] = nodes.as_slice() else { panic!() };
        assert_eq!(key.as_deref(), Some("i"));
        assert_eq!(value, "row");
        assert!(matches!(body.as_slice(), [Node::For { .. }]));
    }

    #[test]
    fn include_island() {
        let nodes = parse("<?include('user/card', ['id' => $id])?>").unwrap();
        let [Node::Include(args)] = nodes.as_slice() else { panic!() };
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], Expr::Str("user/card".into()));
    }

    #[test]
    fn unbalanced_blocks_are_rejected() {
        assert!(parse("<?if($x):?>never closed").is_err());
        assert!(parse("text<?endif?>").is_err());
        assert!(parse("<?for($i=0;$i<2;$i++):?>a<?endwhile?>").is_err());
    }

    #[test]
    fn while_with_statement_body() {
        let nodes = parse("<?while($n>0):?><?$n = $n - 1?><?endwhile?>").unwrap();
        let [Node::While { body, .. }] = nodes.as_slice() else { panic!() };
        assert!(matches!(body.as_slice(), [Node::Stmts(_)]));
    }
}
