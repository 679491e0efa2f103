//! Splits a compiled artifact into text and code islands.

use crate::error::{Result, TemplateError};
use crate::{CODE_CLOSE, CODE_OPEN};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Island {
    /// Literal output.
    Text(String),
    /// `<?=expr?>`: print the expression's value.
    Echo(String),
    /// `<?stmts?>`: run statements for their effect.
    Stmt(String),
}

/// Lex a compiled artifact into islands.
///
/// `<?xml` is the one marker sequence that stays literal: the `{xml}`
/// directive bakes an XML declaration into the artifact, and it must pass
/// through as text (its trailing `?>` never opened an island).
pub(crate) fn lex(compiled: &str) -> Result<Vec<Island>> {
    let mut islands = Vec::new();
    let mut text = String::new();
    let mut rest = compiled;

    while let Some(open) = rest.find(CODE_OPEN) {
        let after = &rest[open + CODE_OPEN.len()..];

        if after.starts_with("xml") {
            text.push_str(&rest[..open + CODE_OPEN.len()]);
            rest = after;
            continue;
        }

        text.push_str(&rest[..open]);
        if !text.is_empty() {
            islands.push(Island::Text(std::mem::take(&mut text)));
        }

        let Some(close) = after.find(CODE_CLOSE) else {
            return Err(TemplateError::Parse("unterminated code island".to_string()));
        };
        let inner = &after[..close];
        match inner.strip_prefix('=') {
            Some(expr) => islands.push(Island::Echo(expr.trim().to_string())),
            None => islands.push(Island::Stmt(inner.trim().to_string())),
        }
        rest = &after[close + CODE_CLOSE.len()..];
    }

    text.push_str(rest);
    if !text.is_empty() {
        islands.push(Island::Text(text));
    }
    Ok(islands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_text_and_islands() {
        let islands = lex("a<?=$x?>b<?$y = 1?>c").unwrap();
        assert_eq!(
            islands,
            vec![
                Island::Text("a".into()),
                Island::Echo("$x".into()),
                Island::Text("b".into()),
                Island::Stmt("$y = 1".into()),
                Island::Text("c".into()),
            ]
        );
    }

    #[test]
    fn xml_declaration_stays_literal() {
        let islands = lex(r#"<?xml version="1.0" encoding="utf-8"?><r><?=$x?></r>"#).unwrap();
        assert_eq!(islands[0], Island::Text(r#"<?xml version="1.0" encoding="utf-8"?><r>"#.into()));
        assert_eq!(islands[1], Island::Echo("$x".into()));
    }

    #[test]
    fn unterminated_island_is_an_error() {
        let err = lex("a<?=$x").unwrap_err();
        assert_eq!(err.code(), 3);
    }
}
