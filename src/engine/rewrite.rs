//! The transpiler: one ordered pass of the rule table over a template source.
//!
//! Implemented as a span-consuming replacer pipeline rather than one
//! monolithic expression: the source is held as a sequence of segments, each
//! either still-raw text or the finished replacement of an earlier rule.
//! Every rule scans only the raw segments, splitting them around its matches;
//! replacement text is sealed and never re-scanned by later rules. That is
//! what lets the generic call catch-all sit safely at the end of the table.

use std::path::Path;

use crate::error::{Result, TemplateError};
use crate::rules::TABLE;
use crate::{CODE_OPEN, CompileEnv, Rule};

enum Segment {
    /// Untouched source text, still visible to the remaining rules.
    Raw(String),
    /// Replacement output of an earlier rule; sealed.
    Done(String),
}

/// Transpile one template source into compiled view code.
///
/// Fails fatally if the raw source embeds the engine's own code marker
/// anywhere: templates must never carry native code directly, and the check
/// runs before any rule is applied so it cannot be smuggled past a rewrite.
pub(crate) fn transpile(source: &str, source_path: &Path, env: &CompileEnv, debug: bool) -> Result<String> {
    if source.contains(CODE_OPEN) {
        return Err(TemplateError::RawCodeDisallowed { path: source_path.to_path_buf() });
    }

    let out = apply_table(source, &TABLE, env);

    if debug { Ok(out) } else { Ok(strip_output(&out)) }
}

fn apply_table(source: &str, rules: &[Rule], env: &CompileEnv) -> String {
    let mut segments = vec![Segment::Raw(source.to_string())];

    for rule in rules {
        let mut next = Vec::with_capacity(segments.len());
        for seg in segments {
            match seg {
                Segment::Done(s) => next.push(Segment::Done(s)),
                Segment::Raw(s) => split_raw(&s, rule, env, &mut next),
            }
        }
        segments = next;
    }

    let mut out = String::new();
    for seg in &segments {
        match seg {
            Segment::Raw(s) | Segment::Done(s) => out.push_str(s),
        }
    }
    out
}

/// Apply one rule to one raw segment, pushing the resulting sub-segments.
fn split_raw(text: &str, rule: &Rule, env: &CompileEnv, out: &mut Vec<Segment>) {
    let mut last = 0;
    for caps in rule.matcher.captures_iter(text) {
        let m = caps.get(0).expect("group 0 always present");
        if m.start() > last {
            out.push(Segment::Raw(text[last..m.start()].to_string()));
        }
        out.push(Segment::Done((rule.rewrite)(&caps, env)));
        last = m.end();
    }

    if last == 0 {
        out.push(Segment::Raw(text.to_string()));
    } else if last < text.len() {
        out.push(Segment::Raw(text[last..].to_string()));
    }
}

/// Output-size post-processing for non-debug builds: strip leading/trailing
/// whitespace per line and drop inline HTML comments. Debug builds skip this
/// to keep source line correspondence for troubleshooting.
fn strip_output(text: &str) -> String {
    let stripped = regex!(r"<!--.*?-->").replace_all(text, "");
    let mut out: Vec<&str> = Vec::new();
    for line in stripped.lines() {
        out.push(line.trim());
    }
    let mut joined = out.join("\n");
    if stripped.ends_with('\n') {
        joined.push('\n');
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> CompileEnv {
        CompileEnv {
            img_root: "/static/images/".into(),
            css_root: "/static/css/".into(),
            js_root: "/static/js/".into(),
            upload_root: "/upload/".into(),
            legacy_browser: false,
        }
    }

    fn compile(source: &str) -> String {
        transpile(source, Path::new("t.tpl"), &env(), true).unwrap()
    }

    #[test]
    fn raw_code_is_rejected_before_any_rule() {
        let err = transpile("a <? evil() ?> b", Path::new("bad.tpl"), &env(), true).unwrap_err();
        assert_eq!(err.code(), 2);
        // Position in the file is irrelevant.
        let err = transpile("{if($x)}x{endif}<?", Path::new("bad.tpl"), &env(), true).unwrap_err();
        assert!(matches!(err, TemplateError::RawCodeDisallowed { .. }));
    }

    #[test]
    fn earlier_rules_seal_their_replacements() {
        // The include rule fires before the catch-all; the catch-all must
        // not re-match the generated `include(...)` island.
        let out = compile("{include('user/list')}");
        assert_eq!(out, "<?include('user/list')?>");
    }

    #[test]
    fn passthrough_block_is_opaque_to_other_rules() {
        let out = compile("{php}$x = render('{$y}');{/php}");
        assert_eq!(out, "<?$x = render('{$y}');?>");
    }

    #[test]
    fn strip_trims_lines_and_html_comments() {
        let out = transpile("  <b>a</b>  \n <!-- note --> b \n", Path::new("t.tpl"), &env(), false).unwrap();
        assert_eq!(out, "<b>a</b>\nb\n");
    }

    #[test]
    fn debug_mode_preserves_whitespace() {
        let out = transpile("  keep  \n", Path::new("t.tpl"), &env(), true).unwrap();
        assert_eq!(out, "  keep  \n");
    }
}
