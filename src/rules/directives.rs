//! The ordered directive table.
//!
//! Delimiters are `{` and `}`; every matcher is non-greedy and fires
//! independently per occurrence. Ordering constraints, top to bottom:
//!
//! - The raw-code passthrough block runs first so that nothing else ever
//!   rewrites its interior.
//! - `{ifIE}` must precede `{if(...)}` style blocks only conceptually (the
//!   `\b` anchors keep them from overlapping), but the bare `{css}`/`{js}`
//!   path constants must precede their parenthesized bundler forms.
//! - The translation shorthand must precede the generic call catch-all,
//!   otherwise the catch-all consumes `{_('k')}` before it can fire.
//! - The generic function-call catch-all is LAST: every earlier directive
//!   also ends in `)`.

use crate::Rule;

/// Build the directive table in evaluation order.
pub(crate) fn get() -> Vec<Rule> {
    vec![
        // Raw-code escape hatch. The body is emitted into a single statement
        // island verbatim; because this rule runs first, no other rule ever
        // sees the interior.
        rule! {
            name: "raw passthrough block",
            matcher: r"(?s)\{php\}(.*?)\{/php\}",
            rewrite: |caps, _env| format!("<?{}?>", &caps[1]),
        },
        // Fixed literal substitutions.
        rule! {
            name: "xml declaration",
            matcher: r"\{xml\}",
            rewrite: |_caps, _env| r#"<?xml version="1.0" encoding="utf-8"?>"#.to_string(),
        },
        rule! {
            name: "upload root",
            matcher: r"\{upload\}",
            rewrite: |_caps, env| env.upload_root.clone(),
        },
        // Static path helpers, pure string constants at compile time.
        rule! {
            name: "image root",
            matcher: r"\{img\}",
            rewrite: |_caps, env| env.img_root.clone(),
        },
        rule! {
            name: "css root",
            matcher: r"\{css\}",
            rewrite: |_caps, env| env.css_root.clone(),
        },
        rule! {
            name: "js root",
            matcher: r"\{js\}",
            rewrite: |_caps, env| env.js_root.clone(),
        },
        // Helper-registry dispatch: {:name(args)}.
        rule! {
            name: "helper dispatch",
            matcher: r"\{:(.*?\))\}",
            rewrite: |caps, _env| format!("<?=:{}?>", &caps[1]),
        },
        // Browser sniffing, baked at compile time. The artifact is only
        // correct for the client active when it was compiled; warn so the
        // risk is visible in traces.
        rule! {
            name: "legacy browser conditional",
            matcher: r"\{ifIE\}",
            rewrite: |_caps, env| {
                tracing::warn!(
                    "{{ifIE}} bakes a compile-time client check into the artifact; \
                     a cached artifact may serve the wrong branch to later clients"
                );
                format!("<?if({}):?>", if env.legacy_browser { 1 } else { 0 })
            },
        },
        // Block constructs. The parenthesized clause is copied verbatim into
        // the opening statement; closers accept both spellings.
        rule! {
            name: "for open",
            matcher: r"\{for\b(\(.*?\))\}",
            rewrite: |caps, _env| format!("<?for{}:?>", &caps[1]),
        },
        rule! {
            name: "for close",
            matcher: r"\{(?:endfor|/for)\}",
            rewrite: |_caps, _env| "<?endfor?>".to_string(),
        },
        rule! {
            name: "foreach open",
            matcher: r"\{foreach\b(\(.*?\))\}",
            rewrite: |caps, _env| format!("<?foreach{}:?>", &caps[1]),
        },
        rule! {
            name: "foreach close",
            matcher: r"\{(?:endforeach|/foreach)\}",
            rewrite: |_caps, _env| "<?endforeach?>".to_string(),
        },
        rule! {
            name: "while open",
            matcher: r"\{while\b(\(.*?\))\}",
            rewrite: |caps, _env| format!("<?while{}:?>", &caps[1]),
        },
        rule! {
            name: "while close",
            matcher: r"\{(?:endwhile|/while)\}",
            rewrite: |_caps, _env| "<?endwhile?>".to_string(),
        },
        rule! {
            name: "if open",
            matcher: r"\{if\b(\(.*?\))\}",
            rewrite: |caps, _env| format!("<?if{}:?>", &caps[1]),
        },
        rule! {
            name: "elseif",
            matcher: r"\{elseif\b(\(.*?\))\}",
            rewrite: |caps, _env| format!("<?elseif{}:?>", &caps[1]),
        },
        rule! {
            name: "else",
            matcher: r"\{else\}",
            rewrite: |_caps, _env| "<?else:?>".to_string(),
        },
        rule! {
            name: "if close",
            matcher: r"\{(?:endif|/if)\}",
            rewrite: |_caps, _env| "<?endif?>".to_string(),
        },
        // Assignment: the captured expression becomes a bare statement.
        rule! {
            name: "assign",
            matcher: r"\{(?:assign|let)\b\((.*?)\)\}",
            rewrite: |caps, _env| format!("<?{}?>", &caps[1]),
        },
        // Sub-template inclusion; arguments forwarded verbatim.
        rule! {
            name: "include",
            matcher: r"\{include\b(\(.*?\))\}",
            rewrite: |caps, _env| format!("<?include{}?>", &caps[1]),
        },
        // Asset inclusion: forwarded to the bundler entry points.
        rule! {
            name: "js bundle",
            matcher: r"\{js(\(.*?\))\}",
            rewrite: |caps, _env| format!("<?=js{}?>", &caps[1]),
        },
        rule! {
            name: "css bundle",
            matcher: r"\{css(\(.*?\))\}",
            rewrite: |caps, _env| format!("<?=css{}?>", &caps[1]),
        },
        // Default value: ternary on emptiness.
        rule! {
            name: "default value",
            matcher: r"\{default\((\$[^,]*?),([^)]*?)\)\}",
            rewrite: |caps, _env| format!("<?=!empty({0})?{0}:{1}?>", &caps[1], &caps[2]),
        },
        // Conditional display: print if set and not the empty-date sentinel.
        rule! {
            name: "conditional display",
            matcher: r"\{\?(\$.*?)\}",
            rewrite: |caps, _env| {
                format!(r#"<?=(isset({0}) and {0}!=="0000-00-00")?{0}:""?>"#, &caps[1])
            },
        },
        // Bare variable interpolation.
        rule! {
            name: "variable",
            matcher: r"\{\$([^}]*?)\}",
            rewrite: |caps, _env| format!("<?=${}?>", &caps[1]),
        },
        // Comments, both delimiter pairs.
        rule! {
            name: "hash comment",
            matcher: r"\{#[^}]*?\}",
            rewrite: |_caps, _env| String::new(),
        },
        rule! {
            name: "star comment",
            matcher: r"(?s)\{\*.*?\*\}",
            rewrite: |_caps, _env| String::new(),
        },
        // URL builder shorthand.
        rule! {
            name: "url shorthand",
            matcher: r"\{url(\(.*?\))\}",
            rewrite: |caps, _env| format!("<?=url{}?>", &caps[1]),
        },
        // Translation shorthand. Ordered before the catch-all so it can
        // actually fire; the capture keeps its closing paren.
        rule! {
            name: "translation",
            matcher: r"\{_\((.*?\))\}",
            rewrite: |caps, _env| format!("<?=translate({}?>", &caps[1]),
        },
        // Generic function-call catch-all. Must stay last: every directive
        // above also ends in a closing paren.
        rule! {
            name: "call catch-all",
            matcher: r"\{(.*?\))\}",
            rewrite: |caps, _env| format!("<?={}?>", &caps[1]),
        },
    ]
}
