#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

#[macro_export]
macro_rules! rule {
    (
        name: $name:expr,
        matcher: $pat:literal,
        rewrite: |$caps:pat_param, $env:pat_param| $body:expr
        $(,)?
    ) => {{
        $crate::Rule {
            name: $name,
            matcher: $crate::regex!($pat),
            rewrite: Box::new(move |$caps: &regex::Captures, $env: &$crate::CompileEnv| -> String { $body }),
        }
    }};
}
