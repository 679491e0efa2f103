use glaze::{RecompileReport, RecompileStatus};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const RED: &str = "\x1b[31m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_report(report: &RecompileReport, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint("⚙  Recompiling view trees", ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Files ━━━", ansi::GRAY));
    if report.entries.is_empty() {
        println!("{}", palette.dim("  No templates found"));
    }
    for entry in &report.entries {
        match &entry.status {
            RecompileStatus::Compiled => {
                println!(
                    "  {} {} {} {}",
                    palette.paint("✓", ansi::GREEN),
                    entry.source.display(),
                    palette.dim("→"),
                    palette.dim(entry.compiled.display().to_string()),
                );
            }
            RecompileStatus::Failed(reason) => {
                println!(
                    "  {} {}\n      {}",
                    palette.paint("✗", ansi::RED),
                    entry.source.display(),
                    palette.paint(reason, ansi::RED),
                );
            }
        }
    }

    println!("\n{}", palette.paint("━━━ Summary ━━━", ansi::GRAY));
    println!(
        "  Compiled: {}  │  Failed: {}  │  Page cache: {}",
        palette.paint(report.compiled().to_string(), ansi::GREEN),
        if report.failed() > 0 {
            palette.paint(report.failed().to_string(), ansi::RED)
        } else {
            palette.dim("0")
        },
        if report.cleared_page_cache { palette.paint("cleared", ansi::CYAN) } else { palette.dim("untouched") },
    );
    println!();
}
