mod debug_report;

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use glaze::{Bindings, Config, Engine, RenderContext, Value};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: CliConfig) -> glaze::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(root) = cli.root {
        config.root = root;
    }
    if cli.debug {
        config.debug = true;
    }

    let engine = Engine::new(config);
    let ctx = RenderContext {
        module: cli.module,
        controller: cli.controller,
        action: cli.action,
        legacy_browser: false,
    };

    match cli.mode {
        Mode::Recompile => {
            let report = engine.recompile_all()?;
            debug_report::print_report(&report, cli.color);
            if report.failed() > 0 {
                std::process::exit(1);
            }
        }
        Mode::ShowCompiled => {
            let compiled = engine.compiled_source(&cli.view, &ctx)?;
            println!("{compiled}");
        }
        Mode::Render => {
            let mut bindings = Bindings::new();
            for (key, value) in cli.binds {
                bindings.insert(key, value);
            }
            let stdout = io::stdout();
            let mut out = stdout.lock();
            engine.render(&cli.view, &ctx, bindings, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

enum Mode {
    Render,
    Recompile,
    ShowCompiled,
}

struct CliConfig {
    config: Option<PathBuf>,
    root: Option<PathBuf>,
    module: String,
    controller: String,
    action: String,
    binds: Vec<(String, Value)>,
    debug: bool,
    color: bool,
    mode: Mode,
    view: String,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut cli = CliConfig {
        config: None,
        root: None,
        module: String::new(),
        controller: String::new(),
        action: String::new(),
        binds: Vec::new(),
        debug: false,
        color: io::stdout().is_terminal(),
        mode: Mode::Render,
        view: String::new(),
    };
    let mut view: Option<String> = None;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("tplc {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => cli.color = true,
            "--no-color" => cli.color = false,
            "--debug" => cli.debug = true,
            "--recompile" => cli.mode = Mode::Recompile,
            "--show-compiled" => cli.mode = Mode::ShowCompiled,
            "--config" => cli.config = Some(PathBuf::from(expect_value(&arg, &mut args)?)),
            "--root" => cli.root = Some(PathBuf::from(expect_value(&arg, &mut args)?)),
            "--module" => cli.module = expect_value(&arg, &mut args)?,
            "--controller" => cli.controller = expect_value(&arg, &mut args)?,
            "--action" => cli.action = expect_value(&arg, &mut args)?,
            "--bind" => {
                let pair = expect_value(&arg, &mut args)?;
                cli.binds.push(parse_bind(&pair)?);
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                if view.is_some() {
                    return Err("error: view name provided multiple times".to_string());
                }
                view = Some(arg);
            }
        }
    }

    // The empty view name is valid: it resolves to the context's
    // controller/action pair.
    cli.view = view.unwrap_or_default();
    if cli.view.is_empty()
        && matches!(cli.mode, Mode::Render | Mode::ShowCompiled)
        && (cli.controller.is_empty() || cli.action.is_empty())
    {
        return Err(format!(
            "error: no view name and no --controller/--action to derive one\n\n{}",
            help_text()
        ));
    }

    Ok(cli)
}

fn expect_value(flag: &str, args: &mut impl Iterator<Item = String>) -> Result<String, String> {
    args.next().ok_or_else(|| format!("error: {flag} expects a value"))
}

/// `key=value`; the value is taken as JSON when it parses, else as a string.
fn parse_bind(pair: &str) -> Result<(String, Value), String> {
    let Some((key, value)) = pair.split_once('=') else {
        return Err(format!("error: --bind expects key=value, got '{pair}'"));
    };
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), parsed))
}

fn help_text() -> String {
    format!(
        "tplc {version}

Template compilation and rendering CLI.

Usage:
  tplc [OPTIONS] [view]
  tplc [OPTIONS] --recompile

Modes:
  (default)                 Render the view to stdout.
  --show-compiled           Print the compiled artifact without executing it.
  --recompile               Recompile every configured view tree and print a
                            per-file trace.

Options:
  --config <file>           JSON configuration file.
  --root <dir>              Project root (overrides the config file).
  --module <name>           Current module; empty for global scope.
  --controller <name>       Current controller.
  --action <name>           Current action.
  --bind <key=value>        Bind a variable; the value is parsed as JSON when
                            possible. Repeatable.
  --debug                   Debug mode: keep whitespace, rebuild bundles.
  --color                   Force ANSI color output.
  --no-color                Disable ANSI color output.
  -h, --help                Show this help message.
  -V, --version             Print version information.

Exit codes:
  0  Success.
  1  Compilation or render error.
  2  Invalid arguments.
",
        version = env!("CARGO_PKG_VERSION"),
    )
}
