mod debug_report;

use chronotag::{LoadOptions, RecognitionEngine, Sentence, Token};
use clap::Parser;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Tag POS-tagged sentences with a directory of recognition rules.
///
/// Input is one sentence per line, tokens separated by whitespace, each token
/// written as `word/POS` (a token without `/` gets an empty POS).
#[derive(Debug, Parser)]
#[command(name = "chronotag", version, about)]
struct Cli {
    /// Rule directory to load.
    #[arg(short, long)]
    rules: PathBuf,

    /// Input file (defaults to stdin).
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Only read rule files directly inside the rule directory.
    #[arg(long)]
    flat: bool,

    /// Print run metrics after the results.
    #[arg(long)]
    metrics: bool,

    /// Force colored output.
    #[arg(long, conflicts_with = "no_color")]
    color: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    run(&cli, || read_input(cli.input.as_ref()))
}

/// Load rules, then read input and tag it. Input is only read once the rules
/// are known to load.
fn run(cli: &Cli, read: impl FnOnce() -> io::Result<String>) -> ExitCode {
    let color = if cli.color {
        true
    } else if cli.no_color {
        false
    } else {
        io::stdout().is_terminal()
    };

    let options = LoadOptions { recursive: !cli.flat, ..LoadOptions::default() };
    let engine = RecognitionEngine::with_options(options);
    if let Err(errors) = engine.load_rules(&cli.rules) {
        debug_report::print_load_errors(&cli.rules, &errors, color);
        return ExitCode::FAILURE;
    }

    let input = match read() {
        Ok(input) => input,
        Err(err) => {
            eprintln!("error: cannot read input: {err}");
            return ExitCode::from(2);
        }
    };

    let mut sentences: Vec<Sentence> = input.lines().filter(|l| !l.trim().is_empty()).map(parse_sentence).collect();
    let metrics = engine.tag_with_metrics(&mut sentences);
    debug_report::print_run(&sentences, &metrics, color, cli.metrics);
    ExitCode::SUCCESS
}

fn read_input(path: Option<&PathBuf>) -> io::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn parse_sentence(line: &str) -> Sentence {
    line.split_whitespace()
        .map(|raw| match raw.rsplit_once('/') {
            Some((text, pos)) if !text.is_empty() => Token::new(text, pos),
            _ => Token::new(raw, ""),
        })
        .collect()
}
