use chronotag::{RuleLoadErrors, Sentence, TagMetrics, tagged_spans};
use std::path::Path;

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
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

pub fn print_load_errors(dir: &Path, errors: &RuleLoadErrors, color: bool) {
    let palette = ansi::Palette::new(color);
    eprintln!(
        "\n{}",
        palette.bold(palette.paint(format!("✗  Failed to load rules from \"{}\"", dir.display()), ansi::RED))
    );
    eprintln!("{}", palette.paint(format!("━━━ {} error(s) ━━━", errors.len()), ansi::GRAY));
    for (idx, err) in errors.iter().enumerate() {
        eprintln!(
            "  {} {} {}",
            palette.paint(format!("[{}]", idx), ansi::GRAY),
            palette.paint(err.kind.to_string(), ansi::YELLOW),
            palette.dim(err.location.to_string()),
        );
        eprintln!("      {}", err.detail);
    }
    eprintln!();
}

pub fn print_run(sentences: &[Sentence], metrics: &TagMetrics, color: bool, show_metrics: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.paint("━━━ Results ━━━", ansi::GRAY));

    if sentences.is_empty() {
        println!("{}", palette.dim("  No input sentences"));
    }
    for (idx, sentence) in sentences.iter().enumerate() {
        print_sentence(idx, sentence, &palette);
    }

    if show_metrics {
        println!("\n{}", palette.paint("━━━ Metrics ━━━", ansi::GRAY));
        print_metrics(metrics, &palette);
    }
    println!();
}

fn print_sentence(idx: usize, sentence: &Sentence, palette: &ansi::Palette) {
    let text: Vec<&str> = sentence.iter().map(|t| t.text.as_str()).collect();
    println!("  {} {}", palette.paint(format!("[{}]", idx), ansi::GRAY), palette.bold(text.join(" ")));

    let spans = tagged_spans(sentence);
    if spans.is_empty() {
        println!("      {}", palette.dim("no spans recognised"));
        return;
    }
    for span in spans {
        println!(
            "      {} {} {}",
            palette.paint(format!("{}..{}", span.start, span.end), ansi::YELLOW),
            palette.paint(&span.kind, ansi::BLUE),
            palette.bold(palette.paint(&span.text, ansi::GREEN)),
        );
    }
}

fn print_metrics(metrics: &TagMetrics, palette: &ansi::Palette) {
    println!(
        "  Sentences: {}  │  Passes: {}  │  Rules attempted: {}  │  Matches: {}  │  Guarded: {}",
        palette.paint(metrics.sentences.to_string(), ansi::BLUE),
        palette.paint(metrics.passes.to_string(), ansi::BLUE),
        palette.paint(metrics.rules_attempted.to_string(), ansi::BLUE),
        palette.paint(metrics.matches.to_string(), ansi::GREEN),
        palette.dim(metrics.guarded.to_string()),
    );
    println!(
        "  Tags added: {}  │  Tags squelched: {}  │  Total: {}",
        palette.paint(metrics.tags_added.to_string(), ansi::GREEN),
        palette.paint(metrics.tags_removed.to_string(), ansi::YELLOW),
        palette.paint(format!("{:?}", metrics.total), ansi::CYAN),
    );
    for hit in &metrics.hits {
        println!("    {} {}", palette.paint(&hit.rule, ansi::CYAN), palette.dim(format!("×{}", hit.matches)));
    }
}
