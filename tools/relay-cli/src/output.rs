//! Output formatting for the CLI.

use std::time::Duration;

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use relay_gateway::Classification;

/// Kind of status line.
#[derive(Debug, Clone, Copy)]
enum Tone {
    Info,
    Success,
    Warn,
    Error,
    Debug,
}

impl Tone {
    fn marker(self) -> StyledObject<&'static str> {
        match self {
            Self::Info => style("ℹ").blue(),
            Self::Success => style("✓").green(),
            Self::Warn => style("⚠").yellow(),
            Self::Error => style("✗").red(),
            Self::Debug => style("→").dim(),
        }
    }

    /// Warnings, errors and debug lines go to stderr.
    fn to_stderr(self) -> bool {
        matches!(self, Self::Warn | Self::Error | Self::Debug)
    }
}

/// Output handler for CLI messages.
///
/// In JSON mode only the final document goes to stdout; status lines are
/// suppressed and errors become a JSON object on stderr.
#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
}

impl Output {
    /// Create a new output handler.
    pub fn new(verbose: bool, json: bool) -> Self {
        Self { verbose, json }
    }

    fn line(&self, tone: Tone, msg: &str) {
        if self.json {
            return;
        }
        let text = match tone {
            Tone::Error => style(msg).red().to_string(),
            Tone::Debug => style(msg).dim().to_string(),
            _ => msg.to_string(),
        };
        if tone.to_stderr() {
            eprintln!("{} {}", tone.marker(), text);
        } else {
            println!("{} {}", tone.marker(), text);
        }
    }

    pub fn info(&self, msg: &str) {
        self.line(Tone::Info, msg);
    }

    pub fn success(&self, msg: &str) {
        self.line(Tone::Success, msg);
    }

    pub fn warn(&self, msg: &str) {
        self.line(Tone::Warn, msg);
    }

    /// Print an error, as JSON in JSON mode.
    pub fn error(&self, msg: &str) {
        if self.json {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        } else {
            self.line(Tone::Error, msg);
        }
    }

    /// Only shown with `--verbose`.
    pub fn debug(&self, msg: &str) {
        if self.verbose {
            self.line(Tone::Debug, msg);
        }
    }

    /// Print a section title.
    pub fn header(&self, msg: &str) {
        if !self.json {
            println!("\n{}", style(msg).bold().underlined());
        }
    }

    /// Print a value as pretty JSON on stdout.
    pub fn json<T: serde::Serialize>(&self, value: &T) {
        if let Ok(json) = serde_json::to_string_pretty(value) {
            println!("{}", json);
        }
    }

    /// Print an indented `key: value` line.
    pub fn kv(&self, key: &str, value: &str) {
        if !self.json {
            println!("  {}: {}", style(key).dim(), value);
        }
    }

    /// Print one row of fixed-width columns.
    pub fn table_row(&self, cols: &[&str], widths: &[usize]) {
        if self.json {
            return;
        }
        let row: Vec<String> = cols
            .iter()
            .zip(widths)
            .map(|(col, width)| format!("{:<width$}", col, width = *width))
            .collect();
        println!("  {}", row.join("  "));
    }

    /// Spinner shown while a request is in flight. Hidden in JSON mode.
    pub fn spinner(&self, msg: &str) -> ProgressBar {
        if self.json {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(template) =
            ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]")
        {
            pb.set_style(template);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn is_json(&self) -> bool {
        self.json
    }
}

/// `<status> <classification>`, coloured by outcome.
pub fn classification_badge(classification: Classification) -> String {
    let label = format!("{} {}", classification.status().as_u16(), classification);
    match classification {
        Classification::Ok => style(label).green().to_string(),
        Classification::ClientClosedRequest | Classification::DeadlineExceeded => {
            style(label).yellow().to_string()
        }
        Classification::UpstreamFailure | Classification::BadRequest => {
            style(label).red().to_string()
        }
    }
}

/// Colour a call outcome label.
pub fn outcome_badge(outcome: &str) -> String {
    match outcome {
        "succeeded" => style(outcome).green().to_string(),
        "cancelled" => style(outcome).yellow().to_string(),
        "failed" => style(outcome).red().to_string(),
        "not_awaited" => style(outcome).dim().to_string(),
        _ => outcome.to_string(),
    }
}

/// `850ms` below a second, `1.25s` above.
pub fn format_millis(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}
