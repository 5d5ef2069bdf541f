//! CLI binary for fb2-compress.
//!
//! A thin shim over the library crate: parse the one positional argument,
//! print per-image progress to stdout, and save `compress_<name>` next to
//! the input.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use fb2_compress::{
    compress, BinaryError, CompressionConfig, CompressionProgressCallback, CompressionStats,
    ProgressCallback, SkipReason, TranscodeSummary,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

/// Colours are only emitted when stdout is a terminal, so piped progress
/// lines stay plain text.
#[derive(Clone, Copy)]
struct Palette {
    enabled: bool,
}

impl Palette {
    fn paint(self, code: &str, s: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{s}\x1b[0m")
        } else {
            s.to_string()
        }
    }
    fn green(self, s: &str) -> String {
        self.paint("32", s)
    }
    fn red(self, s: &str) -> String {
        self.paint("31", s)
    }
    fn yellow(self, s: &str) -> String {
        self.paint("33", s)
    }
    fn dim(self, s: &str) -> String {
        self.paint("2", s)
    }
    fn bold(self, s: &str) -> String {
        self.paint("1", s)
    }
    fn cyan(self, s: &str) -> String {
        self.paint("36", s)
    }
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ── Console progress reporter ────────────────────────────────────────────────

/// Prints one line per `<binary>` node to stdout. When stdout is a terminal
/// a progress bar is kept at the bottom and lines are printed above it.
struct ConsoleReporter {
    bar: ProgressBar,
    palette: Palette,
    /// Label of the node currently being processed.
    current: Mutex<String>,
}

impl ConsoleReporter {
    fn new() -> Arc<Self> {
        let interactive = io::stdout().is_terminal();
        let target = if interactive {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(0), target);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Loading");
        if interactive {
            bar.enable_steady_tick(Duration::from_millis(80));
        }

        Arc::new(Self {
            bar,
            palette: Palette {
                enabled: interactive,
            },
            current: Mutex::new(String::new()),
        })
    }

    fn line(&self, text: String) {
        if self.bar.is_hidden() || self.bar.is_finished() {
            println!("{text}");
        } else {
            self.bar.println(text);
        }
    }

    fn current_label(&self) -> String {
        self.current
            .lock()
            .map(|label| label.clone())
            .unwrap_or_default()
    }
}

impl CompressionProgressCallback for ConsoleReporter {
    fn on_document_loaded(&self, binary_count: usize) {
        self.bar.set_length(binary_count as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} images  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        self.bar.set_prefix("Compressing");
        let p = self.palette;
        self.line(format!(
            "{} {}",
            p.cyan("◆"),
            p.bold(&format!("Found {binary_count} binary node(s)"))
        ));
    }

    fn on_binary_start(
        &self,
        _index: usize,
        _total: usize,
        id: Option<&str>,
        content_type: Option<&str>,
    ) {
        let label = format!(
            "{} ({})",
            id.unwrap_or("<no id>"),
            content_type.unwrap_or("<no content-type>")
        );
        self.bar.set_message(label.clone());
        if let Ok(mut current) = self.current.lock() {
            *current = label;
        }
    }

    fn on_binary_skipped(&self, index: usize, total: usize, reason: &SkipReason) {
        let p = self.palette;
        self.line(format!(
            "  {} [{}/{}] {}  {}",
            p.dim("·"),
            index + 1,
            total,
            self.current_label(),
            p.dim(&format!("skipped: {reason}")),
        ));
        self.bar.inc(1);
    }

    fn on_binary_complete(&self, index: usize, total: usize, summary: &TranscodeSummary) {
        let p = self.palette;
        let (ow, oh) = summary.original_dimensions;
        let (nw, nh) = summary.new_dimensions;
        let dims = if summary.was_resized() {
            format!("{ow}x{oh} → {nw}x{nh}")
        } else {
            format!("{nw}x{nh}")
        };
        self.line(format!(
            "  {} [{}/{}] {}  → {}  {}  {}",
            p.green("✓"),
            index + 1,
            total,
            self.current_label(),
            summary.content_type,
            dims,
            p.dim(&format!(
                "{} → {}",
                human_bytes(summary.original_bytes as u64),
                human_bytes(summary.new_bytes as u64)
            )),
        ));
        self.bar.inc(1);
    }

    fn on_binary_error(&self, index: usize, total: usize, error: &BinaryError) {
        let p = self.palette;
        self.line(format!(
            "  {} [{}/{}] {}  {}",
            p.red("✗"),
            index + 1,
            total,
            self.current_label(),
            p.red(&error.to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_compression_complete(&self, stats: &CompressionStats) {
        self.bar.finish_and_clear();
        let p = self.palette;
        let mark = if stats.failed == 0 {
            p.green("✔")
        } else {
            p.yellow("⚠")
        };
        self.line(format!(
            "{} {}/{} images re-encoded, {} skipped, {} failed  {}",
            mark,
            p.bold(&stats.transcoded.to_string()),
            stats.total_binaries,
            stats.skipped,
            stats.failed,
            p.dim(&format!(
                "{} → {} ({:.1}% smaller)",
                human_bytes(stats.document_bytes_before),
                human_bytes(stats.document_bytes_after),
                stats.document_reduction_percent()
            )),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Writes books/compress_war.fb2
  fb2-compress books/war.fb2

  # Machine-readable report
  fb2-compress --json book.fb2 > report.json

  # Show per-image decisions in the log
  fb2-compress -v book.fb2

WHAT IT DOES:
  Every <binary> image is scaled so its longer side is at most 800 px.
  Images with transparency become 256-colour PNG, all others JPEG at
  quality 85. Non-image binaries and broken images are left untouched.

ENVIRONMENT VARIABLES:
  RUST_LOG   Override the log filter (e.g. RUST_LOG=fb2_compress=debug)
"#;

/// Shrink the embedded images of a FictionBook 2 e-book.
#[derive(Parser, Debug)]
#[command(
    name = "fb2-compress",
    version,
    about = "Shrink the embedded images of a FictionBook 2 e-book",
    long_about = "Re-encode every image stored in the <binary> elements of an FB2 file: \
downscale to at most 800 px on the longer side, quantise transparent images to a \
256-colour PNG and save opaque ones as JPEG. The result is written next to the input \
as compress_<name>.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// FB2 file to compress.
    input: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FB2_COMPRESS_VERBOSE")]
    verbose: bool,

    /// Suppress progress lines; only errors are printed.
    #[arg(short, long, env = "FB2_COMPRESS_QUIET", conflicts_with = "verbose")]
    quiet: bool,

    /// Print the full report (CompressionOutput) as JSON instead of progress lines.
    #[arg(long, env = "FB2_COMPRESS_JSON")]
    json: bool,
}

fn not_found_line(path: &Path) -> String {
    format!("File '{}' not found", path.display())
}

/// The one line reported for a document-level failure, with its cause chain.
fn failure_line(err: &anyhow::Error) -> String {
    format!("✘ {err:#}")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            e.print().context("Failed to print usage")?;
            return Ok(code);
        }
    };

    // ── Logging setup ────────────────────────────────────────────────────
    // Progress goes to stdout through the reporter; logs stay on stderr.
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if !cli.input.is_file() {
        println!("{}", not_found_line(&cli.input));
        return Ok(ExitCode::FAILURE);
    }

    // ── Build config ─────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.json;
    let reporter = show_progress.then(ConsoleReporter::new);

    let mut builder = CompressionConfig::builder();
    if let Some(ref r) = reporter {
        builder = builder.progress_callback(Arc::clone(r) as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    match compress(&cli.input, &config).await {
        Ok(output) => {
            if cli.json {
                let json = serde_json::to_string_pretty(&output)
                    .context("Failed to serialise output")?;
                println!("{json}");
            } else if let Some(ref r) = reporter {
                r.line(format!(
                    "   saved {}",
                    r.palette.bold(&output.output_path.display().to_string())
                ));
            }
        }
        Err(e) => {
            // Document-level failures are reported, not signalled through
            // the exit status.
            if let Some(ref r) = reporter {
                r.bar.finish_and_clear();
            }
            let err = anyhow::Error::new(e).context("Compression failed");
            if cli.json {
                println!("{}", serde_json::json!({ "error": format!("{err:#}") }));
            } else {
                println!("{}", failure_line(&err));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
