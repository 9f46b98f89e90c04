//! Output formatting for qbank (table, json, csv, live streams)

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::ValueEnum;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use qbank_client::render::{Pane, RenderStatus, Region, ResultUnit};
use qbank_client::streaming::{ComparisonRecord, ConsistencyStatus};
use qbank_client::{ControlGuard, GeneratedQuestion, ReviewRecord, ReviewVerdict};
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::warn;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format (NDJSON of events for streams)
    Json,
    /// CSV format
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub no_color: bool,
    pub quiet: bool,
    interrupted: Arc<AtomicBool>,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self {
            format,
            no_color,
            quiet,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Route Ctrl+C to the interrupt flag; a second Ctrl+C exits immediately
    pub fn watch_interrupts(&self) {
        let flag = Arc::clone(&self.interrupted);
        let installed = ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
        });
        if let Err(e) = installed {
            warn!("Could not install Ctrl+C handler: {}", e);
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Resolves once Ctrl+C was pressed
    pub fn interrupt_signal(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let flag = Arc::clone(&self.interrupted);
        Box::pin(async move {
            while !flag.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    let table = Table::new(data).to_string();
                    println!("{}", table);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => {
                print_csv(data);
            }
        }
    }

    /// Print one streamed item as a JSON line
    pub fn print_json_line<T: Serialize>(&self, item: &T) {
        match serde_json::to_string(item) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Could not serialize event: {}", e),
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    if data.is_empty() {
        return;
    }

    // Get field names from the first item
    let first = serde_json::to_value(&data[0]).unwrap_or_default();
    if let serde_json::Value::Object(map) = &first {
        let headers: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        println!("{}", headers.join(","));

        for item in data {
            if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
                let values: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        row.get(*h)
                            .map(|v| match v {
                                serde_json::Value::String(s) => escape_csv(s),
                                other => escape_csv(&other.to_string()),
                            })
                            .unwrap_or_default()
                    })
                    .collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// First `max` characters of a string, with an ellipsis when cut
pub fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max {
        let head: String = flat.chars().take(max).collect();
        format!("{}…", head)
    } else {
        flat
    }
}

// =============================================================================
// Live stream region
// =============================================================================

/// Terminal region for one streaming operation.
///
/// The spinner is the loading placeholder. In JSON mode events are printed
/// by the caller, so only errors reach the terminal from here. Ctrl+C closes
/// the region.
pub struct TerminalRegion {
    spinner: Option<ProgressBar>,
    echo: bool,
    quiet: bool,
    guard: Option<ControlGuard>,
    interrupted: Arc<AtomicBool>,
}

impl TerminalRegion {
    pub fn new(ctx: &OutputContext, message: &str, guard: ControlGuard) -> Self {
        let echo = !ctx.is_json();
        let spinner = (echo && !ctx.quiet).then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            );
            pb.set_message(message.to_string());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        Self {
            spinner,
            echo,
            quiet: ctx.quiet,
            guard: Some(guard),
            interrupted: Arc::clone(&ctx.interrupted),
        }
    }
}

impl Region for TerminalRegion {
    fn is_closed(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn clear_placeholder(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn append_line(&mut self, pane: Pane, text: &str) {
        if !self.echo || self.quiet {
            return;
        }
        match pane {
            Pane::Log => println!("{} {}", "›".dimmed(), text),
            Pane::Snippet => println!("  {} {}", "❝".cyan(), text.italic()),
        }
    }

    fn append_result(&mut self, index: usize, unit: ResultUnit<'_>) {
        if !self.echo {
            return;
        }
        match unit {
            ResultUnit::Comparison(record) => print_comparison(index, record),
            ResultUnit::Question(question) => print_question(index, question),
        }
    }

    fn append_error(&mut self, message: &str) {
        eprintln!("{} {}", "✗".red(), message.red());
    }

    fn show_success(&mut self, message: &str) {
        if self.echo && !self.quiet {
            println!("{} {}", "✓".green(), message.green());
        }
    }

    fn set_status(&mut self, status: &RenderStatus) {
        if self.echo && !self.quiet {
            let line = format!("-- {} --", status);
            match status {
                RenderStatus::Aborted => println!("{}", line.red()),
                _ => println!("{}", line.dimmed()),
            }
        }
    }

    fn release(&mut self) {
        self.guard.take();
    }
}

impl Drop for TerminalRegion {
    fn drop(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

fn status_label(status: ConsistencyStatus) -> colored::ColoredString {
    match status {
        ConsistencyStatus::FullyConsistent => status.label().green().bold(),
        ConsistencyStatus::SemanticallyConsistent => status.label().cyan().bold(),
        ConsistencyStatus::Error => status.label().red().bold(),
    }
}

fn print_comparison(index: usize, record: &ComparisonRecord) {
    let result = &record.comparison_result;
    println!();
    println!("{} {}", format!("#{}", index + 1).bold(), status_label(record.status()));
    println!("  {}", record.segment_content);
    if let Some(diff) = result.diff_description.as_deref().filter(|d| !d.is_empty()) {
        println!("  {} {}", "diff:".yellow(), diff);
    }
    if let Some(suggestion) = result.suggestion.as_deref().filter(|s| !s.is_empty()) {
        println!("  {} {}", "suggestion:".yellow(), suggestion);
    }
    for fragment in &record.retrieved_fragments {
        println!(
            "  {} [{}] {} {}",
            "evidence".dimmed(),
            fragment.source_title(),
            fragment.score_display().bold(),
            truncate(&fragment.content, 80).dimmed()
        );
    }
}

fn print_question(index: usize, question: &GeneratedQuestion) {
    println!();
    println!("{}", format!("Question {}", index + 1).bold());
    if let Some(case) = question.case_content.as_deref().filter(|c| !c.is_empty()) {
        println!("  {} {}", "case:".dimmed(), case);
    }
    println!("  {}", question.stem);
    for (letter, text, correct) in question.options() {
        if correct {
            println!("  {}. {} {}", letter, text.green(), "✓".green());
        } else {
            println!("  {}. {}", letter, text);
        }
    }
    if let Some(answer) = &question.answer {
        println!("  {} {}", "answer:".bold(), answer);
    }
    if let Some(analysis) = question.analysis.as_deref().filter(|a| !a.is_empty()) {
        println!("  {} {}", "analysis:".dimmed(), analysis);
    }
}

/// Colored verdict label of a review
pub fn verdict_label(record: &ReviewRecord) -> colored::ColoredString {
    let label = record.review_result.as_str();
    match record.verdict() {
        ReviewVerdict::Pass => label.green(),
        ReviewVerdict::Fail => label.red(),
        ReviewVerdict::NeedsManualCheck => label.yellow(),
    }
}

/// Print one review record with its content
pub fn print_review(reviewer: &str, record: &ReviewRecord, ctx: &OutputContext) {
    if ctx.is_json() {
        ctx.print_json_line(&serde_json::json!({ "reviewer": reviewer, "record": record }));
        return;
    }
    let time = record
        .review_time
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
    println!(
        "{} {} {}",
        format!("[{}]", reviewer).bold(),
        verdict_label(record),
        time.dimmed()
    );
    if !ctx.quiet && !record.review_content.is_empty() {
        println!("{}", record.review_content);
    }
    if let Some(rag) = record.rag_index.as_deref() {
        if !ctx.quiet {
            println!("{} {}", "rag:".dimmed(), truncate(rag, 120).dimmed());
        }
    }
}

// =============================================================================
// Display types for various commands
// =============================================================================

/// Book display for books list
#[derive(Debug, Tabled, Serialize)]
pub struct BookRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "File")]
    pub file: String,
    #[tabled(rename = "Split")]
    pub split: String,
    #[tabled(rename = "Embed")]
    pub embed: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

/// Question display for questions list
#[derive(Debug, Tabled, Serialize)]
pub struct QuestionRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Type")]
    pub question_type: String,
    #[tabled(rename = "Stem")]
    pub stem: String,
    #[tabled(rename = "Dingchun")]
    pub dingchun: String,
    #[tabled(rename = "Qwen")]
    pub qwen: String,
    #[tabled(rename = "Kimi")]
    pub kimi: String,
    #[tabled(rename = "Doubao")]
    pub doubao: String,
}

/// Review history entry
#[derive(Debug, Tabled, Serialize)]
pub struct ReviewRow {
    #[tabled(rename = "Reviewer")]
    pub reviewer: String,
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Time")]
    pub time: String,
    #[tabled(rename = "Result")]
    pub result: String,
}

/// Batch progress table row
#[derive(Debug, Tabled, Serialize)]
pub struct ProgressView {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Stem")]
    pub stem: String,
    #[tabled(rename = "Dingchun")]
    pub dingchun: String,
    #[tabled(rename = "Qwen")]
    pub qwen: String,
    #[tabled(rename = "Kimi")]
    pub kimi: String,
    #[tabled(rename = "Doubao")]
    pub doubao: String,
}

/// Knowledge-base document row
#[derive(Debug, Tabled, Serialize)]
pub struct KnowledgeRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Heading")]
    pub heading: String,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Content")]
    pub content: String,
}

/// Collection overview row
#[derive(Debug, Tabled, Serialize)]
pub struct CollectionRow {
    #[tabled(rename = "Collection")]
    pub name: String,
    #[tabled(rename = "Entries")]
    pub entries: String,
    #[tabled(rename = "Sources")]
    pub sources: String,
    #[tabled(rename = "Searched")]
    pub searched: String,
}

/// Audit batch row
#[derive(Debug, Tabled, Serialize)]
pub struct RangeRow {
    #[tabled(rename = "Batch")]
    pub index: usize,
    #[tabled(rename = "Segments")]
    pub range: String,
}

/// Audit fragment row
#[derive(Debug, Tabled, Serialize)]
pub struct FragmentRow {
    #[tabled(rename = "ID")]
    pub id: i64,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Embedded")]
    pub embedded: String,
    #[tabled(rename = "Content")]
    pub content: String,
}

/// Search hit row
#[derive(Debug, Tabled, Serialize)]
pub struct SearchRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Score")]
    pub score: String,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Path")]
    pub path: String,
    #[tabled(rename = "Content")]
    pub content: String,
}

/// System log row
#[derive(Debug, Tabled, Serialize)]
pub struct LogRow {
    #[tabled(rename = "Time")]
    pub time: String,
    #[tabled(rename = "Type")]
    pub log_type: String,
    #[tabled(rename = "Source")]
    pub source: String,
    #[tabled(rename = "Message")]
    pub message: String,
}
