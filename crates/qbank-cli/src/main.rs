//! qbank - Command-line admin tool for the question-bank server
//!
//! Manages book imports, smart comparison, AI question review and
//! generation, and batch reviews.

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use qbank_client::knowledge::{FragmentDraft, KnowledgeDraft, KnowledgeQuery, DEFAULT_COLLECTION};
use qbank_client::{
    BatchStartRequest, BookDraft, GenerationRequest, ImportStep, PollConfig, QbankClient,
    QuestionQuery, Reviewer, SEARCH_COLLECTIONS_KEY,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::commands::{CompareSource, EmbedSelection, QuestionChanges};
use crate::config::{Config, MergedConfig};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "qbank")]
#[command(author, version, about = "Question-bank admin CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Server URL [default: http://localhost:8000]
    #[arg(short, long, env = "QBANK_SERVER")]
    server: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "QBANK_CONFIG")]
    config: Option<PathBuf>,

    /// Output format [default: table]
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage books registered for import
    Books {
        #[command(subcommand)]
        action: BooksCmd,
    },

    /// Run an import step for a book and stream its log
    Import {
        /// Step: split, process or embed
        step: ImportStep,

        /// Book ID
        book_id: i64,
    },

    /// Compare text against the knowledge base (streamed)
    Compare {
        /// Text to compare
        #[arg(long, conflicts_with_all = ["file", "book"])]
        text: Option<String>,

        /// Read the text from a file
        #[arg(long, conflicts_with = "book")]
        file: Option<PathBuf>,

        /// Compare a segment range of an imported book
        #[arg(long, requires_all = ["start", "end"])]
        book: Option<i64>,

        /// First row of the book range
        #[arg(long)]
        start: Option<u64>,

        /// Last row of the book range
        #[arg(long)]
        end: Option<u64>,
    },

    /// Browse and delete stored questions
    Questions {
        #[command(subcommand)]
        action: QuestionsCmd,
    },

    /// Review a question with AI reviewers
    Review {
        /// Question ID
        question_id: i64,

        /// Reviewer(s) to run: dingchun, qwen, kimi, doubao (default: all)
        #[arg(short, long = "reviewer")]
        reviewers: Vec<Reviewer>,
    },

    /// Show the review history of a question
    History {
        /// Question ID
        question_id: i64,

        /// Only this reviewer
        #[arg(short, long)]
        reviewer: Option<Reviewer>,

        /// Show one record in full (0 = latest)
        #[arg(long)]
        index: Option<usize>,
    },

    /// Generate questions with the AI agent (streamed)
    Generate {
        /// Topic of the questions
        #[arg(long)]
        topic: String,

        /// Generate without a case description
        #[arg(long)]
        no_case: bool,

        /// Number of correct options
        #[arg(long, default_value = "1")]
        correct: u32,

        /// Number of options per question
        #[arg(long, default_value = "5")]
        options: u32,

        /// Number of questions
        #[arg(long, default_value = "1")]
        count: u32,

        /// Save every generated question to the bank
        #[arg(long)]
        save: bool,
    },

    /// Run batch reviews over question ranges
    Batch {
        #[command(subcommand)]
        action: BatchCmd,
    },

    /// Browse and edit the knowledge-base collections
    Knowledge {
        #[command(subcommand)]
        action: KnowledgeCmd,
    },

    /// Review structured fragments of a book before embedding
    Audit {
        #[command(subcommand)]
        action: AuditCmd,
    },

    /// Search the knowledge base
    Search {
        #[command(subcommand)]
        action: SearchCmd,
    },

    /// Read and change server settings
    Settings {
        #[command(subcommand)]
        action: SettingsCmd,
    },

    /// Show or clear the server's system logs
    Logs {
        #[command(subcommand)]
        action: LogsCmd,
    },
}

#[derive(Subcommand)]
enum BooksCmd {
    /// List books and their import progress
    List,

    /// Create a book, or update it with --id
    Save {
        /// Book name
        name: String,

        /// Path of the source file on the server
        file: String,

        /// Existing book ID to update
        #[arg(long)]
        id: Option<i64>,

        /// Target vector collection
        #[arg(long, default_value = "Pharmacopoeia")]
        collection: String,

        /// Segments per AI batch
        #[arg(long, default_value = "5")]
        batch_size: u32,
    },

    /// Delete a book
    Delete {
        /// Book ID
        book_id: i64,
    },
}

#[derive(Subcommand)]
enum QuestionsCmd {
    /// List one page of questions
    List {
        /// Page number
        #[arg(long, default_value = "1")]
        page: u32,

        /// Rows per page (default from config)
        #[arg(long)]
        page_size: Option<u32>,

        /// Filter by text
        #[arg(long, default_value = "")]
        search: String,
    },

    /// Delete a question
    Delete {
        /// Question ID
        question_id: i64,
    },

    /// Import questions from raw text
    Add {
        /// Question text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// Read the question text from a file
        #[arg(long)]
        file: Option<PathBuf>,

        /// Source label stored with the questions
        #[arg(long, default_value = "智能审题")]
        source: String,
    },

    /// Edit a stored question
    Update {
        /// Question ID
        question_id: i64,

        /// New stem
        #[arg(long)]
        stem: Option<String>,

        /// New answer letters
        #[arg(long)]
        answer: Option<String>,

        /// New analysis
        #[arg(long)]
        analysis: Option<String>,

        /// Option text as LETTER=TEXT (empty text removes it)
        #[arg(long = "option", value_parser = parse_option)]
        options: Vec<(char, String)>,
    },
}

#[derive(Subcommand)]
enum KnowledgeCmd {
    /// List collections and their sources
    Collections,

    /// List one page of a collection
    List {
        /// Collection name
        #[arg(long, default_value = DEFAULT_COLLECTION)]
        collection: String,

        /// Page number
        #[arg(long, default_value = "1")]
        page: u32,

        /// Rows per page
        #[arg(long, default_value = "20")]
        page_size: u32,

        /// Metadata filter as KEY=VALUE (repeatable)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },

    /// Create a document, or replace it with --id
    Save {
        /// Document text
        #[arg(long)]
        content: String,

        /// Collection name
        #[arg(long, default_value = DEFAULT_COLLECTION)]
        collection: String,

        /// Existing document ID to replace
        #[arg(long)]
        id: Option<String>,

        /// Source file recorded in the metadata
        #[arg(long, default_value = "")]
        source_file: String,

        /// Heading levels, outermost first (up to 8)
        #[arg(long = "level", num_args = 1..=8)]
        levels: Vec<String>,
    },

    /// Delete a document
    Delete {
        /// Document ID
        doc_id: String,

        /// Collection name
        #[arg(long, default_value = DEFAULT_COLLECTION)]
        collection: String,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// List the fragment batches of a book
    Ranges {
        /// Book ID
        book_id: i64,
    },

    /// List the fragments of one batch
    List {
        /// Book ID
        book_id: i64,

        /// Batch index (from `audit ranges`)
        #[arg(long, default_value = "0")]
        range: u32,
    },

    /// Create a fragment, or update it with --id
    Save {
        /// Book ID
        book_id: i64,

        /// Fragment text
        #[arg(long)]
        content: String,

        /// Existing fragment ID to update
        #[arg(long)]
        id: Option<i64>,

        /// Heading levels, outermost first (up to 8)
        #[arg(long = "level", num_args = 1..=8)]
        levels: Vec<String>,
    },

    /// Delete a fragment
    Delete {
        /// Fragment ID
        fragment_id: i64,
    },

    /// Embed fragments into the vector store
    Embed {
        /// Fragment IDs
        #[arg(required_unless_present = "book", conflicts_with = "book")]
        ids: Vec<i64>,

        /// Embed every pending fragment of this book's batch
        #[arg(long)]
        book: Option<i64>,

        /// Batch index used with --book
        #[arg(long, default_value = "0")]
        range: u32,
    },
}

#[derive(Subcommand)]
enum SearchCmd {
    /// Search by text, optionally within a heading path
    Query {
        /// Text to search for
        #[arg(default_value = "")]
        text: String,

        /// Heading path filter (level lookup)
        #[arg(long)]
        level: Option<String>,
    },

    /// Replace the text of a search hit
    Update {
        /// Document ID
        id: String,

        /// New text
        content: String,
    },
}

#[derive(Subcommand)]
enum SettingsCmd {
    /// Show a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Store a configuration value (JSON, or plain text)
    Set {
        /// Configuration key
        key: String,

        /// Value
        value: String,
    },

    /// Choose the collections searched during reviews
    Collections {
        /// Collection names
        names: Vec<String>,

        /// Search no collection at all
        #[arg(long, conflicts_with = "names")]
        none: bool,
    },
}

#[derive(Subcommand)]
enum LogsCmd {
    /// List system logs
    List {
        /// Only error entries
        #[arg(long)]
        errors: bool,
    },

    /// Delete every system log
    Clear,
}

#[derive(Subcommand)]
enum BatchCmd {
    /// Start a batch review over a question ID range
    Start {
        /// First question ID
        #[arg(long)]
        from: i64,

        /// Last question ID
        #[arg(long)]
        to: i64,

        /// Reviewer(s) to run
        #[arg(short, long = "reviewer", required = true)]
        reviewers: Vec<Reviewer>,

        /// Follow progress after starting
        #[arg(short, long)]
        watch: bool,
    },

    /// Stop the running batch review
    Stop,

    /// Follow batch progress until it finishes
    Watch {
        /// Page to show
        #[arg(long, default_value = "1")]
        page: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.server.as_deref(),
        cli.output.map(|o| o.as_str()),
        cli.no_color,
    );
    let format = OutputFormat::from_str(&merged.output, true)
        .map_err(|_| anyhow::anyhow!("Unknown output format '{}'", merged.output))?;

    // Create output context
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);
    let client = create_client(&merged)?;
    let poll = PollConfig {
        interval: merged.poll_interval,
        page_size: merged.page_size,
    };

    // Execute command
    match cli.command {
        Commands::Books { action } => match action {
            BooksCmd::List => commands::books_list(&client, &ctx).await?,
            BooksCmd::Save {
                name,
                file,
                id,
                collection,
                batch_size,
            } => {
                let draft = BookDraft {
                    book_id: id,
                    target_collection: collection,
                    batch_size,
                    ..BookDraft::new(name, file)
                };
                commands::books_save(&client, draft, &ctx).await?;
            }
            BooksCmd::Delete { book_id } => commands::books_delete(&client, book_id, &ctx).await?,
        },

        Commands::Import { step, book_id } => {
            commands::import(&client, step, book_id, &ctx).await?;
        }

        Commands::Compare {
            text,
            file,
            book,
            start,
            end,
        } => {
            let source = match (text, file, book, start, end) {
                (Some(text), _, _, _, _) => CompareSource::Text(text),
                (_, Some(path), _, _, _) => CompareSource::File(path),
                (_, _, Some(book_id), Some(start), Some(end)) => CompareSource::Book {
                    book_id,
                    start,
                    end,
                },
                _ => bail!("Specify one of --text, --file or --book with --start/--end"),
            };
            commands::compare(&client, source, &ctx).await?;
        }

        Commands::Questions { action } => match action {
            QuestionsCmd::List {
                page,
                page_size,
                search,
            } => {
                let query = QuestionQuery {
                    page: page.max(1),
                    page_size: page_size.filter(|&n| n > 0).unwrap_or(merged.page_size),
                    search_text: search,
                };
                commands::questions_list(&client, query, &ctx).await?;
            }
            QuestionsCmd::Delete { question_id } => {
                commands::questions_delete(&client, question_id, &ctx).await?;
            }
            QuestionsCmd::Add { text, file, source } => {
                let raw_text = match (text, file) {
                    (Some(text), _) => text,
                    (None, Some(path)) => std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                    (None, None) => bail!("Specify --text or --file"),
                };
                commands::questions_add(&client, &raw_text, &source, &ctx).await?;
            }
            QuestionsCmd::Update {
                question_id,
                stem,
                answer,
                analysis,
                options,
            } => {
                let changes = QuestionChanges {
                    stem,
                    answer,
                    analysis,
                    options,
                };
                commands::questions_update(&client, question_id, changes, &ctx).await?;
            }
        },

        Commands::Review {
            question_id,
            reviewers,
        } => {
            commands::review(&client, question_id, &reviewers, &ctx).await?;
        }

        Commands::History {
            question_id,
            reviewer,
            index,
        } => {
            commands::history(&client, question_id, reviewer, index, &ctx).await?;
        }

        Commands::Generate {
            topic,
            no_case,
            correct,
            options,
            count,
            save,
        } => {
            if correct == 0 || correct > options {
                bail!("--correct must be between 1 and --options ({})", options);
            }
            let request = GenerationRequest {
                has_case: !no_case,
                correct_count: correct,
                question_count: count.max(1),
                total_count: options,
                ..GenerationRequest::new(topic)
            };
            commands::generate(&client, request, save, &ctx).await?;
        }

        Commands::Batch { action } => match action {
            BatchCmd::Start {
                from,
                to,
                reviewers,
                watch,
            } => {
                if to < from {
                    bail!("Invalid question range {}..{}", from, to);
                }
                let request = BatchStartRequest {
                    start_id: from,
                    end_id: to,
                    ai_list: reviewers,
                };
                commands::batch_start(&client, request, poll, watch, &ctx).await?;
            }
            BatchCmd::Stop => commands::batch_stop(&client, &ctx).await?,
            BatchCmd::Watch { page } => {
                commands::batch_watch(&client, page.max(1), poll, &ctx).await?;
            }
        },

        Commands::Knowledge { action } => match action {
            KnowledgeCmd::Collections => commands::knowledge_collections(&client, &ctx).await?,
            KnowledgeCmd::List {
                collection,
                page,
                page_size,
                filters,
            } => {
                let query = KnowledgeQuery {
                    collection_name: collection,
                    page: page.max(1),
                    page_size: page_size.max(1),
                    filters: filters.into_iter().collect(),
                };
                commands::knowledge_list(&client, query, &ctx).await?;
            }
            KnowledgeCmd::Save {
                content,
                collection,
                id,
                source_file,
                levels,
            } => {
                let draft = KnowledgeDraft {
                    doc_id: id,
                    ..KnowledgeDraft::new(collection, content, source_file, &levels)
                };
                commands::knowledge_save(&client, draft, &ctx).await?;
            }
            KnowledgeCmd::Delete { doc_id, collection } => {
                commands::knowledge_delete(&client, &collection, &doc_id, &ctx).await?;
            }
        },

        Commands::Audit { action } => match action {
            AuditCmd::Ranges { book_id } => commands::audit_ranges(&client, book_id, &ctx).await?,
            AuditCmd::List { book_id, range } => {
                commands::audit_list(&client, book_id, range, &ctx).await?;
            }
            AuditCmd::Save {
                book_id,
                content,
                id,
                levels,
            } => {
                let draft = FragmentDraft {
                    fragment_id: id,
                    ..FragmentDraft::new(book_id, content, &levels)
                };
                commands::audit_save(&client, draft, &ctx).await?;
            }
            AuditCmd::Delete { fragment_id } => {
                commands::audit_delete(&client, fragment_id, &ctx).await?;
            }
            AuditCmd::Embed { ids, book, range } => {
                let selection = match book {
                    Some(book_id) => EmbedSelection::Pending { book_id, range },
                    None => EmbedSelection::Ids(ids),
                };
                commands::audit_embed(&client, selection, &ctx).await?;
            }
        },

        Commands::Search { action } => match action {
            SearchCmd::Query { text, level } => {
                commands::search(&client, &text, level.as_deref(), &ctx).await?;
            }
            SearchCmd::Update { id, content } => {
                commands::search_update(&client, &id, &content, &ctx).await?;
            }
        },

        Commands::Settings { action } => match action {
            SettingsCmd::Get { key } => commands::settings_get(&client, &key, &ctx).await?,
            SettingsCmd::Set { key, value } => {
                commands::settings_set(&client, &key, &value, &ctx).await?;
            }
            SettingsCmd::Collections { names, none } => {
                if names.is_empty() && !none {
                    // No names: show the current selection
                    commands::settings_get(&client, SEARCH_COLLECTIONS_KEY, &ctx).await?;
                } else {
                    commands::settings_collections(&client, names, none, &ctx).await?;
                }
            }
        },

        Commands::Logs { action } => match action {
            LogsCmd::List { errors } => commands::logs_list(&client, errors, &ctx).await?,
            LogsCmd::Clear => commands::logs_clear(&client, &ctx).await?,
        },
    }

    Ok(())
}

/// Create a client for the configured server and endpoints
fn create_client(merged: &MergedConfig) -> Result<QbankClient> {
    QbankClient::new(&merged.server)
        .map(|client| client.with_endpoints(merged.endpoints.clone()))
        .context("Failed to create qbank client")
}

/// Parse a `KEY=VALUE` argument
fn parse_key_value(arg: &str) -> std::result::Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", arg)),
    }
}

/// Parse a `LETTER=TEXT` option argument
fn parse_option(arg: &str) -> std::result::Result<(char, String), String> {
    let (key, text) = parse_key_value(arg)?;
    let mut letters = key.chars();
    match (letters.next(), letters.next()) {
        (Some(letter), None) if letter.is_ascii_alphabetic() => {
            Ok((letter.to_ascii_uppercase(), text))
        }
        _ => Err(format!("expected an option letter, got '{}'", key)),
    }
}
