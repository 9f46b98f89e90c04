//! Incremental rendering of streamed events
//!
//! The renderer applies exactly one effect per [`ApplicationEvent`] to a
//! [`Region`], in the order the events arrive. It never fails: transport
//! errors become an error entry, and cleanup (placeholder removal, control
//! release) runs on every exit path.

use std::fmt;

use futures::stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::streaming::{ApplicationEvent, ComparisonRecord, StreamResult, TaskOutcome};
use crate::types::GeneratedQuestion;

/// Pane a text line is appended to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    /// Progress and log lines
    Log,
    /// Retrieved knowledge snippets
    Snippet,
}

/// One result unit appended to the results area
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultUnit<'a> {
    Comparison(&'a ComparisonRecord),
    Question(&'a GeneratedQuestion),
}

/// Status indicator of a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderStatus {
    /// Stream signalled completion
    Completed,
    /// Stream ended; `items` result units were rendered
    Finished { items: usize },
    /// Stream failed
    Aborted,
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderStatus::Completed => write!(f, "completed"),
            RenderStatus::Finished { items } => write!(f, "completed, {} items", items),
            RenderStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Output surface of one streaming call site
pub trait Region {
    /// A closed region (navigated away, detached) receives no more effects
    fn is_closed(&self) -> bool {
        false
    }

    /// Remove the loading placeholder
    fn clear_placeholder(&mut self);

    fn append_line(&mut self, pane: Pane, text: &str);

    fn append_result(&mut self, index: usize, unit: ResultUnit<'_>);

    fn append_error(&mut self, message: &str);

    fn show_success(&mut self, message: &str);

    fn set_status(&mut self, status: &RenderStatus);

    /// Keep the newest line visible
    fn scroll_to(&mut self, _position: usize) {}

    /// Re-enable the control that started the stream
    fn release(&mut self) {}
}

/// Per-call render state; never shared between calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderState {
    pub events: usize,
    pub results: usize,
    pub placeholder_cleared: bool,
    pub scroll_hint: usize,
}

/// How a render call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Body ended normally
    Completed,
    /// SSE `[DONE]` sentinel
    Done,
    /// Connection or read failure
    TransportFailed(String),
    /// The region closed while streaming
    Discarded,
}

/// What a render call did, for follow-up actions
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub events: usize,
    pub results: usize,
    pub errors: usize,
    /// Terminal outcome of a prefixed-log stream
    pub outcome: Option<TaskOutcome>,
    /// Questions delivered by completion events
    pub questions: Vec<GeneratedQuestion>,
    pub termination: Termination,
}

impl RenderSummary {
    fn new() -> Self {
        Self {
            events: 0,
            results: 0,
            errors: 0,
            outcome: None,
            questions: Vec::new(),
            termination: Termination::Completed,
        }
    }

    /// Whether the stream ended without a transport failure or an error outcome
    pub fn is_success(&self) -> bool {
        let outcome_ok = self.outcome.as_ref().map_or(true, TaskOutcome::is_success);
        outcome_ok && matches!(self.termination, Termination::Completed | Termination::Done)
    }
}

/// Applies events to one region
pub struct Renderer<'r, R: Region + ?Sized> {
    region: &'r mut R,
    state: RenderState,
    summary: RenderSummary,
}

impl<'r, R: Region + ?Sized> Renderer<'r, R> {
    pub fn new(region: &'r mut R) -> Self {
        Self {
            region,
            state: RenderState::default(),
            summary: RenderSummary::new(),
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Apply the effect of one event
    pub fn apply(&mut self, event: ApplicationEvent) {
        if self.region.is_closed() {
            debug!("Region closed, discarding {} event", event.name());
            return;
        }

        self.state.events += 1;
        self.summary.events += 1;
        self.clear_placeholder();

        match event {
            ApplicationEvent::Log(text) | ApplicationEvent::Process(text) => {
                self.line(Pane::Log, &text);
            }
            ApplicationEvent::Snippet(text) => self.line(Pane::Snippet, &text),
            ApplicationEvent::Record(record) => {
                let index = self.next_result();
                self.region
                    .append_result(index, ResultUnit::Comparison(&record));
            }
            ApplicationEvent::Completion(completion) => match completion.question {
                Some(question) => {
                    let index = self.next_result();
                    self.region
                        .append_result(index, ResultUnit::Question(&question));
                    self.summary.questions.push(question);
                }
                None => self.line(Pane::Log, &format!("completion: {}", completion.status)),
            },
            ApplicationEvent::Failure(message) => self.error(&message),
            ApplicationEvent::Outcome(outcome) => {
                if outcome.is_success() {
                    let message = outcome.msg.as_deref().unwrap_or("task finished");
                    self.region.show_success(message);
                } else {
                    self.error(&outcome.error_message());
                }
                self.summary.outcome = Some(outcome);
            }
            ApplicationEvent::Done => {
                self.summary.termination = Termination::Done;
                self.region.set_status(&RenderStatus::Completed);
            }
        }
    }

    /// Consume a stream to its end, then clean up
    pub async fn run<S>(mut self, mut events: S) -> RenderSummary
    where
        S: Stream<Item = StreamResult<ApplicationEvent>> + Unpin,
    {
        while let Some(item) = events.next().await {
            if self.region.is_closed() {
                debug!("Region closed, cancelling stream");
                self.summary.termination = Termination::Discarded;
                break;
            }
            match item {
                Ok(event) => self.apply(event),
                Err(e) => {
                    warn!("Stream aborted: {}", e);
                    self.fail(&e.to_string());
                    break;
                }
            }
        }
        drop(events);

        if self.region.is_closed() && self.summary.termination == Termination::Completed {
            self.summary.termination = Termination::Discarded;
        }
        if self.summary.termination == Termination::Completed {
            self.clear_placeholder();
            let status = RenderStatus::Finished {
                items: self.state.results,
            };
            self.region.set_status(&status);
        }
        self.finish()
    }

    /// Record a failure that ended the stream
    pub fn fail(&mut self, message: &str) {
        self.summary.termination = Termination::TransportFailed(message.to_string());
        if self.region.is_closed() {
            return;
        }
        self.clear_placeholder();
        self.error(message);
        self.region.set_status(&RenderStatus::Aborted);
    }

    /// Run cleanup and return the summary
    pub fn finish(mut self) -> RenderSummary {
        if !self.region.is_closed() {
            self.clear_placeholder();
        }
        self.region.release();
        self.summary
    }

    fn clear_placeholder(&mut self) {
        if !self.state.placeholder_cleared {
            self.state.placeholder_cleared = true;
            self.region.clear_placeholder();
        }
    }

    fn line(&mut self, pane: Pane, text: &str) {
        self.region.append_line(pane, text);
        self.state.scroll_hint += 1;
        self.region.scroll_to(self.state.scroll_hint);
    }

    fn next_result(&mut self) -> usize {
        let index = self.state.results;
        self.state.results += 1;
        self.summary.results += 1;
        index
    }

    fn error(&mut self, message: &str) {
        self.summary.errors += 1;
        self.region.append_error(message);
    }
}

/// Render a stream into a region with fresh state
pub async fn render_stream<S, R>(events: S, region: &mut R) -> RenderSummary
where
    S: Stream<Item = StreamResult<ApplicationEvent>> + Unpin,
    R: Region + ?Sized,
{
    Renderer::new(region).run(events).await
}

/// Render a stream that failed to open
pub fn render_failure<R>(error: &dyn fmt::Display, region: &mut R) -> RenderSummary
where
    R: Region + ?Sized,
{
    let mut renderer = Renderer::new(region);
    renderer.fail(&error.to_string());
    renderer.finish()
}
