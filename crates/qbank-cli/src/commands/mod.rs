//! Command implementations for qbank

pub mod audit;
pub mod batch;
pub mod books;
pub mod compare;
pub mod generate;
pub mod history;
pub mod import;
pub mod knowledge;
pub mod logs;
pub mod questions;
pub mod review;
pub mod search;
pub mod settings;

pub use audit::{audit_delete, audit_embed, audit_list, audit_ranges, audit_save, EmbedSelection};
pub use batch::{batch_start, batch_stop, batch_watch};
pub use books::{books_delete, books_list, books_save};
pub use compare::{compare, CompareSource};
pub use generate::generate;
pub use history::history;
pub use import::import;
pub use knowledge::{knowledge_collections, knowledge_delete, knowledge_list, knowledge_save};
pub use logs::{logs_clear, logs_list};
pub use questions::{
    questions_add, questions_delete, questions_list, questions_update, QuestionChanges,
};
pub use review::review;
pub use search::{search, search_update};
pub use settings::{settings_collections, settings_get, settings_set};

use anyhow::{bail, Result};
use futures::StreamExt;
use qbank_client::streaming::EventStream;
use qbank_client::{render_failure, render_stream, Control, RenderSummary, Termination};

use crate::output::{OutputContext, TerminalRegion};

/// Claim the control for a streaming action and show the loading spinner
pub(crate) fn open_region(
    control: &Control,
    message: &str,
    ctx: &OutputContext,
) -> Result<TerminalRegion> {
    let Some(guard) = control.try_acquire() else {
        bail!("Another request is still running");
    };
    Ok(TerminalRegion::new(ctx, message, guard))
}

/// Render an opened (or failed) stream into the region.
///
/// In JSON mode every event is echoed as one line. Ctrl+C ends the stream
/// and discards what is left.
pub(crate) async fn render(
    opened: qbank_client::Result<EventStream>,
    region: &mut TerminalRegion,
    ctx: &OutputContext,
) -> RenderSummary {
    let events = match opened {
        Ok(events) => events,
        Err(e) => return render_failure(&e, region),
    };

    let json = ctx.is_json();
    let events = events
        .inspect(|item| {
            if let (true, Ok(event)) = (json, item) {
                ctx.print_json_line(event);
            }
        })
        .take_until(ctx.interrupt_signal());

    render_stream(events, region).await
}

/// Turn a render summary into the command result
pub(crate) fn conclude(summary: &RenderSummary, what: &str, ctx: &OutputContext) -> Result<()> {
    match &summary.termination {
        Termination::Discarded => {
            ctx.warn(&format!("{} interrupted; remaining output discarded", what));
            Ok(())
        }
        _ if summary.is_success() => Ok(()),
        _ => bail!("{} failed", what),
    }
}
