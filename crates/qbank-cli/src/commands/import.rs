//! Import command - run one import step of a book and follow its log

use anyhow::Result;
use qbank_client::{Control, ImportStep, QbankClient};

use super::{books_list, conclude, open_region, render};
use crate::output::OutputContext;

/// Run an import step and stream its log
pub async fn import(
    client: &QbankClient,
    step: ImportStep,
    book_id: i64,
    ctx: &OutputContext,
) -> Result<()> {
    ctx.watch_interrupts();
    ctx.info(&format!("Starting {} for book {}", step.label(), book_id));

    let control = Control::new();
    let mut region = open_region(&control, &format!("Running {}...", step.label()), ctx)?;
    let summary = render(client.run_import(step, book_id).await, &mut region, ctx).await;
    drop(region);

    // A terminal outcome changes the book's counters
    if summary.outcome.is_some() && !ctx.is_json() && !ctx.quiet {
        println!();
        books_list(client, ctx).await?;
    }

    conclude(&summary, &format!("{} of book {}", step.label(), book_id), ctx)
}
