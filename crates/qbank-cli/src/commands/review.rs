//! Review command - run AI reviewers on one question

use anyhow::{bail, Result};
use qbank_client::{Control, QbankClient, ReviewRecord, ReviewSession, Reviewer};
use tracing::warn;

use super::{conclude, open_region, render};
use crate::output::{print_review, verdict_label, OutputContext, OutputFormat};

/// Review a question with each reviewer in turn, then show the latest verdicts
pub async fn review(
    client: &QbankClient,
    question_id: i64,
    reviewers: &[Reviewer],
    ctx: &OutputContext,
) -> Result<()> {
    let reviewers: &[Reviewer] = if reviewers.is_empty() {
        &Reviewer::ALL
    } else {
        reviewers
    };
    if reviewers.iter().any(Reviewer::is_streamed) {
        ctx.watch_interrupts();
    }

    let control = Control::new();
    let mut failed = Vec::new();

    for &reviewer in reviewers {
        if ctx.is_interrupted() {
            break;
        }
        match run_reviewer(client, &control, reviewer, question_id, ctx).await {
            Ok(Some(record)) => print_review(reviewer.as_str(), &record, ctx),
            Ok(None) => {}
            Err(e) => {
                ctx.error(&format!("{}: {}", reviewer, e));
                failed.push(reviewer);
            }
        }
    }

    let mut session = ReviewSession::new(question_id);
    match client.refresh_session(&mut session).await {
        Ok(()) => print_latest(&session, reviewers, ctx),
        Err(e) => warn!("Could not refresh review history: {}", e),
    }

    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(Reviewer::as_str).collect();
        bail!("Review failed for {}", names.join(", "));
    }
    Ok(())
}

async fn run_reviewer(
    client: &QbankClient,
    control: &Control,
    reviewer: Reviewer,
    question_id: i64,
    ctx: &OutputContext,
) -> Result<Option<ReviewRecord>> {
    if !reviewer.is_streamed() {
        ctx.info(&format!("Reviewing question {} with {}...", question_id, reviewer));
        return Ok(Some(client.review(reviewer, question_id).await?));
    }

    let mut region = open_region(control, &format!("Reviewing with {}...", reviewer), ctx)?;
    let summary = render(client.review_stream(question_id).await, &mut region, ctx).await;
    drop(region);

    conclude(&summary, "Streamed review", ctx)?;
    Ok(summary.outcome.as_ref().and_then(|o| o.to_review_record()))
}

fn print_latest(session: &ReviewSession, reviewers: &[Reviewer], ctx: &OutputContext) {
    if ctx.format != OutputFormat::Table || ctx.quiet {
        return;
    }
    println!();
    for &reviewer in reviewers {
        match session.latest(reviewer) {
            Some(record) => println!(
                "{:<10} {} ({} reviews)",
                reviewer.as_str(),
                verdict_label(record),
                session.history(reviewer).len()
            ),
            None => println!("{:<10} -", reviewer.as_str()),
        }
    }
}
