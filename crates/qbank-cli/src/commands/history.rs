//! History command - show stored reviews of a question

use anyhow::{bail, Result};
use qbank_client::{QbankClient, ReviewSession, Reviewer};

use crate::output::{print_review, OutputContext, ReviewRow};

/// Show the review history of a question, or one record of it
pub async fn history(
    client: &QbankClient,
    question_id: i64,
    reviewer: Option<Reviewer>,
    index: Option<usize>,
    ctx: &OutputContext,
) -> Result<()> {
    let mut session = ReviewSession::new(question_id);
    client.refresh_session(&mut session).await?;

    if let Some(index) = index {
        let reviewer = reviewer.unwrap_or(Reviewer::Dingchun);
        let Some(record) = session.select(reviewer, index) else {
            bail!(
                "No review #{} by {} for question {}",
                index,
                reviewer,
                question_id
            );
        };
        print_review(reviewer.as_str(), record, ctx);
        return Ok(());
    }

    let reviewers: Vec<Reviewer> = match reviewer {
        Some(r) => vec![r],
        None => Reviewer::ALL.to_vec(),
    };
    let rows = history_rows(&session, &reviewers);
    ctx.print(&rows);
    Ok(())
}

fn history_rows(session: &ReviewSession, reviewers: &[Reviewer]) -> Vec<ReviewRow> {
    reviewers
        .iter()
        .flat_map(|&reviewer| {
            session
                .history(reviewer)
                .iter()
                .enumerate()
                .map(move |(index, record)| ReviewRow {
                    reviewer: reviewer.to_string(),
                    index,
                    time: record.review_time.clone().unwrap_or_default(),
                    result: record.review_result.clone(),
                })
        })
        .collect()
}
