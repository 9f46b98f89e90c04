//! Questions commands - browse and delete stored questions

use anyhow::{anyhow, bail, Context, Result};
use qbank_client::{QbankClient, QuestionEdit, QuestionQuery, QuestionSummary, Reviewer};

use crate::output::{truncate, OutputContext, OutputFormat, QuestionRow};

fn review_cell(question: &QuestionSummary, reviewer: Reviewer) -> String {
    question.status_for(reviewer).unwrap_or("-").to_string()
}

impl From<QuestionSummary> for QuestionRow {
    fn from(q: QuestionSummary) -> Self {
        Self {
            dingchun: review_cell(&q, Reviewer::Dingchun),
            qwen: review_cell(&q, Reviewer::Qwen),
            kimi: review_cell(&q, Reviewer::Kimi),
            doubao: review_cell(&q, Reviewer::Doubao),
            id: q.question_id,
            question_type: q.question_type.unwrap_or_default(),
            stem: truncate(&q.stem, 40),
        }
    }
}

/// List one page of questions
pub async fn questions_list(
    client: &QbankClient,
    query: QuestionQuery,
    ctx: &OutputContext,
) -> Result<()> {
    let page = client.list_questions(&query).await?;
    let total = page.total;
    let rows: Vec<QuestionRow> = page.data.into_iter().map(QuestionRow::from).collect();

    ctx.print(&rows);
    let pages = total.div_ceil(u64::from(query.page_size.max(1))).max(1);
    if ctx.format == OutputFormat::Table {
        ctx.info(&format!("Page {} of {} ({} questions)", query.page, pages, total));
    }
    Ok(())
}

/// Delete a question
pub async fn questions_delete(
    client: &QbankClient,
    question_id: i64,
    ctx: &OutputContext,
) -> Result<()> {
    client.delete_question(question_id).await?;
    ctx.success(&format!("Deleted question {}", question_id));
    Ok(())
}

/// Import raw question text; the server splits it into questions
pub async fn questions_add(
    client: &QbankClient,
    raw_text: &str,
    source: &str,
    ctx: &OutputContext,
) -> Result<()> {
    if raw_text.trim().is_empty() {
        bail!("Nothing to import");
    }
    let import = client.add_questions(raw_text, source).await?;
    match import.count {
        Some(count) => ctx.success(&format!("Imported {} questions from '{}'", count, source)),
        None => ctx.success(import.msg.as_deref().unwrap_or("Questions imported")),
    }
    Ok(())
}

/// Field changes for one stored question
#[derive(Debug, Default)]
pub struct QuestionChanges {
    pub stem: Option<String>,
    pub answer: Option<String>,
    pub analysis: Option<String>,
    /// `(letter, text)`; empty text removes the option
    pub options: Vec<(char, String)>,
}

impl QuestionChanges {
    fn is_empty(&self) -> bool {
        self.stem.is_none()
            && self.answer.is_none()
            && self.analysis.is_none()
            && self.options.is_empty()
    }

    fn apply(self, edit: &mut QuestionEdit) -> Result<()> {
        if let Some(stem) = self.stem {
            edit.stem = stem;
        }
        if let Some(answer) = self.answer {
            edit.answer = Some(answer.trim().to_uppercase());
        }
        if let Some(analysis) = self.analysis {
            edit.analysis = Some(analysis);
        }
        for (letter, text) in self.options {
            edit.set_option(letter, &text).map_err(|e| anyhow!(e))?;
        }
        Ok(())
    }
}

/// Edit a stored question, keeping every field not changed
pub async fn questions_update(
    client: &QbankClient,
    question_id: i64,
    changes: QuestionChanges,
    ctx: &OutputContext,
) -> Result<()> {
    if changes.is_empty() {
        bail!("Nothing to change");
    }
    let stored = client
        .find_question(question_id)
        .await?
        .with_context(|| format!("Question {} not found", question_id))?;

    let mut edit = QuestionEdit::from_summary(&stored);
    changes.apply(&mut edit)?;
    let message = client.update_question(&edit).await?;
    ctx.success(&message.unwrap_or_else(|| format!("Updated question {}", question_id)));
    Ok(())
}
