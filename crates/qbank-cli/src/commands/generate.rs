//! Generate command - stream AI question generation

use anyhow::Result;
use qbank_client::{Control, GenerationRequest, QbankClient};

use super::{conclude, open_region, render};
use crate::output::OutputContext;

/// Generate questions on a topic, optionally saving every finished one
pub async fn generate(
    client: &QbankClient,
    request: GenerationRequest,
    save: bool,
    ctx: &OutputContext,
) -> Result<()> {
    ctx.watch_interrupts();
    ctx.info(&format!(
        "Generating {} question(s) on '{}'",
        request.question_count, request.topic
    ));

    let control = Control::new();
    let mut region = open_region(&control, "Agent is working...", ctx)?;
    let summary = render(client.generate(&request).await, &mut region, ctx).await;
    drop(region);

    if save {
        let mut saved = 0;
        for question in &summary.questions {
            match client.save_question(question).await {
                Ok(_) => saved += 1,
                Err(e) => ctx.error(&format!("Could not save question: {}", e)),
            }
        }
        ctx.success(&format!(
            "Saved {} of {} question(s)",
            saved,
            summary.questions.len()
        ));
    }

    conclude(&summary, "Generation", ctx)
}
