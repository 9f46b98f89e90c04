//! Batch commands - start, stop and watch batch reviews

use anyhow::{Context, Result};
use qbank_client::batch::Snapshot;
use qbank_client::{
    BatchMonitor, BatchStartRequest, MonitorState, PollConfig, ProgressRow, QbankClient, Reviewer,
};

use crate::output::{truncate, OutputContext, OutputFormat, ProgressView};

fn state_cell(row: &ProgressRow, reviewer: Reviewer) -> String {
    row.state_for(reviewer).label().to_string()
}

impl From<&ProgressRow> for ProgressView {
    fn from(row: &ProgressRow) -> Self {
        Self {
            id: row.question_id,
            stem: truncate(row.stem_preview.as_deref().unwrap_or_default(), 30),
            dingchun: state_cell(row, Reviewer::Dingchun),
            qwen: state_cell(row, Reviewer::Qwen),
            kimi: state_cell(row, Reviewer::Kimi),
            doubao: state_cell(row, Reviewer::Doubao),
        }
    }
}

/// Start a batch review, optionally following its progress
pub async fn batch_start(
    client: &QbankClient,
    request: BatchStartRequest,
    poll: PollConfig,
    watch: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let monitor = BatchMonitor::new(client.clone(), poll);
    let message = monitor
        .start(&request)
        .await
        .context("Failed to start batch review")?;
    ctx.success(&message.unwrap_or_else(|| {
        format!(
            "Batch review started for questions {}..={}",
            request.start_id, request.end_id
        )
    }));

    if watch {
        ctx.watch_interrupts();
        follow(&monitor, ctx).await;
    }
    Ok(())
}

/// Stop the running batch review
pub async fn batch_stop(client: &QbankClient, ctx: &OutputContext) -> Result<()> {
    client
        .batch_stop()
        .await
        .context("Failed to stop batch review")?;
    ctx.success("Batch review stopped");
    Ok(())
}

/// Follow the progress of a running batch review until it finishes or Ctrl+C
pub async fn batch_watch(
    client: &QbankClient,
    page: u32,
    poll: PollConfig,
    ctx: &OutputContext,
) -> Result<()> {
    let monitor = BatchMonitor::new(client.clone(), poll);
    monitor.load().await;

    for _ in 1..page {
        if !monitor.next_page().await {
            break;
        }
    }

    if monitor.state() == MonitorState::Idle {
        ctx.info("No batch review is running");
        return Ok(());
    }

    ctx.watch_interrupts();
    ctx.info("Press Ctrl+C to stop watching");
    follow(&monitor, ctx).await;
    Ok(())
}

async fn follow(monitor: &BatchMonitor<QbankClient>, ctx: &OutputContext) {
    let mut snapshots = monitor.subscribe();
    let mut interrupted = ctx.interrupt_signal();

    let current = snapshots.borrow_and_update().clone();
    print_snapshot(&current, ctx);

    while monitor.state() == MonitorState::Active {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print_snapshot(&snapshot, ctx);
                if snapshot.state == MonitorState::Idle {
                    ctx.success("Batch review finished");
                    break;
                }
            }
            _ = &mut interrupted => {
                ctx.info("Stopped watching; the batch keeps running on the server");
                break;
            }
        }
    }
}

fn print_snapshot(snapshot: &Snapshot, ctx: &OutputContext) {
    if ctx.format == OutputFormat::Json {
        ctx.print_json_line(&snapshot.progress);
        return;
    }

    if ctx.format == OutputFormat::Table && !ctx.quiet {
        let stats: Vec<String> = Reviewer::ALL
            .iter()
            .filter_map(|r| {
                snapshot
                    .progress
                    .stats
                    .get(r)
                    .map(|done| format!("{} {}/{}", r, done, snapshot.total))
            })
            .collect();
        println!();
        println!(
            "Page {}/{} | {} questions | {}",
            snapshot.page,
            snapshot.page_count(),
            snapshot.total,
            if stats.is_empty() {
                "no results yet".to_string()
            } else {
                stats.join(", ")
            }
        );
    }

    let rows: Vec<ProgressView> = snapshot.progress.rows.iter().map(ProgressView::from).collect();
    ctx.print(&rows);
}
