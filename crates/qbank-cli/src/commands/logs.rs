//! System log commands

use anyhow::Result;
use qbank_client::{QbankClient, SystemLog};

use crate::output::{truncate, LogRow, OutputContext};

impl From<&SystemLog> for LogRow {
    fn from(log: &SystemLog) -> Self {
        Self {
            time: log.create_time.clone(),
            log_type: log.log_type.clone(),
            source: log.source.clone(),
            message: truncate(&log.message, 80),
        }
    }
}

/// List the server's system logs, newest first as the server sends them
pub async fn logs_list(client: &QbankClient, errors_only: bool, ctx: &OutputContext) -> Result<()> {
    let logs = client.system_logs().await?;
    let rows: Vec<LogRow> = logs
        .iter()
        .filter(|log| !errors_only || log.is_error())
        .map(LogRow::from)
        .collect();
    ctx.print(&rows);

    let errors = logs.iter().filter(|log| log.is_error()).count();
    if errors > 0 && !ctx.is_json() {
        ctx.warn(&format!("{} error entries", errors));
    }
    Ok(())
}

pub async fn logs_clear(client: &QbankClient, ctx: &OutputContext) -> Result<()> {
    client.clear_system_logs().await?;
    ctx.success("System logs cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_log_row() {
        let log: SystemLog = serde_json::from_str(
            r#"{"log_type":"error","source":"import","message":null,"create_time":"2024-05-01 10:00"}"#,
        )
        .unwrap();
        let row = LogRow::from(&log);
        assert_eq!(row.log_type, "error");
        assert_eq!(row.message, "");
        assert_eq!(row.time, "2024-05-01 10:00");
    }
}
