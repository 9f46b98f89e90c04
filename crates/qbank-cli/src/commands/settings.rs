//! Settings commands - server-side configuration keys

use anyhow::{bail, Result};
use qbank_client::QbankClient;
use serde_json::Value;

use crate::output::OutputContext;

/// Show the value stored under a configuration key
pub async fn settings_get(client: &QbankClient, key: &str, ctx: &OutputContext) -> Result<()> {
    match client.get_config(key).await? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => ctx.info(&format!("'{}' is not set", key)),
    }
    Ok(())
}

/// Store a configuration value; text that is not JSON is saved as a string
pub async fn settings_set(
    client: &QbankClient,
    key: &str,
    raw: &str,
    ctx: &OutputContext,
) -> Result<()> {
    let value = parse_value(raw);
    let message = client.save_config(key, &value).await?;
    ctx.success(&message.unwrap_or_else(|| format!("Saved '{}'", key)));
    Ok(())
}

/// Replace the collections searched by smart search
pub async fn settings_collections(
    client: &QbankClient,
    collections: Vec<String>,
    none: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let collections: Vec<String> = collections
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if collections.is_empty() && !none {
        bail!("No collection given; pass --none to disable search on every collection");
    }

    client.set_search_collections(&collections).await?;
    if collections.is_empty() {
        ctx.warn("Search is now disabled on every collection");
    } else {
        ctx.success(&format!("Searching {}", collections.join(", ")));
    }
    Ok(())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(r#"["a","b"]"#), json!(["a", "b"]));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("中国药典"), json!("中国药典"));
    }
}
