//! `cadence status`: query a running bot over its HTTP API.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::terminal_output::{note_error, note_success, render_table, Column};

pub async fn run(base_url: &str) -> Result<()> {
    let client = reqwest::Client::new();

    let health: Value = match client.get(format!("{base_url}/api/health")).send().await {
        Ok(resp) => resp.json().await.context("Malformed health response")?,
        Err(_) => {
            note_error(&format!("cadence is not running at {base_url}"));
            return Ok(());
        }
    };
    note_success(&format!(
        "cadence {} is {}",
        health["version"].as_str().unwrap_or("?"),
        health["status"].as_str().unwrap_or("unknown")
    ));

    let status: Value = client
        .get(format!("{base_url}/api/status"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("Malformed status response")?;
    print!("{}", status_table(&status));
    Ok(())
}

const FIELDS: [&str; 13] = [
    "cycle_number",
    "state",
    "rules",
    "eligible",
    "new",
    "granted",
    "vanished",
    "denied",
    "transient",
    "suppressed",
    "cache_size",
    "pruned",
    "timestamp",
];

fn status_table(report: &Value) -> String {
    let mut rows: Vec<Vec<String>> = FIELDS
        .iter()
        .map(|field| vec![field.to_string(), display(&report[*field])])
        .collect();
    if let Some(error) = report["error"].as_str() {
        rows.push(vec!["error".to_string(), error.to_string()]);
    }
    render_table(&[Column::left("Last cycle"), Column::left("")], &rows)
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_table_includes_error() {
        let report = json!({
            "cycle_number": 4,
            "state": "idle",
            "granted": 1,
            "pruned": null,
            "error": "storage read failed: disk I/O error",
        });
        let table = status_table(&report);
        assert!(table.contains("cycle_number  4"));
        assert!(table.contains("pruned        -"));
        assert!(table.contains("storage read failed"));
    }
}
