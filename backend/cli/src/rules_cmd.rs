//! Rule administration: `cadence rules add | list | remove`.

use anyhow::{Context, Result};
use clap::Subcommand;

use cadence_core::{ActivityRule, ChannelId, ChannelScope, NewRule, RoleId, RuleId, RuleSource, ServerId};
use cadence_scheduler::parse_period;
use cadence_store::Database;

use crate::terminal_output::{note_success, note_warn, render_table, Column};

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a rule: grant a role after enough messages within a period
    Add {
        /// Server (guild) id
        #[arg(long)]
        server: u64,
        /// Role granted when the threshold is reached
        #[arg(long)]
        role: u64,
        /// Messages required within the period
        #[arg(long)]
        count: u32,
        /// Trailing window, e.g. `3600`, `90m`, `1h30m`, `7d`
        #[arg(long)]
        period: String,
        /// Channel to count; repeat for several. Omit to count all channels
        #[arg(long = "channel")]
        channels: Vec<u64>,
    },
    /// List rules
    List {
        /// Only rules for this server
        #[arg(long)]
        server: Option<u64>,
    },
    /// Remove a rule by id
    Remove { rule_id: i64 },
}

pub async fn run(db: &Database, cmd: RulesCommands) -> Result<()> {
    let store = db.rules();
    match cmd {
        RulesCommands::Add {
            server,
            role,
            count,
            period,
            channels,
        } => {
            let new_rule = build_rule(server, role, count, &period, &channels)?;
            let rule = store.create_rule(new_rule).await.context("Failed to add rule")?;
            note_success(&format!(
                "Added rule {} ({} messages in {} → role {})",
                rule.rule_id,
                rule.message_count,
                format_period(rule.time_period),
                rule.role_id
            ));
        }
        RulesCommands::List { server } => {
            let rules = match server {
                Some(id) => store.list_rules_for_server(ServerId(id)).await?,
                None => store.list_rules().await?,
            };
            if rules.is_empty() {
                note_warn("No rules configured");
            } else {
                print!("{}", rules_table(&rules));
            }
        }
        RulesCommands::Remove { rule_id } => {
            if store.delete_rule(RuleId(rule_id)).await? {
                note_success(&format!("Removed rule {rule_id}"));
            } else {
                anyhow::bail!("No rule with id {rule_id}");
            }
        }
    }
    Ok(())
}

/// Build a validated rule from command-line arguments.
pub fn build_rule(
    server: u64,
    role: u64,
    count: u32,
    period: &str,
    channels: &[u64],
) -> Result<NewRule> {
    let time_period = parse_period(period)?;
    let channel_scope = if channels.is_empty() {
        ChannelScope::AllChannels
    } else {
        ChannelScope::explicit(channels.iter().copied().map(ChannelId))?
    };
    let rule = NewRule {
        server_id: ServerId(server),
        time_period,
        role_id: RoleId(role),
        message_count: count,
        channel_scope,
    };
    rule.validate()?;
    Ok(rule)
}

/// Render seconds in the largest units that divide it, e.g. `1h30m`.
pub fn format_period(secs: u64) -> String {
    const UNITS: [(u64, &str); 5] = [(604_800, "w"), (86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];
    if secs == 0 {
        return "0s".to_string();
    }
    let mut rest = secs;
    let mut out = String::new();
    for (size, unit) in UNITS {
        if rest >= size {
            out.push_str(&format!("{}{unit}", rest / size));
            rest %= size;
        }
    }
    out
}

fn rules_table(rules: &[ActivityRule]) -> String {
    let columns = [
        Column::right("Id"),
        Column::left("Server"),
        Column::left("Role"),
        Column::right("Messages"),
        Column::right("Period"),
        Column::left("Channels"),
    ];
    let rows: Vec<Vec<String>> = rules
        .iter()
        .map(|r| {
            vec![
                r.rule_id.to_string(),
                r.server_id.to_string(),
                r.role_id.to_string(),
                r.message_count.to_string(),
                format_period(r.time_period),
                r.channel_scope.to_string(),
            ]
        })
        .collect();
    render_table(&columns, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rule_all_channels() {
        let rule = build_rule(1, 10, 5, "1h", &[]).unwrap();
        assert_eq!(rule.time_period, 3_600);
        assert_eq!(rule.channel_scope, ChannelScope::AllChannels);
    }

    #[test]
    fn test_build_rule_explicit_channels_deduplicated() {
        let rule = build_rule(1, 10, 5, "90m", &[7, 8, 7]).unwrap();
        match rule.channel_scope {
            ChannelScope::Explicit(set) => assert_eq!(set.len(), 2),
            other => panic!("unexpected scope: {other:?}"),
        }
    }

    #[test]
    fn test_build_rule_rejects_bad_input() {
        assert!(build_rule(1, 10, 0, "1h", &[]).is_err());
        assert!(build_rule(1, 10, 5, "0", &[]).is_err());
        assert!(build_rule(1, 10, 5, "soon", &[]).is_err());
    }

    #[test]
    fn test_format_period() {
        assert_eq!(format_period(3_600), "1h");
        assert_eq!(format_period(5_400), "1h30m");
        assert_eq!(format_period(90), "1m30s");
        assert_eq!(format_period(691_200), "1w1d");
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let db = Database::in_memory().unwrap();
        run(
            &db,
            RulesCommands::Add {
                server: 1,
                role: 10,
                count: 3,
                period: "1d".to_string(),
                channels: vec![7],
            },
        )
        .await
        .unwrap();

        let rules = db.rules().list_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        let table = rules_table(&rules);
        assert!(table.contains("1d"));

        let id = rules[0].rule_id.0;
        run(&db, RulesCommands::Remove { rule_id: id }).await.unwrap();
        assert!(db.rules().list_rules().await.unwrap().is_empty());
        assert!(run(&db, RulesCommands::Remove { rule_id: id }).await.is_err());
    }
}
