use agentrace_config::Config;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use super::common::print_json;

#[derive(Serialize)]
struct ConfigEntry {
    value: String,
    source: String,
}

/// Print every effective setting with its source (cli, env, config, programmatic, default).
pub fn execute_config_command(config: &Config, json: bool) -> Result<()> {
    let effective = config.effective_config();

    if json {
        let entries: BTreeMap<String, ConfigEntry> = effective
            .into_iter()
            .map(|(key, (value, source))| (key, ConfigEntry { value, source }))
            .collect();
        return print_json(&entries);
    }

    let width = effective.keys().map(String::len).max().unwrap_or(0);
    for (key, (value, source)) in &effective {
        println!("{key:<width$}  {value}  [{source}]");
    }
    Ok(())
}
