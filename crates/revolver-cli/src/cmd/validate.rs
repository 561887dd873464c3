use crate::output::{print_json, Table};
use anyhow::Context;
use revolver_core::provider::ProviderRegistry;
use revolver_core::schema;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ProviderEntry {
    provider: String,
    summary: String,
}

#[derive(Serialize)]
struct RotationEntry {
    name: String,
    from: ProviderEntry,
    to: Vec<ProviderEntry>,
}

pub fn run(config: &Path, json: bool) -> anyhow::Result<()> {
    let registry = ProviderRegistry::with_builtin();
    let rotations = schema::load_rotations_file(config, &registry)
        .with_context(|| format!("failed to load rotations from {}", config.display()))?;

    let entries: Vec<RotationEntry> = rotations
        .iter()
        .map(|r| RotationEntry {
            name: r.name.clone(),
            from: ProviderEntry {
                provider: r.source.provider.clone(),
                summary: r.source.operator.summary(),
            },
            to: r
                .sinks
                .iter()
                .map(|s| ProviderEntry {
                    provider: s.provider.clone(),
                    summary: s.operator.summary(),
                })
                .collect(),
        })
        .collect();

    if json {
        return print_json(&entries);
    }
    let mut table = Table::new(["ROTATION", "PROVIDER", "SUMMARY"]);
    for entry in &entries {
        table.push([
            entry.name.clone(),
            format!("From/{}", entry.from.provider),
            entry.from.summary.clone(),
        ]);
        for sink in &entry.to {
            table.push([
                String::new(),
                format!("To/{}", sink.provider),
                sink.summary.clone(),
            ]);
        }
    }
    if table.is_empty() {
        println!("No rotations defined.");
        return Ok(());
    }
    table.print()
}

