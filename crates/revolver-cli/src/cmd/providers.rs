use crate::output::{print_json, Table};
use revolver_core::provider::{ProviderKind, ProviderRegistry};
use serde::Serialize;

#[derive(Serialize)]
struct ProviderRow<'a> {
    kind: ProviderKind,
    name: &'a str,
}

pub fn run(json: bool) -> anyhow::Result<()> {
    let registry = ProviderRegistry::with_builtin();
    let rows: Vec<ProviderRow<'_>> = registry
        .source_names()
        .map(|name| ProviderRow {
            kind: ProviderKind::Source,
            name,
        })
        .chain(registry.sink_names().map(|name| ProviderRow {
            kind: ProviderKind::Sink,
            name,
        }))
        .collect();

    if json {
        return print_json(&rows);
    }
    let mut table = Table::new(["KIND", "NAME"]);
    for row in &rows {
        table.push([row.kind.as_str(), row.name]);
    }
    table.print()
}
