use anyhow::Result;
use serde::Serialize;

use codepair_core::services::decompiler::default_decompiler_registry;
use codepair_core::services::extractor::default_extractor_registry;

#[derive(Debug, Serialize)]
pub struct RegistryEntry {
    pub name: String,
    pub description: String,
}

fn extractor_description(name: &str) -> String {
    match name {
        "c" => "C sources (*.c, *.h) parsed with tree-sitter-c".to_string(),
        other => format!("Extractor '{}'", other),
    }
}

fn decompiler_description(name: &str) -> String {
    match name {
        "ghidra" => {
            "Ghidra headless (requires GHIDRA_HEADLESS, GHIDRA_INSTALL_DIR, or ghidra.headless_path)"
                .to_string()
        }
        other => format!("Decompiler '{}'", other),
    }
}

fn print_entries(title: &str, entries: &[RegistryEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{title}: (none)");
        return Ok(());
    }

    println!("{title}:");
    for entry in entries {
        println!("- {}: {}", entry.name, entry.description);
    }
    Ok(())
}

/// List the languages the built-in extractor registry supports.
pub fn list_extractors_command(json: bool) -> Result<()> {
    let entries: Vec<RegistryEntry> = default_extractor_registry()
        .names()
        .into_iter()
        .map(|name| RegistryEntry { description: extractor_description(&name), name })
        .collect();
    print_entries("Extractors", &entries, json)
}

/// List the decompilers that can be named in the pipeline config.
pub fn list_decompilers_command(json: bool) -> Result<()> {
    let entries: Vec<RegistryEntry> = default_decompiler_registry()
        .names()
        .into_iter()
        .map(|name| RegistryEntry { description: decompiler_description(&name), name })
        .collect();
    print_entries("Decompilers", &entries, json)
}
