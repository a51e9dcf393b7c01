//! Plugins listing command

use super::registry_helper::Engine;
use anyhow::Result;

pub async fn list_plugins(engine: &Engine) -> Result<()> {
    if engine.plugins.is_empty() {
        println!(
            "No plugins registered in {}",
            engine.config.plugins_dir.display()
        );
        return Ok(());
    }

    println!("Available plugins:");

    for plugin_id in engine.plugins.plugin_ids() {
        if let Some(plugin) = engine.plugins.get_plugin(&plugin_id) {
            let manifest = plugin.manifest();
            println!("\n{} (v{})", plugin_id, manifest.version);
            if !manifest.name.is_empty() {
                println!("  Name: {}", manifest.name);
            }
            if !manifest.description.is_empty() {
                println!("  Description: {}", manifest.description);
            }
            for (tool_id, tool) in &manifest.tools {
                println!("  Tool: {}", tool_id);
                println!("    Inputs: {}", type_list(&tool.input_types));
                println!("    Outputs: {}", type_list(&tool.output_types));
            }
        }
    }

    Ok(())
}

fn type_list(types: &[String]) -> String {
    if types.is_empty() {
        "any".to_string()
    } else {
        types.join(", ")
    }
}
