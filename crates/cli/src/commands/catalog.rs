//! `tabhive catalog` — Print the external command catalog.

use tabhive_bridge::{CATALOG_VERSION, ExternalBridge, catalog};

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ExternalBridge::help())?);
        return Ok(());
    }

    println!("TabHive command catalog (v{CATALOG_VERSION})\n");
    for spec in catalog::catalog() {
        let tier = if spec.internal_only { " [internal]" } else { "" };
        println!("  {}{tier}", spec.name);
        println!("      {}", spec.summary);
        for arg in spec.args {
            let required = if arg.required { "required" } else { "optional" };
            println!("      --{} <{}> ({required})", arg.name, arg.kind);
        }
    }
    Ok(())
}
