use crate::ui;
use anyhow::Result;
use colored::Colorize;
use metricflow_core::MetricKind;
use metricflow_query::{default_mapper, MapperRegistry};

pub async fn execute() -> Result<()> {
    ui::banner("mappers");

    let registry = MapperRegistry::with_defaults();
    let mappers = registry.list();

    ui::field("Registered", mappers.len());
    println!();

    for name in &mappers {
        let requires = registry
            .get(name)
            .map(|m| m.requires_absolute())
            .unwrap_or(false);
        let note = if requires { " (needs absolute values)" } else { "" };
        println!("  {} {}{}", "•".green(), name, note.dimmed());
    }

    println!("\n{}", "Defaults by metric type:".bold());
    for kind in MetricKind::ALL {
        println!("  {:<18} {}", kind.as_str(), default_mapper(kind).name());
    }

    println!(
        "\n{}",
        "Override a metric's mapper with 'mapper:' in the pipeline config".yellow()
    );

    Ok(())
}
