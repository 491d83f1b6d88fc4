//! Terminal reporting

use colored::*;
use recast_core::Mapping;

use crate::commands::RunSummary;

pub fn print_run_summary(summary: &RunSummary) {
    println!(
        "{} Applied mapping {}",
        "✓".green(),
        summary.mapping.bold()
    );
    if let Some(guide) = &summary.guide {
        println!(
            "  Implementation guide: {} StructureDefinitions, {} ValueSets",
            guide.structure_definitions, guide.value_sets
        );
    }
    for report in &summary.bundles {
        println!(
            "  {} -> {} ({} -> {} entries)",
            report.source.display(),
            report.written.display().to_string().cyan(),
            report.entries_before,
            report.entries_after
        );
    }
    println!(
        "\n{} {} bundle(s) in {}",
        "Summary:".bold(),
        summary.bundles.len(),
        format_duration(summary.elapsed)
    );
}

pub fn print_mapping(mapping: &Mapping) {
    println!("{} Mapping {} is valid", "✓".green(), mapping.name.bold());
    if let Some(applicability) = &mapping.applicability {
        println!("  Applies to bundles where: {applicability}");
    }
    if !mapping.variables.is_empty() {
        let names: Vec<&str> = mapping.variables.keys().map(String::as_str).collect();
        println!("  Variables: {}", names.join(", "));
    }
    println!("  Actions:");
    for (index, action) in mapping.actions.iter().enumerate() {
        println!("    {}. {}", index + 1, action.label());
    }
}

pub fn print_error(error: &anyhow::Error) {
    eprintln!("{} {}", "error:".red().bold(), error);
    for cause in error.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".yellow(), cause);
    }
}

pub fn format_duration(duration: std::time::Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}
