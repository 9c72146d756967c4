//! `stagehand show` — resolved properties, their sources, and warnings.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use colored::{ColoredString, Colorize};
use tabled::{settings::Style, Table, Tabled};

use stagehand_core::{Resolution, ResolvedProperty, ValueSource};

use crate::commands::{open_session, print_json, print_load_warnings, refuse, EXIT_VALIDATION};
use crate::session::Session;

/// Arguments for `stagehand show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Show a single property (default: every registered property).
    pub property: Option<String>,

    /// Block layout with packager documentation.
    #[arg(long)]
    pub verbose: bool,

    /// Emit JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

impl ShowArgs {
    pub fn run(self, manifest: Option<&Path>) -> Result<ExitCode> {
        let session = match open_session(manifest)? {
            Ok(session) => session,
            Err(code) => return Ok(code),
        };
        print_load_warnings(&session);

        let resolution = match session.resolve() {
            Ok(resolution) => resolution,
            Err(err) => return refuse(err),
        };

        if let Some(name) = &self.property {
            let Some(property) = resolution.get(name) else {
                return refuse(format!("unknown property `{name}`"));
            };
            if self.json {
                print_json(property)?;
            } else {
                print_block(&session, property, true);
            }
        } else if self.json {
            print_json(&resolution)?;
        } else if self.verbose {
            for property in resolution.properties.values() {
                print_block(&session, property, true);
            }
        } else {
            print_table(&resolution);
        }

        // Fatal warnings make the exit code say "do not launch with this".
        if resolution.has_fatal_warnings() {
            if !self.json {
                for warning in resolution.fatal_warnings() {
                    eprintln!("{} {warning}", "fatal:".red().bold());
                }
            }
            return Ok(ExitCode::from(EXIT_VALIDATION));
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Property")]
    property: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Warnings")]
    warnings: String,
}

fn print_table(resolution: &Resolution) {
    let rows: Vec<PropertyRow> = resolution
        .properties
        .values()
        .map(|property| PropertyRow {
            property: property.name.to_string(),
            value: property.value.to_string(),
            source: source_label(property.source).to_string(),
            warnings: if property.warnings.is_empty() {
                String::new()
            } else {
                property.warnings.join("; ").yellow().to_string()
            },
        })
        .collect();

    if rows.is_empty() {
        println!("no properties declared");
        return;
    }
    println!("{}", Table::new(rows).with(Style::rounded()));
}

fn print_block(session: &Session, property: &ResolvedProperty, with_doc: bool) {
    println!(
        "{} = {} ({})",
        property.name.to_string().bold(),
        property.value,
        source_label(property.source)
    );
    if with_doc {
        if let Ok(definition) = session.registry.get(property.name.as_ref()) {
            if let Some(doc) = &definition.doc {
                println!("  {}", doc.bright_black());
            }
        }
    }
    for warning in &property.warnings {
        println!("  {} {warning}", "warning:".yellow());
    }
}

fn source_label(source: ValueSource) -> ColoredString {
    match source {
        ValueSource::Default => "default".bright_black(),
        ValueSource::Override => "override".yellow(),
        ValueSource::Derived => "derived".cyan(),
    }
}
