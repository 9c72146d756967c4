//! `stagehand set` — record an administrator override.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use stagehand_resolve::FileLock;

use crate::commands::{open_session, print_load_warnings, refuse};

/// Arguments for `stagehand set`.
#[derive(Args, Debug)]
pub struct SetArgs {
    /// Property name, e.g. `web.port`.
    pub property: String,

    /// New value; parsed against the property's declared type.
    pub value: String,
}

impl SetArgs {
    pub fn run(self, manifest: Option<&Path>) -> Result<ExitCode> {
        let mut session = match open_session(manifest)? {
            Ok(session) => session,
            Err(code) => return Ok(code),
        };

        // Hold the lock across the read-modify-write so concurrent sets
        // cannot drop each other's entries.
        let _lock = FileLock::acquire(&session.overrides_path)?;
        session.reload_overrides()?;
        print_load_warnings(&session);

        let value =
            match session
                .overrides
                .set_str(&session.registry, &self.property, &self.value)
            {
                Ok(value) => value,
                Err(err) => return refuse(err),
            };
        session.save_overrides()?;

        println!(
            "{} = {value} {}",
            self.property.bold(),
            "(override)".bright_black()
        );
        Ok(ExitCode::SUCCESS)
    }
}
