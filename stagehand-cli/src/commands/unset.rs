//! `stagehand unset` — remove an administrator override.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use stagehand_resolve::FileLock;

use crate::commands::{open_session, refuse};

/// Arguments for `stagehand unset`.
#[derive(Args, Debug)]
pub struct UnsetArgs {
    /// Property whose override should be removed.
    pub property: String,
}

impl UnsetArgs {
    pub fn run(self, manifest: Option<&Path>) -> Result<ExitCode> {
        let mut session = match open_session(manifest)? {
            Ok(session) => session,
            Err(code) => return Ok(code),
        };
        if let Err(err) = session.registry.get(&self.property) {
            return refuse(err);
        }

        let _lock = FileLock::acquire(&session.overrides_path)?;
        session.reload_overrides()?;

        // Unsetting a property with no override is a quiet success.
        if session.overrides.unset(&self.property) {
            session.save_overrides()?;
            println!(
                "{} reverted to its default",
                self.property.bold()
            );
        } else {
            println!("no override was set for {}", self.property.bold());
        }
        Ok(ExitCode::SUCCESS)
    }
}
