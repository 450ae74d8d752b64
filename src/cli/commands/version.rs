//! Version command implementation.

use crate::error::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput {
    version: &'static str,
    build: &'static str,
    sqlite: &'static str,
}

impl VersionOutput {
    fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            build: if cfg!(debug_assertions) { "dev" } else { "release" },
            sqlite: rusqlite::version(),
        }
    }
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let output = VersionOutput::current();
    if json {
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!(
            "offsync version {} ({}, sqlite {})",
            output.version, output.build, output.sqlite
        );
    }
    Ok(())
}
