// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Audit logging of catalog changes. */

use crate::error::Result;

/// Describes one change to a partition.
///
/// An addition has no old data, a removal has no new data.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEntry<'a> {
    pub identifier: &'a str,
    pub name: &'a str,
    pub new_version: Option<&'a str>,
    pub old_version: Option<&'a str>,
    pub new_chunk: Option<&'a str>,
    pub old_chunk: Option<&'a str>,
    pub new_file_keys: Option<&'a [String]>,
    pub old_file_keys: Option<&'a [String]>,
    /// The rule that caused this change, e.g. an update or pull rule name.
    pub causing_rule: Option<&'a str>,
    /// The suite a package was taken from.
    pub source_suite: Option<&'a str>,
}

impl<'a> LogEntry<'a> {
    /// A short name of the kind of change.
    pub fn action(&self) -> &'static str {
        match (self.new_chunk.is_some(), self.old_chunk.is_some()) {
            (true, true) => "replace",
            (true, false) => "add",
            (false, true) => "remove",
            (false, false) => "none",
        }
    }
}

/// Receives catalog changes.
pub trait PackageLogger {
    /// Record a change.
    fn log(&mut self, entry: &LogEntry<'_>) -> Result<()>;

    /// Replay a stored record, as if it had just been added.
    fn rerun(
        &mut self,
        identifier: &str,
        name: &str,
        version: &str,
        chunk: &str,
        file_keys: &[String],
    ) -> Result<()>;
}

/// A [PackageLogger] writing one line per change through the `log` crate.
#[derive(Clone, Debug, Default)]
pub struct LogPackageLogger {
    entries: usize,
}

impl LogPackageLogger {
    /// Log target lines are written with.
    pub const TARGET: &'static str = "debian_catalog::audit";

    /// Number of lines written.
    pub fn entries(&self) -> usize {
        self.entries
    }
}

impl PackageLogger for LogPackageLogger {
    fn log(&mut self, entry: &LogEntry<'_>) -> Result<()> {
        log::info!(
            target: Self::TARGET,
            "{} {} {} {} {}{}{}",
            entry.action(),
            entry.identifier,
            entry.name,
            entry.new_version.unwrap_or("-"),
            entry.old_version.unwrap_or("-"),
            entry
                .causing_rule
                .map(|rule| format!(" rule={}", rule))
                .unwrap_or_default(),
            entry
                .source_suite
                .map(|suite| format!(" from={}", suite))
                .unwrap_or_default(),
        );
        self.entries += 1;

        Ok(())
    }

    fn rerun(
        &mut self,
        identifier: &str,
        name: &str,
        version: &str,
        _chunk: &str,
        file_keys: &[String],
    ) -> Result<()> {
        log::info!(
            target: Self::TARGET,
            "rerun {} {} {} files={}",
            identifier,
            name,
            version,
            file_keys.join(",")
        );
        self.entries += 1;

        Ok(())
    }
}
