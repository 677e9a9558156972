// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Diagnostics emitted by catalog operations.

Operations report what they decide as [CatalogEvent] values. Callers choose how these
are displayed by installing an [EventSink]. Without one, events are forwarded to the
`log` crate at the event's [CatalogEvent::level()].
*/

use {
    log::Level,
    std::{
        fmt::{Display, Formatter},
        sync::Arc,
    },
};

/// Receives events.
pub type EventSink = Arc<dyn Fn(&CatalogEvent) + Send + Sync>;

/// Something a catalog operation wants to report.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CatalogEvent {
    /// Admission skipped because the same version is present.
    SkipSameVersion {
        identifier: String,
        name: String,
        version: String,
    },

    /// Admission skipped because a newer version is present.
    SkipOlderVersion {
        identifier: String,
        name: String,
        version: String,
        existing: String,
    },

    /// An identical version is being overwritten.
    ReplaceEqualVersion {
        identifier: String,
        name: String,
        version: String,
    },

    /// A newer version is being replaced by an older one.
    Downgrade {
        identifier: String,
        name: String,
        version: String,
        existing: String,
    },

    /// Version comparison failed and admission proceeds as if nothing was present.
    ///
    /// The record stored under the name is overwritten without releasing the
    /// references of its files. Run [crate::target::Target::rereference()] afterwards.
    IgnoredBrokenVersionComparison {
        identifier: String,
        name: String,
        version: String,
        existing: String,
        error: String,
    },

    /// Data of an already stored record could not be extracted and is ignored.
    IgnoredBrokenOldData {
        identifier: String,
        name: String,
        what: &'static str,
        error: String,
    },

    /// The version of a record being removed could not be determined.
    UnknownVersion {
        identifier: String,
        name: String,
        error: String,
    },

    /// A record is being removed.
    Removing {
        identifier: String,
        name: String,
        version: Option<String>,
    },

    /// A record to remove does not exist.
    NotFound {
        identifier: String,
        name: String,
        version: Option<String>,
    },

    /// A table was closed that was not open.
    DoubleClose { identifier: String },

    /// A partition was modified but never exported.
    ModifiedNotExported { identifier: String },

    /// References of a partition are being rebuilt.
    Rereferencing { identifier: String },

    /// Files of a partition are being referenced by a snapshot.
    ReferencingSnapshot { identifier: String, snapshot: String },

    /// Overrides are being reapplied to a partition.
    ReapplyingOverrides { identifier: String },

    /// Checksums of a partition are being recomputed.
    RedoingChecksums { identifier: String },

    /// Records of a partition are being replayed to notifiers.
    RerunningNotifiers { identifier: String },

    /// A walk over a partition stopped because of an error.
    StoppedAfterError {
        identifier: String,
        operation: &'static str,
    },

    /// Index files of a partition are being written.
    Exporting {
        identifier: String,
        only_missing: bool,
    },

    /// A record has an architecture not belonging into the partition.
    WrongArchitecture {
        identifier: String,
        name: String,
        architecture: String,
    },

    /// The files a record lists differ from the files it should have.
    FileKeyMismatch {
        identifier: String,
        name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// A file a record needs is absent or differs from what the record says.
    BadFile {
        identifier: String,
        name: String,
        key: String,
        problem: String,
    },

    /// The partition does not hold references to files a record needs.
    MissingReferences {
        identifier: String,
        name: String,
        keys: Vec<String>,
    },
}

impl CatalogEvent {
    /// The severity of this event.
    pub fn level(&self) -> Level {
        match self {
            Self::StoppedAfterError { .. }
            | Self::WrongArchitecture { .. }
            | Self::FileKeyMismatch { .. }
            | Self::BadFile { .. }
            | Self::MissingReferences { .. } => Level::Error,
            Self::SkipOlderVersion { .. }
            | Self::ReplaceEqualVersion { .. }
            | Self::Downgrade { .. }
            | Self::IgnoredBrokenVersionComparison { .. }
            | Self::IgnoredBrokenOldData { .. }
            | Self::UnknownVersion { .. }
            | Self::DoubleClose { .. }
            | Self::ModifiedNotExported { .. } => Level::Warn,
            Self::SkipSameVersion { .. }
            | Self::Removing { .. }
            | Self::NotFound { .. }
            | Self::Rereferencing { .. }
            | Self::ReferencingSnapshot { .. }
            | Self::ReapplyingOverrides { .. }
            | Self::RedoingChecksums { .. }
            | Self::RerunningNotifiers { .. } => Level::Info,
            Self::Exporting { .. } => Level::Debug,
        }
    }

    /// Deliver this event to a sink, or to the `log` crate without one.
    pub fn emit(self, sink: Option<&EventSink>) {
        match sink {
            Some(sink) => sink(&self),
            None => log::log!(self.level(), "{}", self),
        }
    }
}

fn version_suffix(version: &Option<String>) -> String {
    version
        .as_ref()
        .map(|v| format!(" '{}'", v))
        .unwrap_or_default()
}

impl Display for CatalogEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SkipSameVersion {
                identifier,
                name,
                version,
            } => write!(
                f,
                "skipping inclusion of '{}' '{}' in '{}', as this version already exists",
                name, version, identifier
            ),
            Self::SkipOlderVersion {
                identifier,
                name,
                version,
                existing,
            } => write!(
                f,
                "skipping inclusion of '{}' '{}' in '{}', as it has already '{}'",
                name, version, identifier, existing
            ),
            Self::ReplaceEqualVersion {
                identifier,
                name,
                version,
            } => write!(
                f,
                "'{}' '{}' in '{}' is replaced by a package of the same version",
                name, version, identifier
            ),
            Self::Downgrade {
                identifier,
                name,
                version,
                existing,
            } => write!(
                f,
                "downgrading '{}' from '{}' to '{}' in '{}'",
                name, existing, version, identifier
            ),
            Self::IgnoredBrokenVersionComparison {
                identifier,
                name,
                version,
                existing,
                error,
            } => write!(
                f,
                "could not compare '{}' with '{}' of '{}' in '{}' ({}); ignoring the old version",
                version, existing, name, identifier, error
            ),
            Self::IgnoredBrokenOldData {
                identifier,
                name,
                what,
                error,
            } => write!(
                f,
                "ignoring unparsable {} of old '{}' in '{}': {}",
                what, name, identifier, error
            ),
            Self::UnknownVersion {
                identifier,
                name,
                error,
            } => write!(
                f,
                "could not determine the version of '{}' in '{}': {}",
                name, identifier, error
            ),
            Self::Removing {
                identifier,
                name,
                version,
            } => write!(
                f,
                "removing '{}'{} from '{}'",
                name,
                version_suffix(version),
                identifier
            ),
            Self::NotFound {
                identifier,
                name,
                version,
            } => write!(
                f,
                "could not find '{}'{} in '{}'",
                name,
                version_suffix(version),
                identifier
            ),
            Self::DoubleClose { identifier } => {
                write!(f, "double close of the package table of '{}'", identifier)
            }
            Self::ModifiedNotExported { identifier } => write!(
                f,
                "'{}' was modified but no index files were exported",
                identifier
            ),
            Self::Rereferencing { identifier } => {
                write!(f, "referencing files of '{}'", identifier)
            }
            Self::ReferencingSnapshot {
                identifier,
                snapshot,
            } => write!(
                f,
                "referencing files of '{}' for snapshot '{}'",
                identifier, snapshot
            ),
            Self::ReapplyingOverrides { identifier } => {
                write!(f, "reapplying overrides to '{}'", identifier)
            }
            Self::RedoingChecksums { identifier } => {
                write!(f, "redoing checksum information of '{}'", identifier)
            }
            Self::RerunningNotifiers { identifier } => {
                write!(f, "rerunning notifiers of '{}'", identifier)
            }
            Self::StoppedAfterError {
                identifier,
                operation,
            } => write!(f, "stopped {} of '{}' after an error", operation, identifier),
            Self::Exporting {
                identifier,
                only_missing,
            } => write!(
                f,
                "exporting '{}'{}",
                identifier,
                if *only_missing {
                    " (missing files only)"
                } else {
                    ""
                }
            ),
            Self::WrongArchitecture {
                identifier,
                name,
                architecture,
            } => write!(
                f,
                "'{}' has architecture '{}' not fitting into '{}'",
                name, architecture, identifier
            ),
            Self::FileKeyMismatch {
                identifier,
                name,
                expected,
                found,
            } => write!(
                f,
                "'{}' in '{}' lists files [{}] but should have [{}]",
                name,
                identifier,
                found.join(", "),
                expected.join(", ")
            ),
            Self::BadFile {
                identifier,
                name,
                key,
                problem,
            } => write!(
                f,
                "file '{}' needed by '{}' in '{}' is {}",
                key, name, identifier, problem
            ),
            Self::MissingReferences {
                identifier,
                name,
                keys,
            } => write!(
                f,
                "'{}' lacks references to [{}] needed by '{}'",
                identifier,
                keys.join(", "),
                name
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        std::sync::Mutex,
    };

    #[test]
    fn sink_receives_events() {
        let seen = Arc::new(Mutex::new(vec![]));
        let seen_sink = seen.clone();
        let sink: EventSink = Arc::new(move |event: &CatalogEvent| {
            seen_sink.lock().unwrap().push(event.clone());
        });

        let event = CatalogEvent::Downgrade {
            identifier: "bookworm|main|amd64".into(),
            name: "foo".into(),
            version: "1.0".into(),
            existing: "2.0".into(),
        };
        assert_eq!(event.level(), Level::Warn);
        assert_eq!(
            event.to_string(),
            "downgrading 'foo' from '2.0' to '1.0' in 'bookworm|main|amd64'"
        );

        event.clone().emit(Some(&sink));
        assert_eq!(seen.lock().unwrap().as_slice(), &[event]);
    }
}
