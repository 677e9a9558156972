// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {
    crate::{outcome::StoreUpdates, version::VersionError},
    thiserror::Error,
};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("YAML error: {0:?}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("required control field missing: {0}")]
    ControlRequiredFieldMissing(String),

    #[error("expected 1 paragraph in control chunk; got {0}")]
    ControlParagraphMismatch(usize),

    #[error("malformed checksum line in field {0}: {1}")]
    ChecksumLineMalformed(&'static str, String),

    #[error("malformed record stored under key '{0}': {1}")]
    MalformedRecord(String, &'static str),

    #[error("error extracting {what} of '{package}' in '{identifier}': {source}")]
    Extraction {
        identifier: String,
        package: String,
        what: &'static str,
        source: Box<CatalogError>,
    },

    #[error("codename '{0}' must not contain '|'")]
    CodenameSeparator(String),

    #[error("trying to open '{identifier}' read-write in read-only distribution '{codename}'")]
    TargetReadOnly {
        identifier: String,
        codename: String,
    },

    #[error("package table of '{0}' is already open")]
    TableAlreadyOpen(String),

    #[error("package table of '{0}' is not open")]
    TableNotOpen(String),

    #[error("package table '{0}' was opened read-only")]
    TableReadOnly(String),

    #[error("a cursor is open on '{0}'; only cursor operations may modify it")]
    CursorOpen(String),

    #[error("cursor has no current element")]
    CursorNoCurrent,

    #[error("cursor was already closed")]
    CursorClosed,

    #[error("record '{0}' already exists")]
    RecordExists(String),

    #[error("record '{0}' does not exist")]
    RecordMissing(String),

    #[error("exporting '{0}' is forbidden")]
    ExportForbidden(String),

    #[error("file '{0}' is missing from the pool")]
    MissingFile(String),

    #[error("file '{0}' has unexpected {1} checksum")]
    ChecksumMismatch(String, &'static str),

    #[error(
        "trying to put version '{version}' of '{name}' in '{identifier}', \
         while there already is the strictly newer '{existing}' in there"
    )]
    OlderVersion {
        identifier: String,
        name: String,
        version: String,
        existing: String,
    },

    #[error("override file parse error on line {0}: {1}")]
    OverrideParse(usize, String),

    #[error("unknown partition {0}")]
    UnknownPartition(String),

    #[error("{source} (changes already applied: {updates})")]
    Incomplete {
        updates: StoreUpdates,
        source: Box<CatalogError>,
    },

    #[error("{0}")]
    Other(String),
}

impl CatalogError {
    /// Wrap an error raised by a capability set function.
    pub fn extraction(
        identifier: &str,
        package: &str,
        what: &'static str,
        source: CatalogError,
    ) -> Self {
        Self::Extraction {
            identifier: identifier.to_string(),
            package: package.to_string(),
            what,
            source: Box::new(source),
        }
    }

    /// The store updates that were applied before this error occurred.
    ///
    /// Errors raised before any store was touched report no updates.
    pub fn applied_updates(&self) -> StoreUpdates {
        match self {
            Self::Incomplete { updates, .. } => *updates,
            _ => StoreUpdates::default(),
        }
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, CatalogError>;
