// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Removal of packages from a partition. */

use crate::{
    error::{CatalogError, Result},
    events::CatalogEvent,
    logger::{LogEntry, PackageLogger},
    outcome::{Outcome, StoreUpdates, TrackingUpdate},
    record::PackageData,
    references::ReferenceLedger,
    table::TableCursor,
    target::Target,
    tracking::TrackingLedger,
};

/// How the table entry of a removed record is deleted.
pub(crate) enum Deletion<'c> {
    /// By key, with no cursor open.
    Key(String),
    /// Through the cursor positioned on the record.
    Cursor(&'c mut TableCursor),
}

impl Target {
    /// Remove a package.
    ///
    /// Without a version the current record of the name is removed. Returns
    /// [Outcome::Nothing] if there is no such record.
    pub fn remove_package(
        &mut self,
        refs: &mut dyn ReferenceLedger,
        logger: Option<&mut dyn PackageLogger>,
        tracking: Option<&mut dyn TrackingLedger>,
        name: &str,
        version: Option<&str>,
    ) -> Result<Outcome> {
        self.check_no_cursor()?;

        match self.find_record(name, version)? {
            Some((key, data)) => {
                self.remove_record(Deletion::Key(key), name, &data, refs, logger, tracking)
            }
            None => {
                self.emit(CatalogEvent::NotFound {
                    identifier: self.identifier.clone(),
                    name: name.to_string(),
                    version: version.map(|v| v.to_string()),
                });
                Ok(Outcome::Nothing)
            }
        }
    }

    /// Remove a record that was already read.
    pub(crate) fn remove_record(
        &mut self,
        deletion: Deletion,
        name: &str,
        data: &PackageData,
        refs: &mut dyn ReferenceLedger,
        logger: Option<&mut dyn PackageLogger>,
        tracking: Option<&mut dyn TrackingLedger>,
    ) -> Result<Outcome> {
        // The version is only wanted for the audit log.
        let old_version = match (&logger, self.capabilities.version(&data.chunk)) {
            (None, _) => None,
            (Some(_), Ok(version)) => Some(version),
            (Some(_), Err(e)) => {
                self.emit(CatalogEvent::UnknownVersion {
                    identifier: self.identifier.clone(),
                    name: name.to_string(),
                    error: e.to_string(),
                });
                None
            }
        };

        let file_keys = self
            .capabilities
            .file_keys(&data.chunk)
            .map_err(|e| CatalogError::extraction(&self.identifier, name, "file keys", e))?;

        let linkage = match &tracking {
            Some(_) => self
                .capabilities
                .source_and_version(&data.chunk, name)
                .ok()
                .flatten(),
            None => None,
        };

        self.emit(CatalogEvent::Removing {
            identifier: self.identifier.clone(),
            name: name.to_string(),
            version: Some(data.version.clone()),
        });

        match deletion {
            Deletion::Key(key) => {
                if !self.table_mut()?.delete(&key)? {
                    return Err(CatalogError::RecordMissing(key));
                }
            }
            Deletion::Cursor(cursor) => {
                self.table_mut()?.cursor_delete(cursor)?;
            }
        }

        let mut updates = StoreUpdates {
            table: true,
            ..Default::default()
        };
        let mut first_error = None;

        match refs.delete(&self.identifier, &file_keys, None) {
            Ok(()) => updates.references = true,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }

        updates.tracking = match (tracking, &linkage) {
            (Some(tracking), Some(linkage)) => match tracking.remove(linkage, &file_keys) {
                Ok(()) => TrackingUpdate::Updated,
                Err(e) => {
                    first_error.get_or_insert(e);
                    TrackingUpdate::Failed
                }
            },
            (Some(_), None) => TrackingUpdate::NoLinkage,
            (None, _) => {
                self.stale_tracking = true;
                TrackingUpdate::MarkedStale
            }
        };

        if let Some(logger) = logger {
            let entry = LogEntry {
                identifier: &self.identifier,
                name,
                old_version: old_version.as_deref(),
                old_chunk: Some(data.chunk.as_str()),
                old_file_keys: Some(file_keys.as_slice()),
                ..Default::default()
            };

            match logger.log(&entry) {
                Ok(()) => updates.logged = true,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        self.was_modified = true;

        match first_error {
            Some(e) => Err(CatalogError::Incomplete {
                updates,
                source: Box::new(e),
            }),
            None => Ok(Outcome::Changed(updates)),
        }
    }
}
