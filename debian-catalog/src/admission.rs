// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Admission of packages into a partition. */

use {
    crate::{
        description::DescriptionMerger,
        error::{CatalogError, Result},
        events::CatalogEvent,
        logger::{LogEntry, PackageLogger},
        outcome::{Outcome, StoreUpdates, TrackingUpdate},
        record::{primary_key, PackageData},
        references::ReferenceLedger,
        target::Target,
        tracking::{FileType, SourceLinkage, TrackingLedger},
    },
    std::cmp::Ordering,
};

/// A package offered for admission.
#[derive(Clone, Copy, Debug)]
pub struct NewPackage<'a> {
    pub name: &'a str,
    pub version: &'a str,
    /// The control chunk to store.
    pub chunk: &'a str,
    /// Pool files the package needs.
    pub file_keys: &'a [String],
    /// Architecture of the package, which may be `all` in architecture partitions.
    pub architecture: &'a str,
    /// Permit replacing an equal or newer version.
    pub downgrade: bool,
    /// Rule causing the admission, for the audit log.
    pub causing_rule: Option<&'a str>,
    /// Suite the package came from, for the audit log.
    pub source_suite: Option<&'a str>,
}

impl<'a> NewPackage<'a> {
    pub fn new(
        name: &'a str,
        version: &'a str,
        chunk: &'a str,
        file_keys: &'a [String],
        architecture: &'a str,
    ) -> Self {
        Self {
            name,
            version,
            chunk,
            file_keys,
            architecture,
            downgrade: false,
            causing_rule: None,
            source_suite: None,
        }
    }
}

/// What admission decided to do about an existing record.
enum Plan {
    /// Store under a new key. `overwrite` permits clobbering a record nobody accounted for.
    Insert { overwrite: bool },
    /// Supersede the record stored under `key`.
    Replace { key: String, old: PackageData },
}

/// What is known about a superseded record.
#[derive(Default)]
struct OldData {
    file_keys: Option<Vec<String>>,
    linkage: Option<SourceLinkage>,
}

impl Target {
    fn skip_same_version(&self, package: &NewPackage) -> Outcome {
        self.emit(CatalogEvent::SkipSameVersion {
            identifier: self.identifier.clone(),
            name: package.name.to_string(),
            version: package.version.to_string(),
        });

        Outcome::Nothing
    }

    fn replace_equal_version(&self, package: &NewPackage) {
        self.emit(CatalogEvent::ReplaceEqualVersion {
            identifier: self.identifier.clone(),
            name: package.name.to_string(),
            version: package.version.to_string(),
        });
    }

    /// Decide how a package relates to what is stored.
    ///
    /// Returns [None] if the package is to be skipped.
    fn plan_admission(
        &self,
        package: &NewPackage,
        latest: Option<(String, PackageData)>,
    ) -> Result<Option<Plan>> {
        let (key, old) = match latest {
            Some(latest) => latest,
            None => return Ok(Some(Plan::Insert { overwrite: false })),
        };

        let ordering = match self.versions.compare(package.version, &old.version) {
            Ok(ordering) => ordering,
            Err(e) if self.ignore.broken_version_comparison => {
                self.emit(CatalogEvent::IgnoredBrokenVersionComparison {
                    identifier: self.identifier.clone(),
                    name: package.name.to_string(),
                    version: package.version.to_string(),
                    existing: old.version.clone(),
                    error: e.to_string(),
                });
                return Ok(Some(Plan::Insert { overwrite: true }));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(match ordering {
            Ordering::Equal if !package.downgrade => {
                self.skip_same_version(package);
                None
            }
            Ordering::Equal => {
                self.replace_equal_version(package);
                Some(Plan::Replace { key, old })
            }
            Ordering::Less if self.retain_old_versions => {
                let same_key = primary_key(package.name, Some(package.version), true);

                match self.table()?.get(&same_key)? {
                    None => Some(Plan::Insert { overwrite: false }),
                    Some(_) if !package.downgrade => {
                        self.skip_same_version(package);
                        None
                    }
                    Some(bytes) => {
                        self.replace_equal_version(package);
                        let same = PackageData::decode(&same_key, &bytes)?
                            .ok_or_else(|| CatalogError::RecordMissing(same_key.clone()))?;
                        Some(Plan::Replace {
                            key: same_key,
                            old: same,
                        })
                    }
                }
            }
            Ordering::Less if !package.downgrade => {
                self.emit(CatalogEvent::SkipOlderVersion {
                    identifier: self.identifier.clone(),
                    name: package.name.to_string(),
                    version: package.version.to_string(),
                    existing: old.version.clone(),
                });
                None
            }
            Ordering::Less => {
                self.emit(CatalogEvent::Downgrade {
                    identifier: self.identifier.clone(),
                    name: package.name.to_string(),
                    version: package.version.to_string(),
                    existing: old.version.clone(),
                });
                Some(Plan::Replace { key, old })
            }
            Ordering::Greater if self.retain_old_versions => Some(Plan::Insert { overwrite: false }),
            Ordering::Greater => Some(Plan::Replace { key, old }),
        })
    }

    /// Handle an extraction failure on an already stored record.
    fn tolerate_broken_old_data(
        &self,
        name: &str,
        what: &'static str,
        error: CatalogError,
    ) -> Result<()> {
        if self.ignore.broken_old_data {
            self.emit(CatalogEvent::IgnoredBrokenOldData {
                identifier: self.identifier.clone(),
                name: name.to_string(),
                what,
                error: error.to_string(),
            });
            Ok(())
        } else {
            Err(CatalogError::extraction(&self.identifier, name, what, error))
        }
    }

    /// Resolve the files and source of a record about to be superseded.
    fn resolve_old_data(&self, name: &str, old: &PackageData, tracking: bool) -> Result<OldData> {
        let file_keys = match self.capabilities.file_keys(&old.chunk) {
            Ok(keys) => keys,
            Err(e) => {
                self.tolerate_broken_old_data(name, "file keys", e)?;
                return Ok(OldData::default());
            }
        };

        if !tracking {
            return Ok(OldData {
                file_keys: Some(file_keys),
                linkage: None,
            });
        }

        match self.capabilities.source_and_version(&old.chunk, name) {
            Ok(linkage) => Ok(OldData {
                file_keys: Some(file_keys),
                linkage,
            }),
            Err(e) => {
                self.tolerate_broken_old_data(name, "source", e)?;
                Ok(OldData::default())
            }
        }
    }

    /// Admit a package into the partition.
    ///
    /// Version policy:
    ///
    /// * An equal version is skipped unless `downgrade` is set, in which case it is
    ///   replaced.
    /// * An older version is skipped unless `downgrade` is set, in which case it
    ///   replaces the newer one. When old versions are retained, it is instead added
    ///   next to the newer one, unless exactly that version is already present.
    /// * A newer version replaces the current one, or is added next to it when old
    ///   versions are retained.
    ///
    /// After the table was written, references of the new files are added and those of
    /// superseded files no longer needed are released. Then the tracking ledger and the
    /// audit logger are told. Failures of these steps do not undo the table write and
    /// are reported as [CatalogError::Incomplete].
    pub fn add_package(
        &mut self,
        refs: &mut dyn ReferenceLedger,
        logger: Option<&mut dyn PackageLogger>,
        mut tracking: Option<&mut dyn TrackingLedger>,
        package: &NewPackage,
        descriptions: Option<&dyn DescriptionMerger>,
    ) -> Result<Outcome> {
        self.check_no_cursor()?;

        // The new record has to be sound before anything is decided about it.
        self.capabilities
            .version(package.chunk)
            .map_err(|e| CatalogError::extraction(&self.identifier, package.name, "version", e))?;

        let latest = match self.find_record(package.name, None) {
            Ok(latest) => latest,
            // Ordering stored versions already needs the comparator.
            Err(CatalogError::Version(e)) if self.ignore.broken_version_comparison => {
                self.emit(CatalogEvent::IgnoredBrokenVersionComparison {
                    identifier: self.identifier.clone(),
                    name: package.name.to_string(),
                    version: package.version.to_string(),
                    existing: "?".to_string(),
                    error: e.to_string(),
                });
                None
            }
            Err(e) => return Err(e),
        };
        let latest_chunk = latest.as_ref().map(|(_, old)| old.chunk.clone());

        let plan = match self.plan_admission(package, latest)? {
            Some(plan) => plan,
            None => return Ok(Outcome::Nothing),
        };

        let old_data = match &plan {
            Plan::Replace { old, .. } => {
                self.resolve_old_data(package.name, old, tracking.is_some())?
            }
            Plan::Insert { .. } => OldData::default(),
        };

        let merged = match descriptions {
            Some(merger) => merger.merge(
                &self.identifier,
                package.name,
                package.chunk,
                latest_chunk.as_deref(),
            )?,
            None => None,
        };
        let chunk = merged.as_deref().unwrap_or(package.chunk);

        let bytes = PackageData::new(package.version, chunk).encode();
        let new_key = primary_key(
            package.name,
            Some(package.version),
            self.retain_old_versions,
        );

        let table = self.table_mut()?;
        let old = match plan {
            Plan::Insert { overwrite } => {
                table.insert(&new_key, &bytes, overwrite)?;
                None
            }
            Plan::Replace { key, old } => {
                if key == new_key {
                    table.replace(&key, &bytes)?;
                } else {
                    table.delete(&key)?;
                    table.insert(&new_key, &bytes, false)?;
                }
                Some(old)
            }
        };

        let mut updates = StoreUpdates {
            table: true,
            ..Default::default()
        };
        let mut first_error = None;

        let old_keys = old_data.file_keys.as_deref();
        let referenced = refs
            .insert(&self.identifier, package.file_keys, old_keys)
            .and_then(|_| match old_keys {
                Some(old_keys) => refs.delete(&self.identifier, old_keys, Some(package.file_keys)),
                None => Ok(()),
            });
        match referenced {
            Ok(()) => updates.references = true,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }

        updates.tracking = match tracking.as_mut() {
            Some(tracking) => match tracking.insert(
                FileType::from_architecture(package.architecture),
                package.file_keys,
                old_data.linkage.as_ref(),
                old_keys,
            ) {
                Ok(()) => TrackingUpdate::Updated,
                Err(e) => {
                    first_error.get_or_insert(e);
                    TrackingUpdate::Failed
                }
            },
            None => {
                self.stale_tracking = true;
                TrackingUpdate::MarkedStale
            }
        };

        if let Some(logger) = logger {
            let entry = LogEntry {
                identifier: &self.identifier,
                name: package.name,
                new_version: Some(package.version),
                old_version: old.as_ref().map(|old| old.version.as_str()),
                new_chunk: Some(chunk),
                old_chunk: old.as_ref().map(|old| old.chunk.as_str()),
                new_file_keys: Some(package.file_keys),
                old_file_keys: old_keys,
                causing_rule: package.causing_rule,
                source_suite: package.source_suite,
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

    /// Check whether a package could be admitted, without changing anything.
    ///
    /// Returns `false` if the same or a newer version is present. Offering an older
    /// version is an error unless `permit_older` is set. Stored records whose data
    /// cannot be extracted are reported as errors.
    pub fn check_add_package(
        &self,
        name: &str,
        version: &str,
        tracking: bool,
        permit_older: bool,
    ) -> Result<bool> {
        let old = match self.find_record(name, None)? {
            Some((_, old)) => old,
            None => return Ok(true),
        };

        let old_version = self
            .capabilities
            .version(&old.chunk)
            .map_err(|e| CatalogError::extraction(&self.identifier, name, "version", e))?;

        match self.versions.compare(version, &old_version)? {
            Ordering::Equal => {
                self.emit(CatalogEvent::SkipSameVersion {
                    identifier: self.identifier.clone(),
                    name: name.to_string(),
                    version: version.to_string(),
                });
                return Ok(false);
            }
            Ordering::Less if !permit_older => {
                return Err(CatalogError::OlderVersion {
                    identifier: self.identifier.clone(),
                    name: name.to_string(),
                    version: version.to_string(),
                    existing: old_version,
                });
            }
            Ordering::Less => {
                self.emit(CatalogEvent::SkipOlderVersion {
                    identifier: self.identifier.clone(),
                    name: name.to_string(),
                    version: version.to_string(),
                    existing: old_version,
                });
                return Ok(false);
            }
            Ordering::Greater => {}
        }

        self.capabilities
            .file_keys(&old.chunk)
            .map_err(|e| CatalogError::extraction(&self.identifier, name, "file keys", e))?;

        if tracking {
            self.capabilities
                .source_and_version(&old.chunk, name)
                .map_err(|e| CatalogError::extraction(&self.identifier, name, "source", e))?;
        }

        Ok(true)
    }
}
