// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Source package tracking.

The tracking ledger records which pool files belong to which source package version,
so a source and everything built from it can be handled as a unit.
*/

use {
    crate::error::Result,
    std::collections::BTreeMap,
    strum_macros::{Display, EnumString},
};

/// The role a file plays for its source package.
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FileType {
    #[strum(serialize = "source")]
    Source,
    #[strum(serialize = "all")]
    AllBinary,
    #[strum(serialize = "binary")]
    ArchBinary,
}

impl FileType {
    /// Derive the file type from a package architecture.
    pub fn from_architecture(architecture: &str) -> Self {
        match architecture {
            "source" => Self::Source,
            "all" => Self::AllBinary,
            _ => Self::ArchBinary,
        }
    }
}

/// A source package name and version.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SourceLinkage {
    pub source: String,
    pub version: String,
}

impl SourceLinkage {
    pub fn new(source: impl ToString, version: impl ToString) -> Self {
        Self {
            source: source.to_string(),
            version: version.to_string(),
        }
    }
}

/// A tracking context bound to the source package of the record being processed.
pub trait TrackingLedger {
    /// Associate `keys` with the bound source package.
    ///
    /// When a record was replaced, `old` and `old_keys` describe what it was linked to
    /// and those associations are dropped.
    fn insert(
        &mut self,
        file_type: FileType,
        keys: &[String],
        old: Option<&SourceLinkage>,
        old_keys: Option<&[String]>,
    ) -> Result<()>;

    /// Drop the association of `keys` with a source package.
    fn remove(&mut self, source: &SourceLinkage, keys: &[String]) -> Result<()>;
}

/// A file tracked for a source package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrackedFile {
    pub file_type: FileType,
    pub references: usize,
}

/// Every tracked source package version of a distribution.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TrackedPackages {
    packages: BTreeMap<SourceLinkage, BTreeMap<String, TrackedFile>>,
}

impl TrackedPackages {
    /// The files tracked for a source package version.
    pub fn files(&self, source: &SourceLinkage) -> Option<&BTreeMap<String, TrackedFile>> {
        self.packages.get(source)
    }

    /// Obtain a tracking context for a source package version.
    pub fn summon(&mut self, source: impl ToString, version: impl ToString) -> TrackingData<'_> {
        TrackingData {
            store: self,
            linkage: SourceLinkage::new(source, version),
        }
    }

    fn add(&mut self, linkage: &SourceLinkage, file_type: FileType, key: &str) {
        let entry = self
            .packages
            .entry(linkage.clone())
            .or_default()
            .entry(key.to_string())
            .or_insert(TrackedFile {
                file_type,
                references: 0,
            });

        entry.references += 1;
    }

    fn release(&mut self, linkage: &SourceLinkage, key: &str) {
        let files = match self.packages.get_mut(linkage) {
            Some(files) => files,
            None => {
                log::warn!(
                    "no tracking data for {} {}",
                    linkage.source,
                    linkage.version
                );
                return;
            }
        };

        match files.get_mut(key) {
            Some(file) if file.references > 1 => {
                file.references -= 1;
            }
            Some(_) => {
                files.remove(key);
            }
            None => {
                log::warn!(
                    "{} is not tracked for {} {}",
                    key,
                    linkage.source,
                    linkage.version
                );
            }
        }

        if files.is_empty() {
            self.packages.remove(linkage);
        }
    }
}

/// Tracking context of one source package version.
pub struct TrackingData<'a> {
    store: &'a mut TrackedPackages,
    linkage: SourceLinkage,
}

impl<'a> TrackingData<'a> {
    /// The source package version this context is bound to.
    pub fn linkage(&self) -> &SourceLinkage {
        &self.linkage
    }
}

impl<'a> TrackingLedger for TrackingData<'a> {
    fn insert(
        &mut self,
        file_type: FileType,
        keys: &[String],
        old: Option<&SourceLinkage>,
        old_keys: Option<&[String]>,
    ) -> Result<()> {
        for key in keys {
            self.store.add(&self.linkage, file_type, key);
        }

        if let (Some(old), Some(old_keys)) = (old, old_keys) {
            self.remove(old, old_keys)?;
        }

        Ok(())
    }

    fn remove(&mut self, source: &SourceLinkage, keys: &[String]) -> Result<()> {
        for key in keys {
            self.store.release(source, key);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn file_types() {
        assert_eq!(FileType::from_architecture("source"), FileType::Source);
        assert_eq!(FileType::from_architecture("all"), FileType::AllBinary);
        assert_eq!(FileType::from_architecture("arm64"), FileType::ArchBinary);
        assert_eq!(FileType::AllBinary.to_string(), "all");
    }

    #[test]
    fn replacement_moves_files() -> Result<()> {
        let mut tracked = TrackedPackages::default();
        let old = SourceLinkage::new("hello", "2.9-1");

        tracked
            .summon("hello", "2.9-1")
            .insert(FileType::ArchBinary, &["pool/old.deb".to_string()], None, None)?;

        tracked.summon("hello", "2.10-2").insert(
            FileType::ArchBinary,
            &["pool/new.deb".to_string()],
            Some(&old),
            Some(&["pool/old.deb".to_string()][..]),
        )?;

        assert!(tracked.files(&old).is_none());
        assert_eq!(
            tracked
                .files(&SourceLinkage::new("hello", "2.10-2"))
                .map(|files| files.len()),
            Some(1)
        );

        Ok(())
    }
}
