// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Bulk operations over every record of a partition.

Every walk stops at the first error. Records processed before the error keep their
changes.
*/

use crate::{
    cursor::PackageCursor,
    error::{CatalogError, Result},
    events::CatalogEvent,
    files::FileStore,
    logger::PackageLogger,
    outcome::{Outcome, StoreUpdates},
    overrides::OverrideFile,
    record::PackageData,
    references::ReferenceLedger,
    target::Target,
};

impl Target {
    /// Run `f` on every record of a fresh walk.
    ///
    /// On error the walk is closed and a [CatalogEvent::StoppedAfterError] is emitted.
    fn walk(
        &mut self,
        read_only: bool,
        operation: &'static str,
        mut f: impl FnMut(&mut PackageCursor, &str, &PackageData) -> Result<()>,
    ) -> Result<()> {
        let mut cursor = self.open_cursor(read_only)?;

        let res = loop {
            let (name, data) = match cursor.next() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            };

            if let Err(e) = f(&mut cursor, &name, &data) {
                break Err(e);
            }
        };

        let closed = cursor.close();

        if res.is_err() {
            self.emit(CatalogEvent::StoppedAfterError {
                identifier: self.identifier.clone(),
                operation,
            });
        }

        res.and(closed)
    }

    /// Turn the number of replaced records of a stopped walk into an outcome.
    fn walk_outcome(res: Result<()>, replaced: usize) -> Result<Outcome> {
        let updates = StoreUpdates {
            table: true,
            ..Default::default()
        };

        match (res, replaced) {
            (Ok(()), 0) => Ok(Outcome::Nothing),
            (Ok(()), _) => Ok(Outcome::Changed(updates)),
            (Err(e), 0) => Err(e),
            (Err(e), _) => Err(CatalogError::Incomplete {
                updates,
                source: Box::new(e),
            }),
        }
    }

    /// Rebuild the references of the partition from its records.
    ///
    /// Every reference the partition holds is dropped first.
    pub fn rereference(&mut self, refs: &mut dyn ReferenceLedger) -> Result<()> {
        self.check_no_cursor()?;
        self.emit(CatalogEvent::Rereferencing {
            identifier: self.identifier.clone(),
        });

        refs.remove(&self.identifier)?;

        let identifier = self.identifier.clone();
        let capabilities = self.capabilities.clone();

        self.walk(true, "rereference", |_, name, data| {
            let keys = capabilities
                .file_keys(&data.chunk)
                .map_err(|e| CatalogError::extraction(&identifier, name, "file keys", e))?;

            refs.insert(&identifier, &keys, None)
        })
    }

    /// Reference every file of the partition on behalf of a snapshot.
    ///
    /// `snapshot` is the identifier the references are recorded under.
    pub fn reference_snapshot(
        &mut self,
        refs: &mut dyn ReferenceLedger,
        snapshot: &str,
    ) -> Result<()> {
        self.check_no_cursor()?;
        self.emit(CatalogEvent::ReferencingSnapshot {
            identifier: self.identifier.clone(),
            snapshot: snapshot.to_string(),
        });

        let identifier = self.identifier.clone();
        let capabilities = self.capabilities.clone();

        self.walk(true, "reference snapshot", |_, name, data| {
            let keys = capabilities
                .file_keys(&data.chunk)
                .map_err(|e| CatalogError::extraction(&identifier, name, "file keys", e))?;

            refs.add(snapshot, &keys)
        })
    }

    /// Apply overrides to every record.
    ///
    /// Only records whose chunk changes are written.
    pub fn reoverride(&mut self, overrides: &OverrideFile) -> Result<Outcome> {
        self.check_no_cursor()?;
        self.emit(CatalogEvent::ReapplyingOverrides {
            identifier: self.identifier.clone(),
        });

        let capabilities = self.capabilities.clone();
        let mut replaced = 0;

        let res = self.walk(false, "reoverride", |cursor, name, data| {
            if let Some(chunk) = capabilities.reoverride(overrides, name, &data.chunk)? {
                cursor.replace_current(&chunk)?;
                replaced += 1;
            }

            Ok(())
        });

        Self::walk_outcome(res, replaced)
    }

    /// Complete the checksums of every record from the file store.
    ///
    /// Files are checked against what the store knows. Records are only rewritten when
    /// something was learned.
    pub fn redo_checksums(&mut self, files: &mut dyn FileStore) -> Result<Outcome> {
        self.check_no_cursor()?;
        self.emit(CatalogEvent::RedoingChecksums {
            identifier: self.identifier.clone(),
        });

        let identifier = self.identifier.clone();
        let capabilities = self.capabilities.clone();
        let mut replaced = 0;

        let res = self.walk(false, "redo checksums", |cursor, name, data| {
            let mut listed = capabilities
                .checksums(&data.chunk)
                .map_err(|e| CatalogError::extraction(&identifier, name, "checksums", e))?;

            if !files.check_or_improve(&mut listed)? {
                return Ok(());
            }

            if let Some(chunk) = capabilities.complete_checksums(&data.chunk, &listed)? {
                cursor.replace_current(&chunk)?;
                replaced += 1;
            }

            Ok(())
        });

        Self::walk_outcome(res, replaced)
    }

    /// Replay every record to a logger.
    pub fn rerun_notifiers(&mut self, logger: &mut dyn PackageLogger) -> Result<()> {
        self.check_no_cursor()?;
        self.emit(CatalogEvent::RerunningNotifiers {
            identifier: self.identifier.clone(),
        });

        let identifier = self.identifier.clone();
        let capabilities = self.capabilities.clone();

        self.walk(true, "rerun notifiers", |_, name, data| {
            let version = capabilities
                .version(&data.chunk)
                .map_err(|e| CatalogError::extraction(&identifier, name, "version", e))?;
            let keys = capabilities
                .file_keys(&data.chunk)
                .map_err(|e| CatalogError::extraction(&identifier, name, "file keys", e))?;

            logger.rerun(&identifier, name, &version, &data.chunk, &keys)
        })
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            admission::NewPackage,
            checksums::{ChecksumType, Checksums},
            files::PoolFileStore,
            references::MemoryReferences,
            target::TargetOptions,
            testutil::{binary_target, context, deb_chunk, deb_key, take_events},
        },
    };

    fn add(
        target: &mut Target,
        refs: &mut MemoryReferences,
        name: &str,
        version: &str,
    ) -> Result<()> {
        let chunk = deb_chunk(name, version);
        let keys = vec![deb_key(name, version)];

        target.open_table(false)?;
        target.add_package(
            refs,
            None,
            None,
            &NewPackage::new(name, version, &chunk, &keys, "amd64"),
            None,
        )?;
        target.close_table()
    }

    #[derive(Default)]
    struct RecordingLogger {
        reruns: Vec<(String, String, Vec<String>)>,
    }

    impl PackageLogger for RecordingLogger {
        fn log(&mut self, _entry: &crate::logger::LogEntry<'_>) -> Result<()> {
            Ok(())
        }

        fn rerun(
            &mut self,
            _identifier: &str,
            name: &str,
            version: &str,
            _chunk: &str,
            file_keys: &[String],
        ) -> Result<()> {
            self.reruns
                .push((name.to_string(), version.to_string(), file_keys.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn rereference_is_idempotent() -> Result<()> {
        let (context, _) = context();
        let mut target = binary_target(&context, &TargetOptions::default())?;
        let mut refs = MemoryReferences::default();

        add(&mut target, &mut refs, "foo", "1.0")?;
        add(&mut target, &mut refs, "bar", "2.0")?;
        let before = refs.clone();

        // A stray reference is dropped.
        refs.add(target.identifier(), &["pool/stray.deb".to_string()])?;

        target.rereference(&mut refs)?;
        assert_eq!(refs, before);
        target.rereference(&mut refs)?;
        assert_eq!(refs, before);

        target.reference_snapshot(&mut refs, "s=bookworm=nightly")?;
        assert_eq!(
            refs.keys_of("s=bookworm=nightly"),
            refs.keys_of(target.identifier())
        );

        Ok(())
    }

    #[test]
    fn reoverride_only_writes_changes() -> Result<()> {
        let (context, events) = context();
        let mut target = binary_target(&context, &TargetOptions::default())?;
        let mut refs = MemoryReferences::default();

        add(&mut target, &mut refs, "foo", "1.0")?;
        add(&mut target, &mut refs, "bar", "1.0")?;
        target.was_modified = false;

        let overrides = OverrideFile::parse_str("qux optional devel\n")?;
        assert_eq!(target.reoverride(&overrides)?, Outcome::Nothing);
        assert!(!target.was_modified());

        let overrides = OverrideFile::parse_str("foo optional devel\n")?;
        assert!(target.reoverride(&overrides)?.is_changed());
        assert!(target.was_modified());

        target.open_table(true)?;
        let foo = target.get_package("foo", None)?.unwrap();
        assert!(foo.chunk.contains("Section: devel\n"));
        assert_eq!(
            target.get_package("bar", None)?.unwrap().chunk,
            deb_chunk("bar", "1.0")
        );
        target.close_table()?;

        target.was_modified = false;
        assert_eq!(target.reoverride(&overrides)?, Outcome::Nothing);
        assert!(!target.was_modified());

        assert!(take_events(&events).contains(&CatalogEvent::ReapplyingOverrides {
            identifier: "bookworm|main|amd64".into()
        }));

        Ok(())
    }

    #[test]
    fn redo_checksums() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let (context, events) = context();
        let mut target = binary_target(&context, &TargetOptions::default())?;
        let mut refs = MemoryReferences::default();
        let mut files = PoolFileStore::new(td.path());

        add(&mut target, &mut refs, "bar", "1.0")?;
        add(&mut target, &mut refs, "foo", "1.0")?;
        target.was_modified = false;

        // Only bar's file exists, so the walk stops at foo after rewriting bar.
        files.add_file(&deb_key("bar", "1.0"), b"bar")?;
        let err = target.redo_checksums(&mut files).unwrap_err();
        match err {
            CatalogError::Incomplete { updates, source } => {
                assert!(updates.table);
                assert!(matches!(*source, CatalogError::MissingFile(_)));
            }
            e => panic!("unexpected error: {}", e),
        }
        assert!(take_events(&events).contains(&CatalogEvent::StoppedAfterError {
            identifier: "bookworm|main|amd64".into(),
            operation: "redo checksums",
        }));
        assert!(target.was_modified());

        target.open_table(true)?;
        let bar = target.get_package("bar", None)?.unwrap();
        assert_eq!(
            target.capabilities().checksums(&bar.chunk)?[0].checksums,
            Checksums::compute(b"bar")
        );
        target.close_table()?;

        files.add_file(&deb_key("foo", "1.0"), b"foo")?;
        assert!(target.redo_checksums(&mut files)?.is_changed());

        // Nothing left to learn.
        target.was_modified = false;
        assert_eq!(target.redo_checksums(&mut files)?, Outcome::Nothing);
        assert!(!target.was_modified());

        target.open_table(true)?;
        let foo = target.get_package("foo", None)?.unwrap();
        assert!(target.capabilities().checksums(&foo.chunk)?[0]
            .checksums
            .digest(ChecksumType::Sha1)
            .is_some());

        Ok(())
    }

    #[test]
    fn rerun_notifiers() -> Result<()> {
        let (context, _) = context();
        let mut target = binary_target(&context, &TargetOptions::default())?;
        let mut refs = MemoryReferences::default();
        let mut logger = RecordingLogger::default();

        add(&mut target, &mut refs, "foo", "1:1.0")?;
        target.rerun_notifiers(&mut logger)?;

        assert_eq!(
            logger.reruns,
            vec![(
                "foo".to_string(),
                "1:1.0".to_string(),
                vec![deb_key("foo", "1:1.0")]
            )]
        );

        Ok(())
    }
}
