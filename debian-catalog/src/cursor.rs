// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Walking over the records of a partition.

A [PackageCursor] is an [Iterator] over `(name, record)` pairs in key order. While it
is open, the element it last produced can be deleted or replaced through it. Every
other way of modifying the partition is refused until the cursor is closed.
*/

use {
    crate::{
        error::{CatalogError, Result},
        logger::PackageLogger,
        outcome::Outcome,
        record::{name_from_key, PackageData},
        references::ReferenceLedger,
        removal::Deletion,
        table::TableCursor,
        target::Target,
        tracking::TrackingLedger,
    },
};

/// An open walk over a partition.
pub struct PackageCursor<'t> {
    target: &'t mut Target,
    cursor: Option<TableCursor>,
    current: Option<(String, PackageData)>,
    opened_table: bool,
}

impl Target {
    /// Open a walk over every record.
    ///
    /// A writable walk needs the table to be closed and opens it itself. A read-only
    /// walk reuses an open table. A table opened by the walk is closed with it.
    pub fn open_cursor(&mut self, read_only: bool) -> Result<PackageCursor<'_>> {
        self.check_no_cursor()?;

        let opened_table = match (self.packages.is_some(), read_only) {
            (false, _) => {
                self.open_table(read_only)?;
                true
            }
            (true, true) => false,
            (true, false) => {
                return Err(CatalogError::TableAlreadyOpen(self.identifier.clone()));
            }
        };

        let cursor = match self.table_mut()?.open_cursor() {
            Ok(cursor) => cursor,
            Err(e) => {
                if opened_table {
                    self.close_table()?;
                }
                return Err(e);
            }
        };
        self.cursor_open = true;

        Ok(PackageCursor {
            target: self,
            cursor: Some(cursor),
            current: None,
            opened_table,
        })
    }
}

impl<'t> PackageCursor<'t> {
    /// The partition walked over.
    pub fn target(&self) -> &Target {
        self.target
    }

    /// The element last produced, if it was not deleted.
    pub fn current(&self) -> Option<(&str, &PackageData)> {
        self.current
            .as_ref()
            .map(|(key, data)| (name_from_key(key), data))
    }

    /// Delete the element last produced.
    ///
    /// Only the table is changed. See [Self::remove_current()] for a removal that
    /// keeps the ledgers consistent.
    pub fn delete_current(&mut self) -> Result<()> {
        if self.current.is_none() {
            return Err(CatalogError::CursorNoCurrent);
        }

        let cursor = self.cursor.as_mut().ok_or(CatalogError::CursorClosed)?;
        self.target.table_mut()?.cursor_delete(cursor)?;
        self.current = None;
        self.target.was_modified = true;

        Ok(())
    }

    /// Replace the control chunk of the element last produced.
    pub fn replace_current(&mut self, chunk: &str) -> Result<()> {
        let (_, data) = self.current.as_mut().ok_or(CatalogError::CursorNoCurrent)?;
        let cursor = self.cursor.as_ref().ok_or(CatalogError::CursorClosed)?;

        let replacement = PackageData::new(&data.version, chunk);
        self.target
            .table_mut()?
            .cursor_replace(cursor, &replacement.encode())?;

        *data = replacement;
        self.target.was_modified = true;

        Ok(())
    }

    /// Remove the element last produced, updating references and tracking.
    pub fn remove_current(
        &mut self,
        refs: &mut dyn ReferenceLedger,
        logger: Option<&mut dyn PackageLogger>,
        tracking: Option<&mut dyn TrackingLedger>,
    ) -> Result<Outcome> {
        let (key, data) = self.current.as_ref().ok_or(CatalogError::CursorNoCurrent)?;
        let cursor = self.cursor.as_mut().ok_or(CatalogError::CursorClosed)?;

        let res = self.target.remove_record(
            Deletion::Cursor(cursor),
            name_from_key(key),
            data,
            refs,
            logger,
            tracking,
        );

        // The record stays current unless it left the table.
        if matches!(res, Ok(_) | Err(CatalogError::Incomplete { .. })) {
            self.current = None;
        }

        res
    }

    fn finish(&mut self) -> Result<()> {
        self.current = None;

        let mut res = Ok(());

        if let Some(cursor) = self.cursor.take() {
            self.target.cursor_open = false;
            res = self
                .target
                .table_mut()
                .and_then(|table| table.close_cursor(cursor));
        }

        if self.opened_table {
            self.opened_table = false;
            let closed = self.target.close_table();
            res = res.and(closed);
        }

        res
    }

    /// Close the cursor, and the table if the cursor opened it.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }
}

impl<'t> Iterator for PackageCursor<'t> {
    type Item = Result<(String, PackageData)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.current = None;

        let table = match self.target.packages.as_deref_mut() {
            Some(table) => table,
            None => return None,
        };
        let cursor = self.cursor.as_mut()?;

        let (key, bytes) = match table.cursor_next(cursor) {
            Ok(Some(next)) => next,
            Ok(None) => return None,
            Err(e) => return Some(Err(e)),
        };

        Some(match PackageData::decode(&key, &bytes) {
            Ok(Some(data)) => {
                let name = name_from_key(&key).to_string();
                self.current = Some((key, data.clone()));
                Ok((name, data))
            }
            Ok(None) => Err(CatalogError::MalformedRecord(key, "empty record")),
            Err(e) => Err(e),
        })
    }
}

impl<'t> Drop for PackageCursor<'t> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!(
                "error closing cursor of {}: {}",
                self.target.identifier(),
                e
            );
        }
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            admission::NewPackage,
            references::MemoryReferences,
            table::{RecordTable, TableStore},
            target::TargetOptions,
            testutil::{binary_target, context, deb_chunk, deb_key},
        },
        std::sync::Arc,
    };

    /// Opens tables whose cursors fail to close.
    struct StuckCursorStore(Arc<dyn TableStore>);

    impl TableStore for StuckCursorStore {
        fn open(&self, identifier: &str, read_only: bool) -> Result<Box<dyn RecordTable>> {
            Ok(Box::new(StuckCursorTable(self.0.open(identifier, read_only)?)))
        }
    }

    struct StuckCursorTable(Box<dyn RecordTable>);

    impl RecordTable for StuckCursorTable {
        fn identifier(&self) -> &str {
            self.0.identifier()
        }

        fn is_read_only(&self) -> bool {
            self.0.is_read_only()
        }

        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.0.get(key)
        }

        fn get_latest(&self, name: &str) -> Result<Option<(String, Vec<u8>)>> {
            self.0.get_latest(name)
        }

        fn insert(&mut self, key: &str, bytes: &[u8], allow_overwrite: bool) -> Result<()> {
            self.0.insert(key, bytes, allow_overwrite)
        }

        fn replace(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
            self.0.replace(key, bytes)
        }

        fn delete(&mut self, key: &str) -> Result<bool> {
            self.0.delete(key)
        }

        fn open_cursor(&mut self) -> Result<TableCursor> {
            self.0.open_cursor()
        }

        fn cursor_next(&mut self, cursor: &mut TableCursor) -> Result<Option<(String, Vec<u8>)>> {
            self.0.cursor_next(cursor)
        }

        fn cursor_delete(&mut self, cursor: &mut TableCursor) -> Result<()> {
            self.0.cursor_delete(cursor)
        }

        fn cursor_replace(&mut self, cursor: &TableCursor, bytes: &[u8]) -> Result<()> {
            self.0.cursor_replace(cursor, bytes)
        }

        fn close_cursor(&mut self, cursor: TableCursor) -> Result<()> {
            self.0.close_cursor(cursor)?;
            Err(CatalogError::Other("cursor close failed".into()))
        }

        fn close(self: Box<Self>) -> Result<()> {
            self.0.close()
        }
    }

    fn populated() -> Result<(Target, MemoryReferences)> {
        let (context, _) = context();
        let mut target = binary_target(&context, &TargetOptions::default())?;
        let mut refs = MemoryReferences::default();

        target.open_table(false)?;
        for name in ["alpha", "beta", "gamma"] {
            let chunk = deb_chunk(name, "1.0");
            let keys = vec![deb_key(name, "1.0")];
            target.add_package(
                &mut refs,
                None,
                None,
                &NewPackage::new(name, "1.0", &chunk, &keys, "amd64"),
                None,
            )?;
        }
        target.close_table()?;

        Ok((target, refs))
    }

    #[test]
    fn walk_in_key_order() -> Result<()> {
        let (mut target, _) = populated()?;

        let names = target
            .open_cursor(true)?
            .map(|entry| entry.map(|(name, _)| name))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);

        // The walk opened the table and closed it again.
        assert!(!target.is_open());

        Ok(())
    }

    #[test]
    fn other_mutations_refused_while_open() -> Result<()> {
        let (mut target, mut refs) = populated()?;
        target.open_table(true)?;

        let mut cursor = target.open_cursor(true)?;
        cursor.next().transpose()?;
        assert!(matches!(
            cursor.target().check_no_cursor(),
            Err(CatalogError::CursorOpen(_))
        ));
        cursor.close()?;

        // The table was open before the walk and stays open.
        assert!(target.is_open());
        assert!(matches!(
            target.open_cursor(false),
            Err(CatalogError::TableAlreadyOpen(_))
        ));
        target.close_table()?;

        let mut cursor = target.open_cursor(false)?;
        assert!(matches!(
            cursor.delete_current(),
            Err(CatalogError::CursorNoCurrent)
        ));
        drop(cursor);

        // Closing the walk closed the table it opened.
        assert!(matches!(
            target.remove_package(&mut refs, None, None, "alpha", None),
            Err(CatalogError::TableNotOpen(_))
        ));

        Ok(())
    }

    #[test]
    fn mutate_through_cursor() -> Result<()> {
        let (mut target, mut refs) = populated()?;
        assert!(target.was_modified());
        target.was_modified = false;

        let mut cursor = target.open_cursor(false)?;
        while let Some(entry) = cursor.next() {
            let (name, data) = entry?;

            match name.as_str() {
                "alpha" => {
                    cursor.replace_current(&format!("{}Priority: optional\n", data.chunk))?;
                    assert!(cursor.current().unwrap().1.chunk.contains("Priority"));
                }
                "beta" => {
                    let outcome = cursor.remove_current(&mut refs, None, None)?;
                    assert!(outcome.is_changed());
                    assert!(cursor.current().is_none());
                    assert!(matches!(
                        cursor.replace_current("Package: beta\n"),
                        Err(CatalogError::CursorNoCurrent)
                    ));
                }
                _ => cursor.delete_current()?,
            }
        }
        cursor.close()?;

        assert!(target.was_modified());
        assert!(target.has_stale_tracking());
        assert!(!refs.is_referenced(&deb_key("beta", "1.0")));
        // Plain deletion leaves the ledgers alone.
        assert!(refs.is_referenced(&deb_key("gamma", "1.0")));

        target.open_table(true)?;
        let alpha = target.get_package("alpha", None)?.unwrap();
        assert_eq!(alpha.version, "1.0");
        assert!(alpha.chunk.ends_with("Priority: optional\n"));
        assert_eq!(target.get_package("beta", None)?, None);
        assert_eq!(target.get_package("gamma", None)?, None);

        Ok(())
    }

    #[test]
    fn failed_removal_keeps_current() -> Result<()> {
        let (mut target, mut refs) = populated()?;

        // Nothing names the file of this record.
        let chunk = "Package: broken\nVersion: 1.0\nArchitecture: amd64\n";
        target.open_table(false)?;
        target.add_package(
            &mut refs,
            None,
            None,
            &NewPackage::new("broken", "1.0", chunk, &[], "amd64"),
            None,
        )?;
        target.close_table()?;

        let mut cursor = target.open_cursor(false)?;
        while let Some(entry) = cursor.next() {
            let (name, _) = entry?;
            if name != "broken" {
                continue;
            }

            assert!(matches!(
                cursor.remove_current(&mut refs, None, None),
                Err(CatalogError::Extraction {
                    what: "file keys",
                    ..
                })
            ));
            assert_eq!(cursor.current().map(|(name, _)| name), Some("broken"));
            cursor.delete_current()?;
            assert!(cursor.current().is_none());
        }
        cursor.close()?;

        target.open_table(true)?;
        assert_eq!(target.get_package("broken", None)?, None);
        assert!(target.get_package("alpha", None)?.is_some());

        Ok(())
    }

    #[test]
    fn failed_close_releases_target() -> Result<()> {
        let (mut context, _) = context();
        context.store = Arc::new(StuckCursorStore(context.store.clone()));
        let mut target = binary_target(&context, &TargetOptions::default())?;
        let mut refs = MemoryReferences::default();

        let mut cursor = target.open_cursor(false)?;
        assert!(cursor.next().is_none());
        assert!(matches!(cursor.close(), Err(CatalogError::Other(_))));

        // Neither the cursor nor the table it opened linger.
        assert!(!target.is_open());
        target.open_table(false)?;
        let chunk = deb_chunk("alpha", "1.0");
        let keys = vec![deb_key("alpha", "1.0")];
        assert!(target
            .add_package(
                &mut refs,
                None,
                None,
                &NewPackage::new("alpha", "1.0", &chunk, &keys, "amd64"),
                None,
            )?
            .is_changed());
        target.close_table()?;

        Ok(())
    }
}
