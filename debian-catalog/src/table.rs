// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Ordered record tables.

The catalog engine stores records in an ordered key-value table per partition. The
storage engine is abstracted by [TableStore] and [RecordTable]. [MemoryTableStore] is
an in-memory implementation.

While a cursor is open on a table, only the cursor's own delete and replace operations
may mutate it.
*/

use {
    crate::{
        error::{CatalogError, Result},
        record::KEY_SEPARATOR,
        version::VersionComparator,
    },
    std::{
        cmp::Ordering,
        collections::{BTreeMap, HashMap},
        ops::Bound,
        sync::{Arc, Mutex, MutexGuard},
    },
};

/// A position in a [RecordTable].
///
/// Holds the key most recently produced and whether that element is still current,
/// i.e. has not been deleted through the cursor.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TableCursor {
    last: Option<String>,
    current: bool,
}

impl TableCursor {
    /// The key most recently produced by the cursor.
    pub fn last_key(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// The key of the current element, if it was not deleted.
    pub fn current_key(&self) -> Result<&str> {
        match (&self.last, self.current) {
            (Some(key), true) => Ok(key),
            _ => Err(CatalogError::CursorNoCurrent),
        }
    }

    /// Record that the cursor advanced to `key`.
    pub fn advance_to(&mut self, key: String) {
        self.last = Some(key);
        self.current = true;
    }

    /// Record that the current element was deleted.
    pub fn invalidate(&mut self) {
        self.current = false;
    }
}

/// An open handle on a partition's record table.
pub trait RecordTable {
    /// The partition identifier this table belongs to.
    fn identifier(&self) -> &str;

    /// Whether the handle was opened read-only.
    fn is_read_only(&self) -> bool;

    /// Obtain the bytes stored under an exact key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Obtain the key and bytes of the current record of a package name.
    ///
    /// When several versions of a name are stored, the highest version is current.
    fn get_latest(&self, name: &str) -> Result<Option<(String, Vec<u8>)>>;

    /// Store a record under a new key.
    ///
    /// Errors if the key exists, unless `allow_overwrite` is set.
    fn insert(&mut self, key: &str, bytes: &[u8], allow_overwrite: bool) -> Result<()>;

    /// Replace the record under an existing key.
    fn replace(&mut self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Delete a key, returning whether it existed.
    fn delete(&mut self, key: &str) -> Result<bool>;

    /// Open a cursor positioned before the first record.
    fn open_cursor(&mut self) -> Result<TableCursor>;

    /// Advance a cursor, returning the next key and record.
    fn cursor_next(&mut self, cursor: &mut TableCursor) -> Result<Option<(String, Vec<u8>)>>;

    /// Delete the record the cursor last produced.
    fn cursor_delete(&mut self, cursor: &mut TableCursor) -> Result<()>;

    /// Replace the record the cursor last produced.
    fn cursor_replace(&mut self, cursor: &TableCursor, bytes: &[u8]) -> Result<()>;

    /// Release a cursor.
    fn close_cursor(&mut self, cursor: TableCursor) -> Result<()>;

    /// Close the handle.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens record tables by partition identifier.
pub trait TableStore {
    /// Open the table of a partition.
    fn open(&self, identifier: &str, read_only: bool) -> Result<Box<dyn RecordTable>>;
}

type Tables = HashMap<String, BTreeMap<String, Vec<u8>>>;

/// A [TableStore] keeping every table in memory.
///
/// Table contents persist across handles for the lifetime of the store. Clones
/// share contents.
#[derive(Clone)]
pub struct MemoryTableStore {
    tables: Arc<Mutex<Tables>>,
    versions: Arc<dyn VersionComparator>,
}

impl MemoryTableStore {
    /// Construct an empty store ordering composite keys with the given comparator.
    pub fn new(versions: Arc<dyn VersionComparator>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(HashMap::new())),
            versions,
        }
    }

    /// Obtain a copy of all records of a table, in key order.
    pub fn records(&self, identifier: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(lock(&self.tables)?
            .get(identifier)
            .map(|table| {
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default())
    }
}

impl TableStore for MemoryTableStore {
    fn open(&self, identifier: &str, read_only: bool) -> Result<Box<dyn RecordTable>> {
        lock(&self.tables)?
            .entry(identifier.to_string())
            .or_default();

        Ok(Box::new(MemoryTable {
            identifier: identifier.to_string(),
            read_only,
            open_cursors: 0,
            tables: self.tables.clone(),
            versions: self.versions.clone(),
        }))
    }
}

fn lock(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>> {
    tables
        .lock()
        .map_err(|_| CatalogError::Other("table store lock poisoned".to_string()))
}

/// A handle on a table of a [MemoryTableStore].
pub struct MemoryTable {
    identifier: String,
    read_only: bool,
    open_cursors: usize,
    tables: Arc<Mutex<Tables>>,
    versions: Arc<dyn VersionComparator>,
}

impl MemoryTable {
    fn with_table<T>(&self, f: impl FnOnce(&mut BTreeMap<String, Vec<u8>>) -> T) -> Result<T> {
        let mut tables = lock(&self.tables)?;

        Ok(f(tables.entry(self.identifier.clone()).or_default()))
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            Err(CatalogError::TableReadOnly(self.identifier.clone()))
        } else {
            Ok(())
        }
    }

    fn check_no_cursor(&self) -> Result<()> {
        if self.open_cursors > 0 {
            Err(CatalogError::CursorOpen(self.identifier.clone()))
        } else {
            Ok(())
        }
    }
}

impl RecordTable for MemoryTable {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_table(|table| table.get(key).cloned())
    }

    fn get_latest(&self, name: &str) -> Result<Option<(String, Vec<u8>)>> {
        let prefix = format!("{}{}", name, KEY_SEPARATOR);

        let candidates = self.with_table(|table| {
            if let Some(bytes) = table.get(name) {
                return vec![(name.to_string(), bytes.clone())];
            }

            table
                .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Vec<_>>()
        })?;

        let mut latest: Option<(String, Vec<u8>)> = None;

        for (key, bytes) in candidates {
            latest = match latest {
                None => Some((key, bytes)),
                Some((best, best_bytes)) => {
                    let ordering = self
                        .versions
                        .compare(&key[prefix.len()..], &best[prefix.len()..])?;

                    if ordering == Ordering::Greater {
                        Some((key, bytes))
                    } else {
                        Some((best, best_bytes))
                    }
                }
            };
        }

        Ok(latest)
    }

    fn insert(&mut self, key: &str, bytes: &[u8], allow_overwrite: bool) -> Result<()> {
        self.check_writable()?;
        self.check_no_cursor()?;

        self.with_table(|table| {
            if !allow_overwrite && table.contains_key(key) {
                return Err(CatalogError::RecordExists(key.to_string()));
            }
            table.insert(key.to_string(), bytes.to_vec());

            Ok(())
        })?
    }

    fn replace(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.check_no_cursor()?;

        self.with_table(|table| match table.get_mut(key) {
            Some(existing) => {
                *existing = bytes.to_vec();
                Ok(())
            }
            None => Err(CatalogError::RecordMissing(key.to_string())),
        })?
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        self.check_writable()?;
        self.check_no_cursor()?;

        self.with_table(|table| table.remove(key).is_some())
    }

    fn open_cursor(&mut self) -> Result<TableCursor> {
        self.open_cursors += 1;

        Ok(TableCursor::default())
    }

    fn cursor_next(&mut self, cursor: &mut TableCursor) -> Result<Option<(String, Vec<u8>)>> {
        let next = self.with_table(|table| {
            let lower = match cursor.last_key() {
                Some(key) => Bound::Excluded(key),
                None => Bound::Unbounded,
            };

            table
                .range::<str, _>((lower, Bound::Unbounded))
                .next()
                .map(|(k, v)| (k.clone(), v.clone()))
        })?;

        match next {
            Some((key, bytes)) => {
                cursor.advance_to(key.clone());
                Ok(Some((key, bytes)))
            }
            None => {
                cursor.invalidate();
                Ok(None)
            }
        }
    }

    fn cursor_delete(&mut self, cursor: &mut TableCursor) -> Result<()> {
        self.check_writable()?;
        let key = cursor.current_key()?.to_string();

        self.with_table(|table| table.remove(&key))?
            .ok_or(CatalogError::RecordMissing(key))?;
        cursor.invalidate();

        Ok(())
    }

    fn cursor_replace(&mut self, cursor: &TableCursor, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        let key = cursor.current_key()?;

        self.with_table(|table| match table.get_mut(key) {
            Some(existing) => {
                *existing = bytes.to_vec();
                Ok(())
            }
            None => Err(CatalogError::RecordMissing(key.to_string())),
        })?
    }

    fn close_cursor(&mut self, _cursor: TableCursor) -> Result<()> {
        self.open_cursors = self.open_cursors.saturating_sub(1);

        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        if self.open_cursors > 0 {
            return Err(CatalogError::CursorOpen(self.identifier.clone()));
        }

        Ok(())
    }
}
