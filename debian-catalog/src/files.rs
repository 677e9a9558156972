// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Content-addressed pool file store. */

use {
    crate::{
        checksums::{Checksums, FileChecksums},
        error::{CatalogError, Result},
    },
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
};

/// Result of verifying a file against expected checksums.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileVerification {
    /// The file exists and every known property matches.
    Ok,
    /// The file does not exist.
    Missing,
    /// The named property differs.
    Mismatch(&'static str),
}

/// A store of pool files addressed by file key.
pub trait FileStore {
    /// Verify a file against expected checksums.
    fn verify(&self, key: &str, expected: &Checksums) -> Result<FileVerification>;

    /// Check files against the store and fill in properties the store knows of.
    ///
    /// Errors if a file is missing or differs. Returns whether any checksums were
    /// improved.
    fn check_or_improve(&mut self, files: &mut [FileChecksums]) -> Result<bool>;
}

/// A [FileStore] backed by a pool directory and a database of known checksums.
#[derive(Clone, Debug)]
pub struct PoolFileStore {
    root: PathBuf,
    known: BTreeMap<String, Checksums>,
}

impl PoolFileStore {
    /// Construct an instance for the pool rooted at a directory.
    ///
    /// File keys are relative to this directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            known: BTreeMap::new(),
        }
    }

    /// Filesystem path of a file key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Write a file into the pool and register its checksums.
    pub fn add_file(&mut self, key: &str, data: &[u8]) -> Result<Checksums> {
        let path = self.path(key);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::IoPath(format!("{}", parent.display()), e))?;
        }
        std::fs::write(&path, data)
            .map_err(|e| CatalogError::IoPath(format!("{}", path.display()), e))?;

        let checksums = Checksums::compute(data);
        self.known.insert(key.to_string(), checksums.clone());

        Ok(checksums)
    }

    /// Register checksums of a file without touching the filesystem.
    pub fn register(&mut self, key: &str, checksums: Checksums) {
        self.known.insert(key.to_string(), checksums);
    }

    /// The checksums the database holds for a file.
    pub fn known(&self, key: &str) -> Option<&Checksums> {
        self.known.get(key)
    }

    /// Resolve what is known about a file, digesting it if it is only on disk.
    fn lookup(&self, key: &str) -> Result<Option<Checksums>> {
        if let Some(checksums) = self.known.get(key) {
            return Ok(Some(checksums.clone()));
        }

        let path = self.path(key);
        match std::fs::File::open(&path) {
            Ok(fh) => Ok(Some(
                Checksums::compute_reader(fh)
                    .map_err(|e| CatalogError::IoPath(format!("{}", path.display()), e))?,
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CatalogError::IoPath(format!("{}", path.display()), e)),
        }
    }
}

impl FileStore for PoolFileStore {
    fn verify(&self, key: &str, expected: &Checksums) -> Result<FileVerification> {
        Ok(match self.lookup(key)? {
            None => FileVerification::Missing,
            Some(actual) => match expected.first_mismatch(&actual) {
                Some(property) => FileVerification::Mismatch(property),
                None => FileVerification::Ok,
            },
        })
    }

    fn check_or_improve(&mut self, files: &mut [FileChecksums]) -> Result<bool> {
        let mut improved = false;

        for file in files.iter_mut() {
            let mut actual = self
                .lookup(&file.key)?
                .ok_or_else(|| CatalogError::MissingFile(file.key.clone()))?;

            if let Some(property) = file.checksums.first_mismatch(&actual) {
                return Err(CatalogError::ChecksumMismatch(file.key.clone(), property));
            }

            improved |= file.checksums.improve_from(&actual);

            // The database learns what only the record knew.
            if actual.improve_from(&file.checksums) || !self.known.contains_key(&file.key) {
                self.known.insert(file.key.clone(), actual);
            }
        }

        Ok(improved)
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::checksums::{ChecksumType, ContentDigest},
    };

    #[test]
    fn verify_and_improve() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let mut store = PoolFileStore::new(td.path());

        let full = store.add_file("pool/main/h/hello/hello_1.0_all.deb", b"deb content")?;
        assert!(td.path().join("pool/main/h/hello/hello_1.0_all.deb").exists());

        let mut partial = Checksums::default();
        partial.set_digest(full.digest(ChecksumType::Md5).unwrap().clone());

        assert_eq!(
            store.verify("pool/main/h/hello/hello_1.0_all.deb", &partial)?,
            FileVerification::Ok
        );
        assert_eq!(
            store.verify("pool/main/h/hello/missing.deb", &partial)?,
            FileVerification::Missing
        );

        let mut files = vec![FileChecksums {
            key: "pool/main/h/hello/hello_1.0_all.deb".into(),
            checksums: partial,
        }];
        assert!(store.check_or_improve(&mut files)?);
        assert_eq!(files[0].checksums, full);
        assert!(!store.check_or_improve(&mut files)?);

        let mut wrong = Checksums::default();
        wrong.set_digest(ContentDigest::from_hex_digest(
            ChecksumType::Sha1,
            "0000000000000000000000000000000000000000",
        )?);
        assert_eq!(
            store.verify("pool/main/h/hello/hello_1.0_all.deb", &wrong)?,
            FileVerification::Mismatch("sha1")
        );

        Ok(())
    }

    #[test]
    fn files_only_on_disk_are_digested() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        std::fs::create_dir_all(td.path().join("pool"))?;
        std::fs::write(td.path().join("pool/x"), b"x")?;

        let mut store = PoolFileStore::new(td.path());
        let mut files = vec![FileChecksums {
            key: "pool/x".into(),
            checksums: Checksums::default(),
        }];

        assert!(store.check_or_improve(&mut files)?);
        assert_eq!(store.known("pool/x"), Some(&Checksums::compute(b"x")));

        files[0].key = "pool/y".into();
        assert!(matches!(
            store.check_or_improve(&mut files),
            Err(CatalogError::MissingFile(_))
        ));

        Ok(())
    }
}
