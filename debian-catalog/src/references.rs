// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! File reference ledger.

Records which partitions reference which pool files, so files are only deleted once
nothing refers to them anymore.
*/

use {
    crate::error::Result,
    std::collections::{BTreeMap, BTreeSet},
};

/// Reference counting of file keys by partition identifier.
pub trait ReferenceLedger {
    /// Add a reference for each of `keys` that is not among `old_keys`.
    fn insert(
        &mut self,
        identifier: &str,
        keys: &[String],
        old_keys: Option<&[String]>,
    ) -> Result<()>;

    /// Release a reference for each of `old_keys` that is not among `new_keys`.
    fn delete(
        &mut self,
        identifier: &str,
        old_keys: &[String],
        new_keys: Option<&[String]>,
    ) -> Result<()>;

    /// Add a reference for every key.
    fn add(&mut self, identifier: &str, keys: &[String]) -> Result<()>;

    /// Release every reference held by a partition.
    fn remove(&mut self, identifier: &str) -> Result<()>;

    /// Obtain the keys a partition does not hold a reference to.
    fn check(&self, identifier: &str, keys: &[String]) -> Result<Vec<String>>;
}

fn not_in<'a>(
    keys: &'a [String],
    exclude: Option<&'a [String]>,
) -> impl Iterator<Item = &'a String> {
    keys.iter()
        .filter(move |key| !exclude.map(|x| x.contains(*key)).unwrap_or(false))
}

/// An in-memory [ReferenceLedger].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoryReferences {
    // (file key, identifier) -> count.
    counts: BTreeMap<(String, String), usize>,
}

impl MemoryReferences {
    /// Number of references a partition holds on a file.
    pub fn count(&self, key: &str, identifier: &str) -> usize {
        self.counts
            .get(&(key.to_string(), identifier.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Whether anything references a file.
    pub fn is_referenced(&self, key: &str) -> bool {
        self.counts.keys().any(|(k, _)| k == key)
    }

    /// The file keys referenced by a partition.
    pub fn keys_of(&self, identifier: &str) -> BTreeSet<String> {
        self.counts
            .keys()
            .filter(|(_, id)| id == identifier)
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn increment(&mut self, key: &str, identifier: &str) {
        *self
            .counts
            .entry((key.to_string(), identifier.to_string()))
            .or_default() += 1;
    }

    fn decrement(&mut self, key: &str, identifier: &str) {
        let entry = (key.to_string(), identifier.to_string());

        match self.counts.get_mut(&entry) {
            Some(count) if *count > 1 => {
                *count -= 1;
            }
            Some(_) => {
                self.counts.remove(&entry);
            }
            None => {
                log::warn!("{} did not hold a reference to {}", identifier, key);
            }
        }
    }
}

impl ReferenceLedger for MemoryReferences {
    fn insert(
        &mut self,
        identifier: &str,
        keys: &[String],
        old_keys: Option<&[String]>,
    ) -> Result<()> {
        for key in not_in(keys, old_keys) {
            self.increment(key, identifier);
        }

        Ok(())
    }

    fn delete(
        &mut self,
        identifier: &str,
        old_keys: &[String],
        new_keys: Option<&[String]>,
    ) -> Result<()> {
        for key in not_in(old_keys, new_keys) {
            self.decrement(key, identifier);
        }

        Ok(())
    }

    fn add(&mut self, identifier: &str, keys: &[String]) -> Result<()> {
        for key in keys {
            self.increment(key, identifier);
        }

        Ok(())
    }

    fn remove(&mut self, identifier: &str) -> Result<()> {
        self.counts.retain(|(_, id), _| id != identifier);

        Ok(())
    }

    fn check(&self, identifier: &str, keys: &[String]) -> Result<Vec<String>> {
        Ok(keys
            .iter()
            .filter(|key| self.count(key, identifier) == 0)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn keys(values: &[&str]) -> Vec<String> {
        values.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn shared_keys_survive_replacement() -> Result<()> {
        let mut refs = MemoryReferences::default();
        let old = keys(&["pool/a", "pool/shared"]);
        let new = keys(&["pool/b", "pool/shared"]);

        refs.insert("p", &old, None)?;
        refs.insert("p", &new, Some(old.as_slice()))?;
        refs.delete("p", &old, Some(new.as_slice()))?;

        assert_eq!(refs.count("pool/shared", "p"), 1);
        assert_eq!(refs.count("pool/a", "p"), 0);
        assert_eq!(refs.count("pool/b", "p"), 1);
        assert_eq!(refs.check("p", &keys(&["pool/a", "pool/b"]))?, keys(&["pool/a"]));

        Ok(())
    }

    #[test]
    fn remove_partition() -> Result<()> {
        let mut refs = MemoryReferences::default();
        refs.add("p", &keys(&["pool/a"]))?;
        refs.add("q", &keys(&["pool/a"]))?;

        refs.remove("p")?;
        assert!(refs.keys_of("p").is_empty());
        assert!(refs.is_referenced("pool/a"));

        refs.delete("q", &keys(&["pool/a"]), None)?;
        assert!(!refs.is_referenced("pool/a"));

        Ok(())
    }
}
