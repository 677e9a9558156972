// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Record codec.

A stored record is the package version, a NUL byte and the control chunk. Table keys
are the package name, or `name|version` in partitions retaining old versions.
*/

use crate::error::{CatalogError, Result};

/// Separates name and version in composite primary keys.
pub const KEY_SEPARATOR: char = '|';

/// A decoded package record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageData {
    /// The package version.
    pub version: String,
    /// The control chunk.
    pub chunk: String,
}

impl PackageData {
    /// Construct an instance from a version and control chunk.
    pub fn new(version: impl ToString, chunk: impl ToString) -> Self {
        Self {
            version: version.to_string(),
            chunk: chunk.to_string(),
        }
    }

    /// Serialize to record bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.version.len() + self.chunk.len() + 1);
        bytes.extend_from_slice(self.version.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(self.chunk.as_bytes());

        bytes
    }

    /// Decode record bytes read from key `key`.
    ///
    /// Empty bytes are not a record and decode to [None].
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.is_empty() {
            return Ok(None);
        }

        let nul = bytes
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| CatalogError::MalformedRecord(key.to_string(), "no version terminator"))?;

        let version = std::str::from_utf8(&bytes[0..nul])
            .map_err(|_| CatalogError::MalformedRecord(key.to_string(), "version is not UTF-8"))?;
        let chunk = std::str::from_utf8(&bytes[nul + 1..])
            .map_err(|_| CatalogError::MalformedRecord(key.to_string(), "chunk is not UTF-8"))?;

        if version.is_empty() {
            return Err(CatalogError::MalformedRecord(key.to_string(), "empty version"));
        }
        if chunk.is_empty() {
            return Err(CatalogError::MalformedRecord(key.to_string(), "empty chunk"));
        }

        Ok(Some(Self::new(version, chunk)))
    }
}

/// Derive the primary key of a record.
///
/// Without a version, or when old versions are not retained, the key is the name.
pub fn primary_key(name: &str, version: Option<&str>, retain_old_versions: bool) -> String {
    match version {
        Some(version) if retain_old_versions => {
            format!("{}{}{}", name, KEY_SEPARATOR, version)
        }
        _ => name.to_string(),
    }
}

/// Obtain the package name component of a primary key.
pub fn name_from_key(key: &str) -> &str {
    key.split_once(KEY_SEPARATOR)
        .map(|(name, _)| name)
        .unwrap_or(key)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codec() -> Result<()> {
        let data = PackageData::new("1:2.0-1", "Package: foo\nVersion: 1:2.0-1\n");
        let bytes = data.encode();

        assert_eq!(&bytes[0..8], b"1:2.0-1\0");
        assert_eq!(PackageData::decode("foo", &bytes)?, Some(data));
        assert_eq!(PackageData::decode("foo", &[])?, None);

        assert!(matches!(
            PackageData::decode("foo", b"1.0"),
            Err(CatalogError::MalformedRecord(_, _))
        ));
        assert!(PackageData::decode("foo", b"\0Package: foo\n").is_err());
        assert!(PackageData::decode("foo", b"1.0\0\xff").is_err());

        Ok(())
    }

    #[test]
    fn keys() {
        assert_eq!(primary_key("foo", Some("1.0"), false), "foo");
        assert_eq!(primary_key("foo", None, true), "foo");
        assert_eq!(primary_key("foo", Some("1.0"), true), "foo|1.0");
        assert_eq!(name_from_key("foo|1.0"), "foo");
        assert_eq!(name_from_key("foo"), "foo");
    }
}
