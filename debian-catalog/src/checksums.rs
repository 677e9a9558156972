// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! File checksums as recorded in control chunks. */

use {
    crate::error::{CatalogError, Result},
    digest::Digest,
    std::{
        collections::BTreeMap,
        fmt::{Debug, Formatter},
        io::Read,
    },
    strum_macros::{EnumIter, IntoStaticStr},
};

/// A checksum flavor.
#[derive(Clone, Copy, Debug, Eq, EnumIter, Hash, IntoStaticStr, Ord, PartialEq, PartialOrd)]
pub enum ChecksumType {
    /// MD5.
    #[strum(serialize = "md5")]
    Md5,

    /// SHA-1.
    #[strum(serialize = "sha1")]
    Sha1,

    /// SHA-256.
    #[strum(serialize = "sha256")]
    Sha256,
}

impl ChecksumType {
    /// Emit variants in their preferred usage order.
    pub fn preferred_order() -> impl Iterator<Item = ChecksumType> {
        [Self::Sha256, Self::Sha1, Self::Md5].into_iter()
    }

    /// Name of the field holding this digest in binary package paragraphs.
    pub fn binary_field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Name of the multiline field holding this digest in source package paragraphs.
    pub fn source_field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "Files",
            Self::Sha1 => "Checksums-Sha1",
            Self::Sha256 => "Checksums-Sha256",
        }
    }

    /// Name of the field in `Release` files holding this variant type.
    pub fn release_field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }

    /// Digest data with this checksum flavor.
    pub fn digest(&self, data: &[u8]) -> ContentDigest {
        match self {
            Self::Md5 => ContentDigest::Md5(md5::Md5::digest(data).to_vec()),
            Self::Sha1 => ContentDigest::Sha1(sha1::Sha1::digest(data).to_vec()),
            Self::Sha256 => ContentDigest::Sha256(sha2::Sha256::digest(data).to_vec()),
        }
    }
}

/// Represents a content digest.
#[derive(Clone, Eq, Hash, PartialEq)]
pub enum ContentDigest {
    /// An MD5 digest.
    Md5(Vec<u8>),
    /// A SHA-1 digest.
    Sha1(Vec<u8>),
    /// A SHA-256 digest.
    Sha256(Vec<u8>),
}

impl Debug for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5(data) => write!(f, "Md5({})", hex::encode(data)),
            Self::Sha1(data) => write!(f, "Sha1({})", hex::encode(data)),
            Self::Sha256(data) => write!(f, "Sha256({})", hex::encode(data)),
        }
    }
}

impl ContentDigest {
    /// Obtain an instance by parsing a hex string as a [ChecksumType].
    pub fn from_hex_digest(checksum: ChecksumType, digest: &str) -> Result<Self> {
        let digest = hex::decode(digest)?;

        Ok(match checksum {
            ChecksumType::Md5 => Self::Md5(digest),
            ChecksumType::Sha1 => Self::Sha1(digest),
            ChecksumType::Sha256 => Self::Sha256(digest),
        })
    }

    /// Obtain the digest bytes for this content digest.
    pub fn digest_bytes(&self) -> &[u8] {
        match self {
            Self::Md5(x) => x,
            Self::Sha1(x) => x,
            Self::Sha256(x) => x,
        }
    }

    /// Obtain the hex encoded content digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest_bytes())
    }

    /// Obtain the [ChecksumType] for this digest.
    pub fn checksum_type(&self) -> ChecksumType {
        match self {
            Self::Md5(_) => ChecksumType::Md5,
            Self::Sha1(_) => ChecksumType::Sha1,
            Self::Sha256(_) => ChecksumType::Sha256,
        }
    }
}

/// The known size and digests of a single file.
///
/// Any subset of digests may be known. Older records frequently only carry MD5.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Checksums {
    size: Option<u64>,
    digests: BTreeMap<ChecksumType, ContentDigest>,
}

impl Checksums {
    /// Compute size and every digest flavor of in-memory content.
    pub fn compute(data: &[u8]) -> Self {
        let mut digester = MultiDigester::default();
        digester.update(data);
        digester.finish()
    }

    /// Compute size and every digest flavor of a reader's content.
    pub fn compute_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut digester = MultiDigester::default();
        let mut buf = [0u8; 16384];

        loop {
            let count = reader.read(&mut buf)?;
            if count == 0 {
                break;
            }
            digester.update(&buf[0..count]);
        }

        Ok(digester.finish())
    }

    /// The file size, if known.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Set the file size.
    pub fn set_size(&mut self, size: u64) {
        self.size = Some(size);
    }

    /// Obtain the digest of a given flavor, if known.
    pub fn digest(&self, checksum: ChecksumType) -> Option<&ContentDigest> {
        self.digests.get(&checksum)
    }

    /// Record a digest, replacing any previous digest of the same flavor.
    pub fn set_digest(&mut self, digest: ContentDigest) {
        self.digests.insert(digest.checksum_type(), digest);
    }

    /// Iterate over known digests, weakest first.
    pub fn iter_digests(&self) -> impl Iterator<Item = &ContentDigest> {
        self.digests.values()
    }

    /// Whether every digest flavor and the size are known.
    pub fn is_complete(&self) -> bool {
        self.size.is_some() && self.digests.len() == 3
    }

    /// Compare against other checksums of supposedly the same file.
    ///
    /// Only properties known to both sides are compared. Returns the name of the
    /// first property that differs.
    pub fn first_mismatch(&self, other: &Self) -> Option<&'static str> {
        if let (Some(a), Some(b)) = (self.size, other.size) {
            if a != b {
                return Some("size");
            }
        }

        self.digests
            .iter()
            .find(|(checksum, digest)| {
                matches!(other.digests.get(checksum), Some(theirs) if theirs != *digest)
            })
            .map(|(checksum, _)| (*checksum).into())
    }

    /// Add properties known to `other` but not to `self`.
    ///
    /// Returns whether anything was added.
    pub fn improve_from(&mut self, other: &Self) -> bool {
        let mut improved = false;

        if self.size.is_none() && other.size.is_some() {
            self.size = other.size;
            improved = true;
        }

        for (checksum, digest) in &other.digests {
            if !self.digests.contains_key(checksum) {
                self.digests.insert(*checksum, digest.clone());
                improved = true;
            }
        }

        improved
    }
}

/// The checksums of a file identified by its file key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileChecksums {
    /// Content store key, e.g. `pool/main/h/hello/hello_2.10-2_amd64.deb`.
    pub key: String,
    /// What is known about the file content.
    pub checksums: Checksums,
}

/// A content digester that simultaneously computes every digest type.
#[derive(Default)]
pub struct MultiDigester {
    size: u64,
    md5: md5::Md5,
    sha1: sha1::Sha1,
    sha256: sha2::Sha256,
}

impl MultiDigester {
    /// Write content into the digesters.
    pub fn update(&mut self, data: &[u8]) {
        self.size += data.len() as u64;
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
    }

    /// Finish digesting content.
    pub fn finish(self) -> Checksums {
        let mut checksums = Checksums {
            size: Some(self.size),
            digests: BTreeMap::new(),
        };
        checksums.set_digest(ContentDigest::Md5(self.md5.finalize().to_vec()));
        checksums.set_digest(ContentDigest::Sha1(self.sha1.finalize().to_vec()));
        checksums.set_digest(ContentDigest::Sha256(self.sha256.finalize().to_vec()));

        checksums
    }
}

/// Parse a `<hex digest> <size> <filename>` line of a source package checksum field.
pub fn parse_checksum_line<'a>(
    field: &'static str,
    checksum: ChecksumType,
    line: &'a str,
) -> Result<(&'a str, u64, ContentDigest)> {
    let mut parts = line.split_ascii_whitespace();

    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(digest), Some(size), Some(filename), None) => Ok((
            filename,
            size.parse::<u64>()?,
            ContentDigest::from_hex_digest(checksum, digest)?,
        )),
        _ => Err(CatalogError::ChecksumLineMalformed(field, line.to_string())),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compute_known_digests() {
        let checksums = Checksums::compute(b"hello\n");

        assert_eq!(checksums.size(), Some(6));
        assert!(checksums.is_complete());
        assert_eq!(
            checksums.digest(ChecksumType::Md5).unwrap().digest_hex(),
            "b1946ac92492d2347c6235b4d2611184"
        );
        assert_eq!(
            checksums.digest(ChecksumType::Sha256).unwrap().digest_hex(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03"
        );
    }

    #[test]
    fn mismatch_and_improve() -> Result<()> {
        let full = Checksums::compute(b"content");

        let mut partial = Checksums::default();
        partial.set_size(7);
        partial.set_digest(full.digest(ChecksumType::Md5).unwrap().clone());

        assert_eq!(partial.first_mismatch(&full), None);
        assert!(partial.improve_from(&full));
        assert!(partial.is_complete());
        assert!(!partial.improve_from(&full));

        let mut wrong = Checksums::default();
        wrong.set_digest(ContentDigest::from_hex_digest(
            ChecksumType::Md5,
            "00000000000000000000000000000000",
        )?);
        assert_eq!(wrong.first_mismatch(&full), Some("md5"));

        wrong.set_size(1);
        assert_eq!(wrong.first_mismatch(&full), Some("size"));

        Ok(())
    }

    #[test]
    fn checksum_lines() -> Result<()> {
        let (filename, size, digest) = parse_checksum_line(
            "Files",
            ChecksumType::Md5,
            "d41d8cd98f00b204e9800998ecf8427e 0 hello_2.10.orig.tar.gz",
        )?;

        assert_eq!(filename, "hello_2.10.orig.tar.gz");
        assert_eq!(size, 0);
        assert_eq!(digest.checksum_type(), ChecksumType::Md5);

        assert!(parse_checksum_line("Files", ChecksumType::Md5, "abc 12").is_err());

        Ok(())
    }
}
