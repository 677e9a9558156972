// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package kind specific extraction.

The catalog engine never looks inside control chunks itself. Everything it needs to
know about a record is obtained through a [PackageCapabilities] implementation bound
to the partition: [BinaryCapabilities] for `.deb` and `.udeb` packages and
[SourceCapabilities] for `.dsc` source packages.
*/

mod binary;
mod source;

pub use {binary::BinaryCapabilities, source::SourceCapabilities};

use {
    crate::{
        checksums::FileChecksums, error::Result, overrides::OverrideFile,
        tracking::SourceLinkage,
    },
    strum_macros::{Display, EnumString, IntoStaticStr},
};

/// The kind of packages a partition holds.
#[derive(
    Clone, Copy, Debug, Display, EnumString, Eq, Hash, IntoStaticStr, Ord, PartialEq, PartialOrd,
)]
pub enum PackageType {
    /// Binary packages.
    #[strum(serialize = "deb")]
    Deb,
    /// Installer binary packages.
    #[strum(serialize = "udeb")]
    Udeb,
    /// Source packages.
    #[strum(serialize = "dsc")]
    Dsc,
}

/// What a record should look like when installed into a component.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstallData {
    /// The file keys the record is expected to have.
    pub expected_file_keys: Vec<String>,
    /// The files and checksums the record lists.
    pub files: Vec<FileChecksums>,
}

/// Extraction functions for one kind of package.
pub trait PackageCapabilities: Send + Sync {
    /// The kind of package handled.
    fn package_type(&self) -> PackageType;

    /// Obtain the version of a record.
    fn version(&self, chunk: &str) -> Result<String>;

    /// Obtain the architecture of a record.
    fn architecture(&self, chunk: &str) -> Result<String>;

    /// Obtain the keys of the pool files a record needs.
    fn file_keys(&self, chunk: &str) -> Result<Vec<String>>;

    /// Obtain the files a record lists along with their checksums.
    fn checksums(&self, chunk: &str) -> Result<Vec<FileChecksums>>;

    /// Obtain the source package a record belongs to.
    ///
    /// [None] means the record has no usable source linkage.
    fn source_and_version(&self, chunk: &str, name: &str) -> Result<Option<SourceLinkage>>;

    /// Compute where a record's files should be when installed into `component`.
    fn install_data(
        &self,
        component: &str,
        name: &str,
        version: &str,
        architecture: &str,
        chunk: &str,
    ) -> Result<InstallData>;

    /// Apply overrides to a record, returning the new chunk if it changed.
    fn reoverride(
        &self,
        overrides: &OverrideFile,
        name: &str,
        chunk: &str,
    ) -> Result<Option<String>>;

    /// Rewrite the checksum fields of a record, returning the new chunk if it changed.
    fn complete_checksums(&self, chunk: &str, files: &[FileChecksums]) -> Result<Option<String>>;
}

/// Return `new` if it differs from `old`.
fn changed(old: &str, new: String) -> Option<String> {
    if new == old {
        None
    } else {
        Some(new)
    }
}
