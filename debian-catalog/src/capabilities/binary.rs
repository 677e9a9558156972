// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Binary package records, as found in `Packages` files. */

use {
    super::{changed, InstallData, PackageCapabilities, PackageType},
    crate::{
        checksums::{ChecksumType, Checksums, ContentDigest, FileChecksums},
        control::ControlParagraph,
        error::{CatalogError, Result},
        overrides::OverrideFile,
        pool::PoolLayout,
        tracking::SourceLinkage,
        version::PackageVersion,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::ops::Deref,
};

static SOURCE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)(?:\s+\((\S+)\))?$").expect("valid regex"));

/// A binary package paragraph of a `Packages` file.
///
/// Mandatory fields have getters returning [Result].
struct BinaryPackageParagraph {
    paragraph: ControlParagraph<'static>,
}

impl Deref for BinaryPackageParagraph {
    type Target = ControlParagraph<'static>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl BinaryPackageParagraph {
    fn parse(chunk: &str) -> Result<Self> {
        Ok(Self {
            paragraph: ControlParagraph::parse_chunk(chunk)?,
        })
    }

    /// The `Version` field.
    fn version_str(&self) -> Result<&str> {
        self.required_field_str("Version")
    }

    /// The `Architecture` field.
    fn architecture(&self) -> Result<&str> {
        self.required_field_str("Architecture")
    }

    /// The `Filename` field.
    fn filename(&self) -> Result<&str> {
        self.required_field_str("Filename")
    }

    /// The `Source` field, resolved to a source package name and version.
    ///
    /// Without a version in parentheses the binary version applies. Without the field,
    /// the source is named like the binary package.
    fn source(&self, name: &str) -> Result<SourceLinkage> {
        let version = self.version_str()?;

        match self.field_str("Source") {
            None => Ok(SourceLinkage::new(name, version)),
            Some(value) => {
                let caps = SOURCE_FIELD.captures(value.trim()).ok_or_else(|| {
                    CatalogError::ControlParseError(format!("malformed Source field: {}", value))
                })?;

                Ok(SourceLinkage::new(
                    &caps[1],
                    caps.get(2).map(|m| m.as_str()).unwrap_or(version),
                ))
            }
        }
    }

    fn checksums(&self) -> Result<FileChecksums> {
        let mut checksums = Checksums::default();

        if let Some(size) = self.field_u64("Size") {
            checksums.set_size(size?);
        }

        for checksum in ChecksumType::preferred_order() {
            if let Some(hex) = self.field_str(checksum.binary_field_name()) {
                checksums.set_digest(ContentDigest::from_hex_digest(checksum, hex.trim())?);
            }
        }

        Ok(FileChecksums {
            key: self.filename()?.to_string(),
            checksums,
        })
    }
}

/// Capabilities of `.deb` and, for the installer variant, `.udeb` partitions.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryCapabilities {
    installer: bool,
    layout: PoolLayout,
}

impl BinaryCapabilities {
    /// Capabilities for ordinary binary packages.
    pub fn deb() -> Self {
        Self {
            installer: false,
            layout: PoolLayout::default(),
        }
    }

    /// Capabilities for installer binary packages.
    pub fn udeb() -> Self {
        Self {
            installer: true,
            layout: PoolLayout::default(),
        }
    }

    fn extension(&self) -> &'static str {
        if self.installer {
            "udeb"
        } else {
            "deb"
        }
    }
}

impl PackageCapabilities for BinaryCapabilities {
    fn package_type(&self) -> PackageType {
        if self.installer {
            PackageType::Udeb
        } else {
            PackageType::Deb
        }
    }

    fn version(&self, chunk: &str) -> Result<String> {
        Ok(BinaryPackageParagraph::parse(chunk)?
            .version_str()?
            .trim()
            .to_string())
    }

    fn architecture(&self, chunk: &str) -> Result<String> {
        Ok(BinaryPackageParagraph::parse(chunk)?
            .architecture()?
            .trim()
            .to_string())
    }

    fn file_keys(&self, chunk: &str) -> Result<Vec<String>> {
        Ok(vec![BinaryPackageParagraph::parse(chunk)?
            .filename()?
            .trim()
            .to_string()])
    }

    fn checksums(&self, chunk: &str) -> Result<Vec<FileChecksums>> {
        Ok(vec![BinaryPackageParagraph::parse(chunk)?.checksums()?])
    }

    fn source_and_version(&self, chunk: &str, name: &str) -> Result<Option<SourceLinkage>> {
        Ok(Some(BinaryPackageParagraph::parse(chunk)?.source(name)?))
    }

    fn install_data(
        &self,
        component: &str,
        name: &str,
        version: &str,
        architecture: &str,
        chunk: &str,
    ) -> Result<InstallData> {
        let para = BinaryPackageParagraph::parse(chunk)?;
        let source = para.source(name)?;

        let filename = format!(
            "{}_{}_{}.{}",
            name,
            PackageVersion::parse(version)?.without_epoch(),
            architecture,
            self.extension()
        );

        Ok(InstallData {
            expected_file_keys: vec![self.layout.path(component, &source.source, &filename)],
            files: vec![para.checksums()?],
        })
    }

    fn reoverride(
        &self,
        overrides: &OverrideFile,
        name: &str,
        chunk: &str,
    ) -> Result<Option<String>> {
        overrides.apply(name, chunk)
    }

    fn complete_checksums(&self, chunk: &str, files: &[FileChecksums]) -> Result<Option<String>> {
        let file = match files {
            [file] => file,
            _ => {
                return Err(CatalogError::Other(format!(
                    "binary packages have exactly one file; got {}",
                    files.len()
                )))
            }
        };

        let mut para = ControlParagraph::parse_chunk(chunk)?;

        if let Some(size) = file.checksums.size() {
            para.set_field_from_string("Size".into(), size.to_string().into());
        }
        for digest in file.checksums.iter_digests() {
            para.set_field_from_string(
                digest.checksum_type().binary_field_name().into(),
                digest.digest_hex().into(),
            );
        }

        Ok(changed(chunk, para.to_chunk()))
    }
}
