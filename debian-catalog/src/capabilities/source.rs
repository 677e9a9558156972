// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Source package records, as found in `Sources` files. */

use {
    super::{changed, InstallData, PackageCapabilities, PackageType},
    crate::{
        checksums::{parse_checksum_line, ChecksumType, Checksums, FileChecksums},
        control::{ControlField, ControlParagraph},
        error::{CatalogError, Result},
        overrides::OverrideFile,
        pool::PoolLayout,
        tracking::SourceLinkage,
    },
};

/// Files listed by a source paragraph, by filename in order of appearance.
fn listed_files(para: &ControlParagraph) -> Result<Vec<(String, Checksums)>> {
    let mut files: Vec<(String, Checksums)> = vec![];

    for checksum in [ChecksumType::Md5, ChecksumType::Sha1, ChecksumType::Sha256] {
        let field = checksum.source_field_name();

        for line in para.field_lines(field).unwrap_or_default() {
            let (filename, size, digest) = parse_checksum_line(field, checksum, line)?;

            let index = match files.iter().position(|(name, _)| name == filename) {
                Some(index) => index,
                None => {
                    files.push((filename.to_string(), Checksums::default()));
                    files.len() - 1
                }
            };
            let entry = &mut files[index].1;

            if matches!(entry.size(), Some(existing) if existing != size) {
                return Err(CatalogError::ControlParseError(format!(
                    "conflicting sizes of {} in {}",
                    filename, field
                )));
            }
            entry.set_size(size);
            entry.set_digest(digest);
        }
    }

    Ok(files)
}

fn directory<'a>(para: &'a ControlParagraph<'_>) -> Result<&'a str> {
    Ok(para.required_field_str("Directory")?.trim())
}

/// Capabilities of `.dsc` partitions.
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceCapabilities {
    layout: PoolLayout,
}

impl PackageCapabilities for SourceCapabilities {
    fn package_type(&self) -> PackageType {
        PackageType::Dsc
    }

    fn version(&self, chunk: &str) -> Result<String> {
        Ok(ControlParagraph::parse_chunk(chunk)?
            .required_field_str("Version")?
            .trim()
            .to_string())
    }

    fn architecture(&self, _chunk: &str) -> Result<String> {
        Ok("source".to_string())
    }

    fn file_keys(&self, chunk: &str) -> Result<Vec<String>> {
        Ok(self
            .checksums(chunk)?
            .into_iter()
            .map(|file| file.key)
            .collect())
    }

    fn checksums(&self, chunk: &str) -> Result<Vec<FileChecksums>> {
        let para = ControlParagraph::parse_chunk(chunk)?;
        let directory = directory(&para)?;

        Ok(listed_files(&para)?
            .into_iter()
            .map(|(filename, checksums)| FileChecksums {
                key: format!("{}/{}", directory, filename),
                checksums,
            })
            .collect())
    }

    fn source_and_version(&self, chunk: &str, name: &str) -> Result<Option<SourceLinkage>> {
        Ok(Some(SourceLinkage::new(name, self.version(chunk)?)))
    }

    fn install_data(
        &self,
        component: &str,
        name: &str,
        _version: &str,
        _architecture: &str,
        chunk: &str,
    ) -> Result<InstallData> {
        let para = ControlParagraph::parse_chunk(chunk)?;
        let expected_directory = self.layout.directory(component, name);

        Ok(InstallData {
            expected_file_keys: listed_files(&para)?
                .into_iter()
                .map(|(filename, _)| format!("{}/{}", expected_directory, filename))
                .collect(),
            files: self.checksums(chunk)?,
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
        let mut para = ControlParagraph::parse_chunk(chunk)?;
        let prefix = format!("{}/", directory(&para)?);

        let mut named = vec![];
        for file in files {
            let filename = file.key.strip_prefix(&prefix).ok_or_else(|| {
                CatalogError::Other(format!("{} is not within {}", file.key, prefix))
            })?;
            named.push((filename, &file.checksums));
        }

        for checksum in [ChecksumType::Md5, ChecksumType::Sha1, ChecksumType::Sha256] {
            let lines = named
                .iter()
                .filter_map(|(filename, checksums)| {
                    match (checksums.digest(checksum), checksums.size()) {
                        (Some(digest), Some(size)) => {
                            Some(format!("{} {} {}", digest.digest_hex(), size, filename))
                        }
                        _ => None,
                    }
                })
                .collect::<Vec<_>>();

            if !lines.is_empty() {
                para.set_field(ControlField::from_lines(
                    checksum.source_field_name().into(),
                    "",
                    lines.into_iter(),
                ));
            }
        }

        Ok(changed(chunk, para.to_chunk()))
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    const HELLO: &str = indoc! {"
        Package: hello
        Version: 2.10-2
        Directory: pool/main/h/hello
        Files:
         d41d8cd98f00b204e9800998ecf8427e 0 hello_2.10-2.dsc
         acbd18db4cc2f85cedef654fccc4a4d8 3 hello_2.10.orig.tar.gz
    "};

    #[test]
    fn extraction() -> Result<()> {
        let caps = SourceCapabilities::default();

        assert_eq!(caps.package_type(), PackageType::Dsc);
        assert_eq!(caps.version(HELLO)?, "2.10-2");
        assert_eq!(caps.architecture(HELLO)?, "source");
        assert_eq!(
            caps.file_keys(HELLO)?,
            vec![
                "pool/main/h/hello/hello_2.10-2.dsc".to_string(),
                "pool/main/h/hello/hello_2.10.orig.tar.gz".to_string()
            ]
        );
        assert_eq!(
            caps.source_and_version(HELLO, "hello")?,
            Some(SourceLinkage::new("hello", "2.10-2"))
        );

        let data = caps.install_data("contrib", "hello", "2.10-2", "source", HELLO)?;
        assert_eq!(
            data.expected_file_keys,
            vec![
                "pool/contrib/h/hello/hello_2.10-2.dsc".to_string(),
                "pool/contrib/h/hello/hello_2.10.orig.tar.gz".to_string()
            ]
        );
        assert_eq!(data.files.len(), 2);

        Ok(())
    }

    #[test]
    fn complete_checksums() -> Result<()> {
        let caps = SourceCapabilities::default();
        let mut files = caps.checksums(HELLO)?;

        assert_eq!(caps.complete_checksums(HELLO, &files)?, None);

        files[1].checksums.improve_from(&Checksums::compute(b"foo"));
        let chunk = caps.complete_checksums(HELLO, &files)?.unwrap();
        let para = ControlParagraph::parse_chunk(&chunk)?;

        assert_eq!(
            para.field_lines("Checksums-Sha256"),
            Some(vec![
                "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae 3 hello_2.10.orig.tar.gz"
            ])
        );
        assert_eq!(caps.checksums(&chunk)?, files);

        Ok(())
    }
}
