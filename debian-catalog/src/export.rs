// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Export of partitions to index files.

A partition remembers whether it changed since it was last exported. Exporting an
unchanged partition with `only_if_changed` does not skip the partition: index files
that do not exist yet are still written and existing ones are still recorded in the
[ReleaseIndex].
*/

use {
    crate::{
        checksums::{ChecksumType, Checksums},
        config::{Compression, ExportMode},
        cursor::PackageCursor,
        error::{CatalogError, Result},
        events::CatalogEvent,
        target::Target,
    },
    std::{
        collections::BTreeMap,
        io::Write,
        path::{Path, PathBuf},
    },
};

/// The index files written for a distribution.
///
/// Paths are relative to the distribution directory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReleaseIndex {
    files: BTreeMap<String, Checksums>,
}

impl ReleaseIndex {
    /// Record an index file.
    pub fn add(&mut self, path: impl ToString, checksums: Checksums) {
        self.files.insert(path.to_string(), checksums);
    }

    /// The checksums of a recorded index file.
    pub fn get(&self, path: &str) -> Option<&Checksums> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterate over recorded paths and their checksums.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Checksums)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render the `<digest> <size> <path>` lines of a `Release` file checksum field.
    pub fn release_lines(&self, checksum: ChecksumType) -> Vec<String> {
        self.files
            .iter()
            .filter_map(|(path, checksums)| {
                match (checksums.digest(checksum), checksums.size()) {
                    (Some(digest), Some(size)) => {
                        Some(format!(" {} {} {}", digest.digest_hex(), size, path))
                    }
                    _ => None,
                }
            })
            .collect()
    }

    /// Render the checksum fields of a `Release` file.
    ///
    /// Fields without any line are omitted.
    pub fn release_fields(&self) -> String {
        let mut s = String::new();

        for checksum in [ChecksumType::Md5, ChecksumType::Sha1, ChecksumType::Sha256] {
            let lines = self.release_lines(checksum);
            if lines.is_empty() {
                continue;
            }

            s.push_str(checksum.release_field_name());
            s.push_str(":\n");
            for line in lines {
                s.push_str(&line);
                s.push('\n');
            }
        }

        s
    }
}

/// Writes the index files of a partition.
pub trait IndexExporter {
    /// Write index files of the records produced by `records`.
    ///
    /// `directory` is relative to the distribution directory. With `only_missing`, only
    /// index files that do not exist yet are written. Every index file is recorded in
    /// `release` in any case.
    fn export(
        &mut self,
        directory: &str,
        mode: &ExportMode,
        records: &mut PackageCursor<'_>,
        release: &mut ReleaseIndex,
        only_missing: bool,
        snapshot: bool,
    ) -> Result<()>;
}

/// Compress index content.
pub fn compress(compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = vec![];

    match compression {
        Compression::None => {
            buffer.extend_from_slice(data);
        }
        Compression::Gzip => {
            let header = libflate::gzip::HeaderBuilder::new().finish();

            let mut encoder = libflate::gzip::Encoder::with_options(
                &mut buffer,
                libflate::gzip::EncodeOptions::new().header(header),
            )?;
            encoder.write_all(data)?;
            encoder.finish().into_result()?;
        }
        Compression::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(buffer, 6);
            encoder.write_all(data)?;
            buffer = encoder.finish()?;
        }
    }

    Ok(buffer)
}

/// An [IndexExporter] writing below a distribution directory, e.g. `dists/bookworm`.
#[derive(Clone, Debug)]
pub struct FilesystemIndexExporter {
    root: PathBuf,
}

impl FilesystemIndexExporter {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn index_paths(directory: &str, mode: &ExportMode) -> Vec<(Compression, String)> {
        mode.compressions
            .iter()
            .map(|compression| {
                (
                    *compression,
                    format!("{}/{}{}", directory, mode.filename, compression.extension()),
                )
            })
            .collect()
    }

    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let dest = self.root.join(path);
        let temp = self.root.join(format!("{}.new", path));

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::IoPath(format!("{}", parent.display()), e))?;
        }

        std::fs::write(&temp, data)
            .map_err(|e| CatalogError::IoPath(format!("{}", temp.display()), e))?;
        std::fs::rename(&temp, &dest)
            .map_err(|e| CatalogError::IoPath(format!("{}", dest.display()), e))?;

        Ok(())
    }

    fn existing_checksums(&self, path: &str) -> Result<Option<Checksums>> {
        let full = self.root.join(path);

        match std::fs::File::open(&full) {
            Ok(fh) => Ok(Some(
                Checksums::compute_reader(fh)
                    .map_err(|e| CatalogError::IoPath(format!("{}", full.display()), e))?,
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CatalogError::IoPath(format!("{}", full.display()), e)),
        }
    }
}

impl IndexExporter for FilesystemIndexExporter {
    fn export(
        &mut self,
        directory: &str,
        mode: &ExportMode,
        records: &mut PackageCursor<'_>,
        release: &mut ReleaseIndex,
        only_missing: bool,
        snapshot: bool,
    ) -> Result<()> {
        let paths = Self::index_paths(directory, mode);

        if only_missing && !snapshot {
            let mut existing = vec![];
            for (_, path) in &paths {
                match self.existing_checksums(path)? {
                    Some(checksums) => existing.push((path, checksums)),
                    None => break,
                }
            }

            if existing.len() == paths.len() {
                for (path, checksums) in existing {
                    release.add(path, checksums);
                }
                return Ok(());
            }
        }

        let mut content = vec![];
        for entry in records {
            let (_, data) = entry?;

            if !content.is_empty() {
                content.push(b'\n');
            }
            content.extend_from_slice(data.chunk.as_bytes());
            if !data.chunk.ends_with('\n') {
                content.push(b'\n');
            }
        }

        for (compression, path) in paths {
            let data = compress(compression, &content)?;
            self.write_file(&path, &data)?;
            release.add(path, Checksums::compute(&data));
        }

        Ok(())
    }
}

impl Target {
    /// Export the partition's index files.
    ///
    /// With `only_if_changed`, an unchanged partition only gets missing index files
    /// written. After a successful export that is not a snapshot, the partition counts
    /// as unchanged again.
    pub fn export(
        &mut self,
        exporter: &mut dyn IndexExporter,
        release: &mut ReleaseIndex,
        only_if_changed: bool,
        snapshot: bool,
    ) -> Result<()> {
        if self.no_export {
            return Err(CatalogError::ExportForbidden(self.identifier.clone()));
        }
        self.check_no_cursor()?;

        let only_missing = only_if_changed && !self.was_modified;
        self.emit(CatalogEvent::Exporting {
            identifier: self.identifier.clone(),
            only_missing,
        });

        let directory = self.relative_directory.clone();
        let mode = self.export_mode.clone();

        let mut cursor = self.open_cursor(true)?;
        let res = exporter.export(
            &directory,
            &mode,
            &mut cursor,
            release,
            only_missing,
            snapshot,
        );
        let closed = cursor.close();
        res.and(closed)?;

        if !snapshot {
            self.saved_was_modified |= self.was_modified;
            self.was_modified = false;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{
            admission::NewPackage,
            references::MemoryReferences,
            target::TargetOptions,
            testutil::{binary_target, context, deb_chunk, deb_key},
        },
        std::io::Read,
    };

    fn add(target: &mut Target, name: &str, version: &str) -> Result<()> {
        let mut refs = MemoryReferences::default();
        let chunk = deb_chunk(name, version);
        let keys = vec![deb_key(name, version)];

        target.open_table(false)?;
        target.add_package(
            &mut refs,
            None,
            None,
            &NewPackage::new(name, version, &chunk, &keys, "amd64"),
            None,
        )?;
        target.close_table()
    }

    #[test]
    fn compression_formats() -> Result<()> {
        let data = b"Package: foo\n";

        assert_eq!(compress(Compression::None, data)?, data.to_vec());

        let gz = compress(Compression::Gzip, data)?;
        let mut decoded = vec![];
        libflate::gzip::Decoder::new(std::io::Cursor::new(gz))?.read_to_end(&mut decoded)?;
        assert_eq!(decoded, data.to_vec());

        let xz = compress(Compression::Xz, data)?;
        let mut decoded = vec![];
        xz2::read::XzDecoder::new(std::io::Cursor::new(xz)).read_to_end(&mut decoded)?;
        assert_eq!(decoded, data.to_vec());

        Ok(())
    }

    #[test]
    fn export_clears_dirty_flag() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let mut exporter = FilesystemIndexExporter::new(td.path());
        let (context, _) = context();
        let mut target = binary_target(&context, &TargetOptions::default())?;

        add(&mut target, "foo", "1.0")?;
        add(&mut target, "bar", "2.0")?;
        assert!(target.was_modified());

        let mut release = ReleaseIndex::default();
        target.export(&mut exporter, &mut release, true, false)?;
        assert!(!target.was_modified());
        assert!(target.saved_was_modified());

        let packages = std::fs::read_to_string(td.path().join("main/binary-amd64/Packages"))?;
        assert_eq!(
            packages,
            format!("{}\n{}", deb_chunk("bar", "2.0"), deb_chunk("foo", "1.0"))
        );
        assert!(td.path().join("main/binary-amd64/Packages.gz").exists());
        assert_eq!(release.len(), 2);
        assert_eq!(
            release.get("main/binary-amd64/Packages"),
            Some(&Checksums::compute(packages.as_bytes()))
        );
        assert_eq!(release.release_lines(ChecksumType::Md5).len(), 2);

        let fields = release.release_fields();
        assert!(fields.starts_with("MD5Sum:\n "));
        assert!(fields.contains("\nSHA1:\n "));
        assert!(fields.contains("\nSHA256:\n "));
        assert_eq!(fields.lines().count(), 9);

        Ok(())
    }

    #[test]
    fn only_if_changed_writes_missing_files() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let mut exporter = FilesystemIndexExporter::new(td.path());
        let (context, _) = context();
        let mut target = binary_target(&context, &TargetOptions::default())?;

        // A clean partition that was never exported.
        let mut release = ReleaseIndex::default();
        target.export(&mut exporter, &mut release, true, false)?;
        assert_eq!(
            std::fs::read(td.path().join("main/binary-amd64/Packages"))?,
            Vec::<u8>::new()
        );
        assert!(!target.saved_was_modified());

        // Unchanged files are left alone but still recorded.
        std::fs::write(td.path().join("main/binary-amd64/Packages"), b"stale")?;
        let mut release = ReleaseIndex::default();
        target.export(&mut exporter, &mut release, true, false)?;
        assert_eq!(
            std::fs::read(td.path().join("main/binary-amd64/Packages"))?,
            b"stale".to_vec()
        );
        assert_eq!(release.len(), 2);

        // Without only_if_changed everything is rewritten.
        target.export(&mut exporter, &mut release, false, false)?;
        assert_eq!(
            std::fs::read(td.path().join("main/binary-amd64/Packages"))?,
            Vec::<u8>::new()
        );

        Ok(())
    }

    #[test]
    fn snapshots_keep_flags() -> Result<()> {
        let td = tempfile::TempDir::new()?;
        let mut exporter = FilesystemIndexExporter::new(td.path());
        let (context, _) = context();
        let mut target = binary_target(&context, &TargetOptions::default())?;

        add(&mut target, "foo", "1.0")?;
        target.export(&mut exporter, &mut ReleaseIndex::default(), false, true)?;
        assert!(target.was_modified());

        let (forbidding_context, _) = crate::testutil::context();
        let mut forbidden = binary_target(
            &forbidding_context,
            &TargetOptions {
                no_export: true,
                ..Default::default()
            },
        )?;
        assert!(matches!(
            forbidden.export(&mut exporter, &mut ReleaseIndex::default(), false, false),
            Err(CatalogError::ExportForbidden(_))
        ));

        Ok(())
    }
}
