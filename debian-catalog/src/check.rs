// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Consistency checks of stored records.

A record is consistent when it belongs into the partition's architecture, lists
exactly the files it would get when installed anew, those files are present in the
pool with matching checksums, and the partition references all of them.
*/

use {
    crate::{
        error::{CatalogError, Result},
        events::CatalogEvent,
        files::{FileStore, FileVerification},
        record::PackageData,
        references::ReferenceLedger,
        target::Target,
    },
    std::collections::BTreeSet,
};

/// An inconsistency of a stored record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CheckFinding {
    /// The record's architecture is neither the partition's nor `all`.
    WrongArchitecture { name: String, architecture: String },

    /// The record lists different files than it should have.
    FileKeyMismatch {
        name: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// The expected installation of the record could not be computed.
    InstallData { name: String, error: String },

    /// A listed file is missing or has different content.
    BadFile {
        name: String,
        key: String,
        verification: FileVerification,
    },

    /// The partition lacks references to listed files.
    MissingReferences { name: String, keys: Vec<String> },
}

impl CheckFinding {
    /// The package the finding is about.
    pub fn name(&self) -> &str {
        match self {
            Self::WrongArchitecture { name, .. }
            | Self::FileKeyMismatch { name, .. }
            | Self::InstallData { name, .. }
            | Self::BadFile { name, .. }
            | Self::MissingReferences { name, .. } => name,
        }
    }
}

/// Findings of a check over a whole partition.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CheckReport {
    pub identifier: String,
    /// Number of records checked.
    pub checked: usize,
    pub findings: Vec<CheckFinding>,
}

impl CheckReport {
    /// Whether no inconsistency was found.
    pub fn is_ok(&self) -> bool {
        self.findings.is_empty()
    }

    /// Add the findings of another report.
    pub fn merge(&mut self, other: CheckReport) {
        self.checked += other.checked;
        self.findings.extend(other.findings);
    }
}

impl Target {
    /// Check a stored record.
    ///
    /// Records whose version or architecture cannot be extracted are errors, as are
    /// records whose files cannot be determined at all. Everything else is reported as
    /// findings.
    pub fn check_package(
        &self,
        files: &dyn FileStore,
        refs: &dyn ReferenceLedger,
        name: &str,
        data: &PackageData,
    ) -> Result<Vec<CheckFinding>> {
        let extraction = |what, e| CatalogError::extraction(&self.identifier, name, what, e);

        let version = self
            .capabilities
            .version(&data.chunk)
            .map_err(|e| extraction("version", e))?;
        let architecture = self
            .capabilities
            .architecture(&data.chunk)
            .map_err(|e| extraction("architecture", e))?;

        let mut findings = vec![];

        if architecture != self.architecture && architecture != "all" {
            findings.push(CheckFinding::WrongArchitecture {
                name: name.to_string(),
                architecture: architecture.clone(),
            });
        }

        let listed = match self.capabilities.install_data(
            &self.component,
            name,
            &version,
            &architecture,
            &data.chunk,
        ) {
            Ok(install) => {
                let expected = install.expected_file_keys.iter().collect::<BTreeSet<_>>();
                let found = install.files.iter().map(|f| &f.key).collect::<BTreeSet<_>>();

                if expected != found {
                    findings.push(CheckFinding::FileKeyMismatch {
                        name: name.to_string(),
                        expected: expected.into_iter().cloned().collect(),
                        found: found.into_iter().cloned().collect(),
                    });
                }

                install.files
            }
            Err(e) => {
                findings.push(CheckFinding::InstallData {
                    name: name.to_string(),
                    error: e.to_string(),
                });

                self.capabilities
                    .checksums(&data.chunk)
                    .map_err(|e| extraction("checksums", e))?
            }
        };

        for file in &listed {
            match files.verify(&file.key, &file.checksums)? {
                FileVerification::Ok => {}
                verification => findings.push(CheckFinding::BadFile {
                    name: name.to_string(),
                    key: file.key.clone(),
                    verification,
                }),
            }
        }

        let keys = listed.iter().map(|f| f.key.clone()).collect::<Vec<_>>();
        let missing = refs.check(&self.identifier, &keys)?;
        if !missing.is_empty() {
            findings.push(CheckFinding::MissingReferences {
                name: name.to_string(),
                keys: missing,
            });
        }

        for finding in &findings {
            self.emit_finding(finding);
        }

        Ok(findings)
    }

    fn emit_finding(&self, finding: &CheckFinding) {
        let identifier = self.identifier.clone();

        self.emit(match finding.clone() {
            CheckFinding::WrongArchitecture { name, architecture } => {
                CatalogEvent::WrongArchitecture {
                    identifier,
                    name,
                    architecture,
                }
            }
            CheckFinding::FileKeyMismatch {
                name,
                expected,
                found,
            } => CatalogEvent::FileKeyMismatch {
                identifier,
                name,
                expected,
                found,
            },
            CheckFinding::InstallData { name, error } => CatalogEvent::BadFile {
                identifier,
                name,
                key: "-".to_string(),
                problem: format!("cannot compute expected files: {}", error),
            },
            CheckFinding::BadFile {
                name,
                key,
                verification,
            } => CatalogEvent::BadFile {
                identifier,
                name,
                key,
                problem: match verification {
                    FileVerification::Missing => "missing".to_string(),
                    FileVerification::Mismatch(property) => format!("wrong {}", property),
                    FileVerification::Ok => "ok".to_string(),
                },
            },
            CheckFinding::MissingReferences { name, keys } => CatalogEvent::MissingReferences {
                identifier,
                name,
                keys,
            },
        });
    }

    /// Check every stored record.
    pub fn check_all(
        &mut self,
        files: &dyn FileStore,
        refs: &dyn ReferenceLedger,
    ) -> Result<CheckReport> {
        let mut report = CheckReport {
            identifier: self.identifier.clone(),
            ..Default::default()
        };

        let mut cursor = self.open_cursor(true)?;
        while let Some(entry) = cursor.next() {
            let (name, data) = entry?;

            report
                .findings
                .extend(cursor.target().check_package(files, refs, &name, &data)?);
            report.checked += 1;
        }
        cursor.close()?;

        Ok(report)
    }
}
