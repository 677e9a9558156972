// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Override files.

Override files force field values of packages. Two line formats are understood:

```text
# package priority section
hello optional devel
# package $Field value
hello $Homepage https://www.gnu.org/software/hello/
```
*/

use {
    crate::{
        control::ControlParagraph,
        error::{CatalogError, Result},
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::{collections::BTreeMap, path::Path},
};

static FIELD_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+)\s+\$([A-Za-z][A-Za-z0-9-]*)\s+(\S.*)$").expect("valid regex")
});

static CLASSIC_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(\S+)\s+(\S+)(?:\s.*)?$").expect("valid regex"));

/// Forced field values by package name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OverrideFile {
    packages: BTreeMap<String, Vec<(String, String)>>,
}

impl OverrideFile {
    /// Parse override file content.
    pub fn parse_str(s: &str) -> Result<Self> {
        let mut res = Self::default();

        for (i, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(caps) = FIELD_LINE.captures(line) {
                res.set(&caps[1], &caps[2], caps[3].trim_end());
            } else if let Some(caps) = CLASSIC_LINE.captures(line) {
                if caps[2].starts_with('$') {
                    return Err(CatalogError::OverrideParse(i + 1, line.to_string()));
                }
                res.set(&caps[1], "Priority", &caps[2]);
                res.set(&caps[1], "Section", &caps[3]);
            } else {
                return Err(CatalogError::OverrideParse(i + 1, line.to_string()));
            }
        }

        Ok(res)
    }

    /// Parse an override file from the filesystem.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::IoPath(format!("{}", path.display()), e))?;

        Self::parse_str(&data)
    }

    /// Force a field value for a package.
    pub fn set(&mut self, package: &str, field: &str, value: &str) {
        let fields = self.packages.entry(package.to_string()).or_default();

        match fields.iter_mut().find(|(name, _)| name.eq_ignore_ascii_case(field)) {
            Some(existing) => existing.1 = value.to_string(),
            None => fields.push((field.to_string(), value.to_string())),
        }
    }

    /// The forced fields of a package.
    pub fn fields(&self, package: &str) -> Option<&[(String, String)]> {
        self.packages.get(package).map(|x| x.as_slice())
    }

    /// Apply the overrides of a package to a control chunk.
    ///
    /// Returns [None] if nothing changed.
    pub fn apply(&self, package: &str, chunk: &str) -> Result<Option<String>> {
        let fields = match self.fields(package) {
            Some(fields) => fields,
            None => return Ok(None),
        };

        let mut para = ControlParagraph::parse_chunk(chunk)?;
        let mut changed = false;

        for (name, value) in fields {
            if para.field_str(name) != Some(value.as_str()) {
                para.set_field_from_string(name.clone().into(), value.clone().into());
                changed = true;
            }
        }

        Ok(if changed { Some(para.to_chunk()) } else { None })
    }
}
