// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Control paragraphs as stored in package catalogs.

Every catalog record holds a *control chunk*: a single control paragraph in the
format of `Packages` and `Sources` index files. See
<https://www.debian.org/doc/debian-policy/ch-controlfields.html>.
*/

use {
    crate::error::{CatalogError, Result},
    std::{borrow::Cow, str::FromStr},
};

/// A field in a control paragraph.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: Cow<'a, str>, value: Cow<'a, str>) -> Self {
        Self { name, value }
    }

    /// Construct a multiline field from a first line and continuation lines.
    ///
    /// Continuation lines are indented by a single space on serialization.
    pub fn from_lines(
        name: Cow<'a, str>,
        first: &str,
        lines: impl Iterator<Item = String>,
    ) -> Self {
        let mut value = first.to_string();
        for line in lines {
            value.push_str("\n ");
            value.push_str(&line);
        }

        Self {
            name,
            value: value.into(),
        }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// The raw value, including newlines and indentation of continuation lines.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Iterate over lines of the value with leading whitespace stripped.
    ///
    /// Empty lines are skipped. For multiline checksum fields the first line is
    /// usually empty.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value
            .lines()
            .map(|x| x.trim_start())
            .filter(|x| !x.is_empty())
    }

    /// Append the serialized field to a string.
    fn write_to(&self, dest: &mut String) {
        dest.push_str(&self.name);
        dest.push(':');
        if !self.value.is_empty() && !self.value.starts_with('\n') {
            dest.push(' ');
        }
        dest.push_str(&self.value);
        dest.push('\n');
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields. Field names are case
/// insensitive on read and case preserving on set.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Parse a control chunk holding exactly one paragraph.
    pub fn parse_chunk(chunk: &str) -> Result<ControlParagraph<'static>> {
        let mut parser = ControlFileParser::default();
        let mut paragraphs = vec![];

        for line in chunk.split_inclusive('\n') {
            if let Some(paragraph) = parser.write_line(line)? {
                paragraphs.push(paragraph);
            }
        }
        if let Some(paragraph) = parser.finish()? {
            paragraphs.push(paragraph);
        }

        if paragraphs.len() != 1 {
            return Err(CatalogError::ControlParagraphMismatch(paragraphs.len()));
        }

        Ok(paragraphs.remove(0))
    }

    /// Whether the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set a field.
    ///
    /// A field of the same name (case insensitive) is replaced in place, keeping its
    /// position. Otherwise the field is appended.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        match self
            .fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(&field.name))
        {
            Some(existing) => {
                existing.value = field.value;
            }
            None => self.fields.push(field),
        }
    }

    /// Set a field from strings. See [Self::set_field()].
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Remove a field, returning whether it was present.
    pub fn remove_field(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));

        before != self.fields.len()
    }

    /// Whether a named field is present.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate over fields in insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with a given name.
    pub fn field(&self, name: &str) -> Option<&ControlField<'a>> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Obtain the raw string value of a field that must be present.
    pub fn required_field_str(&self, name: &str) -> Result<&str> {
        self.field_str(name)
            .ok_or_else(|| CatalogError::ControlRequiredFieldMissing(name.to_string()))
    }

    /// Obtain the value of a field parsed as a [u64].
    pub fn field_u64(&self, name: &str) -> Option<Result<u64>> {
        self.field_str(name)
            .map(|v| u64::from_str(v.trim()).map_err(CatalogError::from))
    }

    /// Obtain the non-empty, leading-whitespace-stripped lines of the named field.
    pub fn field_lines(&self, name: &str) -> Option<Vec<&str>> {
        self.field(name).map(|f| f.iter_lines().collect())
    }

    /// Serialize to a control chunk.
    ///
    /// Every field is terminated by a newline. No paragraph separator is appended.
    pub fn to_chunk(&self) -> String {
        let mut s = String::new();
        for field in &self.fields {
            field.write_to(&mut s);
        }

        s
    }
}

/// Holds parsing state for control files.
///
/// Instances are fed lines of text and emit [ControlParagraph] as they are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// Returns a paragraph if the line terminated one.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let is_empty_line = line.trim().is_empty();
        let is_continuation = (line.starts_with(' ') || line.starts_with('\t')) && !is_empty_line;

        let current_field = self.field.take();

        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        match (current_field, is_continuation) {
            (Some(v), true) => {
                self.field = Some(v + line);
            }
            (Some(v), false) => {
                self.flush_field(v)?;
                self.field = Some(line.to_string());
            }
            (None, true) => {
                return Err(CatalogError::ControlParseError(format!(
                    "continuation line without a field: '{}'",
                    line.trim_end()
                )));
            }
            (None, false) => {
                self.field = Some(line.to_string());
            }
        }

        Ok(None)
    }

    /// Finish parsing, returning any in-progress paragraph.
    pub fn finish(mut self) -> Result<Option<ControlParagraph<'static>>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, v: String) -> Result<()> {
        let (name, value) = v.split_once(':').ok_or_else(|| {
            CatalogError::ControlParseError(format!("error parsing line '{}'; missing colon", v))
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::ControlParseError(format!(
                "error parsing line '{}'; empty field name",
                v
            )));
        }

        // A leading newline marks a value that starts on a continuation line, as
        // with checksum lists, and is preserved.
        let value = value.trim_start_matches(|c| c == ' ' || c == '\t').trim_end();

        self.paragraph.set_field_from_string(
            Cow::Owned(name.to_string()),
            Cow::Owned(value.to_string()),
        );

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    #[test]
    fn field_semantics() {
        let mut p = ControlParagraph::default();

        p.set_field_from_string("Package".into(), "foo".into());
        p.set_field_from_string("Version".into(), "1.0".into());
        p.set_field_from_string("package".into(), "bar".into());

        // Replacement keeps the original position and name casing.
        assert_eq!(p.iter_fields().next().unwrap().name(), "Package");
        assert_eq!(p.field_str("PACKAGE"), Some("bar"));

        assert!(p.remove_field("version"));
        assert!(!p.has_field("Version"));
        assert!(!p.remove_field("Version"));
    }

    #[test]
    fn parse_chunk_multiline() -> Result<()> {
        let chunk = indoc! {"
            Package: hello
            Version: 2.10-2
            Description: example package
             The long description
             .
             continues here.
            Files:
             d41d8cd98f00b204e9800998ecf8427e 0 hello_2.10.orig.tar.gz
        "};

        let p = ControlParagraph::parse_chunk(chunk)?;

        assert_eq!(p.field_str("Version"), Some("2.10-2"));
        assert_eq!(
            p.field_lines("Files"),
            Some(vec!["d41d8cd98f00b204e9800998ecf8427e 0 hello_2.10.orig.tar.gz"])
        );
        assert_eq!(p.field("Description").unwrap().iter_lines().count(), 4);
        assert_eq!(p.to_chunk(), chunk);

        Ok(())
    }

    #[test]
    fn parse_chunk_rejects_multiple_paragraphs() {
        assert!(matches!(
            ControlParagraph::parse_chunk("Package: a\n\nPackage: b\n"),
            Err(CatalogError::ControlParagraphMismatch(2))
        ));
        assert!(matches!(
            ControlParagraph::parse_chunk(""),
            Err(CatalogError::ControlParagraphMismatch(0))
        ));
        assert!(ControlParagraph::parse_chunk(" orphan continuation\n").is_err());
    }

    #[test]
    fn from_lines() {
        let field = ControlField::from_lines(
            "Checksums-Sha256".into(),
            "",
            ["abc 1 a".to_string(), "def 2 b".to_string()].into_iter(),
        );

        assert_eq!(field.value_str(), "\n abc 1 a\n def 2 b");
        assert_eq!(field.iter_lines().collect::<Vec<_>>(), vec!["abc 1 a", "def 2 b"]);

        let mut p = ControlParagraph::default();
        p.set_field(field);
        assert_eq!(p.to_chunk(), "Checksums-Sha256:\n abc 1 a\n def 2 b\n");
    }
}
