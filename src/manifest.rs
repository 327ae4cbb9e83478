//! Parsing, rewriting and folding of jar manifests.
//!
//! A manifest is a sequence of `Name: Value` pairs. Long values are folded
//! onto continuation lines, each starting with a single space that is not
//! part of the value.

use std::fmt;

use crate::{FixupError, MappingIndex};

/// The OSGi header listing the packages a bundle exports.
pub const EXPORT_PACKAGE: &str = "Export-Package";

/// Separates an attribute name from its value.
pub const ATTRIBUTE_SEPARATOR: &str = ": ";

/// Maximum length of the first physical line of an attribute.
pub const FIRST_LINE_WIDTH: usize = 70;

/// Maximum length of the value part of a continuation line.
pub const CONTINUATION_WIDTH: usize = 69;

/// A single logical `Name: Value` pair of a manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestAttribute {
    /// The attribute name.
    pub name: String,
    /// The unfolded value.
    pub value: String,
}

impl ManifestAttribute {
    /// Creates a new attribute.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The attributes of a manifest, in file order.
///
/// Names are not required to be unique; repeated attributes are kept as
/// separate entries.
///
/// # Examples
///
/// ```
/// use proguard_osgi::{Manifest, MappingIndex};
///
/// let index = MappingIndex::from_bytes(b"com.foo.Bar -> a.b.c.D:\n").unwrap();
/// let manifest = Manifest::parse("Bundle-Name: demo\nExport-Package: com.foo\n").unwrap();
///
/// assert_eq!(
///     manifest.rewrite(&index).serialize(),
///     "Bundle-Name: demo\nExport-Package: a.b.c\n",
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    attributes: Vec<ManifestAttribute>,
}

impl Manifest {
    /// Parses manifest text, unfolding continuation lines.
    ///
    /// Lines starting with a space continue the current value with that one
    /// space removed. Lines without a `": "` separator continue it too, with
    /// surrounding whitespace trimmed. Empty lines are skipped.
    pub fn parse(text: &str) -> Result<Self, FixupError> {
        let mut attributes = Vec::new();
        let mut current: Option<ManifestAttribute> = None;

        for (idx, line) in text.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            let malformed = || FixupError::MalformedManifest {
                line_number: idx + 1,
                line: line.to_owned(),
            };

            let continuation = line
                .strip_prefix(' ')
                .or_else(|| (!line.contains(ATTRIBUTE_SEPARATOR)).then(|| line.trim()));
            if let Some(rest) = continuation {
                current.as_mut().ok_or_else(malformed)?.value.push_str(rest);
                continue;
            }

            let mut parts = line.split(ATTRIBUTE_SEPARATOR);
            let name = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or_default();
            if parts.next().is_some() {
                return Err(malformed());
            }
            let started = ManifestAttribute::new(name, value.trim_start());
            if let Some(finished) = current.replace(started) {
                attributes.push(finished);
            }
        }
        attributes.extend(current);

        Ok(Self { attributes })
    }

    /// Creates a manifest from a list of attributes.
    pub fn from_attributes(attributes: Vec<ManifestAttribute>) -> Self {
        Self { attributes }
    }

    /// The attributes in file order.
    pub fn attributes(&self) -> &[ManifestAttribute] {
        &self.attributes
    }

    /// Consumes the manifest, returning its attributes.
    pub fn into_attributes(self) -> Vec<ManifestAttribute> {
        self.attributes
    }

    /// Returns the value of the first attribute called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Rewrites the `Export-Package` attribute to the obfuscated packages.
    pub fn rewrite(&self, index: &MappingIndex) -> Self {
        self.rewrite_attribute(EXPORT_PACKAGE, index)
    }

    /// Rewrites every attribute called `name`, treating its value as a
    /// comma separated package list.
    ///
    /// Each package is replaced by all of the packages it was obfuscated to.
    /// Empty entries, such as the one after a trailing comma, are kept empty.
    /// Other attributes are kept as they are.
    pub fn rewrite_attribute(&self, name: &str, index: &MappingIndex) -> Self {
        let attributes = self
            .attributes
            .iter()
            .map(|attr| {
                if attr.name != name {
                    return attr.clone();
                }
                let packages: Vec<&str> = attr
                    .value
                    .split(',')
                    .flat_map(|package| match package.trim() {
                        "" => vec![""],
                        package => index.lookup_packages(package),
                    })
                    .collect();
                ManifestAttribute::new(&attr.name, packages.join(","))
            })
            .collect();
        Self { attributes }
    }

    /// Serializes the manifest, folding lines that are too long.
    ///
    /// [`Manifest::parse`] reads the output back to the same attributes,
    /// except for values with leading whitespace, which is dropped, and
    /// values containing `": "`, which fail to parse.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for attr in &self.attributes {
            write_folded(f, attr)?;
        }
        Ok(())
    }
}

/// Writes `name: value`, the value split into chunks so that the first line
/// holds at most [`FIRST_LINE_WIDTH`] characters and every continuation line
/// a space plus at most [`CONTINUATION_WIDTH`] characters.
fn write_folded(f: &mut fmt::Formatter<'_>, attr: &ManifestAttribute) -> fmt::Result {
    f.write_str(&attr.name)?;
    f.write_str(ATTRIBUTE_SEPARATOR)?;

    let header_len = attr.name.chars().count() + ATTRIBUTE_SEPARATOR.len();
    let mut width = FIRST_LINE_WIDTH.saturating_sub(header_len);
    let mut rest = attr.value.as_str();
    loop {
        let split = rest
            .char_indices()
            .nth(width)
            .map_or(rest.len(), |(pos, _)| pos);
        let (chunk, tail) = rest.split_at(split);
        f.write_str(chunk)?;
        f.write_str("\n")?;
        if tail.is_empty() {
            return Ok(());
        }
        f.write_str(" ")?;
        rest = tail;
        width = CONTINUATION_WIDTH;
    }
}
