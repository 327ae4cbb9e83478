//! Class and package renames derived from a proguard mapping file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{Level, Log};

use crate::utils::package_name;
use crate::{FixupError, ParseErrorKind, ProguardMapping, ProguardRecord};

/// An index of the renames recorded in a proguard mapping.
///
/// Besides the class renames found in the mapping, the index derives which
/// obfuscated packages every original package ended up in. A package usually
/// maps to a single obfuscated package, but may map to several if its classes
/// were moved apart.
///
/// # Examples
///
/// ```
/// use proguard_osgi::MappingIndex;
///
/// let index = MappingIndex::from_bytes(
///     b"com.foo.Bar -> a.b.c.D:\n    int count -> a\n",
/// )
/// .unwrap();
///
/// assert_eq!(index.lookup_packages("com.foo"), ["a.b.c"]);
/// assert_eq!(index.lookup_packages("com.other"), ["com.other"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MappingIndex {
    classes: HashMap<String, String>,
    packages: HashMap<String, Vec<String>>,
    #[cfg(feature = "uuid")]
    uuid: Option<uuid::Uuid>,
}

impl MappingIndex {
    /// Loads the mapping file at `path`.
    ///
    /// Unparseable member lines are skipped with a warning, as they carry no
    /// package information. Class lines must be well-formed.
    pub fn load<P: AsRef<Path>>(path: P, logger: &dyn Log) -> Result<Self, FixupError> {
        let path = path.as_ref();
        let source = fs::read(path).map_err(|e| FixupError::open(path, e))?;
        let index = Self::from_mapping_with_logger(&ProguardMapping::new(&source), logger)?;
        emit!(
            logger,
            Level::Debug,
            "loaded {} classes in {} packages from {}",
            index.class_count(),
            index.package_count(),
            path.display()
        );
        Ok(index)
    }

    /// Builds an index from an in-memory mapping, logging through the global
    /// logger.
    pub fn from_bytes(source: &[u8]) -> Result<Self, FixupError> {
        Self::from_mapping(&ProguardMapping::new(source))
    }

    /// Builds an index from a [`ProguardMapping`], logging through the global
    /// logger.
    pub fn from_mapping(mapping: &ProguardMapping<'_>) -> Result<Self, FixupError> {
        Self::from_mapping_with_logger(mapping, log::logger())
    }

    /// Builds an index from a [`ProguardMapping`], logging through `logger`.
    pub fn from_mapping_with_logger(
        mapping: &ProguardMapping<'_>,
        logger: &dyn Log,
    ) -> Result<Self, FixupError> {
        let mut index = MappingIndex::default();
        for record in mapping.iter() {
            match record {
                Ok(ProguardRecord::Class {
                    original,
                    obfuscated,
                }) => index.insert_class(original, obfuscated),
                Ok(ProguardRecord::Header { .. })
                | Ok(ProguardRecord::Field { .. })
                | Ok(ProguardRecord::Method { .. }) => {}
                Err(err) if err.kind() == ParseErrorKind::InvalidMember => {
                    emit!(
                        logger,
                        Level::Warn,
                        "skipping unrecognized member mapping on line {}",
                        err.line_number()
                    );
                }
                Err(err) => {
                    return Err(FixupError::Parse {
                        line_number: err.line_number(),
                        line: String::from_utf8_lossy(err.line()).into_owned(),
                        kind: err.kind(),
                    })
                }
            }
        }
        #[cfg(feature = "uuid")]
        {
            index.uuid = Some(crate::mapping_uuid(mapping.source()));
        }
        Ok(index)
    }

    fn insert_class(&mut self, original: &str, obfuscated: &str) {
        let packages = self
            .packages
            .entry(package_name(original).to_owned())
            .or_default();
        let obfuscated_package = package_name(obfuscated);
        if !packages.iter().any(|p| p == obfuscated_package) {
            packages.push(obfuscated_package.to_owned());
        }
        self.classes
            .insert(original.to_owned(), obfuscated.to_owned());
    }

    /// Returns the obfuscated packages the given original package was
    /// renamed to.
    ///
    /// Packages that do not appear in the mapping are returned unchanged.
    /// Multiple results are in the order they were first seen.
    pub fn lookup_packages<'a>(&'a self, original: &'a str) -> Vec<&'a str> {
        match self.packages.get(original) {
            Some(packages) => packages.iter().map(String::as_str).collect(),
            None => vec![original],
        }
    }

    /// Returns the obfuscated name of a class, if it was renamed.
    pub fn lookup_class(&self, original: &str) -> Option<&str> {
        self.classes.get(original).map(String::as_str)
    }

    /// The number of class mappings.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// The number of distinct original packages.
    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    /// The UUID of the mapping file this index was built from.
    #[cfg(feature = "uuid")]
    pub fn uuid(&self) -> Option<uuid::Uuid> {
        self.uuid
    }
}
