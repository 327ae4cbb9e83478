//! This crate fixes up OSGi bundles after they were obfuscated by proguard.
//!
//! Renaming classes and packages invalidates the `Export-Package` header of
//! a bundle's manifest. Given the obfuscated jar and the proguard mapping
//! file, this crate rewrites the header to the obfuscated package names and
//! repacks the jar. The mapping can also be parsed line-by-line on its own.
//!
//! # Examples
//!
//! ```
//! use proguard_osgi::{Manifest, MappingIndex};
//!
//! let mapping = br#"com.example.api.Service -> a.b.C:
//!     java.lang.String name -> a
//!     1:3:void start():12:14 -> b
//! com.example.api.Client -> a.b.D:"#;
//! let index = MappingIndex::from_bytes(mapping).unwrap();
//!
//! let manifest = Manifest::parse(
//!     "Manifest-Version: 1.0\nExport-Package: com.example.api,\n org.slf4j\n",
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     manifest.rewrite(&index).get("Export-Package"),
//!     Some("a.b,org.slf4j"),
//! );
//! ```
//!
//! Whole archives are processed with [`process`] or [`BundleFixup`]:
//!
//! ```no_run
//! let report = proguard_osgi::process("target/bundle.jar", "target/proguard_map.txt")?;
//! println!("exported: {:?}", report.exported_packages);
//! # Ok::<(), proguard_osgi::FixupError>(())
//! ```

#![warn(missing_docs)]

#[macro_use]
mod utils;

pub mod archive;
mod error;
mod fixup;
mod index;
mod manifest;
mod mapping;

pub use error::FixupError;
pub use fixup::{process, scratch_dir, BundleFixup, FixupOptions, FixupReport};
pub use index::MappingIndex;
pub use manifest::{
    Manifest, ManifestAttribute, ATTRIBUTE_SEPARATOR, CONTINUATION_WIDTH, EXPORT_PACKAGE,
    FIRST_LINE_WIDTH,
};
pub use mapping::{
    ParseError, ParseErrorKind, ProguardMapping, ProguardRecord, ProguardRecordIter,
};

#[cfg(feature = "uuid")]
use uuid::Uuid;

/// Calculates the UUID of the mapping file.
///
/// The UUID is generated from a file checksum.
#[cfg(feature = "uuid")]
pub fn mapping_uuid(mapping: &[u8]) -> Uuid {
    lazy_static::lazy_static! {
        static ref NAMESPACE: Uuid = Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"guardsquare.com");
    }
    // this internally only operates on bytes, so this is safe to do
    Uuid::new_v5(&NAMESPACE, mapping)
}
