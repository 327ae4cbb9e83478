//! Fixing up an obfuscated bundle in place.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{Level, Log};
use serde::{Deserialize, Serialize};

use crate::archive::{self, MANIFEST_PATH};
use crate::manifest::EXPORT_PACKAGE;
use crate::{FixupError, Manifest, MappingIndex};

/// Settings for [`BundleFixup`].
///
/// Missing fields take their default values when deserializing.
///
/// # Examples
///
/// ```
/// use proguard_osgi::FixupOptions;
///
/// let options = FixupOptions::from_json(br#"{"keep_scratch_dir": true}"#).unwrap();
/// assert!(options.keep_scratch_dir);
/// assert_eq!(options.export_attribute, "Export-Package");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixupOptions {
    /// Path of the manifest inside the archive.
    pub manifest_path: String,
    /// Name of the attribute listing exported packages.
    pub export_attribute: String,
    /// Whether to leave the extracted tree on disk after rebuilding.
    pub keep_scratch_dir: bool,
}

impl Default for FixupOptions {
    fn default() -> Self {
        Self {
            manifest_path: MANIFEST_PATH.to_owned(),
            export_attribute: EXPORT_PACKAGE.to_owned(),
            keep_scratch_dir: false,
        }
    }
}

impl FixupOptions {
    /// Reads options from a JSON document.
    pub fn from_json(json: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(json)
    }
}

/// What [`BundleFixup::process`] did to an archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FixupReport {
    /// The directory the archive was extracted to.
    pub scratch_dir: PathBuf,
    /// The number of entries in the rebuilt archive.
    pub entries: usize,
    /// The rewritten export list, if the archive had a manifest exporting
    /// packages.
    pub exported_packages: Option<Vec<String>>,
    /// The UUID of the mapping file that was applied.
    #[cfg(feature = "uuid")]
    pub mapping_uuid: Option<String>,
}

/// Rewrites the manifest of an obfuscated archive so its exported packages
/// match the obfuscated package names.
pub struct BundleFixup<'l> {
    options: FixupOptions,
    logger: &'l dyn Log,
}

impl fmt::Debug for BundleFixup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleFixup")
            .field("options", &self.options)
            .finish()
    }
}

impl Default for BundleFixup<'static> {
    fn default() -> Self {
        Self::new(FixupOptions::default())
    }
}

impl BundleFixup<'static> {
    /// Creates a fixup that logs through the global logger.
    pub fn new(options: FixupOptions) -> Self {
        Self::with_logger(options, log::logger())
    }
}

impl<'l> BundleFixup<'l> {
    /// Creates a fixup that logs through `logger`.
    pub fn with_logger(options: FixupOptions, logger: &'l dyn Log) -> Self {
        Self { options, logger }
    }

    /// The options in use.
    pub fn options(&self) -> &FixupOptions {
        &self.options
    }

    /// Fixes up the archive at `archive_path` using the mapping file at
    /// `mapping_path`.
    ///
    /// The archive is extracted next to itself, its manifest (if any) is
    /// rewritten, and the archive is rebuilt from the extracted tree. The
    /// original archive is only replaced once everything else succeeded.
    pub fn process(
        &self,
        archive_path: &Path,
        mapping_path: &Path,
    ) -> Result<FixupReport, FixupError> {
        let scratch = scratch_dir(archive_path);
        let index = MappingIndex::load(mapping_path, self.logger)?;

        archive::extract(archive_path, &scratch, self.logger)?;
        let exported_packages = self.fix_manifest(&scratch, &index)?;
        let entries = archive::rebuild(&scratch, archive_path, self.logger)?;

        if !self.options.keep_scratch_dir {
            if let Err(err) = fs::remove_dir_all(&scratch) {
                emit!(
                    self.logger,
                    Level::Warn,
                    "could not remove {}: {}",
                    scratch.display(),
                    err
                );
            }
        }

        emit!(
            self.logger,
            Level::Info,
            "fixed up {} ({} entries)",
            archive_path.display(),
            entries
        );

        Ok(FixupReport {
            scratch_dir: scratch,
            entries,
            exported_packages,
            #[cfg(feature = "uuid")]
            mapping_uuid: index.uuid().map(|uuid| uuid.to_string()),
        })
    }

    fn fix_manifest(
        &self,
        scratch: &Path,
        index: &MappingIndex,
    ) -> Result<Option<Vec<String>>, FixupError> {
        let path = scratch.join(&self.options.manifest_path);
        if !path.is_file() {
            emit!(
                self.logger,
                Level::Debug,
                "no manifest at {}, skipping",
                path.display()
            );
            return Ok(None);
        }

        let text = fs::read_to_string(&path).map_err(|e| FixupError::io(&path, e))?;
        let manifest =
            Manifest::parse(&text)?.rewrite_attribute(&self.options.export_attribute, index);
        fs::write(&path, manifest.serialize()).map_err(|e| FixupError::io(&path, e))?;

        Ok(manifest
            .get(&self.options.export_attribute)
            .map(|value| value.split(',').map(str::to_owned).collect()))
    }
}

/// Fixes up `archive_path` with the default options.
///
/// See [`BundleFixup::process`].
pub fn process<A, M>(archive_path: A, mapping_path: M) -> Result<FixupReport, FixupError>
where
    A: AsRef<Path>,
    M: AsRef<Path>,
{
    BundleFixup::default().process(archive_path.as_ref(), mapping_path.as_ref())
}

/// The directory an archive is extracted to: a sibling named after the
/// archive without its extension.
/// For example: "target/bundle.jar" -> "target/bundle"
/// For example: "target/bundle" -> "target/bundle.extracted"
pub fn scratch_dir(archive_path: &Path) -> PathBuf {
    let parent = archive_path.parent().unwrap_or_else(|| Path::new(""));
    match (archive_path.file_stem(), archive_path.extension()) {
        (Some(stem), Some(_)) => parent.join(stem),
        _ => {
            let mut name = OsString::from(archive_path.file_name().unwrap_or_default());
            name.push(".extracted");
            parent.join(name)
        }
    }
}
