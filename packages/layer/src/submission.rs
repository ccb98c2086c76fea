//! Classification of the files submitted for one layer.
//!
//! A layer arrives either as one self-contained GeoJSON file or as a
//! shapefile: at least the `.shp` geometry, `.shx` index and `.dbf`
//! attribute table, optionally with `.prj` and `.cpg` companions. Anything
//! else is rejected before decoding starts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::LayerError;

/// Extensions accepted as a single-file package.
const PACKAGE_EXTENSIONS: &[&str] = &["geojson", "json"];

/// Extensions accepted as shapefile components.
const SHAPEFILE_EXTENSIONS: &[&str] = &["shp", "shx", "dbf", "prj", "cpg"];

/// Components that every shapefile submission must contain.
const REQUIRED_SHAPEFILE_EXTENSIONS: &[&str] = &["shp", "shx", "dbf"];

const EXPECTED_FILES: &str = "submit a single .geojson file or the .shp, .shx and .dbf files of one shapefile";

/// The component files of one shapefile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapefileSet {
    /// Geometry file.
    pub shp: PathBuf,
    /// Geometry index.
    pub shx: PathBuf,
    /// Attribute table.
    pub dbf: PathBuf,
    /// Projection (WKT), if submitted.
    pub prj: Option<PathBuf>,
    /// Attribute table code page, if submitted.
    pub cpg: Option<PathBuf>,
}

/// A validated set of files describing one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A single GeoJSON file.
    Package(PathBuf),
    /// A shapefile and its companions.
    Shapefile(ShapefileSet),
}

impl Submission {
    /// Validates `paths` and decides which kind of layer they describe.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InvalidInput`] if the set is empty, contains an
    /// unsupported or duplicated extension, mixes a package with other
    /// files, misses a required shapefile component, or names shapefile
    /// components that do not share one base name.
    pub fn classify(paths: &[PathBuf]) -> Result<Self, LayerError> {
        if paths.is_empty() {
            return Err(invalid(format!("no files provided; {EXPECTED_FILES}")));
        }

        let mut by_extension: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in paths {
            let extension = extension_of(path).ok_or_else(|| {
                invalid(format!("{} has no file extension; {EXPECTED_FILES}", path.display()))
            })?;

            if !PACKAGE_EXTENSIONS.contains(&extension.as_str())
                && !SHAPEFILE_EXTENSIONS.contains(&extension.as_str())
            {
                return Err(invalid(format!(
                    "unsupported file type '.{extension}' ({}); {EXPECTED_FILES}",
                    path.display()
                )));
            }

            if by_extension.insert(extension.clone(), path.clone()).is_some() {
                return Err(invalid(format!(
                    "more than one .{extension} file submitted; {EXPECTED_FILES}"
                )));
            }
        }

        let has_package = PACKAGE_EXTENSIONS
            .iter()
            .any(|ext| by_extension.contains_key(*ext));

        if has_package {
            if paths.len() == 1 {
                return Ok(Self::Package(paths[0].clone()));
            }
            return Err(invalid(format!(
                "a GeoJSON layer must be submitted on its own; {EXPECTED_FILES}"
            )));
        }

        let missing: Vec<String> = REQUIRED_SHAPEFILE_EXTENSIONS
            .iter()
            .filter(|ext| !by_extension.contains_key(**ext))
            .map(|ext| format!(".{ext}"))
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!(
                "incomplete shapefile, missing {}; {EXPECTED_FILES}",
                missing.join(", ")
            )));
        }

        let mut take = |ext: &str| by_extension.remove(ext);
        let (Some(shp), Some(shx), Some(dbf)) = (take("shp"), take("shx"), take("dbf")) else {
            return Err(invalid(EXPECTED_FILES.to_string()));
        };
        let set = ShapefileSet {
            shp,
            shx,
            dbf,
            prj: take("prj"),
            cpg: take("cpg"),
        };

        set.check_base_names()?;

        Ok(Self::Shapefile(set))
    }

    /// The file a reader opens first.
    #[must_use]
    pub fn primary_path(&self) -> &Path {
        match self {
            Self::Package(path) => path,
            Self::Shapefile(set) => &set.shp,
        }
    }
}

impl ShapefileSet {
    fn components(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.shx, &self.dbf]
            .into_iter()
            .chain(self.prj.iter())
            .chain(self.cpg.iter())
    }

    /// Shapefile readers locate the companions next to the `.shp`, so all
    /// components must live in one directory under one base name.
    fn check_base_names(&self) -> Result<(), LayerError> {
        let stem = self.shp.file_stem();
        let parent = self.shp.parent();

        for component in self.components() {
            if component.file_stem() != stem || component.parent() != parent {
                return Err(invalid(format!(
                    "{} does not match {}; shapefile components must share one name and directory",
                    component.display(),
                    self.shp.display()
                )));
            }
        }

        Ok(())
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

fn invalid(message: String) -> LayerError {
    LayerError::InvalidInput(message)
}
