#![warn(missing_docs)]
//! Location of auxiliary measurements (dark spectra, power calibrations) next to a measurement.
//!
//! Auxiliary files are found by file name convention only. Starting at the directory of the
//! measurement, the resolver first searches the directory itself and its subdirectories
//! (depth-first, sorted order) and then walks upwards, searching each parent directory and its
//! not yet visited subdirectories, until the configured root boundary has been searched.
use crate::error::{PlError, PlResult};
use log::{debug, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Outcome of an auxiliary file search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Search<T> {
    /// a matching file (or pair of files) was found
    Found(T),
    /// nothing was found
    NotFound {
        /// number of directories that were scanned
        directories_visited: usize,
    },
}

impl<T> Search<T> {
    /// Convert into an [`Option`], dropping the visit statistics.
    #[must_use]
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(t) => Some(t),
            Self::NotFound { .. } => None,
        }
    }
}

/// The two measurement files forming a power calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationFiles {
    /// power measured at the beam splitter
    pub beamsplitter: PathBuf,
    /// power measured at the sample position
    pub sample: PathBuf,
}

/// Searches a directory tree for auxiliary measurement files.
#[derive(Debug, Clone)]
pub struct AuxFileResolver {
    root_boundary: PathBuf,
    max_depth: usize,
}

impl AuxFileResolver {
    /// Create a new [`AuxFileResolver`].
    ///
    /// The upward search never leaves `root_boundary`. `max_depth` limits how deep subdirectories are
    /// searched below any directory on the upward path.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Io`] if the root boundary does not exist or is not
    /// a directory.
    pub fn new(root_boundary: &Path, max_depth: usize) -> PlResult<Self> {
        let root_boundary = canonical_dir(root_boundary)?;
        Ok(Self {
            root_boundary,
            max_depth,
        })
    }
    /// Returns a reference to the root boundary of this [`AuxFileResolver`].
    #[must_use]
    pub fn root_boundary(&self) -> &Path {
        &self.root_boundary
    }
    /// Find a dark spectrum for a measurement in `directory`.
    ///
    /// A dark file contains `dark` (case-insensitive) as well as the integration time and center
    /// energy tokens (verbatim) in its name, e.g. `dark_1.3eV_0.2s.origin`.
    ///
    /// # Errors
    ///
    /// This function will return an error if `directory` does not exist. A `directory` outside of the
    /// root boundary is not searched and yields [`Search::NotFound`].
    pub fn find_dark(
        &self,
        directory: &Path,
        integration_time: &str,
        center_energy: &str,
    ) -> PlResult<Search<PathBuf>> {
        self.search(directory, |files| {
            files
                .iter()
                .find(|f| {
                    file_name(f).is_some_and(|name| {
                        name.to_lowercase().contains("dark")
                            && name.contains(integration_time)
                            && name.contains(center_energy)
                    })
                })
                .cloned()
        })
    }
    /// Find a pair of power calibration files for a measurement in `directory`.
    ///
    /// Calibration files contain `calibration` in their name. The beam splitter side is marked with
    /// `atbs`, the sample side with `atsample` (all case-insensitive). Both have to be located in the
    /// same directory.
    ///
    /// # Errors
    ///
    /// This function will return an error if `directory` does not exist. A `directory` outside of the
    /// root boundary is not searched and yields [`Search::NotFound`].
    pub fn find_power_calibration(&self, directory: &Path) -> PlResult<Search<CalibrationFiles>> {
        self.search(directory, |files| {
            let candidates: Vec<(&PathBuf, String)> = files
                .iter()
                .filter_map(|f| file_name(f).map(|n| (f, n.to_lowercase())))
                .filter(|(_, n)| n.contains("calibration"))
                .collect();
            let beamsplitter = candidates.iter().find(|(_, n)| n.contains("atbs"))?;
            let sample = candidates.iter().find(|(_, n)| n.contains("atsample"))?;
            Some(CalibrationFiles {
                beamsplitter: beamsplitter.0.clone(),
                sample: sample.0.clone(),
            })
        })
    }
    fn search<T>(
        &self,
        directory: &Path,
        matcher: impl Fn(&[PathBuf]) -> Option<T>,
    ) -> PlResult<Search<T>> {
        let mut current = canonical_dir(directory)?;
        if !current.starts_with(&self.root_boundary) {
            warn!(
                "{} is outside of the root boundary {}, auxiliary files are not searched",
                current.display(),
                self.root_boundary.display()
            );
            return Ok(Search::NotFound {
                directories_visited: 0,
            });
        }
        let mut visited = 0;
        let mut searched: Option<PathBuf> = None;
        loop {
            if let Some(found) =
                self.search_down(&current, searched.as_deref(), 0, &matcher, &mut visited)
            {
                debug!("auxiliary file found after visiting {visited} directories");
                return Ok(Search::Found(found));
            }
            if current == self.root_boundary {
                break;
            }
            let Some(parent) = current.parent().map(Path::to_path_buf) else {
                break;
            };
            searched = Some(current);
            current = parent;
        }
        Ok(Search::NotFound {
            directories_visited: visited,
        })
    }
    fn search_down<T>(
        &self,
        directory: &Path,
        skip: Option<&Path>,
        depth: usize,
        matcher: &impl Fn(&[PathBuf]) -> Option<T>,
        visited: &mut usize,
    ) -> Option<T> {
        *visited += 1;
        let (files, subdirs) = match sorted_entries(directory) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("skipping directory: {e}");
                return None;
            }
        };
        if let Some(found) = matcher(&files) {
            return Some(found);
        }
        if depth >= self.max_depth {
            return None;
        }
        subdirs
            .iter()
            .filter(|d| Some(d.as_path()) != skip)
            .find_map(|d| self.search_down(d, None, depth + 1, matcher, visited))
    }
}

fn canonical_dir(path: &Path) -> PlResult<PathBuf> {
    let canonical = fs::canonicalize(path)
        .map_err(|e| PlError::Io(format!("cannot resolve {}: {e}", path.display())))?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(PlError::Io(format!("{} is not a directory", path.display())))
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Files and subdirectories of `directory`, each sorted by name.
fn sorted_entries(directory: &Path) -> PlResult<(Vec<PathBuf>, Vec<PathBuf>)> {
    let entries = fs::read_dir(directory)
        .map_err(|e| PlError::Io(format!("cannot read {}: {e}", directory.display())))?;
    let (mut dirs, mut files): (Vec<PathBuf>, Vec<PathBuf>) = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .partition(|p| p.is_dir());
    files.sort();
    dirs.sort();
    Ok((files, dirs))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_helper::check_warnings;
    use assert_matches::assert_matches;
    use std::fs::{create_dir_all, File};
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap();
        fs::canonicalize(path).unwrap()
    }
    #[test]
    fn new() {
        let dir = TempDir::new().unwrap();
        let resolver = AuxFileResolver::new(dir.path(), 3).unwrap();
        assert_eq!(
            resolver.root_boundary(),
            fs::canonicalize(dir.path()).unwrap()
        );
        assert_matches!(
            AuxFileResolver::new(&dir.path().join("missing"), 3),
            Err(PlError::Io(_))
        );
        let file = touch(dir.path(), "file.txt");
        assert_matches!(AuxFileResolver::new(&file, 3), Err(PlError::Io(_)));
    }
    #[test]
    fn dark_in_parent() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "A/B/spectrum.origin");
        let dark = touch(root.path(), "dark_1.3eV_0.2s.ext");
        let resolver = AuxFileResolver::new(root.path(), 8).unwrap();
        let result = resolver
            .find_dark(&root.path().join("A/B"), "0.2s", "1.3eV")
            .unwrap();
        assert_eq!(result, Search::Found(dark));
    }
    #[test]
    fn dark_sorted_first() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "A/B/spectrum.origin");
        touch(root.path(), "dark_b_1.3eV_0.2s.ext");
        let first = touch(root.path(), "Dark_a_1.3eV_0.2s.ext");
        touch(root.path(), "dark_1.3eV_0.5s.ext");
        let resolver = AuxFileResolver::new(root.path(), 8).unwrap();
        let result = resolver
            .find_dark(&root.path().join("A/B"), "0.2s", "1.3eV")
            .unwrap();
        assert_eq!(result.found(), Some(first));
    }
    #[test]
    fn dark_in_subdirectory_first() {
        let root = TempDir::new().unwrap();
        let sub = touch(root.path(), "A/darks/dark_1.3eV_0.2s.ext");
        touch(root.path(), "dark_1.3eV_0.2s.ext");
        let resolver = AuxFileResolver::new(root.path(), 8).unwrap();
        let result = resolver
            .find_dark(&root.path().join("A"), "0.2s", "1.3eV")
            .unwrap();
        assert_eq!(result.found(), Some(sub));
    }
    #[test]
    fn dark_in_sibling_subtree() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "A/B/spectrum.origin");
        let dark = touch(root.path(), "A/C/dark_1.3eV_0.2s.ext");
        let resolver = AuxFileResolver::new(root.path(), 8).unwrap();
        let result = resolver
            .find_dark(&root.path().join("A/B"), "0.2s", "1.3eV")
            .unwrap();
        assert_eq!(result.found(), Some(dark));
    }
    #[test]
    fn not_found_terminates() {
        let root = TempDir::new().unwrap();
        for rel in ["A/B/C/x.origin", "A/D/y.origin", "E/z.origin"] {
            touch(root.path(), rel);
        }
        let resolver = AuxFileResolver::new(root.path(), 8).unwrap();
        let result = resolver
            .find_dark(&root.path().join("A/B/C"), "0.2s", "1.3eV")
            .unwrap();
        // root, A, B, C, D, E: every directory exactly once
        assert_eq!(
            result,
            Search::NotFound {
                directories_visited: 6
            }
        );
    }
    #[test]
    fn boundary_is_respected() {
        let outer = TempDir::new().unwrap();
        touch(outer.path(), "dark_1.3eV_0.2s.ext");
        touch(outer.path(), "root/A/x.origin");
        let resolver = AuxFileResolver::new(&outer.path().join("root"), 8).unwrap();
        let result = resolver
            .find_dark(&outer.path().join("root/A"), "0.2s", "1.3eV")
            .unwrap();
        assert_matches!(result, Search::NotFound { .. });
    }
    #[test]
    fn start_outside_boundary() {
        let outer = TempDir::new().unwrap();
        touch(outer.path(), "dark_1.3eV_0.2s.ext");
        touch(outer.path(), "root/A/x.origin");
        let root = outer.path().join("root");
        let resolver = AuxFileResolver::new(&root, 8).unwrap();
        testing_logger::setup();
        let result = resolver.find_dark(outer.path(), "0.2s", "1.3eV").unwrap();
        assert_eq!(
            result,
            Search::NotFound {
                directories_visited: 0
            }
        );
        check_warnings(vec![format!(
            "{} is outside of the root boundary {}, auxiliary files are not searched",
            fs::canonicalize(outer.path()).unwrap().display(),
            fs::canonicalize(&root).unwrap().display()
        )
        .as_str()]);
        assert_matches!(
            resolver.find_dark(&outer.path().join("missing"), "0.2s", "1.3eV"),
            Err(PlError::Io(_))
        );
    }
    #[test]
    fn max_depth() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "A/B/C/dark_1.3eV_0.2s.ext");
        let resolver = AuxFileResolver::new(root.path(), 1).unwrap();
        let result = resolver.find_dark(root.path(), "0.2s", "1.3eV").unwrap();
        assert_matches!(result, Search::NotFound { .. });
        let resolver = AuxFileResolver::new(root.path(), 3).unwrap();
        let result = resolver.find_dark(root.path(), "0.2s", "1.3eV").unwrap();
        assert_matches!(result, Search::Found(_));
    }
    #[test]
    fn calibration_pair() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "series/spl1234_PL_1.3eV_0.2s.origin");
        let bs = touch(root.path(), "Calibration_atBS.origin");
        let sample = touch(root.path(), "calibration_atSample.origin");
        let resolver = AuxFileResolver::new(root.path(), 8).unwrap();
        let result = resolver
            .find_power_calibration(&root.path().join("series"))
            .unwrap();
        assert_eq!(
            result,
            Search::Found(CalibrationFiles {
                beamsplitter: bs,
                sample
            })
        );
    }
    #[test]
    fn calibration_halves_in_different_directories() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "a/calibration_atbs.origin");
        touch(root.path(), "b/calibration_atsample.origin");
        let resolver = AuxFileResolver::new(root.path(), 8).unwrap();
        let result = resolver.find_power_calibration(root.path()).unwrap();
        assert_eq!(
            result,
            Search::NotFound {
                directories_visited: 3
            }
        );
    }
}
