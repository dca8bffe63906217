//! Image directory scanning
//!
//! Builds the [`DeviceImageSet`] a flash run draws from: every `*.img` file
//! directly inside the source directory, keyed by lower-cased file name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::ImageError;

/// Image files available to a flash run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceImageSet {
    images: BTreeMap<String, PathBuf>,
}

impl DeviceImageSet {
    /// Scan `dir` (not recursive) for `*.img` files
    ///
    /// When two files differ only in case the first in name order wins.
    pub fn scan(dir: &Path) -> Result<Self, ImageError> {
        if !dir.is_dir() {
            return Err(ImageError::DirectoryNotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut images = BTreeMap::new();
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| ImageError::Scan {
                path: dir.to_path_buf(),
                error: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_img = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("img"));
            if !is_img {
                continue;
            }

            let key = entry.file_name().to_string_lossy().to_lowercase();
            if images.contains_key(&key) {
                tracing::warn!("ignoring {} (duplicate of {})", path.display(), key);
                continue;
            }
            images.insert(key, path.to_path_buf());
        }

        if images.is_empty() {
            return Err(ImageError::Empty {
                path: dir.to_path_buf(),
            });
        }

        tracing::debug!("found {} images in {}", images.len(), dir.display());
        Ok(Self { images })
    }

    /// Path of the image with lower-cased file name `key`
    pub fn get(&self, key: &str) -> Option<&Path> {
        self.images.get(key).map(PathBuf::as_path)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.images.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Image keys in name order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }
}

impl<K: Into<String>> FromIterator<(K, PathBuf)> for DeviceImageSet {
    fn from_iter<T: IntoIterator<Item = (K, PathBuf)>>(iter: T) -> Self {
        Self {
            images: iter
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_collects_img_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("boot.img"), b"boot").unwrap();
        fs::write(temp.path().join("VBMETA.img"), b"vbmeta").unwrap();
        fs::write(temp.path().join("flash.cfg"), b"device:x").unwrap();
        fs::create_dir(temp.path().join("nested")).unwrap();
        fs::write(temp.path().join("nested").join("system.img"), b"sys").unwrap();

        let images = DeviceImageSet::scan(temp.path()).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images.get("boot.img"), Some(temp.path().join("boot.img").as_path()));
        assert!(images.contains("vbmeta.img"));
        assert!(!images.contains("system.img"));
    }

    #[test]
    fn test_scan_empty_dir_is_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("readme.txt"), b"").unwrap();
        assert!(matches!(
            DeviceImageSet::scan(temp.path()),
            Err(ImageError::Empty { .. })
        ));
    }

    #[test]
    fn test_scan_missing_dir_is_error() {
        assert!(matches!(
            DeviceImageSet::scan(Path::new("/nonexistent/images")),
            Err(ImageError::DirectoryNotFound { .. })
        ));
    }

    #[test]
    fn test_from_iter_lowercases_keys() {
        let images: DeviceImageSet = [("Boot.img", PathBuf::from("/x/Boot.img"))]
            .into_iter()
            .collect();
        assert_eq!(images.keys().collect::<Vec<_>>(), vec!["boot.img"]);
    }
}
