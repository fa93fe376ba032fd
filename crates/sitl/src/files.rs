//! In-memory file system of the simulated flight controller.

use std::collections::{BTreeMap, BTreeSet};

use ardu_configurator_core::traits::DirEntry;

use crate::error::SimulatorError;

/// Flat path -> contents map with directory listing.
#[derive(Debug, Clone, Default)]
pub struct VirtualFileSystem {
    files: BTreeMap<String, Vec<u8>>,
}

impl VirtualFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file. Paths are absolute.
    pub fn insert(&mut self, path: &str, data: Vec<u8>) -> Result<(), SimulatorError> {
        if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
            return Err(SimulatorError::InvalidPath(path.to_string()));
        }
        self.files.insert(path.to_string(), data);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Direct children of `dir`, or `None` if nothing lives below it.
    pub fn list(&self, dir: &str) -> Option<Vec<DirEntry>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut entries = Vec::new();
        let mut subdirs = BTreeSet::new();
        for (path, data) in self.files.range(prefix.clone()..) {
            let Some(rest) = path.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((sub, _)) => {
                    subdirs.insert(sub.to_string());
                }
                None => entries.push(DirEntry {
                    name: rest.to_string(),
                    size: data.len() as u64,
                    is_dir: false,
                }),
            }
        }
        if entries.is_empty() && subdirs.is_empty() {
            return None;
        }
        entries.extend(subdirs.into_iter().map(|name| DirEntry {
            name,
            size: 0,
            is_dir: true,
        }));
        Some(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing() {
        let mut fs = VirtualFileSystem::new();
        fs.insert("/APM/LOGS/00000001.BIN", vec![0; 10]).unwrap();
        fs.insert("/APM/LOGS/LASTLOG.TXT", b"1".to_vec()).unwrap();
        fs.insert("/APM/LOGS/old/00000001.BIN", vec![]).unwrap();
        fs.insert("/APM/LOGSX", vec![]).unwrap();

        let entries = fs.list("/APM/LOGS").unwrap();
        let names: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.is_dir)).collect();
        assert_eq!(
            names,
            [("00000001.BIN", false), ("LASTLOG.TXT", false), ("old", true)]
        );
        assert_eq!(entries[0].size, 10);
        assert!(fs.list("/APM/NOPE").is_none());
    }

    #[test]
    fn test_invalid_paths() {
        let mut fs = VirtualFileSystem::new();
        assert!(fs.insert("relative.txt", vec![]).is_err());
        assert!(fs.insert("/dir/", vec![]).is_err());
        assert!(fs.insert("/a//b", vec![]).is_err());
        assert!(fs.is_empty());
    }
}
