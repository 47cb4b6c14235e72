// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Directory-backed collaborator services.
//!
//! The console's IPC services are only reachable from the privileged
//! environment; for offline use (and for the on-target case where the
//! flash filesystem is mounted as a directory tree) the same consumed
//! interfaces are served straight from files. Signed metadata read this
//! way was validated by the system when it was installed; it is trusted
//! as extracted.

use hollywood_keys::collab::{code2err, FlashFs, IosError, NetInterface, TitleStore};
use std::path::{Path, PathBuf};

fn title_dir(root: &Path, title_id: u64) -> PathBuf {
    root.join(format!(
        "title/{:08x}/{:08x}",
        (title_id >> 32) as u32,
        title_id as u32
    ))
}

pub struct DirTitleStore {
    root: Option<PathBuf>,
}

impl DirTitleStore {
    pub fn new(root: Option<PathBuf>) -> DirTitleStore {
        DirTitleStore { root }
    }

    fn root(&self) -> Result<&Path, IosError> {
        self.root.as_deref().ok_or_else(|| code2err(-106))
    }
}

impl TitleStore for DirTitleStore {
    fn signed_metadata(&mut self, title_id: u64) -> Result<Vec<u8>, IosError> {
        let path = title_dir(self.root()?, title_id).join("content/title.tmd");
        std::fs::read(&path).map_err(|_| code2err(-106))
    }

    fn contents_count(&mut self, title_id: u64) -> Result<u32, IosError> {
        let dir = title_dir(self.root()?, title_id).join("content");
        let entries = std::fs::read_dir(&dir).map_err(|_| code2err(-106))?;
        let count = entries
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "app"))
            .count();
        Ok(count as u32)
    }

    fn device_cert(&mut self) -> Result<Vec<u8>, IosError> {
        // Only the live identity service can produce this.
        Err(code2err(-102))
    }
}

pub struct DirFlashFs {
    root: Option<PathBuf>,
}

impl DirFlashFs {
    pub fn new(root: Option<PathBuf>) -> DirFlashFs {
        DirFlashFs { root }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        self.root
            .as_deref()
            .map(|root| root.join(path.trim_start_matches('/')))
    }
}

impl FlashFs for DirFlashFs {
    fn read_file(&mut self, path: &str) -> Result<Vec<u8>, IosError> {
        let resolved = self.resolve(path).ok_or_else(|| code2err(-106))?;
        std::fs::read(&resolved).map_err(|_| code2err(-106))
    }

    fn file_exists(&mut self, path: &str) -> bool {
        self.resolve(path).is_some_and(|p| p.exists())
    }
}

/// Stand-in for the network-interface service when none is reachable.
pub struct NoNet;

impl NetInterface for NoNet {
    fn mac_address(&mut self) -> Result<[u8; 6], IosError> {
        Err(code2err(-102))
    }
}
