// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Content-addressed key recovery.
//!
//! Some per-platform keys are not stored in any dumpable region; they only
//! exist inside firmware binaries at version-dependent offsets. Instead of
//! chasing offsets, each target key is described by a fingerprint of its
//! value: a cheap CRC-32 to reject almost every candidate window, then a
//! SHA-1 to confirm the survivors. A confirmed window *is* the key.

use crate::ancast;
use crate::collab::{ExecMode, FlashFs, TitleStore, SYSTEM_MENU_TITLE};
use crate::tmd::{self, ContentRecord};
use crate::Error;
use crc_any::CRCu32;
use serde::Deserialize;
use sha1::{Digest, Sha1};

/// Candidate windows are tested at every 4-byte boundary.
pub const SCAN_STRIDE: usize = 4;
/// Every recoverable key is 16 bytes.
pub const KEY_WINDOW: usize = 16;

/// Fingerprint of one recoverable key.
#[derive(Debug, Clone, Copy)]
pub struct KeyTarget {
    pub label: &'static str,
    /// Expected value length; the scanner only supports [`KEY_WINDOW`].
    pub len: usize,
    /// CRC-32 of the expected value (fast reject).
    pub quick: u32,
    /// SHA-1 of the expected value (confirmation).
    pub full: [u8; 20],
}

/// Storage-access key, recovered from the running OS image in memory.
pub const SD_KEY_TARGET: KeyTarget = KeyTarget {
    label: "SD Key",
    len: KEY_WINDOW,
    quick: 0x8f0f_36cf,
    full: [
        0xcf, 0x2b, 0xf4, 0x2e, 0x41, 0x53, 0x9a, 0xcc, 0xd3, 0x07, 0x71, 0x5e, 0xbe, 0x9a, 0xa3,
        0x49, 0x20, 0x8e, 0x85, 0x49,
    ],
};

/// Firmware-embedded targets: the storage IV and the checksum blanker.
pub const FIRMWARE_TARGETS: [KeyTarget; 2] = [
    KeyTarget {
        label: "SD IV",
        len: KEY_WINDOW,
        quick: 0x76b0_5c43,
        full: [
            0x46, 0xef, 0x21, 0x5c, 0x8e, 0x2a, 0x0f, 0xcb, 0x9f, 0x23, 0x91, 0x7d, 0xcb, 0x0b,
            0x0f, 0x17, 0x6a, 0xc4, 0xf8, 0x0e,
        ],
    },
    KeyTarget {
        label: "MD5 Blanker",
        len: KEY_WINDOW,
        quick: 0x1e4c_a6b2,
        full: [
            0x5c, 0xa8, 0x0a, 0x46, 0xd9, 0x21, 0xae, 0x45, 0x7e, 0xfd, 0x24, 0x5d, 0x8f, 0xfd,
            0x25, 0xbb, 0x88, 0x1e, 0x19, 0x6f,
        ],
    },
];

/// One confirmed key, byte-exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHit {
    pub label: &'static str,
    pub value: [u8; KEY_WINDOW],
    /// Byte offset of the window inside the scanned buffer.
    pub offset: usize,
}

/// Fingerprint helper: the (quick, full) pair the scanner would match.
pub fn fingerprint(value: &[u8]) -> (u32, [u8; 20]) {
    let mut crc = CRCu32::crc32();
    crc.digest(value);
    (crc.get_crc(), Sha1::digest(value).into())
}

/// The live-memory window hosting the running low-level OS image.
///
/// The right window moves between firmware versions, so it is
/// configuration rather than a constant baked into the engine.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    pub base: u32,
    pub len: u32,
}

impl Default for ScanConfig {
    fn default() -> ScanConfig {
        ScanConfig {
            base: 0x9340_0000,
            len: 0x0010_0000,
        }
    }
}

/// Walks `buf` looking for any of `targets`.
///
/// Windows advance by [`SCAN_STRIDE`]; a confirmed match advances by the
/// window size instead so overlapping data cannot re-match. Already-found
/// targets are skipped, and the walk stops once every target is matched.
pub fn scan(buf: &[u8], targets: &[KeyTarget]) -> Result<Vec<ScanHit>, Error> {
    if targets.is_empty() || targets.iter().any(|t| t.len != KEY_WINDOW) {
        return Err(Error::BadTargetTable);
    }

    let mut hits: Vec<ScanHit> = Vec::new();
    let mut offset = 0usize;

    while offset + KEY_WINDOW <= buf.len() {
        if hits.len() == targets.len() {
            break;
        }

        let window = &buf[offset..offset + KEY_WINDOW];
        let mut crc = CRCu32::crc32();
        crc.digest(window);
        let quick = crc.get_crc();

        let mut matched = false;
        for target in targets {
            if hits.iter().any(|h| h.label == target.label) {
                continue;
            }
            if quick != target.quick {
                continue;
            }
            // Cheap filter passed; only a digest match makes it a key.
            if Sha1::digest(window).as_slice() != target.full {
                continue;
            }

            hits.push(ScanHit {
                label: target.label,
                value: window.try_into().unwrap(),
                offset,
            });
            matched = true;
            break;
        }

        offset += if matched { KEY_WINDOW } else { SCAN_STRIDE };
    }

    Ok(hits)
}

/// Marker files left by the companion boot loader. When any of them exist
/// the loader has moved the real boot content aside.
const LOADER_MARKERS: [&str; 2] = [
    "/title/00000001/00000002/data/loader.ini",
    "/title/00000001/00000002/data/main.nfo",
];

/// The loader stores its copy of content `cid` with bit 28 set.
const LOADER_CONTENT_BIT: u32 = 0x1000_0000;

/// Fetches the system-menu boot content, preferring the loader's pristine
/// copy when the loader is installed. Falls back to the original content
/// if the copy cannot be read.
fn fetch_boot_content(fs: &mut dyn FlashFs, boot: &ContentRecord) -> Result<Vec<u8>, Error> {
    let loader_present = LOADER_MARKERS.iter().any(|p| fs.file_exists(p));
    if loader_present {
        let path = tmd::content_path(SYSTEM_MENU_TITLE, boot.id | LOADER_CONTENT_BIT);
        match fs.read_file(&path) {
            Ok(data) => {
                log::info!("using boot-loader copy of the boot content at {path}");
                return Ok(data);
            }
            Err(e) => {
                log::warn!("loader copy {path} unreadable ({e}); falling back");
            }
        }
    }

    let path = tmd::content_path(SYSTEM_MENU_TITLE, boot.id);
    Ok(fs.read_file(&path)?)
}

/// Recovery task: firmware-embedded keys.
///
/// Locates the system menu's boot content, unwraps the ancast container in
/// the alternate mode, and scans the plaintext for [`FIRMWARE_TARGETS`].
pub fn recover_firmware_keys(
    store: &mut dyn TitleStore,
    fs: &mut dyn FlashFs,
    mode: ExecMode,
) -> Result<Vec<ScanHit>, Error> {
    let metadata = store.signed_metadata(SYSTEM_MENU_TITLE)?;
    let boot = tmd::boot_content(&metadata)?;
    log::debug!("system menu boot content is {:08x}", boot.id);

    let mut image = fetch_boot_content(fs, &boot)?;

    let hits = match mode {
        ExecMode::Alternate => {
            let body = ancast::verify_and_decrypt(&mut image)?;
            scan(&image[body], &FIRMWARE_TARGETS)?
        }
        ExecMode::Primary => scan(&image, &FIRMWARE_TARGETS)?,
    };

    for hit in &hits {
        log::info!("recovered {} at image offset {:#x}", hit.label, hit.offset);
    }
    Ok(hits)
}

/// Recovery task: the storage-access key, scanned out of the window of
/// working memory described by `cfg` (already materialized by the caller).
pub fn recover_storage_key(os_image: &[u8], cfg: &ScanConfig) -> Result<Option<ScanHit>, Error> {
    log::debug!(
        "scanning {:#x} bytes at {:#x} for the storage key",
        cfg.len,
        cfg.base
    );
    let mut hits = scan(os_image, &[SD_KEY_TARGET])?;
    Ok(hits.pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{code2err, IosError};
    use std::collections::HashMap;

    fn target_for(label: &'static str, value: &[u8; 16]) -> KeyTarget {
        let (quick, full) = fingerprint(value);
        KeyTarget {
            label,
            len: KEY_WINDOW,
            quick,
            full,
        }
    }

    #[test]
    fn finds_target_at_aligned_offset() {
        let key = [0x5au8; 16];
        let other = [0x77u8; 16];
        let mut buf = vec![0u8; 256];
        buf[0x48..0x58].copy_from_slice(&key);

        let targets = [target_for("planted", &key), target_for("absent", &other)];
        let hits = scan(&buf, &targets).unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].label, "planted");
        assert_eq!(hits[0].value, key);
        assert_eq!(hits[0].offset, 0x48);
    }

    #[test]
    fn quick_hash_collision_is_not_enough() {
        let decoy = [0x11u8; 16];
        let (quick, _) = fingerprint(&decoy);
        // Same fast hash as the buffer contents, different digest.
        let target = KeyTarget {
            label: "two-stage",
            len: KEY_WINDOW,
            quick,
            full: [0xee; 20],
        };

        let mut buf = vec![0u8; 64];
        buf[16..32].copy_from_slice(&decoy);

        assert!(scan(&buf, &[target]).unwrap().is_empty());
    }

    #[test]
    fn matched_window_advances_by_window_size() {
        // Two adjacent planted keys: the second must still be found, and
        // the first must be reported exactly once.
        let a = [0xa1u8; 16];
        let b = [0xb2u8; 16];
        let mut buf = vec![0u8; 96];
        buf[8..24].copy_from_slice(&a);
        buf[24..40].copy_from_slice(&b);

        let hits = scan(&buf, &[target_for("a", &a), target_for("b", &b)]).unwrap();
        assert_eq!(
            hits,
            vec![
                ScanHit {
                    label: "a",
                    value: a,
                    offset: 8
                },
                ScanHit {
                    label: "b",
                    value: b,
                    offset: 24
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_table() {
        assert!(matches!(scan(&[0u8; 64], &[]), Err(Error::BadTargetTable)));

        let mut bad = target_for("short", &[0u8; 16]);
        bad.len = 8;
        assert!(matches!(
            scan(&[0u8; 64], &[bad]),
            Err(Error::BadTargetTable)
        ));
    }

    #[test]
    fn storage_key_task_returns_single_hit() {
        let key = [0x3cu8; 16];
        let (quick, full) = fingerprint(&key);
        // Swap in a synthetic fingerprint for the production target.
        let target = KeyTarget {
            quick,
            full,
            ..SD_KEY_TARGET
        };
        let mut window = vec![0u8; 128];
        window[32..48].copy_from_slice(&key);

        let mut hits = scan(&window, &[target]).unwrap();
        let hit = hits.pop().unwrap();
        assert_eq!(hit.value, key);
    }

    struct MapFs(HashMap<String, Vec<u8>>);

    impl FlashFs for MapFs {
        fn read_file(&mut self, path: &str) -> Result<Vec<u8>, IosError> {
            self.0.get(path).cloned().ok_or_else(|| code2err(-106))
        }

        fn file_exists(&mut self, path: &str) -> bool {
            self.0.contains_key(path)
        }
    }

    struct OneTitleStore(Vec<u8>);

    impl TitleStore for OneTitleStore {
        fn signed_metadata(&mut self, title_id: u64) -> Result<Vec<u8>, IosError> {
            if title_id == SYSTEM_MENU_TITLE {
                Ok(self.0.clone())
            } else {
                Err(code2err(-106))
            }
        }

        fn contents_count(&mut self, _title_id: u64) -> Result<u32, IosError> {
            Ok(1)
        }

        fn device_cert(&mut self) -> Result<Vec<u8>, IosError> {
            Err(code2err(-106))
        }
    }

    fn firmware_body_with_keys() -> Vec<u8> {
        let mut body = vec![0u8; 512];
        body[0x40..0x50].copy_from_slice(&SD_IV_VALUE);
        body[0x80..0x90].copy_from_slice(&MD5_BLANKER_VALUE);
        body
    }

    // Synthetic key values whose fingerprints are patched over the
    // production table inside the tests below.
    const SD_IV_VALUE: [u8; 16] = [0x21; 16];
    const MD5_BLANKER_VALUE: [u8; 16] = [0x84; 16];

    fn synthetic_firmware_targets() -> [KeyTarget; 2] {
        [
            target_for("SD IV", &SD_IV_VALUE),
            target_for("MD5 Blanker", &MD5_BLANKER_VALUE),
        ]
    }

    #[test]
    fn firmware_scan_over_plain_content() {
        let body = firmware_body_with_keys();
        let hits = scan(&body, &synthetic_firmware_targets()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].label, "SD IV");
        assert_eq!(hits[1].label, "MD5 Blanker");
    }

    #[test]
    fn firmware_scan_over_ancast_content() {
        let body = firmware_body_with_keys();
        let mut image = crate::ancast::build_image(&body);

        let range = crate::ancast::verify_and_decrypt(&mut image).unwrap();
        let hits = scan(&image[range], &synthetic_firmware_targets()).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn boot_content_prefers_loader_copy() {
        let tmd_blob = crate::tmd::build_tmd(1, &[(0x40, 0), (0x43, 1)]);
        let boot = crate::tmd::boot_content(&tmd_blob).unwrap();

        let original = tmd::content_path(SYSTEM_MENU_TITLE, 0x43);
        let copy = tmd::content_path(SYSTEM_MENU_TITLE, 0x43 | LOADER_CONTENT_BIT);

        let mut files = HashMap::new();
        files.insert(LOADER_MARKERS[0].to_string(), Vec::new());
        files.insert(original.clone(), vec![1u8; 32]);
        files.insert(copy, vec![2u8; 32]);

        let data = fetch_boot_content(&mut MapFs(files), &boot).unwrap();
        assert_eq!(data, vec![2u8; 32]);
    }

    #[test]
    fn unreadable_loader_copy_falls_back() {
        let tmd_blob = crate::tmd::build_tmd(0, &[(0x40, 0)]);
        let boot = crate::tmd::boot_content(&tmd_blob).unwrap();

        let original = tmd::content_path(SYSTEM_MENU_TITLE, 0x40);
        let mut files = HashMap::new();
        // Marker present, but the loader copy itself is missing.
        files.insert(LOADER_MARKERS[1].to_string(), Vec::new());
        files.insert(original, vec![7u8; 16]);

        let data = fetch_boot_content(&mut MapFs(files), &boot).unwrap();
        assert_eq!(data, vec![7u8; 16]);
    }

    #[test]
    fn missing_metadata_fails_the_task_only() {
        let mut store = OneTitleStore(Vec::new());
        let mut fs = MapFs(HashMap::new());

        // Metadata exists but is empty: the task errors out instead of
        // panicking, leaving the caller free to continue the session.
        assert!(recover_firmware_keys(&mut store, &mut fs, ExecMode::Primary).is_err());
    }
}
