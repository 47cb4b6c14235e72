// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal walk over signed title metadata.
//!
//! Just enough parsing to locate the boot content: the signature block is
//! already validated by the service that hands the blob over, so this
//! module only checks the shape it relies on.

use crate::Error;
use byteorder::{BigEndian, ByteOrder};

/// RSA-2048 signature container; the only type system titles use.
const SIG_TYPE_RSA2048: u32 = 0x0001_0001;

/// Offsets within the signed blob (signature block included).
const NUM_CONTENTS_OFF: usize = 0x1de;
const BOOT_INDEX_OFF: usize = 0x1e0;
const CONTENTS_OFF: usize = 0x1e4;
const CONTENT_RECORD_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRecord {
    pub id: u32,
    pub index: u16,
    pub kind: u16,
    pub size: u64,
    pub hash: [u8; 20],
}

fn content_record(raw: &[u8]) -> ContentRecord {
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&raw[0x10..0x24]);
    ContentRecord {
        id: BigEndian::read_u32(&raw[0x00..0x04]),
        index: BigEndian::read_u16(&raw[0x04..0x06]),
        kind: BigEndian::read_u16(&raw[0x06..0x08]),
        size: BigEndian::read_u64(&raw[0x08..0x10]),
        hash,
    }
}

/// Finds the content record the title boots from.
pub fn boot_content(tmd: &[u8]) -> Result<ContentRecord, Error> {
    if tmd.len() < CONTENTS_OFF {
        return Err(Error::TruncatedMetadata(tmd.len()));
    }

    let sig_type = BigEndian::read_u32(&tmd[0..4]);
    if sig_type != SIG_TYPE_RSA2048 {
        return Err(Error::BadSignatureType(sig_type));
    }

    let num_contents = BigEndian::read_u16(&tmd[NUM_CONTENTS_OFF..NUM_CONTENTS_OFF + 2]);
    let boot_index = BigEndian::read_u16(&tmd[BOOT_INDEX_OFF..BOOT_INDEX_OFF + 2]);

    let table_end = CONTENTS_OFF + usize::from(num_contents) * CONTENT_RECORD_LEN;
    if tmd.len() < table_end {
        return Err(Error::TruncatedMetadata(tmd.len()));
    }

    tmd[CONTENTS_OFF..table_end]
        .chunks_exact(CONTENT_RECORD_LEN)
        .map(content_record)
        .find(|c| c.index == boot_index)
        .ok_or(Error::MissingBootContent(boot_index))
}

/// Flash path of an installed content.
pub fn content_path(title_id: u64, content_id: u32) -> String {
    format!(
        "/title/{:08x}/{:08x}/content/{:08x}.app",
        (title_id >> 32) as u32,
        title_id as u32,
        content_id
    )
}

#[cfg(test)]
pub(crate) fn build_tmd(boot_index: u16, contents: &[(u32, u16)]) -> Vec<u8> {
    let mut tmd = vec![0u8; CONTENTS_OFF + contents.len() * CONTENT_RECORD_LEN];
    BigEndian::write_u32(&mut tmd[0..4], SIG_TYPE_RSA2048);
    BigEndian::write_u16(
        &mut tmd[NUM_CONTENTS_OFF..NUM_CONTENTS_OFF + 2],
        contents.len() as u16,
    );
    BigEndian::write_u16(&mut tmd[BOOT_INDEX_OFF..BOOT_INDEX_OFF + 2], boot_index);
    for (i, (id, index)) in contents.iter().enumerate() {
        let off = CONTENTS_OFF + i * CONTENT_RECORD_LEN;
        BigEndian::write_u32(&mut tmd[off..off + 4], *id);
        BigEndian::write_u16(&mut tmd[off + 4..off + 6], *index);
    }
    tmd
}
