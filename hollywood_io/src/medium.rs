// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-range access over block-oriented media.
//!
//! Each medium only knows how to move whole blocks. The two adapters below
//! map an arbitrary `(offset, length)` range onto block transfers with
//! partial-block handling at both ends. Every driver goes through this one
//! implementation; a single off-by-one here corrupts every key export.

/// Capability interface for a block-oriented storage medium.
pub trait BlockMedium {
    /// Fixed transfer unit, in bytes. Must be nonzero.
    fn block_size(&self) -> usize;

    /// Total medium size, in bytes. A multiple of the block size.
    fn total_size(&self) -> usize;

    /// Transfer one whole block into `out` (`out.len() == block_size()`).
    fn read_block(&mut self, index: usize, out: &mut [u8]);

    /// Program one whole block. Returns false on media that cannot write
    /// or when the program operation fails.
    fn write_block(&mut self, _index: usize, _data: &[u8]) -> bool {
        false
    }
}

struct Walk {
    start_block: usize,
    start_off: usize,
    end_block: usize,
    end_size: usize,
}

/// Maps a validated range onto inclusive block indices. `end_size` is the
/// number of bytes of the last block that belong to the range; when the
/// range ends exactly on a block boundary the previous block is the last
/// one and `end_size` equals the block size.
fn plan(offset: usize, len: usize, bs: usize) -> Walk {
    let start_block = offset / bs;
    let start_off = offset % bs;

    let mut end_block = (offset + len) / bs;
    let mut end_size = (offset + len) % bs;
    if end_size == 0 {
        end_block -= 1;
        end_size = bs;
    }

    Walk {
        start_block,
        start_off,
        end_block,
        end_size,
    }
}

fn range_ok(offset: usize, len: usize, total: usize) -> bool {
    len > 0 && offset < total && offset + len <= total
}

/// Per-block copy window within `block_size` for block `index` of a walk.
fn copy_window(w: &Walk, index: usize, bs: usize) -> (usize, usize) {
    if w.start_block == w.end_block {
        (w.start_off, w.end_size)
    } else if index == w.start_block {
        (w.start_off, bs)
    } else if index == w.end_block {
        (0, w.end_size)
    } else {
        (0, bs)
    }
}

/// Reads `dst.len()` bytes starting at `offset`. Returns the number of
/// bytes transferred: 0 without touching the hardware when the range is
/// empty or out of bounds, short only if the medium under-delivers.
pub fn read_range(medium: &mut dyn BlockMedium, offset: usize, dst: &mut [u8]) -> usize {
    let bs = medium.block_size();
    if !range_ok(offset, dst.len(), medium.total_size()) {
        return 0;
    }

    let w = plan(offset, dst.len(), bs);
    let mut block_buf = vec![0u8; bs];
    let mut cur = 0usize;

    for index in w.start_block..=w.end_block {
        if cur >= dst.len() {
            break;
        }

        medium.read_block(index, &mut block_buf);

        let (s, e) = copy_window(&w, index, bs);
        dst[cur..cur + (e - s)].copy_from_slice(&block_buf[s..e]);
        cur += e - s;
    }

    cur
}

/// Writes `src` starting at `offset`. Blocks only partially covered by the
/// range are read first and written back whole. Returns the number of
/// bytes transferred; a failed block program stops the walk and yields a
/// short count.
pub fn write_range(medium: &mut dyn BlockMedium, offset: usize, src: &[u8]) -> usize {
    let bs = medium.block_size();
    if !range_ok(offset, src.len(), medium.total_size()) {
        return 0;
    }

    let w = plan(offset, src.len(), bs);
    let mut block_buf = vec![0u8; bs];
    let mut cur = 0usize;

    for index in w.start_block..=w.end_block {
        if cur >= src.len() {
            break;
        }

        let (s, e) = copy_window(&w, index, bs);
        if s != 0 || e != bs {
            // Partial coverage: splice into the current contents.
            medium.read_block(index, &mut block_buf);
        }
        block_buf[s..e].copy_from_slice(&src[cur..cur + (e - s)]);

        if !medium.write_block(index, &block_buf) {
            break;
        }
        cur += e - s;
    }

    cur
}
