// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Key recovery and export for the console's secure storage.
//!
//! The drivers in `hollywood_io` hand over raw region images; this crate
//! turns them into labeled key records, recovers the undocumented keys that
//! only exist inside firmware binaries, and serializes everything to the
//! formats the community tooling expects.

pub mod ancast;
pub mod collab;
pub mod export;
pub mod recover;
pub mod session;
pub mod tmd;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("title metadata too short ({0} bytes)")]
    TruncatedMetadata(usize),

    #[error("title metadata has signature type {0:#010x}, expected RSA-2048")]
    BadSignatureType(u32),

    #[error("title metadata names boot index {0} but carries no such content")]
    MissingBootContent(u16),

    #[error("firmware image too short ({0} bytes)")]
    TruncatedImage(usize),

    #[error("bad firmware container magic: expected {expected:#010x}, got {got:#010x}")]
    BadMagic { expected: u32, got: u32 },

    #[error("firmware body hash does not match the header")]
    BodyHashMismatch,

    #[error("firmware header claims a {0:#x}-byte body that exceeds the image")]
    BodyOverrun(u32),

    #[error("firmware body is not a whole number of cipher blocks")]
    RaggedBody,

    #[error("key target table is empty or carries a non-16-byte entry")]
    BadTargetTable,

    #[error("{0} read failed or returned unprogrammed data")]
    RegionUnavailable(&'static str),

    #[error("service call failed: {0}")]
    Service(#[from] collab::IosError),

    #[error("struct packing error: {0}")]
    Packing(#[from] packed_struct::PackingError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
