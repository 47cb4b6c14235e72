// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ancast firmware containers.
//!
//! In the alternate execution mode, system firmware ships wrapped in a
//! signed container: a 256-byte header carrying a magic value, the body
//! length and a body digest, followed by an AES-128-CBC encrypted body.
//! The body digest is computed over the ciphertext, so integrity is checked
//! before any decryption happens.

use crate::Error;
use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use byteorder::{BigEndian, ByteOrder};
use sha1::{Digest, Sha1};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const ANCAST_MAGIC: u32 = 0xefa2_82d9;
pub const ANCAST_HEADER_SIZE: usize = 0x100;

const HASH_TYPE_OFF: usize = 0xa4;
const BODY_SIZE_OFF: usize = 0xa8;
const BODY_HASH_OFF: usize = 0xac;

/// Fixed body cipher key and IV for the alternate-mode boot containers.
pub const ANCAST_KEY: [u8; 16] = [
    0x2e, 0xfe, 0x8a, 0xbc, 0xed, 0xbb, 0x7b, 0xaa, 0xe3, 0xc0, 0xed, 0x92, 0xfa, 0x29, 0xf8, 0x66,
];
pub const ANCAST_IV: [u8; 16] = [
    0x91, 0xc9, 0xd0, 0x08, 0x31, 0x28, 0x51, 0xef, 0x6b, 0x22, 0x8b, 0xf1, 0x4b, 0xad, 0x43, 0x22,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AncastHeader {
    pub hash_type: u32,
    pub body_size: u32,
    pub body_hash: [u8; 20],
}

pub fn parse_header(image: &[u8]) -> Result<AncastHeader, Error> {
    if image.len() < ANCAST_HEADER_SIZE {
        return Err(Error::TruncatedImage(image.len()));
    }

    let magic = BigEndian::read_u32(&image[0..4]);
    if magic != ANCAST_MAGIC {
        return Err(Error::BadMagic {
            expected: ANCAST_MAGIC,
            got: magic,
        });
    }

    let mut body_hash = [0u8; 20];
    body_hash.copy_from_slice(&image[BODY_HASH_OFF..BODY_HASH_OFF + 20]);

    Ok(AncastHeader {
        hash_type: BigEndian::read_u32(&image[HASH_TYPE_OFF..HASH_TYPE_OFF + 4]),
        body_size: BigEndian::read_u32(&image[BODY_SIZE_OFF..BODY_SIZE_OFF + 4]),
        body_hash,
    })
}

/// Verifies the container and decrypts its body in place.
///
/// Returns the plaintext body range on success. The image is untouched on
/// any failure: bad magic, a body that overruns the image, or a digest
/// mismatch all abort before the cipher runs.
pub fn verify_and_decrypt(image: &mut [u8]) -> Result<std::ops::Range<usize>, Error> {
    let header = parse_header(image)?;

    let body_len = header.body_size as usize;
    let body_end = ANCAST_HEADER_SIZE
        .checked_add(body_len)
        .filter(|&end| end <= image.len())
        .ok_or(Error::BodyOverrun(header.body_size))?;
    if body_len == 0 || body_len % 16 != 0 {
        return Err(Error::RaggedBody);
    }

    let digest = Sha1::digest(&image[ANCAST_HEADER_SIZE..body_end]);
    if digest.as_slice() != header.body_hash {
        log::error!(
            "body digest {} does not match header digest {}",
            hex::encode(digest),
            hex::encode(header.body_hash)
        );
        return Err(Error::BodyHashMismatch);
    }

    let body = &mut image[ANCAST_HEADER_SIZE..body_end];
    Aes128CbcDec::new(&ANCAST_KEY.into(), &ANCAST_IV.into())
        .decrypt_padded_mut::<NoPadding>(body)
        .map_err(|_| Error::RaggedBody)?;

    Ok(ANCAST_HEADER_SIZE..body_end)
}

#[cfg(test)]
pub(crate) fn build_image(plain_body: &[u8]) -> Vec<u8> {
    use aes::cipher::BlockEncryptMut;
    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    assert_eq!(plain_body.len() % 16, 0);
    let mut body = plain_body.to_vec();
    Aes128CbcEnc::new(&ANCAST_KEY.into(), &ANCAST_IV.into())
        .encrypt_padded_mut::<NoPadding>(&mut body, plain_body.len())
        .unwrap();

    let mut image = vec![0u8; ANCAST_HEADER_SIZE];
    BigEndian::write_u32(&mut image[0..4], ANCAST_MAGIC);
    BigEndian::write_u32(&mut image[HASH_TYPE_OFF..HASH_TYPE_OFF + 4], 2);
    BigEndian::write_u32(&mut image[BODY_SIZE_OFF..BODY_SIZE_OFF + 4], body.len() as u32);
    let digest = Sha1::digest(&body);
    image[BODY_HASH_OFF..BODY_HASH_OFF + 20].copy_from_slice(&digest);
    image.extend_from_slice(&body);
    image
}
