//! Cryptographic operations for the SCP01 and SCP02 secure channel protocols
//!
//! This module provides the DES-based primitives the protocols are built on:
//! single and triple DES in ECB and CBC mode, ISO/IEC 9797-1 method 2
//! padding, the retail MAC and the full 3DES CBC-MAC, and the two ICV
//! encryption schemes. All functions are pure and operate on byte slices.
//!
//! MAC inputs must already be padded to a whole number of blocks; callers
//! apply [`pad80`] first, exactly as the wire formats require.

use cbc_mac::{CbcMac, Mac};
use cipher::{
    BlockDecryptMut, BlockEncrypt, BlockEncryptMut, Key, KeyInit, KeyIvInit,
    consts::U8,
    generic_array::GenericArray,
};
use des::{Des, TdesEde3};
use subtle::ConstantTimeEq;

use crate::{Error, Result};

/// An 8-byte block of zeroes, the initial chaining vector of a fresh session
pub const NULL_BYTES_8: [u8; 8] = [0u8; 8];

/// Size of a DES block, a MAC, and a challenge
pub const BLOCK_SIZE: usize = 8;

/// Host challenge sent with INITIALIZE UPDATE
pub type HostChallenge = [u8; 8];
/// Card or host cryptogram
pub type Cryptogram = [u8; 8];
/// An 8-byte command or response MAC
pub type Mac8 = [u8; 8];
/// SCP02 sequence counter
pub type SequenceCounter = [u8; 2];

type Block = GenericArray<u8, U8>;

/// Expand a 16-byte double-length DES key to 24 bytes for 3DES
///
/// This copies the first 8 bytes to the end of the key (K1 ‖ K2 ‖ K1).
pub fn resize_key(key: &[u8; 16]) -> Key<TdesEde3> {
    let mut result = Key::<TdesEde3>::default();
    result[..16].copy_from_slice(key);
    result[16..24].copy_from_slice(&key[..8]);
    result
}

fn check_block_aligned(data: &[u8]) -> Result<()> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Crypto(
            "input length must be a positive multiple of 8",
        ));
    }
    Ok(())
}

/// Encrypt a single 8-byte block with single DES in ECB mode
pub fn des_ecb_encrypt(key: &[u8; 8], block: &[u8; 8]) -> [u8; 8] {
    let cipher = Des::new(GenericArray::from_slice(key));
    let mut out = Block::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    out.into()
}

/// Encrypt a whole number of blocks with 3DES in ECB mode
pub fn tdes_ecb_encrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    check_block_aligned(data)?;
    let cipher = TdesEde3::new(&resize_key(key));

    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks(BLOCK_SIZE) {
        let mut block = Block::clone_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        out.extend_from_slice(&block);
    }
    Ok(out)
}

/// Encrypt a whole number of blocks with 3DES in CBC mode
pub fn tdes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 8], data: &[u8]) -> Result<Vec<u8>> {
    check_block_aligned(data)?;

    let mut blocks: Vec<Block> = data.chunks(BLOCK_SIZE).map(Block::clone_from_slice).collect();
    let mut encryptor =
        cbc::Encryptor::<TdesEde3>::new(&resize_key(key), GenericArray::from_slice(iv));
    encryptor.encrypt_blocks_mut(&mut blocks);

    Ok(blocks.iter().flat_map(|b| b.iter().copied()).collect())
}

/// Decrypt a whole number of blocks with 3DES in CBC mode
pub fn tdes_cbc_decrypt(key: &[u8; 16], iv: &[u8; 8], data: &[u8]) -> Result<Vec<u8>> {
    check_block_aligned(data)?;

    let mut blocks: Vec<Block> = data.chunks(BLOCK_SIZE).map(Block::clone_from_slice).collect();
    let mut decryptor =
        cbc::Decryptor::<TdesEde3>::new(&resize_key(key), GenericArray::from_slice(iv));
    decryptor.decrypt_blocks_mut(&mut blocks);

    Ok(blocks.iter().flat_map(|b| b.iter().copied()).collect())
}

/// Apply ISO/IEC 9797-1 padding method 2
///
/// Appends 0x80, then zero bytes up to the next 8-byte boundary. Input that
/// is already block-aligned grows by a full padding block, so the result is
/// always strictly longer than the input.
pub fn pad80(data: &[u8]) -> Vec<u8> {
    let padded_len = (data.len() / BLOCK_SIZE + 1) * BLOCK_SIZE;
    let mut out = Vec::with_capacity(padded_len);
    out.extend_from_slice(data);
    out.push(0x80);
    out.resize(padded_len, 0x00);
    out
}

/// Calculate a retail MAC (ISO/IEC 9797-1 algorithm 3)
///
/// All blocks but the last are chained with single DES under the first half
/// of the key; the final block is encrypted with 3DES under the full key.
/// `data` must already be padded.
pub fn retail_mac(key: &[u8; 16], data: &[u8], iv: &[u8; 8]) -> Result<Mac8> {
    check_block_aligned(data)?;

    let des = Des::new(GenericArray::from_slice(&key[..8]));
    let tdes = TdesEde3::new(&resize_key(key));

    let mut chain = Block::clone_from_slice(iv);
    let last = data.len() - BLOCK_SIZE;
    for chunk in data[..last].chunks(BLOCK_SIZE) {
        for (a, b) in chain.iter_mut().zip(chunk) {
            *a ^= *b;
        }
        des.encrypt_block(&mut chain);
    }

    for (a, b) in chain.iter_mut().zip(&data[last..]) {
        *a ^= *b;
    }
    tdes.encrypt_block(&mut chain);

    Ok(chain.into())
}

/// Calculate a full 3DES CBC-MAC
///
/// The data is encrypted with 3DES in CBC mode and the last ciphertext block
/// is the MAC. `data` must already be padded.
pub fn full_3des_mac(key: &[u8; 16], data: &[u8], iv: &[u8; 8]) -> Result<Mac8> {
    check_block_aligned(data)?;

    let tdes = TdesEde3::new(&resize_key(key));

    let mut chain = Block::clone_from_slice(iv);
    for chunk in data.chunks(BLOCK_SIZE) {
        for (a, b) in chain.iter_mut().zip(chunk) {
            *a ^= *b;
        }
        tdes.encrypt_block(&mut chain);
    }

    Ok(chain.into())
}

/// Encrypt an ICV for SCP02 chaining
///
/// SCP02 encrypts the previous command MAC with single DES under the first
/// half of the session MAC key before using it as the next ICV.
pub fn encrypt_icv_des(mac_key: &[u8; 16], icv: &[u8; 8]) -> [u8; 8] {
    let mut mac = <CbcMac<Des> as Mac>::new(GenericArray::from_slice(&mac_key[..8]));
    mac.update(icv);
    mac.finalize().into_bytes().into()
}

/// Encrypt an ICV for SCP01 chaining
///
/// SCP01 encrypts the previous command MAC with 3DES in ECB mode under the
/// full session MAC key.
pub fn encrypt_icv_tdes(mac_key: &[u8; 16], icv: &[u8; 8]) -> [u8; 8] {
    let cipher = TdesEde3::new(&resize_key(mac_key));
    let mut block = Block::clone_from_slice(icv);
    cipher.encrypt_block(&mut block);
    block.into()
}

/// 3-byte key check value: 3DES of eight zero bytes under the key
pub fn key_check_value(key: &[u8; 16]) -> [u8; 3] {
    let cipher = TdesEde3::new(&resize_key(key));
    let mut block = Block::default();
    cipher.encrypt_block(&mut block);
    [block[0], block[1], block[2]]
}

/// Timing-independent equality of two byte strings
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
