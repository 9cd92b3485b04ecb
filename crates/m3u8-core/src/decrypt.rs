//! Streaming AES-CBC decryption.
//!
//! Ciphertext is decrypted as it arrives. The decryptor keeps back the last
//! complete block (and any partial block) so PKCS#7 padding can be removed
//! once the input ends; everything before it is released immediately.

use aes::{Aes128, Aes192, Aes256};
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, InvalidLength, KeyIvInit, block_padding::Pkcs7};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::trace;

use crate::error::{CoreError, Result};
use crate::media::EncryptionMethod;
use crate::stream::ByteStream;

/// AES block size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

enum CbcCipher {
    Aes128(cbc::Decryptor<Aes128>),
    Aes192(cbc::Decryptor<Aes192>),
    Aes256(cbc::Decryptor<Aes256>),
}

impl CbcCipher {
    fn new(method: EncryptionMethod, key: &[u8], iv: &[u8]) -> Result<Self> {
        let invalid = |e: InvalidLength| CoreError::configuration(format!("invalid {method} key/IV: {e}"));
        Ok(match method {
            EncryptionMethod::Aes128 => {
                Self::Aes128(cbc::Decryptor::new_from_slices(key, iv).map_err(invalid)?)
            }
            EncryptionMethod::Aes192 => {
                Self::Aes192(cbc::Decryptor::new_from_slices(key, iv).map_err(invalid)?)
            }
            EncryptionMethod::Aes256 => {
                Self::Aes256(cbc::Decryptor::new_from_slices(key, iv).map_err(invalid)?)
            }
        })
    }

    /// Decrypt whole blocks in place, carrying the CBC chain forward.
    fn decrypt_blocks(&mut self, data: &mut [u8]) {
        for chunk in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(chunk);
            match self {
                Self::Aes128(d) => d.decrypt_block_mut(block),
                Self::Aes192(d) => d.decrypt_block_mut(block),
                Self::Aes256(d) => d.decrypt_block_mut(block),
            }
        }
    }

    /// Decrypt the final block and strip its PKCS#7 padding.
    fn decrypt_last(self, data: &mut [u8]) -> Result<usize> {
        let unpadded = match self {
            Self::Aes128(d) => d.decrypt_padded_mut::<Pkcs7>(data).map(<[u8]>::len),
            Self::Aes192(d) => d.decrypt_padded_mut::<Pkcs7>(data).map(<[u8]>::len),
            Self::Aes256(d) => d.decrypt_padded_mut::<Pkcs7>(data).map(<[u8]>::len),
        };
        unpadded.map_err(|e| CoreError::decode(format!("invalid PKCS#7 padding: {e}")))
    }
}

/// Incremental CBC decryptor for one segment.
pub struct SegmentDecryptor {
    cipher: Option<CbcCipher>,
    pending: BytesMut,
}

impl SegmentDecryptor {
    pub fn new(method: EncryptionMethod, key: &[u8], iv: &[u8]) -> Result<Self> {
        Ok(Self {
            cipher: Some(CbcCipher::new(method, key, iv)?),
            pending: BytesMut::new(),
        })
    }

    /// Feed ciphertext; returns the plaintext that can be released so far.
    pub fn update(&mut self, chunk: &[u8]) -> Result<Bytes> {
        let cipher = self
            .cipher
            .as_mut()
            .ok_or_else(|| CoreError::decode("decryptor already finished"))?;

        self.pending.extend_from_slice(chunk);
        let total = self.pending.len();
        if total == 0 {
            return Ok(Bytes::new());
        }

        // Everything except the trailing block, which may carry padding.
        let ready = ((total - 1) / AES_BLOCK_SIZE) * AES_BLOCK_SIZE;
        let mut out = self.pending.split_to(ready);
        cipher.decrypt_blocks(&mut out);
        trace!(input = chunk.len(), released = ready, held = self.pending.len(), "cbc update");
        Ok(out.freeze())
    }

    /// Signal end of input; returns the final unpadded plaintext.
    pub fn finish(&mut self) -> Result<Bytes> {
        let cipher = self
            .cipher
            .take()
            .ok_or_else(|| CoreError::decode("decryptor already finished"))?;

        if self.pending.is_empty() {
            return Ok(Bytes::new());
        }
        if self.pending.len() != AES_BLOCK_SIZE {
            return Err(CoreError::decode(format!(
                "ciphertext is not aligned to the {AES_BLOCK_SIZE}-byte AES block size ({} trailing bytes)",
                self.pending.len() % AES_BLOCK_SIZE
            )));
        }

        let mut last = self.pending.split();
        let len = cipher.decrypt_last(&mut last)?;
        last.truncate(len);
        Ok(last.freeze())
    }
}

/// Wrap `input` so its bytes are decrypted lazily as the result is polled.
pub fn decrypt_stream(input: ByteStream, decryptor: SegmentDecryptor) -> ByteStream {
    futures::stream::unfold(Some((input, decryptor)), |state| async move {
        let Some((mut input, mut decryptor)) = state else {
            return None;
        };
        loop {
            match input.next().await {
                Some(Ok(chunk)) => match decryptor.update(&chunk) {
                    Ok(plain) if plain.is_empty() => continue,
                    Ok(plain) => return Some((Ok(plain), Some((input, decryptor)))),
                    Err(e) => return Some((Err(e), None)),
                },
                Some(Err(e)) => return Some((Err(e), None)),
                None => {
                    return match decryptor.finish() {
                        Ok(plain) if plain.is_empty() => None,
                        Ok(plain) => Some((Ok(plain), None)),
                        Err(e) => Some((Err(e), None)),
                    };
                }
            }
        }
    })
    .boxed()
}
