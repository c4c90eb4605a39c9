// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Archive decryption lanes.
//!
//! Fetched bytes pass through a cipher lane before assembly. The engine
//! treats the lane's output opaquely; whether a package is encrypted at all
//! is decided by the secret key its registry entry carries.

use thiserror::Error;

/// An error produced while decrypting archive bytes.
#[derive(Debug, Error)]
pub enum CipherError {
    /// A key was supplied but is unusable.
    #[error("decryption key is empty")]
    EmptyKey,
}

/// Transforms fetched archive bytes into assembly-ready bytes.
pub trait CipherLane: Send + Sync {
    /// Decrypts `bytes` with the package's secret key.
    ///
    /// A `None` key means the package is not encrypted; lanes pass the bytes
    /// through untouched in that case.
    fn decrypt(&self, bytes: Vec<u8>, key: Option<&str>) -> Result<Vec<u8>, CipherError>;
}

/// The identity lane for unencrypted deployments.
#[derive(Debug, Default)]
pub struct PlainCipherLane;

impl CipherLane for PlainCipherLane {
    fn decrypt(&self, bytes: Vec<u8>, _key: Option<&str>) -> Result<Vec<u8>, CipherError> {
        Ok(bytes)
    }
}

/// A repeating-key XOR keystream lane.
///
/// XOR is an involution, so the same lane both encrypts and decrypts; tests
/// and the packing side use it symmetrically.
#[derive(Debug, Default)]
pub struct XorCipherLane;

impl CipherLane for XorCipherLane {
    fn decrypt(&self, mut bytes: Vec<u8>, key: Option<&str>) -> Result<Vec<u8>, CipherError> {
        let Some(key) = key else {
            return Ok(bytes);
        };
        if key.is_empty() {
            return Err(CipherError::EmptyKey);
        }

        for (byte, key_byte) in bytes.iter_mut().zip(key.as_bytes().iter().cycle()) {
            *byte ^= key_byte;
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lane_passes_bytes_through() {
        let lane = PlainCipherLane;
        let bytes = lane.decrypt(vec![1, 2, 3], Some("ignored")).expect("decrypt");
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn xor_lane_round_trips() {
        let lane = XorCipherLane;
        let plain = b"archive payload".to_vec();

        let encrypted = lane.decrypt(plain.clone(), Some("k3y")).expect("encrypt");
        assert_ne!(encrypted, plain);

        let decrypted = lane.decrypt(encrypted, Some("k3y")).expect("decrypt");
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn xor_lane_without_key_is_identity() {
        let lane = XorCipherLane;
        let bytes = lane.decrypt(vec![4, 5, 6], None).expect("decrypt");
        assert_eq!(bytes, vec![4, 5, 6]);
    }

    #[test]
    fn xor_lane_rejects_an_empty_key() {
        let lane = XorCipherLane;
        assert!(matches!(
            lane.decrypt(vec![1], Some("")),
            Err(CipherError::EmptyKey)
        ));
    }
}
