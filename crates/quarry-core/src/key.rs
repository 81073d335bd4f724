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

//! Request fingerprints and the disk-cache keys derived from them.
//!
//! A [`Fingerprint`] identifies one unit of cacheable work. Two loads with equal
//! fingerprints are always served by the same decoded result, so every field that
//! can change the produced bytes must be part of it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Target dimensions requested for a decoded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Target width in pixels (or any unit the decoder understands).
    pub width: u32,
    /// Target height.
    pub height: u32,
}

impl Dimensions {
    /// Sentinel asking decoders to keep the source's own size.
    pub const ORIGINAL: Dimensions = Dimensions {
        width: u32::MAX,
        height: u32::MAX,
    };

    /// Creates a new pair of dimensions.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` for [`Dimensions::ORIGINAL`].
    pub fn is_original(&self) -> bool {
        *self == Self::ORIGINAL
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_original() {
            write!(f, "original")
        } else {
            write!(f, "{}x{}", self.width, self.height)
        }
    }
}

#[derive(PartialEq, Eq, Hash)]
struct FingerprintData {
    model: String,
    dimensions: Dimensions,
    pipeline: Vec<String>,
    signature: Option<String>,
}

/// The immutable identity of a load.
///
/// Cloning is cheap: the fields are shared behind an `Arc`. Equality and hashing
/// cover every field, so they are always consistent with each other.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Arc<FingerprintData>);

impl Fingerprint {
    /// Starts building a fingerprint for `model` at the given size.
    pub fn builder(model: impl Into<String>, dimensions: Dimensions) -> FingerprintBuilder {
        FingerprintBuilder {
            model: model.into(),
            dimensions,
            pipeline: Vec::new(),
            signature: None,
        }
    }

    /// The caller-supplied model identity (a path, URL, asset id...).
    pub fn model(&self) -> &str {
        &self.0.model
    }

    /// The requested target size.
    pub fn dimensions(&self) -> Dimensions {
        self.0.dimensions
    }

    /// Identities of every strategy in the pipeline, in application order.
    pub fn pipeline(&self) -> &[String] {
        &self.0.pipeline
    }

    /// The optional application signature (a version stamp, an mtime...).
    pub fn signature(&self) -> Option<&str> {
        self.0.signature.as_deref()
    }

    /// Key under which the untransformed source bytes are cached on disk.
    ///
    /// Only the model and signature participate: every size and pipeline of the
    /// same source shares the same raw data.
    pub fn data_cache_key(&self) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(b"data");
        update_field(&mut hasher, self.0.model.as_bytes());
        update_optional(&mut hasher, self.signature());
        CacheKey::from_digest(hasher)
    }

    /// Key under which the fully transformed, encoded result is cached on disk.
    pub fn resource_cache_key(&self) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(b"resource");
        update_field(&mut hasher, self.0.model.as_bytes());
        hasher.update(self.0.dimensions.width.to_le_bytes());
        hasher.update(self.0.dimensions.height.to_le_bytes());
        hasher.update((self.0.pipeline.len() as u64).to_le_bytes());
        for id in &self.0.pipeline {
            update_field(&mut hasher, id.as_bytes());
        }
        update_optional(&mut hasher, self.signature());
        CacheKey::from_digest(hasher)
    }
}

// Length-prefixing keeps ("ab", "c") and ("a", "bc") from colliding.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn update_optional(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update([1u8]);
            update_field(hasher, value.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("model", &self.0.model)
            .field("dimensions", &self.0.dimensions)
            .field("pipeline", &self.0.pipeline)
            .field("signature", &self.0.signature)
            .finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.0.model, self.0.dimensions)?;
        if !self.0.pipeline.is_empty() {
            write!(f, "[{}]", self.0.pipeline.join(","))?;
        }
        if let Some(signature) = &self.0.signature {
            write!(f, "#{signature}")?;
        }
        Ok(())
    }
}

/// Builder for [`Fingerprint`].
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    model: String,
    dimensions: Dimensions,
    pipeline: Vec<String>,
    signature: Option<String>,
}

impl FingerprintBuilder {
    /// Appends the identity of one pipeline strategy.
    pub fn strategy(mut self, id: impl Into<String>) -> Self {
        self.pipeline.push(id.into());
        self
    }

    /// Appends several strategy identities.
    pub fn strategies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Sets the application signature.
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Freezes the fingerprint.
    pub fn build(self) -> Fingerprint {
        Fingerprint(Arc::new(FingerprintData {
            model: self.model,
            dimensions: self.dimensions,
            pipeline: self.pipeline,
            signature: self.signature,
        }))
    }
}

/// A filesystem-safe disk-cache key: the lowercase hex SHA-256 of the logical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hashes an arbitrary logical key.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self::from_digest(hasher)
    }

    fn from_digest(hasher: Sha256) -> Self {
        Self(hex::encode(hasher.finalize()))
    }

    /// The 64-character hex name used by the store.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn thumb(model: &str) -> Fingerprint {
        Fingerprint::builder(model, Dimensions::new(100, 80))
            .strategy("decode:raw")
            .strategy("fit-center")
            .build()
    }

    #[test]
    fn test_equal_fingerprints_hash_equal() {
        let mut set = HashSet::new();
        set.insert(thumb("a.png"));
        assert!(set.contains(&thumb("a.png")));
        assert!(!set.contains(&thumb("b.png")));
    }

    #[test]
    fn test_every_field_participates_in_equality() {
        let base = thumb("a.png");
        let resized = Fingerprint::builder("a.png", Dimensions::new(100, 81))
            .strategies(["decode:raw", "fit-center"])
            .build();
        let reordered = Fingerprint::builder("a.png", Dimensions::new(100, 80))
            .strategies(["fit-center", "decode:raw"])
            .build();
        let signed = Fingerprint::builder("a.png", Dimensions::new(100, 80))
            .strategies(["decode:raw", "fit-center"])
            .signature("v2")
            .build();

        assert_ne!(base, resized);
        assert_ne!(base, reordered);
        assert_ne!(base, signed);
    }

    #[test]
    fn test_data_key_ignores_size_and_pipeline() {
        let small = Fingerprint::builder("a.png", Dimensions::new(10, 10)).build();
        let large = Fingerprint::builder("a.png", Dimensions::ORIGINAL)
            .strategy("blur")
            .build();
        assert_eq!(small.data_cache_key(), large.data_cache_key());
        assert_ne!(small.resource_cache_key(), large.resource_cache_key());
    }

    #[test]
    fn test_signature_changes_both_disk_keys() {
        let plain = thumb("a.png");
        let signed = Fingerprint::builder("a.png", Dimensions::new(100, 80))
            .strategies(["decode:raw", "fit-center"])
            .signature("mtime=42")
            .build();
        assert_ne!(plain.data_cache_key(), signed.data_cache_key());
        assert_ne!(plain.resource_cache_key(), signed.resource_cache_key());
    }

    #[test]
    fn test_cache_key_is_filesystem_safe() {
        let key = Fingerprint::builder("https://host/a b?c=d", Dimensions::ORIGINAL)
            .build()
            .resource_cache_key();
        assert_eq!(key.as_str().len(), 64);
        assert!(key
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_length_prefix_prevents_field_collisions() {
        let a = Fingerprint::builder("ab", Dimensions::ORIGINAL)
            .signature("c")
            .build();
        let b = Fingerprint::builder("a", Dimensions::ORIGINAL)
            .signature("bc")
            .build();
        assert_ne!(a.data_cache_key(), b.data_cache_key());
    }

    #[test]
    fn test_display_is_readable() {
        let fp = Fingerprint::builder("cat.jpg", Dimensions::new(64, 64))
            .strategy("round")
            .signature("v1")
            .build();
        assert_eq!(fp.to_string(), "cat.jpg@64x64[round]#v1");
    }
}
