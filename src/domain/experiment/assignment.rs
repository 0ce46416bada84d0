//! Consistent hashing for experiment variant assignment
//!
//! The same user (and session) always lands in the same bucket, so repeated
//! requests keep seeing the same variant without any stored state.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::prompt::TemplateId;

/// Number of buckets; bucket values fall in 0..=100
pub const BUCKET_COUNT: u64 = 101;

/// One of the two arms of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Deterministic bucket (0-100) for a user and optional session
///
/// The key is `user_id`, or `user_id:session_id` when a session is given. It is
/// hashed with SHA-256 and the first 8 bytes, read big-endian, are reduced
/// modulo 101.
pub fn assignment_bucket(user_id: &str, session_id: Option<&str>) -> u8 {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());

    if let Some(session) = session_id {
        hasher.update(b":");
        hasher.update(session.as_bytes());
    }

    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);

    (u64::from_be_bytes(prefix) % BUCKET_COUNT) as u8
}

/// Variant for a bucket given the percentage of traffic routed to A
///
/// A split of 100 routes every bucket, including 100, to A.
pub fn variant_for_bucket(bucket: u8, traffic_split: u8) -> Variant {
    if traffic_split >= 100 || bucket < traffic_split {
        Variant::A
    } else {
        Variant::B
    }
}

/// Result of assigning a user to an experiment variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAssignment {
    variant: Variant,
    prompt_id: TemplateId,
    bucket: u8,
}

impl VariantAssignment {
    pub fn new(variant: Variant, prompt_id: TemplateId, bucket: u8) -> Self {
        Self {
            variant,
            prompt_id,
            bucket,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Template to render for this user
    pub fn prompt_id(&self) -> &TemplateId {
        &self.prompt_id
    }

    /// Raw bucket value, useful for diagnostics
    pub fn bucket(&self) -> u8 {
        self.bucket
    }
}
