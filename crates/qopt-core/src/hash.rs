//! Stable digests of plans and other serializable values.

use serde::Serialize;

use crate::error::Result;
use crate::plan::LogicalPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// blake3 over the canonical JSON encoding.
pub fn hash_serde<T: Serialize>(value: &T) -> Result<Hash256> {
    let bytes = serde_json::to_vec(value)?;
    Ok(Hash256(*blake3::hash(&bytes).as_bytes()))
}

/// Digest of a whole operator tree, ids and key info included.
pub fn plan_digest(plan: &LogicalPlan) -> Result<Hash256> {
    hash_serde(plan)
}
