//! Member identities and capability masks.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::hex;
use crate::keys::PublicKey;

/// Stable member identifier: the member device's Ed25519 public key bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId([u8; 32]);

impl MemberId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_public_key(key: &PublicKey) -> Self {
        Self(key.0)
    }

    /// The public key this identity verifies signatures with.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({}\u{2026})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// 32-bit capability mask carried by every member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions(pub u32);

impl Permissions {
    pub const NONE: Self = Self(0);
    /// Required to add, remove, or destroy.
    pub const MANAGE_MEMBERS: Self = Self(0x0000_0001);
    pub const ALL: Self = Self(0xffff_ffff);

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `required` is set.
    pub fn contains(&self, required: Permissions) -> bool {
        self.0 & required.0 == required.0
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Permissions({:#010x})", self.0)
    }
}

/// A member device of a trustchain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    pub permissions: Permissions,
}

impl Member {
    pub fn new(id: MemberId, name: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            id,
            name: name.into(),
            permissions,
        }
    }

    pub fn can_manage_members(&self) -> bool {
        self.permissions.contains(Permissions::MANAGE_MEMBERS)
    }
}
