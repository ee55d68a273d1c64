use std::fmt;

use sha3::{Digest, Keccak256};

/// Roles recognised by [`crate::Ledger::has_role`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The single administrator (owner) of the ledger.
    Admin,
    /// Identities allowed to mint.
    Minter,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Admin, Role::Minter];

    pub fn name(&self) -> &'static str {
        match self {
            Role::Admin => "DEFAULT_ADMIN_ROLE",
            Role::Minter => "MINTER_ROLE",
        }
    }

    /// 32-byte role identifier, matching access-control contracts: the admin
    /// role is all zeros, other roles are Keccak-256 of the role name.
    pub fn tag(&self) -> [u8; 32] {
        match self {
            Role::Admin => [0u8; 32],
            Role::Minter => Keccak256::digest(self.name().as_bytes()).into(),
        }
    }

    pub fn tag_hex(&self) -> String {
        format!("0x{}", hex::encode(self.tag()))
    }

    pub fn from_tag(tag: &[u8; 32]) -> Option<Role> {
        Self::ALL.into_iter().find(|role| &role.tag() == tag)
    }

    /// Accepts `minter`/`admin`, the role names, or a hex role tag.
    pub fn parse(input: &str) -> Option<Role> {
        let input = input.trim();
        match input.to_ascii_lowercase().as_str() {
            "minter" | "minter_role" => return Some(Role::Minter),
            "admin" | "owner" | "default_admin_role" => return Some(Role::Admin),
            _ => {}
        }
        let digits = input.strip_prefix("0x").unwrap_or(input);
        let bytes = hex::decode(digits).ok()?;
        let tag: [u8; 32] = bytes.as_slice().try_into().ok()?;
        Self::from_tag(&tag)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
