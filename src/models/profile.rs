use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The local member's identity.
///
/// A profile is immutable once saved; changing any field means replacing the
/// whole profile through the identity store. The family code is stored
/// lower-cased so that "ABC12" and "abc12" address the same chore list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    pub family_code: String,
    pub role: Role,
}

/// What a member may do with the family's chores.
///
/// - `Parent`: sees every chore and creates new ones
/// - `Child`: sees chores assigned to them and completes them with a photo
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Parent,
    Child,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Child => "child",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parent" => Some(Self::Parent),
            "child" => Some(Self::Child),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("display name cannot be empty")]
    EmptyName,

    #[error("family code cannot be empty")]
    EmptyFamilyCode,
}

impl Profile {
    /// Build a profile from user input, trimming both fields and lower-casing
    /// the family code.
    pub fn new(
        display_name: impl AsRef<str>,
        family_code: impl AsRef<str>,
        role: Role,
    ) -> Result<Self, ProfileError> {
        let display_name = display_name.as_ref().trim();
        if display_name.is_empty() {
            return Err(ProfileError::EmptyName);
        }

        let family_code = normalize_family_code(family_code.as_ref());
        if family_code.is_empty() {
            return Err(ProfileError::EmptyFamilyCode);
        }

        Ok(Self {
            display_name: display_name.to_string(),
            family_code,
            role,
        })
    }

    pub fn is_parent(&self) -> bool {
        self.role == Role::Parent
    }

    pub fn is_child(&self) -> bool {
        self.role == Role::Child
    }

    /// Re-check the invariants of a profile that came from storage.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.display_name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if self.family_code.trim().is_empty() {
            return Err(ProfileError::EmptyFamilyCode);
        }
        Ok(())
    }
}

pub fn normalize_family_code(code: &str) -> String {
    code.trim().to_lowercase()
}
