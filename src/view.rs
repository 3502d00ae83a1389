//! Role-specific projection of the synced chore list.

use crate::models::{Chore, Profile, Role};

/// The chores `profile` should see.
///
/// Parents see everything in the family. Children see the chores whose
/// `assigned_to` matches their display name, ignoring case and surrounding
/// whitespace. Two children with the same name see the same chores.
pub fn project(chores: &[Chore], profile: &Profile) -> Vec<Chore> {
    match profile.role {
        Role::Parent => chores.to_vec(),
        Role::Child => chores
            .iter()
            .filter(|chore| names_match(&chore.assigned_to, &profile.display_name))
            .cloned()
            .collect(),
    }
}

pub fn names_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Pending/completed counts for a projected list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChoreSummary {
    pub pending: usize,
    pub completed: usize,
}

impl ChoreSummary {
    pub fn of(chores: &[Chore]) -> Self {
        let completed = chores.iter().filter(|c| c.is_completed()).count();
        Self {
            pending: chores.len() - completed,
            completed,
        }
    }
}
