//! Deterministic role assignment.

use serde::Serialize;

use crate::config::ExperimentConfig;

/// A participant's position in the experiment: which group they belong
/// to and which role they play inside it. Used directly as a map key.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleKey {
    pub group: String,
    pub role: String,
}

impl std::fmt::Display for RoleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group, self.role)
    }
}

/// Assigns roles in configuration order: the Nth participant to
/// connect receives the Nth slot of the flattened group/role capacity
/// list. No role choice, no randomness; the same arrival order always
/// produces the same assignments.
#[derive(Debug, Clone)]
pub struct RoleAssigner {
    slots: Vec<RoleKey>,
}

impl RoleAssigner {
    pub fn new(config: &ExperimentConfig) -> Self {
        let mut slots = Vec::with_capacity(config.total_participants());
        for group in &config.groups {
            for role in &group.roles {
                for _ in 0..role.count {
                    slots.push(RoleKey {
                        group: group.name.clone(),
                        role: role.name.clone(),
                    });
                }
            }
        }
        Self { slots }
    }

    /// Total number of participant slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Role for the next connecting participant given how many are
    /// already registered, or `None` once every slot is taken. The
    /// caller must refuse the connection in the `None` case.
    pub fn assign(&self, registered: usize) -> Option<RoleKey> {
        self.slots.get(registered).cloned()
    }
}
