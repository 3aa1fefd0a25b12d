use crate::QueueError;
use crate::query::QueueFamilyRecord;
use ash::vk;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// A capability a queue family must provide for the application to submit work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueueRole {
    Graphics,
    Present,
    Compute,
    Transfer,
}

impl QueueRole {
    /// Present is judged against the surface the record was queried for; every
    /// other role is a queue flag.
    pub fn is_satisfied_by(self, family: &QueueFamilyRecord) -> bool {
        match self {
            QueueRole::Graphics => family.flags.contains(vk::QueueFlags::GRAPHICS),
            QueueRole::Present => family.present_support,
            QueueRole::Compute => family.flags.contains(vk::QueueFlags::COMPUTE),
            QueueRole::Transfer => family.flags.contains(vk::QueueFlags::TRANSFER),
        }
    }
}

impl Display for QueueRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueRole::Graphics => f.write_str("graphics"),
            QueueRole::Present => f.write_str("present"),
            QueueRole::Compute => f.write_str("compute"),
            QueueRole::Transfer => f.write_str("transfer"),
        }
    }
}

/// Queue family index chosen for each required role. Several roles may share
/// one family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueAssignment {
    families: BTreeMap<QueueRole, u32>,
}

impl QueueAssignment {
    pub fn family_index(&self, role: QueueRole) -> Option<u32> {
        self.families.get(&role).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QueueRole, u32)> + '_ {
        self.families.iter().map(|(role, index)| (*role, *index))
    }

    /// The set of family indices actually in use, ascending. Its size decides
    /// the swapchain sharing mode.
    pub fn distinct_indices(&self) -> Vec<u32> {
        self.families
            .values()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

/// Assigns every role the lowest-index family that satisfies it.
///
/// Families are scanned once in index order and the scan stops as soon as all
/// roles are assigned. The records are re-checked here rather than trusting an
/// earlier suitability verdict.
pub fn resolve_queues(
    families: &[QueueFamilyRecord],
    roles: &BTreeSet<QueueRole>,
) -> Result<QueueAssignment, QueueError> {
    let mut assignment = QueueAssignment::default();

    for family in families {
        if assignment.families.len() == roles.len() {
            break;
        }

        for role in roles {
            if !assignment.families.contains_key(role) && role.is_satisfied_by(family) {
                assignment.families.insert(*role, family.index);
            }
        }
    }

    let missing: Vec<QueueRole> = roles
        .iter()
        .filter(|role| !assignment.families.contains_key(role))
        .copied()
        .collect();

    if !missing.is_empty() {
        return Err(QueueError::IncompleteAssignment(missing));
    }

    Ok(assignment)
}
