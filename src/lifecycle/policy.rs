//! Retention policy evaluation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lifecycle::{StorageInventory, StorageObject};

/// Age thresholds, in days, that move objects between retention tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Objects at least this old may be archived.
    pub archive_threshold_days: u32,

    /// Objects at least this old may be deleted outright.
    pub deletion_threshold_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            archive_threshold_days: 30,
            deletion_threshold_days: 90,
        }
    }
}

impl RetentionPolicy {
    pub fn new(archive_threshold_days: u32, deletion_threshold_days: u32) -> Result<Self> {
        let policy = Self {
            archive_threshold_days,
            deletion_threshold_days,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Both thresholds must be positive and the deletion threshold may not
    /// precede the archive threshold.
    pub fn validate(&self) -> Result<()> {
        if self.archive_threshold_days == 0 || self.deletion_threshold_days == 0 {
            return Err(Error::Policy(format!(
                "thresholds must be positive (archive {}, delete {})",
                self.archive_threshold_days, self.deletion_threshold_days
            )));
        }
        if self.deletion_threshold_days < self.archive_threshold_days {
            return Err(Error::Policy(format!(
                "deletion threshold {} is below archive threshold {}",
                self.deletion_threshold_days, self.archive_threshold_days
            )));
        }
        Ok(())
    }

    pub fn tier_for(&self, age_days: i64) -> RetentionTier {
        if age_days >= i64::from(self.deletion_threshold_days) {
            RetentionTier::Deletable
        } else if age_days >= i64::from(self.archive_threshold_days) {
            RetentionTier::Archivable
        } else {
            RetentionTier::Fresh
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionTier {
    Fresh,
    Archivable,
    Deletable,
}

/// Partition of an inventory into retention tiers. Every scanned object
/// lands in exactly one tier.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionPlan {
    pub fresh: Vec<StorageObject>,
    pub archivable: Vec<StorageObject>,
    pub deletable: Vec<StorageObject>,
}

impl RetentionPlan {
    pub fn len(&self) -> usize {
        self.fresh.len() + self.archivable.len() + self.deletable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split an already collected inventory by `policy`. Performs no store
/// reads.
pub fn classify(inventory: &StorageInventory, policy: &RetentionPolicy) -> Result<RetentionPlan> {
    policy.validate()?;

    let mut plan = RetentionPlan::default();
    for object in &inventory.objects {
        let bucket = match policy.tier_for(object.age_days) {
            RetentionTier::Fresh => &mut plan.fresh,
            RetentionTier::Archivable => &mut plan.archivable,
            RetentionTier::Deletable => &mut plan.deletable,
        };
        bucket.push(object.clone());
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::inventory::tests::inventory_of;

    fn ages(objects: &[StorageObject]) -> Vec<i64> {
        objects.iter().map(|o| o.age_days).collect()
    }

    #[test]
    fn test_classify_example_ages() {
        let inventory = inventory_of(&[10, 29, 31, 95, 400]);
        let policy = RetentionPolicy::new(30, 90).expect("policy");

        let plan = classify(&inventory, &policy).expect("classify");
        assert_eq!(ages(&plan.fresh), vec![10, 29]);
        assert_eq!(ages(&plan.archivable), vec![31]);
        assert_eq!(ages(&plan.deletable), vec![95, 400]);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let policy = RetentionPolicy::new(30, 90).expect("policy");
        assert_eq!(policy.tier_for(29), RetentionTier::Fresh);
        assert_eq!(policy.tier_for(30), RetentionTier::Archivable);
        assert_eq!(policy.tier_for(89), RetentionTier::Archivable);
        assert_eq!(policy.tier_for(90), RetentionTier::Deletable);
    }

    #[test]
    fn test_partition_covers_inventory() {
        let all_ages: Vec<i64> = (0..200).step_by(7).collect();
        let inventory = inventory_of(&all_ages);
        for (archive, delete) in [(1, 1), (7, 30), (30, 90), (100, 500)] {
            let policy = RetentionPolicy::new(archive, delete).expect("policy");
            let plan = classify(&inventory, &policy).expect("classify");
            assert_eq!(plan.len(), inventory.objects.len());

            let mut union: Vec<i64> = ages(&plan.fresh);
            union.extend(ages(&plan.archivable));
            union.extend(ages(&plan.deletable));
            union.sort_unstable();
            assert_eq!(union, all_ages);
        }
    }

    #[test]
    fn test_equal_thresholds_leave_no_archive_window() {
        let inventory = inventory_of(&[5, 30, 31]);
        let policy = RetentionPolicy::new(30, 30).expect("policy");
        let plan = classify(&inventory, &policy).expect("classify");
        assert!(plan.archivable.is_empty());
        assert_eq!(ages(&plan.deletable), vec![30, 31]);
    }

    #[test]
    fn test_rejects_malformed_policy() {
        assert!(matches!(RetentionPolicy::new(0, 90), Err(Error::Policy(_))));
        assert!(matches!(RetentionPolicy::new(30, 0), Err(Error::Policy(_))));
        assert!(matches!(RetentionPolicy::new(90, 30), Err(Error::Policy(_))));

        let inverted = RetentionPolicy {
            archive_threshold_days: 90,
            deletion_threshold_days: 30,
        };
        assert!(classify(&inventory_of(&[1]), &inverted).is_err());
    }
}
