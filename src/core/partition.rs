//! Partition name resolution
//!
//! Maps a partition token from a flash config to the concrete on-device
//! partitions it targets, the image file that supplies it, and how failures
//! on its individual slot writes are treated.

use crate::core::plan::Slot;

/// Suffix carried by a partition token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuffixKind {
    /// `_ab`: write both slots
    DualSlot,
    /// `_a` / `_b`: write one slot
    SingleSlot(Slot),
    /// No suffix: write the literal name
    None,
}

/// What to do when one write of a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Any failed write aborts the whole plan
    AbortOnAnyFailure,
    /// Log the failure and keep going
    ContinueOnFailure,
}

impl FailurePolicy {
    /// Policy table keyed by (suffix kind, AVB disabled)
    ///
    /// A full dual-slot rewrite with verification intact must land on both
    /// slots; every other combination is best-effort.
    pub fn for_write(suffix: SuffixKind, disable_avb: bool) -> Self {
        match (suffix, disable_avb) {
            (SuffixKind::DualSlot, false) => Self::AbortOnAnyFailure,
            (SuffixKind::DualSlot, true)
            | (SuffixKind::SingleSlot(_) | SuffixKind::None, _) => Self::ContinueOnFailure,
        }
    }
}

/// A resolved partition token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPartition {
    /// Token as written in the config
    pub token: String,
    /// Token with any slot suffix removed
    pub base: String,
    /// Suffix kind
    pub suffix: SuffixKind,
    /// On-device partition names to write, in order
    pub targets: Vec<String>,
    /// Lower-cased image file name (`<base>.img`)
    pub image_key: String,
    /// Failure handling for the writes
    pub policy: FailurePolicy,
    /// Flash with `--disable-verity --disable-verification`
    pub disable_avb: bool,
}

impl ResolvedPartition {
    /// Whether keep-root forbids writing this partition
    pub fn blocked_by_keep_root(&self, keep_root: bool) -> bool {
        keep_root && self.base.eq_ignore_ascii_case("boot")
    }
}

/// Split a token into base name and suffix kind
pub fn split_suffix(token: &str) -> (&str, SuffixKind) {
    if let Some(base) = token.strip_suffix("_ab") {
        return (base, SuffixKind::DualSlot);
    }
    if let Some(base) = token.strip_suffix("_a") {
        return (base, SuffixKind::SingleSlot(Slot::A));
    }
    if let Some(base) = token.strip_suffix("_b") {
        return (base, SuffixKind::SingleSlot(Slot::B));
    }
    (token, SuffixKind::None)
}

/// Resolve a partition token
pub fn resolve(token: &str, disable_avb: bool) -> ResolvedPartition {
    let (base, suffix) = split_suffix(token);

    let targets = match suffix {
        SuffixKind::DualSlot => Slot::BOTH
            .iter()
            .map(|slot| format!("{base}_{slot}"))
            .collect(),
        SuffixKind::SingleSlot(_) | SuffixKind::None => vec![token.to_string()],
    };

    ResolvedPartition {
        token: token.to_string(),
        base: base.to_string(),
        suffix,
        targets,
        image_key: format!("{base}.img").to_lowercase(),
        policy: FailurePolicy::for_write(suffix, disable_avb),
        disable_avb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::generators::partition_base;
    use proptest::prelude::*;

    #[test]
    fn test_dual_slot() {
        let resolved = resolve("boot_ab", false);
        assert_eq!(resolved.base, "boot");
        assert_eq!(resolved.suffix, SuffixKind::DualSlot);
        assert_eq!(resolved.targets, vec!["boot_a", "boot_b"]);
        assert_eq!(resolved.image_key, "boot.img");
        assert_eq!(resolved.policy, FailurePolicy::AbortOnAnyFailure);
    }

    #[test]
    fn test_dual_slot_avb_disabled_is_best_effort() {
        let resolved = resolve("vbmeta_ab", true);
        assert_eq!(resolved.targets, vec!["vbmeta_a", "vbmeta_b"]);
        assert_eq!(resolved.policy, FailurePolicy::ContinueOnFailure);
        assert!(resolved.disable_avb);
    }

    #[test]
    fn test_single_slot_keeps_literal_name() {
        let resolved = resolve("system_b", false);
        assert_eq!(resolved.base, "system");
        assert_eq!(resolved.suffix, SuffixKind::SingleSlot(Slot::B));
        assert_eq!(resolved.targets, vec!["system_b"]);
        assert_eq!(resolved.image_key, "system.img");
    }

    #[test]
    fn test_no_suffix() {
        let resolved = resolve("recovery", false);
        assert_eq!(resolved.suffix, SuffixKind::None);
        assert_eq!(resolved.targets, vec!["recovery"]);
        assert_eq!(resolved.image_key, "recovery.img");
    }

    #[test]
    fn test_image_key_is_lowercase() {
        assert_eq!(resolve("Modem_ab", false).image_key, "modem.img");
    }

    #[test]
    fn test_policy_table() {
        use FailurePolicy::{AbortOnAnyFailure, ContinueOnFailure};
        let rows = [
            (SuffixKind::DualSlot, false, AbortOnAnyFailure),
            (SuffixKind::DualSlot, true, ContinueOnFailure),
            (SuffixKind::SingleSlot(Slot::A), false, ContinueOnFailure),
            (SuffixKind::SingleSlot(Slot::B), true, ContinueOnFailure),
            (SuffixKind::None, false, ContinueOnFailure),
            (SuffixKind::None, true, ContinueOnFailure),
        ];
        for (suffix, avb, expected) in rows {
            assert_eq!(FailurePolicy::for_write(suffix, avb), expected, "{suffix:?}/{avb}");
        }
    }

    #[test]
    fn test_keep_root_blocks_every_boot_form() {
        for token in ["boot", "boot_a", "boot_b", "boot_ab"] {
            assert!(resolve(token, false).blocked_by_keep_root(true), "{token}");
            assert!(!resolve(token, false).blocked_by_keep_root(false), "{token}");
        }
        assert!(!resolve("init_boot", false).blocked_by_keep_root(true));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_ab_yields_two_slots_one_image(base in partition_base(), avb in any::<bool>()) {
            let resolved = resolve(&format!("{base}_ab"), avb);
            prop_assert_eq!(resolved.targets.len(), 2);
            prop_assert_eq!(&resolved.targets[0], &format!("{base}_a"));
            prop_assert_eq!(&resolved.targets[1], &format!("{base}_b"));
            prop_assert_eq!(resolved.image_key, format!("{base}.img"));
        }

        #[test]
        fn prop_unsuffixed_yields_one_target(base in partition_base(), avb in any::<bool>()) {
            let resolved = resolve(&base, avb);
            prop_assert_eq!(resolved.targets, vec![base.clone()]);
            prop_assert_eq!(resolved.image_key, format!("{base}.img"));
        }
    }
}
