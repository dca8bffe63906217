//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate a product identifier as used in `device:` lines
    pub fn device_id() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{2,10}"
    }

    /// Generate a partition name without slot suffix
    pub fn partition_base() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{1,12}"
    }

    /// Generate a slot suffix token (empty, `_a`, `_b` or `_ab`)
    pub fn slot_token() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just(""), Just("_a"), Just("_b"), Just("_ab")]
    }

    /// Generate a logical partition size such as `512M`
    pub fn partition_size() -> impl Strategy<Value = String> {
        (1u32..4096, prop_oneof![Just(""), Just("M"), Just("G"), Just("K")])
            .prop_map(|(n, unit)| format!("{n}{unit}"))
    }

    /// Generate a partition token as written in a config (`boot_ab`, `system_a`, ...)
    pub fn partition_token() -> impl Strategy<Value = String> {
        (partition_base(), slot_token()).prop_map(|(base, slot)| format!("{base}{slot}"))
    }

    /// Generate a valid flash config line that is not a `device:` line
    pub fn config_line() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("bootloader".to_string()),
            Just("fastbootd".to_string()),
            Just("system".to_string()),
            Just("set-a".to_string()),
            Just("set-b".to_string()),
            Just("wipe-data".to_string()),
            Just(String::new()),
            "# [a-z ]{0,20}",
            partition_token().prop_map(|p| format!("-{p}")),
            partition_token().prop_map(|p| format!("-{p} disable")),
            partition_token().prop_map(|p| format!("-{p} del")),
            (partition_token(), partition_size()).prop_map(|(p, size)| format!("-{p} add {size}")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::config::defaults::MIN_PROPTEST_ITERATIONS;
    use crate::core::plan::FlashPlan;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(MIN_PROPTEST_ITERATIONS))]

        #[test]
        fn test_device_id_generator(id in device_id()) {
            prop_assert!(id.len() >= 3);
            prop_assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }

        #[test]
        fn test_partition_base_generator(base in partition_base()) {
            prop_assert!(base.len() >= 2);
            prop_assert!(!base.contains('_'));
        }

        #[test]
        fn test_config_line_generator_parses(line in config_line()) {
            let text = format!("device:foo\n{line}");
            prop_assert!(FlashPlan::parse(&text).is_ok(), "{}", line);
        }
    }
}
