//! CLI command for `scatterflash check`
//!
//! Resolves a flash config against an image directory without touching a
//! device: every flash step is shown with the partitions it would write and
//! whether its image is present.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{is_json, print_detail, print_info, print_success, print_warning, status};
use crate::core::images::DeviceImageSet;
use crate::core::partition::{self, FailurePolicy};
use crate::core::plan::{FlashPlan, Step};
use crate::core::settings::Settings;

/// How a step would be carried out
#[derive(Debug, Serialize)]
struct ResolvedStep {
    index: usize,
    step: Step,
    /// On-device partitions written, for flash steps
    #[serde(skip_serializing_if = "Vec::is_empty")]
    targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    image_found: bool,
    /// Human-readable note (skip reason, strict policy)
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
}

/// Execute the check command
pub fn execute(settings: &Settings, images_dir: &Path, config: &Path) -> Result<()> {
    let plan = FlashPlan::from_file(config)
        .with_context(|| format!("Invalid flash config: {}", config.display()))?;
    let images = DeviceImageSet::scan(images_dir)?;

    let resolved = resolve_plan(&plan, &images, settings.keep_root());
    let missing = resolved
        .iter()
        .filter(|r| r.image.is_some() && !r.image_found)
        .count();

    if is_json() {
        let json = serde_json::json!({
            "status": "success",
            "devices": plan.devices(),
            "images": images.len(),
            "missing_images": missing,
            "steps": resolved,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    print_info(&format!(
        "Config for {} ({} steps, {} images)",
        plan.devices().join(", "),
        plan.steps().len(),
        images.len()
    ));
    for r in &resolved {
        let marker = if r.image.is_some() && !r.image_found {
            status::WARNING
        } else {
            status::SUCCESS
        };
        print_detail(&format!("{marker} [{}] {}", r.index, r.step));
        if !r.targets.is_empty() {
            print_detail(&format!("    -> {}", r.targets.join(", ")));
        }
        if let Some(note) = &r.note {
            print_detail(&format!("    {note}"));
        }
    }

    if missing > 0 {
        print_warning(&format!("{missing} flash step(s) will be skipped for missing images"));
    } else {
        print_success("Flash config is valid");
    }
    Ok(())
}

fn resolve_plan(plan: &FlashPlan, images: &DeviceImageSet, keep_root: bool) -> Vec<ResolvedStep> {
    plan.steps()
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let mut resolved = ResolvedStep {
                index: i + 1,
                step: step.clone(),
                targets: Vec::new(),
                image: None,
                image_found: false,
                note: None,
            };

            if let Step::FlashPartition {
                partition,
                disable_avb,
                ..
            } = step
            {
                let p = partition::resolve(partition, *disable_avb);
                resolved.image_found = images.contains(&p.image_key);
                resolved.note = if p.blocked_by_keep_root(keep_root) {
                    Some("skipped: keep-root".to_string())
                } else if !resolved.image_found {
                    Some(format!("skipped: {} not found", p.image_key))
                } else if p.policy == FailurePolicy::AbortOnAnyFailure && p.targets.len() > 1 {
                    Some("a failure on either slot stops the run".to_string())
                } else {
                    None
                };
                resolved.targets = p.targets;
                resolved.image = Some(p.image_key);
            }
            resolved
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resolve_plan_marks_missing_images() {
        let plan = FlashPlan::parse("device:foo\nbootloader\n-boot_ab\n-dtbo\n").unwrap();
        let images: DeviceImageSet = [("boot.img", PathBuf::from("/i/boot.img"))]
            .into_iter()
            .collect();

        let resolved = resolve_plan(&plan, &images, false);
        assert_eq!(resolved.len(), 3);
        assert!(resolved[0].image.is_none());
        assert_eq!(resolved[1].targets, vec!["boot_a", "boot_b"]);
        assert!(resolved[1].image_found);
        assert!(!resolved[2].image_found);
        assert_eq!(resolved[2].note.as_deref(), Some("skipped: dtbo.img not found"));
    }

    #[test]
    fn test_resolve_plan_keep_root() {
        let plan = FlashPlan::parse("device:foo\n-boot\n").unwrap();
        let images: DeviceImageSet = [("boot.img", PathBuf::from("/i/boot.img"))]
            .into_iter()
            .collect();
        let resolved = resolve_plan(&plan, &images, true);
        assert_eq!(resolved[0].note.as_deref(), Some("skipped: keep-root"));
    }
}
