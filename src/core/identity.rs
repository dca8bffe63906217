//! Device identity check
//!
//! A flash config names the products it was written for. Before anything is
//! written the attached device's `product` variable must contain one of them.

use crate::core::sink::FlashSink;
use crate::error::FlashError;
use crate::infra::fastboot::{parse_var, Fastboot};

/// Query the product and check it against the declared identifiers
///
/// Returns the reported product on success.
pub async fn verify(
    fastboot: &dyn Fastboot,
    declared: &[String],
    sink: &dyn FlashSink,
) -> Result<String, FlashError> {
    sink.log("Checking device identity...");

    let out = fastboot
        .get_var("product")
        .await
        .map_err(|e| FlashError::IdentityQueryFailed {
            reason: e.to_string(),
        })?;

    let reported = match parse_var(&out.output, "product") {
        Some(product) => product,
        None if out.success => out.output.trim().to_string(),
        None => {
            return Err(FlashError::IdentityQueryFailed { reason: out.output });
        }
    };

    if reported.is_empty() {
        return Err(FlashError::IdentityQueryFailed {
            reason: "device reported an empty product".to_string(),
        });
    }

    if !matches(declared, &reported) {
        sink.log(&format!(
            "Device mismatch: config is for [{}], device is '{reported}'",
            declared.join(", ")
        ));
        return Err(FlashError::IdentityMismatch {
            expected: declared.to_vec(),
            reported,
        });
    }

    sink.log(&format!("Device identity confirmed: {reported}"));
    Ok(reported)
}

/// Whether any declared id is a case-insensitive substring of `reported`
///
/// Blank ids never match.
pub fn matches(declared: &[String], reported: &str) -> bool {
    let reported = reported.to_lowercase();
    declared
        .iter()
        .map(|id| id.trim().to_lowercase())
        .filter(|id| !id.is_empty())
        .any(|id| reported.contains(&id))
}
