//! Capability probe
//!
//! Resolves a tracking target against the output list reported by the
//! backend status query.

use crate::config::TrackingTarget;
use crate::types::{OUTPUT_NAME_MAX, OutputInfo};
use tracing::warn;

/// Resolve a tracking target to the backend output id.
///
/// Named outputs are matched case-sensitively against the reported list,
/// comparing at most [`OUTPUT_NAME_MAX`] bytes of each name; the first
/// match wins. A name with no match degrades silently to output 0 (the
/// primary display) rather than failing the session. Primary and
/// entire-screen targets always resolve to 0; the tracking kind passed
/// to the session disambiguates them.
pub fn resolve_target(target: &TrackingTarget, outputs: &[OutputInfo]) -> u32 {
    match target {
        TrackingTarget::PrimaryDisplay | TrackingTarget::EntireVirtualScreen => 0,
        TrackingTarget::Output(name) => {
            let wanted = truncated(name);
            for output in outputs {
                if truncated(&output.name) == wanted {
                    return output.id;
                }
            }
            warn!(name = %name, "tracked output not found, falling back to primary");
            0
        }
    }
}

fn truncated(name: &str) -> &[u8] {
    let bytes = name.as_bytes();
    &bytes[..bytes.len().min(OUTPUT_NAME_MAX)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs() -> Vec<OutputInfo> {
        vec![
            OutputInfo::new(3, "HDMI-0"),
            OutputInfo::new(7, "DP-1"),
            OutputInfo::new(9, "DP-2"),
        ]
    }

    #[test]
    fn test_named_output_resolves() {
        let target = TrackingTarget::Output("DP-1".into());
        assert_eq!(resolve_target(&target, &outputs()), 7);
    }

    #[test]
    fn test_missing_output_falls_back_to_primary() {
        let target = TrackingTarget::Output("DP-9".into());
        assert_eq!(resolve_target(&target, &outputs()), 0);
    }

    #[test]
    fn test_primary_and_screen_resolve_to_zero() {
        assert_eq!(resolve_target(&TrackingTarget::PrimaryDisplay, &outputs()), 0);
        assert_eq!(
            resolve_target(&TrackingTarget::EntireVirtualScreen, &outputs()),
            0
        );
    }

    #[test]
    fn test_match_is_case_sensitive_first_wins() {
        let list = vec![OutputInfo::new(1, "dp-1"), OutputInfo::new(2, "DP-1")];
        let target = TrackingTarget::Output("DP-1".into());
        assert_eq!(resolve_target(&target, &list), 2);
    }

    #[test]
    fn test_overlong_names_compare_truncated() {
        let long_a = format!("{}A", "x".repeat(OUTPUT_NAME_MAX));
        let long_b = format!("{}B", "x".repeat(OUTPUT_NAME_MAX));
        let list = vec![OutputInfo::new(4, long_a)];
        // Differs only past the comparison bound, so it still matches.
        assert_eq!(resolve_target(&TrackingTarget::Output(long_b), &list), 4);
    }
}
