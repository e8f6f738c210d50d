//! ISO-8601 durations as reported by `videos.list` (`PT4M13S`, `P1DT2H`, `P0D`).

use std::sync::LazyLock;

use regex::Regex;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").expect("valid regex")
});

/// Parse an ISO-8601 duration into whole seconds.
///
/// Returns `None` for anything that is not a day/time duration with at least
/// one component, or that overflows.
pub fn parse_iso8601_duration(s: &str) -> Option<u64> {
    let caps = DURATION_RE.captures(s.trim())?;

    let parts = [(1, 86_400u64), (2, 3_600), (3, 60), (4, 1)];
    let mut total: u64 = 0;
    let mut any = false;

    for (group, unit) in parts {
        if let Some(m) = caps.get(group) {
            let value: u64 = m.as_str().parse().ok()?;
            total = total.checked_add(value.checked_mul(unit)?)?;
            any = true;
        }
    }

    any.then_some(total)
}
