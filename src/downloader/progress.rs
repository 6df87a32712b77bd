use regex::Regex;
use std::sync::OnceLock;

fn ansi_escape() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").ok()).as_ref()
}

/// Strips terminal colour codes and surrounding whitespace from an extractor field.
pub fn clean_field(raw: &str) -> String {
    match ansi_escape() {
        Some(re) => re.replace_all(raw, "").trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Parses a percentage string such as `" 12.5%"` into `12.5`, clamped to `0..=100`.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let cleaned = clean_field(raw);
    let value: f64 = cleaned.trim_end_matches('%').trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(0.0, 100.0))
}

/// Decides which progress ticks are forwarded: the first one, then only ticks at least `step`
/// points above the last forwarded value. Forwarded values are therefore non-decreasing.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    step: f64,
    last: Option<f64>,
}

impl ProgressThrottle {
    pub fn new(step_percent: u32) -> Self {
        Self {
            step: f64::from(step_percent.max(1)),
            last: None,
        }
    }

    pub fn admit(&mut self, percent: f64) -> bool {
        let forward = match self.last {
            None => true,
            Some(last) => percent >= last + self.step,
        };
        if forward {
            self.last = Some(percent);
        }
        forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_and_coloured_percentages() {
        assert_eq!(parse_percent("  12.5%"), Some(12.5));
        assert_eq!(parse_percent("\u{1b}[0;94m 45.0%\u{1b}[0m"), Some(45.0));
        assert_eq!(parse_percent("100%"), Some(100.0));
        assert_eq!(parse_percent("N/A"), None);
        assert_eq!(parse_percent("140%"), Some(100.0));
    }

    #[test]
    fn forwards_first_tick_then_whole_steps() {
        let mut throttle = ProgressThrottle::new(10);
        let forwarded: Vec<f64> = [5.0, 12.0, 14.9, 15.0, 3.0, 24.0, 25.0, 100.0]
            .into_iter()
            .filter(|p| throttle.admit(*p))
            .collect();
        assert_eq!(forwarded, vec![5.0, 15.0, 25.0, 100.0]);
    }

    #[test]
    fn forwarded_sequence_is_monotonic_for_any_input() {
        let inputs = [0.0, 50.0, 10.0, 55.0, 61.0, 60.0, 0.0, 99.0, 71.0, 100.0];
        let mut throttle = ProgressThrottle::new(10);
        let forwarded: Vec<f64> = inputs.into_iter().filter(|p| throttle.admit(*p)).collect();
        for pair in forwarded.windows(2) {
            assert!(pair[1] >= pair[0] + 10.0);
        }
        assert_eq!(forwarded, vec![0.0, 50.0, 61.0, 99.0]);
    }
}
