pub const HIGH_RISK_THRESHOLD: f64 = 2.0;
pub const MEDIUM_RISK_THRESHOLD: f64 = 1.0;

/// Risk tiers, ordered from least to most severe. `Unknown` sorts lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Unknown,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Unknown => "Unknown",
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            RiskLevel::Unknown => "risk-unknown",
            RiskLevel::Low => "risk-low",
            RiskLevel::Medium => "risk-medium",
            RiskLevel::High => "risk-high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Tier lower bounds are inclusive. NaN is treated like a missing score.
pub fn classify(score: Option<f64>) -> RiskLevel {
    match score {
        None => RiskLevel::Unknown,
        Some(s) if s.is_nan() => RiskLevel::Unknown,
        Some(s) if s >= HIGH_RISK_THRESHOLD => RiskLevel::High,
        Some(s) if s >= MEDIUM_RISK_THRESHOLD => RiskLevel::Medium,
        Some(_) => RiskLevel::Low,
    }
}

/// `"2.50 (High)"`; a missing score shows as `"0.00"`.
pub fn score_display(score: Option<f64>) -> String {
    let shown = score.filter(|s| !s.is_nan()).unwrap_or(0.0);
    format!("{:.2} ({})", shown, classify(score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tiers_follow_thresholds() {
        assert_eq!(classify(None), RiskLevel::Unknown);
        assert_eq!(classify(Some(f64::NAN)), RiskLevel::Unknown);
        assert_eq!(classify(Some(-3.0)), RiskLevel::Low);
        assert_eq!(classify(Some(0.99)), RiskLevel::Low);
        assert_eq!(classify(Some(1.0)), RiskLevel::Medium);
        assert_eq!(classify(Some(1.99)), RiskLevel::Medium);
        assert_eq!(classify(Some(2.0)), RiskLevel::High);
        assert_eq!(classify(Some(f64::INFINITY)), RiskLevel::High);
    }

    #[test]
    fn labels_and_classes_match_tier() {
        assert_eq!(RiskLevel::High.label(), "High");
        assert_eq!(RiskLevel::Medium.css_class(), "risk-medium");
        assert_eq!(RiskLevel::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn score_display_includes_label() {
        assert_eq!(score_display(Some(2.5)), "2.50 (High)");
        assert_eq!(score_display(Some(0.333)), "0.33 (Low)");
        assert_eq!(score_display(None), "0.00 (Unknown)");
    }

    proptest! {
        #[test]
        fn classification_is_monotonic(a in -10.0f64..10.0, b in -10.0f64..10.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(classify(Some(lo)) <= classify(Some(hi)));
            prop_assert!(classify(None) <= classify(Some(lo)));
        }
    }
}
