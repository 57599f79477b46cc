//! Per-frame rule classifier.
//!
//! Available on every frame regardless of window fill state. Two scoring
//! modes are supported:
//!
//! - `threshold`: the running/rushing decision table over motion energy and
//!   flux of count
//! - `density_risk`: a continuous risk score from density-weighted motion

use crowdwatch_models::{ClassificationVerdict, FeatureVector, VerdictLabel};

use crate::config::{PipelineConfig, RuleMode};

/// Upper bound of the NORMAL band in density-risk mode.
pub const RISK_NORMAL_MAX: f64 = 2.5;

/// Upper bound of the WARNING_HIGH_ACTIVITY band in density-risk mode.
pub const RISK_WARNING_MAX: f64 = 5.0;

/// Inputs of the density-risk score for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskInput {
    /// Sum of motion magnitude weighted by density (or spread uniformly).
    pub weighted_motion: f64,
    /// Head count the weighted sum is divided by.
    pub count: f64,
}

impl RiskInput {
    pub fn new(weighted_motion: f64, count: f64) -> Self {
        Self {
            weighted_motion,
            count,
        }
    }

    /// `(Σ motion·density / max(count, 1)) * scale`
    pub fn score(&self, scale: f64) -> f64 {
        let risk = self.weighted_motion / self.count.max(1.0) * scale;
        if risk.is_finite() {
            risk.max(0.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleBasedClassifier {
    mode: RuleMode,
    energy_threshold: f64,
    flux_threshold: f64,
    risk_scale: f64,
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self {
            mode: RuleMode::Threshold,
            energy_threshold: 3.5,
            flux_threshold: 10.0,
            risk_scale: 10.0,
        }
    }
}

impl RuleBasedClassifier {
    pub fn new(mode: RuleMode, energy_threshold: f64, flux_threshold: f64, risk_scale: f64) -> Self {
        Self {
            mode,
            energy_threshold,
            flux_threshold,
            risk_scale,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.rule_mode,
            config.energy_threshold,
            config.flux_threshold,
            config.risk_scale,
        )
    }

    pub fn mode(&self) -> RuleMode {
        self.mode
    }

    /// Classify one frame.
    ///
    /// `risk` is only consulted in density-risk mode; a missing input
    /// scores zero risk.
    pub fn classify(&self, features: &FeatureVector, risk: Option<&RiskInput>) -> ClassificationVerdict {
        match self.mode {
            RuleMode::Threshold => self.classify_thresholds(features),
            RuleMode::DensityRisk => {
                let score = risk.map(|r| r.score(self.risk_scale)).unwrap_or(0.0);
                ClassificationVerdict::rule(risk_label(score), score)
            }
        }
    }

    fn classify_thresholds(&self, features: &FeatureVector) -> ClassificationVerdict {
        let running = features.motion_energy > self.energy_threshold;
        let rushing = features.flux_of_count > self.flux_threshold;

        let label = match (running, rushing) {
            (true, true) => VerdictLabel::Panic,
            (true, false) => VerdictLabel::WarningHighSpeed,
            (false, true) => VerdictLabel::WarningSuddenInflux,
            (false, false) => VerdictLabel::Normal,
        };
        let score = (features.motion_energy / self.energy_threshold)
            .max(features.flux_of_count / self.flux_threshold);

        ClassificationVerdict::rule(label, score)
    }
}

/// Map a density-risk score onto its band.
pub fn risk_label(score: f64) -> VerdictLabel {
    if score > RISK_WARNING_MAX {
        VerdictLabel::Panic
    } else if score > RISK_NORMAL_MAX {
        VerdictLabel::WarningHighActivity
    } else {
        VerdictLabel::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(energy: f64, flux: f64) -> FeatureVector {
        FeatureVector::new(0, energy, flux)
    }

    #[test]
    fn test_decision_table() {
        let rules = RuleBasedClassifier::default();
        let cases = [
            ((4.0, 12.0), VerdictLabel::Panic),
            ((4.0, 3.0), VerdictLabel::WarningHighSpeed),
            ((1.0, 12.0), VerdictLabel::WarningSuddenInflux),
            ((1.0, 3.0), VerdictLabel::Normal),
        ];
        for ((e, f), expected) in cases {
            assert_eq!(rules.classify(&frame(e, f), None).label, expected, "({e}, {f})");
        }
    }

    #[test]
    fn test_thresholds_are_strict() {
        let rules = RuleBasedClassifier::default();
        let verdict = rules.classify(&frame(3.5, 10.0), None);
        assert_eq!(verdict.label, VerdictLabel::Normal);
        assert!((verdict.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_score_is_max_ratio() {
        let rules = RuleBasedClassifier::default();
        let verdict = rules.classify(&frame(7.0, 5.0), None);
        assert!((verdict.score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_risk_bands() {
        let rules = RuleBasedClassifier::new(RuleMode::DensityRisk, 3.5, 10.0, 10.0);
        let f = frame(0.0, 0.0);

        let calm = rules.classify(&f, Some(&RiskInput::new(2.5, 10.0)));
        assert_eq!(calm.label, VerdictLabel::Normal);
        assert!((calm.score - 2.5).abs() < 1e-12);

        let busy = rules.classify(&f, Some(&RiskInput::new(4.0, 10.0)));
        assert_eq!(busy.label, VerdictLabel::WarningHighActivity);

        let crush = rules.classify(&f, Some(&RiskInput::new(6.0, 10.0)));
        assert_eq!(crush.label, VerdictLabel::Panic);
    }

    #[test]
    fn test_risk_count_floored_at_one() {
        assert!((RiskInput::new(0.3, 0.0).score(10.0) - 3.0).abs() < 1e-9);
        assert!((RiskInput::new(0.3, 0.5).score(10.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_risk_mode_without_input_is_normal() {
        let rules = RuleBasedClassifier::new(RuleMode::DensityRisk, 3.5, 10.0, 10.0);
        let verdict = rules.classify(&frame(50.0, 50.0), None);
        assert_eq!(verdict.label, VerdictLabel::Normal);
        assert_eq!(verdict.score, 0.0);
    }
}
