use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{debug, info};

use crate::compare::{join, mean, sample_std};
use crate::models::{ExperimentGroup, OverviewRow, PerformanceRow, StatisticalResult};

pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Qualitative band for the magnitude of Cohen's d.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectSize {
    Negligible,
    Small,
    Medium,
    Large,
}

impl EffectSize {
    pub fn from_cohens_d(d: f64) -> Self {
        match d.abs() {
            d if d < 0.2 => EffectSize::Negligible,
            d if d < 0.5 => EffectSize::Small,
            d if d < 0.8 => EffectSize::Medium,
            _ => EffectSize::Large,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            EffectSize::Negligible => "Negligible effect",
            EffectSize::Small => "Small effect",
            EffectSize::Medium => "Medium effect",
            EffectSize::Large => "Large effect",
        }
    }
}

/// Compares overall scores of group A against group B.
///
/// Returns `None` when fewer than two rows survive the join or when either
/// group has no scored rows. Other labels and unscored rows are ignored.
pub fn analyze(overview: &[OverviewRow], performance: &[PerformanceRow]) -> Option<StatisticalResult> {
    let joined = join(overview, performance);
    if joined.len() < 2 {
        info!(joined = joined.len(), "not enough data for statistical tests");
        return None;
    }

    let scores_for = |wanted: ExperimentGroup| -> Vec<f64> {
        joined
            .iter()
            .filter(|row| row.overview.ab_group.as_ref() == Some(&wanted))
            .filter_map(|row| row.performance.overall_score)
            .collect()
    };
    let group_a = scores_for(ExperimentGroup::A);
    let group_b = scores_for(ExperimentGroup::B);

    if group_a.is_empty() || group_b.is_empty() {
        info!(
            group_a = group_a.len(),
            group_b = group_b.len(),
            "one or both groups have no scored rows"
        );
        return None;
    }

    let result = compare_samples(&group_a, &group_b)?;
    info!(
        t = ?result.t_statistic,
        p = ?result.p_value,
        cohens_d = result.cohens_d,
        significant = result.significant,
        "statistical analysis complete"
    );
    Some(result)
}

/// Student's t-test with pooled variance plus Cohen's d for two
/// non-empty samples.
pub fn compare_samples(a: &[f64], b: &[f64]) -> Option<StatisticalResult> {
    let mean_a = mean(a)?;
    let mean_b = mean(b)?;
    let std_a = sample_std(a);
    let std_b = sample_std(b);

    let (t_statistic, p_value) = match students_t(a, b) {
        Some((t, p)) => (Some(t), Some(p)),
        None => (None, None),
    };

    let pooled_std = match (std_a, std_b) {
        (Some(sa), Some(sb)) => Some(((sa.powi(2) + sb.powi(2)) / 2.0).sqrt()),
        _ => None,
    };
    let cohens_d = match pooled_std {
        Some(pooled) if pooled > 0.0 => (mean_a - mean_b) / pooled,
        _ => 0.0,
    };
    debug!(?pooled_std, cohens_d, "effect size");

    Some(StatisticalResult {
        group_a_mean: mean_a,
        group_a_std: std_a,
        group_a_n: a.len(),
        group_b_mean: mean_b,
        group_b_std: std_b,
        group_b_n: b.len(),
        t_statistic,
        p_value,
        cohens_d,
        significant: p_value.is_some_and(|p| p < SIGNIFICANCE_LEVEL),
    })
}

/// Pooled-variance t statistic and two-sided p-value.
///
/// `None` when there are no degrees of freedom, or when both samples are
/// constant at the same value. Constant samples at different values give an
/// infinite t and a p-value of zero.
fn students_t(a: &[f64], b: &[f64]) -> Option<(f64, f64)> {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let df = na + nb - 2.0;
    if df < 1.0 {
        return None;
    }

    let mean_a = mean(a)?;
    let mean_b = mean(b)?;
    let ss_a: f64 = a.iter().map(|x| (x - mean_a).powi(2)).sum();
    let ss_b: f64 = b.iter().map(|x| (x - mean_b).powi(2)).sum();
    let pooled_var = (ss_a + ss_b) / df;
    let std_err = (pooled_var * (1.0 / na + 1.0 / nb)).sqrt();
    let diff = mean_a - mean_b;

    if std_err == 0.0 {
        if diff == 0.0 {
            return None;
        }
        return Some((f64::INFINITY.copysign(diff), 0.0));
    }

    let t = diff / std_err;
    Some((t, two_sided_p(t, df)?))
}

/// Two-sided tail probability of Student's t distribution.
pub fn two_sided_p(t: f64, df: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * dist.cdf(-t.abs())).clamp(0.0, 1.0))
}
