use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::data::{Assignment, ClassIdx, ClusterId, Gender, Roster};

// Quality score deductions. Hard violations dominate; soft penalties are
// normalized to [0,1] before weighting.
const HARD_PENALTY: f64 = 20.0;
const FRIENDSHIP_WEIGHT: f64 = 10.0;
const GENDER_WEIGHT: f64 = 10.0;
const ACADEMIC_WEIGHT: f64 = 5.0;
const BEHAVIOR_WEIGHT: f64 = 5.0;
const SIZE_WEIGHT: f64 = 2.0;

/// One hard-constraint violation found in a candidate assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HardViolation {
    #[serde(rename_all = "camelCase")]
    FriendlessStudent { student: String, class: ClassIdx },
    #[serde(rename_all = "camelCase")]
    SeparationCoPlacement {
        student: String,
        partner: String,
        class: ClassIdx,
    },
    #[serde(rename_all = "camelCase")]
    ClusterSplit {
        cluster_id: ClusterId,
        classes: Vec<ClassIdx>,
    },
}

/// Soft balance metrics. Imbalances are normalized absolute deviations
/// from the uniform expectation, in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftMetrics {
    pub friend_satisfaction: f64,
    pub gender_imbalance: f64,
    pub academic_imbalance: f64,
    pub behavior_imbalance: f64,
    pub cluster_violations: usize,
    pub separation_violations: usize,
    pub size_imbalance: usize,
}

/// Quality record for one candidate assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub quality: u8,
    pub hard_violations: Vec<HardViolation>,
    pub soft_metrics: SoftMetrics,
}

impl Evaluation {
    pub fn hard_constraints_satisfied(&self) -> bool {
        self.hard_violations.is_empty()
    }

    pub fn friendless_count(&self) -> usize {
        self.hard_violations
            .iter()
            .filter(|v| matches!(v, HardViolation::FriendlessStudent { .. }))
            .count()
    }
}

/// Score a candidate assignment against the roster's hard and soft
/// criteria. Deterministic and stateless: identical inputs produce
/// identical records.
pub fn evaluate(roster: &Roster, assignment: &Assignment) -> Evaluation {
    let hard_violations = find_hard_violations(roster, assignment);
    let soft_metrics = compute_soft_metrics(roster, assignment, &hard_violations);
    let quality = composite_quality(&hard_violations, &soft_metrics);
    Evaluation {
        quality,
        hard_violations,
        soft_metrics,
    }
}

fn find_hard_violations(roster: &Roster, assignment: &Assignment) -> Vec<HardViolation> {
    let mut violations = Vec::new();

    for i in 0..roster.len() {
        let class = assignment.class_of(i);
        let has_friend = roster
            .neighbors(i)
            .iter()
            .any(|&f| assignment.class_of(f) == class);
        if !has_friend {
            violations.push(HardViolation::FriendlessStudent {
                student: roster.student(i).name.clone(),
                class,
            });
        }
    }

    for &(a, b) in roster.separations() {
        let class = assignment.class_of(a);
        if class == assignment.class_of(b) {
            violations.push(HardViolation::SeparationCoPlacement {
                student: roster.student(a).name.clone(),
                partner: roster.student(b).name.clone(),
                class,
            });
        }
    }

    for (&cluster_id, members) in roster.clusters() {
        let classes: BTreeSet<ClassIdx> =
            members.iter().map(|&m| assignment.class_of(m)).collect();
        if classes.len() > 1 {
            violations.push(HardViolation::ClusterSplit {
                cluster_id,
                classes: classes.into_iter().collect(),
            });
        }
    }

    violations
}

fn compute_soft_metrics(
    roster: &Roster,
    assignment: &Assignment,
    hard_violations: &[HardViolation],
) -> SoftMetrics {
    let n = roster.len();
    let k = assignment.num_classes();

    let mut total_friendships = 0usize;
    let mut satisfied_friendships = 0usize;
    for i in 0..n {
        let class = assignment.class_of(i);
        for f in roster.neighbors(i) {
            total_friendships += 1;
            if assignment.class_of(f) == class {
                satisfied_friendships += 1;
            }
        }
    }
    let friend_satisfaction = if total_friendships > 0 {
        satisfied_friendships as f64 / total_friendships as f64
    } else {
        0.0
    };

    // Per-class histograms: female count and one bucket per grade level.
    let mut female = vec![0usize; k];
    let mut academic = vec![[0usize; 3]; k];
    let mut behavior = vec![[0usize; 3]; k];
    for i in 0..n {
        let class = assignment.class_of(i);
        let student = roster.student(i);
        if student.gender == Gender::FEMALE {
            female[class] += 1;
        }
        academic[class][student.academic.level_index()] += 1;
        behavior[class][student.behavior.level_index()] += 1;
    }

    let gender_imbalance = normalized_deviation(&[female.clone()], n, k);
    let academic_imbalance = normalized_deviation(&transpose(&academic), n, k);
    let behavior_imbalance = normalized_deviation(&transpose(&behavior), n, k);

    let sizes = assignment.sizes();
    let size_imbalance = match sizes.iter().minmax().into_option() {
        Some((min, max)) => max - min,
        None => 0,
    };

    SoftMetrics {
        friend_satisfaction,
        gender_imbalance,
        academic_imbalance,
        behavior_imbalance,
        cluster_violations: hard_violations
            .iter()
            .filter(|v| matches!(v, HardViolation::ClusterSplit { .. }))
            .count(),
        separation_violations: hard_violations
            .iter()
            .filter(|v| matches!(v, HardViolation::SeparationCoPlacement { .. }))
            .count(),
        size_imbalance,
    }
}

/// Mean absolute deviation of per-class counts from the uniform
/// expectation, summed over attribute values and normalized by `2N` so the
/// result stays in `[0, 1]`.
fn normalized_deviation(per_value_counts: &[Vec<usize>], n: usize, k: usize) -> f64 {
    if n == 0 || k == 0 {
        return 0.0;
    }
    let mut deviation = 0.0;
    for counts in per_value_counts {
        let total: usize = counts.iter().sum();
        let expected = total as f64 / k as f64;
        for &count in counts {
            deviation += (count as f64 - expected).abs();
        }
    }
    deviation / (2.0 * n as f64)
}

fn transpose(per_class: &[[usize; 3]]) -> Vec<Vec<usize>> {
    (0..3)
        .map(|level| per_class.iter().map(|counts| counts[level]).collect())
        .collect()
}

fn composite_quality(hard_violations: &[HardViolation], soft: &SoftMetrics) -> u8 {
    let mut score = 100.0;

    // One deduction per violation class present, not per instance.
    let friendless = hard_violations
        .iter()
        .any(|v| matches!(v, HardViolation::FriendlessStudent { .. }));
    let separation = hard_violations
        .iter()
        .any(|v| matches!(v, HardViolation::SeparationCoPlacement { .. }));
    let cluster = hard_violations
        .iter()
        .any(|v| matches!(v, HardViolation::ClusterSplit { .. }));
    score -= HARD_PENALTY * (friendless as u8 + separation as u8 + cluster as u8) as f64;

    score -= FRIENDSHIP_WEIGHT * (1.0 - soft.friend_satisfaction);
    score -= GENDER_WEIGHT * soft.gender_imbalance;
    score -= ACADEMIC_WEIGHT * soft.academic_imbalance;
    score -= BEHAVIOR_WEIGHT * soft.behavior_imbalance;
    score -= SIZE_WEIGHT * soft.size_imbalance as f64;

    score.round().clamp(0.0, 100.0) as u8
}
