use log::{info, warn};
use serde::Serialize;
use std::time::Instant;

use crate::config::{Algorithm, EngineConfig};
use crate::cso;
use crate::data::{Assignment, Roster, StudentRecord};
use crate::error::{EngineError, ErrorCode};
use crate::evaluator::{self, Evaluation};
use crate::greedy;
use crate::validator;

/// Common capability of the two solvers: produce an assignment or a
/// structured failure. Selected by configuration tag.
pub trait AssignmentStrategy {
    fn name(&self) -> &'static str;
    fn solve(&self, roster: &Roster, num_classes: usize) -> Result<Assignment, EngineError>;
}

pub struct GreedyStrategy;

impl AssignmentStrategy for GreedyStrategy {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn solve(&self, roster: &Roster, num_classes: usize) -> Result<Assignment, EngineError> {
        greedy::solve(roster, num_classes)
    }
}

pub struct CsoStrategy {
    pub timeout_seconds: u64,
    pub weights: crate::config::Weights,
}

impl AssignmentStrategy for CsoStrategy {
    fn name(&self) -> &'static str {
        "cso"
    }

    fn solve(&self, roster: &Roster, num_classes: usize) -> Result<Assignment, EngineError> {
        cso::solve(roster, num_classes, self.timeout_seconds, &self.weights)
    }
}

/// Per-category violation counts attached to response metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationSummary {
    pub friendless_students: usize,
    pub separation_violations: usize,
    pub cluster_splits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentMetadata {
    pub strategy_used: String,
    pub execution_time_seconds: f64,
    pub solution_quality: u8,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub hard_constraints_satisfied: bool,
    pub violations: ViolationSummary,
}

/// A solved and scored assignment.
#[derive(Debug)]
pub struct AssignmentOutcome {
    pub assignment: Assignment,
    pub evaluation: Evaluation,
    pub metadata: AssignmentMetadata,
}

/// Runs the pipeline: validate, solve with the configured primary
/// strategy, optionally fall back to greedy once, evaluate.
pub struct Orchestrator {
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(config: EngineConfig) -> Orchestrator {
        Orchestrator { config }
    }

    /// Configuration is read once here; later environment changes are not
    /// observed mid-call.
    pub fn from_env() -> Orchestrator {
        Orchestrator::new(EngineConfig::from_env())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn assign(
        &self,
        records: &[StudentRecord],
        num_classes: i64,
    ) -> Result<AssignmentOutcome, EngineError> {
        let roster = validator::validate(records, num_classes, &self.config)?;
        self.solve_roster(&roster, num_classes as usize)
    }

    /// Solve an already-validated roster with the configured primary
    /// strategy.
    pub fn solve_roster(
        &self,
        roster: &Roster,
        num_classes: usize,
    ) -> Result<AssignmentOutcome, EngineError> {
        let primary = self.primary_strategy();
        info!(
            "assigning {} students to {} classes with {} strategy",
            roster.len(),
            num_classes,
            primary.name()
        );
        self.run(roster, num_classes, primary.as_ref())
    }

    fn primary_strategy(&self) -> Box<dyn AssignmentStrategy> {
        match self.config.algorithm {
            Algorithm::Greedy => Box::new(GreedyStrategy),
            Algorithm::Cso => Box::new(CsoStrategy {
                timeout_seconds: self.config.timeout_seconds,
                weights: self.config.weights,
            }),
        }
    }

    /// Solve with an explicit primary strategy. At most one fallback, and
    /// never a retry of the same solver.
    pub fn run(
        &self,
        roster: &Roster,
        num_classes: usize,
        primary: &dyn AssignmentStrategy,
    ) -> Result<AssignmentOutcome, EngineError> {
        let started = Instant::now();
        let mut strategy_used = primary.name().to_string();
        let mut fallback_reason = None;

        let assignment = match primary.solve(roster, num_classes) {
            Ok(assignment) => assignment,
            Err(err) if self.should_fall_back(primary, &err) => {
                warn!(
                    "{} strategy failed ({}), falling back to greedy",
                    primary.name(),
                    err
                );
                fallback_reason = Some(fallback_reason_for(&err).to_string());
                strategy_used = "greedy".to_string();
                GreedyStrategy.solve(roster, num_classes)?
            }
            Err(err) => return Err(err),
        };

        let evaluation = evaluator::evaluate(roster, &assignment);
        let metadata = AssignmentMetadata {
            strategy_used,
            execution_time_seconds: started.elapsed().as_secs_f64(),
            solution_quality: evaluation.quality,
            fallback_used: fallback_reason.is_some(),
            fallback_reason,
            hard_constraints_satisfied: evaluation.hard_constraints_satisfied(),
            violations: ViolationSummary {
                friendless_students: evaluation.friendless_count(),
                separation_violations: evaluation.soft_metrics.separation_violations,
                cluster_splits: evaluation.soft_metrics.cluster_violations,
            },
        };
        info!(
            "assignment completed in {:.3}s, quality {}/100",
            metadata.execution_time_seconds, metadata.solution_quality
        );

        Ok(AssignmentOutcome {
            assignment,
            evaluation,
            metadata,
        })
    }

    fn should_fall_back(&self, primary: &dyn AssignmentStrategy, err: &EngineError) -> bool {
        self.config.fallback_enabled
            && primary.name() != GreedyStrategy.name()
            && matches!(
                err.code,
                ErrorCode::OptimizationTimeout
                    | ErrorCode::NoSolutionFound
                    | ErrorCode::AssignmentFailed
            )
    }
}

fn fallback_reason_for(err: &EngineError) -> &'static str {
    match err.code {
        ErrorCode::OptimizationTimeout => "timeout",
        ErrorCode::NoSolutionFound => "infeasible",
        _ => "unavailable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStrategy(ErrorCode);

    impl AssignmentStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "cso"
        }

        fn solve(&self, _roster: &Roster, _num_classes: usize) -> Result<Assignment, EngineError> {
            Err(EngineError::new(self.0, "forced failure"))
        }
    }

    fn roster() -> Roster {
        use crate::data::{Gender, Grade};
        let records: Vec<StudentRecord> = [("A", "B"), ("B", "A"), ("C", "D"), ("D", "C")]
            .iter()
            .map(|(name, friend)| StudentRecord {
                name: name.to_string(),
                school: String::new(),
                gender: Some(Gender::MALE),
                academic_performance: Some(Grade::MEDIUM),
                behavioral_performance: Some(Grade::MEDIUM),
                comments: String::new(),
                friend1: Some(friend.to_string()),
                friend2: None,
                friend3: None,
                friend4: None,
                not_with: None,
                cluster_id: None,
            })
            .collect();
        Roster::from_records(&records).unwrap()
    }

    #[test]
    fn fallback_tags_metadata() {
        let orchestrator = Orchestrator::new(EngineConfig::default());
        let outcome = orchestrator
            .run(&roster(), 2, &FailingStrategy(ErrorCode::OptimizationTimeout))
            .unwrap();
        assert!(outcome.metadata.fallback_used);
        assert_eq!(outcome.metadata.fallback_reason.as_deref(), Some("timeout"));
        assert_eq!(outcome.metadata.strategy_used, "greedy");
    }

    #[test]
    fn infeasible_maps_to_infeasible_reason() {
        let orchestrator = Orchestrator::new(EngineConfig::default());
        let outcome = orchestrator
            .run(&roster(), 2, &FailingStrategy(ErrorCode::NoSolutionFound))
            .unwrap();
        assert_eq!(
            outcome.metadata.fallback_reason.as_deref(),
            Some("infeasible")
        );
    }

    #[test]
    fn fallback_disabled_propagates() {
        let mut config = EngineConfig::default();
        config.fallback_enabled = false;
        let orchestrator = Orchestrator::new(config);
        let err = orchestrator
            .run(&roster(), 2, &FailingStrategy(ErrorCode::OptimizationTimeout))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::OptimizationTimeout);
    }

    #[test]
    fn greedy_primary_never_falls_back() {
        struct FailingGreedy;
        impl AssignmentStrategy for FailingGreedy {
            fn name(&self) -> &'static str {
                "greedy"
            }
            fn solve(&self, _: &Roster, _: usize) -> Result<Assignment, EngineError> {
                Err(EngineError::new(ErrorCode::AssignmentFailed, "forced"))
            }
        }
        let orchestrator = Orchestrator::new(EngineConfig::default());
        let err = orchestrator.run(&roster(), 2, &FailingGreedy).unwrap_err();
        assert_eq!(err.code, ErrorCode::AssignmentFailed);
    }

    #[test]
    fn validation_error_short_circuits() {
        let orchestrator = Orchestrator::new(EngineConfig::default());
        let err = orchestrator.assign(&[], 2).unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyStudentData);
    }
}
