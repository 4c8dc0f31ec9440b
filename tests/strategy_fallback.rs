use classroom_solver::config::EngineConfig;
use classroom_solver::data::{Assignment, Gender, Grade, Roster, StudentRecord};
use classroom_solver::error::{EngineError, ErrorCode};
use classroom_solver::orchestrator::{AssignmentStrategy, Orchestrator};

/// Stands in for an optimizer backend that cannot produce a solution.
struct BrokenOptimizer(ErrorCode);

impl AssignmentStrategy for BrokenOptimizer {
    fn name(&self) -> &'static str {
        "cso"
    }

    fn solve(&self, _roster: &Roster, _num_classes: usize) -> Result<Assignment, EngineError> {
        Err(EngineError::new(self.0, "backend gave up"))
    }
}

fn roster() -> Roster {
    let records: Vec<StudentRecord> = [
        ("Alice", "Bob", Gender::FEMALE),
        ("Bob", "Alice", Gender::MALE),
        ("Carol", "Dan", Gender::FEMALE),
        ("Dan", "Carol", Gender::MALE),
    ]
    .iter()
    .map(|(name, friend, gender)| StudentRecord {
        name: name.to_string(),
        school: String::new(),
        gender: Some(*gender),
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
fn timeout_triggers_one_greedy_fallback() {
    let orchestrator = Orchestrator::new(EngineConfig::default());
    let outcome = orchestrator
        .run(&roster(), 2, &BrokenOptimizer(ErrorCode::OptimizationTimeout))
        .unwrap();

    assert!(outcome.metadata.fallback_used);
    assert_eq!(outcome.metadata.strategy_used, "greedy");
    assert_eq!(outcome.metadata.fallback_reason.as_deref(), Some("timeout"));
    assert!(outcome.metadata.hard_constraints_satisfied);
}

#[test]
fn solver_abort_reports_unavailable() {
    let orchestrator = Orchestrator::new(EngineConfig::default());
    let outcome = orchestrator
        .run(&roster(), 2, &BrokenOptimizer(ErrorCode::AssignmentFailed))
        .unwrap();
    assert_eq!(
        outcome.metadata.fallback_reason.as_deref(),
        Some("unavailable")
    );
}

#[test]
fn disabled_fallback_returns_the_original_error() {
    let mut config = EngineConfig::default();
    config.fallback_enabled = false;
    let orchestrator = Orchestrator::new(config);

    let err = orchestrator
        .run(&roster(), 2, &BrokenOptimizer(ErrorCode::NoSolutionFound))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NoSolutionFound);
}

#[test]
fn fallback_result_is_evaluated_like_any_other() {
    let orchestrator = Orchestrator::new(EngineConfig::default());
    let outcome = orchestrator
        .run(&roster(), 2, &BrokenOptimizer(ErrorCode::NoSolutionFound))
        .unwrap();

    assert_eq!(outcome.metadata.solution_quality, outcome.evaluation.quality);
    assert_eq!(outcome.assignment.len(), 4);
    assert_eq!(outcome.metadata.solution_quality, 100);
}
