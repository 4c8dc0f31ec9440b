use classroom_solver::config::{Algorithm, EngineConfig};
use classroom_solver::data::{Gender, Grade, StudentRecord};
use classroom_solver::error::ErrorCode;
use classroom_solver::evaluator;
use classroom_solver::orchestrator::Orchestrator;
use serde_json::json;

fn student(
    name: &str,
    gender: Gender,
    friends: &[&str],
    not_with: Option<&str>,
    cluster_id: Option<u32>,
) -> StudentRecord {
    StudentRecord {
        name: name.to_string(),
        school: "Central".to_string(),
        gender: Some(gender),
        academic_performance: Some(Grade::MEDIUM),
        behavioral_performance: Some(Grade::MEDIUM),
        comments: String::new(),
        friend1: friends.first().map(|f| f.to_string()),
        friend2: friends.get(1).map(|f| f.to_string()),
        friend3: friends.get(2).map(|f| f.to_string()),
        friend4: friends.get(3).map(|f| f.to_string()),
        not_with: not_with.map(|n| n.to_string()),
        cluster_id,
    }
}

fn greedy_orchestrator() -> Orchestrator {
    let mut config = EngineConfig::default();
    config.algorithm = Algorithm::Greedy;
    Orchestrator::new(config)
}

fn class_of(records: &[StudentRecord], outcome: &classroom_solver::orchestrator::AssignmentOutcome, name: &str) -> usize {
    let index = records.iter().position(|r| r.name == name).unwrap();
    outcome.assignment.class_of(index)
}

#[test]
fn trivial_balanced_roster_scores_100() {
    let records = vec![
        student("A", Gender::FEMALE, &["B"], None, None),
        student("B", Gender::MALE, &["A"], None, None),
        student("C", Gender::FEMALE, &["D"], None, None),
        student("D", Gender::MALE, &["C"], None, None),
    ];
    let outcome = greedy_orchestrator().assign(&records, 2).unwrap();

    assert_eq!(class_of(&records, &outcome, "A"), class_of(&records, &outcome, "B"));
    assert_eq!(class_of(&records, &outcome, "C"), class_of(&records, &outcome, "D"));
    assert_ne!(class_of(&records, &outcome, "A"), class_of(&records, &outcome, "C"));
    assert_eq!(outcome.metadata.solution_quality, 100);
    assert_eq!(outcome.metadata.strategy_used, "greedy");
    assert!(!outcome.metadata.fallback_used);
    assert!(outcome.metadata.hard_constraints_satisfied);
}

#[test]
fn separation_pair_never_shares_a_class() {
    let records = vec![
        student("A", Gender::FEMALE, &["B", "C"], None, None),
        student("B", Gender::MALE, &["A", "C"], Some("C"), None),
        student("C", Gender::FEMALE, &["A", "B"], None, None),
        student("D", Gender::MALE, &["A", "C"], None, None),
    ];
    let outcome = greedy_orchestrator().assign(&records, 2).unwrap();

    assert_ne!(class_of(&records, &outcome, "B"), class_of(&records, &outcome, "C"));
    assert_eq!(outcome.metadata.violations.separation_violations, 0);
    assert_eq!(outcome.metadata.violations.friendless_students, 0);
}

#[test]
fn cluster_is_kept_together() {
    let records = vec![
        student("P", Gender::FEMALE, &["Q"], None, Some(1)),
        student("Q", Gender::MALE, &["R"], None, Some(1)),
        student("R", Gender::FEMALE, &["P"], None, Some(1)),
        student("S", Gender::MALE, &["T"], None, None),
        student("T", Gender::FEMALE, &["U"], None, None),
        student("U", Gender::MALE, &["S"], None, None),
    ];
    let outcome = greedy_orchestrator().assign(&records, 2).unwrap();

    let p = class_of(&records, &outcome, "P");
    assert_eq!(class_of(&records, &outcome, "Q"), p);
    assert_eq!(class_of(&records, &outcome, "R"), p);
    let s = class_of(&records, &outcome, "S");
    assert_ne!(p, s);
    assert_eq!(class_of(&records, &outcome, "T"), s);
    assert_eq!(class_of(&records, &outcome, "U"), s);
    assert_eq!(outcome.metadata.violations.cluster_splits, 0);
}

#[test]
fn duplicate_names_rejected_before_solving() {
    let records = vec![
        student("Alice", Gender::FEMALE, &["Bob"], None, None),
        student("Bob", Gender::MALE, &["Alice"], None, None),
        student("Alice", Gender::FEMALE, &["Bob"], None, None),
        student("Dan", Gender::MALE, &["Bob"], None, None),
    ];
    let err = greedy_orchestrator().assign(&records, 2).unwrap_err();
    assert_eq!(err.code, ErrorCode::DuplicateStudentNames);
    assert_eq!(err.params["duplicates"], json!(["Alice"]));
}

#[test]
fn single_class_holds_everyone_without_violations() {
    let records = vec![
        student("A", Gender::FEMALE, &["B"], None, None),
        student("B", Gender::MALE, &["C"], None, None),
        student("C", Gender::FEMALE, &["A"], None, None),
    ];
    let outcome = greedy_orchestrator().assign(&records, 1).unwrap();
    assert_eq!(outcome.assignment.sizes(), vec![3]);
    assert!(outcome.metadata.hard_constraints_satisfied);
}

#[test]
fn one_class_per_student_rejected_by_default_minimum() {
    let records = vec![
        student("A", Gender::FEMALE, &["B"], None, None),
        student("B", Gender::MALE, &["A"], None, None),
        student("C", Gender::FEMALE, &["D"], None, None),
        student("D", Gender::MALE, &["C"], None, None),
    ];
    let err = greedy_orchestrator().assign(&records, 4).unwrap_err();
    assert_eq!(err.code, ErrorCode::ClassSizeTooSmall);
}

fn ring_roster(n: usize) -> Vec<StudentRecord> {
    (0..n)
        .map(|i| {
            let name = format!("S{:02}", i);
            let mut r = student(
                &name,
                if i % 2 == 0 { Gender::FEMALE } else { Gender::MALE },
                &[],
                None,
                None,
            );
            r.friend1 = Some(format!("S{:02}", (i + 1) % n));
            r.friend2 = Some(format!("S{:02}", (i + n - 1) % n));
            r
        })
        .collect()
}

#[test]
fn assignment_is_a_total_function_onto_all_classes() {
    let records = ring_roster(17);
    let outcome = greedy_orchestrator().assign(&records, 4).unwrap();

    let classes = outcome.assignment.classes();
    assert_eq!(classes.len(), 4);
    let mut seen = vec![false; records.len()];
    for members in &classes {
        assert!(!members.is_empty(), "no class may be empty when N >= K");
        for &m in members {
            assert!(!seen[m], "student assigned twice");
            seen[m] = true;
        }
    }
    assert!(seen.iter().all(|&s| s), "every student must be assigned");

    let sizes = outcome.assignment.sizes();
    let spread = sizes.iter().max().unwrap() - sizes.iter().min().unwrap();
    assert!(spread <= 2, "greedy size spread must stay within 2: {:?}", sizes);
}

#[test]
fn greedy_is_deterministic() {
    let records = ring_roster(12);
    let orchestrator = greedy_orchestrator();
    let first = orchestrator.assign(&records, 3).unwrap();
    let second = orchestrator.assign(&records, 3).unwrap();
    assert_eq!(first.assignment, second.assignment);
    assert_eq!(first.evaluation, second.evaluation);
}

#[test]
fn evaluator_is_idempotent_on_solver_output() {
    let records = ring_roster(10);
    let outcome = greedy_orchestrator().assign(&records, 2).unwrap();
    let roster = classroom_solver::data::Roster::from_records(&records).unwrap();

    let again = evaluator::evaluate(&roster, &outcome.assignment);
    assert_eq!(outcome.evaluation, again);
}

#[test]
fn disconnected_components_still_assignable() {
    // Three separate friendship pairs, two classes.
    let records = vec![
        student("A", Gender::FEMALE, &["B"], None, None),
        student("B", Gender::MALE, &["A"], None, None),
        student("C", Gender::FEMALE, &["D"], None, None),
        student("D", Gender::MALE, &["C"], None, None),
        student("E", Gender::FEMALE, &["F"], None, None),
        student("F", Gender::MALE, &["E"], None, None),
    ];
    let outcome = greedy_orchestrator().assign(&records, 2).unwrap();
    assert!(outcome.metadata.hard_constraints_satisfied);
    // Whole components land together.
    for pair in [("A", "B"), ("C", "D"), ("E", "F")] {
        assert_eq!(
            class_of(&records, &outcome, pair.0),
            class_of(&records, &outcome, pair.1)
        );
    }
}
