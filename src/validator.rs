use itertools::Itertools;
use log::warn;
use serde_json::json;
use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::data::{Roster, StudentRecord};
use crate::error::{EngineError, ErrorCode};

/// Validate input data and assignment parameters, producing the normalized
/// roster on success.
///
/// Checks run in a fixed order and short-circuit on the first failure; no
/// solver runs on invalid input and no partial assignment is ever returned.
pub fn validate(
    records: &[StudentRecord],
    num_classes: i64,
    config: &EngineConfig,
) -> Result<Roster, EngineError> {
    check_not_empty(records)?;
    check_required_fields(records)?;
    check_unique_names(records)?;
    check_parameters(records.len(), num_classes, config)?;
    check_friends_listed(records)?;
    check_names_known(records)?;

    let roster = Roster::from_records(records)?;
    check_no_isolated(&roster)?;
    Ok(roster)
}

fn check_not_empty(records: &[StudentRecord]) -> Result<(), EngineError> {
    if records.is_empty() {
        return Err(
            EngineError::new(ErrorCode::EmptyStudentData, "Student data is empty")
                .with_param("count", 0),
        );
    }
    Ok(())
}

fn check_required_fields(records: &[StudentRecord]) -> Result<(), EngineError> {
    let mut missing: Vec<&str> = Vec::new();
    for record in records {
        if record.name.trim().is_empty() {
            missing.push("name");
        }
        if record.gender.is_none() {
            missing.push("gender");
        }
        if record.academic_performance.is_none() {
            missing.push("academicPerformance");
        }
        if record.behavioral_performance.is_none() {
            missing.push("behavioralPerformance");
        }
    }
    if !missing.is_empty() {
        let fields: Vec<&str> = missing.into_iter().unique().collect();
        return Err(EngineError::new(
            ErrorCode::MissingRequiredFields,
            format!("Missing required fields: {:?}", fields),
        )
        .with_param("fields", json!(fields)));
    }
    Ok(())
}

fn check_unique_names(records: &[StudentRecord]) -> Result<(), EngineError> {
    let duplicates: Vec<&str> = records
        .iter()
        .map(|r| r.name.trim())
        .duplicates()
        .collect();
    if !duplicates.is_empty() {
        return Err(EngineError::new(
            ErrorCode::DuplicateStudentNames,
            format!("Duplicate student names found: {:?}", duplicates),
        )
        .with_param("duplicates", json!(duplicates)));
    }
    Ok(())
}

fn check_parameters(
    num_students: usize,
    num_classes: i64,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    if num_classes <= 0 {
        return Err(EngineError::new(
            ErrorCode::InvalidClassCount,
            "Number of classes must be positive",
        )
        .with_param("classCount", num_classes));
    }
    if num_students == 0 {
        // Unreachable behind the emptiness check, kept for parameter-level parity.
        return Err(EngineError::new(
            ErrorCode::InvalidStudentCount,
            "Number of students must be positive",
        )
        .with_param("studentCount", 0));
    }
    let num_classes = num_classes as usize;
    if num_classes > num_students {
        return Err(EngineError::new(
            ErrorCode::TooManyClasses,
            format!(
                "Cannot create {} classes with only {} students",
                num_classes, num_students
            ),
        )
        .with_param("classCount", num_classes)
        .with_param("studentCount", num_students));
    }
    let min_size = num_students / num_classes;
    if min_size < config.min_class_size {
        return Err(EngineError::new(
            ErrorCode::ClassSizeTooSmall,
            format!(
                "Class size too small: {} (minimum {})",
                min_size, config.min_class_size
            ),
        )
        .with_param("minSize", min_size)
        .with_param("classCount", num_classes)
        .with_param("studentCount", num_students));
    }
    Ok(())
}

fn check_friends_listed(records: &[StudentRecord]) -> Result<(), EngineError> {
    for record in records {
        if record.listed_friends().is_empty() {
            return Err(EngineError::new(
                ErrorCode::StudentNoFriends,
                format!("Student '{}' has no friends listed", record.name),
            )
            .with_param("studentName", record.name.trim()));
        }
    }
    Ok(())
}

fn check_names_known(records: &[StudentRecord]) -> Result<(), EngineError> {
    let names: HashSet<&str> = records.iter().map(|r| r.name.trim()).collect();
    for record in records {
        for friend in record.listed_friends() {
            if !names.contains(friend) {
                return Err(EngineError::new(
                    ErrorCode::UnknownFriend,
                    format!(
                        "Student '{}' lists unknown friend '{}'",
                        record.name, friend
                    ),
                )
                .with_param("studentName", record.name.trim())
                .with_param("friendName", friend));
            }
        }
        if let Some(other) = record.listed_not_with() {
            if !names.contains(other) {
                return Err(EngineError::new(
                    ErrorCode::UnknownFriend,
                    format!(
                        "Student '{}' lists unknown not-with '{}'",
                        record.name, other
                    ),
                )
                .with_param("studentName", record.name.trim())
                .with_param("friendName", other));
            }
        }
    }
    Ok(())
}

fn check_no_isolated(roster: &Roster) -> Result<(), EngineError> {
    // Self-references and duplicates were removed during normalization;
    // a student whose list collapsed to nothing has degree zero here.
    let isolated: Vec<&str> = (0..roster.len())
        .filter(|&i| roster.degree(i) == 0)
        .map(|i| roster.student(i).name.as_str())
        .collect();
    if !isolated.is_empty() {
        warn!("isolated students after normalization: {:?}", isolated);
        return Err(EngineError::new(
            ErrorCode::IsolatedStudents,
            format!("Students with no valid friendships: {:?}", isolated),
        )
        .with_param("students", json!(isolated)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Gender, Grade};

    fn record(name: &str, friends: &[&str]) -> StudentRecord {
        StudentRecord {
            name: name.to_string(),
            school: String::new(),
            gender: Some(Gender::FEMALE),
            academic_performance: Some(Grade::MEDIUM),
            behavioral_performance: Some(Grade::MEDIUM),
            comments: String::new(),
            friend1: friends.first().map(|f| f.to_string()),
            friend2: friends.get(1).map(|f| f.to_string()),
            friend3: friends.get(2).map(|f| f.to_string()),
            friend4: friends.get(3).map(|f| f.to_string()),
            not_with: None,
            cluster_id: None,
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn pair() -> Vec<StudentRecord> {
        vec![
            record("Alice", &["Bob"]),
            record("Bob", &["Alice"]),
            record("Carol", &["Dan"]),
            record("Dan", &["Carol"]),
        ]
    }

    #[test]
    fn accepts_valid_roster() {
        let roster = validate(&pair(), 2, &config()).unwrap();
        assert_eq!(roster.len(), 4);
    }

    #[test]
    fn rejects_empty_roster() {
        let err = validate(&[], 2, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::EmptyStudentData);
        assert_eq!(err.params["count"], 0);
    }

    #[test]
    fn rejects_missing_fields() {
        let mut records = pair();
        records[1].gender = None;
        records[2].name = "  ".to_string();
        let err = validate(&records, 2, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredFields);
        let fields = err.params["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f == "gender"));
        assert!(fields.iter().any(|f| f == "name"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut records = pair();
        records[2].name = "Alice".to_string();
        let err = validate(&records, 2, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateStudentNames);
        assert_eq!(err.params["duplicates"], json!(["Alice"]));
    }

    #[test]
    fn rejects_non_positive_class_count() {
        let err = validate(&pair(), 0, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidClassCount);
        let err = validate(&pair(), -3, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidClassCount);
    }

    #[test]
    fn rejects_more_classes_than_students() {
        let err = validate(&pair(), 5, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::TooManyClasses);
    }

    #[test]
    fn rejects_class_size_below_minimum() {
        // 4 students into 3 classes: floor(4/3) = 1 < default minimum 2.
        let err = validate(&pair(), 3, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ClassSizeTooSmall);
        assert_eq!(err.params["minSize"], 1);
    }

    #[test]
    fn min_class_size_is_configurable() {
        let mut relaxed = config();
        relaxed.min_class_size = 1;
        assert!(validate(&pair(), 3, &relaxed).is_ok());
    }

    #[test]
    fn rejects_student_with_no_friends() {
        let mut records = pair();
        records[3] = record("Dan", &[]);
        let err = validate(&records, 2, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::StudentNoFriends);
        assert_eq!(err.params["studentName"], "Dan");
    }

    #[test]
    fn rejects_unknown_friend() {
        let mut records = pair();
        records[0].friend2 = Some("Ghost".to_string());
        let err = validate(&records, 2, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownFriend);
        assert_eq!(err.params["studentName"], "Alice");
        assert_eq!(err.params["friendName"], "Ghost");
    }

    #[test]
    fn rejects_unknown_not_with() {
        let mut records = pair();
        records[0].not_with = Some("Ghost".to_string());
        let err = validate(&records, 2, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownFriend);
    }

    #[test]
    fn rejects_isolated_after_normalization() {
        // Dan lists only himself: survives the listed-friends check but has
        // degree zero once normalized.
        let mut records = pair();
        records[3] = record("Dan", &["Dan"]);
        records[2] = record("Carol", &["Alice"]);
        let err = validate(&records, 2, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::IsolatedStudents);
        assert_eq!(err.params["students"], json!(["Dan"]));
    }

    #[test]
    fn first_failing_check_wins() {
        // Both duplicates and an unknown friend: duplicates are checked first.
        let mut records = pair();
        records[2].name = "Alice".to_string();
        records[0].friend2 = Some("Ghost".to_string());
        let err = validate(&records, 2, &config()).unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateStudentNames);
    }
}
