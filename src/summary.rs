use serde::Serialize;

use crate::data::{Assignment, Gender, Roster};

/// Per-class composition summary returned alongside the assignment.
/// Class numbers are 1-based on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub class_number: usize,
    pub students_count: usize,
    pub males_count: usize,
    pub average_academic_performance: f64,
    pub average_behavioural_performance: f64,
    pub without_friends: usize,
    pub unwanted_matches: usize,
}

pub fn class_summaries(roster: &Roster, assignment: &Assignment) -> Vec<ClassSummary> {
    assignment
        .classes()
        .iter()
        .enumerate()
        .map(|(class, members)| {
            let size = members.len();
            let males = members
                .iter()
                .filter(|&&m| roster.student(m).gender == Gender::MALE)
                .count();
            let academic: u32 = members.iter().map(|&m| roster.student(m).academic.score()).sum();
            let behavior: u32 = members.iter().map(|&m| roster.student(m).behavior.score()).sum();

            let without_friends = members
                .iter()
                .filter(|&&m| {
                    !roster
                        .neighbors(m)
                        .iter()
                        .any(|&f| assignment.class_of(f) == class)
                })
                .count();
            let unwanted_matches = members
                .iter()
                .filter(|&&m| {
                    members
                        .iter()
                        .any(|&other| other != m && roster.separated(m, other))
                })
                .count();

            ClassSummary {
                class_number: class + 1,
                students_count: size,
                males_count: males,
                average_academic_performance: if size > 0 {
                    academic as f64 / size as f64
                } else {
                    0.0
                },
                average_behavioural_performance: if size > 0 {
                    behavior as f64 / size as f64
                } else {
                    0.0
                },
                without_friends,
                unwanted_matches,
            }
        })
        .collect()
}
