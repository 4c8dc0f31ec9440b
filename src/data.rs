use log::warn;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::EngineError;

// Type aliases for clarity
pub type StudentIdx = usize;
pub type ClassIdx = usize;
pub type ClusterId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Gender {
    MALE,
    FEMALE,
}

/// Academic or behavioural performance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Grade {
    LOW,
    MEDIUM,
    HIGH,
}

impl Grade {
    /// Numeric score used for class averages (LOW=1, MEDIUM=2, HIGH=3).
    pub fn score(&self) -> u32 {
        match self {
            Grade::LOW => 1,
            Grade::MEDIUM => 2,
            Grade::HIGH => 3,
        }
    }

    /// Dense index for per-level histograms.
    pub fn level_index(&self) -> usize {
        match self {
            Grade::LOW => 0,
            Grade::MEDIUM => 1,
            Grade::HIGH => 2,
        }
    }
}

/// A single student as received on the wire.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub school: String,
    pub gender: Option<Gender>,
    pub academic_performance: Option<Grade>,
    pub behavioral_performance: Option<Grade>,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub friend1: Option<String>,
    #[serde(default)]
    pub friend2: Option<String>,
    #[serde(default)]
    pub friend3: Option<String>,
    #[serde(default)]
    pub friend4: Option<String>,
    #[serde(default)]
    pub not_with: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<ClusterId>,
}

impl StudentRecord {
    /// Friend names as listed, trimmed, empties dropped. Order preserved.
    pub fn listed_friends(&self) -> Vec<&str> {
        [&self.friend1, &self.friend2, &self.friend3, &self.friend4]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    }

    pub fn listed_not_with(&self) -> Option<&str> {
        self.not_with
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// A validated, normalized student. Immutable for the duration of a call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub name: String,
    pub school: String,
    pub gender: Gender,
    pub academic: Grade,
    pub behavior: Grade,
    /// Normalized friend list: deduplicated, no self-references, every
    /// name present in the roster.
    pub friends: Vec<String>,
    pub not_with: Option<String>,
    pub cluster_id: Option<ClusterId>,
    pub comments: String,
}

/// The roster for one assignment call: students plus the derived indexes
/// (friendship graph, separation pairs, cluster groups). Rebuilt per
/// request, never mutated after construction.
#[derive(Debug)]
pub struct Roster {
    students: Vec<Student>,
    index: HashMap<String, StudentIdx>,
    graph: UnGraph<StudentIdx, ()>,
    separations: Vec<(StudentIdx, StudentIdx)>,
    clusters: BTreeMap<ClusterId, Vec<StudentIdx>>,
}

impl Roster {
    /// Build a roster from wire records, normalizing friend lists.
    ///
    /// Self-references and duplicate friend names are removed; names not
    /// present in the roster are dropped with a warning. Presence of the
    /// required fields is the validator's job; their absence here is a
    /// programmer error.
    pub fn from_records(records: &[StudentRecord]) -> Result<Roster, EngineError> {
        let index: HashMap<String, StudentIdx> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.trim().to_string(), i))
            .collect();

        let mut students = Vec::with_capacity(records.len());
        for record in records {
            let name = record.name.trim().to_string();
            let mut seen = BTreeSet::new();
            let mut friends = Vec::new();
            for friend in record.listed_friends() {
                if friend == name || !seen.insert(friend.to_string()) {
                    continue;
                }
                if !index.contains_key(friend) {
                    warn!("student '{}' lists unknown friend '{}', dropping", name, friend);
                    continue;
                }
                friends.push(friend.to_string());
            }

            let not_with = match record.listed_not_with() {
                Some(other) if other == name => None,
                Some(other) if !index.contains_key(other) => {
                    warn!("student '{}' lists unknown not-with '{}', dropping", name, other);
                    None
                }
                Some(other) => Some(other.to_string()),
                None => None,
            };

            students.push(Student {
                name: name.clone(),
                school: record.school.clone(),
                gender: required(record.gender, &name, "gender")?,
                academic: required(record.academic_performance, &name, "academicPerformance")?,
                behavior: required(record.behavioral_performance, &name, "behavioralPerformance")?,
                friends,
                not_with,
                cluster_id: record.cluster_id,
                comments: record.comments.clone(),
            });
        }

        Ok(Roster::from_students(students, index))
    }

    fn from_students(students: Vec<Student>, index: HashMap<String, StudentIdx>) -> Roster {
        // Symmetric closure: an edge exists iff either side lists the other.
        let mut graph = UnGraph::with_capacity(students.len(), students.len() * 2);
        for i in 0..students.len() {
            graph.add_node(i);
        }
        for (i, student) in students.iter().enumerate() {
            for friend in &student.friends {
                let j = index[friend];
                graph.update_edge(NodeIndex::new(i), NodeIndex::new(j), ());
            }
        }

        let mut pairs = BTreeSet::new();
        for (i, student) in students.iter().enumerate() {
            if let Some(other) = &student.not_with {
                let j = index[other];
                pairs.insert((i.min(j), i.max(j)));
            }
        }

        let mut clusters: BTreeMap<ClusterId, Vec<StudentIdx>> = BTreeMap::new();
        for (i, student) in students.iter().enumerate() {
            if let Some(cluster_id) = student.cluster_id {
                clusters.entry(cluster_id).or_default().push(i);
            }
        }

        Roster {
            students,
            index,
            graph,
            separations: pairs.into_iter().collect(),
            clusters,
        }
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn student(&self, i: StudentIdx) -> &Student {
        &self.students[i]
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn index_of(&self, name: &str) -> Option<StudentIdx> {
        self.index.get(name).copied()
    }

    /// Neighbors of a student in the friendship graph, ascending by index.
    pub fn neighbors(&self, i: StudentIdx) -> Vec<StudentIdx> {
        let mut out: Vec<StudentIdx> = self
            .graph
            .neighbors(NodeIndex::new(i))
            .map(|n| n.index())
            .collect();
        out.sort_unstable();
        out
    }

    pub fn degree(&self, i: StudentIdx) -> usize {
        self.graph.neighbors(NodeIndex::new(i)).count()
    }

    pub fn are_friends(&self, a: StudentIdx, b: StudentIdx) -> bool {
        self.graph
            .find_edge(NodeIndex::new(a), NodeIndex::new(b))
            .is_some()
    }

    /// Unordered separation pairs, each with the smaller index first.
    pub fn separations(&self) -> &[(StudentIdx, StudentIdx)] {
        &self.separations
    }

    pub fn separated(&self, a: StudentIdx, b: StudentIdx) -> bool {
        let key = (a.min(b), a.max(b));
        self.separations.contains(&key)
    }

    /// Cluster groups keyed by cluster id, ascending.
    pub fn clusters(&self) -> &BTreeMap<ClusterId, Vec<StudentIdx>> {
        &self.clusters
    }

    /// Connected-component label per student (labels are representatives,
    /// not dense).
    pub fn components(&self) -> Vec<usize> {
        let mut uf = UnionFind::new(self.students.len());
        for edge in self.graph.edge_references() {
            uf.union(edge.source().index(), edge.target().index());
        }
        (0..self.students.len()).map(|i| uf.find(i)).collect()
    }

    pub fn component_count(&self) -> usize {
        self.components().iter().collect::<BTreeSet<_>>().len()
    }
}

fn required<T>(value: Option<T>, name: &str, field: &str) -> Result<T, EngineError> {
    value.ok_or_else(|| {
        EngineError::internal(format!(
            "student '{}' is missing required field '{}'",
            name, field
        ))
    })
}

/// A total assignment of students to class indices in `[0, K)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    num_classes: usize,
    by_student: Vec<ClassIdx>,
}

impl Assignment {
    pub fn new(num_classes: usize, by_student: Vec<ClassIdx>) -> Assignment {
        debug_assert!(by_student.iter().all(|&c| c < num_classes));
        Assignment {
            num_classes,
            by_student,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn class_of(&self, i: StudentIdx) -> ClassIdx {
        self.by_student[i]
    }

    pub fn len(&self) -> usize {
        self.by_student.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_student.is_empty()
    }

    /// Members of one class, ascending by student index.
    pub fn members(&self, class: ClassIdx) -> Vec<StudentIdx> {
        self.by_student
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == class)
            .map(|(i, _)| i)
            .collect()
    }

    /// Per-class member lists, index `0..K`.
    pub fn classes(&self) -> Vec<Vec<StudentIdx>> {
        let mut classes = vec![Vec::new(); self.num_classes];
        for (i, &c) in self.by_student.iter().enumerate() {
            classes[c].push(i);
        }
        classes
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.num_classes];
        for &c in &self.by_student {
            sizes[c] += 1;
        }
        sizes
    }
}
