use log::{debug, trace, warn};
use std::cmp::Reverse;

use crate::data::{Assignment, ClassIdx, Gender, Roster, StudentIdx};
use crate::error::{EngineError, ErrorCode};

// Placement cost weights, matched to the evaluator's priorities: class
// size dominates, friends already present pull strongly.
const SIZE_WEIGHT: f64 = 2.0;
const FRIEND_BONUS: f64 = 4.0;
const MAX_GROUP_FRIENDS: usize = 2;
const IMPROVEMENT_PASSES: usize = 2;
const MAX_BALANCE_ITERATIONS: usize = 50;

/// Graph-driven greedy assignment: fast, feasible, best-effort on the
/// soft balance objectives.
pub fn solve(roster: &Roster, num_classes: usize) -> Result<Assignment, EngineError> {
    let mut state = GreedyState::new(roster, num_classes);
    debug!(
        "greedy: {} students, {} classes, {} friendship components",
        roster.len(),
        num_classes,
        roster.component_count()
    );

    state.place_clusters()?;
    state.place_remaining()?;
    state.fill_empty_classes();
    state.balance_sizes();
    state.improve_isolated();
    state.finish()
}

struct GreedyState<'a> {
    roster: &'a Roster,
    num_classes: usize,
    /// Soft cap on class size, relaxed only as a last resort.
    size_cap: usize,
    target_size: f64,
    roster_male_ratio: f64,
    roster_academic_avg: f64,
    roster_behavior_avg: f64,
    by_student: Vec<Option<ClassIdx>>,
    classes: Vec<ClassState>,
}

#[derive(Default, Clone)]
struct ClassState {
    members: Vec<StudentIdx>,
    males: usize,
    academic_total: u32,
    behavior_total: u32,
}

impl ClassState {
    fn size(&self) -> usize {
        self.members.len()
    }
}

impl<'a> GreedyState<'a> {
    fn new(roster: &'a Roster, num_classes: usize) -> GreedyState<'a> {
        let n = roster.len();
        let males = roster
            .students()
            .iter()
            .filter(|s| s.gender == Gender::MALE)
            .count();
        let academic: u32 = roster.students().iter().map(|s| s.academic.score()).sum();
        let behavior: u32 = roster.students().iter().map(|s| s.behavior.score()).sum();
        GreedyState {
            roster,
            num_classes,
            size_cap: n.div_ceil(num_classes) + 1,
            target_size: n as f64 / num_classes as f64,
            roster_male_ratio: males as f64 / n as f64,
            roster_academic_avg: academic as f64 / n as f64,
            roster_behavior_avg: behavior as f64 / n as f64,
            by_student: vec![None; n],
            classes: vec![ClassState::default(); num_classes],
        }
    }

    /// Non-singleton clusters go first, whole, to the cheapest class.
    /// A cluster containing a separation pair is split: the conflicting
    /// members fall back to the individual placement flow.
    fn place_clusters(&mut self) -> Result<(), EngineError> {
        for (&cluster_id, members) in self.roster.clusters() {
            if members.len() < 2 {
                continue;
            }
            let mut group: Vec<StudentIdx> = Vec::new();
            let mut split_off: Vec<StudentIdx> = Vec::new();
            for &member in members {
                if group.iter().any(|&g| self.roster.separated(g, member)) {
                    split_off.push(member);
                } else {
                    group.push(member);
                }
            }
            if !split_off.is_empty() {
                warn!(
                    "cluster {} contains separation pairs; splitting off {} of {} members",
                    cluster_id,
                    split_off.len(),
                    members.len()
                );
            }
            if group.len() >= 2 {
                self.place_group(&group)?;
            }
            // Split-off members and lone remainders are assigned later.
        }
        Ok(())
    }

    fn place_remaining(&mut self) -> Result<(), EngineError> {
        while let Some(next) = self.select_next() {
            let group = self.build_move_group(next);
            self.place_group(&group)?;
        }
        Ok(())
    }

    /// Students with the fewest still-unassigned friends first; ties go to
    /// the higher-degree student, then to the lexicographically smaller
    /// name, so runs are deterministic.
    fn select_next(&self) -> Option<StudentIdx> {
        (0..self.roster.len())
            .filter(|&i| self.by_student[i].is_none())
            .min_by_key(|&i| {
                let available = self
                    .roster
                    .neighbors(i)
                    .iter()
                    .filter(|&&f| self.by_student[f].is_none())
                    .count();
                (
                    available,
                    Reverse(self.roster.degree(i)),
                    self.roster.student(i).name.clone(),
                )
            })
    }

    /// The selected student plus up to two unassigned friends, preferring
    /// friends with the smallest remaining neighborhoods. Separation pairs
    /// never share a move group.
    fn build_move_group(&self, student: StudentIdx) -> Vec<StudentIdx> {
        let mut candidates: Vec<StudentIdx> = self
            .roster
            .neighbors(student)
            .into_iter()
            .filter(|&f| self.by_student[f].is_none())
            .collect();
        candidates.sort_by_key(|&f| {
            let available = self
                .roster
                .neighbors(f)
                .iter()
                .filter(|&&g| self.by_student[g].is_none())
                .count();
            (available, self.roster.student(f).name.clone())
        });

        let mut group = vec![student];
        for friend in candidates {
            if group.len() > MAX_GROUP_FRIENDS {
                break;
            }
            if group.iter().any(|&g| self.roster.separated(g, friend)) {
                continue;
            }
            group.push(friend);
        }
        group
    }

    fn place_group(&mut self, group: &[StudentIdx]) -> Result<(), EngineError> {
        // First pass honors the soft size cap; the second relaxes it.
        let choice = self
            .best_class(group, true)
            .or_else(|| self.best_class(group, false));
        if let Some(class) = choice {
            self.assign_all(group, class);
            return Ok(());
        }
        // Every class holds a separation partner of someone in the group.
        // Retry member by member before giving up.
        if group.len() > 1 {
            trace!("splitting move group of {} after placement failure", group.len());
            for &member in group {
                self.place_group(&[member])?;
            }
            return Ok(());
        }
        let unassigned = self.by_student.iter().filter(|c| c.is_none()).count();
        Err(EngineError::new(
            ErrorCode::AssignmentFailed,
            format!(
                "no feasible class for '{}' ({} unassigned, {} separation pairs)",
                self.roster.student(group[0]).name,
                unassigned,
                self.roster.separations().len()
            ),
        )
        .with_param("studentName", self.roster.student(group[0]).name.as_str())
        .with_param("unassignedCount", unassigned)
        .with_param("separationPairs", self.roster.separations().len()))
    }

    fn best_class(&self, group: &[StudentIdx], respect_cap: bool) -> Option<ClassIdx> {
        let mut best: Option<(f64, ClassIdx)> = None;
        for class in 0..self.num_classes {
            if respect_cap && self.classes[class].size() + group.len() > self.size_cap {
                continue;
            }
            if self.violates_separation(group, class) {
                continue;
            }
            let cost = self.placement_cost(group, class);
            if best.map_or(true, |(b, _)| cost < b) {
                best = Some((cost, class));
            }
        }
        best.map(|(_, class)| class)
    }

    fn violates_separation(&self, group: &[StudentIdx], class: ClassIdx) -> bool {
        group.iter().any(|&member| {
            self.classes[class]
                .members
                .iter()
                .any(|&other| self.roster.separated(member, other))
        })
    }

    /// Weighted placement cost: smaller classes and classes already
    /// holding friends of the group win; demographic drift loses.
    fn placement_cost(&self, group: &[StudentIdx], class: ClassIdx) -> f64 {
        let state = &self.classes[class];
        let new_size = state.size() + group.len();

        let friends_present: usize = group
            .iter()
            .map(|&member| {
                self.roster
                    .neighbors(member)
                    .iter()
                    .filter(|&&f| self.by_student[f] == Some(class))
                    .count()
            })
            .sum();

        let group_males = group
            .iter()
            .filter(|&&m| self.roster.student(m).gender == Gender::MALE)
            .count();
        let group_academic: u32 = group
            .iter()
            .map(|&m| self.roster.student(m).academic.score())
            .sum();
        let group_behavior: u32 = group
            .iter()
            .map(|&m| self.roster.student(m).behavior.score())
            .sum();

        let male_ratio = (state.males + group_males) as f64 / new_size as f64;
        let academic_avg = (state.academic_total + group_academic) as f64 / new_size as f64;
        let behavior_avg = (state.behavior_total + group_behavior) as f64 / new_size as f64;

        SIZE_WEIGHT * (new_size as f64 - self.target_size).abs()
            - FRIEND_BONUS * friends_present as f64
            + (male_ratio - self.roster_male_ratio).abs()
            + (academic_avg - self.roster_academic_avg).abs()
            + (behavior_avg - self.roster_behavior_avg).abs()
    }

    fn assign_all(&mut self, group: &[StudentIdx], class: ClassIdx) {
        for &member in group {
            let student = self.roster.student(member);
            self.by_student[member] = Some(class);
            let state = &mut self.classes[class];
            state.members.push(member);
            if student.gender == Gender::MALE {
                state.males += 1;
            }
            state.academic_total += student.academic.score();
            state.behavior_total += student.behavior.score();
        }
    }

    /// A class left empty gets a friend pair from the largest class, as
    /// long as the donors' remaining classmates keep a friend behind.
    fn fill_empty_classes(&mut self) {
        for class in 0..self.num_classes {
            if self.classes[class].size() > 0 {
                continue;
            }
            if let Some((a, b, donor)) = self.find_donor_pair(class) {
                debug!("moving friend pair into empty class {}", class);
                self.move_student(a, donor, class);
                self.move_student(b, donor, class);
            } else if let Some((student, donor)) = self.find_single_donor(class) {
                debug!("moving a friendless student into empty class {}", class);
                self.move_student(student, donor, class);
            } else {
                // No move fills the class without costing a satisfied
                // friendship; the empty class is the best effort here.
                warn!("class {} left empty", class);
            }
        }
    }

    fn find_donor_pair(&self, target: ClassIdx) -> Option<(StudentIdx, StudentIdx, ClassIdx)> {
        let mut donors: Vec<ClassIdx> = (0..self.num_classes)
            .filter(|&c| c != target && self.classes[c].size() > 2)
            .collect();
        donors.sort_by_key(|&c| Reverse(self.classes[c].size()));

        for donor in donors {
            let members = &self.classes[donor].members;
            for (ai, &a) in members.iter().enumerate() {
                if self.roster.student(a).cluster_id.is_some() {
                    continue;
                }
                for &b in members.iter().skip(ai + 1) {
                    if self.roster.student(b).cluster_id.is_some()
                        || !self.roster.are_friends(a, b)
                        || self.roster.separated(a, b)
                    {
                        continue;
                    }
                    if self.pair_is_safe_to_remove(a, b, donor) {
                        return Some((a, b, donor));
                    }
                }
            }
        }
        None
    }

    /// Last-resort donor: a student who is already friendless where they
    /// sit. Friendship is symmetric, so moving them severs nothing; any
    /// other mover would strictly reduce total friend satisfaction, which
    /// an empty class does not justify.
    fn find_single_donor(&self, target: ClassIdx) -> Option<(StudentIdx, ClassIdx)> {
        let mut donors: Vec<ClassIdx> = (0..self.num_classes)
            .filter(|&c| c != target && self.classes[c].size() >= 2)
            .collect();
        donors.sort_by_key(|&c| Reverse(self.classes[c].size()));

        for donor in donors {
            let pick = self.classes[donor]
                .members
                .iter()
                .copied()
                .filter(|&m| self.is_friendless(m))
                .min_by_key(|&m| {
                    (
                        self.roster.student(m).cluster_id.is_some(),
                        self.roster.student(m).name.clone(),
                    )
                });
            if let Some(student) = pick {
                return Some((student, donor));
            }
        }
        None
    }

    /// Removing `a` and `b` from `donor` must not leave any classmate
    /// friendless.
    fn pair_is_safe_to_remove(&self, a: StudentIdx, b: StudentIdx, donor: ClassIdx) -> bool {
        self.classes[donor]
            .members
            .iter()
            .filter(|&&m| m != a && m != b)
            .all(|&m| {
                self.roster
                    .neighbors(m)
                    .iter()
                    .any(|&f| f != a && f != b && self.by_student[f] == Some(donor))
            })
    }

    fn move_student(&mut self, student: StudentIdx, from: ClassIdx, to: ClassIdx) {
        let record = self.roster.student(student);
        let source = &mut self.classes[from];
        source.members.retain(|&m| m != student);
        if record.gender == Gender::MALE {
            source.males -= 1;
        }
        source.academic_total -= record.academic.score();
        source.behavior_total -= record.behavior.score();
        self.by_student[student] = Some(to);
        let dest = &mut self.classes[to];
        dest.members.push(student);
        if record.gender == Gender::MALE {
            dest.males += 1;
        }
        dest.academic_total += record.academic.score();
        dest.behavior_total += record.behavior.score();
    }

    /// Shrink the size spread by moving students from the largest class to
    /// the smallest until `max - min <= 2`. Movers keep the separation
    /// constraint and, when possible, their classmates' friendships intact.
    fn balance_sizes(&mut self) {
        for _ in 0..MAX_BALANCE_ITERATIONS {
            let sizes: Vec<usize> = self.classes.iter().map(ClassState::size).collect();
            let max_class = (0..self.num_classes)
                .max_by_key(|&c| sizes[c])
                .unwrap_or_default();
            let min_class = (0..self.num_classes)
                .min_by_key(|&c| sizes[c])
                .unwrap_or_default();
            if sizes[max_class] - sizes[min_class] <= 2 {
                break;
            }
            match self.pick_mover(max_class, min_class) {
                Some(student) => self.move_student(student, max_class, min_class),
                None => break,
            }
        }
    }

    fn pick_mover(&self, from: ClassIdx, to: ClassIdx) -> Option<StudentIdx> {
        let candidates: Vec<StudentIdx> = self.classes[from]
            .members
            .iter()
            .copied()
            .filter(|&m| !self.violates_separation(&[m], to))
            .collect();

        let friends_in_target = |m: StudentIdx| {
            self.roster
                .neighbors(m)
                .iter()
                .filter(|&&f| self.by_student[f] == Some(to))
                .count()
        };
        let safe_to_remove = |m: StudentIdx| {
            self.classes[from]
                .members
                .iter()
                .filter(|&&other| other != m)
                .all(|&other| {
                    !self.roster.are_friends(m, other)
                        || self
                            .roster
                            .neighbors(other)
                            .iter()
                            .any(|&f| f != m && self.by_student[f] == Some(from))
                })
        };

        // Prefer movers who land next to a friend and leave no one behind
        // friendless; fall back to any separation-safe mover.
        candidates
            .iter()
            .copied()
            .filter(|&m| {
                self.roster.student(m).cluster_id.is_none()
                    && friends_in_target(m) > 0
                    && safe_to_remove(m)
            })
            .max_by_key(|&m| {
                (
                    friends_in_target(m),
                    Reverse(self.roster.student(m).name.clone()),
                )
            })
            .or_else(|| {
                candidates.iter().copied().max_by_key(|&m| {
                    (
                        self.roster.student(m).cluster_id.is_none(),
                        safe_to_remove(m),
                        friends_in_target(m),
                        Reverse(self.roster.student(m).name.clone()),
                    )
                })
            })
    }

    /// Fixed-iteration swap repair: students with zero same-class friends
    /// trade places when the swap removes the isolation, creates no
    /// separation violation, and does not reduce the total number of
    /// satisfied friendships.
    fn improve_isolated(&mut self) {
        for _ in 0..IMPROVEMENT_PASSES {
            let mut changed = false;
            for student in 0..self.roster.len() {
                if !self.is_friendless(student) {
                    continue;
                }
                if let Some(partner) = self.find_swap_partner(student) {
                    if let (Some(from), Some(to)) =
                        (self.by_student[student], self.by_student[partner])
                    {
                        self.move_student(student, from, to);
                        self.move_student(partner, to, from);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn is_friendless(&self, student: StudentIdx) -> bool {
        let class = self.by_student[student];
        !self
            .roster
            .neighbors(student)
            .iter()
            .any(|&f| self.by_student[f] == class)
    }

    fn find_swap_partner(&self, student: StudentIdx) -> Option<StudentIdx> {
        let class = self.by_student[student]?;
        (0..self.roster.len()).find(|&partner| {
            let other = match self.by_student[partner] {
                Some(c) if c != class => c,
                _ => return false,
            };
            self.swap_is_acceptable(student, class, partner, other)
        })
    }

    fn swap_is_acceptable(
        &self,
        student: StudentIdx,
        class: ClassIdx,
        partner: StudentIdx,
        other: ClassIdx,
    ) -> bool {
        // The move must actually cure the isolation.
        let gains_friend = self
            .roster
            .neighbors(student)
            .iter()
            .any(|&f| f != partner && self.by_student[f] == Some(other));
        if !gains_friend {
            return false;
        }

        // No new separation violations in either direction.
        let separation_ok = |moved: StudentIdx, into: ClassIdx, leaving: StudentIdx| {
            !self.classes[into]
                .members
                .iter()
                .any(|&m| m != leaving && self.roster.separated(moved, m))
        };
        if !separation_ok(student, other, partner) || !separation_ok(partner, class, student) {
            return false;
        }

        // The isolation must not simply move onto the partner.
        let partner_keeps_friend = self.is_friendless(partner)
            || self
                .roster
                .neighbors(partner)
                .iter()
                .any(|&f| f != student && self.by_student[f] == Some(class));
        if !partner_keeps_friend {
            return false;
        }

        self.swap_satisfaction_delta(student, partner) >= 0
    }

    /// Change in satisfied friendship endpoints if `a` and `b` trade
    /// classes. Only edges incident to the pair can change.
    fn swap_satisfaction_delta(&self, a: StudentIdx, b: StudentIdx) -> isize {
        let class_a = self.by_student[a];
        let class_b = self.by_student[b];
        let mut delta = 0isize;
        for &f in &self.roster.neighbors(a) {
            if f == b {
                continue;
            }
            let here = &self.by_student[f];
            delta += (*here == class_b) as isize - (*here == class_a) as isize;
        }
        for &f in &self.roster.neighbors(b) {
            if f == a {
                continue;
            }
            let here = &self.by_student[f];
            delta += (*here == class_a) as isize - (*here == class_b) as isize;
        }
        delta
    }

    fn finish(self) -> Result<Assignment, EngineError> {
        let mut by_student = Vec::with_capacity(self.by_student.len());
        for (i, class) in self.by_student.iter().enumerate() {
            match class {
                Some(c) => by_student.push(*c),
                None => {
                    return Err(EngineError::internal(format!(
                        "student '{}' left unassigned",
                        self.roster.student(i).name
                    )))
                }
            }
        }
        Ok(Assignment::new(self.num_classes, by_student))
    }
}
