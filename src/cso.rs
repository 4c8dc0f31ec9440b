use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use itertools::Itertools;
use log::{debug, info, trace};
use std::time::Instant;

use crate::config::Weights;
use crate::data::{Assignment, Gender, Roster, StudentIdx};
use crate::error::{EngineError, ErrorCode};

/// Solves the assignment as an integer program under a wall-clock
/// deadline. Hard constraints are strict; the weighted soft objective is
/// optimal or near-optimal depending on how far the solver gets before
/// the deadline.
pub fn solve(
    roster: &Roster,
    num_classes: usize,
    timeout_seconds: u64,
    weights: &Weights,
) -> Result<Assignment, EngineError> {
    let start_time = Instant::now();
    let n = roster.len();
    let floor_size = n / num_classes;
    let ceil_size = n.div_ceil(num_classes);

    // Friendship edges, each once (smaller index first).
    let edges: Vec<(StudentIdx, StudentIdx)> = (0..n)
        .flat_map(|i| {
            roster
                .neighbors(i)
                .into_iter()
                .filter(move |&j| j > i)
                .map(move |j| (i, j))
        })
        .collect();

    info!(
        "setting up assignment model: {} students, {} classes, {} friendships, {} separations",
        n,
        num_classes,
        edges.len(),
        roster.separations().len()
    );

    let mut problem = ProblemVariables::new();

    // x[i][k] = 1 if student i is in class k, 0 otherwise
    let x: Vec<Vec<Variable>> = (0..n)
        .map(|_| problem.add_vector(variable().binary(), num_classes))
        .collect();

    // co[e][k] = 1 iff both endpoints of friendship e share class k
    let co: Vec<Vec<Variable>> = edges
        .iter()
        .map(|_| problem.add_vector(variable().binary(), num_classes))
        .collect();

    // Absolute-deviation variables for the balance terms.
    let gender_dev = problem.add_vector(variable().min(0.0), num_classes);
    let academic_dev: Vec<Vec<Variable>> = (0..3)
        .map(|_| problem.add_vector(variable().min(0.0), num_classes))
        .collect();
    let behavior_dev: Vec<Vec<Variable>> = (0..3)
        .map(|_| problem.add_vector(variable().min(0.0), num_classes))
        .collect();

    // A cluster containing a separation pair cannot be held together;
    // its cohesion is demoted to a penalized soft constraint.
    let mut hard_clusters: Vec<&Vec<StudentIdx>> = Vec::new();
    let mut soft_cluster_pairs: Vec<(StudentIdx, StudentIdx)> = Vec::new();
    for (&cluster_id, members) in roster.clusters() {
        if members.len() < 2 {
            continue;
        }
        let conflicted = members
            .iter()
            .tuple_combinations()
            .any(|(&a, &b)| roster.separated(a, b));
        if conflicted {
            debug!("cluster {} holds a separation pair, demoting cohesion to soft", cluster_id);
            for (&a, &b) in members.iter().tuple_combinations() {
                if !roster.separated(a, b) {
                    soft_cluster_pairs.push((a, b));
                }
            }
        } else {
            hard_clusters.push(members);
        }
    }
    let split = problem.add_vector(variable().min(0.0), soft_cluster_pairs.len());

    trace!(
        "model has {} assignment, {} co-assignment, {} split variables",
        n * num_classes,
        edges.len() * num_classes,
        split.len()
    );

    // Objective: weighted penalty sum, minimized. Friendship shortfall
    // counts unsatisfied endpoints; each co-assigned edge satisfies two.
    let satisfied: Expression = co.iter().flat_map(|per_class| per_class.iter().copied()).sum();
    let total_endpoints = 2.0 * edges.len() as f64;
    let mut objective: Expression = weights.w_f * ((-2.0) * satisfied + total_endpoints);

    let gender_deviation: Expression = gender_dev.iter().copied().sum();
    objective += weights.w_g * gender_deviation;
    let academic_deviation: Expression = academic_dev.iter().flatten().copied().sum();
    objective += weights.w_a * academic_deviation;
    let behavior_deviation: Expression = behavior_dev.iter().flatten().copied().sum();
    objective += weights.w_b * behavior_deviation;
    let split_total: Expression = split.iter().copied().sum();
    objective += weights.w_c * split_total;

    let mut model = problem
        .minimise(objective)
        .using(default_solver)
        .set_option("time_limit", timeout_seconds as f64)
        .set_option("threads", 1) // single thread for reproducibility
        .set_option("random_seed", 1234)
        .set_option("log_to_console", "false");

    // Exactly one class per student.
    for x_i in &x {
        let assigned: Expression = x_i.iter().copied().sum();
        model.add_constraint(constraint!(assigned == 1));
    }

    // Separated students never share a class.
    for &(a, b) in roster.separations() {
        for k in 0..num_classes {
            model.add_constraint(constraint!(x[a][k] + x[b][k] <= 1));
        }
    }

    // Friend-present, linearized: being in class k requires a neighbor
    // in class k.
    for i in 0..n {
        let neighbors = roster.neighbors(i);
        for k in 0..num_classes {
            let friends_in_class: Expression = neighbors.iter().map(|&j| x[j][k]).sum();
            model.add_constraint(constraint!(x[i][k] <= friends_in_class));
        }
    }

    // Class size band.
    for k in 0..num_classes {
        let class_size: Expression = (0..n).map(|i| x[i][k]).sum();
        model.add_constraint(constraint!(class_size.clone() >= floor_size as f64));
        model.add_constraint(constraint!(class_size <= ceil_size as f64));
    }

    // Cohesive clusters move as one.
    for members in &hard_clusters {
        let first = members[0];
        for &member in &members[1..] {
            for k in 0..num_classes {
                model.add_constraint(constraint!(x[first][k] - x[member][k] == 0));
            }
        }
    }

    // Split indicators for demoted clusters: forced to 1 when the pair
    // lands in different classes.
    for (pair_idx, &(a, b)) in soft_cluster_pairs.iter().enumerate() {
        for k in 0..num_classes {
            model.add_constraint(constraint!(split[pair_idx] - x[a][k] + x[b][k] >= 0));
            model.add_constraint(constraint!(split[pair_idx] - x[b][k] + x[a][k] >= 0));
        }
    }

    // Co-assignment linking.
    for (e, &(a, b)) in edges.iter().enumerate() {
        for k in 0..num_classes {
            model.add_constraint(constraint!(co[e][k] <= x[a][k]));
            model.add_constraint(constraint!(co[e][k] <= x[b][k]));
            model.add_constraint(constraint!(co[e][k] - x[a][k] - x[b][k] >= -1));
        }
    }

    // Balance deviations from the uniform expectation.
    let females: Vec<StudentIdx> = (0..n)
        .filter(|&i| roster.student(i).gender == Gender::FEMALE)
        .collect();
    let expected_female = females.len() as f64 / num_classes as f64;
    for k in 0..num_classes {
        let female_count: Expression = females.iter().map(|&i| x[i][k]).sum();
        model.add_constraint(constraint!(
            gender_dev[k] - female_count.clone() >= -expected_female
        ));
        model.add_constraint(constraint!(gender_dev[k] + female_count >= expected_female));
    }
    for level in 0..3 {
        let academic_members: Vec<StudentIdx> = (0..n)
            .filter(|&i| roster.student(i).academic.level_index() == level)
            .collect();
        let behavior_members: Vec<StudentIdx> = (0..n)
            .filter(|&i| roster.student(i).behavior.level_index() == level)
            .collect();
        let expected_academic = academic_members.len() as f64 / num_classes as f64;
        let expected_behavior = behavior_members.len() as f64 / num_classes as f64;
        for k in 0..num_classes {
            let academic_count: Expression = academic_members.iter().map(|&i| x[i][k]).sum();
            model.add_constraint(constraint!(
                academic_dev[level][k] - academic_count.clone() >= -expected_academic
            ));
            model.add_constraint(constraint!(
                academic_dev[level][k] + academic_count >= expected_academic
            ));
            let behavior_count: Expression = behavior_members.iter().map(|&i| x[i][k]).sum();
            model.add_constraint(constraint!(
                behavior_dev[level][k] - behavior_count.clone() >= -expected_behavior
            ));
            model.add_constraint(constraint!(
                behavior_dev[level][k] + behavior_count >= expected_behavior
            ));
        }
    }

    info!("starting optimizer with {}s deadline", timeout_seconds);
    let solution = match model.solve() {
        Ok(solution) => solution,
        Err(ResolutionError::Infeasible) => {
            return Err(EngineError::new(
                ErrorCode::NoSolutionFound,
                "No assignment satisfies the hard constraints",
            )
            .with_param("studentCount", n)
            .with_param("classCount", num_classes));
        }
        Err(err) => {
            let message = err.to_string();
            let code = if message.to_lowercase().contains("time") {
                ErrorCode::OptimizationTimeout
            } else {
                ErrorCode::AssignmentFailed
            };
            return Err(EngineError::new(
                code,
                format!("Optimizer failed: {}", message),
            ));
        }
    };
    info!("solution found in {:.2?}", start_time.elapsed());

    // Read the assignment back out of the relaxed values.
    let mut by_student = Vec::with_capacity(n);
    for (i, x_i) in x.iter().enumerate() {
        let class = x_i.iter().position(|&v| solution.value(v) > 0.9);
        match class {
            Some(k) => by_student.push(k),
            None => {
                return Err(EngineError::internal(format!(
                    "optimizer returned no class for student '{}'",
                    roster.student(i).name
                )))
            }
        }
    }

    Ok(Assignment::new(num_classes, by_student))
}
