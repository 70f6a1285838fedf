// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Integer programs for the distance estimate.
//!
//! The heuristic produces covering systems: nonnegative integer variables
//! (one per operation, counting its calls), `>=`-constraints with
//! nonnegative coefficients, and the objective of minimizing the total call
//! count. [`minimize_calls`] solves them exactly by branch-and-bound. Zero
//! calls to every operation is feasible unless some constraint has no
//! positive coefficient at all, so infeasibility is reported, never
//! panicked on.

/// One `>=` constraint: `sum(coefficients[i] * x[i]) >= minimum`.
#[derive(Clone, Debug)]
pub struct Constraint {
    /// Per-variable coefficients, all nonnegative
    pub coefficients: Vec<u64>,
    /// The required lower bound
    pub minimum: u64,
}

/// A covering integer program.
#[derive(Clone, Debug, Default)]
pub struct Problem {
    /// Number of variables
    pub variables: usize,
    /// The constraints
    pub constraints: Vec<Constraint>,
}

/// The program has a constraint no variable can help satisfy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Infeasible;

/// An optimal solution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Solution {
    /// The minimal total call count
    pub objective: u64,
    /// An optimal per-variable assignment
    pub assignment: Vec<u64>,
}

/// Minimize the sum of all variables subject to the constraints.
pub fn minimize_calls(problem: &Problem) -> Result<Solution, Infeasible> {
    let active: Vec<&Constraint> = problem
        .constraints
        .iter()
        .filter(|c| c.minimum > 0)
        .collect();
    if active
        .iter()
        .any(|c| c.coefficients.iter().all(|&coefficient| coefficient == 0))
    {
        return Err(Infeasible);
    }
    if active.is_empty() {
        return Ok(Solution {
            objective: 0,
            assignment: vec![0; problem.variables],
        });
    }

    let mut search = Search {
        variables: problem.variables,
        constraints: &active,
        best: None,
    };
    let mut assignment = vec![0u64; problem.variables];
    let remaining: Vec<u64> = active.iter().map(|c| c.minimum).collect();
    search.explore(&mut assignment, remaining, 0);
    Ok(search.best.expect("a covering program with per-constraint coverage is satisfiable"))
}

struct Search<'a> {
    variables: usize,
    constraints: &'a [&'a Constraint],
    best: Option<Solution>,
}

impl Search<'_> {
    /// An admissible lower bound on the additional calls needed: each
    /// remaining constraint needs at least `ceil(rest / best coefficient)`
    /// calls on its own.
    fn lower_bound(&self, remaining: &[u64]) -> u64 {
        self.constraints
            .iter()
            .zip(remaining)
            .map(|(constraint, &rest)| {
                if rest == 0 {
                    return 0;
                }
                let best = constraint.coefficients.iter().copied().max().unwrap_or(0);
                rest.div_ceil(best)
            })
            .max()
            .unwrap_or(0)
    }

    fn explore(&mut self, assignment: &mut Vec<u64>, remaining: Vec<u64>, total: u64) {
        if let Some(best) = &self.best {
            if total + self.lower_bound(&remaining) >= best.objective {
                return;
            }
        }
        // find the first unsatisfied constraint and branch on the variables
        // that can cover it, largest coefficient first
        let Some(violated) = remaining.iter().position(|&rest| rest > 0) else {
            self.best = Some(Solution {
                objective: total,
                assignment: assignment.clone(),
            });
            return;
        };
        let mut candidates: Vec<usize> = (0..self.variables)
            .filter(|&v| self.constraints[violated].coefficients[v] > 0)
            .collect();
        candidates.sort_by_key(|&v| {
            std::cmp::Reverse(self.constraints[violated].coefficients[v])
        });
        for variable in candidates {
            assignment[variable] += 1;
            let next: Vec<u64> = self
                .constraints
                .iter()
                .zip(&remaining)
                .map(|(constraint, &rest)| {
                    rest.saturating_sub(constraint.coefficients[variable])
                })
                .collect();
            self.explore(assignment, next, total + 1);
            assignment[variable] -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem(variables: usize, constraints: &[(&[u64], u64)]) -> Problem {
        Problem {
            variables,
            constraints: constraints
                .iter()
                .map(|(coefficients, minimum)| Constraint {
                    coefficients: coefficients.to_vec(),
                    minimum: *minimum,
                })
                .collect(),
        }
    }

    #[test]
    fn test_empty_program_is_zero() {
        let solution = minimize_calls(&problem(3, &[])).unwrap();
        assert_eq!(solution.objective, 0);
    }

    #[test]
    fn test_single_constraint() {
        // one op flips one property per call, three flips needed
        let solution = minimize_calls(&problem(1, &[(&[1], 3)])).unwrap();
        assert_eq!(solution.objective, 3);
        assert_eq!(solution.assignment, vec![3]);
    }

    #[test]
    fn test_bulk_operation_dominates() {
        // op 0 flips one per call, op 1 flips 10_000 per call
        let solution = minimize_calls(&problem(2, &[(&[1, 10_000], 7)])).unwrap();
        assert_eq!(solution.objective, 1);
        assert_eq!(solution.assignment, vec![0, 1]);
    }

    #[test]
    fn test_constraints_combine() {
        // op 0 covers only the first constraint, op 1 only the second
        let solution =
            minimize_calls(&problem(2, &[(&[2, 0], 3), (&[0, 1], 2)])).unwrap();
        assert_eq!(solution.objective, 4);
        assert_eq!(solution.assignment, vec![2, 2]);
    }

    #[test]
    fn test_shared_variable_satisfies_both() {
        let solution =
            minimize_calls(&problem(2, &[(&[1, 1], 2), (&[1, 0], 1)])).unwrap();
        assert_eq!(solution.objective, 2);
    }

    #[test]
    fn test_infeasible_constraint() {
        assert_eq!(
            minimize_calls(&problem(2, &[(&[0, 0], 1)])),
            Err(Infeasible)
        );
    }
}
