//! Mixed-integer linear programs handed to an external solver.
//!
//! [`LinearProgram`] is a backend-neutral model: named columns with domains,
//! rows that are either two-sided ranges or implications
//! (`indicator = 1 => sum <= upper`), and a linear objective. [`LpSolver`]
//! is the seam to the backend; [`MicroLp`] solves through `good_lp` with the
//! pure-Rust `microlp` branch-and-bound solver, lowering implication rows to
//! big-M rows whose constant is derived from the column bounds.

use good_lp::solvers::microlp::microlp;
use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, SolverModel, Variable};

use crate::error::{Result, SearchError};
use crate::naming::VarNaming;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VarDomain {
    Continuous { lower: f64, upper: f64 },
    Binary,
}

impl VarDomain {
    pub fn bounds(self) -> (f64, f64) {
        match self {
            VarDomain::Continuous { lower, upper } => (lower, upper),
            VarDomain::Binary => (0.0, 1.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Row {
    /// `lower <= sum_j c_j x_j <= upper`; either side may be infinite.
    Range {
        terms: Vec<(usize, f64)>,
        lower: f64,
        upper: f64,
    },
    /// `indicator = 1 => sum_j c_j x_j <= upper`.
    Implication {
        indicator: usize,
        terms: Vec<(usize, f64)>,
        upper: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Maximize,
    Minimize,
}

#[derive(Clone, Debug)]
pub struct LinearProgram {
    direction: Direction,
    naming: VarNaming,
    domains: Vec<VarDomain>,
    objective: Vec<f64>,
    rows: Vec<Row>,
}

impl LinearProgram {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            naming: VarNaming::new(),
            domains: Vec::new(),
            objective: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Add a column; a name that is already registered keeps its column and
    /// domain.
    pub fn add_variable(&mut self, name: String, domain: VarDomain) -> usize {
        let index = self.naming.set_number(name);
        if index == self.domains.len() {
            self.domains.push(domain);
            self.objective.push(0.0);
        }
        index
    }

    pub fn var(&self, name: &str) -> Result<usize> {
        self.naming.number(name)
    }

    /// Accumulates into the objective coefficient of `var`.
    pub fn add_objective(&mut self, var: usize, coefficient: f64) {
        self.objective[var] += coefficient;
    }

    pub fn add_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn naming(&self) -> &VarNaming {
        &self.naming
    }

    pub fn domains(&self) -> &[VarDomain] {
        &self.domains
    }

    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn num_variables(&self) -> usize {
        self.domains.len()
    }

    /// Largest value `terms` can reach inside the column bounds.
    pub fn max_activity(&self, terms: &[(usize, f64)]) -> f64 {
        terms
            .iter()
            .map(|&(var, coefficient)| {
                let (lower, upper) = self.domains[var].bounds();
                if coefficient >= 0.0 {
                    coefficient * upper
                } else {
                    coefficient * lower
                }
            })
            .sum()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LpSolution {
    values: Vec<f64>,
    objective: f64,
}

impl LpSolution {
    pub fn new(values: Vec<f64>, objective: f64) -> Self {
        Self { values, objective }
    }

    pub fn value(&self, var: usize) -> f64 {
        self.values[var]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }
}

/// Backend able to solve a [`LinearProgram`] to optimality.
pub trait LpSolver {
    fn solve(&self, program: &LinearProgram) -> Result<LpSolution>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MicroLp;

fn affine(columns: &[Variable], terms: &[(usize, f64)]) -> Expression {
    terms
        .iter()
        .map(|&(var, coefficient)| coefficient * columns[var])
        .sum()
}

fn negated(terms: &[(usize, f64)]) -> Vec<(usize, f64)> {
    terms.iter().map(|&(var, c)| (var, -c)).collect()
}

impl LpSolver for MicroLp {
    fn solve(&self, program: &LinearProgram) -> Result<LpSolution> {
        let mut problem = ProblemVariables::new();
        let columns: Vec<Variable> = program
            .domains()
            .iter()
            .map(|domain| match *domain {
                VarDomain::Binary => problem.add(variable().binary()),
                VarDomain::Continuous { lower, upper } => {
                    let mut definition = variable();
                    if lower.is_finite() {
                        definition = definition.min(lower);
                    }
                    if upper.is_finite() {
                        definition = definition.max(upper);
                    }
                    problem.add(definition)
                }
            })
            .collect();

        let objective_terms: Vec<(usize, f64)> = program
            .objective()
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, c)| c != 0.0)
            .collect();
        let objective = affine(&columns, &objective_terms);
        let unsolved = match program.direction() {
            Direction::Maximize => problem.maximise(objective),
            Direction::Minimize => problem.minimise(objective),
        };
        let mut model = unsolved.using(microlp);

        for row in program.rows() {
            match row {
                Row::Range {
                    terms,
                    lower,
                    upper,
                } => {
                    if lower == upper {
                        model.add_constraint(constraint::eq(affine(&columns, terms), *upper));
                        continue;
                    }
                    if upper.is_finite() {
                        model.add_constraint(constraint::leq(affine(&columns, terms), *upper));
                    }
                    if lower.is_finite() {
                        model.add_constraint(constraint::leq(
                            affine(&columns, &negated(terms)),
                            -*lower,
                        ));
                    }
                }
                Row::Implication {
                    indicator,
                    terms,
                    upper,
                } => {
                    let slack = program.max_activity(terms) - upper;
                    if !slack.is_finite() {
                        return Err(SearchError::Solver(
                            "implication row over unbounded columns".to_string(),
                        ));
                    }
                    if slack <= 0.0 {
                        continue;
                    }
                    // sum + slack * indicator <= upper + slack
                    let expression = affine(&columns, terms) + slack * columns[*indicator];
                    model.add_constraint(constraint::leq(expression, upper + slack));
                }
            }
        }

        let solution = model
            .solve()
            .map_err(|err| SearchError::Solver(err.to_string()))?;
        let values: Vec<f64> = columns.iter().map(|&column| solution.value(column)).collect();
        let objective = program
            .objective()
            .iter()
            .zip(&values)
            .map(|(c, v)| c * v)
            .sum();
        Ok(LpSolution::new(values, objective))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_a_small_mixed_program() {
        // max x + 2y, x + y <= 1.5, y binary, x in [0, 1]
        let mut lp = LinearProgram::new(Direction::Maximize);
        let x = lp.add_variable("x".into(), VarDomain::Continuous { lower: 0.0, upper: 1.0 });
        let y = lp.add_variable("y".into(), VarDomain::Binary);
        lp.add_objective(x, 1.0);
        lp.add_objective(y, 2.0);
        lp.add_row(Row::Range {
            terms: vec![(x, 1.0), (y, 1.0)],
            lower: f64::NEG_INFINITY,
            upper: 1.5,
        });
        let solution = MicroLp.solve(&lp).unwrap();
        assert!((solution.value(y) - 1.0).abs() < 1e-6);
        assert!((solution.value(x) - 0.5).abs() < 1e-6);
        assert!((solution.objective() - 2.5).abs() < 1e-6);
    }

    #[test]
    fn implication_binds_only_when_indicator_is_set() {
        // max z, z <= 10; (b = 1 => z <= 3); b forced to 1
        let mut lp = LinearProgram::new(Direction::Maximize);
        let z = lp.add_variable("z".into(), VarDomain::Continuous { lower: 0.0, upper: 10.0 });
        let b = lp.add_variable("b".into(), VarDomain::Binary);
        lp.add_objective(z, 1.0);
        lp.add_row(Row::Implication {
            indicator: b,
            terms: vec![(z, 1.0)],
            upper: 3.0,
        });
        lp.add_row(Row::Range {
            terms: vec![(b, 1.0)],
            lower: 1.0,
            upper: 1.0,
        });
        let solution = MicroLp.solve(&lp).unwrap();
        assert!((solution.value(z) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn lower_sided_ranges_are_enforced() {
        let mut lp = LinearProgram::new(Direction::Minimize);
        let x = lp.add_variable("x".into(), VarDomain::Continuous { lower: 0.0, upper: 5.0 });
        lp.add_objective(x, 1.0);
        lp.add_row(Row::Range {
            terms: vec![(x, 2.0)],
            lower: 3.0,
            upper: f64::INFINITY,
        });
        let solution = MicroLp.solve(&lp).unwrap();
        assert!((solution.value(x) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn infeasible_programs_are_solver_errors() {
        let mut lp = LinearProgram::new(Direction::Maximize);
        let x = lp.add_variable("x".into(), VarDomain::Continuous { lower: 0.0, upper: 1.0 });
        lp.add_row(Row::Range {
            terms: vec![(x, 1.0)],
            lower: 2.0,
            upper: f64::INFINITY,
        });
        assert!(matches!(MicroLp.solve(&lp), Err(SearchError::Solver(_))));
    }

    #[test]
    fn duplicate_names_share_a_column() {
        let mut lp = LinearProgram::new(Direction::Maximize);
        let a = lp.add_variable("a".into(), VarDomain::Binary);
        let again = lp.add_variable("a".into(), VarDomain::Continuous { lower: 0.0, upper: 3.0 });
        assert_eq!(a, again);
        assert_eq!(lp.num_variables(), 1);
        assert_eq!(lp.domains()[0], VarDomain::Binary);
    }
}
