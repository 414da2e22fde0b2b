//! Small linear-programming front end over `minilp`. Variables are addressed
//! by name, constraints are given as coefficient/variable lists.

use std::collections::{BTreeMap, HashMap};

use log::trace;
use minilp::{ComparisonOp, LinearExpr, Problem, Variable};

use crate::error::{CheckError, Result};
use crate::solver::OptimizationDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Less,
    Greater,
    Equal,
}

impl From<Relation> for ComparisonOp {
    fn from(r: Relation) -> Self {
        match r {
            Relation::Less => ComparisonOp::Le,
            Relation::Greater => ComparisonOp::Ge,
            Relation::Equal => ComparisonOp::Eq,
        }
    }
}

pub struct LpModel {
    problem: Problem,
    vars: HashMap<String, Variable>,
    constraint_count: usize,
}

#[derive(Debug, Clone)]
pub struct LpSolution {
    pub objective: f64,
    pub values: HashMap<String, f64>,
}

impl LpModel {
    pub fn new(direction: OptimizationDirection) -> LpModel {
        let dir = match direction {
            OptimizationDirection::Minimize => minilp::OptimizationDirection::Minimize,
            OptimizationDirection::Maximize => minilp::OptimizationDirection::Maximize,
        };
        LpModel { problem: Problem::new(dir), vars: HashMap::new(), constraint_count: 0 }
    }

    /// Adds a continuous variable with objective coefficient `obj`. `None`
    /// bounds are unbounded.
    pub fn add_var(&mut self, name: &str, obj: f64, lb: Option<f64>, ub: Option<f64>) -> Result<()> {
        if self.vars.contains_key(name) {
            return Err(CheckError::Lp(format!("variable {} declared twice", name)));
        }
        let var = self.problem.add_var(obj, (lb.unwrap_or(f64::NEG_INFINITY), ub.unwrap_or(f64::INFINITY)));
        self.vars.insert(name.to_string(), var);
        Ok(())
    }

    /// `sum coefs[i] * vars[i]  (<=|>=|=)  rhs`. Repeated variables are summed up.
    pub fn add_constr(&mut self, coefs: &[f64], vars: &[&str], relation: Relation, rhs: f64) -> Result<()> {
        let mut combined: BTreeMap<&str, f64> = BTreeMap::new();
        for (c, v) in coefs.iter().zip(vars.iter()) {
            *combined.entry(*v).or_insert(0.0) += c;
        }
        let mut expr = LinearExpr::empty();
        for (name, coef) in combined.into_iter() {
            let var = self
                .vars
                .get(name)
                .ok_or_else(|| CheckError::Lp(format!("unknown variable {}", name)))?;
            if coef != 0.0 {
                expr.add(*var, coef);
            }
        }
        self.problem.add_constraint(expr, relation.into(), rhs);
        self.constraint_count += 1;
        Ok(())
    }

    pub fn optimize(&self) -> Result<LpSolution> {
        trace!("Solving LP with {} variables and {} constraints", self.vars.len(), self.constraint_count);
        let solution = self.problem.solve()?;
        let values = self.vars.iter().map(|(name, var)| (name.clone(), solution[*var])).collect();
        Ok(LpSolution { objective: solution.objective(), values })
    }
}

impl LpSolution {
    pub fn value(&self, name: &str) -> Result<f64> {
        self.values.get(name).copied().ok_or_else(|| CheckError::Lp(format!("no value for variable {}", name)))
    }
}
