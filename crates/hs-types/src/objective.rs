//! Objective values and Pareto dominance (minimization).

use serde::{Deserialize, Serialize};

/// A measured objective: scalar, or an ordered tuple for multi-objective
/// searches. Lower is better in every dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Objective {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Objective {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Vector(_) => None,
        }
    }

    /// Number of objective dimensions.
    pub fn arity(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(v) => v.len(),
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }

    pub fn values(&self) -> &[f64] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::Vector(v) => v,
        }
    }

    /// Whether `other` can share a log with `self`.
    pub fn same_shape(&self, other: &Objective) -> bool {
        self.is_vector() == other.is_vector() && self.arity() == other.arity()
    }

    /// `self` dominates `other` iff it is no worse in every dimension and
    /// strictly better in at least one.
    pub fn dominates(&self, other: &Objective) -> bool {
        dominates(self.values(), other.values())
    }
}

impl From<f64> for Objective {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<Vec<f64>> for Objective {
    fn from(v: Vec<f64>) -> Self {
        Self::Vector(v)
    }
}

impl std::fmt::Display for Objective {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Vector(values) => {
                write!(f, "(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Pareto dominance for minimization over equal-length slices.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    debug_assert_eq!(a.len(), b.len());

    let mut strictly_better = false;
    for (&av, &bv) in a.iter().zip(b.iter()) {
        if av > bv {
            return false;
        }
        if av < bv {
            strictly_better = true;
        }
    }
    strictly_better
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominance_requires_strict_improvement() {
        assert!(dominates(&[2.0, 3.0], &[3.0, 3.0]));
        assert!(!dominates(&[2.0, 3.0], &[2.0, 3.0]));
        assert!(!dominates(&[1.0, 5.0], &[4.0, 1.0]));
        assert!(!dominates(&[4.0, 1.0], &[1.0, 5.0]));
    }

    #[test]
    fn shapes() {
        let s = Objective::from(1.0);
        let v = Objective::from(vec![1.0, 2.0]);
        assert_eq!(s.arity(), 1);
        assert_eq!(v.arity(), 2);
        assert!(!s.same_shape(&v));
        assert!(v.same_shape(&Objective::from(vec![0.0, 0.0])));
        assert!(!v.same_shape(&Objective::from(vec![0.0, 0.0, 0.0])));
    }

    #[test]
    fn untagged_serialization() {
        let s: Objective = serde_json::from_str("0.5").unwrap();
        assert_eq!(s, Objective::Scalar(0.5));
        let v: Objective = serde_json::from_str("[1, 2.5]").unwrap();
        assert_eq!(v, Objective::Vector(vec![1.0, 2.5]));
        assert_eq!(Objective::Vector(vec![1.0, 2.5]).to_string(), "(1, 2.5)");
    }
}
