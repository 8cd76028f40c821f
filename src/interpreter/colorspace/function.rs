//! Native tint transforms
//!
//! An exponential-interpolation function evaluated synchronously, the
//! counterpart of a PostScript tint procedure that has to be run on the
//! exec stack.

use crate::interpreter::errors::PsError;

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub domain: (f64, f64),
    pub c0: Vec<f64>,
    pub c1: Vec<f64>,
    pub exponent: f64,
}

impl Function {
    /// `y[j] = c0[j] + x^exponent * (c1[j] - c0[j])` over the domain `[0, 1]`
    pub fn exponential(c0: Vec<f64>, c1: Vec<f64>, exponent: f64) -> Result<Self, PsError> {
        if c0.len() != c1.len() || c0.is_empty() {
            return Err(PsError::RangeCheck);
        }
        Ok(Function {
            domain: (0.0, 1.0),
            c0,
            c1,
            exponent,
        })
    }

    pub fn inputs(&self) -> usize {
        1
    }

    pub fn outputs(&self) -> usize {
        self.c0.len()
    }

    pub fn evaluate(&self, inputs: &[f64]) -> Result<Vec<f64>, PsError> {
        let [x] = inputs else {
            return Err(PsError::RangeCheck);
        };
        let x = x.clamp(self.domain.0, self.domain.1);
        let t = x.powf(self.exponent);
        Ok(self
            .c0
            .iter()
            .zip(&self.c1)
            .map(|(a, b)| a + t * (b - a))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_function_interpolates() {
        let f = Function::exponential(vec![0.0, 1.0], vec![1.0, 0.0], 1.0).unwrap();
        assert_eq!(f.evaluate(&[0.25]).unwrap(), vec![0.25, 0.75]);
        assert_eq!(f.evaluate(&[2.0]).unwrap(), vec![1.0, 0.0]);
        assert_eq!(f.evaluate(&[0.1, 0.2]), Err(PsError::RangeCheck));
    }

    #[test]
    fn test_mismatched_bounds_rejected() {
        assert!(Function::exponential(vec![0.0], vec![1.0, 1.0], 1.0).is_err());
    }
}
