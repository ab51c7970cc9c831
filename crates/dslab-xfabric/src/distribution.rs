//! Empirical flow size distribution.

use std::path::Path;

use log::warn;
use rand::distributions::Distribution;
use rand::Rng;

use crate::error::FabricError;

/// Piecewise-linear distribution given by points of its cumulative distribution function.
///
/// Values are sampled by inverting the CDF with linear interpolation between neighboring points.
#[derive(Clone, Debug)]
pub struct EmpiricalDistribution {
    points: Vec<(f64, f64)>,
}

impl EmpiricalDistribution {
    /// Builds the distribution from `(value, cumulative probability)` points.
    ///
    /// Both coordinates must be non-decreasing. If the last probability is below 1, probabilities are
    /// rescaled so that it becomes 1.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, FabricError> {
        if points.is_empty() {
            return Err(FabricError::EmptyDistribution {
                reason: "no CDF points".to_string(),
            });
        }
        for (i, &(value, prob)) in points.iter().enumerate() {
            if !value.is_finite() || !(0. ..=1.).contains(&prob) {
                return Err(FabricError::InvalidDistribution {
                    reason: format!("point {} ({}, {}) is out of range", i, value, prob),
                });
            }
            if i > 0 {
                let (prev_value, prev_prob) = points[i - 1];
                if value < prev_value || prob < prev_prob {
                    return Err(FabricError::InvalidDistribution {
                        reason: format!("point {} ({}, {}) breaks monotonicity", i, value, prob),
                    });
                }
            }
        }
        let last_prob = points[points.len() - 1].1;
        if last_prob <= 0. {
            return Err(FabricError::EmptyDistribution {
                reason: "total probability is zero".to_string(),
            });
        }
        let mut points = points;
        if last_prob < 1. {
            warn!(target: "distribution", "CDF ends at {}, rescaling to 1", last_prob);
            for point in points.iter_mut() {
                point.1 /= last_prob;
            }
        }
        Ok(Self { points })
    }

    /// Parses the text CDF format: one `value <ignored> probability` triple per line.
    ///
    /// Lines with two columns are read as `value probability`. Empty lines and lines starting with `#`
    /// are skipped.
    pub fn parse(text: &str) -> Result<Self, FabricError> {
        let mut points = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let columns: Vec<&str> = line.split_whitespace().collect();
            let (value, prob) = match columns.as_slice() {
                [value, _, prob] | [value, prob] => (value.parse::<f64>(), prob.parse::<f64>()),
                _ => {
                    return Err(FabricError::InvalidDistribution {
                        reason: format!("line {}: expected 2 or 3 columns, got '{}'", line_no + 1, line),
                    })
                }
            };
            match (value, prob) {
                (Ok(value), Ok(prob)) => points.push((value, prob)),
                _ => {
                    return Err(FabricError::InvalidDistribution {
                        reason: format!("line {}: cannot parse '{}'", line_no + 1, line),
                    })
                }
            }
        }
        Self::new(points)
    }

    /// Reads the distribution from a CDF file, see [`parse`](Self::parse).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FabricError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| FabricError::EmptyDistribution {
            reason: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::parse(&text)
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Mean of the interpolated distribution.
    pub fn mean(&self) -> f64 {
        let (first_value, first_prob) = self.points[0];
        let mut mean = first_value * first_prob;
        for pair in self.points.windows(2) {
            let ((v1, p1), (v2, p2)) = (pair[0], pair[1]);
            mean += (v1 + v2) / 2. * (p2 - p1);
        }
        mean
    }

    /// Returns the value at cumulative probability `u`.
    pub fn quantile(&self, u: f64) -> f64 {
        let idx = self.points.partition_point(|&(_, prob)| prob < u);
        if idx == 0 {
            return self.points[0].0;
        }
        if idx == self.points.len() {
            return self.points[idx - 1].0;
        }
        let (v1, p1) = self.points[idx - 1];
        let (v2, p2) = self.points[idx];
        if p2 - p1 <= f64::EPSILON {
            return v2;
        }
        v1 + (u - p1) / (p2 - p1) * (v2 - v1)
    }
}

impl Distribution<f64> for EmpiricalDistribution {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.quantile(rng.gen_range(0.0..1.0))
    }
}
