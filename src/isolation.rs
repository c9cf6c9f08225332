//! Isolation forest: random axis-aligned partitioning trees. Points that are
//! isolated after few splits score close to 1, typical points around 0.5.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detectors::outlier::{FeatureVector, OutlierModel};
use crate::error::FitError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub trees: usize,
    pub sample_size: usize,
    pub seed: u64,
    pub budget: Option<Duration>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    params: ForestParams,
    trees: Vec<Node>,
    normalizer: f64,
}

impl IsolationForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            normalizer: 0.0,
        }
    }

    fn build(
        samples: &[FeatureVector],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> Node {
        if depth >= max_depth || indices.len() <= 1 {
            return Node::Leaf {
                size: indices.len(),
            };
        }

        let splittable: Vec<(usize, f64, f64)> = (0..samples[0].len())
            .filter_map(|feature| {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), i| {
                    let value = samples[*i][feature];
                    (lo.min(value), hi.max(value))
                });
                (lo < hi).then_some((feature, lo, hi))
            })
            .collect();

        if splittable.is_empty() {
            return Node::Leaf {
                size: indices.len(),
            };
        }

        let (feature, lo, hi) = splittable[rng.gen_range(0..splittable.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|i| samples[*i][feature] < threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(Self::build(samples, left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build(samples, right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(node: &Node, sample: &FeatureVector, depth: f64) -> f64 {
        match node {
            Node::Leaf { size } => depth + average_path_length(*size),
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                let next = if sample[*feature] < *threshold { left } else { right };
                Self::path_length(next, sample, depth + 1.0)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl OutlierModel for IsolationForest {
    fn fit(&mut self, samples: &[FeatureVector]) -> Result<(), FitError> {
        if samples.len() < 2 {
            return Err(FitError::InsufficientSamples {
                have: samples.len(),
                need: 2,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let subsample = self.params.sample_size.min(samples.len());
        let max_depth = (subsample as f64).log2().ceil() as usize;
        let started = Instant::now();

        self.trees.clear();
        for built in 0..self.params.trees {
            if let Some(budget) = self.params.budget {
                if started.elapsed() >= budget {
                    self.trees.clear();
                    return Err(FitError::BudgetExceeded {
                        budget_ms: budget.as_millis() as u64,
                        trees_built: built,
                    });
                }
            }
            let indices = rand::seq::index::sample(&mut rng, samples.len(), subsample).into_vec();
            self.trees
                .push(Self::build(samples, indices, 0, max_depth, &mut rng));
        }

        self.normalizer = average_path_length(subsample);
        Ok(())
    }

    fn score(&self, sample: &FeatureVector) -> f64 {
        if self.trees.is_empty() || self.normalizer <= 0.0 {
            return 0.5;
        }
        let mean_path = self
            .trees
            .iter()
            .map(|tree| Self::path_length(tree, sample, 0.0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_path / self.normalizer)
    }
}
