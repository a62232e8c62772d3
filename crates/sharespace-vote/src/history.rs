//! Rolling per-participant history of realized values

use std::collections::VecDeque;

/// Fixed-length value windows, newest first
#[derive(Clone, Debug, PartialEq)]
pub struct FairnessHistory {
    windows: Vec<VecDeque<f64>>,
    capacity: usize,
    seed: f64,
    /// Values evicted by an outstanding trial push
    trial: Option<Vec<Option<f64>>>,
}

impl FairnessHistory {
    pub fn new(capacity: usize, seed: f64) -> Self {
        FairnessHistory {
            windows: Vec::new(),
            capacity: capacity.max(1),
            seed,
            trial: None,
        }
    }

    pub fn num_participants(&self) -> usize {
        self.windows.len()
    }

    pub fn add_participant(&mut self) {
        self.windows.push(std::iter::repeat(self.seed).take(self.capacity).collect());
    }

    pub fn remove_participant(&mut self, participant: usize) {
        if participant < self.windows.len() {
            self.windows.remove(participant);
        }
    }

    /// Window of one participant, newest first
    pub fn window(&self, participant: usize) -> Option<&VecDeque<f64>> {
        self.windows.get(participant)
    }

    fn push_front(&mut self, values: &[f64]) -> Vec<Option<f64>> {
        self.windows
            .iter_mut()
            .enumerate()
            .map(|(p, window)| {
                window.push_front(values.get(p).copied().unwrap_or(0.0));
                if window.len() > self.capacity {
                    window.pop_back()
                } else {
                    None
                }
            })
            .collect()
    }

    /// Append realized values permanently
    pub fn push(&mut self, values: &[f64]) {
        self.undo_trial();
        self.push_front(values);
    }

    /// Append values tentatively; `undo_trial` restores the previous windows
    pub fn push_trial(&mut self, values: &[f64]) {
        self.undo_trial();
        let evicted = self.push_front(values);
        self.trial = Some(evicted);
    }

    pub fn undo_trial(&mut self) {
        let Some(evicted) = self.trial.take() else {
            return;
        };
        for (window, old) in self.windows.iter_mut().zip(evicted) {
            window.pop_front();
            if let Some(old) = old {
                window.push_back(old);
            }
        }
    }

    /// Rolling average of every participant
    pub fn averages(&self) -> Vec<f64> {
        self.windows
            .iter()
            .map(|w| if w.is_empty() { self.seed } else { w.iter().sum::<f64>() / w.len() as f64 })
            .collect()
    }

    /// Priority-weighted mean of the rolling averages and the weighted
    /// standard deviation of the averages around it
    pub fn weighted_spread(&self, priorities: &[f64]) -> (f64, f64) {
        let averages = self.averages();
        if averages.is_empty() {
            return (self.seed, 0.0);
        }
        let mut weights: Vec<f64> =
            (0..averages.len()).map(|p| priorities.get(p).copied().unwrap_or(1.0).max(0.0)).collect();
        let mut total: f64 = weights.iter().sum();
        if total <= f64::EPSILON {
            weights.iter_mut().for_each(|w| *w = 1.0);
            total = weights.len() as f64;
        }
        let mean = averages.iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>() / total;
        let variance = averages
            .iter()
            .zip(&weights)
            .map(|(a, w)| w * (a - mean) * (a - mean))
            .sum::<f64>()
            / total;
        (mean, variance.sqrt())
    }

    pub fn reset(&mut self) {
        let n = self.windows.len();
        self.windows.clear();
        self.trial = None;
        for _ in 0..n {
            self.add_participant();
        }
    }
}

impl Default for FairnessHistory {
    fn default() -> Self {
        FairnessHistory::new(5, 0.5)
    }
}
