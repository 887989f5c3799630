//! Batch planning: decides which sample indices form the next batch.
//!
//! Workers share one planner behind a mutex and hold the lock only long
//! enough to take the next plan; fetching and decoding happen outside it.
//! Every plan has exactly `batch_size` indices. End-of-epoch leftovers are
//! carried, dropped or padded according to `Remainder`.
//!
//! Example, 5 samples, batch_size 2, no shuffle:
//!
//! ```text
//! Cycle + Carry : [0 1] [2 3] [4 0] [1 2] [3 4] ...
//! Cycle + Drop  : [0 1] [2 3] [0 1] [2 3] ...
//! Cycle + Pad   : [0 1] [2 3] [4 4] [0 1] ...
//! OneShot+Drop  : [0 1] [2 3] <end>
//! OneShot+Pad   : [0 1] [2 3] [4 4] <end>
//! ```

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::config::{EpochMode, PipelineConfig, Remainder};

pub(crate) struct BatchPlanner {
    batch_size:   usize,
    mode:         EpochMode,
    remainder:    Remainder,
    shuffle_seed: Option<u64>,
    epoch:        u64,
    position:     usize,
    order:        Vec<usize>,
    finished:     bool,
}

impl BatchPlanner {
    pub(crate) fn new(source_len: usize, config: &PipelineConfig) -> Self {
        let mut planner = Self {
            batch_size:   config.batch_size,
            mode:         config.mode,
            remainder:    config.remainder,
            shuffle_seed: config.shuffle_seed,
            epoch:        0,
            position:     0,
            order:        (0..source_len).collect(),
            finished:     false,
        };
        planner.reshuffle();
        planner
    }

    /// Current epoch (0-based)
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Indices of the next batch, or None once a one-shot pass is over.
    pub(crate) fn next_plan(&mut self) -> Option<Vec<usize>> {
        if self.finished || self.batch_size == 0 {
            return None;
        }
        let mut plan = Vec::with_capacity(self.batch_size);

        loop {
            while plan.len() < self.batch_size && self.position < self.order.len() {
                plan.push(self.order[self.position]);
                self.position += 1;
            }
            if plan.len() == self.batch_size {
                return Some(plan);
            }

            // The epoch ran out before the batch was full.
            match self.mode {
                EpochMode::OneShot => {
                    self.finished = true;
                    if plan.is_empty() || self.remainder != Remainder::Pad {
                        return None;
                    }
                    self.pad(&mut plan);
                    return Some(plan);
                }
                EpochMode::Cycle => {
                    if self.order.is_empty() {
                        self.finished = true;
                        return None;
                    }
                    self.start_next_epoch();
                    if plan.is_empty() {
                        continue;
                    }
                    match self.remainder {
                        Remainder::Carry => continue,
                        Remainder::Drop  => plan.clear(),
                        Remainder::Pad   => {
                            self.pad(&mut plan);
                            return Some(plan);
                        }
                    }
                }
            }
        }
    }

    fn pad(&self, plan: &mut Vec<usize>) {
        let filled = plan.len();
        let mut i = 0;
        while plan.len() < self.batch_size {
            let index = plan[i % filled];
            plan.push(index);
            i += 1;
        }
    }

    fn start_next_epoch(&mut self) {
        self.epoch += 1;
        self.position = 0;
        self.reshuffle();
        tracing::debug!("Batch planner starting epoch {}", self.epoch);
    }

    fn reshuffle(&mut self) {
        if let Some(seed) = self.shuffle_seed {
            self.order.sort_unstable();
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(self.epoch));
            self.order.shuffle(&mut rng);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plans(planner: &mut BatchPlanner, n: usize) -> Vec<Vec<usize>> {
        (0..n).filter_map(|_| planner.next_plan()).collect()
    }

    #[test]
    fn test_cycle_carry_wraps_into_next_epoch() {
        let mut p = BatchPlanner::new(5, &PipelineConfig::new(2, 2));
        assert_eq!(
            plans(&mut p, 4),
            vec![vec![0, 1], vec![2, 3], vec![4, 0], vec![1, 2]]
        );
        assert_eq!(p.epoch(), 1);
    }

    #[test]
    fn test_cycle_drop_discards_remainder() {
        let cfg = PipelineConfig::new(2, 2).with_remainder(Remainder::Drop);
        let mut p = BatchPlanner::new(5, &cfg);
        assert_eq!(
            plans(&mut p, 3),
            vec![vec![0, 1], vec![2, 3], vec![0, 1]]
        );
    }

    #[test]
    fn test_cycle_pad_repeats_leading_samples() {
        let cfg = PipelineConfig::new(3, 3).with_remainder(Remainder::Pad);
        let mut p = BatchPlanner::new(4, &cfg);
        assert_eq!(
            plans(&mut p, 3),
            vec![vec![0, 1, 2], vec![3, 3, 3], vec![0, 1, 2]]
        );
    }

    #[test]
    fn test_one_shot_drop_ends_after_full_batches() {
        let mut p = BatchPlanner::new(5, &PipelineConfig::one_shot(2, 2));
        assert_eq!(plans(&mut p, 10), vec![vec![0, 1], vec![2, 3]]);
        assert!(p.next_plan().is_none());
    }

    #[test]
    fn test_one_shot_pad_emits_padded_final_batch() {
        let cfg = PipelineConfig::one_shot(4, 4).with_remainder(Remainder::Pad);
        let mut p = BatchPlanner::new(6, &cfg);
        assert_eq!(plans(&mut p, 10), vec![vec![0, 1, 2, 3], vec![4, 5, 4, 5]]);
    }

    #[test]
    fn test_one_shot_exact_multiple() {
        let mut p = BatchPlanner::new(6, &PipelineConfig::one_shot(3, 3));
        assert_eq!(plans(&mut p, 10).len(), 2);
    }

    #[test]
    fn test_every_plan_is_full() {
        let cfg = PipelineConfig::new(7, 7).with_shuffle(3);
        let mut p = BatchPlanner::new(23, &cfg);
        for plan in plans(&mut p, 50) {
            assert_eq!(plan.len(), 7);
            assert!(plan.iter().all(|&i| i < 23));
        }
    }

    #[test]
    fn test_shuffle_is_a_permutation_and_reproducible() {
        let cfg = PipelineConfig::one_shot(10, 10).with_shuffle(42);
        let first: Vec<usize> = plans(&mut BatchPlanner::new(10, &cfg), 1).concat();
        let again: Vec<usize> = plans(&mut BatchPlanner::new(10, &cfg), 1).concat();
        assert_eq!(first, again);

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_one_shot_source() {
        let mut p = BatchPlanner::new(0, &PipelineConfig::one_shot(2, 2));
        assert!(p.next_plan().is_none());
    }
}
