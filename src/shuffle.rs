//! Persistent shuffle permutation over queue indices.
//!
//! A shuffle pass walks one Fisher–Yates permutation with a cursor instead of
//! rolling a random index per step, so every queued song is visited exactly once
//! per pass. Queue edits patch the permutation in place to keep the history that
//! was already played.

use rand::Rng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShuffleOrder {
    order: Vec<usize>,
    /// Slot of the song that is current in the pass. `None` means the pass
    /// has not started, or the entry at slot 0 was removed.
    cursor: Option<usize>,
}

impl ShuffleOrder {
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Queue index under the cursor.
    pub fn current(&self) -> Option<usize> {
        self.cursor.and_then(|slot| self.order.get(slot).copied())
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.cursor = None;
    }

    /// Builds a fresh permutation of `0..len`.
    ///
    /// With an anchor the anchored index is moved to slot 0 and the cursor
    /// points at it, so the rest of the pass lies ahead.
    pub fn generate<R: Rng + ?Sized>(&mut self, len: usize, anchor: Option<usize>, rng: &mut R) {
        self.order = (0..len).collect();
        self.order.shuffle(rng);
        self.cursor = None;

        if len == 0 {
            return;
        }
        if let Some(anchor) = anchor {
            match self.order.iter().position(|idx| *idx == anchor) {
                Some(slot) => self.order.swap(0, slot),
                None => self.order.insert(0, anchor),
            }
            self.cursor = Some(0);
        }
    }

    /// Points the cursor at `index`, regenerating around it when the index
    /// is not part of the current permutation.
    pub fn align<R: Rng + ?Sized>(&mut self, index: usize, len: usize, rng: &mut R) {
        match self.order.iter().position(|idx| *idx == index) {
            Some(slot) if self.order.len() == len => self.cursor = Some(slot),
            _ => {
                tracing::debug!(index, len, "regenerating shuffle order around manual pick");
                self.generate(len, Some(index), rng);
            }
        }
    }

    /// Moves the cursor one slot forward.
    ///
    /// Past the end a new pass is generated when `wrap` is set; otherwise the
    /// cursor stays put and `None` is returned.
    pub fn step_forward<R: Rng + ?Sized>(
        &mut self,
        wrap: bool,
        len: usize,
        rng: &mut R,
    ) -> Option<usize> {
        if self.order.len() != len {
            self.generate(len, None, rng);
        }
        if self.order.is_empty() {
            return None;
        }

        let next = self.cursor.map_or(0, |slot| slot + 1);
        if next < self.order.len() {
            self.cursor = Some(next);
        } else if wrap {
            tracing::debug!(len, "shuffle pass finished, starting a new one");
            self.generate(len, None, rng);
            self.cursor = Some(0);
        } else {
            return None;
        }
        self.current()
    }

    /// Moves the cursor one slot back; before the start a new pass is
    /// generated with the cursor on its last slot when `wrap` is set.
    pub fn step_back<R: Rng + ?Sized>(
        &mut self,
        wrap: bool,
        len: usize,
        rng: &mut R,
    ) -> Option<usize> {
        if self.order.len() != len {
            self.generate(len, None, rng);
        }
        if self.order.is_empty() {
            return None;
        }

        match self.cursor {
            Some(slot) if slot > 0 => self.cursor = Some(slot - 1),
            _ if wrap => {
                self.generate(len, None, rng);
                self.cursor = Some(self.order.len() - 1);
            }
            _ => return None,
        }
        self.current()
    }

    /// Registers a newly appended queue index somewhere in the unplayed part
    /// of the pass.
    pub fn insert_new<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) {
        self.order.push(index);
        let last = self.order.len() - 1;
        let remaining_start = self.cursor.map_or(0, |slot| slot + 1);
        if remaining_start < last {
            let target = rng.random_range(remaining_start..self.order.len());
            self.order.swap(last, target);
        }
    }

    /// Registers a newly appended queue index directly after the cursor.
    pub fn insert_next(&mut self, index: usize) {
        let slot = self.cursor.map_or(0, |slot| slot + 1).min(self.order.len());
        self.order.insert(slot, index);
    }

    /// Drops a removed queue index and shifts the indices above it down.
    pub fn remove(&mut self, index: usize) {
        if let Some(slot) = self.order.iter().position(|idx| *idx == index) {
            self.order.remove(slot);
            if let Some(cursor) = self.cursor
                && slot <= cursor
            {
                self.cursor = cursor.checked_sub(1);
            }
        }
        for idx in &mut self.order {
            if *idx > index {
                *idx -= 1;
            }
        }
        if self.order.is_empty() {
            self.cursor = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ShuffleOrder;
    use proptest::prop_assert;
    use proptest::prop_assert_eq;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::collections::HashSet;

    fn sorted(order: &[usize]) -> Vec<usize> {
        let mut values = order.to_vec();
        values.sort_unstable();
        values
    }

    #[test]
    fn anchored_generation_starts_the_pass_at_anchor() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut shuffle = ShuffleOrder::default();
        shuffle.generate(6, Some(4), &mut rng);

        assert_eq!(shuffle.cursor(), Some(0));
        assert_eq!(shuffle.current(), Some(4));
        assert_eq!(sorted(shuffle.as_slice()), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn step_forward_without_wrap_stops_at_end_and_keeps_cursor() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut shuffle = ShuffleOrder::default();
        shuffle.generate(3, Some(0), &mut rng);

        assert!(shuffle.step_forward(false, 3, &mut rng).is_some());
        assert!(shuffle.step_forward(false, 3, &mut rng).is_some());
        let before = shuffle.clone();
        assert_eq!(shuffle.step_forward(false, 3, &mut rng), None);
        assert_eq!(shuffle, before);
    }

    #[test]
    fn step_forward_with_wrap_starts_new_pass() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut shuffle = ShuffleOrder::default();
        shuffle.generate(3, Some(1), &mut rng);
        shuffle.step_forward(true, 3, &mut rng);
        shuffle.step_forward(true, 3, &mut rng);

        assert!(shuffle.step_forward(true, 3, &mut rng).is_some());
        assert_eq!(shuffle.cursor(), Some(0));
        assert_eq!(sorted(shuffle.as_slice()), vec![0, 1, 2]);
    }

    #[test]
    fn step_back_with_wrap_lands_on_last_slot() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut shuffle = ShuffleOrder::default();
        shuffle.generate(4, Some(2), &mut rng);

        assert!(shuffle.step_back(true, 4, &mut rng).is_some());
        assert_eq!(shuffle.cursor(), Some(3));
    }

    #[test]
    fn step_back_without_wrap_at_start_is_refused() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut shuffle = ShuffleOrder::default();
        shuffle.generate(4, Some(2), &mut rng);

        assert_eq!(shuffle.step_back(false, 4, &mut rng), None);
        assert_eq!(shuffle.current(), Some(2));
    }

    #[test]
    fn removal_before_cursor_keeps_cursor_on_same_song() {
        let mut shuffle = ShuffleOrder {
            order: vec![3, 0, 2, 1],
            cursor: Some(2),
        };
        shuffle.remove(0);

        assert_eq!(shuffle.as_slice(), &[2, 1, 0]);
        assert_eq!(shuffle.cursor(), Some(1));
        assert_eq!(shuffle.current(), Some(1));
    }

    #[test]
    fn removal_after_cursor_only_reindexes() {
        let mut shuffle = ShuffleOrder {
            order: vec![1, 3, 0, 2],
            cursor: Some(1),
        };
        shuffle.remove(2);

        assert_eq!(shuffle.as_slice(), &[1, 2, 0]);
        assert_eq!(shuffle.cursor(), Some(1));
    }

    #[test]
    fn removing_first_slot_under_cursor_rewinds_before_start() {
        let mut shuffle = ShuffleOrder {
            order: vec![2, 0, 1],
            cursor: Some(0),
        };
        shuffle.remove(2);

        assert_eq!(shuffle.cursor(), None);
        assert_eq!(shuffle.as_slice(), &[0, 1]);
    }

    #[test]
    fn new_entries_join_the_unplayed_part() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..50 {
            let mut shuffle = ShuffleOrder {
                order: vec![4, 1, 3, 0, 2],
                cursor: Some(2),
            };
            shuffle.insert_new(5, &mut rng);

            let slot = shuffle
                .as_slice()
                .iter()
                .position(|idx| *idx == 5)
                .expect("inserted");
            assert!(slot > 2);
            assert_eq!(&shuffle.as_slice()[..3], &[4, 1, 3]);
        }
    }

    #[test]
    fn insert_next_lands_right_after_cursor() {
        let mut shuffle = ShuffleOrder {
            order: vec![2, 0, 1],
            cursor: Some(1),
        };
        shuffle.insert_next(3);
        assert_eq!(shuffle.as_slice(), &[2, 0, 3, 1]);
        assert_eq!(shuffle.cursor(), Some(1));
    }

    proptest::proptest! {
        #[test]
        fn generated_order_is_a_permutation_positioned_at_anchor(
            len in 1usize..64,
            anchor in 0usize..64,
            seed in 0u64..1_000,
        ) {
            let anchor = anchor % len;
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut shuffle = ShuffleOrder::default();
            shuffle.generate(len, Some(anchor), &mut rng);

            prop_assert_eq!(sorted(shuffle.as_slice()), (0..len).collect::<Vec<_>>());
            prop_assert_eq!(shuffle.current(), Some(anchor));
        }

        #[test]
        fn one_pass_visits_every_index_once(len in 1usize..40, anchor in 0usize..40, seed in 0u64..1_000) {
            let anchor = anchor % len;
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut shuffle = ShuffleOrder::default();
            shuffle.generate(len, Some(anchor), &mut rng);

            let mut seen = HashSet::from([anchor]);
            while let Some(idx) = shuffle.step_forward(false, len, &mut rng) {
                prop_assert!(seen.insert(idx));
            }
            prop_assert_eq!(seen.len(), len);
        }

        #[test]
        fn edits_keep_a_permutation(
            ops in proptest::collection::vec((0u8..3, 0usize..32), 1..120),
            seed in 0u64..1_000,
        ) {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut len = 5usize;
            let mut shuffle = ShuffleOrder::default();
            shuffle.generate(len, Some(0), &mut rng);

            for (op, value) in ops {
                match op {
                    0 => {
                        shuffle.insert_new(len, &mut rng);
                        len += 1;
                    }
                    1 if len > 0 => {
                        shuffle.remove(value % len);
                        len -= 1;
                    }
                    _ => {
                        let _ = shuffle.step_forward(value % 2 == 0, len, &mut rng);
                    }
                }

                prop_assert_eq!(sorted(shuffle.as_slice()), (0..len).collect::<Vec<_>>());
                if let Some(cursor) = shuffle.cursor() {
                    prop_assert!(cursor < shuffle.len());
                }
            }
        }
    }
}
