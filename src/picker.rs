//! Weighted random sampling with replacement.

use rand::Rng;

use crate::error::PopulationError;

#[derive(Debug, Clone)]
pub struct WeightedPicker<T> {
    entries: Vec<(T, u32)>,
    total_weight: u64,
}

impl<T> WeightedPicker<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            total_weight: 0,
        }
    }

    /// Adds an item. Non-positive weights are rejected and `false` is returned.
    pub fn add(&mut self, item: T, weight: i32) -> bool {
        if weight <= 0 {
            return false;
        }
        let weight = weight as u32;
        self.total_weight += u64::from(weight);
        self.entries.push((item, weight));
        true
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(item, _)| item)
    }

    /// Draws one item proportionally to its weight without removing it.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&T, PopulationError> {
        if self.total_weight == 0 {
            return Err(PopulationError::EmptyPool);
        }
        let mut roll = rng.gen_range(0..self.total_weight);
        for (item, weight) in &self.entries {
            let weight = u64::from(*weight);
            if roll < weight {
                return Ok(item);
            }
            roll -= weight;
        }
        Err(PopulationError::EmptyPool)
    }
}

impl<T> Default for WeightedPicker<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn empty_picker_reports_empty_pool() {
        let picker: WeightedPicker<u32> = WeightedPicker::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(picker.pick(&mut rng), Err(PopulationError::EmptyPool));
    }

    #[test]
    fn non_positive_weights_are_rejected() {
        let mut picker = WeightedPicker::new();
        assert!(!picker.add("zero", 0));
        assert!(!picker.add("negative", -4));
        assert!(picker.is_empty());
        assert!(picker.add("one", 1));
        assert_eq!(picker.total_weight(), 1);
    }

    #[test]
    fn frequencies_converge_to_weights() {
        let mut picker = WeightedPicker::new();
        picker.add('a', 1);
        picker.add('b', 3);
        picker.add('c', 6);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let draws = 100_000;
        let mut counts = [0usize; 3];
        for _ in 0..draws {
            match picker.pick(&mut rng).unwrap() {
                'a' => counts[0] += 1,
                'b' => counts[1] += 1,
                _ => counts[2] += 1,
            }
        }
        for (count, expected) in counts.iter().zip([0.1, 0.3, 0.6]) {
            let observed = *count as f64 / draws as f64;
            assert!(
                (observed - expected).abs() < 0.01,
                "observed {observed} expected {expected}"
            );
        }
    }

    #[test]
    fn picks_are_with_replacement_and_deterministic() {
        let mut picker = WeightedPicker::new();
        picker.add(7u32, 5);
        picker.add(9u32, 5);
        let mut rng_a = ChaCha8Rng::seed_from_u64(99);
        let mut rng_b = ChaCha8Rng::seed_from_u64(99);
        let a: Vec<u32> = (0..64).map(|_| *picker.pick(&mut rng_a).unwrap()).collect();
        let b: Vec<u32> = (0..64).map(|_| *picker.pick(&mut rng_b).unwrap()).collect();
        assert_eq!(a, b, "same seed should reproduce the same draws");
        assert_eq!(picker.len(), 2);
        assert!(a.iter().filter(|v| **v == 7).count() > 1);
    }
}
