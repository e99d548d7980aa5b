//! Token selection from postprocessed logits.
//!
//! Operates on raw slices; the random source is always supplied by the caller.

use rand::Rng;

use crate::api::error::{GenerateError, GenerateResult};
use crate::api::types::TokenId;

/// Index of the maximum value. Ties resolve to the lowest index; NaN never wins.
pub fn argmax(logits: &[f32]) -> TokenId {
    let mut best = 0usize;
    let mut max_val = f32::NEG_INFINITY;
    for (i, &v) in logits.iter().enumerate() {
        if v > max_val {
            max_val = v;
            best = i;
        }
    }
    best as TokenId
}

/// Numerically stable softmax of `logits / temperature`.
///
/// When the scaled values overflow (a vanishingly small temperature or huge
/// logits) the result is the limit distribution: all mass on the argmax.
pub fn softmax_with_temperature(logits: &[f32], temperature: f32) -> Vec<f32> {
    let inv_t = 1.0 / temperature;
    if !inv_t.is_finite() {
        return one_hot(logits);
    }
    let max_val = logits
        .iter()
        .map(|&v| v * inv_t)
        .fold(f32::NEG_INFINITY, f32::max);
    if !max_val.is_finite() {
        return one_hot(logits);
    }
    let exps: Vec<f32> = logits.iter().map(|&v| (v * inv_t - max_val).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        return one_hot(logits);
    }
    exps.iter().map(|&e| e / sum).collect()
}

fn one_hot(logits: &[f32]) -> Vec<f32> {
    let mut probs = vec![0.0; logits.len()];
    if let Some(p) = probs.get_mut(argmax(logits) as usize) {
        *p = 1.0;
    }
    probs
}

/// Draw one index from a normalized probability vector.
pub fn sample_categorical<R: Rng + ?Sized>(probs: &[f32], rng: &mut R) -> TokenId {
    let r: f32 = rng.r#gen();
    let mut cumsum = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumsum += p;
        if r < cumsum {
            return i as TokenId;
        }
    }
    // Rounding can leave cumsum just under 1.0; fall back to the last non-zero entry.
    probs
        .iter()
        .rposition(|&p| p > 0.0)
        .unwrap_or(probs.len() - 1) as TokenId
}

/// Greedy or temperature sampler.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    temperature: f32,
}

impl Sampler {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }

    pub fn sample<R: Rng + ?Sized>(&self, logits: &[f32], rng: &mut R) -> GenerateResult<TokenId> {
        if logits.is_empty() {
            return Err(GenerateError::EmptyDistribution);
        }
        if self.is_greedy() {
            return Ok(argmax(logits));
        }
        let probs = softmax_with_temperature(logits, self.temperature);
        Ok(sample_categorical(&probs, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[1.0, 3.0, 2.0]), 1);
        assert_eq!(argmax(&[5.0]), 0);
        assert_eq!(argmax(&[-1.0, -2.0, -0.5]), 2);
    }

    #[test]
    fn test_argmax_tie_takes_lowest_index() {
        assert_eq!(argmax(&[0.5, 2.0, 2.0, 1.0, 2.0]), 1);
    }

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[f32::NAN, 1.0, 0.5]), 1);
    }

    #[test]
    fn test_greedy_ignores_rng() {
        let sampler = Sampler::new(0.0);
        let logits = vec![0.1, 4.0, 4.0, -3.0];
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(sampler.sample(&logits, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_negative_temperature_is_greedy() {
        let sampler = Sampler::new(-1.0);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(sampler.sample(&[1.0, 9.0, 3.0], &mut rng).unwrap(), 1);
    }

    #[test]
    fn test_empty_distribution() {
        let mut rng = StdRng::seed_from_u64(0);
        for t in [0.0, 0.8] {
            let err = Sampler::new(t).sample(&[], &mut rng).unwrap_err();
            assert!(matches!(err, GenerateError::EmptyDistribution));
        }
    }

    #[test]
    fn test_softmax_is_normalized_and_stable() {
        let probs = softmax_with_temperature(&[1000.0, 1001.0, 999.0], 1.0);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(probs[1] > probs[0] && probs[0] > probs[2]);
    }

    #[test]
    fn test_low_temperature_sharpens() {
        let soft = softmax_with_temperature(&[1.0, 2.0], 1.0);
        let sharp = softmax_with_temperature(&[1.0, 2.0], 0.1);
        assert!(sharp[1] > soft[1]);
    }

    #[test]
    fn test_vanishing_temperature_picks_argmax() {
        let probs = softmax_with_temperature(&[0.0, 5.0, 1.0], 1e-40);
        assert_eq!(probs, vec![0.0, 1.0, 0.0]);

        let sampler = Sampler::new(1e-40);
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(sampler.sample(&[0.0, 5.0, 1.0], &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_overflowing_logits_pick_argmax() {
        let probs = softmax_with_temperature(&[f32::MAX, -f32::MAX, 1.0], 1e-3);
        assert_eq!(probs, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sample_categorical_deterministic() {
        let probs = vec![0.0, 1.0, 0.0];
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(sample_categorical(&probs, &mut rng), 1);
        }
    }

    #[test]
    fn test_seeded_sampling_reproducible() {
        let sampler = Sampler::new(0.9);
        let logits: Vec<f32> = (0..50).map(|i| (i as f32 * 0.37).sin()).collect();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            assert_eq!(
                sampler.sample(&logits, &mut a).unwrap(),
                sampler.sample(&logits, &mut b).unwrap()
            );
        }
    }
}
