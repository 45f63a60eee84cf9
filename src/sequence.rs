//! Stimulus sequence generation with a controlled rate of n-back matches.

use tracing::debug;

use crate::config::{check_match_ratio, Density, GameConfig};
use crate::error::Result;
use crate::random::RandomSource;

/// Values presented during one session, in order. Never mutated after generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusSequence {
    values: Vec<u32>,
    n_back: usize,
}

impl StimulusSequence {
    /// Wrap pre-built values, e.g. a replayed session.
    pub fn from_values(values: Vec<u32>, n_back: usize) -> Self {
        Self { values, n_back }
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<u32> {
        self.values.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn n_back(&self) -> usize {
        self.n_back
    }

    /// Positions that equal their n-back predecessor, planted or accidental.
    pub fn match_count(&self) -> usize {
        (self.n_back..self.values.len())
            .filter(|&i| self.values[i] == self.values[i - self.n_back])
            .count()
    }

    /// Achieved match ratio over the positions that can match at all.
    pub fn match_ratio(&self) -> f64 {
        let eligible = self.values.len().saturating_sub(self.n_back);
        if eligible == 0 {
            0.0
        } else {
            self.match_count() as f64 / eligible as f64
        }
    }
}

pub struct SequenceGenerator;

impl SequenceGenerator {
    pub fn generate<R: RandomSource + ?Sized>(
        config: &GameConfig,
        match_ratio: f64,
        random: &mut R,
    ) -> Result<StimulusSequence> {
        config.validate_shape()?;
        check_match_ratio(match_ratio)?;

        let n = config.n_back;
        let range = config.range_size();
        let mut values = Vec::with_capacity(config.event_count);

        for i in 0..config.event_count {
            let value = if i < n {
                random.next_below(range)
            } else {
                let previous = values[i - n];
                if random.next_unit() < match_ratio {
                    previous
                } else {
                    match config.density {
                        Density::Loose => random.next_below(range),
                        Density::Strict => {
                            // Draw from the range minus `previous`, then shift over the gap.
                            let v = random.next_below(range - 1);
                            if v >= previous {
                                v + 1
                            } else {
                                v
                            }
                        }
                    }
                }
            };
            values.push(value);
        }

        let sequence = StimulusSequence { values, n_back: n };
        debug!(
            "Generated {} stimuli (n={}, range={}, density={}): {} matches, ratio {:.2} (target {:.2})",
            sequence.len(),
            n,
            range,
            config.density,
            sequence.match_count(),
            sequence.match_ratio(),
            match_ratio
        );
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Modality;
    use crate::error::GameError;
    use crate::random::{ScriptedRandom, SeededRandom};

    fn config(n_back: usize, event_count: usize) -> GameConfig {
        GameConfig {
            n_back,
            event_count,
            interval_ms: 10,
            ..GameConfig::default()
        }
    }

    #[test]
    fn length_matches_event_count_and_values_in_range() {
        let mut rng = SeededRandom::from_seed(1);
        for event_count in [3, 10, 57] {
            let cfg = config(2, event_count);
            let seq = SequenceGenerator::generate(&cfg, 0.3, &mut rng).unwrap();
            assert_eq!(seq.len(), event_count);
            assert!(seq.values().iter().all(|&v| v < cfg.range_size()));
        }
    }

    #[test]
    fn scripted_source_plants_every_match() {
        let cfg = config(2, 5);
        let mut rng = ScriptedRandom::with_values(vec![3, 7]);
        let seq = SequenceGenerator::generate(&cfg, 1.0, &mut rng).unwrap();
        assert_eq!(seq.values(), &[3, 7, 3, 7, 3]);
        assert_eq!(seq.match_count(), 3);
        assert_eq!(seq.match_ratio(), 1.0);
    }

    #[test]
    fn zero_ratio_strict_never_matches() {
        let cfg = config(1, 200);
        let mut rng = SeededRandom::from_seed(99);
        let seq = SequenceGenerator::generate(&cfg, 0.0, &mut rng).unwrap();
        assert_eq!(seq.match_count(), 0);
    }

    #[test]
    fn strict_density_skips_over_previous_value() {
        // First draw 4, then a failed roll with draw 4 from the reduced range -> shifted to 5.
        let cfg = config(1, 3);
        let mut rng = ScriptedRandom::new(vec![4, 4, 2], vec![0.9]);
        let seq = SequenceGenerator::generate(&cfg, 0.5, &mut rng).unwrap();
        assert_eq!(seq.values(), &[4, 5, 2]);
    }

    #[test]
    fn strict_match_rate_tracks_target() {
        let cfg = config(2, 1000);
        let mut rng = SeededRandom::from_seed(2024);
        let mut matches = 0usize;
        let mut eligible = 0usize;
        for _ in 0..20 {
            let seq = SequenceGenerator::generate(&cfg, 0.3, &mut rng).unwrap();
            matches += seq.match_count();
            eligible += seq.len() - cfg.n_back;
        }
        let observed = matches as f64 / eligible as f64;
        assert!((observed - 0.3).abs() < 0.02, "observed ratio {observed}");
    }

    #[test]
    fn loose_match_rate_includes_accidental_matches() {
        let cfg = GameConfig {
            density: Density::Loose,
            ..config(2, 1000)
        };
        let mut rng = SeededRandom::from_seed(5);
        let mut matches = 0usize;
        let mut eligible = 0usize;
        for _ in 0..20 {
            let seq = SequenceGenerator::generate(&cfg, 0.3, &mut rng).unwrap();
            matches += seq.match_count();
            eligible += seq.len() - cfg.n_back;
        }
        let expected = 0.3 + 0.7 / 9.0;
        let observed = matches as f64 / eligible as f64;
        assert!((observed - expected).abs() < 0.02, "observed ratio {observed}");
    }

    #[test]
    fn same_seed_same_sequence() {
        let cfg = config(2, 30);
        let a = SequenceGenerator::generate(&cfg, 0.3, &mut SeededRandom::from_seed(11)).unwrap();
        let b = SequenceGenerator::generate(&cfg, 0.3, &mut SeededRandom::from_seed(11)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let mut rng = SeededRandom::from_seed(0);
        let cases = [
            config(5, 5),
            config(6, 5),
            config(1, 0),
            GameConfig {
                grid_size: 1,
                ..config(1, 5)
            },
            GameConfig {
                modality: Modality::Audio,
                sound_count: 0,
                ..config(1, 5)
            },
        ];
        for cfg in cases {
            assert!(matches!(
                SequenceGenerator::generate(&cfg, 0.3, &mut rng),
                Err(GameError::InvalidConfiguration(_))
            ));
        }
        assert!(matches!(
            SequenceGenerator::generate(&config(1, 5), 1.2, &mut rng),
            Err(GameError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn explicit_match_ratio_overrides_config_ratio() {
        let mut rng = SeededRandom::from_seed(4);
        let cfg = GameConfig {
            match_ratio: 2.0,
            ..config(2, 20)
        };
        let seq = SequenceGenerator::generate(&cfg, 1.0, &mut rng).unwrap();
        assert_eq!(seq.len(), 20);
        assert_eq!(seq.match_ratio(), 1.0);
    }

    #[test]
    fn match_ratio_of_short_sequence_is_zero() {
        let seq = StimulusSequence::from_values(vec![1], 2);
        assert_eq!(seq.match_ratio(), 0.0);
    }
}
