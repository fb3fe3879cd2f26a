//! Generation settings

/// Run configuration for synthetic generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticConfig {
    /// Number of patients to generate
    pub population_size: usize,
    /// Base seed; a random one is drawn (and logged) when unset
    pub seed: Option<u64>,
    /// Drop generated patients outside the population filter
    pub apply_population: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            population_size: 1000,
            seed: None,
            apply_population: false,
        }
    }
}

impl SyntheticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_population(mut self, apply: bool) -> Self {
        self.apply_population = apply;
        self
    }
}
