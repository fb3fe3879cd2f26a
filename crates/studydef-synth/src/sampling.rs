//! Value samplers
//!
//! Every sampler draws from a caller-owned RNG so that a patient's values
//! depend only on that patient's stream.

use chrono::{Days, NaiveDate};
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::{Error as WeightError, WeightedIndex};

/// Steepness of the `exponential_increase` date curve
const EXPONENTIAL_RATE: f64 = 4.0;

/// Largest mean drawn in one multiplication pass; larger means are split
const POISSON_CHUNK: f64 = 30.0;

/// `(youngest, oldest, share)` age bands of a registered practice population
pub const POPULATION_AGE_BANDS: [(i64, i64, f64); 6] = [
    (0, 17, 0.21),
    (18, 29, 0.16),
    (30, 49, 0.27),
    (50, 64, 0.19),
    (65, 79, 0.12),
    (80, 104, 0.05),
];

fn span_days(earliest: NaiveDate, latest: NaiveDate) -> Option<u64> {
    u64::try_from((latest - earliest).num_days()).ok()
}

/// A date drawn uniformly from `[earliest, latest]`; `None` for an empty range
pub fn uniform_date<R: Rng + ?Sized>(rng: &mut R, earliest: NaiveDate, latest: NaiveDate) -> Option<NaiveDate> {
    let span = span_days(earliest, latest)?;
    earliest.checked_add_days(Days::new(rng.random_range(0..=span)))
}

/// A date from `[earliest, latest]` whose density grows toward `latest`
pub fn exponential_date<R: Rng + ?Sized>(
    rng: &mut R,
    earliest: NaiveDate,
    latest: NaiveDate,
) -> Option<NaiveDate> {
    let span = span_days(earliest, latest)?;
    let draw: f64 = rng.random();
    // Inverse CDF of a density proportional to exp(rate * x) on [0, 1)
    let fraction = (draw * EXPONENTIAL_RATE.exp_m1()).ln_1p() / EXPONENTIAL_RATE;
    let offset = ((fraction * (span + 1) as f64) as u64).min(span);
    earliest.checked_add_days(Days::new(offset))
}

/// A Poisson count with the given mean
pub fn poisson<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> i64 {
    let mut remaining = mean;
    let mut total = 0;
    while remaining > 0.0 {
        let chunk = remaining.min(POISSON_CHUNK);
        total += poisson_small(rng, chunk);
        remaining -= chunk;
    }
    total
}

fn poisson_small<R: Rng + ?Sized>(rng: &mut R, mean: f64) -> i64 {
    let limit = (-mean).exp();
    let mut count = 0;
    let mut product: f64 = rng.random();
    while product > limit {
        count += 1;
        product *= rng.random::<f64>();
    }
    count
}

/// An age in whole years following [`POPULATION_AGE_BANDS`]
pub fn population_age<R: Rng + ?Sized>(rng: &mut R) -> i64 {
    let mut draw: f64 = rng.random();
    for &(youngest, oldest, share) in &POPULATION_AGE_BANDS {
        if draw < share {
            return rng.random_range(youngest..=oldest);
        }
        draw -= share;
    }
    let (youngest, oldest, _) = POPULATION_AGE_BANDS[POPULATION_AGE_BANDS.len() - 1];
    rng.random_range(youngest..=oldest)
}

/// Weighted choice over category labels
#[derive(Debug, Clone)]
pub struct Categorical {
    labels: Vec<String>,
    index: WeightedIndex<f64>,
}

impl Categorical {
    pub fn new(ratios: &[(String, f64)]) -> Result<Self, WeightError> {
        let index = WeightedIndex::new(ratios.iter().map(|(_, ratio)| *ratio))?;
        Ok(Self {
            labels: ratios.iter().map(|(label, _)| label.clone()).collect(),
            index,
        })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.labels[self.index.sample(rng)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_empty_range_gives_no_date() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(uniform_date(&mut rng, date(2021, 6, 2), date(2021, 6, 1)), None);
        assert_eq!(exponential_date(&mut rng, date(2021, 6, 2), date(2021, 6, 1)), None);
        assert_eq!(
            uniform_date(&mut rng, date(2021, 6, 1), date(2021, 6, 1)),
            Some(date(2021, 6, 1))
        );
    }

    #[test]
    fn test_exponential_dates_skew_late() {
        let mut rng = StdRng::seed_from_u64(7);
        let (earliest, latest) = (date(2020, 1, 1), date(2020, 12, 31));
        let midpoint = date(2020, 7, 1);
        let late = (0..10_000)
            .filter_map(|_| exponential_date(&mut rng, earliest, latest))
            .filter(|d| *d >= midpoint)
            .count();
        // Expected share after the midpoint is e^2 / (e^2 + 1), about 0.88
        assert!(late > 8_300, "only {late} of 10000 dates were late");
    }

    #[test]
    fn test_poisson_mean() {
        let mut rng = StdRng::seed_from_u64(3);
        for mean in [0.5, 5.0, 75.0] {
            let total: i64 = (0..20_000).map(|_| poisson(&mut rng, mean)).sum();
            let observed = total as f64 / 20_000.0;
            assert!((observed - mean).abs() < mean * 0.05 + 0.05, "mean {mean}: observed {observed}");
        }
        assert_eq!(poisson(&mut rng, 0.0), 0);
    }

    #[test]
    fn test_category_ratios() {
        let mut rng = StdRng::seed_from_u64(11);
        let categorical = Categorical::new(&[("M".to_string(), 0.49), ("F".to_string(), 0.51)]).unwrap();
        let males = (0..20_000).filter(|_| categorical.sample(&mut rng) == "M").count();
        assert!((9_400..10_200).contains(&males), "{males} of 20000 were M");
    }

    #[test]
    fn test_age_bands_cover_unit_interval() {
        let total: f64 = POPULATION_AGE_BANDS.iter().map(|(_, _, share)| share).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_uniform_dates_stay_in_range(seed in any::<u64>(), start in 0i64..40_000, len in 0u64..3_000) {
            let earliest = date(1900, 1, 1) + chrono::Duration::days(start);
            let latest = earliest + Days::new(len);
            let mut rng = StdRng::seed_from_u64(seed);
            let drawn = uniform_date(&mut rng, earliest, latest).unwrap();
            prop_assert!(earliest <= drawn && drawn <= latest);
            let drawn = exponential_date(&mut rng, earliest, latest).unwrap();
            prop_assert!(earliest <= drawn && drawn <= latest);
        }

        #[test]
        fn prop_ages_are_plausible(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let age = population_age(&mut rng);
            prop_assert!((0..=104).contains(&age));
        }
    }
}
