/// Descriptive statistics summarizing a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptiveStats {
    /// The minimum value in the dataset.
    pub min: f64,
    /// The maximum value in the dataset.
    pub max: f64,
    /// The arithmetic mean.
    pub mean: f64,
    /// The population variance.
    pub variance: f64,
    /// The population standard deviation.
    pub std_dev: f64,
}

impl DescriptiveStats {
    /// Computes descriptive statistics over the given values.
    ///
    /// # Returns
    ///
    /// * `Some(DescriptiveStats)` - if the dataset contains at least one value
    /// * `None` - if the dataset is empty
    ///
    /// # Examples
    ///
    /// ```
    /// # use laminopt_stats::DescriptiveStats;
    /// let stats = DescriptiveStats::new([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
    /// assert_eq!(stats.mean, 5.0);
    /// assert_eq!(stats.std_dev, 2.0);
    /// assert_eq!(stats.min, 2.0);
    /// assert_eq!(stats.max, 9.0);
    /// ```
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let values: Vec<f64> = values.into_iter().collect();
        if values.is_empty() {
            return None;
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in &values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }

        #[expect(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = sum / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            min,
            max,
            mean,
            variance,
            std_dev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dataset() {
        assert_eq!(DescriptiveStats::new([]), None);
    }

    #[test]
    fn test_single_value() {
        let stats = DescriptiveStats::new([3.5]).unwrap();
        assert_eq!(stats.min, 3.5);
        assert_eq!(stats.max, 3.5);
        assert_eq!(stats.mean, 3.5);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_population_variance() {
        // Population (not sample) variance: denominator is n.
        let stats = DescriptiveStats::new([1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(stats.mean, 2.5);
        assert!((stats.variance - 1.25).abs() < 1e-12);
        assert!((stats.std_dev - 1.25_f64.sqrt()).abs() < 1e-12);
    }
}
