/*!
Sliding window quality trimming for finished contigs.
Starting from each end, the trimmer looks for the first window whose mean quality reaches the threshold, then removes any low quality bases left at the outer edge of that window.
*/

use std::ops::Range;

use crate::assembler_config::TrimmingConfig;

/// Finds the high quality core of a quality string
#[derive(Clone, Debug, PartialEq)]
pub struct QualityTrimmer {
    average_quality_threshold: f32,
    window_size: usize
}

impl From<&TrimmingConfig> for QualityTrimmer {
    fn from(config: &TrimmingConfig) -> Self {
        QualityTrimmer::new(config.average_quality_threshold, config.window_size)
    }
}

impl QualityTrimmer {
    /// General constructor
    /// # Arguments
    /// * `average_quality_threshold` - minimum mean quality of a window
    /// * `window_size` - number of bases per window, values of 0 are treated as 1
    pub fn new(average_quality_threshold: f32, window_size: usize) -> QualityTrimmer {
        QualityTrimmer {
            average_quality_threshold,
            window_size: window_size.max(1)
        }
    }

    /// Returns the range to keep, or None if no window reaches the threshold.
    /// Sequences shorter than one window are judged as a single window.
    /// # Arguments
    /// * `qualities` - per-base qualities
    /// # Examples
    /// ```
    /// use clono_contig::quality_trimmer::QualityTrimmer;
    /// let trimmer = QualityTrimmer::new(20.0, 4);
    /// let qualities = [2, 2, 30, 30, 30, 30, 30, 30, 2];
    /// assert_eq!(trimmer.trim_range(&qualities), Some(2..8));
    /// ```
    pub fn trim_range(&self, qualities: &[u8]) -> Option<Range<usize>> {
        if qualities.is_empty() {
            return None;
        }
        let threshold = self.average_quality_threshold as f64;
        let window = self.window_size.min(qualities.len());
        let passes = |start: usize| -> bool {
            let sum: u64 = qualities[start..start + window].iter().map(|&q| q as u64).sum();
            sum as f64 / window as f64 >= threshold
        };

        let num_windows = qualities.len() - window + 1;
        let first_window = (0..num_windows).find(|&s| passes(s))?;
        let last_window = (0..num_windows).rev().find(|&s| passes(s))?;

        // shave weak bases off the outer edges of the passing windows
        let mut start = first_window;
        let mut end = last_window + window;
        while start < end && (qualities[start] as f64) < threshold {
            start += 1;
        }
        while end > start && (qualities[end - 1] as f64) < threshold {
            end -= 1;
        }

        if start < end {
            Some(start..end)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_trimming_needed() {
        let trimmer = QualityTrimmer::new(20.0, 8);
        assert_eq!(trimmer.trim_range(&[30; 50]), Some(0..50));
    }

    #[test]
    fn test_trim_both_ends() {
        let trimmer = QualityTrimmer::new(20.0, 4);
        let mut qualities = vec![5; 6];
        qualities.extend(vec![35; 20]);
        qualities.extend(vec![5; 3]);
        assert_eq!(trimmer.trim_range(&qualities), Some(6..26));
    }

    #[test]
    fn test_interior_dip_is_kept() {
        // a single ambiguous base in the middle does not split the contig
        let trimmer = QualityTrimmer::new(20.0, 8);
        let mut qualities = vec![30; 40];
        qualities[20] = 0;
        assert_eq!(trimmer.trim_range(&qualities), Some(0..40));
    }

    #[test]
    fn test_short_and_failing() {
        let trimmer = QualityTrimmer::new(20.0, 8);
        assert_eq!(trimmer.trim_range(&[]), None);
        assert_eq!(trimmer.trim_range(&[30, 30, 30]), Some(0..3));
        assert_eq!(trimmer.trim_range(&[10; 30]), None);
    }

    #[test]
    fn test_from_config() {
        let trimmer = QualityTrimmer::from(&TrimmingConfig::default());
        assert_eq!(trimmer, QualityTrimmer::new(20.0, 8));
    }
}
