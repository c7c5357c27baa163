//! Waveform summaries for the editor UI.
//!
//! The summary is a fixed-length sequence of normalized peak amplitudes
//! spanning the full duration. It is computed once from the analysis PCM
//! during segmentation and cached on the job; it never affects
//! segmentation or rendering.

/// Number of buckets in a waveform summary.
///
/// Fixed so the payload size does not depend on media duration.
pub const WAVEFORM_BUCKETS: usize = 1000;

/// Compute peak amplitudes over `buckets` equal spans of `samples`,
/// normalized so the loudest bucket is 1.0.
///
/// Values are rounded to 3 decimals for compact JSON.
pub fn compute_waveform(samples: &[f32], buckets: usize) -> Vec<f32> {
    if samples.is_empty() || buckets == 0 {
        return Vec::new();
    }

    let bucket_len = samples.len().div_ceil(buckets);
    let mut peaks: Vec<f32> = samples
        .chunks(bucket_len)
        .map(|chunk| chunk.iter().fold(0.0f32, |acc, s| acc.max(s.abs())))
        .collect();

    let max = peaks.iter().fold(0.0f32, |acc, p| acc.max(*p));
    if max > 0.0 {
        for peak in peaks.iter_mut() {
            *peak /= max;
        }
    }

    for peak in peaks.iter_mut() {
        *peak = (*peak * 1000.0).round() / 1000.0;
    }

    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(compute_waveform(&[], 100).is_empty());
        assert!(compute_waveform(&[0.5], 0).is_empty());
    }

    #[test]
    fn test_bucket_count() {
        let samples = vec![0.5f32; 10_000];
        let peaks = compute_waveform(&samples, 100);
        assert_eq!(peaks.len(), 100);
    }

    #[test]
    fn test_short_input_fewer_buckets() {
        let samples = vec![0.5f32; 7];
        let peaks = compute_waveform(&samples, 100);
        assert_eq!(peaks.len(), 7);
    }

    #[test]
    fn test_peak_normalization() {
        // Quiet first half, loud second half
        let mut samples = vec![0.25f32; 500];
        samples.extend(vec![-0.5f32; 500]);
        let peaks = compute_waveform(&samples, 2);
        assert_eq!(peaks, vec![0.5, 1.0]);
    }

    #[test]
    fn test_silence_stays_zero() {
        let samples = vec![0.0f32; 1000];
        let peaks = compute_waveform(&samples, 10);
        assert!(peaks.iter().all(|p| *p == 0.0));
    }

    #[test]
    fn test_negative_peaks_counted() {
        let samples = vec![-1.0f32, 0.0, 0.0, 0.0];
        let peaks = compute_waveform(&samples, 1);
        assert_eq!(peaks, vec![1.0]);
    }
}
