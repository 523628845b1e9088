/// Chars per word used by every speed figure
pub const CHARS_PER_WORD: f64 = 5.0;

/// Words per minute for `chars` characters typed in `elapsed_ms`.
///
/// Degenerate input (no time or no characters) gives 0.
pub fn words_per_minute(elapsed_ms: u64, chars: usize) -> u32 {
    if elapsed_ms == 0 || chars == 0 {
        return 0;
    }
    let ms_per_char = elapsed_ms as f64 / chars as f64;
    ((60_000.0 / ms_per_char) / CHARS_PER_WORD).floor() as u32
}

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation
pub fn std_dev(data: &[f64]) -> Option<f64> {
    let data_mean = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = data_mean - *value;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;
    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_per_minute() {
        // 5 chars in 1s -> 300 cpm -> 60 wpm
        assert_eq!(words_per_minute(1000, 5), 60);
        // 3 chars in 700ms: 60000 / 233.33 = 257.14 cpm -> 51.4
        assert_eq!(words_per_minute(700, 3), 51);
    }

    #[test]
    fn test_words_per_minute_degenerate() {
        assert_eq!(words_per_minute(0, 10), 0);
        assert_eq!(words_per_minute(1000, 0), 0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[10., 20., 30., 15., 22.]), Some(19.4));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_std_dev() {
        assert_eq!(std_dev(&[100., 120., 90., 102., 94.]), Some(10.322790320451151));
        assert_eq!(std_dev(&[5.0, 5.0, 5.0]), Some(0.0));
        assert_eq!(std_dev(&[]), None);
    }
}
