//! Progress arithmetic and human-readable formatting.
//!
//! Upload progress is counted in chunks rather than bytes: after the i-th of
//! `total` chunks the reported value is `round(i / total * 100)`, whatever
//! the byte size of the last chunk.

/// Percentage after `completed` of `total` chunks, rounded to the nearest
/// integer. An empty plan counts as complete.
pub fn chunk_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = completed.min(total);
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// Position of one upload inside the file it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPosition {
    /// Zero-based index of the part
    pub index: usize,

    /// Number of parts of the original file (1 when not split)
    pub count: usize,
}

impl PartPosition {
    pub fn whole() -> Self {
        Self { index: 0, count: 1 }
    }

    /// Fraction of the original file done when this part is at `percent`.
    pub fn file_fraction(&self, percent: u8) -> f64 {
        if self.count == 0 {
            return 1.0;
        }
        let part = f64::from(percent.min(100)) / 100.0;
        (self.index as f64 + part) / self.count as f64
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_percent_rounding() {
        assert_eq!(chunk_percent(1, 3), 33);
        assert_eq!(chunk_percent(2, 3), 67);
        assert_eq!(chunk_percent(3, 3), 100);
        assert_eq!(chunk_percent(1, 205), 0);
        assert_eq!(chunk_percent(2, 205), 1);
        assert_eq!(chunk_percent(205, 205), 100);
    }

    #[test]
    fn test_chunk_percent_is_non_decreasing() {
        let total = 205;
        let values: Vec<u8> = (1..=total).map(|i| chunk_percent(i, total)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*values.last().unwrap(), 100);
    }

    #[test]
    fn test_chunk_percent_edge_cases() {
        assert_eq!(chunk_percent(0, 0), 100);
        assert_eq!(chunk_percent(7, 3), 100);
    }

    #[test]
    fn test_part_fraction() {
        let whole = PartPosition::whole();
        assert_eq!(whole.file_fraction(50), 0.5);

        let second_of_four = PartPosition { index: 1, count: 4 };
        assert_eq!(second_of_four.file_fraction(0), 0.25);
        assert_eq!(second_of_four.file_fraction(100), 0.5);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
        assert_eq!(format_bytes(15 * 1024 * 1024 * 1024), "15.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024), "1.00 KB/s");
        assert_eq!(format_speed(1024 * 1024), "1.00 MB/s");
    }
}
