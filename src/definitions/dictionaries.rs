//! Category ratios used only for dummy data

/// Number of synthetic MSOA codes drawn in dummy data
pub const DUMMY_MSOA_COUNT: u32 = 100;

/// Region shares of the dummy population
pub const REGION_RATIOS: [(&str, f64); 9] = [
    ("North East", 0.1),
    ("North West", 0.05),
    ("Yorkshire and The Humber", 0.1),
    ("East Midlands", 0.1),
    ("West Midlands", 0.05),
    ("East of England", 0.3),
    ("London", 0.15),
    ("South East", 0.1),
    ("South West", 0.05),
];

/// Ten equally likely STP codes, `STP1` to `STP10`
#[must_use]
pub fn stp_ratios() -> Vec<(String, f64)> {
    (1..=10).map(|i| (format!("STP{i}"), 0.1)).collect()
}

/// Equally likely English MSOA codes starting at `E02000001`
#[must_use]
pub fn msoa_ratios() -> Vec<(String, f64)> {
    let share = 1.0 / f64::from(DUMMY_MSOA_COUNT);
    (1..=DUMMY_MSOA_COUNT)
        .map(|i| (format!("E02{i:06}"), share))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios_sum_to_one() {
        let region: f64 = REGION_RATIOS.iter().map(|(_, r)| r).sum();
        assert!((region - 1.0).abs() < 1e-9);
        let msoa: f64 = msoa_ratios().iter().map(|(_, r)| r).sum();
        assert!((msoa - 1.0).abs() < 1e-9);
        assert_eq!(msoa_ratios()[0].0, "E02000001");
        assert_eq!(stp_ratios().len(), 10);
    }
}
