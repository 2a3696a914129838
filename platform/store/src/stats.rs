//! Arithmetic shared by the dashboard metric aggregators.

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole` as a percentage; zero when `whole` is zero.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 * 100.0 / whole as f64)
}

/// Same as [`percentage`] for amounts that are not counts.
pub fn ratio_percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    round2(part * 100.0 / whole)
}

/// Sum of cent amounts, pinned at `i64::MAX` rather than wrapping.
pub fn cents<I>(values: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    values.into_iter().fold(0, i64::saturating_add)
}

pub fn average<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), value| (sum + value, n + 1));
    if n == 0 { 0.0 } else { round2(sum / n as f64) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cent_sums_saturate() {
        assert_eq!(cents([100, 250]), 350);
        assert_eq!(cents([i64::MAX, 1]), i64::MAX);
        assert_eq!(cents(std::iter::empty()), 0);
    }

    #[test]
    fn percentage_of_nothing_is_zero() {
        assert_eq!(percentage(3, 0), 0.0);
        assert_eq!(ratio_percent(3.0, 0.0), 0.0);
    }

    #[test]
    fn percentage_rounds_to_two_places() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(4, 4), 100.0);
    }

    #[test]
    fn average_handles_empty_input() {
        assert_eq!(average(Vec::<f64>::new()), 0.0);
        assert_eq!(average([4.0, 5.0, 3.0]), 4.0);
        assert_eq!(average([1.0, 2.0]), 1.5);
    }
}
