//! Backward-looking window kernels
//!
//! Every kernel here reads strictly before the current row: the window for
//! row `i` is rows `i-w .. i-1`, never row `i` itself. Row order is the
//! ascending date order of the merged table.

use super::AggregateKind;
use crate::config::WindowMode;

/// Row range `start..i` covered by a window of length `w` ending before row `i`,
/// or `None` when the history is too short (or, in calendar mode, has a gap).
///
/// In calendar mode, rows `i-w .. i-1` carry `w` distinct dates below
/// `days[i]`; they fill the `w` calendar days before `days[i]` exactly when
/// the oldest one is `days[i] - w`.
#[must_use]
pub fn window_start(days: &[i32], i: usize, w: usize, mode: WindowMode) -> Option<usize> {
    let start = i.checked_sub(w)?;
    match mode {
        WindowMode::Rows => Some(start),
        WindowMode::Calendar => {
            let span = i32::try_from(w).ok()?;
            (days[start] == days[i] - span).then_some(start)
        }
    }
}

/// Rolling aggregates of one column for one window length.
///
/// Returns one output vector per entry of `kinds`, each as long as `values`.
/// A window that is incomplete or contains an undefined value yields an
/// undefined result for every kind.
#[must_use]
pub fn rolling(
    values: &[Option<f64>],
    days: &[i32],
    w: usize,
    kinds: &[AggregateKind],
    mode: WindowMode,
) -> Vec<Vec<Option<f64>>> {
    let n = values.len();
    let mut out = vec![Vec::with_capacity(n); kinds.len()];
    let mut buffer = Vec::with_capacity(w);

    for i in 0..n {
        buffer.clear();
        let complete = window_start(days, i, w, mode).is_some_and(|start| {
            values[start..i].iter().all(|v| match v {
                Some(x) => {
                    buffer.push(*x);
                    true
                }
                None => false,
            })
        });

        for (kind, column) in kinds.iter().zip(out.iter_mut()) {
            column.push(complete.then(|| kind.apply(&buffer)));
        }
    }

    out
}

/// Value `k` steps back: row `i-k` in row mode, the row dated `days[i]-k` in
/// calendar mode (undefined when that day has no row).
#[must_use]
pub fn lagged(values: &[Option<f64>], days: &[i32], k: usize, mode: WindowMode) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let row = match mode {
                WindowMode::Rows => i.checked_sub(k)?,
                WindowMode::Calendar => {
                    let target = days[i] - i32::try_from(k).ok()?;
                    days[..i].binary_search(&target).ok()?
                }
            };
            values[row]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consecutive(n: usize) -> Vec<i32> {
        (0..n as i32).collect()
    }

    #[test]
    fn test_window_excludes_current_row() {
        let values: Vec<Option<f64>> = (1..=10).map(|v| Some(f64::from(v))).collect();
        let out = rolling(&values, &consecutive(10), 3, &[AggregateKind::Mean], WindowMode::Rows);
        let mean = &out[0];

        assert_eq!(mean[..3], [None, None, None]);
        assert_eq!(mean[3], Some(2.0));
        assert_eq!(mean[6], Some(5.0));
        assert_eq!(mean[9], Some(8.0));
    }

    #[test]
    fn test_undefined_value_in_window() {
        let values = vec![Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)];
        let out = rolling(&values, &consecutive(5), 2, &[AggregateKind::Max], WindowMode::Rows);
        assert_eq!(out[0], vec![None, None, None, None, Some(4.0)]);
    }

    #[test]
    fn test_calendar_window_rejects_gap() {
        // days 0,1,2,5,6,7 : a three-day hole between 2 and 5
        let days = vec![0, 1, 2, 5, 6, 7];
        let values: Vec<Option<f64>> = (1..=6).map(|v| Some(f64::from(v))).collect();

        let rows = rolling(&values, &days, 2, &[AggregateKind::Mean], WindowMode::Rows);
        assert_eq!(rows[0][3], Some(2.5));

        let calendar = rolling(&values, &days, 2, &[AggregateKind::Mean], WindowMode::Calendar);
        assert_eq!(calendar[0][2], Some(1.5));
        assert_eq!(calendar[0][3], None);
        assert_eq!(calendar[0][4], None);
        assert_eq!(calendar[0][5], Some(4.5));
    }

    #[test]
    fn test_lag_rows_and_calendar() {
        let days = vec![0, 1, 3];
        let values = vec![Some(10.0), Some(20.0), Some(30.0)];
        assert_eq!(
            lagged(&values, &days, 1, WindowMode::Rows),
            vec![None, Some(10.0), Some(20.0)]
        );
        assert_eq!(
            lagged(&values, &days, 1, WindowMode::Calendar),
            vec![None, Some(10.0), None]
        );
    }

    #[test]
    fn test_calendar_lag_reaches_across_gap() {
        let days = vec![0, 2, 3];
        let values = vec![Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(
            lagged(&values, &days, 3, WindowMode::Calendar),
            vec![None, None, Some(1.0)]
        );
        assert_eq!(lagged(&values, &days, 3, WindowMode::Rows), vec![None, None, None]);
    }

    #[test]
    fn test_window_longer_than_series() {
        let values = vec![Some(1.0), Some(2.0)];
        let out = rolling(&values, &consecutive(2), 5, &AggregateKind::ALL, WindowMode::Rows);
        assert!(out.iter().all(|column| column.iter().all(Option::is_none)));
    }
}
