//! Gap detection over sequences of period endpoints.

/// Returns the sorted list of expected-but-absent values in `values`,
/// stepping by `step`. If `start` is given, the sequence is extrapolated
/// backward from its first element and anything at or after `start` that is
/// not present counts as a gap; `end` does the same going forward.
///
/// An empty input with both bounds given reports the entire expected range
/// as missing. With either bound absent, an empty input has no gaps. A
/// non-positive step cannot define an expected sequence and yields no gaps.
pub fn find_gaps(values: &[i64], start: Option<i64>, end: Option<i64>, step: i64) -> Vec<i64> {
    if step < 1 {
        return vec![];
    }

    if values.is_empty() {
        return match (start, end) {
            (Some(start), Some(end)) => (start..=end).step_by(step as usize).collect(),
            _ => vec![],
        };
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut gaps = vec![];

    // Extrapolate backwards to the true starting point
    if let Some(start) = start {
        let mut first = sorted[0];
        while first - step >= start {
            first -= step;
            gaps.push(first);
        }
    }

    // Extrapolate forwards to the true ending point
    if let Some(end) = end {
        let mut last = sorted[sorted.len() - 1];
        while last + step <= end {
            last += step;
            gaps.push(last);
        }
    }

    // Missing values within the observed range
    let mut expected = sorted[0] + step;
    for &num in &sorted[1..] {
        while expected < num {
            gaps.push(expected);
            expected += step;
        }
        expected = num + step;
    }

    gaps.sort_unstable();
    gaps
}

/// Checks whether `values` forms a consecutive run with the given step,
/// reaching `start` and `end` exactly when they are supplied. An empty
/// input is never consecutive, nor is any input with a non-positive step.
pub fn is_consecutive(values: &[i64], start: Option<i64>, end: Option<i64>, step: i64) -> bool {
    if step < 1 || values.is_empty() {
        return false;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    if let Some(start) = start {
        let mut first = sorted[0];
        while first - step >= start {
            first -= step;
        }
        if first != start {
            return false;
        }
    }

    if let Some(end) = end {
        let mut last = sorted[sorted.len() - 1];
        while last + step <= end {
            last += step;
        }
        if last != end {
            return false;
        }
    }

    sorted.windows(2).all(|w| w[1] == w[0] + step)
}

// -- Tests -------------------------------------------------------------------
