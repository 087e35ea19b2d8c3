use crate::float::Float;

struct Point<T: Float> {
    x: T,
    y: T,
}

/// Pairs of (positive zero crossing, following negative zero crossing) indices.
fn detect_crossings<T: Float>(arr: &[T]) -> impl Iterator<Item = (usize, usize)> + '_ {
    arr.windows(2)
        .enumerate()
        .scan(
            None,
            |positive_zero_cross: &mut Option<usize>, (i, win)| match positive_zero_cross.take() {
                Some(idx) => {
                    if win[1] < T::zero() && win[0] > T::zero() {
                        *positive_zero_cross = None;
                        Some(Some((idx, i + 1)))
                    } else {
                        *positive_zero_cross = Some(idx);
                        Some(None)
                    }
                }
                None => {
                    if win[1] > T::zero() && win[0] < T::zero() {
                        *positive_zero_cross = Some(i + 1);
                    }
                    Some(None)
                }
            },
        )
        .flatten()
}

/// Key maxima of `arr`: the largest value between each positive-going zero crossing
/// and the negative-going crossing after it. The lobe around index 0 is skipped.
pub fn detect_peaks<T: Float>(arr: &[T]) -> impl Iterator<Item = (usize, T)> + '_ {
    detect_crossings(arr).map(move |(start, stop)| {
        let mut peak_idx = 0;
        let mut peak_val = -T::infinity();
        for (i, &val) in arr.iter().enumerate().take(stop).skip(start) {
            if val > peak_val {
                peak_val = val;
                peak_idx = i;
            }
        }
        (peak_idx, peak_val)
    })
}

/// Choose the first peak whose height reaches `cutoff` times the highest peak,
/// ignoring peaks at or below `threshold`.
pub fn choose_peak<I: Iterator<Item = (usize, T)>, T: Float>(
    peaks: I,
    threshold: T,
    cutoff: T,
) -> Option<(usize, T)> {
    let peaks: Vec<(usize, T)> = peaks.filter(|p| p.1 > threshold).collect();
    let highest = peaks
        .iter()
        .map(|p| p.1)
        .fold(T::neg_infinity(), |a, b| a.max(b));
    let limit = cutoff * highest;
    peaks.into_iter().find(|p| p.1 >= limit)
}

/// Refine a peak by fitting a parabola through it and its two neighbours.
/// Peaks on the edge of `data` are returned as they are.
pub fn correct_peak<T: Float>(peak: (usize, T), data: &[T]) -> (T, T) {
    let idx = peak.0;
    if idx == 0 || idx + 1 >= data.len() {
        return (T::from_len(idx), peak.1);
    }
    let point = quadratic_interpolation(
        Point {
            x: T::from_len(idx - 1),
            y: data[idx - 1],
        },
        Point {
            x: T::from_len(idx),
            y: data[idx],
        },
        Point {
            x: T::from_len(idx + 1),
            y: data[idx + 1],
        },
    );
    (point.x, point.y)
}

/// Offset of the vertex of the parabola through three equally spaced samples,
/// relative to the center sample. `None` when the samples are collinear or the
/// vertex lies more than one sample away.
pub fn parabolic_offset<T: Float>(left: T, center: T, right: T) -> Option<T> {
    let denom = left - T::cast(2.0) * center + right;
    if denom == T::zero() {
        return None;
    }
    let shift = T::cast(0.5) * (left - right) / denom;
    if !shift.is_finite() || shift > T::one() || shift < -T::one() {
        return None;
    }
    Some(shift)
}

fn quadratic_interpolation<T: Float>(
    left: Point<T>,
    center: Point<T>,
    right: Point<T>,
) -> Point<T> {
    let denom = T::cast(2.0) * center.y - left.y - right.y;
    if denom == T::zero() {
        return center;
    }
    let shift = T::cast(0.5) * (right.y - left.y) / denom;
    let x = center.x + shift;
    let y = center.y + T::cast(0.25) * (right.y - left.y) * shift;
    Point { x, y }
}
