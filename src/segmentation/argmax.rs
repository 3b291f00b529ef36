use super::types::{ClassScoreMap, Mask};
use crate::error::{FxError, Result};
use ndarray::s;

/// Starting value of the running maximum: the most negative integer a
/// double represents exactly. Scores at or below it never win, so such a
/// row falls through to index 0.
const SCAN_FLOOR: f64 = -9_007_199_254_740_991.0;

/// Index of the largest score. Only a strictly greater value replaces the
/// running maximum, so ties resolve to the lowest index.
#[inline]
pub fn argmax<I>(scores: I) -> usize
where
    I: IntoIterator<Item = f32>,
{
    let mut max_val = SCAN_FLOOR;
    let mut max_idx = 0;
    for (j, v) in scores.into_iter().enumerate() {
        let v = v as f64;
        if v > max_val {
            max_val = v;
            max_idx = j;
        }
    }
    max_idx
}

/// Class index of every pixel in the top-left `extent` of the map.
pub fn argmax_labels(map: &ClassScoreMap, extent: (usize, usize)) -> Result<Mask> {
    let (w, h) = extent;
    if w > map.width() || h > map.height() {
        return Err(FxError::shape(format!(
            "extent {w}x{h} exceeds score map {}x{}",
            map.width(),
            map.height()
        )));
    }
    let _span = tracing::debug_span!("argmax", w, h, classes = map.num_classes()).entered();

    let scores = map.scores();
    let region = scores.slice(s![..h, ..w, ..]);
    let data: Vec<u8> = region
        .rows()
        .into_iter()
        .map(|lane| argmax(lane.iter().copied()) as u8)
        .collect();
    Mask::from_vec(w, h, data)
}

/// 255 where `target` wins the arg-max, 0 elsewhere.
pub fn argmax_target(map: &ClassScoreMap, extent: (usize, usize), target: usize) -> Result<Mask> {
    Ok(argmax_labels(map, extent)?.select(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_equal_row_picks_first_index() {
        assert_eq!(argmax([0.0, 0.0, 0.0, 0.0]), 0);
        assert_eq!(argmax([3.5, 3.5, 3.5]), 0);
    }

    #[test]
    fn later_strictly_greater_value_wins() {
        assert_eq!(argmax([1.0, 2.0, 2.0, 5.0, 5.0]), 3);
    }

    #[test]
    fn tie_after_maximum_keeps_first() {
        assert_eq!(argmax([0.1, 0.9, 0.3, 0.9]), 1);
    }

    #[test]
    fn scores_below_floor_fall_back_to_zero() {
        assert_eq!(argmax([-1e30, -1e30, -5.0]), 2);
        assert_eq!(argmax([-1e30, -1e30]), 0);
    }

    #[test]
    fn nan_never_wins() {
        assert_eq!(argmax([f32::NAN, 1.0, f32::NAN]), 1);
    }

    #[test]
    fn labels_cover_only_the_extent() {
        // 3x2 map, 2 classes; class 1 wins on the right column only.
        let mut data = Vec::new();
        for _y in 0..2 {
            for x in 0..3 {
                if x == 2 {
                    data.extend([0.0, 1.0]);
                } else {
                    data.extend([1.0, 0.0]);
                }
            }
        }
        let map = ClassScoreMap::new(data, [3, 2, 2], [3, 2], vec![]).unwrap();
        let full = argmax_labels(&map, (3, 2)).unwrap();
        assert_eq!(full.as_bytes(), &[0, 0, 1, 0, 0, 1]);

        let clipped = argmax_labels(&map, (2, 1)).unwrap();
        assert_eq!(clipped.as_bytes(), &[0, 0]);

        let person = argmax_target(&map, (3, 2), 1).unwrap();
        assert_eq!(person.as_bytes(), &[0, 0, 255, 0, 0, 255]);
    }

    #[test]
    fn extent_larger_than_map_is_rejected() {
        let map = ClassScoreMap::new(vec![0.0; 4], [2, 2, 1], [2, 2], vec![]).unwrap();
        assert!(argmax_labels(&map, (3, 2)).is_err());
    }
}
