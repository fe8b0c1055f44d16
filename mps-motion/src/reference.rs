//! # Reference frame selection
//!
//! Every displacement is measured relative to a single reference image. The reference is either a
//! concrete frame (picked by index or by time), averaged with its temporal neighbours, or a
//! pixel-wise statistic over all frames.

use crate::error::MotionError;
use anyhow::Result;
use ndarray::{s, Array1, Array2, Array3, ArrayView1, Axis};
use std::fmt;
use std::str::FromStr;

/// Pixel-wise statistic over time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Statistic {
    Min,
    Max,
    Median,
    Mean,
}

impl Statistic {
    pub const ALL: [Statistic; 4] = [Self::Min, Self::Max, Self::Median, Self::Mean];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Mean => "mean",
        }
    }

    fn apply(&self, values: ArrayView1<f64>) -> f64 {
        match self {
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Mean => values.mean().unwrap_or(f64::NAN),
            Self::Median => {
                let mut v = values.to_vec();
                v.sort_by(|a, b| a.total_cmp(b));
                match v.len() {
                    0 => f64::NAN,
                    n if n % 2 == 1 => v[n / 2],
                    n => (v[n / 2 - 1] + v[n / 2]) / 2.0,
                }
            }
        }
    }
}

/// Reference frame specification.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReferenceFrame {
    /// Frame at the given index.
    Index(usize),
    /// First frame whose time stamp is at least the given time.
    Time(f64),
    /// Pixel-wise statistic over all frames.
    Statistic(Statistic),
}

impl Default for ReferenceFrame {
    fn default() -> Self {
        Self::Time(0.0)
    }
}

impl From<usize> for ReferenceFrame {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<Statistic> for ReferenceFrame {
    fn from(stat: Statistic) -> Self {
        Self::Statistic(stat)
    }
}

impl FromStr for ReferenceFrame {
    type Err = MotionError;

    /// Numbers are interpreted as time values, names as statistics.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Ok(time) = s.parse::<f64>() {
            return Ok(Self::Time(time));
        }

        Statistic::ALL
            .into_iter()
            .find(|stat| stat.name() == s)
            .map(Self::Statistic)
            .ok_or_else(|| MotionError::InvalidReference(s.to_string()))
    }
}

impl fmt::Display for ReferenceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::Statistic(stat) => f.write_str(stat.name()),
        }
    }
}

/// Resolved reference image.
#[derive(Clone, Debug)]
pub struct Reference {
    /// Canonical label of the specification.
    pub label: String,
    pub image: Array2<f64>,
    /// Index of the central frame, `None` for statistic based references.
    pub index: Option<usize>,
}

/// Resolve a reference specification against a frame stack.
///
/// # Arguments
///
/// * `reference` - what to use as reference.
/// * `frames` - `(height, width, time)` frame stack.
/// * `time_stamps` - per-frame time stamps, required for [`ReferenceFrame::Time`].
pub fn get_reference_image(
    reference: ReferenceFrame,
    frames: &Array3<f64>,
    time_stamps: Option<&Array1<f64>>,
) -> Result<Reference> {
    let num_frames = frames.len_of(Axis(2));

    if num_frames == 0 {
        return Err(MotionError::DimensionMismatch {
            expected: vec![frames.shape()[0], frames.shape()[1], 1],
            found: frames.shape().to_vec(),
        }
        .into());
    }

    let label = reference.to_string();

    let index = match reference {
        ReferenceFrame::Statistic(stat) => {
            let image = frames.map_axis(Axis(2), |values| stat.apply(values));
            return Ok(Reference {
                label,
                image,
                index: None,
            });
        }
        ReferenceFrame::Index(index) => index.min(num_frames - 1),
        ReferenceFrame::Time(time) => {
            let time_stamps = time_stamps.ok_or(MotionError::MissingTimeStamps)?;
            time_stamps
                .iter()
                .position(|&t| t >= time)
                .unwrap_or_else(|| time_stamps.len().saturating_sub(1))
                .min(num_frames - 1)
        }
    };

    Ok(Reference {
        label,
        image: neighbour_mean(frames, index),
        index: Some(index),
    })
}

/// Average frame `index` with up to two temporal neighbours.
///
/// The first frame is averaged with the two after it, the last with the two before it, and
/// anything in between with one neighbour on each side.
fn neighbour_mean(frames: &Array3<f64>, index: usize) -> Array2<f64> {
    let last = frames.len_of(Axis(2)) - 1;

    let (start, end) = if index == 0 {
        (0, 3)
    } else if index == last {
        (index.saturating_sub(2), index + 1)
    } else {
        (index - 1, index + 2)
    };

    let window = frames.slice(s![.., .., start..end.min(last + 1)]);
    let n = window.len_of(Axis(2)) as f64;

    window.sum_axis(Axis(2)) / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn frames(num: usize) -> Array3<f64> {
        // Each frame is filled with its own index.
        Array3::from_shape_fn((4, 5, num), |(_, _, t)| t as f64)
    }

    fn stamps(num: usize) -> Array1<f64> {
        Array::range(0.0, num as f64 * 10.0, 10.0)
    }

    #[test]
    fn time_reference_first() {
        let f = frames(6);
        let r = get_reference_image(ReferenceFrame::Time(0.0), &f, Some(&stamps(6))).unwrap();
        assert_eq!(r.index, Some(0));
        assert_eq!(r.label, "0");
        assert!(r.image.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn time_reference_middle() {
        let f = frames(6);
        let r = get_reference_image(ReferenceFrame::Time(10.0), &f, Some(&stamps(6))).unwrap();
        assert_eq!(r.index, Some(1));
        assert!(r.image.iter().all(|&v| v == 1.0));

        let r = get_reference_image(ReferenceFrame::Time(25.0), &f, Some(&stamps(6))).unwrap();
        assert_eq!(r.index, Some(3));
        assert!(r.image.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn time_reference_clamped_to_last() {
        let f = frames(6);
        let r = get_reference_image(ReferenceFrame::Time(1000.0), &f, Some(&stamps(6))).unwrap();
        assert_eq!(r.index, Some(5));
        assert!(r.image.iter().all(|&v| v == 4.0));
    }

    #[test]
    fn time_reference_needs_stamps() {
        let err = get_reference_image(ReferenceFrame::Time(10.0), &frames(6), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MotionError>(),
            Some(MotionError::MissingTimeStamps)
        ));
    }

    #[test]
    fn index_reference() {
        let r = get_reference_image(ReferenceFrame::Index(2), &frames(6), None).unwrap();
        assert_eq!(r.index, Some(2));
        assert!(r.image.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn short_sequences() {
        let r = get_reference_image(ReferenceFrame::Index(0), &frames(2), None).unwrap();
        assert!(r.image.iter().all(|&v| v == 0.5));

        let r = get_reference_image(ReferenceFrame::Index(0), &frames(1), None).unwrap();
        assert!(r.image.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn statistic_references() {
        let f = frames(4);

        let expect = [
            (Statistic::Min, 0.0),
            (Statistic::Max, 3.0),
            (Statistic::Median, 1.5),
            (Statistic::Mean, 1.5),
        ];

        for (stat, value) in expect {
            let r = get_reference_image(stat.into(), &f, None).unwrap();
            assert_eq!(r.index, None);
            assert_eq!(r.label, stat.name());
            assert!(r.image.iter().all(|&v| v == value));
        }
    }

    #[test]
    fn parse_reference() {
        assert_eq!("10".parse::<ReferenceFrame>().unwrap(), ReferenceFrame::Time(10.0));
        assert_eq!(
            "median".parse::<ReferenceFrame>().unwrap(),
            ReferenceFrame::Statistic(Statistic::Median)
        );
        assert!(matches!(
            "mode".parse::<ReferenceFrame>(),
            Err(MotionError::InvalidReference(_))
        ));
    }
}
