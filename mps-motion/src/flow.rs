//! # Flow algorithms
//!
//! Every algorithm implements the [`Flow`] interface. The closed set of algorithms is enumerated
//! by [`FlowAlgorithm`], which resolves names and builds a [`FlowMethod`] with merged options.

use crate::block_matching::BlockMatching;
use crate::dense::DenseFlow;
use crate::dualtvl1::{DualTvl1, DualTvl1Params};
use crate::error::MotionError;
use crate::farneback::{Farneback, FarnebackParams};
use crate::lucas_kanade::{LucasKanade, PointTracker};
use crate::properties::*;
use crate::pyr_lk::PyramidalLk;
use anyhow::Result;
use log::*;
use nalgebra as na;
use ndarray::{Array1, Array2, Array3, Array4, ArrayView2, Axis};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Flow of a single image pair.
#[derive(Clone, Debug, PartialEq)]
pub enum FlowField {
    /// `(height, width, 2)` field.
    Dense(Array3<f64>),
    /// `(n, 2)` displacements at the given points.
    Sparse {
        points: Vec<na::Point2<f32>>,
        flow: Array2<f64>,
    },
}

/// Optical flow algorithm.
pub trait Flow: Properties + Send + Sync {
    /// Registered name of the algorithm.
    fn name(&self) -> &'static str;

    /// Flow from `reference` to `image`.
    fn flow(&self, image: ArrayView2<f64>, reference: ArrayView2<f64>) -> Result<FlowField>;

    /// Displacement of every frame relative to the reference.
    ///
    /// # Arguments
    ///
    /// * `frames` - `(height, width, time)` frame stack.
    /// * `reference` - `(height, width)` reference image.
    ///
    /// Returns a `(height, width, 2, time)` array.
    fn get_displacements(
        &self,
        frames: &Array3<f64>,
        reference: ArrayView2<f64>,
    ) -> Result<Array4<f64>>;

    fn supports_velocities(&self) -> bool {
        false
    }

    /// Velocity between consecutive frames, `(height, width, 2, time - 1)`.
    fn get_velocities(&self, _frames: &Array3<f64>, _time_stamps: &Array1<f64>) -> Result<Array4<f64>> {
        Err(MotionError::Unsupported {
            algorithm: self.name(),
            capability: "velocities",
        }
        .into())
    }
}

/// Stack per-frame `(h, w, 2)` fields into `(h, w, 2, time)`.
pub(crate) fn stack_fields(fields: &[Array3<f64>], (h, w): (usize, usize)) -> Result<Array4<f64>> {
    if fields.is_empty() {
        return Ok(Array4::zeros((h, w, 2, 0)));
    }

    let views = fields.iter().map(|f| f.view()).collect::<Vec<_>>();
    Ok(ndarray::stack(Axis(3), &views)?)
}

/// Native capability providers available to the algorithms.
#[derive(Clone)]
pub struct Capabilities {
    pub point_tracker: Arc<dyn PointTracker>,
    pub farneback: Option<Arc<dyn DenseFlow<FarnebackParams>>>,
    pub dual_tvl1: Option<Arc<dyn DenseFlow<DualTvl1Params>>>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            point_tracker: Arc::new(PyramidalLk),
            farneback: None,
            dual_tvl1: None,
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("farneback", &self.farneback.is_some())
            .field("dual_tvl1", &self.dual_tvl1.is_some())
            .finish()
    }
}

/// Registered flow algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FlowAlgorithm {
    Farneback,
    #[cfg_attr(feature = "serde", serde(rename = "dualtvl10"))]
    DualTvl10,
    LucasKanade,
    BlockMatching,
}

impl FlowAlgorithm {
    pub const ALL: [FlowAlgorithm; 4] = [
        Self::Farneback,
        Self::DualTvl10,
        Self::LucasKanade,
        Self::BlockMatching,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Farneback => "farneback",
            Self::DualTvl10 => "dualtvl10",
            Self::LucasKanade => "lucas_kanade",
            Self::BlockMatching => "block_matching",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::name).collect()
    }

    pub fn supports_velocities(&self) -> bool {
        matches!(self, Self::Farneback | Self::DualTvl10)
    }

    /// Options of a default-constructed instance.
    pub fn default_options(&self) -> Options {
        match self {
            Self::Farneback => Farneback::default().options(),
            Self::DualTvl10 => DualTvl1::default().options(),
            Self::LucasKanade => LucasKanade::default().options(),
            Self::BlockMatching => BlockMatching::default().options(),
        }
    }

    /// Build the algorithm with `options` merged over its defaults.
    ///
    /// Fails if the algorithm needs a provider that `capabilities` lacks.
    pub fn build(&self, options: &Options, capabilities: &Capabilities) -> Result<FlowMethod> {
        let unavailable = || MotionError::CapabilityUnavailable {
            algorithm: self.name(),
        };

        let mut method = match self {
            Self::Farneback => FlowMethod::Farneback(Farneback::new(
                capabilities.farneback.clone().ok_or_else(unavailable)?,
            )),
            Self::DualTvl10 => FlowMethod::DualTvl10(DualTvl1::new(
                capabilities.dual_tvl1.clone().ok_or_else(unavailable)?,
            )),
            Self::LucasKanade => {
                FlowMethod::LucasKanade(LucasKanade::new(capabilities.point_tracker.clone()))
            }
            Self::BlockMatching => FlowMethod::BlockMatching(BlockMatching::default()),
        };

        let merged = merge_options(self.default_options(), options);
        debug!("{} options: {merged:?}", self.name());
        method.apply_options(&merged);

        Ok(method)
    }
}

impl FromStr for FlowAlgorithm {
    type Err = MotionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| MotionError::InvalidAlgorithm {
                name: s.to_string(),
                valid: Self::names(),
            })
    }
}

impl fmt::Display for FlowAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A configured algorithm.
#[derive(Clone)]
pub enum FlowMethod {
    Farneback(Farneback),
    DualTvl10(DualTvl1),
    LucasKanade(LucasKanade),
    BlockMatching(BlockMatching),
}

impl FlowMethod {
    pub fn algorithm(&self) -> FlowAlgorithm {
        match self {
            Self::Farneback(_) => FlowAlgorithm::Farneback,
            Self::DualTvl10(_) => FlowAlgorithm::DualTvl10,
            Self::LucasKanade(_) => FlowAlgorithm::LucasKanade,
            Self::BlockMatching(_) => FlowAlgorithm::BlockMatching,
        }
    }

    fn inner(&self) -> &dyn Flow {
        match self {
            Self::Farneback(m) => m,
            Self::DualTvl10(m) => m,
            Self::LucasKanade(m) => m,
            Self::BlockMatching(m) => m,
        }
    }
}

impl fmt::Debug for FlowMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlowMethod({})", self.name())
    }
}

impl Properties for FlowMethod {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        match self {
            Self::Farneback(m) => m.props_mut(),
            Self::DualTvl10(m) => m.props_mut(),
            Self::LucasKanade(m) => m.props_mut(),
            Self::BlockMatching(m) => m.props_mut(),
        }
    }
}

impl Flow for FlowMethod {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn flow(&self, image: ArrayView2<f64>, reference: ArrayView2<f64>) -> Result<FlowField> {
        self.inner().flow(image, reference)
    }

    fn get_displacements(
        &self,
        frames: &Array3<f64>,
        reference: ArrayView2<f64>,
    ) -> Result<Array4<f64>> {
        self.inner().get_displacements(frames, reference)
    }

    fn supports_velocities(&self) -> bool {
        self.inner().supports_velocities()
    }

    fn get_velocities(&self, frames: &Array3<f64>, time_stamps: &Array1<f64>) -> Result<Array4<f64>> {
        self.inner().get_velocities(frames, time_stamps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::tests::MeanShift;

    #[test]
    fn parse_names() {
        for algorithm in FlowAlgorithm::ALL {
            assert_eq!(algorithm.name().parse::<FlowAlgorithm>().unwrap(), algorithm);
        }

        match "horn_schunck".parse::<FlowAlgorithm>() {
            Err(MotionError::InvalidAlgorithm { name, valid }) => {
                assert_eq!(name, "horn_schunck");
                assert_eq!(
                    valid,
                    vec!["farneback", "dualtvl10", "lucas_kanade", "block_matching"]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn build_merges_options() {
        let mut options = Options::new();
        options.insert("step".into(), Property::usize(8));
        options.insert("interpolate".into(), Property::Bool(true));

        let mut method = FlowAlgorithm::LucasKanade
            .build(&options, &Capabilities::default())
            .unwrap();
        let applied = method.options();

        assert_eq!(method.name(), "lucas_kanade");
        assert!(matches!(applied["step"], Property::Usize(p) if p.val == 8));
        assert_eq!(applied["interpolate"], Property::Bool(true));
        assert!(matches!(applied["win_size"], Property::Usize(p) if p.val == 15));
    }

    #[test]
    fn dense_needs_provider() {
        let caps = Capabilities::default();

        for algorithm in [FlowAlgorithm::Farneback, FlowAlgorithm::DualTvl10] {
            let err = algorithm.build(&Options::new(), &caps).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MotionError>(),
                Some(MotionError::CapabilityUnavailable { .. })
            ));
        }

        let caps = Capabilities {
            farneback: Some(Arc::new(MeanShift) as Arc<dyn DenseFlow<FarnebackParams>>),
            ..Default::default()
        };
        let method = FlowAlgorithm::Farneback
            .build(&Options::new(), &caps)
            .unwrap();
        assert!(method.supports_velocities());
        assert_eq!(method.algorithm(), FlowAlgorithm::Farneback);
    }

    #[test]
    fn velocity_capability() {
        for algorithm in FlowAlgorithm::ALL {
            let options = algorithm.default_options();
            assert!(!options.is_empty());
            assert_eq!(
                algorithm.supports_velocities(),
                matches!(algorithm.name(), "farneback" | "dualtvl10")
            );
        }
    }

    #[test]
    fn empty_stack() {
        let u = stack_fields(&[], (3, 4)).unwrap();
        assert_eq!(u.dim(), (3, 4, 2, 0));
    }
}
