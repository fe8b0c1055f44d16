//! # Motion tracking for microscopy frame sequences
//!
//! This library estimates dense 2-D displacement fields over stacks of microscopy frames, and
//! exposes the results through scalar, vector and tensor field containers that can be backed by
//! either materialised arrays or deferred computations.
//!
//! The easiest way to use the library is to import its prelude:
//!
//! ```
//! use mps_motion::prelude::v1::*;
//! ```
//!
//! A typical pipeline looks like this:
//!
//! ```
//! use mps_motion::prelude::v1::*;
//! use ndarray::Array3;
//!
//! # fn main() -> Result<()> {
//! let frames = Array3::from_shape_fn((32, 32, 4), |(y, x, _)| ((x * 3 + y) % 7) as f64);
//! let data = MpsData::new(frames);
//!
//! let mut flow = OpticalFlow::new(data, "lucas_kanade", ReferenceFrame::Index(0), Options::new())?;
//! let u = flow.get_displacements(Default::default())?;
//! let norm = u.into_field().map(|u| u.norm().max());
//! # assert!(norm.is_some());
//! # Ok(())
//! # }
//! ```
//!
//! You may need [`ndarray`](https://crates.io/crates/ndarray) to make use of the functionality.

pub mod block_matching;
pub mod data;
pub mod dense;
pub mod dualtvl1;
pub mod error;
pub mod farneback;
pub mod flow;
pub mod frame_sequence;
pub mod lucas_kanade;
pub mod mechanics;
pub mod motion_tracking;
pub mod properties;
pub mod pyr_lk;
pub mod reference;
pub mod scaling;
pub mod utils;

pub mod prelude {
    pub mod v1 {
        pub use crate::{
            block_matching::BlockMatching,
            data::{DataInfo, MpsData},
            dense::DenseFlow,
            dualtvl1::{DualTvl1, DualTvl1Params},
            error::MotionError,
            farneback::{Farneback, FarnebackParams},
            flow::{Capabilities, Flow, FlowAlgorithm, FlowField, FlowMethod},
            frame_sequence::{
                FieldArray, FieldSeries, FrameSequence, LazyArray, TensorFrameSequence,
                VectorFrameSequence,
            },
            lucas_kanade::{LkParams, LucasKanade, PointTracker, TrackedPoints},
            mechanics::Mechanics,
            motion_tracking::{Displacement, DisplacementOptions, OpticalFlow, Unit},
            properties::*,
            pyr_lk::PyramidalLk,
            reference::{ReferenceFrame, Statistic},
        };
        pub use anyhow::{anyhow, Error, Result};
    }
}
