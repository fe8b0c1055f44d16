//! # Motion tracking
//!
//! [`OpticalFlow`] ties together reference selection, a flow algorithm and unit conversion to
//! produce the displacement field of a whole frame stack.

use crate::data::MpsData;
use crate::error::MotionError;
use crate::flow::{Capabilities, Flow, FlowAlgorithm, FlowMethod};
use crate::frame_sequence::VectorFrameSequence;
use crate::properties::{merge_options, Options};
use crate::reference::{get_reference_image, Reference, ReferenceFrame};
use anyhow::Result;
use log::*;
use ndarray::{Array2, Array4, ArrayD, Ix4};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Length unit of displacement values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Unit {
    Pixels,
    /// Micrometres, using the data's physical pixel size.
    Um,
}

impl Default for Unit {
    fn default() -> Self {
        Self::Um
    }
}

impl FromStr for Unit {
    type Err = MotionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pixels" => Ok(Self::Pixels),
            "um" => Ok(Self::Um),
            _ => Err(MotionError::InvalidUnit(s.to_string())),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pixels => "pixels",
            Self::Um => "um",
        })
    }
}

/// Arguments of [`OpticalFlow::get_displacements`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplacementOptions {
    /// Ignore any cached result.
    pub recompute: bool,
    pub unit: Unit,
    /// Downsampling factor in `(0, 1]` applied to the frames before tracking.
    pub scale: f64,
    /// Return the plain `(height, width, 2, time)` array.
    pub raw: bool,
}

impl Default for DisplacementOptions {
    fn default() -> Self {
        Self {
            recompute: false,
            unit: Unit::default(),
            scale: 1.0,
            raw: false,
        }
    }
}

/// Result of [`OpticalFlow::get_displacements`].
#[derive(Clone, Debug)]
pub enum Displacement {
    /// `(height, width, 2, time)` values.
    Raw(Array4<f64>),
    /// `(height, width, time, 2)` field.
    Field(VectorFrameSequence),
}

impl Displacement {
    pub fn into_field(self) -> Option<VectorFrameSequence> {
        match self {
            Self::Field(f) => Some(f),
            Self::Raw(_) => None,
        }
    }

    pub fn into_raw(self) -> Option<Array4<f64>> {
        match self {
            Self::Raw(u) => Some(u),
            Self::Field(_) => None,
        }
    }
}

struct Cached {
    field: VectorFrameSequence,
    unit: Unit,
}

/// Displacement estimation over a whole frame stack.
pub struct OpticalFlow {
    data: MpsData,
    method: FlowMethod,
    options: Options,
    reference_spec: ReferenceFrame,
    reference: Reference,
    displacement: Option<Cached>,
}

impl OpticalFlow {
    /// Create with the built-in capability providers.
    ///
    /// # Arguments
    ///
    /// * `data` - frames to track.
    /// * `algorithm` - one of the [`FlowAlgorithm`] names.
    /// * `reference` - reference frame specification.
    /// * `options` - algorithm options, overriding the defaults.
    pub fn new(
        data: MpsData,
        algorithm: &str,
        reference: ReferenceFrame,
        options: Options,
    ) -> Result<Self> {
        Self::with_capabilities(data, algorithm, reference, options, &Capabilities::default())
    }

    pub fn with_capabilities(
        data: MpsData,
        algorithm: &str,
        reference: ReferenceFrame,
        options: Options,
        capabilities: &Capabilities,
    ) -> Result<Self> {
        let algorithm = algorithm.parse::<FlowAlgorithm>()?;
        let resolved = get_reference_image(reference, &data.frames, data.time_stamps.as_ref())?;
        let method = algorithm.build(&options, capabilities)?;
        let options = merge_options(algorithm.default_options(), &options);

        info!(
            "Optical flow with {algorithm}, reference frame {} (index {:?})",
            resolved.label, resolved.index
        );

        Ok(Self {
            data,
            method,
            options,
            reference_spec: reference,
            reference: resolved,
            displacement: None,
        })
    }

    /// Compute the motion of all frames relative to the reference.
    ///
    /// The result is cached. Later calls return the cached field unless `recompute` is set.
    pub fn get_displacements(&mut self, options: DisplacementOptions) -> Result<Displacement> {
        let DisplacementOptions {
            recompute,
            unit,
            scale,
            raw,
        } = options;

        if !(scale > 0.0 && scale <= 1.0) {
            return Err(MotionError::InvalidScale(scale).into());
        }

        let field = match &self.displacement {
            Some(cached) if !recompute => {
                if cached.unit != unit || cached.field.scale() != scale {
                    warn!(
                        "Returning cached displacement in {} at scale {}, set recompute to change it",
                        cached.unit,
                        cached.field.scale()
                    );
                }
                cached.field.clone()
            }
            _ => {
                let field = self.compute_displacements(unit, scale)?;
                self.displacement = Some(Cached {
                    field: field.clone(),
                    unit,
                });
                field
            }
        };

        if raw {
            Ok(Displacement::Raw(to_raw(field.compute())?))
        } else {
            Ok(Displacement::Field(field))
        }
    }

    fn compute_displacements(&self, unit: Unit, scale: f64) -> Result<VectorFrameSequence> {
        let mut u = if scale < 1.0 {
            let data = self.data.resize(scale)?;
            let reference =
                get_reference_image(self.reference_spec, &data.frames, data.time_stamps.as_ref())?;
            self.method
                .get_displacements(&data.frames, reference.image.view())?
        } else {
            self.method
                .get_displacements(&self.data.frames, self.reference.image.view())?
        };

        u /= scale;

        let dx = match unit {
            Unit::Pixels => 1.0,
            Unit::Um => {
                let um = self.data.info.um_per_pixel.unwrap_or(1.0);
                u *= um;
                um
            }
        };

        let field = u
            .permuted_axes([0, 1, 3, 2])
            .as_standard_layout()
            .into_owned()
            .into_dyn();

        Ok(VectorFrameSequence::lazy(field)?
            .with_dx(dx)
            .with_scale(scale))
    }

    /// Velocities between consecutive frames as a `(height, width, time - 1, 2)` field.
    ///
    /// Requires time stamps and an algorithm with velocity support.
    pub fn get_velocities(&self) -> Result<VectorFrameSequence> {
        if !self.method.supports_velocities() {
            return Err(MotionError::Unsupported {
                algorithm: self.method.name(),
                capability: "velocities",
            }
            .into());
        }

        let stamps = self
            .data
            .time_stamps
            .as_ref()
            .ok_or(MotionError::MissingTimeStamps)?;

        let v = self.method.get_velocities(&self.data.frames, stamps)?;
        let field = v
            .permuted_axes([0, 1, 3, 2])
            .as_standard_layout()
            .into_owned()
            .into_dyn();

        VectorFrameSequence::lazy(field)
    }

    /// Write the displacement field to `path`, computing it with default settings if needed.
    pub fn dump(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let field = match &self.displacement {
            Some(cached) => cached.field.clone(),
            None => self
                .get_displacements(Default::default())?
                .into_field()
                .ok_or_else(|| anyhow::anyhow!("expected a displacement field"))?,
        };

        info!("Dump displacements to {}", path.as_ref().display());
        field.save(path)
    }

    /// Canonical label of the reference specification.
    pub fn reference_frame(&self) -> &str {
        &self.reference.label
    }

    /// Index of the reference frame, `None` for statistic references.
    pub fn reference_frame_index(&self) -> Option<usize> {
        self.reference.index
    }

    pub fn reference_image(&self) -> &Array2<f64> {
        &self.reference.image
    }

    pub fn algorithm(&self) -> FlowAlgorithm {
        self.method.algorithm()
    }

    /// Merged algorithm options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn data(&self) -> &MpsData {
        &self.data
    }
}

impl fmt::Debug for OpticalFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, w) = self.data.size();
        write!(
            f,
            "OpticalFlow(data={h}x{w}x{}, flow_algorithm={})",
            self.data.num_frames(),
            self.algorithm()
        )
    }
}

/// `(h, w, t, 2)` field values back to the `(h, w, 2, t)` layout.
fn to_raw(field: ArrayD<f64>) -> Result<Array4<f64>> {
    Ok(field
        .into_dimensionality::<Ix4>()?
        .permuted_axes([0, 1, 3, 2])
        .as_standard_layout()
        .into_owned())
}
