//! # Microscopy frame data

use crate::error::MotionError;
use crate::frame_sequence::{has_member, read_member};
use crate::scaling::resize_frames;
use crate::utils::check_time_stamps;
use anyhow::Result;
use log::*;
use ndarray::{arr1, Array1, Array3, Axis};
use ndarray_npy::{NpzReader, NpzWriter};
use std::fs::File;
use std::path::Path;

/// Acquisition metadata.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct DataInfo {
    /// Physical size of one pixel in micrometres.
    pub um_per_pixel: Option<f64>,
}

/// Stack of frames with optional time stamps.
#[derive(Clone, Debug, PartialEq)]
pub struct MpsData {
    /// `(height, width, time)` intensities.
    pub frames: Array3<f64>,
    /// One stamp per frame.
    pub time_stamps: Option<Array1<f64>>,
    pub info: DataInfo,
}

impl MpsData {
    pub fn new(frames: Array3<f64>) -> Self {
        Self {
            frames,
            time_stamps: None,
            info: Default::default(),
        }
    }

    /// Attach time stamps, one per frame, strictly increasing.
    pub fn with_time_stamps(self, time_stamps: Array1<f64>) -> Result<Self> {
        check_time_stamps(&time_stamps, self.num_frames())?;

        Ok(Self {
            time_stamps: Some(time_stamps),
            ..self
        })
    }

    pub fn with_um_per_pixel(mut self, um_per_pixel: f64) -> Self {
        self.info.um_per_pixel = Some(um_per_pixel);
        self
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len_of(Axis(2))
    }

    /// Spatial size `(height, width)`.
    pub fn size(&self) -> (usize, usize) {
        let (h, w, _) = self.frames.dim();
        (h, w)
    }

    /// Load from an `.npz` archive.
    ///
    /// The archive must hold a `frames` member and may hold `time_stamps` and `um_per_pixel`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.extension().and_then(|e| e.to_str()) != Some("npz") {
            return Err(MotionError::UnknownFormat(path.to_path_buf()).into());
        }

        let mut npz = NpzReader::new(File::open(path)?)?;
        let frames: Array3<f64> = read_member(&mut npz, "frames")?;

        let time_stamps = if has_member(&mut npz, "time_stamps")? {
            Some(read_member(&mut npz, "time_stamps")?)
        } else {
            None
        };

        let um_per_pixel = if has_member(&mut npz, "um_per_pixel")? {
            let v: Array1<f64> = read_member(&mut npz, "um_per_pixel")?;
            v.first().copied()
        } else {
            None
        };

        let (h, w, t) = frames.dim();
        info!("Loaded {t} frames of {h}x{w} from {}", path.display());

        let data = Self {
            frames,
            time_stamps: None,
            info: DataInfo { um_per_pixel },
        };

        match time_stamps {
            Some(stamps) => data.with_time_stamps(stamps),
            None => Ok(data),
        }
    }

    /// Store as an `.npz` archive readable by [`MpsData::from_file`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut npz = NpzWriter::new(File::create(path)?);
        npz.add_array("frames", &self.frames)?;
        if let Some(stamps) = &self.time_stamps {
            npz.add_array("time_stamps", stamps)?;
        }
        if let Some(um) = self.info.um_per_pixel {
            npz.add_array("um_per_pixel", &arr1(&[um]))?;
        }
        npz.finish()?;
        Ok(())
    }

    /// Spatially downsample every frame.
    ///
    /// The physical pixel size grows accordingly. Time stamps are kept.
    pub fn resize(&self, scale: f64) -> Result<Self> {
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(MotionError::InvalidScale(scale).into());
        }

        let (h, w) = self.size();
        let size = (
            ((h as f64 * scale) as usize).max(1),
            ((w as f64 * scale) as usize).max(1),
        );

        debug!("Resize frames from {h}x{w} to {}x{}", size.0, size.1);

        Ok(Self {
            frames: resize_frames(&self.frames, size),
            time_stamps: self.time_stamps.clone(),
            info: DataInfo {
                um_per_pixel: self.info.um_per_pixel.map(|um| um / scale),
            },
        })
    }
}
