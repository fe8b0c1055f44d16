//! # Field persistence
//!
//! Two container formats are supported, picked by file extension:
//!
//! * `.npy` - a single flat array. Rank is recovered from the number of dimensions.
//! * `.npz` - an archive of named members: `array`, `dx` and `scale`.

use crate::error::MotionError;
use anyhow::Result;
use ndarray::{arr1, Array1, ArrayD};
use ndarray_npy::{read_npy, write_npy, NpzReader, NpzWriter};
use std::fs::File;
use std::path::Path;

/// Array payload together with its spacing metadata.
pub(crate) struct Stored {
    pub array: ArrayD<f64>,
    pub dx: f64,
    pub scale: f64,
}

enum Format {
    Npy,
    Npz,
}

fn format(path: &Path) -> Result<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(Format::Npy),
        Some("npz") => Ok(Format::Npz),
        _ => Err(MotionError::UnknownFormat(path.to_path_buf()).into()),
    }
}

pub(crate) fn save(path: &Path, array: &ArrayD<f64>, dx: f64, scale: f64) -> Result<()> {
    match format(path)? {
        Format::Npy => write_npy(path, array)?,
        Format::Npz => {
            let mut npz = NpzWriter::new(File::create(path)?);
            npz.add_array("array", array)?;
            npz.add_array("dx", &arr1(&[dx]))?;
            npz.add_array("scale", &arr1(&[scale]))?;
            npz.finish()?;
        }
    }

    Ok(())
}

pub(crate) fn load(path: &Path) -> Result<Stored> {
    match format(path)? {
        Format::Npy => Ok(Stored {
            array: read_npy(path)?,
            dx: 1.0,
            scale: 1.0,
        }),
        Format::Npz => {
            let mut npz = NpzReader::new(File::open(path)?)?;
            let array = read_member(&mut npz, "array")?;

            let mut scalar = |name: &str| -> Result<f64> {
                let v: Array1<f64> = read_member(&mut npz, name)?;
                Ok(v.first().copied().unwrap_or(1.0))
            };

            Ok(Stored {
                array,
                dx: scalar("dx")?,
                scale: scalar("scale")?,
            })
        }
    }
}

/// Read an archive member by name, with or without the `.npy` suffix.
pub(crate) fn read_member<D: ndarray::Dimension>(
    npz: &mut NpzReader<File>,
    name: &str,
) -> Result<ndarray::Array<f64, D>> {
    let member = npz
        .names()?
        .into_iter()
        .find(|n| n.trim_end_matches(".npy") == name)
        .ok_or_else(|| anyhow::anyhow!("archive has no member named {name}"))?;

    Ok(npz.by_name(&member)?)
}

/// Whether an archive has a member called `name`.
pub(crate) fn has_member(npz: &mut NpzReader<File>, name: &str) -> Result<bool> {
    Ok(npz
        .names()?
        .iter()
        .any(|n| n.trim_end_matches(".npy") == name))
}
