use assert_approx_eq::assert_approx_eq;
use mps_motion::prelude::v1::*;
use ndarray::{Array, Array1, Array3, ArrayView2, Axis};
use std::sync::Arc;

/// Frames that all show the same textured image.
fn still_frames(h: usize, w: usize, t: usize) -> Array3<f64> {
    Array3::from_shape_fn((h, w, t), |(y, x, _)| {
        let (x, y) = (x as f64, y as f64);
        (100.0 + 50.0 * (x * 0.3).sin() * (y * 0.2).cos()).round()
    })
}

fn still_data() -> MpsData {
    MpsData::new(still_frames(48, 64, 5))
        .with_time_stamps(Array::linspace(0.0, 40.0, 5))
        .unwrap()
        .with_um_per_pixel(0.65)
}

/// Tracker that moves points by `(1, 2)` in every frame.
struct Drift;

impl PointTracker for Drift {
    fn track(
        &self,
        _: ArrayView2<u8>,
        _: ArrayView2<u8>,
        points: &[nalgebra::Point2<f32>],
        _: &LkParams,
    ) -> Result<TrackedPoints> {
        let mut out = TrackedPoints::with_capacity(points.len());
        for p in points {
            out.points.push(nalgebra::Point2::new(p.x + 1.0, p.y + 2.0));
            out.status.push(1);
            out.error.push(0.0);
        }
        Ok(out)
    }
}

fn drift_capabilities() -> Capabilities {
    Capabilities {
        point_tracker: Arc::new(Drift),
        ..Default::default()
    }
}

fn pixels() -> DisplacementOptions {
    DisplacementOptions {
        unit: Unit::Pixels,
        ..Default::default()
    }
}

#[test]
fn still_frames_do_not_move() {
    for interpolate in [false, true] {
        let mut options = Options::new();
        options.insert("interpolate".into(), Property::Bool(interpolate));

        let mut flow =
            OpticalFlow::new(still_data(), "lucas_kanade", ReferenceFrame::Time(0.0), options)
                .unwrap();

        let u = flow
            .get_displacements(pixels())
            .unwrap()
            .into_field()
            .unwrap();

        assert_eq!(u.shape(), &[48, 64, 5, 2]);
        assert!(u.compute().iter().all(|&v| v == 0.0));
    }
}

#[test]
fn block_matching_still_frames() {
    let mut flow = OpticalFlow::new(
        still_data(),
        "block_matching",
        ReferenceFrame::Index(2),
        Options::new(),
    )
    .unwrap();

    let u = flow
        .get_displacements(DisplacementOptions {
            raw: true,
            ..pixels()
        })
        .unwrap()
        .into_raw()
        .unwrap();

    assert_eq!(u.dim(), (48, 64, 2, 5));
    assert!(u.iter().all(|&v| v == 0.0));
}

#[test]
fn reference_resolution() {
    let flow = OpticalFlow::new(
        still_data(),
        "lucas_kanade",
        ReferenceFrame::Time(15.0),
        Options::new(),
    )
    .unwrap();

    assert_eq!(flow.reference_frame(), "15");
    assert_eq!(flow.reference_frame_index(), Some(2));
    assert_eq!(flow.reference_image().dim(), (48, 64));

    let flow = OpticalFlow::new(
        still_data(),
        "lucas_kanade",
        ReferenceFrame::Statistic(Statistic::Median),
        Options::new(),
    )
    .unwrap();

    assert_eq!(flow.reference_frame(), "median");
    assert_eq!(flow.reference_frame_index(), None);
}

#[test]
fn configuration_errors() {
    let err = OpticalFlow::new(still_data(), "horn_schunck", Default::default(), Options::new())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MotionError>(),
        Some(MotionError::InvalidAlgorithm { .. })
    ));

    let data = MpsData::new(still_frames(8, 8, 3));
    let err = OpticalFlow::new(data, "lucas_kanade", ReferenceFrame::Time(0.0), Options::new())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MotionError>(),
        Some(MotionError::MissingTimeStamps)
    ));

    let err = OpticalFlow::new(still_data(), "farneback", Default::default(), Options::new())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MotionError>(),
        Some(MotionError::CapabilityUnavailable { .. })
    ));
}

#[test]
fn options_are_merged() {
    let mut options = Options::new();
    options.insert("step".into(), Property::usize(8));

    let flow =
        OpticalFlow::new(still_data(), "lucas_kanade", Default::default(), options).unwrap();

    assert_eq!(flow.algorithm(), FlowAlgorithm::LucasKanade);
    assert!(matches!(flow.options()["step"], Property::Usize(p) if p.val == 8));
    assert!(matches!(flow.options()["max_level"], Property::Usize(p) if p.val == 2));
}

#[test]
fn scale_must_not_upsample() {
    let mut flow = OpticalFlow::new(
        still_data(),
        "lucas_kanade",
        Default::default(),
        Options::new(),
    )
    .unwrap();

    let err = flow
        .get_displacements(DisplacementOptions {
            scale: 2.0,
            ..Default::default()
        })
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<MotionError>(),
        Some(MotionError::InvalidScale(_))
    ));
}

#[test]
fn units_and_scale() {
    let mut flow = OpticalFlow::with_capabilities(
        still_data(),
        "lucas_kanade",
        Default::default(),
        Options::new(),
        &drift_capabilities(),
    )
    .unwrap();

    let u = flow
        .get_displacements(pixels())
        .unwrap()
        .into_field()
        .unwrap();
    assert_eq!(u.dx(), 1.0);
    let values = u.compute();
    assert!(values.index_axis(Axis(3), 0).iter().all(|&v| v == 1.0));
    assert!(values.index_axis(Axis(3), 1).iter().all(|&v| v == 2.0));

    // Tracking at half resolution doubles the measured pixel shift.
    let u = flow
        .get_displacements(DisplacementOptions {
            recompute: true,
            unit: Unit::Pixels,
            scale: 0.5,
            raw: false,
        })
        .unwrap()
        .into_field()
        .unwrap();
    assert_eq!(u.shape(), &[24, 32, 5, 2]);
    assert_eq!(u.scale(), 0.5);
    assert!(u.x().compute().iter().all(|&v| v == 4.0));
    assert!(u.y().compute().iter().all(|&v| v == 2.0));

    let u = flow
        .get_displacements(DisplacementOptions {
            recompute: true,
            ..Default::default()
        })
        .unwrap()
        .into_field()
        .unwrap();
    assert_eq!(u.dx(), 0.65);
    for &v in u.y().compute().iter() {
        assert_approx_eq!(v, 0.65);
    }
}

#[test]
fn result_is_cached() {
    let mut flow = OpticalFlow::with_capabilities(
        still_data(),
        "lucas_kanade",
        Default::default(),
        Options::new(),
        &drift_capabilities(),
    )
    .unwrap();

    let first = flow.get_displacements(pixels()).unwrap().into_field().unwrap();

    // Without recompute the cached field is returned even for another unit.
    let second = flow
        .get_displacements(Default::default())
        .unwrap()
        .into_field()
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(second.dx(), 1.0);

    let raw = flow
        .get_displacements(DisplacementOptions {
            raw: true,
            ..pixels()
        })
        .unwrap()
        .into_raw()
        .unwrap();
    assert_eq!(raw.dim(), (48, 64, 2, 5));
    assert!(raw.index_axis(Axis(2), 1).iter().all(|&v| v == 2.0));
}

#[test]
fn velocities_need_capability() {
    let flow = OpticalFlow::new(
        still_data(),
        "lucas_kanade",
        Default::default(),
        Options::new(),
    )
    .unwrap();

    let err = flow.get_velocities().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MotionError>(),
        Some(MotionError::Unsupported { .. })
    ));
}

/// Reports the mean intensity difference as a uniform y displacement.
struct MeanDrift;

impl DenseFlow<FarnebackParams> for MeanDrift {
    fn calc(
        &self,
        reference: ArrayView2<u8>,
        image: ArrayView2<u8>,
        _: &FarnebackParams,
    ) -> Result<Array3<f64>> {
        let mean = |a: ArrayView2<u8>| a.mapv(f64::from).mean().unwrap_or(0.0);
        let d = mean(image) - mean(reference);
        let (h, w) = reference.dim();
        Ok(Array3::from_shape_fn((h, w, 2), |(_, _, c)| {
            if c == 1 {
                d
            } else {
                0.0
            }
        }))
    }
}

#[test]
fn dense_provider_velocities() {
    // A bright square grows by one pixel per frame.
    let frames = Array3::from_shape_fn((16, 16, 4), |(y, x, t)| {
        if y < 4 + t && x < 4 + t {
            1.0
        } else {
            0.0
        }
    });
    let data = MpsData::new(frames)
        .with_time_stamps(Array1::from(vec![0.0, 2.0, 4.0, 6.0]))
        .unwrap();

    let caps = Capabilities {
        farneback: Some(Arc::new(MeanDrift) as Arc<dyn DenseFlow<FarnebackParams>>),
        ..Default::default()
    };

    let mut flow = OpticalFlow::with_capabilities(
        data,
        "farneback",
        ReferenceFrame::Index(0),
        Options::new(),
        &caps,
    )
    .unwrap();

    let v = flow.get_velocities().unwrap();
    assert_eq!(v.shape(), &[16, 16, 3, 2]);
    assert!(v.y().compute().iter().all(|&v| v == 0.0));
    assert!(v.x().compute().iter().all(|&v| v > 0.0));

    let u = flow.get_displacements(pixels()).unwrap().into_field().unwrap();
    assert_eq!(u.shape(), &[16, 16, 4, 2]);
}

#[test]
fn dump_writes_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("u.npz");

    let mut flow = OpticalFlow::with_capabilities(
        still_data(),
        "lucas_kanade",
        Default::default(),
        Options::new(),
        &drift_capabilities(),
    )
    .unwrap();

    flow.dump(&path).unwrap();

    let loaded = VectorFrameSequence::from_file(&path).unwrap();
    assert_eq!(loaded.dx(), 0.65);
    assert_eq!(loaded.shape(), &[48, 64, 5, 2]);
}

#[test]
fn mechanics_of_still_frames() {
    let mut flow = OpticalFlow::new(
        still_data(),
        "lucas_kanade",
        Default::default(),
        Options::new(),
    )
    .unwrap();

    let u = flow
        .get_displacements(Default::default())
        .unwrap()
        .into_field()
        .unwrap();
    let m = Mechanics::new(u);

    let strain = m.principal_strain();
    assert!(strain.is_lazy());
    assert!(strain.compute().iter().all(|&v| v == 0.0));
}
