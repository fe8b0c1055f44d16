//! OpenCV backed capability providers

use log::*;
use mps_motion::prelude::v1::{Result, *};
use nalgebra as na;
use ndarray::{Array3, ArrayView2};
use opencv::core::{self, Mat, Point2f, Scalar, Size, TermCriteria, CV_8UC1};
use opencv::prelude::*;
use opencv::types::{VectorOfPoint2f, VectorOff32, VectorOfu8};
use std::sync::Arc;

/// Capabilities with every provider backed by OpenCV.
pub fn capabilities() -> Capabilities {
    Capabilities {
        point_tracker: Arc::new(CvPyrLk),
        farneback: Some(Arc::new(CvFarneback)),
        dual_tvl1: Some(Arc::new(CvDualTvl1)),
    }
}

fn to_mat(image: ArrayView2<u8>) -> Result<Mat> {
    let (h, w) = image.dim();
    let mut mat = Mat::new_rows_cols_with_default(h as _, w as _, CV_8UC1, Scalar::all(0.0))?;

    for ((y, x), &v) in image.indexed_iter() {
        *mat.at_2d_mut::<u8>(y as _, x as _)? = v;
    }

    Ok(mat)
}

fn from_flow(flow: &Mat) -> Result<Array3<f64>> {
    let (h, w) = (flow.rows() as usize, flow.cols() as usize);
    let mut out = Array3::zeros((h, w, 2));

    for y in 0..h {
        for x in 0..w {
            let d: &Point2f = flow.at_2d(y as _, x as _)?;
            out[[y, x, 0]] = d.x as f64;
            out[[y, x, 1]] = d.y as f64;
        }
    }

    Ok(out)
}

/// `cv::calcOpticalFlowPyrLK`.
pub struct CvPyrLk;

impl PointTracker for CvPyrLk {
    fn track(
        &self,
        prev: ArrayView2<u8>,
        next: ArrayView2<u8>,
        points: &[na::Point2<f32>],
        params: &LkParams,
    ) -> Result<TrackedPoints> {
        let prev = to_mat(prev)?;
        let next = to_mat(next)?;

        let prev_pts = points
            .iter()
            .map(|p| Point2f::new(p.x, p.y))
            .collect::<VectorOfPoint2f>();
        let mut next_pts = VectorOfPoint2f::new();
        let mut status = VectorOfu8::new();
        let mut err = VectorOff32::new();

        let criteria = TermCriteria::new(
            core::TermCriteria_COUNT | core::TermCriteria_EPS,
            params.max_iter as _,
            params.epsilon as _,
        )?;

        opencv::video::calc_optical_flow_pyr_lk(
            &prev,
            &next,
            &prev_pts,
            &mut next_pts,
            &mut status,
            &mut err,
            Size::new(params.win_size as _, params.win_size as _),
            params.max_level as _,
            criteria,
            0,
            1e-4,
        )?;

        let mut out = TrackedPoints::with_capacity(points.len());

        for ((p, s), e) in next_pts.iter().zip(status.iter()).zip(err.iter()) {
            out.points.push(na::Point2::new(p.x, p.y));
            out.status.push(s);
            out.error.push(e);
        }

        let lost = out.status.iter().filter(|&&s| s == 0).count();
        if lost > 0 {
            trace!("OpenCV lost {lost} points");
        }

        Ok(out)
    }
}

/// `cv::calcOpticalFlowFarneback`.
pub struct CvFarneback;

impl DenseFlow<FarnebackParams> for CvFarneback {
    fn calc(
        &self,
        reference: ArrayView2<u8>,
        image: ArrayView2<u8>,
        params: &FarnebackParams,
    ) -> Result<Array3<f64>> {
        let reference = to_mat(reference)?;
        let image = to_mat(image)?;
        let mut flow = Mat::default();

        opencv::video::calc_optical_flow_farneback(
            &reference,
            &image,
            &mut flow,
            params.pyr_scale as _,
            params.levels as _,
            params.winsize as _,
            params.iterations as _,
            params.poly_n as _,
            params.poly_sigma as _,
            params.flags as _,
        )?;

        from_flow(&flow)
    }
}

/// `cv::optflow::DualTVL1OpticalFlow`.
pub struct CvDualTvl1;

impl DenseFlow<DualTvl1Params> for CvDualTvl1 {
    fn calc(
        &self,
        reference: ArrayView2<u8>,
        image: ArrayView2<u8>,
        params: &DualTvl1Params,
    ) -> Result<Array3<f64>> {
        let reference = to_mat(reference)?;
        let image = to_mat(image)?;
        let mut flow = Mat::default();

        let mut tvl1 = <dyn opencv::optflow::DualTVL1OpticalFlow>::create(
            params.tau as _,
            params.lambda as _,
            params.theta as _,
            params.nscales as _,
            params.warps as _,
            params.epsilon as _,
            params.inner_iterations as _,
            params.outer_iterations as _,
            params.scale_step as _,
            params.gamma as _,
            params.median_filtering as _,
            false,
        )?;

        tvl1.calc(&reference, &image, &mut flow)?;

        from_flow(&flow)
    }
}
