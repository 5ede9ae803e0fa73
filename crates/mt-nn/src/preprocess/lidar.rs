// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Lidar intensity volumes and point-cloud voxelization.

use super::{parse_field, read_text};
use crate::error::{NnError, NnResult};
use mt_tensor::Tensor;
use std::path::Path;

/// Resamples lidar intensity volumes into a fixed grid.
///
/// The main entry point is [`LidarPipeline::process_volume`]: intensities
/// are scaled by the capture's own peak, resampled to the configured
/// `depth x height x width` grid, and passed through a small 3-D smoothing
/// kernel. Raw `x y z` point clouds can instead be bucketed into a binary
/// occupancy grid with [`LidarPipeline::voxelize`].
#[derive(Debug, Clone)]
pub struct LidarPipeline {
    grid: (usize, usize, usize),
}

/// Separable binomial taps approximating a sigma-1 Gaussian.
const SMOOTHING_TAPS: [f32; 3] = [0.25, 0.5, 0.25];

impl LidarPipeline {
    pub fn new(depth: usize, height: usize, width: usize) -> NnResult<Self> {
        if depth == 0 || height == 0 || width == 0 {
            return Err(NnError::configuration(format!(
                "voxel grid {depth}x{height}x{width} must be non-zero"
            )));
        }
        Ok(Self {
            grid: (depth, height, width),
        })
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.grid.0, self.grid.1, self.grid.2, 1]
    }

    /// Normalizes, resamples, and smooths a raw intensity volume.
    ///
    /// `shape` is the source `(depth, height, width)`; `values` holds the
    /// intensities in row-major order.
    pub fn process_volume(
        &self,
        values: &[f32],
        shape: (usize, usize, usize),
    ) -> NnResult<Tensor> {
        let (src_d, src_h, src_w) = shape;
        if values.is_empty() || src_d * src_h * src_w != values.len() {
            return Err(NnError::conversion(format!(
                "volume shape {src_d}x{src_h}x{src_w} does not match {} intensities",
                values.len()
            )));
        }
        if values.iter().any(|value| !value.is_finite()) {
            return Err(NnError::conversion("volume contains non-finite intensities"));
        }
        let peak = values.iter().cloned().fold(0.0f32, f32::max);
        let scale = if peak > 0.0 { 1.0 / peak } else { 0.0 };

        // Nearest-neighbour resample onto the fixed grid.
        let (depth, height, width) = self.grid;
        let mut resampled = vec![0.0f32; depth * height * width];
        for d in 0..depth {
            let sd = d * src_d / depth;
            for h in 0..height {
                let sh = h * src_h / height;
                for w in 0..width {
                    let sw = w * src_w / width;
                    resampled[(d * height + h) * width + w] =
                        values[(sd * src_h + sh) * src_w + sw] * scale;
                }
            }
        }
        let smoothed = self.smooth(&resampled);
        Ok(Tensor::from_vec(1, depth * height * width, smoothed)?)
    }

    /// One pass of the separable smoothing kernel along each axis, with
    /// clamped borders so mass near the edges is kept.
    fn smooth(&self, volume: &[f32]) -> Vec<f32> {
        let (depth, height, width) = self.grid;
        let index = |d: usize, h: usize, w: usize| (d * height + h) * width + w;
        let mut current = volume.to_vec();
        for axis in 0..3 {
            let extent = [depth, height, width][axis];
            let mut next = vec![0.0f32; current.len()];
            for d in 0..depth {
                for h in 0..height {
                    for w in 0..width {
                        let along = [d, h, w][axis];
                        let mut acc = 0.0f32;
                        for (offset, tap) in SMOOTHING_TAPS.iter().enumerate() {
                            let shifted = (along + offset).saturating_sub(1).min(extent - 1);
                            let mut pos = [d, h, w];
                            pos[axis] = shifted;
                            acc += current[index(pos[0], pos[1], pos[2])] * tap;
                        }
                        next[index(d, h, w)] = acc;
                    }
                }
            }
            current = next;
        }
        current
    }

    /// Loads a whitespace-separated `x y z` point list.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> NnResult<Tensor> {
        let text = read_text(path.as_ref())?;
        let mut points = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(NnError::conversion(format!(
                    "line {}: expected 3 coordinates, found {}",
                    index + 1,
                    fields.len()
                )));
            }
            points.push([
                parse_field(fields[0], index + 1)?,
                parse_field(fields[1], index + 1)?,
                parse_field(fields[2], index + 1)?,
            ]);
        }
        self.voxelize(&points)
    }

    /// Converts a point cloud into a flattened occupancy row.
    pub fn voxelize(&self, points: &[[f32; 3]]) -> NnResult<Tensor> {
        if points.is_empty() {
            return Err(NnError::conversion("point cloud is empty"));
        }
        let (depth, height, width) = self.grid;
        let mut lo = [f32::INFINITY; 3];
        let mut hi = [f32::NEG_INFINITY; 3];
        for point in points {
            for axis in 0..3 {
                if !point[axis].is_finite() {
                    return Err(NnError::conversion("point cloud contains non-finite values"));
                }
                lo[axis] = lo[axis].min(point[axis]);
                hi[axis] = hi[axis].max(point[axis]);
            }
        }
        let extents = [depth, height, width];
        let mut data = vec![0.0f32; depth * height * width];
        for point in points {
            let mut index = [0usize; 3];
            for axis in 0..3 {
                let range = hi[axis] - lo[axis];
                let position = if range <= f32::EPSILON {
                    0.0
                } else {
                    (point[axis] - lo[axis]) / range
                };
                let cell = (position * extents[axis] as f32) as usize;
                index[axis] = cell.min(extents[axis] - 1);
            }
            data[index[0] * height * width + index[1] * width + index[2]] = 1.0;
        }
        Ok(Tensor::from_vec(1, depth * height * width, data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_points_occupy_corner_voxels() {
        let pipeline = LidarPipeline::new(4, 4, 4).unwrap();
        let grid = pipeline
            .voxelize(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]])
            .unwrap();
        assert_eq!(grid.shape(), (1, 64));
        assert_eq!(grid.data()[0], 1.0);
        assert_eq!(grid.data()[63], 1.0);
        assert_eq!(grid.data().iter().sum::<f32>(), 2.0);
    }

    #[test]
    fn voxelization_is_scale_invariant() {
        let pipeline = LidarPipeline::new(4, 4, 4).unwrap();
        let base = pipeline
            .voxelize(&[[0.0, 0.0, 0.0], [0.5, 0.25, 1.0], [1.0, 1.0, 1.0]])
            .unwrap();
        let scaled = pipeline
            .voxelize(&[[10.0, 10.0, 10.0], [15.0, 12.5, 20.0], [20.0, 20.0, 20.0]])
            .unwrap();
        assert_eq!(base.data(), scaled.data());
    }

    #[test]
    fn degenerate_cloud_collapses_to_origin_voxel() {
        let pipeline = LidarPipeline::new(2, 2, 2).unwrap();
        let grid = pipeline.voxelize(&[[3.0, 3.0, 3.0]]).unwrap();
        assert_eq!(grid.data()[0], 1.0);
        assert_eq!(grid.data().iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn empty_cloud_is_rejected() {
        let pipeline = LidarPipeline::new(2, 2, 2).unwrap();
        assert!(matches!(
            pipeline.voxelize(&[]),
            Err(NnError::Conversion { .. })
        ));
    }

    #[test]
    fn volume_is_scaled_by_its_own_peak() {
        let pipeline = LidarPipeline::new(2, 2, 2).unwrap();
        let volume = [0.0, 40.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let grid = pipeline.process_volume(&volume, (2, 2, 2)).unwrap();
        let peak = grid.data().iter().cloned().fold(0.0f32, f32::max);
        // Smoothing spreads the single spike, but the total mass is its
        // normalized intensity and nothing exceeds 1.0.
        assert!(peak > 0.0 && peak < 1.0);
        let total: f32 = grid.data().iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn volume_resamples_to_the_configured_grid() {
        let pipeline = LidarPipeline::new(4, 4, 4).unwrap();
        let volume = vec![2.0f32; 2 * 2 * 2];
        let grid = pipeline.process_volume(&volume, (2, 2, 2)).unwrap();
        assert_eq!(grid.shape(), (1, 64));
        // A constant capture stays constant at full intensity.
        for value in grid.data() {
            assert!((value - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn smoothing_reaches_neighbouring_voxels() {
        let pipeline = LidarPipeline::new(3, 3, 3).unwrap();
        let mut volume = vec![0.0f32; 27];
        volume[13] = 8.0; // center voxel
        let grid = pipeline.process_volume(&volume, (3, 3, 3)).unwrap();
        let face_neighbour = grid.data()[13 - 1];
        assert!(face_neighbour > 0.0);
        assert!(grid.data()[13] > face_neighbour);
    }

    #[test]
    fn mismatched_volume_shape_is_rejected() {
        let pipeline = LidarPipeline::new(2, 2, 2).unwrap();
        assert!(matches!(
            pipeline.process_volume(&[1.0, 2.0], (2, 2, 2)),
            Err(NnError::Conversion { .. })
        ));
        assert!(matches!(
            pipeline.process_volume(&[f32::NAN; 8], (2, 2, 2)),
            Err(NnError::Conversion { .. })
        ));
    }

    #[test]
    fn load_parses_xyz_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.xyz");
        std::fs::write(&path, "0 0 0\n1 1 1\n").unwrap();
        let pipeline = LidarPipeline::new(4, 4, 4).unwrap();
        let grid = pipeline.load(&path).unwrap();
        assert_eq!(grid.data().iter().sum::<f32>(), 2.0);
    }
}
