//! Pooling layer on top of burn's pooling modules.
//!
//! burn pools with symmetric padding and floor rounding only. Ceil rounding
//! and asymmetric padding are handled by padding the input first: `-inf` for
//! max pooling, zeros for average pooling. Averages are divided by a pooled
//! mask so padded elements are counted exactly as the layer asks.

use burn::tensor::{
    Tensor,
    backend::Backend,
    module::{adaptive_avg_pool2d, avg_pool2d, max_pool2d},
};

use crate::graph::{PoolingInfo, PoolingType};

/// A pooling layer over NCHW tensors.
#[derive(Debug, Clone, Copy)]
pub struct Pooling {
    info: PoolingInfo,
}

impl Pooling {
    pub fn new(info: PoolingInfo) -> Self {
        Self { info }
    }

    pub fn info(&self) -> &PoolingInfo {
        &self.info
    }

    /// Performs the forward pass.
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.info.global {
            return match self.info.pool_type {
                PoolingType::Avg => adaptive_avg_pool2d(input, [1, 1]),
                PoolingType::Max => input.max_dim(3).max_dim(2),
            };
        }

        let [_, _, height, width] = input.dims();
        let ps = self.info.pad_stride;
        let k = self.info.pool_size;
        let (extra_w, extra_h) = ps.ceil_padding(width, height, k, k);
        let pads = (
            ps.pad_left,
            ps.pad_right + extra_w,
            ps.pad_top,
            ps.pad_bottom + extra_h,
        );
        let kernel = [k, k];
        let stride = [ps.stride_y, ps.stride_x];

        match self.info.pool_type {
            PoolingType::Max => {
                let input = if pads == (0, 0, 0, 0) {
                    input
                } else {
                    input.pad(pads, f32::NEG_INFINITY)
                };
                max_pool2d(input, kernel, stride, [0, 0], [1, 1])
            }
            PoolingType::Avg => {
                if pads == (0, 0, 0, 0) {
                    return avg_pool2d(input, kernel, stride, [0, 0], true);
                }
                let device = input.device();
                let sums = avg_pool2d(input.pad(pads, 0.0), kernel, stride, [0, 0], true);

                // 1 where an element counts towards the average
                let declared_fill = if self.info.exclude_padding { 0.0 } else { 1.0 };
                let mask = Tensor::<B, 4>::ones([1, 1, height, width], &device)
                    .pad(
                        (ps.pad_left, ps.pad_right, ps.pad_top, ps.pad_bottom),
                        declared_fill,
                    )
                    .pad((0, extra_w, 0, extra_h), 0.0);
                let counts = avg_pool2d(mask, kernel, stride, [0, 0], true);

                sums.div(counts)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DimensionRoundingType, PadStrideInfo};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn grid(values: &[f32], side: usize) -> Tensor<TestBackend, 4> {
        let device = <TestBackend as Backend>::Device::default();
        Tensor::<TestBackend, 1>::from_floats(values, &device).reshape([1, 1, side, side])
    }

    fn values(tensor: Tensor<TestBackend, 4>) -> Vec<f32> {
        tensor.to_data().to_vec().unwrap()
    }

    #[test]
    fn test_max_pool_ceil_rounding() {
        // 4x4 input, 3x3 window, stride 2: floor gives 1x1, ceil gives 2x2
        let input = grid(
            &[
                1.0, 2.0, 3.0, 4.0, //
                5.0, 6.0, 7.0, 8.0, //
                9.0, 10.0, 11.0, 12.0, //
                13.0, 14.0, 15.0, 16.0,
            ],
            4,
        );
        let ps = PadStrideInfo::new(2, 2, 0, 0).with_rounding(DimensionRoundingType::Ceil);
        let pool = Pooling::new(PoolingInfo::new(PoolingType::Max, 3, ps));

        let out = pool.forward(input);
        assert_eq!(out.dims(), [1, 1, 2, 2]);
        assert_eq!(values(out), vec![11.0, 12.0, 15.0, 16.0]);
    }

    #[test]
    fn test_max_pool_asymmetric_padding_ignores_padding() {
        let input = grid(&[-4.0, -3.0, -2.0, -1.0], 2);
        let ps = PadStrideInfo::asymmetric(1, 1, 0, 1, 0, 1, DimensionRoundingType::Floor);
        let pool = Pooling::new(PoolingInfo::new(PoolingType::Max, 2, ps));

        let out = pool.forward(input);
        assert_eq!(out.dims(), [1, 1, 2, 2]);
        assert_eq!(values(out), vec![-1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_avg_pool_exclude_padding() {
        let input = grid(&[2.0, 4.0, 6.0, 8.0], 2);
        let ps = PadStrideInfo::new(1, 1, 1, 1);
        let excluded = Pooling::new(
            PoolingInfo::new(PoolingType::Avg, 2, ps).with_exclude_padding(true),
        );
        let included = Pooling::new(PoolingInfo::new(PoolingType::Avg, 2, ps));

        let out = values(excluded.forward(input.clone()));
        assert_eq!(out.len(), 9);
        assert!((out[0] - 2.0).abs() < 1e-5);
        assert!((out[4] - 5.0).abs() < 1e-5);

        let out = values(included.forward(input));
        assert!((out[0] - 0.5).abs() < 1e-5);
        assert!((out[4] - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_strided_single_element_pool_subsamples() {
        let input = grid(&(0..16).map(|v| v as f32).collect::<Vec<_>>(), 4);
        let ps = PadStrideInfo::new(2, 2, 0, 0);
        let pool = Pooling::new(PoolingInfo::new(PoolingType::Max, 1, ps).with_exclude_padding(true));

        assert_eq!(values(pool.forward(input)), vec![0.0, 2.0, 8.0, 10.0]);
    }

    #[test]
    fn test_ceil_single_element_pool_stays_inside_input() {
        let input = grid(&[1.0; 16], 4);
        let ps = PadStrideInfo::new(2, 2, 0, 0).with_rounding(DimensionRoundingType::Ceil);

        for pool_type in [PoolingType::Max, PoolingType::Avg] {
            let pool = Pooling::new(PoolingInfo::new(pool_type, 1, ps));
            let out = pool.forward(input.clone());
            assert_eq!(out.dims(), [1, 1, 2, 2]);
            assert_eq!(values(out), vec![1.0; 4]);
        }
    }

    #[test]
    fn test_global_pooling() {
        let input = grid(&[1.0, 2.0, 3.0, 6.0], 2);
        let avg = Pooling::new(PoolingInfo::global(PoolingType::Avg));
        let max = Pooling::new(PoolingInfo::global(PoolingType::Max));

        let out = avg.forward(input.clone());
        assert_eq!(out.dims(), [1, 1, 1, 1]);
        assert!((values(out)[0] - 3.0).abs() < 1e-5);
        assert_eq!(values(max.forward(input)), vec![6.0]);
    }
}
