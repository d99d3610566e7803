//! Strided-layout reasoning: contiguity per memory format, backing-buffer
//! extents, and broadcast views. Everything here is a pure function of
//! shape and stride.

use std::fmt;

use crate::error::{Result, TensorError};
use crate::shape::contiguous_strides;

/// Physical ordering of a tensor's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryFormat {
    /// Row-major, last dimension innermost.
    #[default]
    Contiguous,
    /// NCL tensors stored as NLC.
    ChannelsLast1d,
    /// NCHW tensors stored as NHWC.
    ChannelsLast2d,
    /// NCDHW tensors stored as NDHWC.
    ChannelsLast3d,
}

impl MemoryFormat {
    /// The only rank a channel-last format is defined for. `None` means any rank.
    pub fn required_rank(&self) -> Option<usize> {
        match self {
            MemoryFormat::Contiguous => None,
            MemoryFormat::ChannelsLast1d => Some(3),
            MemoryFormat::ChannelsLast2d => Some(4),
            MemoryFormat::ChannelsLast3d => Some(5),
        }
    }

    /// Dimensions from innermost to outermost, or `None` if the format is not
    /// defined for `rank`.
    ///
    /// Channel-last formats put the channel dimension innermost, then the
    /// spatial dimensions from last to first, then the batch dimension.
    pub fn dim_order(&self, rank: usize) -> Option<Vec<usize>> {
        match self.required_rank() {
            None => Some((0..rank).rev().collect()),
            Some(r) if r != rank => None,
            Some(_) => {
                let mut order = Vec::with_capacity(rank);
                order.push(1);
                order.extend((2..rank).rev());
                order.push(0);
                Some(order)
            }
        }
    }
}

impl fmt::Display for MemoryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryFormat::Contiguous => "contiguous",
            MemoryFormat::ChannelsLast1d => "channels_last_1d",
            MemoryFormat::ChannelsLast2d => "channels_last_2d",
            MemoryFormat::ChannelsLast3d => "channels_last_3d",
        };
        write!(f, "{}", name)
    }
}

/// Whether `stride` lays out `shape` densely in `format` order.
///
/// Extent-1 dimensions are exempt from the stride check since their stride
/// never contributes to an element offset.
pub fn is_contiguous(shape: &[usize], stride: &[usize], format: MemoryFormat) -> bool {
    if shape.len() != stride.len() {
        return false;
    }
    let order = match format.dim_order(shape.len()) {
        Some(order) => order,
        None => return false,
    };
    let mut expected = 1usize;
    for i in order {
        if shape[i] != 1 && stride[i] != expected {
            log::trace!(
                "not {}: dim {} has stride {}, expected {}",
                format,
                i,
                stride[i],
                expected
            );
            return false;
        }
        expected = expected.saturating_mul(shape[i]);
    }
    true
}

/// Dense strides for `shape` in `format` order, or `None` if the format is
/// not defined for this rank.
pub fn strides_for_format(shape: &[usize], format: MemoryFormat) -> Option<Vec<usize>> {
    if format == MemoryFormat::Contiguous {
        return Some(contiguous_strides(shape));
    }
    let order = format.dim_order(shape.len())?;
    let mut strides = vec![0usize; shape.len()];
    let mut acc = 1usize;
    for i in order {
        strides[i] = acc;
        acc = acc.saturating_mul(shape[i]);
    }
    Some(strides)
}

/// Index of the largest strictly positive stride (first one on ties).
fn max_stride_dim(stride: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, &s) in stride.iter().enumerate() {
        if s > best.map_or(0, |(_, b)| b) {
            best = Some((i, s));
        }
    }
    best.map(|(i, _)| i)
}

/// Shape of the one-dimensional (or, when contiguous, the logical) backing
/// buffer the gather instruction reads from.
pub fn base_shape(shape: &[usize], stride: &[usize]) -> Vec<usize> {
    if is_contiguous(shape, stride, MemoryFormat::Contiguous) {
        if shape.is_empty() {
            vec![1]
        } else {
            shape.to_vec()
        }
    } else {
        match max_stride_dim(stride) {
            Some(i) => vec![shape[i] * stride[i]],
            None => vec![1],
        }
    }
}

/// Bytes of backing memory a tensor with this layout needs.
///
/// Contiguous layouts need `numel * elem_size` (one element for rank 0).
/// Otherwise the dimension with the largest stride decides:
/// `shape[d] * stride[d]` elements, or a single element when no stride is
/// positive. This under-approximates some overlapping layouts but covers
/// every layout this crate produces.
pub fn minimal_buffer_extent(shape: &[usize], stride: &[usize], elem_size: usize) -> usize {
    if is_contiguous(shape, stride, MemoryFormat::Contiguous) {
        if shape.is_empty() {
            elem_size
        } else {
            shape
                .iter()
                .fold(elem_size, |acc, &d| acc.saturating_mul(d))
        }
    } else {
        match max_stride_dim(stride) {
            Some(i) => shape[i].saturating_mul(stride[i]).saturating_mul(elem_size),
            None => elem_size,
        }
    }
}

/// Strides that view a tensor of `shape`/`stride` as `target`, using stride 0
/// on broadcast dimensions.
pub fn expand_strides(shape: &[usize], stride: &[usize], target: &[usize]) -> Result<Vec<usize>> {
    if shape.len() > target.len() {
        return Err(TensorError::BroadcastError {
            a: shape.to_vec(),
            b: target.to_vec(),
        });
    }
    let lead = target.len() - shape.len();
    let mut out = vec![0usize; target.len()];
    for (i, slot) in out.iter_mut().enumerate().skip(lead) {
        let src = i - lead;
        if shape[src] == target[i] {
            *slot = stride[src];
        } else if shape[src] != 1 {
            return Err(TensorError::BroadcastError {
                a: shape.to_vec(),
                b: target.to_vec(),
            });
        }
    }
    Ok(out)
}

/// Calls `f` with the element offset of every logical element, in row-major
/// order of the logical index.
pub fn for_each_offset(shape: &[usize], stride: &[usize], mut f: impl FnMut(usize)) {
    if shape.iter().any(|&d| d == 0) {
        return;
    }
    let mut index = vec![0usize; shape.len()];
    let mut offset = 0usize;
    loop {
        f(offset);
        // Odometer increment from the innermost dimension.
        let mut d = shape.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            index[d] += 1;
            offset += stride[d];
            if index[d] < shape[d] {
                break;
            }
            offset -= stride[d] * index[d];
            index[d] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_contiguous() {
        assert!(is_contiguous(&[2, 3, 4], &[12, 4, 1], MemoryFormat::Contiguous));
        assert!(is_contiguous(&[], &[], MemoryFormat::Contiguous));
        assert!(!is_contiguous(&[2, 3, 4], &[12, 1, 4], MemoryFormat::Contiguous));
    }

    #[test]
    fn test_perturbed_stride_breaks_contiguity() {
        let shape = [2, 3, 4];
        let good = contiguous_strides(&shape);
        for d in 0..shape.len() {
            let mut bad = good.clone();
            bad[d] += 1;
            assert!(!is_contiguous(&shape, &bad, MemoryFormat::Contiguous), "dim {d}");
        }
    }

    #[test]
    fn test_unit_extent_is_exempt() {
        assert!(is_contiguous(&[2, 1, 4], &[4, 999, 1], MemoryFormat::Contiguous));
        assert!(is_contiguous(&[2, 2048, 1, 1], &[2048, 1, 2048, 2048], MemoryFormat::ChannelsLast2d));
    }

    #[test]
    fn test_length_mismatch_is_not_contiguous() {
        assert!(!is_contiguous(&[2, 3], &[3], MemoryFormat::Contiguous));
    }

    #[test]
    fn test_channels_last_2d() {
        // NCHW = [2, 3, 4, 5] stored as NHWC.
        let stride = [60, 1, 15, 3];
        assert!(is_contiguous(&[2, 3, 4, 5], &stride, MemoryFormat::ChannelsLast2d));
        assert!(!is_contiguous(&[2, 3, 4, 5], &stride, MemoryFormat::Contiguous));
        assert_eq!(
            strides_for_format(&[2, 3, 4, 5], MemoryFormat::ChannelsLast2d).unwrap(),
            stride.to_vec()
        );
    }

    #[test]
    fn test_channels_last_1d_and_3d() {
        let s1 = strides_for_format(&[2, 3, 4], MemoryFormat::ChannelsLast1d).unwrap();
        assert_eq!(s1, vec![12, 1, 3]);
        assert!(is_contiguous(&[2, 3, 4], &s1, MemoryFormat::ChannelsLast1d));

        let s3 = strides_for_format(&[2, 3, 4, 5, 6], MemoryFormat::ChannelsLast3d).unwrap();
        assert_eq!(s3, vec![360, 1, 90, 18, 3]);
        assert!(is_contiguous(&[2, 3, 4, 5, 6], &s3, MemoryFormat::ChannelsLast3d));
    }

    #[test]
    fn test_channels_last_wrong_rank() {
        for (format, rank) in [
            (MemoryFormat::ChannelsLast1d, 3),
            (MemoryFormat::ChannelsLast2d, 4),
            (MemoryFormat::ChannelsLast3d, 5),
        ] {
            for other in 0..7 {
                if other == rank {
                    continue;
                }
                let shape = vec![1usize; other];
                let stride = vec![1usize; other];
                assert!(!is_contiguous(&shape, &stride, format), "{format} rank {other}");
                assert!(strides_for_format(&shape, format).is_none());
            }
        }
    }

    #[test]
    fn test_minimal_buffer_extent() {
        assert_eq!(minimal_buffer_extent(&[2, 3], &[3, 1], 4), 24);
        assert_eq!(minimal_buffer_extent(&[2, 3], &[1, 2], 4), 24);
        assert_eq!(minimal_buffer_extent(&[], &[], 8), 8);
        assert_eq!(minimal_buffer_extent(&[4, 4], &[0, 0], 4), 4);
        // Gapped: every other row of a [4, 3] buffer.
        assert_eq!(minimal_buffer_extent(&[2, 3], &[6, 1], 2), 24);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_huge_empty_layouts_do_not_overflow() {
        let shape = [0, 1usize << 33, 1usize << 33];
        assert!(!is_contiguous(&shape, &[0, 1 << 33, 1], MemoryFormat::Contiguous));
        let row_major = contiguous_strides(&shape);
        assert_eq!(row_major[1..], [1 << 33, 1]);
        assert_eq!(minimal_buffer_extent(&shape, &row_major, 4), 0);
        let cl = strides_for_format(&[0, 1 << 33, 1 << 33], MemoryFormat::ChannelsLast1d).unwrap();
        assert_eq!(cl[1], 1);
    }

    #[test]
    fn test_base_shape() {
        assert_eq!(base_shape(&[2, 3], &[3, 1]), vec![2, 3]);
        assert_eq!(base_shape(&[], &[]), vec![1]);
        assert_eq!(base_shape(&[2, 3], &[1, 2]), vec![6]);
        assert_eq!(base_shape(&[3], &[0]), vec![1]);
    }

    #[test]
    fn test_expand_strides() {
        assert_eq!(expand_strides(&[3, 1], &[1, 1], &[2, 3, 4]).unwrap(), vec![0, 1, 0]);
        assert_eq!(expand_strides(&[], &[], &[2]).unwrap(), vec![0]);
        assert!(expand_strides(&[3], &[1], &[4]).is_err());
        assert!(expand_strides(&[2, 2], &[2, 1], &[2]).is_err());
    }

    #[test]
    fn test_for_each_offset() {
        let mut seen = Vec::new();
        for_each_offset(&[2, 3], &[1, 2], |o| seen.push(o));
        assert_eq!(seen, vec![0, 2, 4, 1, 3, 5]);

        let mut scalar = Vec::new();
        for_each_offset(&[], &[], |o| scalar.push(o));
        assert_eq!(scalar, vec![0]);

        let mut empty = Vec::new();
        for_each_offset(&[2, 0], &[0, 1], |o| empty.push(o));
        assert!(empty.is_empty());
    }
}
