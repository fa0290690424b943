//! Per-pixel class maps produced by a segmentation model.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypesError};

/// Largest number of classes a [`SegmentationMask`] can represent.
pub const MAX_MASK_CLASSES: u32 = 256;

/// A semantic segmentation mask.
///
/// Each pixel holds the class index predicted for it. Class 0 is treated as
/// background by [`SegmentationMask::mean_iou`].
///
/// # Storage Format
///
/// Row-major `Vec<u8>`; the pixel at row `y`, column `x` lives at
/// `y * width + x`.
///
/// # Example
///
/// ```
/// use unet_types::SegmentationMask;
///
/// let mut mask = SegmentationMask::new(128, 64);
/// assert_eq!(mask.width(), 128);
/// assert_eq!(mask.height(), 64);
///
/// mask.set(10, 5, 3);
/// assert_eq!(mask.get(10, 5), Some(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationMask {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl SegmentationMask {
    /// Creates a mask with every pixel set to background.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Wraps existing row-major class data.
    ///
    /// Returns `None` if `data.len() != width * height`.
    #[must_use]
    pub fn from_data(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Builds a mask from integer class indices, as produced by an argmax
    /// over the class channel.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::DataSizeMismatch`] if the index count does not
    /// cover the mask and [`TypesError::InvalidClassId`] for an index outside
    /// `0..256`.
    pub fn from_class_indices(width: usize, height: usize, indices: &[i64]) -> Result<Self> {
        let expected = width * height;
        if indices.len() != expected {
            return Err(TypesError::data_size_mismatch(expected, indices.len()));
        }

        let data = indices
            .iter()
            .map(|&idx| {
                u8::try_from(idx).map_err(|_| TypesError::invalid_class_id(idx, MAX_MASK_CLASSES))
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Raw row-major class data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y * self.width + x)
    }

    /// Class at column `x`, row `y`, or `None` when out of bounds.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        self.index(x, y).and_then(|idx| self.data.get(idx).copied())
    }

    /// Sets the class at column `x`, row `y`.
    ///
    /// Returns `false` when out of bounds.
    pub fn set(&mut self, x: usize, y: usize, class_id: u8) -> bool {
        let Some(idx) = self.index(x, y) else {
            return false;
        };
        self.data.get_mut(idx).is_some_and(|pixel| {
            *pixel = class_id;
            true
        })
    }

    /// Pixel count per class, ordered by class index.
    #[must_use]
    pub fn class_counts(&self) -> BTreeMap<u8, usize> {
        let mut counts = BTreeMap::new();
        for &class_id in &self.data {
            *counts.entry(class_id).or_insert(0) += 1;
        }
        counts
    }

    /// Sorted class indices present in the mask.
    #[must_use]
    pub fn unique_classes(&self) -> Vec<u8> {
        self.class_counts().into_keys().collect()
    }

    /// Intersection over union for one class.
    ///
    /// Returns `None` if the masks differ in size. A class absent from both
    /// masks scores 1.0.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn iou(&self, other: &Self, class_id: u8) -> Option<f32> {
        if !self.same_size(other) {
            return None;
        }

        let (intersection, union) = self.data.iter().zip(&other.data).fold(
            (0usize, 0usize),
            |(inter, uni), (&a, &b)| {
                let in_a = a == class_id;
                let in_b = b == class_id;
                (
                    inter + usize::from(in_a && in_b),
                    uni + usize::from(in_a || in_b),
                )
            },
        );

        if union == 0 {
            Some(1.0)
        } else {
            Some(intersection as f32 / union as f32)
        }
    }

    /// Mean IoU over every non-background class present in either mask.
    ///
    /// Returns `None` if the masks differ in size.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_iou(&self, other: &Self) -> Option<f32> {
        if !self.same_size(other) {
            return None;
        }

        let classes: BTreeSet<u8> = self
            .data
            .iter()
            .chain(&other.data)
            .copied()
            .filter(|&c| c != 0)
            .collect();

        if classes.is_empty() {
            return Some(1.0);
        }

        let total: f32 = classes
            .iter()
            .filter_map(|&class_id| self.iou(other, class_id))
            .sum();

        Some(total / classes.len() as f32)
    }

    /// Fraction of pixels where both masks agree.
    ///
    /// Returns `None` if the masks differ in size or are empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn pixel_accuracy(&self, other: &Self) -> Option<f32> {
        if !self.same_size(other) || self.data.is_empty() {
            return None;
        }

        let matching = self
            .data
            .iter()
            .zip(&other.data)
            .filter(|(a, b)| a == b)
            .count();

        Some(matching as f32 / self.data.len() as f32)
    }

    const fn same_size(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl Default for SegmentationMask {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
