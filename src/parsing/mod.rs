use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{DatasetError, Result};

pub mod csv;
pub mod decode;
pub mod gz;
pub mod idx;
pub mod mnist;

/// Images and their one-hot labels, one sample per row.
///
/// Both matrices always have the same number of rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    data: Array2<f32>,
    target: Array2<f32>,
}

impl Dataset {
    pub fn new(data: Array2<f32>, target: Array2<f32>) -> Result<Dataset> {
        Dataset::named("dataset", data, target)
    }

    pub(crate) fn named(name: &str, data: Array2<f32>, target: Array2<f32>) -> Result<Dataset> {
        if data.nrows() != target.nrows() {
            return Err(DatasetError::Misaligned {
                split: name.to_string(),
                images: data.nrows(),
                labels: target.nrows(),
            });
        }

        Ok(Dataset { data, target })
    }

    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn target(&self) -> ArrayView2<'_, f32> {
        self.target.view()
    }

    pub fn into_parts(self) -> (Array2<f32>, Array2<f32>) {
        (self.data, self.target)
    }

    pub fn get(&self, index: usize) -> Option<(ArrayView1<'_, f32>, ArrayView1<'_, f32>)> {
        (index < self.len()).then(|| (self.data.row(index), self.target.row(index)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArrayView1<'_, f32>, ArrayView1<'_, f32>)> {
        self.data.rows().into_iter().zip(self.target.rows())
    }

    /// Aligned chunks of at most `batch_size` samples. The last one may be
    /// shorter.
    ///
    /// Panics if `batch_size` is 0.
    pub fn batches(
        &self,
        batch_size: usize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        self.data
            .axis_chunks_iter(Axis(0), batch_size)
            .zip(self.target.axis_chunks_iter(Axis(0), batch_size))
    }

    /// Apply the same random permutation to images and labels.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);

        self.data = self.data.select(Axis(0), &order);
        self.target = self.target.select(Axis(0), &order);
    }

    /// Number of samples per class, taking the largest target entry as the
    /// class of each row. Rows without a positive entry belong to no class.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.target.ncols()];

        for row in self.target.rows() {
            let class = row
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .filter(|(_, max)| **max > 0f32)
                .map(|(idx, _)| idx);
            if let Some(class) = class {
                counts[class] += 1;
            }
        }

        counts
    }
}

/// Per-sample dimensionality a model input layer needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub rows: usize,
    pub cols: usize,
    pub classes: usize,
}

impl Geometry {
    pub fn features(&self) -> usize {
        self.rows * self.cols
    }
}

/// Training and test datasets sharing one geometry.
#[derive(Clone, Debug)]
pub struct DatasetSplit {
    pub train: Dataset,
    pub test: Dataset,
    pub geometry: Geometry,
}
