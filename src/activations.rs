//! Activation functions selectable by name.
//!
//! The set is closed: parsing an unknown name is an error.

use std::str::FromStr;

use ndarray::{Array2, ArrayView2, ArrayViewMut1, Axis};
use thiserror::Error;

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Sigmoid,
    Tanh,
    Relu,
    Elu,
    Selu,
    Softmax,
    LogSoftmax,
}

#[derive(Debug, Error)]
#[error("unknown activation '{0}'")]
pub struct UnknownActivation(pub String);

impl FromStr for Activation {
    type Err = UnknownActivation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::Relu),
            "elu" => Ok(Activation::Elu),
            "selu" => Ok(Activation::Selu),
            "softmax" => Ok(Activation::Softmax),
            "logsoftmax" | "log_softmax" | "log-softmax" => Ok(Activation::LogSoftmax),
            _ => Err(UnknownActivation(s.to_string())),
        }
    }
}

impl Activation {
    /// Apply the activation to a batch, one sample per row. Softmax variants
    /// normalize each row independently.
    pub fn apply(&self, z: &ArrayView2<f32>) -> Array2<f32> {
        match self {
            Activation::Sigmoid => z.mapv(|x| (1f32 + (-x).exp()).recip()),
            Activation::Tanh => z.mapv(f32::tanh),
            Activation::Relu => z.mapv(|x| x.max(0f32)),
            Activation::Elu => z.mapv(|x| elu(x, 1f32)),
            Activation::Selu => z.mapv(|x| SELU_SCALE * elu(x, SELU_ALPHA)),
            Activation::Softmax => row_wise(z, softmax),
            Activation::LogSoftmax => row_wise(z, log_softmax),
        }
    }
}

fn elu(x: f32, alpha: f32) -> f32 {
    if x > 0f32 {
        x
    } else {
        alpha * x.exp_m1()
    }
}

fn row_wise(z: &ArrayView2<f32>, f: fn(ArrayViewMut1<f32>)) -> Array2<f32> {
    let mut out = z.to_owned();
    for row in out.axis_iter_mut(Axis(0)) {
        f(row);
    }

    out
}

// Rows are shifted by their max so exp never overflows.
fn softmax(mut row: ArrayViewMut1<f32>) {
    let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
    row.mapv_inplace(|x| (x - max).exp());
    let sum = row.sum();
    row.mapv_inplace(|x| x / sum);
}

fn log_softmax(mut row: ArrayViewMut1<f32>) {
    let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
    let log_sum = row.iter().map(|&x| (x - max).exp()).sum::<f32>().ln();
    row.mapv_inplace(|x| x - max - log_sum);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("ReLU".parse::<Activation>().unwrap(), Activation::Relu);
        assert_eq!("log_softmax".parse::<Activation>().unwrap(), Activation::LogSoftmax);
        assert!("swish".parse::<Activation>().is_err());
    }

    #[test]
    fn elementwise_activations() {
        let z = array![[-1.0f32, 0.0, 2.0]];

        let relu = Activation::Relu.apply(&z.view());
        assert_eq!(relu, array![[0.0f32, 0.0, 2.0]]);

        let sigmoid = Activation::Sigmoid.apply(&z.view());
        assert!(close(sigmoid[[0, 1]], 0.5));

        let elu = Activation::Elu.apply(&z.view());
        assert!(close(elu[[0, 0]], (-1f32).exp() - 1.0));
        assert_eq!(elu[[0, 2]], 2.0);

        let selu = Activation::Selu.apply(&z.view());
        assert!(close(selu[[0, 2]], 2.0 * SELU_SCALE));

        let tanh = Activation::Tanh.apply(&z.view());
        assert!(close(tanh[[0, 1]], 0.0));
    }

    #[test]
    fn softmax_rows_sum_to_one_even_for_large_inputs() {
        let z = array![[1.0f32, 2.0, 3.0], [1000.0, 1000.0, 1000.0]];

        let p = Activation::Softmax.apply(&z.view());

        for row in p.rows() {
            assert!(close(row.sum(), 1.0));
        }
        assert!(close(p[[1, 0]], 1.0 / 3.0));
        assert!(p[[0, 2]] > p[[0, 1]]);
    }

    #[test]
    fn log_softmax_is_log_of_softmax() {
        let z = array![[0.5f32, -1.0, 2.0]];

        let p = Activation::Softmax.apply(&z.view());
        let log_p = Activation::LogSoftmax.apply(&z.view());

        for (a, b) in p.iter().zip(log_p.iter()) {
            assert!(close(a.ln(), *b));
        }
    }
}
