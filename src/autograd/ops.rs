//! Autograd operations with backward passes
//!
//! Matrices are flat row-major tensors; every op takes the dimensions it
//! needs explicitly.

use super::{BackwardOp, Tensor};
use ndarray::{s, Array1};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<Array1<f32>>>>;

/// Smallest row norm used when normalising embeddings
pub const NORM_EPS: f32 = 1e-12;

/// Matrix multiplication
///
/// Computes C = A @ B where:
/// - A is m×k (flattened to length m*k)
/// - B is k×n (flattened to length k*n)
/// - C is m×n (flattened to length m*n)
pub fn matmul(a: &Tensor, b: &Tensor, m: usize, k: usize, n: usize) -> Tensor {
    assert_eq!(a.len(), m * k, "Matrix A size mismatch");
    assert_eq!(b.len(), k * n, "Matrix B size mismatch");

    let mut result_data = vec![0.0; m * n];
    for i in 0..m {
        for p in 0..k {
            let a_ip = a.data()[i * k + p];
            if a_ip == 0.0 {
                continue;
            }
            for j in 0..n {
                result_data[i * n + j] += a_ip * b.data()[p * n + j];
            }
        }
    }

    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(Array1::from(result_data), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            m,
            k,
            n,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MatmulBackward {
    a: Tensor,
    b: Tensor,
    m: usize,
    k: usize,
    n: usize,
    result_grad: GradCell,
}

impl BackwardOp for MatmulBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            // ∂L/∂A = ∂L/∂C @ B^T
            if self.a.requires_grad() {
                let mut grad_a = vec![0.0; self.m * self.k];
                for i in 0..self.m {
                    for p in 0..self.k {
                        let mut sum = 0.0;
                        for j in 0..self.n {
                            sum += grad_output[i * self.n + j] * self.b.data()[p * self.n + j];
                        }
                        grad_a[i * self.k + p] = sum;
                    }
                }
                self.a.accumulate_grad(Array1::from(grad_a));
            }

            // ∂L/∂B = A^T @ ∂L/∂C
            if self.b.requires_grad() {
                let mut grad_b = vec![0.0; self.k * self.n];
                for i in 0..self.m {
                    for p in 0..self.k {
                        let a_ip = self.a.data()[i * self.k + p];
                        if a_ip == 0.0 {
                            continue;
                        }
                        for j in 0..self.n {
                            grad_b[p * self.n + j] += a_ip * grad_output[i * self.n + j];
                        }
                    }
                }
                self.b.accumulate_grad(Array1::from(grad_b));
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
            if let Some(op) = self.b.backward_op() {
                op.backward();
            }
        }
    }
}

/// Add a bias row to every row of a `rows x cols` matrix
pub fn add_bias(x: &Tensor, bias: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "Matrix size mismatch");
    assert_eq!(bias.len(), cols, "Bias size mismatch");

    let mut data = x.data().clone();
    for i in 0..rows {
        for j in 0..cols {
            data[i * cols + j] += bias.data()[j];
        }
    }

    let requires_grad = x.requires_grad() || bias.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AddBiasBackward {
            x: x.clone(),
            bias: bias.clone(),
            rows,
            cols,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct AddBiasBackward {
    x: Tensor,
    bias: Tensor,
    rows: usize,
    cols: usize,
    result_grad: GradCell,
}

impl BackwardOp for AddBiasBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                self.x.accumulate_grad(grad.clone());
            }
            if self.bias.requires_grad() {
                // ∂L/∂b_j = Σ_i ∂L/∂y_ij
                let mut grad_b = Array1::zeros(self.cols);
                for i in 0..self.rows {
                    for j in 0..self.cols {
                        grad_b[j] += grad[i * self.cols + j];
                    }
                }
                self.bias.accumulate_grad(grad_b);
            }

            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
            if let Some(op) = self.bias.backward_op() {
                op.backward();
            }
        }
    }
}

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x.max(0.0));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ReluBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ReluBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for ReluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂out * (a > 0)
                let grad_a = grad * &self.a.data().mapv(|x| if x > 0.0 { 1.0 } else { 0.0 });
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Elementwise product with a constant mask (dropout)
pub fn mul_mask(a: &Tensor, mask: Array1<f32>) -> Tensor {
    assert_eq!(a.len(), mask.len(), "Mask size mismatch");

    let data = a.data() * &mask;
    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MulMaskBackward {
            a: a.clone(),
            mask,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MulMaskBackward {
    a: Tensor,
    mask: Array1<f32>,
    result_grad: GradCell,
}

impl BackwardOp for MulMaskBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * &self.mask);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Scale every row of a `rows x cols` matrix to unit L2 norm
///
/// y_i = x_i / max(‖x_i‖, ε)
pub fn l2_normalize_rows(x: &Tensor, rows: usize, cols: usize) -> Tensor {
    assert_eq!(x.len(), rows * cols, "Matrix size mismatch");

    let mut norms = Vec::with_capacity(rows);
    let mut data = x.data().clone();
    for i in 0..rows {
        let row = x.data().slice(s![i * cols..(i + 1) * cols]);
        let norm = row.dot(&row).sqrt().max(NORM_EPS);
        for j in 0..cols {
            data[i * cols + j] /= norm;
        }
        norms.push(norm);
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(L2NormalizeBackward {
            x: x.clone(),
            output: result.data().clone(),
            norms,
            cols,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct L2NormalizeBackward {
    x: Tensor,
    output: Array1<f32>,
    norms: Vec<f32>,
    cols: usize,
    result_grad: GradCell,
}

impl BackwardOp for L2NormalizeBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                // ∂L/∂x_i = (g_i - y_i (y_i · g_i)) / ‖x_i‖
                let mut grad_x = Array1::zeros(self.x.len());
                for (i, &norm) in self.norms.iter().enumerate() {
                    let range = i * self.cols..(i + 1) * self.cols;
                    let dot: f32 = range
                        .clone()
                        .map(|idx| self.output[idx] * grad[idx])
                        .sum();
                    for idx in range {
                        grad_x[idx] = (grad[idx] - self.output[idx] * dot) / norm;
                    }
                }
                self.x.accumulate_grad(grad_x);
            }

            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Wrap a precomputed loss value and its gradient w.r.t. `embeddings`
///
/// The returned scalar tensor feeds `grad_embeddings` (scaled by the upstream
/// gradient) back into the embedding graph on `backward`.
pub fn embedding_loss(embeddings: &Tensor, value: f32, grad_embeddings: Array1<f32>) -> Tensor {
    assert_eq!(
        embeddings.len(),
        grad_embeddings.len(),
        "Gradient must match embedding size"
    );

    let requires_grad = embeddings.requires_grad();
    let mut result = Tensor::from_vec(vec![value], requires_grad);

    if requires_grad {
        let backward_op = Rc::new(EmbeddingLossBackward {
            embeddings: embeddings.clone(),
            grad_embeddings,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct EmbeddingLossBackward {
    embeddings: Tensor,
    grad_embeddings: Array1<f32>,
    result_grad: GradCell,
}

impl BackwardOp for EmbeddingLossBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            self.embeddings
                .accumulate_grad(&self.grad_embeddings * grad[0]);

            if let Some(op) = self.embeddings.backward_op() {
                op.backward();
            }
        }
    }
}
