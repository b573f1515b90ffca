//! Tests for autograd operations with gradient checking

use super::*;
use approx::assert_abs_diff_eq;
use ndarray::Array1;
use proptest::prelude::*;

/// Finite difference gradient checker
///
/// Computes numerical gradient using central difference:
/// f'(x) ≈ (f(x + h) - f(x - h)) / (2h)
fn finite_difference<F>(f: F, x: &[f32], epsilon: f32) -> Vec<f32>
where
    F: Fn(&[f32]) -> f32,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + epsilon;
        x_minus[i] = x[i] - epsilon;

        grad[i] = (f(&x_plus) - f(&x_minus)) / (2.0 * epsilon);

        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }

    grad
}

/// Weighted sum used to reduce a matrix output to a scalar
fn weighted_sum(t: &Tensor, weights: &[f32]) -> f32 {
    t.data().iter().zip(weights).map(|(a, w)| a * w).sum()
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_tensor_creation() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        assert_eq!(t.len(), 3);
        assert!(t.requires_grad());
        assert!(t.grad().is_none());
    }

    #[test]
    fn test_tensor_grad_accumulation() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);

        t.accumulate_grad(ndarray::arr1(&[1.0, 1.0, 1.0]));
        assert_eq!(t.grad().unwrap()[0], 1.0);

        t.accumulate_grad(ndarray::arr1(&[1.0, 1.0, 1.0]));
        assert_eq!(t.grad().unwrap()[0], 2.0);
    }

    #[test]
    fn test_set_requires_grad_false_drops_gradient() {
        let mut t = Tensor::from_vec(vec![1.0, 2.0], true);
        t.set_grad(ndarray::arr1(&[0.5, 0.5]));

        t.set_requires_grad(false);

        assert!(!t.requires_grad());
        assert!(t.grad().is_none());
    }

    #[test]
    fn test_view2_shape_mismatch() {
        let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], false);
        assert!(t.view2(2, 2).is_err());
        let view = t.view2(1, 3).unwrap();
        assert_eq!(view[[0, 2]], 3.0);
    }

    #[test]
    fn test_matmul_forward() {
        // [1 2] @ [5 6]   = [19 22]
        // [3 4]   [7 8]     [43 50]
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let b = Tensor::from_vec(vec![5.0, 6.0, 7.0, 8.0], false);
        let c = matmul(&a, &b, 2, 2, 2);

        assert_eq!(c.data().to_vec(), vec![19.0, 22.0, 43.0, 50.0]);
        assert!(!c.requires_grad());
    }

    #[test]
    fn test_add_bias_forward() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let b = Tensor::from_vec(vec![10.0, 20.0], false);
        let y = add_bias(&x, &b, 2, 2);

        assert_eq!(y.data().to_vec(), vec![11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_add_bias_backward_sums_rows() {
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let b = Tensor::from_vec(vec![0.0, 0.0], true);
        let mut y = add_bias(&x, &b, 2, 2);

        backward(&mut y, Some(ndarray::arr1(&[1.0, 2.0, 3.0, 4.0])));

        let grad_b = b.grad().unwrap();
        assert_abs_diff_eq!(grad_b[0], 4.0);
        assert_abs_diff_eq!(grad_b[1], 6.0);
        assert!(x.grad().is_none());
    }

    #[test]
    fn test_relu_backward() {
        let a = Tensor::from_vec(vec![-1.0, 0.0, 1.0, 2.0], true);
        let mut c = relu(&a);

        backward(&mut c, Some(ndarray::arr1(&[1.0, 1.0, 1.0, 1.0])));

        let grad_a = a.grad().unwrap();
        assert_abs_diff_eq!(grad_a[0], 0.0);
        assert_abs_diff_eq!(grad_a[1], 0.0);
        assert_abs_diff_eq!(grad_a[2], 1.0);
        assert_abs_diff_eq!(grad_a[3], 1.0);
    }

    #[test]
    fn test_mul_mask_forward_backward() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
        let mut c = mul_mask(&a, ndarray::arr1(&[0.0, 2.0, 2.0]));
        assert_eq!(c.data().to_vec(), vec![0.0, 4.0, 6.0]);

        backward(&mut c, Some(ndarray::arr1(&[1.0, 1.0, 0.5])));
        assert_eq!(a.grad().unwrap().to_vec(), vec![0.0, 2.0, 1.0]);
    }

    #[test]
    fn test_l2_normalize_rows_unit_norm() {
        let x = Tensor::from_vec(vec![3.0, 4.0, 0.0, 2.0], false);
        let y = l2_normalize_rows(&x, 2, 2);

        assert_abs_diff_eq!(y.data()[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(y.data()[1], 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(y.data()[2], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y.data()[3], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_row_is_finite() {
        let x = Tensor::from_vec(vec![0.0, 0.0], true);
        let mut y = l2_normalize_rows(&x, 1, 2);
        assert!(y.data().iter().all(|v| v.is_finite()));

        backward(&mut y, Some(ndarray::arr1(&[1.0, 1.0])));
        assert!(x.grad().unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_l2_normalize_gradient_matches_finite_difference() {
        let x_data = vec![0.3, -1.2, 0.7, 2.0, 0.1, -0.4];
        let weights = [0.5, -1.0, 2.0, 0.3, 1.5, -0.7];

        let x = Tensor::from_vec(x_data.clone(), true);
        let y = l2_normalize_rows(&x, 2, 3);
        let mut y_mut = y.clone();
        backward(&mut y_mut, Some(Array1::from(weights.to_vec())));
        let analytic = x.grad().unwrap();

        let numeric = finite_difference(
            |v| {
                let t = Tensor::from_vec(v.to_vec(), false);
                weighted_sum(&l2_normalize_rows(&t, 2, 3), &weights)
            },
            &x_data,
            1e-3,
        );

        for (a, n) in analytic.iter().zip(&numeric) {
            assert_abs_diff_eq!(*a, *n, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_dense_layer_weight_gradient_matches_finite_difference() {
        let inputs = Tensor::from_vec(vec![1.0, -2.0, 0.5, 0.0, 3.0, 1.0], false);
        let w_data = vec![0.2, -0.1, 0.4, 0.3, -0.5, 0.6];
        let weights = [1.0, -0.5, 0.25, 2.0];

        let w = Tensor::from_vec(w_data.clone(), true);
        let bias = Tensor::zeros(2, false);
        let mut out = add_bias(&matmul(&inputs, &w, 2, 3, 2), &bias, 2, 2);
        backward(&mut out, Some(Array1::from(weights.to_vec())));
        let analytic = w.grad().unwrap();

        let numeric = finite_difference(
            |v| {
                let w = Tensor::from_vec(v.to_vec(), false);
                weighted_sum(&matmul(&inputs, &w, 2, 3, 2), &weights)
            },
            &w_data,
            1e-3,
        );

        for (a, n) in analytic.iter().zip(&numeric) {
            assert_abs_diff_eq!(*a, *n, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_embedding_loss_propagates_into_graph() {
        let w = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], true);
        let inputs = Tensor::from_vec(vec![1.0, 2.0], false);
        let embeddings = matmul(&inputs, &w, 1, 2, 2);

        let mut loss = embedding_loss(&embeddings, 3.0, ndarray::arr1(&[1.0, -1.0]));
        assert_eq!(loss.data()[0], 3.0);
        backward(&mut loss, None);

        // ∂L/∂W[p, j] = x_p * g_j
        let grad_w = w.grad().unwrap();
        assert_eq!(grad_w.to_vec(), vec![1.0, -1.0, 2.0, -2.0]);
    }

    #[test]
    fn test_embedding_loss_without_grad_has_no_backward() {
        let embeddings = Tensor::from_vec(vec![1.0, 2.0], false);
        let loss = embedding_loss(&embeddings, 0.5, ndarray::arr1(&[0.0, 0.0]));
        assert!(loss.backward_op().is_none());
    }

    #[test]
    fn test_context_modes() {
        let mut ctx = Context::new();
        assert!(ctx.is_training());
        ctx.eval();
        assert!(!ctx.is_training());
        assert!(!Context::evaluation().is_training());
    }
}

proptest! {
    #[test]
    fn prop_l2_normalize_rows_have_unit_norm(
        data in prop::collection::vec(-10.0f32..10.0, 12),
    ) {
        prop_assume!(data.chunks(4).all(|r| r.iter().map(|v| v * v).sum::<f32>() > 1e-3));
        let x = Tensor::from_vec(data, false);
        let y = l2_normalize_rows(&x, 3, 4);
        for row in y.data().as_slice().unwrap().chunks(4) {
            let norm: f32 = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            prop_assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn prop_matmul_identity(data in prop::collection::vec(-5.0f32..5.0, 6)) {
        let a = Tensor::from_vec(data.clone(), false);
        let eye = Tensor::from_vec(vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], false);
        let c = matmul(&a, &eye, 2, 3, 3);
        for (x, y) in c.data().iter().zip(&data) {
            prop_assert!((x - y).abs() < 1e-6);
        }
    }
}
