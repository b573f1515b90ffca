use super::*;
use crate::autograd::{backward, embedding_loss, Context, Tensor};
use crate::Error;
use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2, Axis};

fn mlp_net(seed: u64) -> EmbeddingNet {
    EmbeddingNet::new(Box::new(Mlp::new(3, 5, 4)), 2, true, seed).unwrap()
}

fn inputs() -> Array2<f32> {
    array![[0.5, -1.0, 2.0], [1.0, 0.0, -0.5], [0.2, 0.3, 0.4]]
}

#[test]
fn test_parameter_layout() {
    let net = mlp_net(0);
    let names: Vec<&str> = net.named_parameters().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        vec![
            "backbone.fc1.weight",
            "backbone.fc1.bias",
            "backbone.fc2.weight",
            "backbone.fc2.bias",
            "head.weight",
            "head.bias"
        ]
    );
    assert_eq!(net.num_parameters(), 3 * 5 + 5 + 5 * 4 + 4 + 4 * 2 + 2);
    assert_eq!(net.describe(), "mlp-3-5-4+head-2");
}

#[test]
fn test_zero_embedding_size_rejected() {
    let err = EmbeddingNet::new(Box::new(Identity::new(3)), 0, true, 0).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_identity_backbone_has_only_head() {
    let net = EmbeddingNet::new(Box::new(Identity::new(3)), 4, false, 1).unwrap();
    assert_eq!(net.parameters().len(), 2);
    let out = net.embed(&inputs(), &Context::evaluation()).unwrap();
    assert_eq!(out.dim(), (3, 4));
}

#[test]
fn test_normalized_embeddings_are_unit_rows() {
    let out = mlp_net(3).embed(&inputs(), &Context::evaluation()).unwrap();
    for row in out.axis_iter(Axis(0)) {
        assert_abs_diff_eq!(row.dot(&row).sqrt(), 1.0, epsilon = 1e-5);
    }
}

#[test]
fn test_seeded_init_is_reproducible() {
    let a = mlp_net(9).embed(&inputs(), &Context::evaluation()).unwrap();
    let b = mlp_net(9).embed(&inputs(), &Context::evaluation()).unwrap();
    let c = mlp_net(10).embed(&inputs(), &Context::evaluation()).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_wrong_input_width() {
    let err = mlp_net(0)
        .embed(&Array2::zeros((2, 7)), &Context::evaluation())
        .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn test_dropout_only_in_training() {
    let backbone = Mlp::new(3, 64, 4).with_dropout(0.5, 1).unwrap();
    let net = EmbeddingNet::new(Box::new(backbone), 2, false, 0).unwrap();

    let eval_a = net.embed(&inputs(), &Context::evaluation()).unwrap();
    let eval_b = net.embed(&inputs(), &Context::evaluation()).unwrap();
    assert_eq!(eval_a, eval_b);

    let train_a = net.embed(&inputs(), &Context::new()).unwrap();
    let train_b = net.embed(&inputs(), &Context::new()).unwrap();
    assert_ne!(train_a, train_b);
}

#[test]
fn test_invalid_dropout() {
    assert!(Mlp::new(3, 4, 5).with_dropout(1.0, 0).is_err());
    assert!(Mlp::new(3, 4, 5).with_dropout(-0.1, 0).is_err());
}

#[test]
fn test_gradient_reaches_every_parameter() {
    let net = mlp_net(4);
    let x = inputs();
    let out = net
        .forward(&Tensor::from_array2(&x, false), 3, &Context::new())
        .unwrap();
    let grad = Array1::from_elem(out.len(), 0.1);
    let mut loss = embedding_loss(&out, 1.0, grad);
    backward(&mut loss, None);

    for (name, p) in net.named_parameters() {
        let g = p.grad().unwrap_or_else(|| panic!("{name} has no gradient"));
        assert_eq!(g.len(), p.len());
    }

    net.zero_grad();
    assert!(net.parameters().iter().all(|p| p.grad().is_none()));
}

#[test]
fn test_freeze() {
    let mut net = mlp_net(0);
    assert!(!net.is_frozen());
    net.parameters()[0].set_grad(Array1::ones(15));
    net.freeze();
    assert!(net.is_frozen());
    assert!(net.parameters()[0].grad().is_none());

    // A frozen network records no graph
    let out = net
        .forward(&Tensor::from_array2(&inputs(), false), 3, &Context::new())
        .unwrap();
    assert!(!out.requires_grad());
    assert!(out.backward_op().is_none());
}

#[test]
fn test_checkpoint_round_trip() {
    let source = mlp_net(1);
    let state = source.to_checkpoint("student").unwrap().strip_prefix("").unwrap();

    let mut target = mlp_net(2);
    target.load_state(&state).unwrap();
    let ctx = Context::evaluation();
    assert_eq!(
        source.embed(&inputs(), &ctx).unwrap(),
        target.embed(&inputs(), &ctx).unwrap()
    );
}

#[test]
fn test_checkpoint_metadata() {
    let checkpoint = mlp_net(1).to_checkpoint("student").unwrap();
    assert_eq!(checkpoint.metadata.name, "student");
    assert_eq!(checkpoint.metadata.architecture, "mlp-3-5-4+head-2");
    assert_eq!(checkpoint.get("head.weight").unwrap().shape, vec![4, 2]);
}

#[test]
fn test_load_state_missing_parameter() {
    let mut state = mlp_net(1).to_checkpoint("x").unwrap().strip_prefix("").unwrap();
    state.remove("head.bias");

    let err = mlp_net(2).load_state(&state).unwrap_err();
    assert!(matches!(err, Error::Checkpoint(_)));
    assert!(err.to_string().contains("head.bias"));
}

#[test]
fn test_load_state_size_mismatch() {
    let other = EmbeddingNet::new(Box::new(Mlp::new(3, 5, 4)), 3, true, 0).unwrap();
    let state = other.to_checkpoint("x").unwrap().strip_prefix("").unwrap();

    let err = mlp_net(2).load_state(&state).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

#[test]
fn test_load_state_keeps_frozen() {
    let state = mlp_net(1).to_checkpoint("x").unwrap().strip_prefix("").unwrap();
    let mut teacher = mlp_net(2);
    teacher.freeze();
    teacher.load_state(&state).unwrap();
    assert!(teacher.is_frozen());
}
