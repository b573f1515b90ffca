use super::*;
use ndarray::{array, Array2};
use proptest::prelude::*;

fn two_clusters() -> (Array2<f32>, Vec<usize>) {
    (
        array![[0.0, 0.0], [0.0, 0.0], [10.0, 0.0], [10.0, 0.0]],
        vec![0, 0, 1, 1],
    )
}

fn assert_valid(samples: &MinedSamples, labels: &[usize]) {
    for t in &samples.triplets {
        assert_ne!(t.anchor, t.positive);
        assert_eq!(labels[t.anchor], labels[t.positive]);
        assert_ne!(labels[t.anchor], labels[t.negative]);
    }
}

#[test]
fn test_all_pairs_counts() {
    let (embeddings, labels) = two_clusters();
    let samples = AllPairs::new().mine(embeddings.view(), &labels);

    assert_eq!(samples.len(), 8);
    assert_eq!(samples.positive_pairs(), vec![(0, 1), (2, 3)]);
    assert_eq!(samples.negative_pairs(), vec![(0, 2), (0, 3), (1, 2), (1, 3)]);
}

#[test]
fn test_every_strategy_non_empty() {
    let (embeddings, labels) = two_clusters();
    for strategy in MiningStrategy::ALL {
        let mut miner = strategy.build(0.2, 3);
        let samples = miner.mine(embeddings.view(), &labels);
        assert!(!samples.is_empty(), "{strategy} returned no triplets");
        assert_valid(&samples, &labels);
        assert_eq!(miner.name(), strategy.as_str());
    }
}

#[test]
fn test_single_label_batch_is_empty() {
    let embeddings = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]];
    for strategy in MiningStrategy::ALL {
        let samples = strategy.build(0.2, 0).mine(embeddings.view(), &[4, 4, 4]);
        assert!(samples.is_empty());
    }
}

#[test]
fn test_singleton_classes_are_empty() {
    let embeddings = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]];
    for strategy in MiningStrategy::ALL {
        let samples = strategy.build(0.2, 0).mine(embeddings.view(), &[0, 1, 2]);
        assert!(samples.is_empty());
    }
}

#[test]
fn test_hard_negative_picks_nearest() {
    let embeddings = array![[0.0, 0.0], [0.0, 1.0], [0.5, 0.0], [10.0, 10.0]];
    let labels = [0, 0, 1, 1];
    let samples = HardNegative::new().mine(embeddings.view(), &labels);

    let from_zero: Vec<_> = samples.triplets.iter().filter(|t| t.anchor == 0).collect();
    assert_eq!(from_zero.len(), 1);
    assert_eq!(from_zero[0].negative, 2);

    let from_three: Vec<_> = samples.triplets.iter().filter(|t| t.anchor == 3).collect();
    assert_eq!(from_three[0].negative, 1);
}

#[test]
fn test_hard_negative_ties_go_to_lower_index() {
    let embeddings = array![[0.0, 0.0], [0.0, 0.1], [1.0, 0.0], [-1.0, 0.0]];
    let samples = HardNegative::new().mine(embeddings.view(), &[0, 0, 1, 1]);
    let t = samples.triplets.iter().find(|t| t.anchor == 0).unwrap();
    assert_eq!(t.negative, 2);
}

#[test]
fn test_semihard_prefers_margin_window() {
    // d(0,1) = 1, d(0,2) = 1.1, d(0,3) = 3
    let embeddings = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.1], [0.0, 3.0]];
    let labels = [0, 0, 1, 1];
    let samples = SemiHardNegative::new(0.2).mine(embeddings.view(), &labels);

    let t = samples
        .triplets
        .iter()
        .find(|t| t.anchor == 0 && t.positive == 1)
        .unwrap();
    assert_eq!(t.negative, 2);
}

#[test]
fn test_semihard_falls_back_to_nearest_farther() {
    // window (1, 1) is empty with zero margin; 3 is the nearest negative beyond the positive
    let embeddings = array![[0.0, 0.0], [1.0, 0.0], [0.0, 0.5], [0.0, 2.0]];
    let samples = SemiHardNegative::new(0.0).mine(embeddings.view(), &[0, 0, 1, 1]);

    let t = samples
        .triplets
        .iter()
        .find(|t| t.anchor == 0 && t.positive == 1)
        .unwrap();
    assert_eq!(t.negative, 3);
}

#[test]
fn test_semihard_falls_back_to_farthest() {
    // Every negative is closer to the anchor than the positive
    let embeddings = array![[0.0, 0.0], [5.0, 0.0], [0.5, 0.0], [0.0, 1.0]];
    let samples = SemiHardNegative::new(0.2).mine(embeddings.view(), &[0, 0, 1, 1]);

    let t = samples
        .triplets
        .iter()
        .find(|t| t.anchor == 0 && t.positive == 1)
        .unwrap();
    assert_eq!(t.negative, 3);
}

#[test]
fn test_semihard_negative_margin_clamped() {
    assert_eq!(SemiHardNegative::new(-1.0).margin(), 0.0);
}

#[test]
fn test_seeded_miners_are_reproducible() {
    let embeddings = array![
        [0.1, 0.9],
        [0.2, 0.8],
        [0.9, 0.1],
        [0.8, 0.3],
        [-0.5, 0.5],
        [-0.4, 0.7]
    ];
    let labels = [0, 0, 1, 1, 2, 2];

    for strategy in [MiningStrategy::Random, MiningStrategy::Distance] {
        let a = strategy.build(0.2, 11).mine(embeddings.view(), &labels);
        let b = strategy.build(0.2, 11).mine(embeddings.view(), &labels);
        assert_eq!(a, b);
        assert_valid(&a, &labels);
    }
}

#[test]
fn test_distance_weighted_skips_far_negatives() {
    // After normalisation negative 3 is antipodal (distance 2 > 1.4) and never drawn
    let embeddings = array![[1.0, 0.0], [1.0, 0.1], [0.6, 0.8], [-1.0, 0.0]];
    let labels = [0, 0, 1, 1];
    let mut miner = DistanceWeighted::new(5);

    for _ in 0..20 {
        let samples = miner.mine(embeddings.view(), &labels);
        for t in samples.triplets.iter().filter(|t| t.anchor == 0) {
            assert_eq!(t.negative, 2);
        }
    }
}

#[test]
fn test_distance_weighted_uniform_when_all_far() {
    let embeddings = array![[1.0, 0.0], [1.0, 0.0], [-1.0, 0.0], [-1.0, 0.0]];
    let labels = [0, 0, 1, 1];
    let samples = DistanceWeighted::new(1).mine(embeddings.view(), &labels);
    assert_eq!(samples.len(), 4);
    assert_valid(&samples, &labels);
}

#[test]
fn test_strategy_from_str() {
    assert_eq!("semihard".parse::<MiningStrategy>().unwrap(), MiningStrategy::SemiHard);
    assert_eq!("Distance".parse::<MiningStrategy>().unwrap(), MiningStrategy::Distance);

    let err = "nearest".parse::<MiningStrategy>().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("nearest"));
}

#[test]
fn test_strategy_serde_names() {
    let parsed: MiningStrategy = serde_yaml::from_str("semihard").unwrap();
    assert_eq!(parsed, MiningStrategy::SemiHard);

    let json = serde_json::to_string(&MiningStrategy::All).unwrap();
    assert_eq!(json, "\"all\"");
    assert!(serde_yaml::from_str::<MiningStrategy>("hardest").is_err());
}

prop_compose! {
    /// Batch guaranteed to hold two labels with a repeated one
    fn diverse_batch()(extra in prop::collection::vec(0usize..4, 0..9))
        (values in prop::collection::vec(-5.0f32..5.0, (extra.len() + 3) * 3), extra in Just(extra))
        -> (Array2<f32>, Vec<usize>)
    {
        let mut labels = vec![0, 0, 1];
        labels.extend(extra);
        let n = labels.len();
        (Array2::from_shape_vec((n, 3), values).unwrap(), labels)
    }
}

proptest! {
    #[test]
    fn prop_every_strategy_mines_valid_triplets((embeddings, labels) in diverse_batch(), seed in any::<u64>()) {
        for strategy in MiningStrategy::ALL {
            let samples = strategy.build(0.2, seed).mine(embeddings.view(), &labels);
            prop_assert!(!samples.is_empty());
            for t in &samples.triplets {
                prop_assert_eq!(labels[t.anchor], labels[t.positive]);
                prop_assert_ne!(labels[t.anchor], labels[t.negative]);
            }
        }
    }
}
