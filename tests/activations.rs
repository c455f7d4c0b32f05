use briny_layers::activation::{Activation, BackwardInputs, PowerAffine};
use briny_layers::approx::assert_slice_close;
use briny_layers::error::LayerError;
use briny_layers::tensor;
use briny_layers::tensors::Tensor;
use half::f16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_tensor(rng: &mut StdRng, shape: &[usize], lo: f64, hi: f64) -> Tensor<f64> {
    let len = shape.iter().product();
    let data = (0..len).map(|_| rng.random_range(lo..hi)).collect();
    Tensor::new(shape.to_vec(), data)
}

const ALL: [Activation; 6] = [
    Activation::Sigmoid,
    Activation::Tanh,
    Activation::Relu,
    Activation::Softmax,
    Activation::LogSoftmax,
    Activation::PowerAffine(PowerAffine {
        a: 0.5,
        p: 2.0,
        b: -1.0,
    }),
];

#[test]
fn test_sigmoid_scenario() {
    init_logger();
    let x = tensor!([0.0f64]);
    let mut y = Tensor::zeros(vec![1]);
    Activation::Sigmoid.forward(&x, &mut y).unwrap();
    assert_eq!(y.data, vec![0.5]);

    let dy = tensor!([1.0]);
    let mut dx = Tensor::zeros(vec![1]);
    Activation::Sigmoid
        .backward(BackwardInputs::from_y(&y), &dy, &mut dx)
        .unwrap();
    assert_eq!(dx.data, vec![0.25]);
}

#[test]
fn test_softmax_scenario() {
    init_logger();
    let mut x = tensor!([1.0f64, 2.0, 3.0]);
    Activation::Softmax.forward_in_place(&mut x).unwrap();
    assert_slice_close(&x.data, &[0.0900, 0.2447, 0.6652], 1e-4);
}

#[test]
fn test_output_ranges() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(7);
    let x = random_tensor(&mut rng, &[16, 8], -10.0, 10.0);

    let mut y = x.clone();
    Activation::Sigmoid.forward_in_place(&mut y).unwrap();
    assert!(y.data.iter().all(|&v| v > 0.0 && v < 1.0));

    let mut y = x.clone();
    Activation::Tanh.forward_in_place(&mut y).unwrap();
    assert!(y.data.iter().all(|&v| v > -1.0 && v < 1.0));

    let mut y = x.clone();
    Activation::Relu.forward_in_place(&mut y).unwrap();
    for (&out, &inp) in y.data.iter().zip(&x.data) {
        assert!(out >= 0.0);
        if inp > 0.0 {
            assert_eq!(out, inp);
        }
    }
}

#[test]
fn test_softmax_columns_sum_to_one() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(11);
    let mut x = random_tensor(&mut rng, &[3, 4, 5], -50.0, 50.0);
    Activation::Softmax.forward_in_place(&mut x).unwrap();

    let (features, batch) = x.dims2();
    assert_eq!((features, batch), (20, 3));
    for col in x.data.chunks(features) {
        assert!((col.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(col.iter().all(|&v| v >= 0.0));
    }
}

#[test]
fn test_softmax_normalizes_whole_samples() {
    init_logger();
    let mut x = Tensor::new(vec![2, 4, 5], vec![0.0f64; 40]);
    Activation::Softmax.forward_in_place(&mut x).unwrap();
    assert!(x.data.iter().all(|&v| (v - 0.05).abs() < 1e-15));
}

#[test]
fn test_literal_with_negative_entries() {
    let t = tensor!([[-1.5f64, 0.0], [2.0, -3.0]]);
    assert_eq!(t.shape, vec![2, 2]);
    assert_eq!(t.data, vec![-1.5, 0.0, 2.0, -3.0]);

    let flat = tensor!([-1.0f32, -2.0]);
    assert_eq!(flat.shape, vec![2]);

    let scalar = tensor!(-4.0f64);
    assert!(scalar.shape.is_empty());
    assert_eq!(scalar.data, vec![-4.0]);

    let mut y = t.clone();
    Activation::Relu.forward_in_place(&mut y).unwrap();
    assert_eq!(y.data, vec![0.0, 0.0, 2.0, 0.0]);
}

#[test]
fn test_log_softmax_is_log_of_softmax() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(13);
    let x = random_tensor(&mut rng, &[6, 4], -5.0, 5.0);

    let mut soft = x.clone();
    Activation::Softmax.forward_in_place(&mut soft).unwrap();
    let mut logp = x.clone();
    Activation::LogSoftmax.forward_in_place(&mut logp).unwrap();

    let expected: Vec<f64> = soft.data.iter().map(|v| v.ln()).collect();
    assert_slice_close(&logp.data, &expected, 1e-12);
}

#[test]
fn test_large_logits_stay_finite() {
    init_logger();
    let x = tensor!([[1000.0f64, 1001.0], [-1000.0, -1001.0]]);

    let mut soft = x.clone();
    Activation::Softmax.forward_in_place(&mut soft).unwrap();
    assert!(soft.data.iter().all(|v| v.is_finite()));

    let mut logp = x.clone();
    Activation::LogSoftmax.forward_in_place(&mut logp).unwrap();
    assert!(logp.data.iter().all(|v| v.is_finite()));
}

#[test]
fn test_forward_is_idempotent() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(17);
    let x = random_tensor(&mut rng, &[4, 3], 0.1, 2.0);

    for act in ALL {
        let mut first = Tensor::zeros(x.shape.clone());
        let mut second = Tensor::zeros(x.shape.clone());
        act.forward(&x, &mut first).unwrap();
        act.forward(&x, &mut second).unwrap();
        assert_eq!(first, second, "{}", act.name());
    }
}

#[test]
fn test_in_place_matches_out_of_place() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(19);
    let x = random_tensor(&mut rng, &[5, 4], 0.1, 3.0);
    let dy = random_tensor(&mut rng, &[5, 4], -1.0, 1.0);

    for act in ALL {
        let mut y = Tensor::zeros(x.shape.clone());
        act.forward(&x, &mut y).unwrap();
        let mut y_in_place = x.clone();
        act.forward_in_place(&mut y_in_place).unwrap();
        assert_eq!(y, y_in_place, "{} forward", act.name());

        let inputs = BackwardInputs::new(Some(&x), Some(&y));
        let mut dx = Tensor::zeros(x.shape.clone());
        act.backward(inputs, &dy, &mut dx).unwrap();
        let mut dx_in_place = dy.clone();
        act.backward_in_place(inputs, &mut dx_in_place).unwrap();
        assert_eq!(dx, dx_in_place, "{} backward", act.name());
    }
}

#[test]
fn test_layer_metadata() {
    for act in ALL {
        assert_eq!(act.input_count(), 1);
        assert_eq!(act.output_shape(&[2, 7]), vec![2, 7]);
        assert!(act.overwrites_input());
    }

    assert!(Activation::Sigmoid.needs_y() && !Activation::Sigmoid.needs_x());
    assert!(Activation::Tanh.needs_y() && !Activation::Tanh.needs_x());
    assert!(Activation::Relu.needs_y() && !Activation::Relu.needs_x());
    assert!(Activation::Softmax.needs_y() && !Activation::Softmax.needs_x());
    assert!(!Activation::LogSoftmax.needs_y() && !Activation::LogSoftmax.needs_x());

    let pa = Activation::power_affine(PowerAffine::default());
    assert!(pa.needs_x() && !pa.needs_y());
    assert!(Activation::Softmax.info().column_wise);
    assert!(!Activation::Relu.info().column_wise);
}

#[test]
fn test_power_affine_defaults_to_identity() {
    init_logger();
    let x = tensor!([-2.0f64, 0.5, 3.0]);
    let mut y = x.clone();
    Activation::power_affine(PowerAffine::default())
        .forward_in_place(&mut y)
        .unwrap();
    assert_eq!(y, x);

    let mut grad = tensor!([1.0, 2.0, 3.0]);
    Activation::power_affine(PowerAffine::default())
        .backward_in_place(BackwardInputs::from_x(&x), &mut grad)
        .unwrap();
    assert_eq!(grad.data, vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_log_softmax_backward_is_identity() {
    init_logger();
    let dy = tensor!([[0.25f64, -0.5, 0.25]]);
    let mut dx = Tensor::zeros(dy.shape.clone());
    Activation::LogSoftmax
        .backward(BackwardInputs::none(), &dy, &mut dx)
        .unwrap();
    assert_eq!(dx, dy);
}

#[test]
fn test_shape_mismatch_is_rejected() {
    init_logger();
    let x = tensor!([[1.0f64, 2.0], [3.0, 4.0]]);
    let mut y = Tensor::zeros(vec![4]);
    let err = Activation::Tanh.forward(&x, &mut y).unwrap_err();
    assert_eq!(
        err,
        LayerError::ShapeMismatch {
            op: "tanh.forward",
            expected: vec![2, 2],
            found: vec![4],
        }
    );
    // nothing was written
    assert_eq!(y.data, vec![0.0; 4]);

    let y: Tensor<f64> = Tensor::zeros(vec![2, 2]);
    let dy = Tensor::zeros(vec![1, 4]);
    let mut dx = Tensor::zeros(vec![1, 4]);
    let err = Activation::Sigmoid
        .backward(BackwardInputs::from_y(&y), &dy, &mut dx)
        .unwrap_err();
    assert!(matches!(err, LayerError::ShapeMismatch { .. }));
}

#[test]
fn test_malformed_tensor_is_rejected() {
    let mut bad = Tensor {
        shape: vec![3],
        data: vec![1.0f64, 2.0],
    };
    let err = Activation::Relu.forward_in_place(&mut bad).unwrap_err();
    assert!(matches!(err, LayerError::MalformedTensor { len: 2, .. }));
}

#[test]
fn test_missing_input_is_rejected() {
    init_logger();
    let x = tensor!([1.0f64, 2.0]);
    let mut grad = tensor!([1.0, 1.0]);

    let err = Activation::Softmax
        .backward_in_place(BackwardInputs::from_x(&x), &mut grad)
        .unwrap_err();
    assert_eq!(
        err,
        LayerError::MissingInput {
            op: "softmax.backward",
            input: "y",
        }
    );

    let err = Activation::power_affine(PowerAffine::default())
        .backward_in_place(BackwardInputs::from_y(&x), &mut grad)
        .unwrap_err();
    assert_eq!(
        err,
        LayerError::MissingInput {
            op: "power_affine.backward",
            input: "x",
        }
    );
    assert_eq!(grad.data, vec![1.0, 1.0]);
}

#[test]
fn test_half_precision_is_not_implemented() {
    let mut x = Tensor::new(vec![2], vec![f16::from_f32(0.5), f16::from_f32(-1.0)]);
    let err = Activation::Sigmoid.forward_in_place(&mut x).unwrap_err();
    assert!(matches!(err, LayerError::NotImplemented { .. }));
    assert_eq!(err.to_string(), "sigmoid.forward: not implemented for type f16");
}

#[test]
fn test_empty_tensors_are_a_no_op() {
    init_logger();
    for act in ALL {
        let x = Tensor::<f64>::zeros(vec![0, 4]);
        let mut y = Tensor::zeros(vec![0, 4]);
        act.forward(&x, &mut y).unwrap();
        let mut grad = Tensor::zeros(vec![0, 4]);
        act.backward_in_place(BackwardInputs::new(Some(&x), Some(&y)), &mut grad)
            .unwrap();
        assert!(grad.is_empty());
    }
}

#[test]
fn test_f32_matches_f64() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(23);
    let x = random_tensor(&mut rng, &[3, 6], 0.1, 2.0);
    let x32 = Tensor::new(x.shape.clone(), x.data.iter().map(|&v| v as f32).collect());

    for act in ALL {
        let mut y = x.clone();
        act.forward_in_place(&mut y).unwrap();
        let mut y32 = x32.clone();
        act.forward_in_place(&mut y32).unwrap();

        let widened: Vec<f64> = y32.data.iter().map(|&v| f64::from(v)).collect();
        assert_slice_close(&widened, &y.data, 1e-5);
    }
}
