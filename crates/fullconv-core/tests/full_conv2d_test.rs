use approx::assert_relative_eq;
use fullconv_core::numerical_gradient::{check_gradients, GradientCheckConfig};
use fullconv_core::{
    spatial_full_conv2d, spatial_full_conv2d_acc_grad_parameters, spatial_full_conv2d_grad_input,
    Result, Tensor,
};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn random_tensor(dims: &[usize], rng: &mut StdRng) -> Tensor<f64> {
    let dist = Uniform::new(-1.0, 1.0);
    Tensor::from_fn(dims, |_| dist.sample(rng))
}

fn weighted_sum(output: &Tensor<f64>, weights: &Tensor<f64>) -> f64 {
    output
        .to_vec()
        .iter()
        .zip(weights.to_vec())
        .map(|(o, w)| o * w)
        .sum()
}

fn forward(
    input: &Tensor<f64>,
    weight: &Tensor<f64>,
    bias: &Tensor<f64>,
    stride: (usize, usize),
) -> Result<Tensor<f64>> {
    let mut output = Tensor::zeros(&[0]);
    spatial_full_conv2d(&mut output, input, weight, bias, stride)?;
    Ok(output)
}

#[test]
fn test_output_shape_formula() {
    let mut rng = StdRng::seed_from_u64(7);
    for &(n, cin, cout, h, w, kh, kw, sh, sw) in &[
        (1, 1, 1, 1, 1, 1, 1, 1, 1),
        (2, 3, 4, 5, 4, 3, 3, 2, 2),
        (1, 2, 1, 3, 6, 4, 2, 3, 1),
        (3, 1, 2, 2, 2, 5, 5, 1, 4),
    ] {
        let input = random_tensor(&[n, cin, h, w], &mut rng);
        let weight = random_tensor(&[cin, cout, kh, kw], &mut rng);
        let bias = random_tensor(&[cout], &mut rng);

        let output = forward(&input, &weight, &bias, (sh, sw)).unwrap();
        assert_eq!(
            output.shape().dims(),
            &[n, cout, (h - 1) * sh + kh, (w - 1) * sw + kw]
        );
    }
}

/// Direct loop: `out[n, o, y*sh+ky, x*sw+kx] += in[n, i, y, x] * w[i, o, ky, kx]`
fn reference_forward(
    input: &Tensor<f64>,
    weight: &Tensor<f64>,
    bias: &Tensor<f64>,
    stride: (usize, usize),
) -> Vec<f64> {
    let (n, cin, h, w) = match *input.shape().dims() {
        [n, c, h, w] => (n, c, h, w),
        _ => panic!("batched input expected"),
    };
    let (cout, kh, kw) = match *weight.shape().dims() {
        [_, o, kh, kw] => (o, kh, kw),
        _ => panic!("4D weight expected"),
    };
    let (oh, ow) = ((h - 1) * stride.0 + kh, (w - 1) * stride.1 + kw);
    let bias = bias.to_vec();

    let mut output = vec![0.0; n * cout * oh * ow];
    for (index, value) in output.iter_mut().enumerate() {
        *value = bias[(index / (oh * ow)) % cout];
    }
    for s in 0..n {
        for i in 0..cin {
            for y in 0..h {
                for x in 0..w {
                    let v = input.get(&[s, i, y, x]).unwrap();
                    for o in 0..cout {
                        for ky in 0..kh {
                            for kx in 0..kw {
                                let (oy, ox) = (y * stride.0 + ky, x * stride.1 + kx);
                                output[((s * cout + o) * oh + oy) * ow + ox] +=
                                    v * weight.get(&[i, o, ky, kx]).unwrap();
                            }
                        }
                    }
                }
            }
        }
    }
    output
}

#[test]
fn test_forward_matches_direct_loop_with_asymmetric_weights() {
    let mut rng = StdRng::seed_from_u64(29);
    let input = random_tensor(&[2, 3, 3, 4], &mut rng);
    let weight = random_tensor(&[3, 2, 3, 2], &mut rng);
    let bias = random_tensor(&[2], &mut rng);
    let stride = (2, 3);

    let output = forward(&input, &weight, &bias, stride).unwrap();
    assert_eq!(output.shape().dims(), &[2, 2, 7, 11]);
    let expected = reference_forward(&input, &weight, &bias, stride);
    for (got, want) in output.to_vec().into_iter().zip(expected) {
        assert_relative_eq!(got, want, epsilon = 1e-12);
    }
}

#[test]
fn test_backward_passes_are_adjoint_to_forward() {
    // <fwd(x) - bias, g> = <x, dL/dx> = <W, dL/dW> for L = <fwd(x), g>
    let mut rng = StdRng::seed_from_u64(31);
    let input = random_tensor(&[2, 3, 3, 4], &mut rng);
    let weight = random_tensor(&[3, 2, 3, 2], &mut rng);
    let stride = (2, 3);
    let zero_bias = Tensor::zeros(&[2]);

    let output = forward(&input, &weight, &zero_bias, stride).unwrap();
    let grad_output = random_tensor(output.shape().dims(), &mut rng);
    let projected = weighted_sum(&output, &grad_output);

    let mut grad_input = Tensor::zeros(&[0]);
    spatial_full_conv2d_grad_input(&mut grad_input, &input, &grad_output, &weight, stride)
        .unwrap();
    assert_relative_eq!(weighted_sum(&input, &grad_input), projected, epsilon = 1e-10);

    let mut grad_weight = Tensor::zeros(&[3, 2, 3, 2]);
    let mut grad_bias = Tensor::zeros(&[2]);
    spatial_full_conv2d_acc_grad_parameters(
        &mut grad_weight,
        &mut grad_bias,
        &input,
        &grad_output,
        &weight,
        stride,
        1.0,
    )
    .unwrap();
    assert_relative_eq!(weighted_sum(&weight, &grad_weight), projected, epsilon = 1e-10);
}

#[test]
fn test_zero_weight_yields_bias() {
    let mut rng = StdRng::seed_from_u64(11);
    let input = random_tensor(&[2, 3, 4, 4], &mut rng);
    let weight = Tensor::zeros(&[3, 2, 3, 3]);
    let bias = Tensor::from_vec(vec![0.25, -1.5], &[2]).unwrap();

    let output = forward(&input, &weight, &bias, (2, 2)).unwrap();
    let plane = 9 * 9;
    for (i, value) in output.to_vec().into_iter().enumerate() {
        let channel = (i / plane) % 2;
        assert_eq!(value, bias.to_vec()[channel]);
    }
}

#[test]
fn test_batched_matches_per_sample() {
    let mut rng = StdRng::seed_from_u64(3);
    let input = random_tensor(&[3, 2, 3, 4], &mut rng);
    let weight = random_tensor(&[2, 3, 3, 2], &mut rng);
    let bias = random_tensor(&[3], &mut rng);
    let stride = (2, 1);

    let batched = forward(&input, &weight, &bias, stride).unwrap();
    let sample_len = 2 * 3 * 4;
    let out_len = batched.numel() / 3;

    for (s, chunk) in input.to_vec().chunks(sample_len).enumerate() {
        let sample = Tensor::from_vec(chunk.to_vec(), &[2, 3, 4]).unwrap();
        let single = forward(&sample, &weight, &bias, stride).unwrap();
        let expected = &batched.to_vec()[s * out_len..(s + 1) * out_len];
        for (a, b) in single.to_vec().iter().zip(expected) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_grad_input_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(21);
    let input = random_tensor(&[2, 2, 3, 3], &mut rng);
    let weight = random_tensor(&[2, 3, 3, 2], &mut rng);
    let bias = random_tensor(&[3], &mut rng);
    let stride = (2, 1);
    let output = forward(&input, &weight, &bias, stride).unwrap();
    let grad_output = random_tensor(output.shape().dims(), &mut rng);

    let loss = |x: &Tensor<f64>| {
        Ok(weighted_sum(&forward(x, &weight, &bias, stride)?, &grad_output))
    };
    let analytic = |x: &Tensor<f64>| {
        let mut grad_input = Tensor::zeros(&[0]);
        spatial_full_conv2d_grad_input(&mut grad_input, x, &grad_output, &weight, stride)?;
        Ok(grad_input)
    };

    let result = check_gradients(&input, loss, analytic, &GradientCheckConfig::default()).unwrap();
    assert!(result.passed, "{}", result.summary());
}

#[test]
fn test_grad_weight_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(5);
    let input = random_tensor(&[2, 3, 3], &mut rng);
    let weight = random_tensor(&[2, 2, 2, 3], &mut rng);
    let bias = random_tensor(&[2], &mut rng);
    let stride = (1, 2);
    let output = forward(&input, &weight, &bias, stride).unwrap();
    let grad_output = random_tensor(output.shape().dims(), &mut rng);

    let loss = |w: &Tensor<f64>| {
        Ok(weighted_sum(&forward(&input, w, &bias, stride)?, &grad_output))
    };
    let analytic = |w: &Tensor<f64>| {
        let mut grad_weight = Tensor::zeros(w.shape().dims());
        let mut grad_bias = Tensor::zeros(&[2]);
        spatial_full_conv2d_acc_grad_parameters(
            &mut grad_weight,
            &mut grad_bias,
            &input,
            &grad_output,
            w,
            stride,
            1.0,
        )?;
        Ok(grad_weight)
    };

    let result = check_gradients(&weight, loss, analytic, &GradientCheckConfig::default()).unwrap();
    assert!(result.passed, "{}", result.summary());
}

#[test]
fn test_grad_bias_matches_finite_differences() {
    let mut rng = StdRng::seed_from_u64(8);
    let input = random_tensor(&[2, 1, 2, 2], &mut rng);
    let weight = random_tensor(&[1, 3, 2, 2], &mut rng);
    let bias = random_tensor(&[3], &mut rng);
    let stride = (1, 1);
    let output = forward(&input, &weight, &bias, stride).unwrap();
    let grad_output = random_tensor(output.shape().dims(), &mut rng);

    let loss = |b: &Tensor<f64>| {
        Ok(weighted_sum(&forward(&input, &weight, b, stride)?, &grad_output))
    };
    let analytic = |_: &Tensor<f64>| {
        let mut grad_weight = Tensor::zeros(&[1, 3, 2, 2]);
        let mut grad_bias = Tensor::zeros(&[3]);
        spatial_full_conv2d_acc_grad_parameters(
            &mut grad_weight,
            &mut grad_bias,
            &input,
            &grad_output,
            &weight,
            stride,
            1.0,
        )?;
        Ok(grad_bias)
    };

    let result = check_gradients(&bias, loss, analytic, &GradientCheckConfig::default()).unwrap();
    assert!(result.passed, "{}", result.summary());
}

#[test]
fn test_rank_errors() {
    let weight = Tensor::<f64>::ones(&[1, 1, 2, 2]);
    let bias = Tensor::<f64>::zeros(&[1]);
    for dims in [vec![2, 2], vec![1, 1, 1, 2, 2]] {
        let mut output = Tensor::full(&[1], 3.0);
        let err = spatial_full_conv2d(&mut output, &Tensor::ones(&dims), &weight, &bias, (1, 1))
            .unwrap_err();
        assert!(err.is_shape_error(), "{err}");
        assert_eq!(output.to_vec(), vec![3.0]);
    }

    let err =
        forward(&Tensor::ones(&[1, 2, 2]), &Tensor::ones(&[1, 1, 2]), &bias, (1, 1)).unwrap_err();
    assert!(err.is_shape_error());
}

#[test]
fn test_input_channel_mismatch() {
    let err = forward(
        &Tensor::ones(&[2, 3, 3]),
        &Tensor::ones(&[3, 1, 2, 2]),
        &Tensor::zeros(&[1]),
        (1, 1),
    )
    .unwrap_err();
    assert!(err.is_shape_mismatch());
}

#[test]
fn test_transposed_weight_view_shares_storage() {
    let weight = Tensor::<f64>::from_fn(&[2, 3, 2, 2], |i| i as f64);
    let view = weight.transpose_view(0, 1).unwrap();
    assert!(view.shares_memory_with(&weight));
    assert_eq!(view.shape().dims(), &[3, 2, 2, 2]);
}
