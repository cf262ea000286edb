use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fullconv_core::{
    spatial_full_conv2d, spatial_full_conv2d_acc_grad_parameters, spatial_full_conv2d_grad_input,
    Tensor,
};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn random_tensor(dims: &[usize], rng: &mut StdRng) -> Tensor<f32> {
    let dist = Uniform::new(-1.0f32, 1.0);
    Tensor::from_fn(dims, |_| dist.sample(rng))
}

fn bench_spatial_full_conv2d(c: &mut Criterion) {
    let mut group = c.benchmark_group("spatial_full_conv2d");
    let mut rng = StdRng::seed_from_u64(0);

    for &(batch, channels, size) in &[(1, 16, 16), (8, 16, 16), (8, 32, 32)] {
        let input = random_tensor(&[batch, channels, size, size], &mut rng);
        let weight = random_tensor(&[channels, channels / 2, 4, 4], &mut rng);
        let bias = random_tensor(&[channels / 2], &mut rng);
        let stride = (2, 2);

        let mut output = Tensor::zeros(&[0]);
        if spatial_full_conv2d(&mut output, &input, &weight, &bias, stride).is_err() {
            continue;
        }
        let grad_output = random_tensor(output.shape().dims(), &mut rng);
        let label = format!("{batch}x{channels}x{size}x{size}");

        group.bench_with_input(BenchmarkId::new("forward", &label), &input, |b, input| {
            b.iter(|| spatial_full_conv2d(&mut output, black_box(input), &weight, &bias, stride))
        });

        let mut grad_input = Tensor::zeros(&[0]);
        group.bench_with_input(BenchmarkId::new("grad_input", &label), &input, |b, input| {
            b.iter(|| {
                spatial_full_conv2d_grad_input(
                    &mut grad_input,
                    black_box(input),
                    &grad_output,
                    &weight,
                    stride,
                )
            })
        });

        let mut grad_weight = Tensor::zeros(weight.shape().dims());
        let mut grad_bias = Tensor::zeros(bias.shape().dims());
        group.bench_with_input(BenchmarkId::new("acc_grad_parameters", &label), &input, |b, input| {
            b.iter(|| {
                spatial_full_conv2d_acc_grad_parameters(
                    &mut grad_weight,
                    &mut grad_bias,
                    black_box(input),
                    &grad_output,
                    &weight,
                    stride,
                    1.0,
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spatial_full_conv2d);
criterion_main!(benches);
