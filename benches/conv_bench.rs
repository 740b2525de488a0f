use criterion::{criterion_group, criterion_main, Criterion, black_box};
use qconv::io::{random_filter, random_tensor};
use qconv::{ConvGeometry, Padding, QuantConv2d, QuantParams, Rescale, Strides};

fn make_random_layer(in_ch: usize, out_ch: usize) -> QuantConv2d {
    let g = ConvGeometry::new(3, 3, in_ch, out_ch);
    let params = QuantParams::per_tensor(-1, 0, 2, Rescale::new(1_100_000_000, 38), out_ch);
    QuantConv2d::new(g, random_filter(&g, 0x1234), vec![0; out_ch], params, Strides::unit(), Padding::Valid)
        .expect("valid layer")
}

fn bench_conv_serial(c: &mut Criterion) {
    // 70x567 single-channel input, a typical first layer size
    let layer = make_random_layer(1, 16);
    let input = random_tensor(70, 567, 1, 1);
    c.bench_function("conv3x3_1to16_70x567_serial", |ben| {
        ben.iter(|| black_box(layer.forward(black_box(&input)).unwrap()))
    });
}

fn bench_conv_threads(c: &mut Criterion) {
    let layer = make_random_layer(16, 32);
    let input = random_tensor(34, 64, 16, 2);
    let mut group = c.benchmark_group("conv3x3_16to32");
    group.bench_function("serial", |ben| {
        ben.iter(|| black_box(layer.forward(black_box(&input)).unwrap()))
    });
    for &threads in &[2usize, 4] {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        group.bench_function(format!("rayon_{}", threads), |ben| {
            ben.iter(|| pool.install(|| black_box(layer.forward_par(black_box(&input)).unwrap())))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_conv_serial, bench_conv_threads);
criterion_main!(benches);
