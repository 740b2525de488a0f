use qconv::{ConvGeometry, FilterI8, Padding, QuantConv2d, QuantParams, Rescale, Strides, TensorI8};

fn saturating_layer(weight: i8) -> QuantConv2d {
    let g = ConvGeometry::new(3, 3, 4, 1);
    let mut f = FilterI8::new(1, 3, 3, 4);
    f.fill(weight);
    let params = QuantParams::per_tensor(0, 0, 0, Rescale::new(1, 1), 1);
    QuantConv2d::new(g, f, vec![0], params, Strides::unit(), Padding::Valid).unwrap()
}

#[test]
fn large_positive_accumulator_clamps_to_127() {
    let mut input = TensorI8::new(3, 3, 4);
    input.fill(127);
    let out = saturating_layer(127).forward(&input).unwrap();
    assert_eq!(out.data, vec![127]);
}

#[test]
fn large_negative_accumulator_clamps_to_minus_128() {
    let mut input = TensorI8::new(3, 3, 4);
    input.fill(127);
    let out = saturating_layer(-128).forward(&input).unwrap();
    assert_eq!(out.data, vec![-128]);
}

#[test]
fn output_zero_point_can_push_into_saturation() {
    // acc = 2 * 60 = 120, (120 + 1) >> 1 = 60, +100 = 160 -> 127
    let g = ConvGeometry::new(1, 1, 1, 1);
    let f = FilterI8::from_vec(1, 1, 1, 1, vec![2]).unwrap();
    let params = QuantParams::per_tensor(0, 0, 100, Rescale::new(1, 1), 1);
    let l = QuantConv2d::new(g, f, vec![0], params, Strides::unit(), Padding::Valid).unwrap();
    let input = TensorI8::from_vec(1, 2, 1, vec![60, -60]).unwrap();
    // second cell: (-120 + 1) >> 1 = -60, +100 = 40
    assert_eq!(l.forward(&input).unwrap().data, vec![127, 40]);
}

#[test]
fn values_at_the_bounds_are_kept() {
    let g = ConvGeometry::new(1, 1, 1, 1);
    let f = FilterI8::from_vec(1, 1, 1, 1, vec![1]).unwrap();
    let params = QuantParams::per_tensor(0, 0, 0, Rescale::new(2, 1), 1);
    let l = QuantConv2d::new(g, f, vec![0], params, Strides::unit(), Padding::Valid).unwrap();
    let input = TensorI8::from_vec(1, 2, 1, vec![127, -128]).unwrap();
    assert_eq!(l.forward(&input).unwrap().data, vec![127, -128]);
}
