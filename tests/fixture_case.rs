use pretty_assertions::assert_eq;
use qconv::io::LayerCase;
use qconv::{ExecParams, Padding, Strides, TensorI8};

const CASE_JSON: &str = r#"{
  "name": "two_channel_zp",
  "geometry": { "kernel_v": 2, "kernel_h": 2, "input_channels": 1, "output_channels": 2 },
  "params": {
    "input_zero_point": 1,
    "weight_zero_points": [1, -2],
    "output_zero_point": -3,
    "rescale": [ { "multiplier": 1, "shift": 1 }, { "multiplier": 3, "shift": 2 } ]
  },
  "bias": [1, -8],
  "filter": { "out_channels": 2, "kernel_v": 2, "kernel_h": 2, "in_channels": 1,
              "data": [1, 2, 3, 4, 0, 0, 0, 0] },
  "input": { "rows": 3, "cols": 3, "channels": 1, "data": [1, 2, 3, 4, 5, 6, 7, 8, 9] },
  "expected": { "rows": 2, "cols": 2, "channels": 2, "data": [7, 3, 10, 9, 16, 21, 19, 27] }
}"#;

#[test]
fn json_case_defaults_to_unit_stride_valid_padding() {
    let case: LayerCase = serde_json::from_str(CASE_JSON).unwrap();
    assert_eq!(case.strides, Strides::unit());
    assert_eq!(case.padding, Padding::Valid);
}

#[test]
fn json_case_runs_and_passes() {
    let case: LayerCase = serde_json::from_str(CASE_JSON).unwrap();
    let out = case.run(&ExecParams::default()).unwrap();
    let report = case.check(&out).unwrap();
    assert!(report.passed(), "{:?}", report);
    assert_eq!(report.cells, 8);
    assert_eq!(report.max_abs_diff, 0);
}

#[test]
fn mismatches_are_counted() {
    let mut case: LayerCase = serde_json::from_str(CASE_JSON).unwrap();
    if let Some(e) = case.expected.as_mut() {
        e.data[0] = 10;
        e.data[7] = 20;
    }
    let out = case.run(&ExecParams::default()).unwrap();
    let report = case.check(&out).unwrap();
    assert!(!report.passed());
    assert_eq!(report.mismatches, 2);
    assert_eq!(report.max_abs_diff, 7);
}

#[test]
fn shape_mismatch_fails_the_report() {
    let mut case: LayerCase = serde_json::from_str(CASE_JSON).unwrap();
    case.expected = Some(TensorI8::new(1, 2, 2));
    let out = case.run(&ExecParams::default()).unwrap();
    let report = case.check(&out).unwrap();
    assert!(!report.passed());
    assert_eq!(report.shape, (2, 2, 2));
    assert_eq!(report.expected_shape, (1, 2, 2));
}

#[test]
fn case_without_expected_has_no_report() {
    let mut case: LayerCase = serde_json::from_str(CASE_JSON).unwrap();
    case.expected = None;
    let out = case.run(&ExecParams::default()).unwrap();
    assert!(case.check(&out).is_none());
}

#[test]
fn same_padding_case_fails_to_run() {
    let mut case: LayerCase = serde_json::from_str(CASE_JSON).unwrap();
    case.padding = Padding::Same;
    let err = case.run(&ExecParams::default()).unwrap_err();
    assert!(format!("{:#}", err).contains("unsupported padding"));
}

#[test]
fn case_file_roundtrip() {
    std::fs::create_dir_all("target").unwrap();
    let path = "target/qconv_case.json";
    let case: LayerCase = serde_json::from_str(CASE_JSON).unwrap();
    case.save_json(path).unwrap();
    assert_eq!(LayerCase::load_json(path).unwrap(), case);
}
