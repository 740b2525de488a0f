use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use qconv::io::{random_tensor, LayerCase, LayerFile};
use qconv::{ExecParams, TensorI8};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "qconv", version, about = "Run one int8 quantized convolution layer")]
struct Args {
    /// JSON layer case (configuration, input and optional expected output)
    #[arg(long, conflicts_with = "layer")]
    case: Option<PathBuf>,

    /// Binary layer file (QCONVL01)
    #[arg(long)]
    layer: Option<PathBuf>,

    /// JSON input tensor for --layer
    #[arg(long, conflicts_with_all = ["random_input", "case"])]
    input: Option<PathBuf>,

    /// Generate a random input for --layer from this seed
    #[arg(long, conflicts_with = "case")]
    random_input: Option<u64>,

    /// Rows of the random input
    #[arg(long, default_value_t = 16, conflicts_with = "case")]
    rows: usize,

    /// Columns of the random input
    #[arg(long, default_value_t = 16, conflicts_with = "case")]
    cols: usize,

    /// Worker threads (1 = serial, 0 = rayon default)
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Write the output tensor as JSON
    #[arg(long)]
    out: Option<PathBuf>,
}

fn read_tensor(path: &PathBuf) -> Result<TensorI8> {
    let f = File::open(path).with_context(|| format!("open input tensor: {}", path.display()))?;
    let t: TensorI8 = serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("parse input tensor: {}", path.display()))?;
    Ok(t)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let exec = ExecParams { threads: args.threads, ..ExecParams::default() };

    let (case, output, elapsed) = if let Some(path) = args.case.as_ref() {
        let case = LayerCase::load_json(path)?;
        info!("case '{}': input {} filter {}", case.name, case.input, case.filter);
        let t0 = Instant::now();
        let out = case.run(&exec)?;
        (Some(case), out, t0.elapsed())
    } else if let Some(path) = args.layer.as_ref() {
        let layer = LayerFile::load(path)?.into_layer().context("invalid layer configuration")?;
        let input = match (args.input.as_ref(), args.random_input) {
            (Some(p), _) => read_tensor(p)?,
            (None, Some(seed)) => random_tensor(args.rows, args.cols, layer.geometry().input_channels, seed),
            (None, None) => bail!("--layer needs --input or --random-input"),
        };
        info!("layer {}: input {}", layer.filter(), input);
        let t0 = Instant::now();
        let out = layer.forward_with(&input, &exec)?;
        (None, out, t0.elapsed())
    } else {
        bail!("one of --case or --layer is required");
    };

    println!("output={} elapsed={:.3}ms", output, elapsed.as_secs_f64() * 1e3);

    if let Some(path) = args.out.as_ref() {
        let f = File::create(path).with_context(|| format!("create output file: {}", path.display()))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer(&mut w, &output).context("serialize output")?;
        w.flush()?;
    }

    if let Some(report) = case.as_ref().and_then(|c| c.check(&output)) {
        println!("{}", serde_json::to_string(&report)?);
        if !report.passed() {
            bail!("{} of {} cells differ (max diff {})", report.mismatches, report.cells, report.max_abs_diff);
        }
    }
    Ok(())
}
