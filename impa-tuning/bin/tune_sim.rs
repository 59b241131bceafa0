use clap::Parser;
use impa_tuning::simulated::{AmplifierModel, SimulatedRig};
use impa_tuning::{IMPATuner, TuningEvent, TuningParameters, spawn_sweep};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(
    name = "tune_sim",
    about = "Tune a simulated parametric amplifier over a list of signal frequencies"
)]
struct Cli {
    /// JSON parameter file (fields not given keep their defaults)
    #[arg(long)]
    params: Option<PathBuf>,

    /// Target signal frequencies in Hz, comma separated
    #[arg(long, value_delimiter = ',')]
    frequencies: Vec<f64>,

    /// Target gain in dB
    #[arg(long)]
    target_gain: Option<f64>,

    /// Population size multiplier
    #[arg(long)]
    popsize: Option<usize>,

    /// Maximum number of generations per point
    #[arg(long)]
    maxiter: Option<usize>,

    /// Random seed for reproducible searches
    #[arg(long)]
    seed: Option<u64>,

    /// Traces per pump state in the SNR snapshot
    #[arg(long)]
    snr_measurements: Option<usize>,

    /// Bias current of the simulated gain maximum (A)
    #[arg(long, default_value_t = 0.42e-3)]
    optimal_bias: f64,

    /// Pump power of the simulated gain maximum (dBm)
    #[arg(long, default_value_t = -1.3, allow_negative_numbers = true)]
    optimal_power: f64,

    /// Simulated duration of one analyzer sweep in milliseconds
    #[arg(long, default_value_t = 0)]
    sweep_ms: u64,

    /// Write the tuning table to this file
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log every generation at info level
    #[arg(long)]
    disp: bool,
}

fn load_params(args: &Cli) -> impa_tuning::Result<TuningParameters> {
    let mut params = match &args.params {
        Some(path) => TuningParameters::from_file(path)?,
        None => TuningParameters::default(),
    };
    if !args.frequencies.is_empty() {
        params.target_frequencies = args.frequencies.clone();
    }
    if let Some(g) = args.target_gain {
        params.target_gain_db = g;
    }
    if let Some(p) = args.popsize {
        params.search.popsize = p;
    }
    if let Some(m) = args.maxiter {
        params.search.maxiter = m;
    }
    if let Some(n) = args.snr_measurements {
        params.snr_measurements = n;
    }
    if args.seed.is_some() {
        params.search.seed = args.seed;
    }
    params.search.disp |= args.disp;
    Ok(params)
}

fn main() {
    env_logger::init();
    let args = Cli::parse();

    let params = match load_params(&args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    let model = AmplifierModel {
        optimal_bias: args.optimal_bias,
        optimal_power: args.optimal_power,
        peak_gain_db: params.target_gain_db,
        ..AmplifierModel::default()
    };
    let rig = SimulatedRig::new(model).with_sweep_time(Duration::from_millis(args.sweep_ms));
    let tuner = IMPATuner::new(rig.instruments(), params);

    let start = Instant::now();
    let handle = match spawn_sweep(tuner) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    for event in handle.events() {
        match event {
            TuningEvent::Started { points } => println!("Tuning {points} frequency points"),
            TuningEvent::PointStarted { index, frequency } => {
                println!("[{}] {:.4} GHz ...", index + 1, frequency / 1e9);
            }
            TuningEvent::PointFinished {
                point,
                success,
                verification,
                ..
            } => {
                let peak_snr_gain = verification
                    .snr_gain
                    .iter()
                    .cloned()
                    .fold(f64::NEG_INFINITY, f64::max);
                println!("{}", point.describe());
                println!(
                    "converged={success} peak SNR gain over band={:.2} dB",
                    20.0 * peak_snr_gain.log10()
                );
            }
            TuningEvent::Aborted { completed } => println!("Aborted after {completed} points"),
            TuningEvent::Failed { error } => eprintln!("Sweep failed: {error}"),
            TuningEvent::Finished { table } => {
                println!("Finished {} points in {:.2?}", table.len(), start.elapsed());
            }
        }
    }

    let table = match handle.join() {
        Ok((_, Ok(table))) => table,
        Ok((_, Err(e))) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    if let Some(path) = &args.output {
        let written = File::create(path)
            .map_err(impa_tuning::TuningError::from)
            .and_then(|f| table.write_to(BufWriter::new(f)));
        if let Err(e) = written {
            eprintln!("Error writing {}: {e}", path.display());
            process::exit(1);
        }
        println!("Tuning table written to {}", path.display());
    } else {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = table.write_to(&mut stdout) {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
