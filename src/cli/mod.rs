// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`    — trains the CNN, writes a run folder
//   2. `test`     — predicts a labelled set, residual plots
//   3. `jacobian` — output-vs-pixel gradients and their plots
//
// Every command runs on Autodiff<Wgpu> by default, or on
// Autodiff<NdArray> with --cpu.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{
    ndarray::NdArrayDevice,
    wgpu::WgpuDevice,
    Autodiff, NdArray, Wgpu,
};
use clap::Parser;
use commands::{Commands, JacobianArgs, TestArgs, TrainArgs};

use crate::application::{
    evaluate_use_case::{format_stats, EvaluateUseCase},
    jacobian_use_case::JacobianUseCase,
    train_use_case::TrainUseCase,
};

type GpuBackend = Autodiff<Wgpu>;
type CpuBackend = Autodiff<NdArray>;

#[derive(Parser, Debug)]
#[command(
    name = "stellar-cnn",
    version,
    about = "Train a 1D CNN on APOGEE spectra, then plot residuals and Jacobians."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Test(args)     => run_test(args),
            Commands::Jacobian(args) => run_jacobian(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let cpu      = args.cpu;
    let use_case = TrainUseCase::new(args.into());
    let run_dir  = if cpu {
        use_case.execute::<CpuBackend>(NdArrayDevice::default())?
    } else {
        use_case.execute::<GpuBackend>(WgpuDevice::default())?
    };
    println!("Training complete. Run saved to '{}'", run_dir.display());
    Ok(())
}

fn run_test(args: TestArgs) -> Result<()> {
    let cpu      = args.cpu;
    let use_case = EvaluateUseCase::new(args.into());
    let stats    = if cpu {
        use_case.execute::<CpuBackend>(NdArrayDevice::default())?
    } else {
        use_case.execute::<GpuBackend>(WgpuDevice::default())?
    };
    println!("\n{}", format_stats(&stats));
    Ok(())
}

fn run_jacobian(args: JacobianArgs) -> Result<()> {
    let cpu      = args.cpu;
    let use_case = JacobianUseCase::new(args.into());
    let plots    = if cpu {
        use_case.execute::<CpuBackend>(NdArrayDevice::default())?
    } else {
        use_case.execute::<GpuBackend>(WgpuDevice::default())?
    };
    println!("Wrote {} Jacobian plots", plots.len());
    Ok(())
}
