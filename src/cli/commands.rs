// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `test` and `jacobian`
// and all their configurable flags.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::{
    evaluate_use_case::EvaluateConfig,
    jacobian_use_case::JacobianConfig,
    train_use_case::TrainConfig,
};
use crate::infra::windows::MaskSource;
use crate::ml::scheduler::PlateauConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the CNN on spectra and ASPCAP labels
    Train(TrainArgs),

    /// Predict a labelled test set and plot residuals
    Test(TestArgs),

    /// Compute and plot output-vs-pixel Jacobians
    Jacobian(JacobianArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Spectra .npy file, shape [stars, pixels]
    #[arg(long)]
    pub spectra: PathBuf,

    /// Labels .npy file, shape [stars, targets]; -9999 marks a missing label
    #[arg(long)]
    pub labels: PathBuf,

    /// Target names: "all" or a comma-separated list, in label column order
    #[arg(long, default_value = "all")]
    pub targets: String,

    /// Folder in which the run folder is created
    #[arg(long, default_value = ".")]
    pub output: PathBuf,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 500)]
    pub epochs: usize,

    /// Initial Adam learning rate
    #[arg(long, default_value_t = 0.005)]
    pub lr: f64,

    /// L2 penalty, applied as weight decay
    #[arg(long, default_value_t = 1e-4)]
    pub l2: f64,

    /// Fraction of stars held out for validation (0 disables)
    #[arg(long, default_value_t = 0.1)]
    pub val_fraction: f64,

    /// Batch-loading threads; 0 uses one per CPU
    #[arg(long, default_value_t = 0)]
    pub workers: usize,

    /// Batches kept ready by the loading threads
    #[arg(long, default_value_t = 20)]
    pub max_queue_size: usize,

    /// Filters of the two convolution layers
    #[arg(long, num_args = 2, value_names = ["F1", "F2"], default_values_t = [2, 4])]
    pub filters: Vec<usize>,

    #[arg(long, default_value_t = 8)]
    pub filter_length: usize,

    #[arg(long, default_value_t = 4)]
    pub pool_length: usize,

    /// Units of the two hidden dense layers
    #[arg(long, num_args = 2, value_names = ["H1", "H2"], default_values_t = [196, 96])]
    pub hidden: Vec<usize>,

    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    /// Epochs without improvement before the learning rate is halved
    #[arg(long, default_value_t = 10)]
    pub patience: usize,

    /// Seed for batch shuffling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Use the CPU (NdArray) backend instead of the GPU
    #[arg(long)]
    pub cpu: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let defaults = TrainConfig::default();
        TrainConfig {
            spectra_path:   a.spectra,
            labels_path:    a.labels,
            targets:        a.targets,
            output_root:    a.output,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            l2:             a.l2,
            val_fraction:   a.val_fraction,
            workers:        a.workers,
            max_queue_size: a.max_queue_size,
            filters_1:      a.filters.first().copied().unwrap_or(defaults.filters_1),
            filters_2:      a.filters.get(1).copied().unwrap_or(defaults.filters_2),
            filter_length:  a.filter_length,
            pool_length:    a.pool_length,
            hidden_1:       a.hidden.first().copied().unwrap_or(defaults.hidden_1),
            hidden_2:       a.hidden.get(1).copied().unwrap_or(defaults.hidden_2),
            dropout:        a.dropout,
            plateau:        PlateauConfig { patience: a.patience, ..PlateauConfig::default() },
            seed:           a.seed,
            ..defaults
        }
    }
}

/// All arguments for the `test` command
#[derive(Args, Debug)]
pub struct TestArgs {
    /// Run folder written by `train`
    #[arg(long)]
    pub run: PathBuf,

    #[arg(long)]
    pub spectra: PathBuf,

    #[arg(long)]
    pub labels: PathBuf,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Monte Carlo dropout passes per star (0 = single pass, no errors)
    #[arg(long, default_value_t = 0)]
    pub mc_samples: usize,

    #[arg(long)]
    pub cpu: bool,
}

impl From<TestArgs> for EvaluateConfig {
    fn from(a: TestArgs) -> Self {
        EvaluateConfig {
            run_dir:      a.run,
            spectra_path: a.spectra,
            labels_path:  a.labels,
            batch_size:   a.batch_size,
            mc_samples:   a.mc_samples,
        }
    }
}

/// All arguments for the `jacobian` command
#[derive(Args, Debug)]
pub struct JacobianArgs {
    /// Run folder written by `train`
    #[arg(long)]
    pub run: PathBuf,

    #[arg(long)]
    pub spectra: PathBuf,

    /// Only use the first N spectra
    #[arg(long)]
    pub max_stars: Option<usize>,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    /// Keep the Jacobian in normalised label units
    #[arg(long)]
    pub normalized: bool,

    /// Data release of the ASPCAP windows to download
    #[arg(long, default_value_t = 14)]
    pub dr: u32,

    /// Read <name>.mask files from this folder instead of downloading
    #[arg(long, conflicts_with = "no_windows")]
    pub mask_dir: Option<PathBuf>,

    /// Do not overlay ASPCAP windows
    #[arg(long)]
    pub no_windows: bool,

    #[arg(long)]
    pub cpu: bool,
}

impl From<JacobianArgs> for JacobianConfig {
    fn from(a: JacobianArgs) -> Self {
        let mask_source = match (a.no_windows, a.mask_dir) {
            (true, _)          => MaskSource::Disabled,
            (false, Some(dir)) => MaskSource::Local(dir),
            (false, None)      => MaskSource::Remote { dr: a.dr },
        };
        JacobianConfig {
            run_dir:      a.run,
            spectra_path: a.spectra,
            max_stars:    a.max_stars,
            batch_size:   a.batch_size,
            physical:     !a.normalized,
            mask_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_train_defaults_match_config() {
        let Commands::Train(args) = parse(&["stellar-cnn", "train", "--spectra", "s.npy", "--labels", "l.npy"]) else {
            panic!("expected train");
        };
        assert!(!args.cpu);
        let cfg: TrainConfig = args.into();
        let default = TrainConfig::default();
        assert_eq!(cfg.batch_size, default.batch_size);
        assert_eq!(cfg.epochs, default.epochs);
        assert_eq!((cfg.filters_1, cfg.filters_2), (2, 4));
        assert_eq!((cfg.hidden_1, cfg.hidden_2), (196, 96));
        assert_eq!(cfg.plateau.patience, 10);
        assert_eq!(cfg.targets, "all");
    }

    #[test]
    fn test_train_architecture_flags() {
        let Commands::Train(args) = parse(&[
            "stellar-cnn", "train", "--spectra", "s.npy", "--labels", "l.npy",
            "--filters", "8", "16", "--hidden", "64", "32", "--cpu",
        ]) else {
            panic!("expected train");
        };
        assert!(args.cpu);
        let cfg: TrainConfig = args.into();
        assert_eq!((cfg.filters_1, cfg.filters_2), (8, 16));
        assert_eq!((cfg.hidden_1, cfg.hidden_2), (64, 32));
    }

    #[test]
    fn test_jacobian_mask_source() {
        let base = ["stellar-cnn", "jacobian", "--run", "r", "--spectra", "s.npy"];

        let Commands::Jacobian(args) = parse(&base) else { panic!("expected jacobian") };
        let cfg: JacobianConfig = args.into();
        assert!(matches!(cfg.mask_source, MaskSource::Remote { dr: 14 }));
        assert!(cfg.physical);

        let mut local = base.to_vec();
        local.extend(["--mask-dir", "masks"]);
        let Commands::Jacobian(args) = parse(&local) else { panic!("expected jacobian") };
        let cfg: JacobianConfig = args.into();
        assert!(matches!(cfg.mask_source, MaskSource::Local(_)));

        let mut off = base.to_vec();
        off.push("--no-windows");
        let Commands::Jacobian(args) = parse(&off) else { panic!("expected jacobian") };
        let cfg: JacobianConfig = args.into();
        assert!(matches!(cfg.mask_source, MaskSource::Disabled));
    }

    #[test]
    fn test_test_command_requires_run() {
        assert!(Cli::try_parse_from(["stellar-cnn", "test", "--spectra", "s", "--labels", "l"]).is_err());
    }
}
