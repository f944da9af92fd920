// ============================================================
// Layer 6 — Run Artifacts
// ============================================================
// Everything a trained network needs to be used again lives in
// one run folder:
//
//   <run>/
//     model.mpk           ← weights (Burn CompactRecorder)
//     model_config.json   ← SpectraCnnConfig, to rebuild the model
//     train_config.json   ← hyperparameters of the run
//     meanstd.npy         ← label mean / std (LabelNormalizer)
//     targetname.npy      ← label column names (fixed-width strings)
//     targetname.json     ← the same names, readable without numpy
//     model_summary.txt   ← module tree and parameter count
//     log.csv             ← per-epoch metrics (MetricsLogger)
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use npyz::WriterBuilder;
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::targets::TargetNames;
use crate::domain::traits::Persistable;
use crate::ml::model::{SpectraCnn, SpectraCnnConfig};

const MODEL_FILE:        &str = "model";
const MODEL_CONFIG_FILE: &str = "model_config.json";
const TRAIN_CONFIG_FILE: &str = "train_config.json";
const TARGETS_FILE:      &str = "targetname.npy";
const TARGETS_JSON_FILE: &str = "targetname.json";
const SUMMARY_FILE:      &str = "model_summary.txt";

/// Reads and writes the files of one run folder.
pub struct RunArtifacts {
    dir: PathBuf,
}

impl RunArtifacts {
    /// Open a run folder, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create run folder '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing run folder for inference
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.join(MODEL_CONFIG_FILE).exists() {
            anyhow::bail!(
                "'{}' is not a trained run folder (no {})",
                dir.display(),
                MODEL_CONFIG_FILE
            );
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save model weights (the recorder adds the file extension)
    pub fn save_model<B: Backend>(&self, model: &SpectraCnn<B>) -> Result<()> {
        let path = self.dir.join(MODEL_FILE);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;
        tracing::info!("Model saved to '{}'", path.display());
        Ok(())
    }

    /// Rebuild the model from model_config.json and load its weights
    pub fn load_model<B: Backend>(&self, device: &B::Device) -> Result<SpectraCnn<B>> {
        let cfg = self.load_model_config()?;
        cfg.validate()
            .with_context(|| format!("Invalid {} in '{}'", MODEL_CONFIG_FILE, self.dir.display()))?;
        let model: SpectraCnn<B> = cfg.init(device);
        let path = self.dir.join(MODEL_FILE);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load model '{}'. Did training finish?", path.display())
            })?;
        Ok(model.load_record(record))
    }

    pub fn save_model_config(&self, cfg: &SpectraCnnConfig) -> Result<()> {
        let path = self.dir.join(MODEL_CONFIG_FILE);
        cfg.save(&path)
            .with_context(|| format!("Cannot write '{}'", path.display()))
    }

    pub fn load_model_config(&self) -> Result<SpectraCnnConfig> {
        let path = self.dir.join(MODEL_CONFIG_FILE);
        SpectraCnnConfig::load(&path)
            .map_err(|e| anyhow::anyhow!("Cannot read '{}': {:?}", path.display(), e))
    }

    pub fn save_train_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_train_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read config from '{}'", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Write a text description of the network.
    /// Only a convenience, so failures are logged and ignored.
    pub fn write_model_summary<B: Backend>(&self, model: &SpectraCnn<B>) {
        let path = self.dir.join(SUMMARY_FILE);
        let text = format!("parameters: {}\n\n{:#?}\n", model.num_params(), model);
        if let Err(e) = fs::write(&path, text) {
            tracing::warn!("Skipped model summary '{}': {}", path.display(), e);
        }
    }
}

/// Write names as a 1-D numpy unicode array, `<U{longest name}`
fn write_name_array(path: &Path, names: &[String]) -> Result<()> {
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(1).max(1);
    let dtype = format!("<U{width}")
        .parse::<npyz::TypeStr>()
        .map_err(|e| anyhow::anyhow!("Invalid string dtype: {e}"))?;
    let file = File::create(path)?;
    let mut writer = npyz::WriteOptions::<String>::new()
        .dtype(npyz::DType::Plain(dtype))
        .shape(&[names.len() as u64])
        .writer(BufWriter::new(file))
        .begin_nd()?;
    for name in names {
        writer.push(name)?;
    }
    writer.finish()?;
    Ok(())
}

fn read_name_array(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let npy  = npyz::NpyFile::new(BufReader::new(file))?;
    Ok(npy.into_vec::<String>()?)
}

impl Persistable for TargetNames {
    fn save(&self, dir: &Path) -> Result<()> {
        let names: Vec<String> = self.iter().map(String::from).collect();
        let path = dir.join(TARGETS_FILE);
        write_name_array(&path, &names)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;

        let path = dir.join(TARGETS_JSON_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))
    }

    /// Reads the JSON copy, or the .npy array when only that exists
    fn load(dir: &Path) -> Result<Self> {
        let json_path = dir.join(TARGETS_JSON_FILE);
        if json_path.exists() {
            let json = fs::read_to_string(&json_path)
                .with_context(|| format!("Cannot read '{}'", json_path.display()))?;
            return Ok(serde_json::from_str(&json)?);
        }
        let path  = dir.join(TARGETS_FILE);
        let names = read_name_array(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        TargetNames::new(names)
    }
}

/// A small trained-looking run folder for use case tests
#[cfg(test)]
pub(crate) fn write_test_run(dir: &Path, n_pixels: usize) -> RunArtifacts {
    use crate::data::normalizer::LabelNormalizer;
    use burn::backend::NdArray;
    use ndarray::array;

    let artifacts = RunArtifacts::new(dir).unwrap();
    let cfg       = SpectraCnnConfig::new(n_pixels, 1).with_hidden_1(4).with_hidden_2(4);
    artifacts.save_model_config(&cfg).unwrap();
    artifacts.save_model(&cfg.init::<NdArray>(&Default::default())).unwrap();
    LabelNormalizer { mean: array![0.0], std: array![1.0] }.save(dir).unwrap();
    TargetNames::parse("teff").unwrap().save(dir).unwrap();
    artifacts
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_model_round_trip_keeps_predictions() {
        let dir       = tempfile::tempdir().unwrap();
        let artifacts = RunArtifacts::new(dir.path()).unwrap();
        let device    = Default::default();

        let cfg   = SpectraCnnConfig::new(32, 2).with_hidden_1(8).with_hidden_2(4);
        let model = cfg.init::<NdArray>(&device);
        artifacts.save_model_config(&cfg).unwrap();
        artifacts.save_model(&model).unwrap();

        let reopened = RunArtifacts::open(dir.path()).unwrap();
        let loaded   = reopened.load_model::<NdArray>(&device).unwrap();

        let x = Tensor::<NdArray, 3>::ones([1, 1, 32], &device);
        let a = model.forward(x.clone()).into_data().to_vec::<f32>().unwrap();
        let b = loaded.forward(x).into_data().to_vec::<f32>().unwrap();
        for (p, q) in a.iter().zip(b.iter()) {
            // CompactRecorder stores half precision
            assert!((p - q).abs() < 5e-2 * (1.0 + p.abs()));
        }
    }

    #[test]
    fn test_open_rejects_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RunArtifacts::open(dir.path()).is_err());
    }

    #[test]
    fn test_target_names_persist() {
        let dir   = tempfile::tempdir().unwrap();
        let names = TargetNames::parse("teff,logg,Fe").unwrap();
        names.save(dir.path()).unwrap();
        assert_eq!(TargetNames::load(dir.path()).unwrap(), names);
    }

    #[test]
    fn test_train_config_persists() {
        let dir       = tempfile::tempdir().unwrap();
        let artifacts = RunArtifacts::new(dir.path()).unwrap();
        let cfg       = TrainConfig { batch_size: 32, ..TrainConfig::default() };
        artifacts.save_train_config(&cfg).unwrap();
        assert_eq!(artifacts.load_train_config().unwrap().batch_size, 32);
    }

    #[test]
    fn test_target_names_written_as_string_array() {
        let dir   = tempfile::tempdir().unwrap();
        let names = TargetNames::parse("teff,logg,alpha_M").unwrap();
        names.save(dir.path()).unwrap();

        let npy = dir.path().join(TARGETS_FILE);
        assert_eq!(read_name_array(&npy).unwrap(), vec!["teff", "logg", "alpha_M"]);

        // Header declares little-endian unicode of the longest name
        let bytes = fs::read(&npy).unwrap();
        assert!(bytes.starts_with(b"\x93NUMPY"));
        assert!(String::from_utf8_lossy(&bytes).contains("<U7"));

        fs::remove_file(dir.path().join(TARGETS_JSON_FILE)).unwrap();
        assert_eq!(TargetNames::load(dir.path()).unwrap(), names);
    }
}
