use burn::{
    nn::{
        conv::{Conv1d, Conv1dConfig},
        pool::{MaxPool1d, MaxPool1dConfig},
        BatchNorm, BatchNormConfig,
        Dropout, DropoutConfig,
        Initializer,
        Linear, LinearConfig,
        PaddingConfig1d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::loss::masked_mse;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct SpectraCnnConfig {
    pub n_pixels:  usize,
    pub n_targets: usize,
    #[config(default = 2)]
    pub filters_1: usize,
    #[config(default = 4)]
    pub filters_2: usize,
    #[config(default = 8)]
    pub filter_length: usize,
    #[config(default = 4)]
    pub pool_length: usize,
    #[config(default = 196)]
    pub hidden_1: usize,
    #[config(default = 96)]
    pub hidden_2: usize,
    #[config(default = 0.2)]
    pub dropout: f64,
}

fn he_normal() -> Initializer {
    Initializer::KaimingNormal { gain: 2.0_f64.sqrt(), fan_out_only: false }
}

impl SpectraCnnConfig {
    /// Length of the flattened feature vector after pooling
    pub fn flat_features(&self) -> usize {
        self.filters_2 * (self.n_pixels / self.pool_length)
    }

    /// Reject shapes `init` cannot build a network for
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.n_targets == 0 {
            anyhow::bail!("the network needs at least one target");
        }
        if self.filter_length == 0 || self.pool_length == 0 {
            anyhow::bail!(
                "filter length ({}) and pool length ({}) must be positive",
                self.filter_length,
                self.pool_length
            );
        }
        if self.n_pixels < self.pool_length {
            anyhow::bail!(
                "spectra of {} pixels are shorter than the pool length {}",
                self.n_pixels,
                self.pool_length
            );
        }
        Ok(())
    }

    /// Call `validate` first on configurations read from disk or user input
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpectraCnn<B> {
        // Padding is applied by hand in forward() so even kernels keep the
        // input length, with the extra pixel on the right.
        let conv_1 = Conv1dConfig::new(1, self.filters_1, self.filter_length)
            .with_padding(PaddingConfig1d::Valid)
            .with_initializer(he_normal())
            .init(device);
        let conv_2 = Conv1dConfig::new(self.filters_1, self.filters_2, self.filter_length)
            .with_padding(PaddingConfig1d::Valid)
            .with_initializer(he_normal())
            .init(device);
        let norm_1 = BatchNormConfig::new(self.filters_1).init(device);
        let norm_2 = BatchNormConfig::new(self.filters_2).init(device);
        let pool   = MaxPool1dConfig::new(self.pool_length)
            .with_stride(self.pool_length)
            .init();
        let dropout = DropoutConfig::new(self.dropout).init();
        let dense_1 = LinearConfig::new(self.flat_features(), self.hidden_1)
            .with_initializer(he_normal())
            .init(device);
        let dense_2 = LinearConfig::new(self.hidden_1, self.hidden_2)
            .with_initializer(he_normal())
            .init(device);
        let output  = LinearConfig::new(self.hidden_2, self.n_targets).init(device);

        SpectraCnn {
            conv_1, norm_1, conv_2, norm_2, pool, dropout,
            dense_1, dense_2, output,
            filter_length: self.filter_length,
        }
    }
}

#[derive(Module, Debug)]
pub struct SpectraCnn<B: Backend> {
    pub conv_1:  Conv1d<B>,
    pub norm_1:  BatchNorm<B, 1>,
    pub conv_2:  Conv1d<B>,
    pub norm_2:  BatchNorm<B, 1>,
    pub pool:    MaxPool1d,
    pub dropout: Dropout,
    pub dense_1: Linear<B>,
    pub dense_2: Linear<B>,
    pub output:  Linear<B>,
    pub filter_length: usize,
}

/// How batch norm and dropout behave during a forward pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// burn's default: batch statistics + dropout on autodiff backends
    Standard,
    /// running statistics, dropout off (differentiable inference)
    Frozen,
    /// running statistics, dropout on autodiff backends (MC dropout)
    MonteCarlo,
}

impl<B: Backend> SpectraCnn<B> {
    /// spectra: [batch, 1, n_pixels] → labels: [batch, n_targets]
    pub fn forward(&self, spectra: Tensor<B, 3>) -> Tensor<B, 2> {
        self.forward_mode(spectra, Mode::Standard)
    }

    /// Inference-mode forward pass that stays differentiable on autodiff
    /// backends. Each star's output depends only on its own spectrum.
    pub fn forward_frozen(&self, spectra: Tensor<B, 3>) -> Tensor<B, 2> {
        self.forward_mode(spectra, Mode::Frozen)
    }

    /// Like forward_frozen but keeps dropout active (on autodiff backends),
    /// so repeated calls sample the predictive distribution.
    pub fn forward_mc(&self, spectra: Tensor<B, 3>) -> Tensor<B, 2> {
        self.forward_mode(spectra, Mode::MonteCarlo)
    }

    pub fn forward_loss(&self, spectra: Tensor<B, 3>, labels: Tensor<B, 2>) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let output = self.forward(spectra);
        let loss   = masked_mse(output.clone(), labels);
        (loss, output)
    }

    fn forward_mode(&self, spectra: Tensor<B, 3>, mode: Mode) -> Tensor<B, 2> {
        let x = relu(self.conv_1.forward(pad_same(spectra, self.filter_length)));
        let x = self.normalize(&self.norm_1, x, mode);
        let x = relu(self.conv_2.forward(pad_same(x, self.filter_length)));
        let x = self.normalize(&self.norm_2, x, mode);
        let x = self.pool.forward(x);

        let x = x.flatten::<2>(1, 2);
        let x = match mode {
            Mode::Frozen => x,
            Mode::Standard | Mode::MonteCarlo => self.dropout.forward(x),
        };
        let x = relu(self.dense_1.forward(x));
        let x = relu(self.dense_2.forward(x));
        self.output.forward(x)
    }

    fn normalize(&self, norm: &BatchNorm<B, 1>, x: Tensor<B, 3>, mode: Mode) -> Tensor<B, 3> {
        match mode {
            Mode::Standard => norm.forward(x),
            Mode::Frozen | Mode::MonteCarlo => batch_norm_running(norm, x),
        }
    }
}

/// Batch norm with running statistics regardless of backend
fn batch_norm_running<B: Backend>(norm: &BatchNorm<B, 1>, x: Tensor<B, 3>) -> Tensor<B, 3> {
    let channels = x.dims()[1];
    let mean  = norm.running_mean.value().reshape([1, channels, 1]);
    let var   = norm.running_var.value().reshape([1, channels, 1]);
    let gamma = norm.gamma.val().reshape([1, channels, 1]);
    let beta  = norm.beta.val().reshape([1, channels, 1]);

    (x - mean) / (var + norm.epsilon).sqrt() * gamma + beta
}

/// Zero-pad the length axis so a stride-1 convolution keeps the length.
/// Odd remainders go on the right.
fn pad_same<B: Backend>(x: Tensor<B, 3>, kernel: usize) -> Tensor<B, 3> {
    let total = kernel.saturating_sub(1);
    if total == 0 {
        return x;
    }
    let left  = total / 2;
    let right = total - left;
    let [batch, channels, _] = x.dims();
    let device = x.device();

    let mut parts = Vec::with_capacity(3);
    if left > 0 {
        parts.push(Tensor::zeros([batch, channels, left], &device));
    }
    parts.push(x);
    parts.push(Tensor::zeros([batch, channels, right], &device));
    Tensor::cat(parts, 2)
}
