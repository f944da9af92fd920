// ============================================================
// Layer 5 — Reduce Learning Rate on Plateau
// ============================================================
// Watches the epoch training loss and halves the learning rate
// when it stops improving.
//
//   improved  ⇔  loss < best - min_delta
//
//   improved → best = loss, wait = 0
//   else     → wait += 1
//              wait >= patience → lr = max(lr * factor, min_lr)
//                                 wait = 0
//
// Defaults: factor 0.5, min_delta 5e-5, patience 10, min_lr 1e-10.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateauConfig {
    pub factor:    f64,
    pub min_delta: f64,
    pub patience:  usize,
    pub min_lr:    f64,
}

impl Default for PlateauConfig {
    fn default() -> Self {
        Self {
            factor:    0.5,
            min_delta: 0.00005,
            patience:  10,
            min_lr:    0.0000000001,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    config: PlateauConfig,
    lr:     f64,
    best:   f64,
    wait:   usize,
}

impl ReduceLrOnPlateau {
    pub fn new(initial_lr: f64, config: PlateauConfig) -> Self {
        Self { config, lr: initial_lr, best: f64::INFINITY, wait: 0 }
    }

    /// Current learning rate
    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Feed one epoch's monitored loss; returns the learning rate
    /// to use for the next epoch.
    pub fn step(&mut self, loss: f64) -> f64 {
        if loss < self.best - self.config.min_delta {
            self.best = loss;
            self.wait = 0;
            return self.lr;
        }

        self.wait += 1;
        if self.wait >= self.config.patience {
            if self.lr > self.config.min_lr {
                let new_lr = (self.lr * self.config.factor).max(self.config.min_lr);
                tracing::info!("Reducing learning rate {:.3e} → {:.3e}", self.lr, new_lr);
                self.lr = new_lr;
            }
            self.wait = 0;
        }
        self.lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(patience: usize) -> PlateauConfig {
        PlateauConfig { patience, ..PlateauConfig::default() }
    }

    #[test]
    fn test_improving_loss_keeps_lr() {
        let mut s = ReduceLrOnPlateau::new(0.005, cfg(2));
        for loss in [1.0, 0.9, 0.8, 0.7] {
            assert_eq!(s.step(loss), 0.005);
        }
    }

    #[test]
    fn test_plateau_halves_lr_after_patience() {
        let mut s = ReduceLrOnPlateau::new(0.004, cfg(2));
        s.step(1.0);
        assert_eq!(s.step(1.0), 0.004);
        assert_eq!(s.step(1.0), 0.002);
        // Counter restarts after a reduction
        assert_eq!(s.step(1.0), 0.002);
        assert_eq!(s.step(1.0), 0.001);
    }

    #[test]
    fn test_tiny_improvement_counts_as_plateau() {
        let mut s = ReduceLrOnPlateau::new(1.0, cfg(1));
        s.step(1.0);
        // 1e-5 better is within min_delta
        assert_eq!(s.step(0.99999), 0.5);
    }

    #[test]
    fn test_lr_never_drops_below_min() {
        let config = PlateauConfig { patience: 1, min_lr: 0.3, ..PlateauConfig::default() };
        let mut s  = ReduceLrOnPlateau::new(1.0, config);
        s.step(1.0);
        s.step(1.0);
        s.step(1.0);
        assert_eq!(s.lr(), 0.3);
    }
}
