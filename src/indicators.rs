use anyhow::{ensure, Result};

/// Window sizes and the division guard for the indicator columns. These
/// are deliberately parameters rather than literals so warm-up behavior
/// is testable per window.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorConfig {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_window: usize,
    /// Added to the loss mean before dividing, so an all-gain window
    /// (zero loss) yields a finite RS instead of a division by zero.
    pub rsi_epsilon: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_short: 10,
            sma_long: 20,
            rsi_window: 14,
            rsi_epsilon: 1e-6,
        }
    }
}

impl IndicatorConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.sma_short >= 1, "SMA short window must be >= 1");
        ensure!(self.sma_long >= 1, "SMA long window must be >= 1");
        ensure!(self.rsi_window >= 1, "RSI window must be >= 1");
        ensure!(
            self.rsi_epsilon.is_finite() && self.rsi_epsilon > 0.0,
            "RSI epsilon must be a positive finite number"
        );
        Ok(())
    }

    /// Index of the first row where every indicator column is defined.
    /// The RSI needs `rsi_window` deltas (one more bar than the window),
    /// the SMAs need their full window, the daily return needs one prior
    /// bar.
    pub fn warm_up_rows(&self) -> usize {
        (self.sma_short - 1)
            .max(self.sma_long - 1)
            .max(self.rsi_window)
            .max(1)
    }
}

/// Trailing simple moving average. `None` until `window` values exist.
pub fn rolling_sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    let mut out = vec![None; values.len()];
    let mut window_sum = 0.0f64;
    for i in 0..values.len() {
        window_sum += values[i];
        if i >= window {
            window_sum -= values[i - window];
        }
        if i + 1 >= window {
            out[i] = Some(window_sum / window as f64);
        }
    }
    out
}

/// Period-over-period simple returns. `None` at the first value and
/// wherever the prior value is zero.
pub fn simple_returns(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    for i in 1..values.len() {
        let prev = values[i - 1];
        if prev != 0.0 {
            out[i] = Some((values[i] - prev) / prev);
        }
    }
    out
}

/// RSI over the rolling mean of positive/negative deltas (not the Wilder
/// recursive smoothing): gain = mean(max(delta, 0)), loss =
/// mean(max(-delta, 0)), RS = gain / (loss + epsilon), RSI = 100 -
/// 100/(1+RS). Defined once `window` deltas exist, i.e. from index
/// `window` onward.
pub fn rolling_rsi(values: &[f64], window: usize, epsilon: f64) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window + 1 {
        return out;
    }

    let mut gain_sum = 0.0f64;
    let mut loss_sum = 0.0f64;
    for i in 1..values.len() {
        let delta = values[i] - values[i - 1];
        if delta > 0.0 {
            gain_sum += delta;
        } else {
            loss_sum += -delta;
        }

        if i > window {
            let dropped = values[i - window] - values[i - window - 1];
            if dropped > 0.0 {
                gain_sum -= dropped;
            } else {
                loss_sum -= -dropped;
            }
        }

        if i >= window {
            // Rolling-sum cancellation can leave a tiny negative residue.
            let avg_gain = (gain_sum / window as f64).max(0.0);
            let avg_loss = (loss_sum / window as f64).max(0.0);
            let rs = avg_gain / (avg_loss + epsilon);
            out[i] = Some(100.0 - 100.0 / (1.0 + rs));
        }
    }
    out
}
