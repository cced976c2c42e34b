use common::config::TradingMode;

use crate::prompt::templates;

/// Numeric guard rails for one mode. The gate enforces these regardless of
/// what the prompt text tells the model.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub mode: TradingMode,
    pub max_leverage: u32,
    pub default_leverage: u32,
    /// Fraction of available margin never committed to new entries.
    pub cash_buffer: f64,
    pub max_positions: usize,
    pub min_confidence: f64,
    /// Default margin share (percent of usable margin) when the model gives no size.
    pub default_size_percent: f64,
    pub prompt_template: &'static str,
    pub description: &'static str,
}

impl RiskConfig {
    pub fn for_mode(mode: TradingMode) -> Self {
        let prompt_template = templates::system_prompt(mode);
        match mode {
            TradingMode::Baseline => Self {
                mode,
                max_leverage: 20,
                default_leverage: 10,
                cash_buffer: 0.30,
                max_positions: 6,
                min_confidence: 0.60,
                default_size_percent: 10.0,
                prompt_template,
                description: "Standard arena rules",
            },
            TradingMode::Conservative => Self {
                mode,
                max_leverage: 10,
                default_leverage: 5,
                cash_buffer: 0.40,
                max_positions: 3,
                min_confidence: 0.80,
                default_size_percent: 5.0,
                prompt_template,
                description: "Capital preservation",
            },
            TradingMode::Aggressive => Self {
                mode,
                max_leverage: 20,
                default_leverage: 20,
                cash_buffer: 0.20,
                max_positions: 4,
                min_confidence: 0.65,
                default_size_percent: 5.0,
                prompt_template,
                description: "Maximum leverage, tight stops",
            },
            TradingMode::Competitive => Self {
                mode,
                max_leverage: 20,
                default_leverage: 15,
                cash_buffer: 0.25,
                max_positions: 5,
                min_confidence: 0.65,
                default_size_percent: 10.0,
                prompt_template,
                description: "Ranking-aware risk",
            },
        }
    }

    /// Requested leverage capped into `[1, max_leverage]`; missing or
    /// non-finite requests use the mode default.
    pub fn clamp_leverage(&self, requested: Option<f64>) -> u32 {
        let requested = match requested {
            Some(l) if l.is_finite() => l.round(),
            _ => self.default_leverage as f64,
        };
        requested.clamp(1.0, self.max_leverage.max(1) as f64) as u32
    }

    /// Margin the account may commit while keeping the cash buffer intact.
    pub fn usable_margin(&self, available: f64) -> f64 {
        (available * (1.0 - self.cash_buffer)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_table_matches_catalog() {
        let monk = RiskConfig::for_mode(TradingMode::Conservative);
        assert_eq!(monk.max_leverage, 10);
        assert_eq!(monk.max_positions, 3);
        assert_eq!(monk.min_confidence, 0.80);
        assert_eq!(monk.cash_buffer, 0.40);

        let baseline = RiskConfig::for_mode(TradingMode::Baseline);
        assert_eq!(baseline.max_positions, 6);
        assert!(baseline.prompt_template.contains("STRICT RULES"));
    }

    #[test]
    fn leverage_is_capped_not_rejected() {
        let cfg = RiskConfig::for_mode(TradingMode::Conservative);
        assert_eq!(cfg.clamp_leverage(Some(50.0)), 10);
        assert_eq!(cfg.clamp_leverage(Some(0.0)), 1);
        assert_eq!(cfg.clamp_leverage(Some(-3.0)), 1);
        assert_eq!(cfg.clamp_leverage(Some(7.4)), 7);
        assert_eq!(cfg.clamp_leverage(None), 5);
        assert_eq!(cfg.clamp_leverage(Some(f64::NAN)), 5);
    }

    #[test]
    fn usable_margin_keeps_buffer() {
        let cfg = RiskConfig::for_mode(TradingMode::Baseline);
        assert!((cfg.usable_margin(1_000.0) - 700.0).abs() < 1e-9);
        assert_eq!(cfg.usable_margin(-5.0), 0.0);
    }
}
