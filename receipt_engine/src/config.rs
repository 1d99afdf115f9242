use std::{env, fmt::Display, time::Duration};

use chrono::Duration as ChronoDuration;
use log::*;

const DEFAULT_AMOUNT_TOLERANCE_MINOR: i64 = 1;
const DEFAULT_AMOUNT_TOLERANCE_PCT: f64 = 1.0;
const DEFAULT_DATE_GRACE_HOURS: i64 = 24;
const DEFAULT_OCR_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_OCR_RETRIES: u32 = 2;
const DEFAULT_OCR_BASE_DELAY_MS: u64 = 500;
const DEFAULT_OCR_MAX_DELAY_MS: u64 = 4_000;
const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.40;
const DEFAULT_MIN_IMAGE_EDGE: u32 = 120;
const DEFAULT_MAX_IMAGE_EDGE: u32 = 2_200;
const DEFAULT_ANCHOR_KEYWORDS: &str = "сумма,итого,оплата,amount,total,paid";

/// Tunables for the verification pipeline. Values come from `RVE_*` environment variables, with
/// logged fallbacks to defaults. The tolerance, anchor and retry values are meant to be tuned
/// against real receipt samples.
#[derive(Clone, Debug)]
pub struct VerifyConfig {
    /// Absolute amount tolerance in minor currency units.
    pub amount_tolerance_minor: i64,
    /// Relative amount tolerance, in percent of the expected amount. The larger of the two
    /// tolerances applies.
    pub amount_tolerance_pct: f64,
    /// Grace period added to the order validity window when checking a parsed payment date.
    pub date_grace: ChronoDuration,
    /// Per-attempt timeout for the OCR collaborator.
    pub ocr_timeout: Duration,
    /// Retries after the initial OCR attempt, on transient failure only.
    pub ocr_retries: u32,
    pub ocr_base_delay_ms: u64,
    pub ocr_max_delay_ms: u64,
    /// Lines recognized below this confidence are flagged, not dropped.
    pub confidence_floor: f32,
    /// Images with a shorter edge below this are rejected as unreadable.
    pub min_image_edge: u32,
    /// Images with a longer edge above this are downscaled to bound OCR cost.
    pub max_image_edge: u32,
    /// Localized keywords that anchor the amount field ("сумма", "итого", ...).
    pub anchor_keywords: Vec<String>,
    /// Merchant requisites expected to appear on genuine receipts.
    pub merchant_aliases: Vec<String>,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            amount_tolerance_minor: DEFAULT_AMOUNT_TOLERANCE_MINOR,
            amount_tolerance_pct: DEFAULT_AMOUNT_TOLERANCE_PCT,
            date_grace: ChronoDuration::hours(DEFAULT_DATE_GRACE_HOURS),
            ocr_timeout: Duration::from_millis(DEFAULT_OCR_TIMEOUT_MS),
            ocr_retries: DEFAULT_OCR_RETRIES,
            ocr_base_delay_ms: DEFAULT_OCR_BASE_DELAY_MS,
            ocr_max_delay_ms: DEFAULT_OCR_MAX_DELAY_MS,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            min_image_edge: DEFAULT_MIN_IMAGE_EDGE,
            max_image_edge: DEFAULT_MAX_IMAGE_EDGE,
            anchor_keywords: split_list(DEFAULT_ANCHOR_KEYWORDS),
            merchant_aliases: Vec::new(),
        }
    }
}

impl VerifyConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        Self {
            amount_tolerance_minor: env_parsed("RVE_AMOUNT_TOLERANCE_MINOR", defaults.amount_tolerance_minor),
            amount_tolerance_pct: env_parsed("RVE_AMOUNT_TOLERANCE_PCT", defaults.amount_tolerance_pct),
            date_grace: ChronoDuration::hours(env_parsed("RVE_DATE_GRACE_HOURS", DEFAULT_DATE_GRACE_HOURS)),
            ocr_timeout: Duration::from_millis(env_parsed("RVE_OCR_TIMEOUT_MS", DEFAULT_OCR_TIMEOUT_MS)),
            ocr_retries: env_parsed("RVE_OCR_RETRIES", defaults.ocr_retries),
            ocr_base_delay_ms: env_parsed("RVE_OCR_BASE_DELAY_MS", defaults.ocr_base_delay_ms),
            ocr_max_delay_ms: env_parsed("RVE_OCR_MAX_DELAY_MS", defaults.ocr_max_delay_ms),
            confidence_floor: env_parsed("RVE_CONFIDENCE_FLOOR", defaults.confidence_floor),
            min_image_edge: env_parsed("RVE_MIN_IMAGE_EDGE", defaults.min_image_edge),
            max_image_edge: env_parsed("RVE_MAX_IMAGE_EDGE", defaults.max_image_edge),
            anchor_keywords: env_list("RVE_ANCHOR_KEYWORDS").unwrap_or(defaults.anchor_keywords),
            merchant_aliases: env_list("RVE_MERCHANT_ALIASES").unwrap_or(defaults.merchant_aliases),
        }
    }
}

fn env_parsed<T: std::str::FromStr + Display + Copy>(var: &str, default: T) -> T
where <T as std::str::FromStr>::Err: Display {
    match env::var(var) {
        Ok(s) => s.parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {var}. {e}. Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}

fn env_list(var: &str) -> Option<Vec<String>> {
    env::var(var).ok().map(|s| split_list(&s))
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(|w| w.trim().to_lowercase()).filter(|w| !w.is_empty()).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = VerifyConfig::default();
        assert_eq!(cfg.amount_tolerance_minor, 1);
        assert!((cfg.amount_tolerance_pct - 1.0).abs() < f64::EPSILON);
        assert_eq!(cfg.ocr_retries, 2);
        assert!(cfg.min_image_edge < cfg.max_image_edge);
        assert!(cfg.anchor_keywords.contains(&"сумма".to_string()));
        assert!(cfg.anchor_keywords.contains(&"amount".to_string()));
    }

    #[test]
    fn list_splitting_trims_and_lowercases() {
        let words = split_list(" Итого , PAID ,,total ");
        assert_eq!(words, vec!["итого", "paid", "total"]);
    }
}
