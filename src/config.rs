use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub patterns: PatternConfig,
    #[serde(default)]
    pub severity: SeverityConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_true() -> bool {
    true
}

// ============================================================
// Detector Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default = "default_alert_capacity")]
    pub alert_capacity: usize,
    /// Trailing window the context is built over.
    #[serde(default = "default_window_ms")]
    pub window_ms: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            alert_capacity: default_alert_capacity(),
            window_ms: default_window_ms(),
        }
    }
}

fn default_event_capacity() -> usize {
    1000
}

fn default_alert_capacity() -> usize {
    100
}

fn default_window_ms() -> i64 {
    5 * 60 * 1000
}

// ============================================================
// Pattern Config
// ============================================================

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PatternConfig {
    #[serde(default)]
    pub rapid_burst: RapidBurstConfig,
    #[serde(default)]
    pub fee_spike: FeeSpikeConfig,
    #[serde(default)]
    pub high_error_rate: ErrorRateConfig,
    #[serde(default)]
    pub large_transfer: LargeTransferConfig,
    #[serde(default)]
    pub volume_surge: VolumeSurgeConfig,
    #[serde(default)]
    pub account_drain: AccountDrainConfig,
    #[serde(default)]
    pub block_delay: BlockDelayConfig,
    #[serde(default)]
    pub round_amount: RoundAmountConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RapidBurstConfig {
    /// Flag when a sender has more than this many transactions in the window.
    #[serde(default = "default_burst_threshold")]
    pub threshold: usize,
    #[serde(default = "default_burst_window")]
    pub window_ms: i64,
}

impl Default for RapidBurstConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            window_ms: 60_000,
        }
    }
}

fn default_burst_threshold() -> usize {
    10
}

fn default_burst_window() -> i64 {
    60_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeeSpikeConfig {
    #[serde(default = "default_fee_multiplier")]
    pub multiplier: f64,
}

impl Default for FeeSpikeConfig {
    fn default() -> Self {
        Self { multiplier: 5.0 }
    }
}

fn default_fee_multiplier() -> f64 {
    5.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct ErrorRateConfig {
    #[serde(default = "default_error_rate_threshold")]
    pub threshold: f64,
    #[serde(default = "default_min_transactions")]
    pub min_transactions: usize,
}

impl Default for ErrorRateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_transactions: 5,
        }
    }
}

fn default_error_rate_threshold() -> f64 {
    0.3
}

fn default_min_transactions() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LargeTransferConfig {
    #[serde(default = "default_large_transfer")]
    pub threshold: f64,
}

impl Default for LargeTransferConfig {
    fn default() -> Self {
        Self {
            threshold: 1_000_000.0,
        }
    }
}

fn default_large_transfer() -> f64 {
    1_000_000.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct VolumeSurgeConfig {
    #[serde(default = "default_volume_threshold")]
    pub threshold: usize,
}

impl Default for VolumeSurgeConfig {
    fn default() -> Self {
        Self { threshold: 500 }
    }
}

fn default_volume_threshold() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountDrainConfig {
    /// Fraction of the previous balance that must disappear in one change.
    #[serde(default = "default_drop_ratio")]
    pub drop_ratio: f64,
}

impl Default for AccountDrainConfig {
    fn default() -> Self {
        Self { drop_ratio: 0.9 }
    }
}

fn default_drop_ratio() -> f64 {
    0.9
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlockDelayConfig {
    #[serde(default = "default_block_delay")]
    pub threshold_ms: i64,
}

impl Default for BlockDelayConfig {
    fn default() -> Self {
        Self {
            threshold_ms: 30_000,
        }
    }
}

fn default_block_delay() -> i64 {
    30_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoundAmountConfig {
    #[serde(default = "default_round_unit")]
    pub unit: f64,
    #[serde(default = "default_round_min")]
    pub min_amount: f64,
}

impl Default for RoundAmountConfig {
    fn default() -> Self {
        Self {
            unit: 1000.0,
            min_amount: 10_000.0,
        }
    }
}

fn default_round_unit() -> f64 {
    1000.0
}

fn default_round_min() -> f64 {
    10_000.0
}

// ============================================================
// Severity Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct SeverityConfig {
    /// Error-class alerts escalate to critical above this window error rate.
    #[serde(default = "default_critical_error_rate")]
    pub critical_error_rate: f64,
    /// Alerts with confidence below this are capped at medium.
    #[serde(default = "default_low_confidence")]
    pub low_confidence_cutoff: f64,
    /// Value-class alerts escalate to high at threshold x multiplier.
    #[serde(default = "default_value_escalation")]
    pub value_escalation_multiplier: f64,
}

impl Default for SeverityConfig {
    fn default() -> Self {
        Self {
            critical_error_rate: default_critical_error_rate(),
            low_confidence_cutoff: default_low_confidence(),
            value_escalation_multiplier: default_value_escalation(),
        }
    }
}

fn default_critical_error_rate() -> f64 {
    0.5
}

fn default_low_confidence() -> f64 {
    0.5
}

fn default_value_escalation() -> f64 {
    10.0
}

// ============================================================
// Scheduler Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            task_timeout_ms: default_task_timeout_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_batch_size() -> usize {
    10
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_health_check_interval_ms() -> u64 {
    10_000
}

fn default_ping_timeout_ms() -> u64 {
    2_000
}

// ============================================================
// Broadcast / API / Logging Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

fn default_api_port() -> u16 {
    3000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// False for zero, negatives and NaN.
fn positive(value: f64) -> bool {
    value > 0.0
}

impl PatternConfig {
    fn validate(&self) -> eyre::Result<()> {
        if self.rapid_burst.window_ms <= 0 {
            return Err(eyre::eyre!("rapid_burst window_ms must be positive"));
        }
        if !positive(self.fee_spike.multiplier) {
            return Err(eyre::eyre!(
                "fee_spike multiplier must be positive, got {}",
                self.fee_spike.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.high_error_rate.threshold) {
            return Err(eyre::eyre!(
                "high_error_rate threshold {} must be within [0, 1]",
                self.high_error_rate.threshold
            ));
        }
        if !positive(self.large_transfer.threshold) {
            return Err(eyre::eyre!("large_transfer threshold must be positive"));
        }
        let ratio = self.account_drain.drop_ratio;
        if !positive(ratio) || ratio > 1.0 {
            return Err(eyre::eyre!("account_drain drop_ratio {} must be within (0, 1]", ratio));
        }
        if self.block_delay.threshold_ms < 0 {
            return Err(eyre::eyre!("block_delay threshold_ms must not be negative"));
        }
        if !positive(self.round_amount.unit) {
            return Err(eyre::eyre!(
                "round_amount unit must be positive, got {}",
                self.round_amount.unit
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config = Self::parse(&content)
            .map_err(|e| eyre::eyre!("Invalid config file '{}': {}", path, e))?;
        Ok(config)
    }

    pub fn parse(content: &str) -> eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.detector.event_capacity == 0 || self.detector.alert_capacity == 0 {
            return Err(eyre::eyre!("Store capacities must be greater than zero"));
        }
        if self.detector.window_ms <= 0 {
            return Err(eyre::eyre!("Detector window_ms must be positive"));
        }
        if self.scheduler.queue_capacity == 0 {
            return Err(eyre::eyre!("Scheduler queue_capacity must be greater than zero"));
        }
        if self.scheduler.batch_size == 0 {
            return Err(eyre::eyre!("Scheduler batch_size must be greater than zero"));
        }
        if self.scheduler.ping_timeout_ms >= self.scheduler.health_check_interval_ms {
            return Err(eyre::eyre!(
                "ping_timeout_ms ({}) must be smaller than health_check_interval_ms ({})",
                self.scheduler.ping_timeout_ms,
                self.scheduler.health_check_interval_ms
            ));
        }
        self.patterns.validate()?;
        let cutoff = self.severity.low_confidence_cutoff;
        if !(0.0..=1.0).contains(&cutoff) {
            return Err(eyre::eyre!(
                "low_confidence_cutoff {} must be within [0, 1]",
                cutoff
            ));
        }
        Ok(())
    }
}
