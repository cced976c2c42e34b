use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use crate::{error::ConfigError, symbols::SymbolUniverse};

pub const DEFAULT_FUTURES_URL: &str = "https://testnet.binancefuture.com";
pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_LLM_MODEL: &str = "deepseek/deepseek-chat";
pub const DEFAULT_CHAT_MODEL: &str = "deepseek/deepseek-chat";

const DEFAULT_LOOP_INTERVAL_SECS: u64 = 180;
const DEFAULT_PAUSE_COOLDOWN_SECS: u64 = 3600;
const DEFAULT_DAILY_LOSS_LIMIT: f64 = 0.05;
const DEFAULT_STARTING_BALANCE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradingMode {
    Baseline,
    Conservative,
    Aggressive,
    Competitive,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Conservative => "conservative",
            Self::Aggressive => "aggressive",
            Self::Competitive => "competitive",
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "baseline" | "standard" => Ok(Self::Baseline),
            "conservative" | "monk_mode" | "monk" => Ok(Self::Conservative),
            "aggressive" | "max_leverage" => Ok(Self::Aggressive),
            "competitive" | "situational" => Ok(Self::Competitive),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// Reference equity the daily-loss breaker measures drift against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartingBalance {
    Fixed(f64),
    /// Captured from live account equity at boot.
    LiveEquity,
}

/// Leaderboard context rendered into the competitive prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct CompetitionStanding {
    pub rank: String,
    pub leader_pnl: String,
    pub time_left: String,
}

impl Default for CompetitionStanding {
    fn default() -> Self {
        Self {
            rank: "n/a".to_string(),
            leader_pnl: "n/a".to_string(),
            time_left: "n/a".to_string(),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub secret_key: String,
    pub base_url: String,
}

impl fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeCredentials")
            .field("api_key", &"***")
            .field("secret_key", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone, PartialEq)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub decision_model: String,
    pub chat_model: String,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("decision_model", &self.decision_model)
            .field("chat_model", &self.chat_model)
            .finish()
    }
}

#[derive(Clone, PartialEq)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: i64,
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &"***")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Process configuration. Read once at startup, immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub exchange: ExchangeCredentials,
    pub llm: LlmSettings,
    pub telegram: Option<TelegramSettings>,
    pub universe: SymbolUniverse,
    pub mode: TradingMode,
    pub loop_interval: Duration,
    pub daily_loss_limit: f64,
    pub pause_cooldown: Duration,
    pub starting_balance: StartingBalance,
    pub standing: CompetitionStanding,
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let exchange = ExchangeCredentials {
            api_key: required("BINANCE_API_KEY")?,
            secret_key: required("BINANCE_SECRET_KEY")?,
            base_url: get("BINANCE_FUTURES_URL").unwrap_or_else(|| DEFAULT_FUTURES_URL.to_string()),
        };

        let llm = LlmSettings {
            api_key: required("OPENROUTER_API_KEY")?,
            base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            decision_model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            chat_model: get("LLM_CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
        };

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramSettings {
                bot_token,
                chat_id: parse_value("TELEGRAM_CHAT_ID", &chat_id)?,
            }),
            _ => None,
        };

        let universe = match get("TRADING_PAIRS") {
            Some(pairs) => {
                let universe = SymbolUniverse::parse(&pairs);
                if universe.is_empty() {
                    return Err(ConfigError::Invalid {
                        key: "TRADING_PAIRS",
                        value: pairs,
                        reason: "no symbols".to_string(),
                    });
                }
                universe
            }
            None => SymbolUniverse::default(),
        };

        let mode = match get("TRADING_MODE") {
            Some(mode) => mode.parse()?,
            None => TradingMode::Baseline,
        };

        let loop_interval = match get("LOOP_INTERVAL_SECS") {
            Some(v) => {
                let secs: u64 = parse_value("LOOP_INTERVAL_SECS", &v)?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        key: "LOOP_INTERVAL_SECS",
                        value: v,
                        reason: "must be at least 1 second".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_LOOP_INTERVAL_SECS),
        };

        let pause_cooldown = Duration::from_secs(
            get("PAUSE_COOLDOWN_SECS")
                .map(|v| parse_value::<u64>("PAUSE_COOLDOWN_SECS", &v))
                .transpose()?
                .unwrap_or(DEFAULT_PAUSE_COOLDOWN_SECS),
        );

        let daily_loss_limit = match get("DAILY_LOSS_LIMIT") {
            Some(v) => {
                let limit: f64 = parse_value("DAILY_LOSS_LIMIT", &v)?;
                if !(limit > 0.0 && limit < 1.0) {
                    return Err(ConfigError::Invalid {
                        key: "DAILY_LOSS_LIMIT",
                        value: v,
                        reason: "must be a fraction between 0 and 1".to_string(),
                    });
                }
                limit
            }
            None => DEFAULT_DAILY_LOSS_LIMIT,
        };

        let starting_balance = match get("STARTING_BALANCE") {
            Some(v) if v.eq_ignore_ascii_case("live") => StartingBalance::LiveEquity,
            Some(v) => {
                let balance: f64 = parse_value("STARTING_BALANCE", &v)?;
                if balance <= 0.0 {
                    return Err(ConfigError::Invalid {
                        key: "STARTING_BALANCE",
                        value: v,
                        reason: "must be positive".to_string(),
                    });
                }
                StartingBalance::Fixed(balance)
            }
            None => StartingBalance::Fixed(DEFAULT_STARTING_BALANCE),
        };

        let defaults = CompetitionStanding::default();
        let standing = CompetitionStanding {
            rank: get("COMPETITION_RANK").unwrap_or(defaults.rank),
            leader_pnl: get("COMPETITION_LEADER_PNL").unwrap_or(defaults.leader_pnl),
            time_left: get("COMPETITION_TIME_LEFT").unwrap_or(defaults.time_left),
        };

        Ok(Self {
            exchange,
            llm,
            telegram,
            universe,
            mode,
            loop_interval,
            daily_loss_limit,
            pause_cooldown,
            starting_balance,
            standing,
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
