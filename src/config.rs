use entity::sea_orm_active_enums::{MembershipType, OrderType};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    pub jobs: JobsConfig,
    pub membership: MembershipConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Attempts after the first when a balance write loses the version race
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "default_confirm_window_secs")]
    pub confirm_window_secs: i64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            confirm_window_secs: default_confirm_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    pub credit_pay_confirm_expired: JobConfig,
    pub membership_expired: JobConfig,
    pub order_processing: JobConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Six-field cron expression (seconds first)
    pub spec: String,
    pub lock_key: String,
    pub lock_expiry_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Membership sweep only: restrict the scan to one type, every type when unset
    #[serde(default)]
    pub membership_type: Option<MembershipType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipConfig {
    pub free: MembershipTypeConfig,
    pub professional: MembershipTypeConfig,
}

impl MembershipConfig {
    pub fn type_config(&self, membership_type: MembershipType) -> &MembershipTypeConfig {
        match membership_type {
            MembershipType::Free => &self.free,
            MembershipType::Professional => &self.professional,
        }
    }

    /// Plan sold by an order type, if one is configured
    pub fn sub_info(&self, order_type: OrderType) -> Option<&SubInfo> {
        match order_type {
            OrderType::SubFree => Some(&self.free.base.sub_info),
            OrderType::SubPro => Some(&self.professional.base.sub_info),
            OrderType::SubProAddOnCredit => self.professional.base.sub_add_on_credit_info.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MembershipTypeConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub is_free: bool,
    pub base: BaseConfig,
    pub docs: DocsConfig,
    pub note: NoteConfig,
    pub ai: AiConfig,
    pub translate: TranslateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseConfig {
    pub sub_info: SubInfo,
    #[serde(default)]
    pub is_enable_add_on_credit: bool,
    #[serde(default)]
    pub is_enable_sub_add_on_credit: bool,
    #[serde(default)]
    pub max_add_on_credit_sub_count_of_month: u64,
    #[serde(default)]
    pub sub_add_on_credit_info: Option<SubInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubInfo {
    pub name: String,
    /// Minor currency units
    pub price: i64,
    pub currency: String,
    pub credit: i64,
    #[serde(default)]
    pub add_on_credit: i64,
    pub duration_months: i64,
    #[serde(default)]
    pub stripe_pay_mode: String,
    #[serde(default)]
    pub stripe_price_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocsConfig {
    /// Megabytes, like the upload limit
    pub max_storage_capacity: u64,
    pub doc_upload_max_size_mb: u64,
    pub doc_upload_max_page_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NoteConfig {
    #[serde(default)]
    pub is_summary: bool,
    #[serde(default)]
    pub is_word: bool,
    #[serde(default)]
    pub is_extract: bool,
    #[serde(default)]
    pub is_manage: bool,
    #[serde(default)]
    pub is_pdf_download: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub copilot: CopilotConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CopilotConfig {
    #[serde(default)]
    pub is_enable: bool,
    #[serde(default)]
    pub models: Vec<CopilotModelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CopilotModelConfig {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub is_enable: bool,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default)]
    pub credit_cost: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranslateConfig {
    #[serde(default)]
    pub is_ocr: bool,
    #[serde(default)]
    pub ocr_credit_cost: i64,
    #[serde(default)]
    pub is_word_translate: bool,
    #[serde(default)]
    pub word_translate_credit_cost: i64,
    #[serde(default)]
    pub is_full_text_translate: bool,
    #[serde(default)]
    pub full_text_translate_credit_cost: i64,
    #[serde(default)]
    pub full_text_translate_max_page_count: u32,
    #[serde(default)]
    pub is_ai_translation: bool,
    #[serde(default)]
    pub ai_translation_credit_cost: i64,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_confirm_window_secs() -> i64 {
    3600
}

fn default_batch_size() -> u64 {
    10
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(
                config::Environment::with_prefix("MEMBERSHIP_CREDIT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
