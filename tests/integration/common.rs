use entity::sea_orm_active_enums::CreditPayType;
use membership_credit::{
    config::Config, models::credit::CreditPayIntent, services::Services,
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use uuid::Uuid;

/// Free tier: 1000 credit, no add-on. Pro tier: 5000 credit, add-on packs of 2000.
pub const TEST_CONFIG: &str = r#"
server:
  host: 127.0.0.1
  port: 0
database:
  url: "sqlite::memory:"
redis:
  url: "redis://127.0.0.1:6379/"
ledger:
  max_retries: 5
payment:
  confirm_window_secs: 3600
jobs:
  credit_pay_confirm_expired:
    spec: "0 */5 * * * *"
    lock_key: "test:jobs:confirm"
    lock_expiry_secs: 60
    batch_size: 10
  membership_expired:
    spec: "0 */10 * * * *"
    lock_key: "test:jobs:membership"
    lock_expiry_secs: 60
    batch_size: 10
  order_processing:
    spec: "30 */5 * * * *"
    lock_key: "test:jobs:orders"
    lock_expiry_secs: 60
    batch_size: 10
membership:
  free:
    name: Free
    is_free: true
    base:
      sub_info:
        name: Free monthly
        price: 0
        currency: usd
        credit: 1000
        duration_months: 1
      is_enable_add_on_credit: false
    docs:
      max_storage_capacity: 100
      doc_upload_max_size_mb: 10
      doc_upload_max_page_count: 50
    note:
      is_summary: true
      is_word: false
    ai:
      copilot:
        is_enable: true
        models:
          - key: basic
            name: Basic
            is_enable: true
            is_free: true
          - key: advanced
            name: Advanced
            is_enable: true
            credit_cost: 300
    translate:
      is_ocr: true
      ocr_credit_cost: 200
  professional:
    name: Professional
    is_free: false
    base:
      sub_info:
        name: Professional monthly
        price: 999
        currency: usd
        credit: 5000
        duration_months: 1
        stripe_pay_mode: subscription
        stripe_price_id: price_pro
      is_enable_add_on_credit: true
      is_enable_sub_add_on_credit: true
      max_add_on_credit_sub_count_of_month: 2
      sub_add_on_credit_info:
        name: Add-on pack
        price: 499
        currency: usd
        credit: 0
        add_on_credit: 2000
        duration_months: 1
    docs:
      max_storage_capacity: 1000
      doc_upload_max_size_mb: 100
      doc_upload_max_page_count: 500
    note:
      is_summary: true
      is_word: true
    ai:
      copilot:
        is_enable: true
        models:
          - key: advanced
            name: Advanced
            is_enable: true
            credit_cost: 300
    translate:
      is_ocr: true
      ocr_credit_cost: 100
"#;

pub fn test_config() -> Config {
    config::Config::builder()
        .add_source(config::File::from_str(TEST_CONFIG, config::FileFormat::Yaml))
        .build()
        .expect("Failed to build test config")
        .try_deserialize()
        .expect("Failed to deserialize test config")
}

/// One in-memory SQLite connection; a second connection would see an empty database
pub async fn setup_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options)
        .await
        .expect("Failed to connect to test database");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");
    db
}

pub struct TestContext {
    pub db: DatabaseConnection,
    pub config: Config,
    pub services: Services,
}

pub async fn setup() -> TestContext {
    let db = setup_test_db().await;
    let config = test_config();
    let services = Services::build(db.clone(), &config).await;
    TestContext {
        db,
        config,
        services,
    }
}

impl TestContext {
    /// A bare membership (no subscription order) funded through the ledger.
    /// Returns `(user_id, membership_id)`.
    pub async fn funded_member(&self, credit: i64, add_on_credit: i64) -> (Uuid, Uuid) {
        let user_id = Uuid::new_v4();
        let membership = self
            .services
            .user_membership
            .new_account(user_id)
            .await
            .expect("Failed to create membership");

        if credit > 0 {
            self.services
                .credit
                .grant_subscription(
                    user_id,
                    membership.id,
                    &CreditPayIntent::new(CreditPayType::SubFree).with_credit(credit),
                )
                .await
                .expect("Failed to grant credit");
        }
        if add_on_credit > 0 {
            self.services
                .credit
                .grant_add_on(
                    user_id,
                    membership.id,
                    &CreditPayIntent::new(CreditPayType::SubProAddOnCredit)
                        .with_add_on_credit(add_on_credit),
                )
                .await
                .expect("Failed to grant add-on credit");
        }

        (user_id, membership.id)
    }

    pub async fn balances(&self, membership_id: Uuid) -> (i64, i64) {
        let account = self
            .services
            .credit
            .get_by_membership_id(membership_id)
            .await
            .expect("Failed to load credit account");
        (account.credit, account.add_on_credit)
    }

    pub async fn bill_count(&self, membership_id: Uuid) -> usize {
        self.services
            .credit
            .list_bills(membership_id)
            .await
            .expect("Failed to list bills")
            .len()
    }

    pub async fn assert_ledger_consistent(&self, membership_id: Uuid) {
        let audit = self
            .services
            .credit
            .audit(membership_id)
            .await
            .expect("Failed to audit ledger");
        assert!(audit.is_consistent(), "ledger replay mismatch: {:?}", audit);
    }
}
