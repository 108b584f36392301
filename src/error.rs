use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Broad failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    InsufficientBalance,
    IllegalState,
    /// Business rule or permission rejection
    Rejected,
    Infrastructure,
}

/// Feature-specific permission denials, codes 43xx to 46xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureDenial {
    DocsUploadSizeExceeded,
    DocsUploadPageCountExceeded,
    DocsStorageCapacityExceeded,
    CopilotNotEnabled,
    CopilotModelNotFound,
    CopilotModelNotEnabled,
    OcrNotEnabled,
    WordTranslateNotEnabled,
    FullTextTranslateNotEnabled,
    AiTranslationNotEnabled,
    FullTextTranslatePageCountExceeded,
    NoteSummaryNotEnabled,
    NoteWordNotEnabled,
    NoteExtractNotEnabled,
    NoteManageNotEnabled,
    NotePdfDownloadNotEnabled,
}

impl FeatureDenial {
    pub fn code(&self) -> u32 {
        match self {
            Self::DocsUploadSizeExceeded => 4301,
            Self::DocsUploadPageCountExceeded => 4302,
            Self::DocsStorageCapacityExceeded => 4303,
            Self::CopilotNotEnabled => 4401,
            Self::CopilotModelNotFound => 4402,
            Self::CopilotModelNotEnabled => 4403,
            Self::OcrNotEnabled => 4501,
            Self::WordTranslateNotEnabled => 4502,
            Self::FullTextTranslateNotEnabled => 4503,
            Self::AiTranslationNotEnabled => 4504,
            Self::FullTextTranslatePageCountExceeded => 4505,
            Self::NoteSummaryNotEnabled => 4601,
            Self::NoteWordNotEnabled => 4602,
            Self::NoteExtractNotEnabled => 4603,
            Self::NoteManageNotEnabled => 4604,
            Self::NotePdfDownloadNotEnabled => 4605,
        }
    }
}

impl std::fmt::Display for FeatureDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::DocsUploadSizeExceeded => "document exceeds the upload size limit",
            Self::DocsUploadPageCountExceeded => "document exceeds the page count limit",
            Self::DocsStorageCapacityExceeded => "storage capacity exceeded",
            Self::CopilotNotEnabled => "copilot is not enabled for this membership",
            Self::CopilotModelNotFound => "copilot model not found",
            Self::CopilotModelNotEnabled => "copilot model is not enabled for this membership",
            Self::OcrNotEnabled => "OCR is not enabled for this membership",
            Self::WordTranslateNotEnabled => "word translation is not enabled for this membership",
            Self::FullTextTranslateNotEnabled => {
                "full text translation is not enabled for this membership"
            }
            Self::AiTranslationNotEnabled => "AI translation is not enabled for this membership",
            Self::FullTextTranslatePageCountExceeded => {
                "document exceeds the full text translation page limit"
            }
            Self::NoteSummaryNotEnabled => "note summary is not enabled for this membership",
            Self::NoteWordNotEnabled => "note word export is not enabled for this membership",
            Self::NoteExtractNotEnabled => "note extraction is not enabled for this membership",
            Self::NoteManageNotEnabled => "note management is not enabled for this membership",
            Self::NotePdfDownloadNotEnabled => "PDF download is not enabled for this membership",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("User membership account not found: {0}")]
    UserAccountNotFound(String),

    #[error("User membership account already exists: {0}")]
    UserAccountAlreadyExists(String),

    #[error("User credit account not found: {0}")]
    UserCreditAccountNotFound(String),

    #[error("User credit account already exists: {0}")]
    UserCreditAccountAlreadyExists(String),

    #[error("Unknown credit bill type: {0}")]
    CreditBillTypeUnknown(String),

    #[error("Credit not enough: need {need}, have {have}")]
    CreditNotEnough { need: i64, have: i64 },

    #[error("Add-on credit not enough: need {need}, have {have}")]
    CreditAddOnNotEnough { need: i64, have: i64 },

    #[error("Membership has not expired: {0}")]
    AccountNotExpired(String),

    #[error("Subscription type not found: {0}")]
    SubscribeTypeNotFound(String),

    #[error("Can not subscribe free membership while the current one is valid")]
    CanNotSubscribeFree,

    #[error("Can not subscribe add-on credit: {0}")]
    CanNotSubscribeProAddOnCredit(String),

    #[error("Add-on credit subscriptions this month reached the limit of {0}")]
    OverMaxAddOnCreditSubCountOfMonth(u64),

    #[error("Credit payment record not found: {0}")]
    CreditPaymentRecordNotFound(String),

    #[error("Credit payment record {0} is not pending")]
    CreditPaymentRecordStatusNotPending(String),

    #[error("Credit payment record {0} is not awaiting confirmation")]
    CreditPaymentRecordStatusNotAwaitingConfirmation(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("No permission and cost capability supplied")]
    CheckPermissionAndPayConfigFunNoNull,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    FeatureDenied(FeatureDenial),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Stable numeric status for business failures; `None` for infrastructure errors.
    pub fn status_code(&self) -> Option<u32> {
        let code = match self {
            Self::UserAccountNotFound(_) => 4001,
            Self::UserAccountAlreadyExists(_) => 4002,
            Self::UserCreditAccountNotFound(_) => 4004,
            Self::UserCreditAccountAlreadyExists(_) => 4005,
            Self::CreditBillTypeUnknown(_) => 4006,
            Self::CreditNotEnough { .. } => 4007,
            Self::CreditAddOnNotEnough { .. } => 4008,
            Self::AccountNotExpired(_) => 4009,
            Self::SubscribeTypeNotFound(_) => 4101,
            Self::CanNotSubscribeFree => 4102,
            Self::CanNotSubscribeProAddOnCredit(_) => 4104,
            Self::OverMaxAddOnCreditSubCountOfMonth(_) => 4105,
            Self::CreditPaymentRecordNotFound(_) => 4106,
            Self::CreditPaymentRecordStatusNotPending(_) => 4107,
            Self::CreditPaymentRecordStatusNotAwaitingConfirmation(_) => 4108,
            Self::OrderNotFound(_) => 4109,
            Self::CheckPermissionAndPayConfigFunNoNull => 4201,
            Self::PermissionDenied(_) => 4202,
            Self::FeatureDenied(denial) => denial.code(),
            Self::ConcurrentModification(_) => 4901,
            Self::Database(_) | Self::Redis(_) | Self::BadRequest(_) | Self::Internal(_) => {
                return None
            }
        };
        Some(code)
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UserAccountNotFound(_)
            | Self::UserCreditAccountNotFound(_)
            | Self::CreditPaymentRecordNotFound(_)
            | Self::OrderNotFound(_)
            | Self::SubscribeTypeNotFound(_) => ErrorClass::NotFound,
            Self::CreditNotEnough { .. } | Self::CreditAddOnNotEnough { .. } => {
                ErrorClass::InsufficientBalance
            }
            Self::UserAccountAlreadyExists(_)
            | Self::UserCreditAccountAlreadyExists(_)
            | Self::CreditPaymentRecordStatusNotPending(_)
            | Self::CreditPaymentRecordStatusNotAwaitingConfirmation(_)
            | Self::AccountNotExpired(_)
            | Self::ConcurrentModification(_) => ErrorClass::IllegalState,
            Self::CreditBillTypeUnknown(_)
            | Self::CanNotSubscribeFree
            | Self::CanNotSubscribeProAddOnCredit(_)
            | Self::OverMaxAddOnCreditSubCountOfMonth(_)
            | Self::CheckPermissionAndPayConfigFunNoNull
            | Self::PermissionDenied(_)
            | Self::FeatureDenied(_)
            | Self::BadRequest(_) => ErrorClass::Rejected,
            Self::Database(_) | Self::Redis(_) | Self::Internal(_) => ErrorClass::Infrastructure,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.class() {
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
            ErrorClass::IllegalState => StatusCode::CONFLICT,
            ErrorClass::Rejected => match &self {
                ApiError::PermissionDenied(_) | ApiError::FeatureDenied(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::BAD_REQUEST,
            },
            ErrorClass::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let (code, message) = match (&self, self.status_code()) {
            (_, Some(code)) => (json!(code), self.to_string()),
            (ApiError::BadRequest(msg), None) => (json!("BAD_REQUEST"), msg.clone()),
            (ApiError::Database(e), None) => {
                tracing::error!("Database error: {:?}", e);
                (
                    json!("DATABASE_ERROR"),
                    "An internal database error occurred".to_string(),
                )
            }
            (e, None) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    json!("INTERNAL_ERROR"),
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "code": code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
