use crate::{
    config::MembershipTypeConfig,
    error::{ApiError, FeatureDenial, Result},
    models::credit::CreditPayIntent,
};
use entity::sea_orm_active_enums::CreditServiceType;

const MB: u64 = 1_048_576;

/// What using a feature costs, once it is known to be permitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureCharge {
    pub needs_pay: bool,
    pub intent: CreditPayIntent,
}

impl FeatureCharge {
    pub fn free(service_type: CreditServiceType) -> Self {
        Self {
            needs_pay: false,
            intent: CreditPayIntent::service_cost(service_type, 0),
        }
    }

    pub fn charge(service_type: CreditServiceType, credit: i64) -> Self {
        Self {
            needs_pay: true,
            intent: CreditPayIntent::service_cost(service_type, credit),
        }
    }
}

/// Permission and price of one feature for a membership tier.
///
/// A denial is returned as an error.
pub trait CreditFeature: Send + Sync + std::fmt::Debug {
    fn service_type(&self) -> CreditServiceType;

    fn resolve(&self, config: &MembershipTypeConfig) -> Result<FeatureCharge>;
}

fn deny(denial: FeatureDenial) -> ApiError {
    ApiError::FeatureDenied(denial)
}

#[derive(Debug, Clone)]
pub struct DocsUploadCost {
    pub file_size_bytes: u64,
    pub page_count: u32,
    /// Storage already used by the member
    pub used_storage_bytes: u64,
}

impl CreditFeature for DocsUploadCost {
    fn service_type(&self) -> CreditServiceType {
        CreditServiceType::DocsUpload
    }

    fn resolve(&self, config: &MembershipTypeConfig) -> Result<FeatureCharge> {
        let docs = &config.docs;
        if docs.doc_upload_max_size_mb == 0 {
            return Err(ApiError::PermissionDenied(format!(
                "document upload is not available for {}",
                config.name
            )));
        }
        if self.file_size_bytes > docs.doc_upload_max_size_mb * MB {
            return Err(deny(FeatureDenial::DocsUploadSizeExceeded));
        }
        if self.page_count > docs.doc_upload_max_page_count {
            return Err(deny(FeatureDenial::DocsUploadPageCountExceeded));
        }
        let after_upload = self.used_storage_bytes.saturating_add(self.file_size_bytes);
        if after_upload > docs.max_storage_capacity * MB {
            return Err(deny(FeatureDenial::DocsStorageCapacityExceeded));
        }
        Ok(FeatureCharge::free(self.service_type()))
    }
}

#[derive(Debug, Clone)]
pub struct AiCopilotCost {
    pub model_key: String,
}

impl CreditFeature for AiCopilotCost {
    fn service_type(&self) -> CreditServiceType {
        CreditServiceType::AiCopilot
    }

    fn resolve(&self, config: &MembershipTypeConfig) -> Result<FeatureCharge> {
        let copilot = &config.ai.copilot;
        if !copilot.is_enable {
            return Err(deny(FeatureDenial::CopilotNotEnabled));
        }
        let model = copilot
            .models
            .iter()
            .find(|m| m.key == self.model_key)
            .ok_or_else(|| deny(FeatureDenial::CopilotModelNotFound))?;
        if !model.is_enable {
            return Err(deny(FeatureDenial::CopilotModelNotEnabled));
        }

        if model.is_free {
            Ok(FeatureCharge::free(self.service_type()))
        } else {
            Ok(FeatureCharge::charge(self.service_type(), model.credit_cost))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslateKind {
    Ocr,
    Word,
    FullText { page_count: u32 },
    Ai,
}

#[derive(Debug, Clone)]
pub struct TranslateCost {
    pub kind: TranslateKind,
}

impl CreditFeature for TranslateCost {
    fn service_type(&self) -> CreditServiceType {
        CreditServiceType::Translate
    }

    fn resolve(&self, config: &MembershipTypeConfig) -> Result<FeatureCharge> {
        let t = &config.translate;
        let cost = match self.kind {
            TranslateKind::Ocr => {
                if !t.is_ocr {
                    return Err(deny(FeatureDenial::OcrNotEnabled));
                }
                t.ocr_credit_cost
            }
            TranslateKind::Word => {
                if !t.is_word_translate {
                    return Err(deny(FeatureDenial::WordTranslateNotEnabled));
                }
                t.word_translate_credit_cost
            }
            TranslateKind::FullText { page_count } => {
                if !t.is_full_text_translate {
                    return Err(deny(FeatureDenial::FullTextTranslateNotEnabled));
                }
                if page_count > t.full_text_translate_max_page_count {
                    return Err(deny(FeatureDenial::FullTextTranslatePageCountExceeded));
                }
                t.full_text_translate_credit_cost
            }
            TranslateKind::Ai => {
                if !t.is_ai_translation {
                    return Err(deny(FeatureDenial::AiTranslationNotEnabled));
                }
                t.ai_translation_credit_cost
            }
        };
        Ok(FeatureCharge::charge(self.service_type(), cost))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    Summary,
    Word,
    Extract,
    Manage,
    PdfDownload,
}

#[derive(Debug, Clone)]
pub struct NoteCost {
    pub kind: NoteKind,
}

impl CreditFeature for NoteCost {
    fn service_type(&self) -> CreditServiceType {
        CreditServiceType::Note
    }

    fn resolve(&self, config: &MembershipTypeConfig) -> Result<FeatureCharge> {
        let note = &config.note;
        let (enabled, denial) = match self.kind {
            NoteKind::Summary => (note.is_summary, FeatureDenial::NoteSummaryNotEnabled),
            NoteKind::Word => (note.is_word, FeatureDenial::NoteWordNotEnabled),
            NoteKind::Extract => (note.is_extract, FeatureDenial::NoteExtractNotEnabled),
            NoteKind::Manage => (note.is_manage, FeatureDenial::NoteManageNotEnabled),
            NoteKind::PdfDownload => (note.is_pdf_download, FeatureDenial::NotePdfDownloadNotEnabled),
        };
        if !enabled {
            return Err(deny(denial));
        }
        Ok(FeatureCharge::free(self.service_type()))
    }
}
