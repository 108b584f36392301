use entity::{
    credit_bills,
    sea_orm_active_enums::{CreditInOutType, CreditPayType, CreditServiceType, CreditType},
};
use serde::Serialize;

/// A requested ledger mutation. Amounts carry two implied decimals.
///
/// `pay_type` selects the ledger operation and becomes the reason code on the
/// resulting bill. `credit_type` only matters for service debits and refunds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditPayIntent {
    pub pay_type: CreditPayType,
    pub credit_type: CreditType,
    pub service_type: CreditServiceType,
    pub credit: i64,
    pub add_on_credit: i64,
    pub content: String,
    pub remark: String,
}

impl CreditPayIntent {
    pub fn new(pay_type: CreditPayType) -> Self {
        Self {
            pay_type,
            credit_type: CreditType::Credit,
            service_type: CreditServiceType::Unspecified,
            credit: 0,
            add_on_credit: 0,
            content: String::new(),
            remark: String::new(),
        }
    }

    /// Debit for a feature use, drawn from primary credit until re-targeted
    pub fn service_cost(service_type: CreditServiceType, credit: i64) -> Self {
        Self {
            service_type,
            credit,
            ..Self::new(CreditPayType::ServiceCost)
        }
    }

    pub fn with_credit(mut self, credit: i64) -> Self {
        self.credit = credit;
        self
    }

    pub fn with_add_on_credit(mut self, add_on_credit: i64) -> Self {
        self.add_on_credit = add_on_credit;
        self
    }

    pub fn with_credit_type(mut self, credit_type: CreditType) -> Self {
        self.credit_type = credit_type;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>, remark: impl Into<String>) -> Self {
        self.content = content.into();
        self.remark = remark.into();
        self
    }

    /// Amount of the balance selected by `credit_type`
    pub fn amount(&self) -> i64 {
        match self.credit_type {
            CreditType::Credit => self.credit,
            CreditType::AddOnCredit => self.add_on_credit,
        }
    }
}

/// Result of folding every bill of an account from (0, 0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAudit {
    pub bill_count: usize,
    pub replayed_credit: i64,
    pub replayed_add_on_credit: i64,
    pub credit: i64,
    pub add_on_credit: i64,
    /// Bills whose after-snapshot disagrees with before + delta
    pub broken_bills: Vec<uuid::Uuid>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.broken_bills.is_empty()
            && self.replayed_credit == self.credit
            && self.replayed_add_on_credit == self.add_on_credit
    }
}

/// One ledger entry as shown to the member
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditBillView {
    pub id: uuid::Uuid,
    pub seq: i64,
    pub bill_type: CreditPayType,
    pub credit_type: CreditType,
    pub in_out_type: CreditInOutType,
    pub credit: i64,
    pub before_credit: i64,
    pub after_credit: i64,
    pub add_on_credit: i64,
    pub before_add_on_credit: i64,
    pub after_add_on_credit: i64,
    pub content: String,
    pub remark: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

impl From<credit_bills::Model> for CreditBillView {
    fn from(bill: credit_bills::Model) -> Self {
        Self {
            id: bill.id,
            seq: bill.seq,
            bill_type: bill.bill_type,
            credit_type: bill.credit_type,
            in_out_type: bill.in_out_type,
            credit: bill.credit,
            before_credit: bill.before_credit,
            after_credit: bill.after_credit,
            add_on_credit: bill.add_on_credit,
            before_add_on_credit: bill.before_add_on_credit,
            after_add_on_credit: bill.after_add_on_credit,
            content: bill.content,
            remark: bill.remark,
            created_at: bill.created_at,
        }
    }
}
