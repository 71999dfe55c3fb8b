use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wms_core::{DomainError, DomainResult, Entity, ItemId, RequestId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    New,
    Processing,
    Completed,
    Rejected,
}

/// A department's request for a quantity of one item.
///
/// Requests are owned by an outside workflow; the ledger only reads the item
/// and quantity and writes back the issue outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandRequest {
    pub id: RequestId,
    pub requester: String,
    pub department: String,
    pub item_id: ItemId,
    pub quantity: i64,
    pub status: RequestStatus,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub fulfilled_quantity: i64,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl DemandRequest {
    pub fn new(
        id: RequestId,
        requester: impl Into<String>,
        department: impl Into<String>,
        item_id: ItemId,
        quantity: i64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("requested quantity must be positive"));
        }
        Ok(Self {
            id,
            requester: requester.into(),
            department: department.into(),
            item_id,
            quantity,
            status: RequestStatus::New,
            note: String::new(),
            created_at,
            fulfilled_quantity: 0,
            processed_by: None,
            processed_at: None,
        })
    }

    /// Quantity still owed to the requester.
    pub fn outstanding(&self) -> i64 {
        (self.quantity - self.fulfilled_quantity).max(0)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RequestStatus::Completed | RequestStatus::Rejected)
    }

    /// Requests in `New` or partially served `Processing` can take more stock.
    pub fn ensure_issuable(&self) -> DomainResult<()> {
        if self.is_terminal() {
            return Err(DomainError::validation(format!(
                "request {} has already been processed",
                self.id
            )));
        }
        Ok(())
    }

    /// Only untouched requests may start fulfilment.
    pub fn ensure_new(&self) -> DomainResult<()> {
        if self.status != RequestStatus::New {
            return Err(DomainError::validation(format!(
                "request {} is not new (status: {:?})",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Apply the outcome of an issue against this request.
    pub fn record_issue(
        &mut self,
        issued: i64,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<RequestStatus> {
        self.ensure_issuable()?;
        if issued <= 0 {
            return Err(DomainError::validation("issued quantity must be positive"));
        }
        self.fulfilled_quantity += issued;
        self.status = if self.fulfilled_quantity >= self.quantity {
            RequestStatus::Completed
        } else {
            let partial = format!("partial: {}/{}", self.fulfilled_quantity, self.quantity);
            self.note = if self.note.is_empty() {
                partial
            } else {
                format!("{} ({partial})", self.note)
            };
            RequestStatus::Processing
        };
        self.processed_by = Some(actor.into());
        self.processed_at = Some(at);
        Ok(self.status)
    }

    pub fn reject(
        &mut self,
        actor: impl Into<String>,
        note: impl Into<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_issuable()?;
        self.status = RequestStatus::Rejected;
        self.note = note.into();
        self.processed_by = Some(actor.into());
        self.processed_at = Some(at);
        Ok(())
    }
}

impl Entity for DemandRequest {
    type Id = RequestId;

    fn id(&self) -> RequestId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(qty: i64) -> DemandRequest {
        DemandRequest::new(RequestId::new(), "ana", "Lab", ItemId::new(), qty, Utc::now()).unwrap()
    }

    #[test]
    fn full_issue_completes() {
        let mut r = request(10);
        assert_eq!(r.record_issue(10, "clerk", Utc::now()), Ok(RequestStatus::Completed));
        assert_eq!(r.outstanding(), 0);
        assert_eq!(r.processed_by.as_deref(), Some("clerk"));
    }

    #[test]
    fn partial_issue_stays_processing_then_completes() {
        let mut r = request(10);
        assert_eq!(r.record_issue(4, "clerk", Utc::now()), Ok(RequestStatus::Processing));
        assert_eq!(r.note, "partial: 4/10");
        assert_eq!(r.outstanding(), 6);
        assert_eq!(r.record_issue(6, "clerk", Utc::now()), Ok(RequestStatus::Completed));
    }

    #[test]
    fn terminal_requests_refuse_changes() {
        let mut r = request(3);
        r.record_issue(3, "clerk", Utc::now()).unwrap();
        assert!(r.is_terminal());
        assert!(r.record_issue(1, "clerk", Utc::now()).is_err());
        assert_eq!(r.fulfilled_quantity, 3);

        let mut r = request(3);
        r.reject("lead", "duplicate", Utc::now()).unwrap();
        assert_eq!(r.status, RequestStatus::Rejected);
        assert!(r.record_issue(1, "clerk", Utc::now()).is_err());
        assert!(r.reject("lead", "again", Utc::now()).is_err());
    }

    #[test]
    fn only_new_requests_start_fulfilment() {
        let mut r = request(10);
        assert!(r.ensure_new().is_ok());
        r.record_issue(4, "clerk", Utc::now()).unwrap();
        assert!(matches!(r.ensure_new(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let zero = DemandRequest::new(RequestId::new(), "a", "b", ItemId::new(), 0, Utc::now());
        assert!(zero.is_err());
    }
}
