use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use signoff_core::model::{ContributionKey, Visa, VisaRequest};

use crate::collab::{HistoryError, VisaHistoryStore};

/// In-memory visa history. Not durable; the default store and the one tests use.
#[derive(Debug, Default)]
pub struct InMemoryVisaHistory {
    requests: Mutex<Vec<VisaRequest>>,
}

impl InMemoryVisaHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<VisaRequest>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl VisaHistoryStore for InMemoryVisaHistory {
    async fn append(&self, request: VisaRequest) -> Result<(), HistoryError> {
        self.lock().push(request);
        Ok(())
    }

    async fn last(&self, key: &ContributionKey) -> Result<Option<VisaRequest>, HistoryError> {
        Ok(self
            .lock()
            .iter()
            .rev()
            .find(|r| r.server_id == key.server_id && r.branch == key.branch)
            .cloned())
    }

    async fn all(&self) -> Result<Vec<VisaRequest>, HistoryError> {
        Ok(self.lock().clone())
    }

    async fn complete(&self, request_id: &str, result: Option<Visa>) -> Result<(), HistoryError> {
        let mut requests = self.lock();
        let req = requests
            .iter_mut()
            .find(|r| r.request_id == request_id)
            .ok_or_else(|| HistoryError::NotFound(request_id.to_string()))?;
        if !req.observing {
            return Err(HistoryError::AlreadyCompleted(request_id.to_string()));
        }
        req.observing = false;
        req.result = result;
        Ok(())
    }
}
