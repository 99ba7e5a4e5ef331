//! ListInvoicesHandler - a user's settlement records, newest first.

use std::sync::Arc;

use crate::domain::billing::{BillingError, SettlementRecord};
use crate::domain::foundation::{Page, PageRequest, UserId};
use crate::ports::SettlementStore;

#[derive(Debug, Clone)]
pub struct ListInvoicesQuery {
    pub user_id: UserId,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub struct ListInvoicesHandler {
    settlements: Arc<dyn SettlementStore>,
}

impl ListInvoicesHandler {
    pub fn new(settlements: Arc<dyn SettlementStore>) -> Self {
        Self { settlements }
    }

    pub async fn handle(
        &self,
        query: ListInvoicesQuery,
    ) -> Result<Page<SettlementRecord>, BillingError> {
        let request = PageRequest::new(query.page, query.limit);
        Ok(self.settlements.list_for_user(&query.user_id, request).await?)
    }
}
