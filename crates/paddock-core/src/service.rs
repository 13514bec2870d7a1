// The draft collaborator interface: request/response access to the
// authoritative draft state for one (league, race).

use async_trait::async_trait;
use tracing::info;

use crate::draft::order::DraftOrderEntry;
use crate::draft::pick::{DraftPick, Driver};
use crate::error::ServiceError;
use crate::protocol::{DraftStatus, OrderCreation, OrderRequest, PickRequest};

/// Authoritative draft server, scoped to a single draft.
#[async_trait]
pub trait DraftService: Send + Sync {
    async fn fetch_status(&self) -> Result<DraftStatus, ServiceError>;

    /// Picks with `pick_number > since`, in pick order. `None` returns the
    /// whole log.
    async fn fetch_picks(&self, since: Option<u32>) -> Result<Vec<DraftPick>, ServiceError>;

    /// Drivers not yet picked by any team.
    async fn fetch_available_drivers(&self) -> Result<Vec<Driver>, ServiceError>;

    /// Every driver entered for the race, picked or not.
    async fn fetch_drivers(&self) -> Result<Vec<Driver>, ServiceError>;

    /// The round-1 order. `NotFound` until one has been created.
    async fn fetch_draft_order(&self) -> Result<Vec<DraftOrderEntry>, ServiceError>;

    /// Returns the recorded pick, or a conflict when the slot or driver is
    /// gone.
    async fn submit_pick(&self, request: PickRequest) -> Result<DraftPick, ServiceError>;

    /// One-shot order creation. `OrderExists` if an order is already stored.
    async fn create_draft_order(
        &self,
        request: OrderRequest,
    ) -> Result<Vec<DraftOrderEntry>, ServiceError>;
}

/// Create the draft order, treating an existing order as a fetch.
pub async fn create_or_fetch_order(
    service: &dyn DraftService,
    request: OrderRequest,
) -> Result<OrderCreation, ServiceError> {
    match service.create_draft_order(request).await {
        Ok(order) => {
            info!("Draft order created ({} teams)", order.len());
            Ok(OrderCreation::Created(order))
        }
        Err(ServiceError::OrderExists) => {
            info!("Draft order already exists; fetching it");
            let order = service.fetch_draft_order().await?;
            Ok(OrderCreation::Existing(order))
        }
        Err(e) => Err(e),
    }
}
