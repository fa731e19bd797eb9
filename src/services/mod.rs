//! Services module for the payment lifecycle business logic

pub mod campaign_aggregator;
pub mod contribution_lifecycle;
pub mod ledger;
pub mod notification;
pub mod order_lifecycle;

pub use campaign_aggregator::{CampaignAggregator, CampaignSnapshot};
pub use contribution_lifecycle::ContributionLifecycleService;
pub use ledger::ReconciliationLedger;
pub use notification::NotificationService;
pub use order_lifecycle::{OrderLifecycleService, SettleOutcome};
