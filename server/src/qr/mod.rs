//! QR token lifecycle: sign, record, redeem once.

pub mod codec;
pub mod issuance;
pub mod redemption;
pub mod store;

pub use codec::{CodecError, SignedToken, TokenCodec};
pub use issuance::{IssuanceService, IssueError, IssuedToken};
pub use redemption::{RedeemError, RedemptionService};
pub use store::{RedeemAttempt, ReplayStore, SqliteReplayStore, StoreError};

use std::sync::Arc;
use std::time::Duration;

/// Build both services over one codec and one store, so signing and
/// verification always use the same key.
pub fn build_services(
    secret: &[u8],
    store: Arc<dyn ReplayStore>,
    max_ttl: Duration,
) -> (IssuanceService, RedemptionService) {
    let codec = Arc::new(TokenCodec::new(secret));
    (
        IssuanceService::new(codec.clone(), store.clone(), max_ttl),
        RedemptionService::new(codec, store),
    )
}
