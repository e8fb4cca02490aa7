//! Lock command implementation

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use anyhow::Result;
use plansync_core::{
    lock::{self, plan_resource_key},
    Lock, LockStore, LockToken, RetryPolicy,
};
use serde_json::json;

use super::{print_json, GlobalOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAction {
    Show { plan_id: String },
    Release { plan_id: String, token: String },
}

/// Run the lock command
///
/// # Errors
///
/// Returns an error if the lock table cannot be opened or queried.
pub async fn run(global: &GlobalOptions, action: &LockAction) -> Result<()> {
    let (config, db) = global.open().await?;
    let store = db.lock_store().await?;

    match action {
        LockAction::Show { plan_id } => {
            let resource = plan_resource_key(plan_id);
            let output = match store.holder(&resource).await? {
                Some(holder) => json!({
                    "resource": holder.resource,
                    "held": true,
                    "token": holder.token.as_str(),
                    "acquiredAt": holder.acquired_at,
                    "expiresAt": holder.expires_at,
                }),
                None => json!({ "resource": resource, "held": false }),
            };
            print_json(&output, global.pretty)
        }
        LockAction::Release { plan_id, token } => {
            let held = Lock::new(
                plan_resource_key(plan_id),
                config.lock.ttl(),
                RetryPolicy::no_retry(),
            )
            .with_token(LockToken::new(token.as_str()));
            let released = lock::release(&store, &held).await?;
            if !released {
                tracing::warn!(plan_id = %plan_id, "lock not held by that token");
            }
            print_json(&json!({ "released": released }), global.pretty)
        }
    }
}
