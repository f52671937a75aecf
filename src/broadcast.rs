//! Broadcast dispatcher
//!
//! Serializes an event once and pushes it to every target in a registry
//! snapshot. Delivery is best-effort: a failed push is logged and skipped,
//! and never changes registry state.

use std::sync::Arc;

use tracing::{error, warn};

use crate::client::Client;
use crate::message::Event;

/// Outcome of one broadcast, logged by the caller
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Send `event` to every client in `targets`, optionally skipping one username
pub fn broadcast(event: &Event, targets: &[Client], exclude: Option<&str>) -> Delivery {
    let mut delivery = Delivery::default();

    let payload: Arc<str> = match event.to_json() {
        Ok(json) => json.into(),
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return delivery;
        }
    };

    for target in targets {
        if exclude == Some(target.username.as_str()) {
            continue;
        }
        match target.send(Arc::clone(&payload)) {
            Ok(()) => delivery.delivered += 1,
            Err(e) => {
                warn!(user = %target.username, client_id = %target.id, "Delivery failed: {}", e);
                delivery.failed += 1;
            }
        }
    }

    delivery
}
