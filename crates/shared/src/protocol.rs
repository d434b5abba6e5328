use serde::{Deserialize, Serialize};

use crate::domain::PurifierId;

pub fn purifiers_route() -> &'static str {
    "/purifiers"
}

pub fn purifier_route(id: &PurifierId) -> String {
    format!("/purifiers/{id}")
}

pub fn purifier_status_route(id: &PurifierId) -> String {
    format!("/purifiers/{id}/status")
}

/// Body of the dedicated status patch; carries the desired status, not a flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: bool,
}
