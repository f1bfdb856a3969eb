// Push payload
//
// JSON body handed to the push protocol and decoded by the SDK's service worker.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub data: PushPayloadData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayloadData {
    /// Click-through target.
    pub url: String,
    pub campaign_id: Uuid,
    /// Lets the service worker attribute click/dismiss beacons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_id: Option<Uuid>,
    pub click_tracking_url: String,
}

impl PushPayload {
    /// Serialized bytes sent through the push transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
