//! JSON batch descriptor in, result envelope out.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::orchestrator::{BatchOutcome, IssuanceOrchestrator};
use crate::request::{IssuedCertificateBundle, SubjectRequest};

/// Accepter name that triggers certificate issuance.
pub const ITEM_FOR_X509: &str = "ItemForX509";

/// Inbound batch. Only `message` and `accepter` drive issuance; the other
/// fields are carried for the surrounding transport.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchDescriptor {
    pub connection_key: String,
    pub result: bool,
    pub redis_key: String,
    pub filepath: String,
    pub api_status_code: i32,
    pub runtime_session_id: String,
    pub business_partner: Option<i64>,
    pub service_label: String,
    #[serde(rename = "APIType")]
    pub api_type: String,
    pub message: BatchMessage,
    pub api_schema: String,
    pub accepter: Vec<String>,
    pub deleted: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMessage {
    #[serde(rename = "ItemsForX509", default)]
    pub items: Vec<SubjectRequest>,
}

/// A request that failed, by position in `ItemsForX509`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub index: usize,
    pub message: String,
}

/// Outbound envelope. `ItemForX509` is `null` when a fail-fast batch aborts.
/// Otherwise it holds one slot per request, `null` where that request failed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    #[serde(rename = "ItemForX509")]
    pub items: Option<Vec<Option<IssuedCertificateBundle>>>,
    #[serde(rename = "Errors", default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ItemError>,
}

impl From<BatchOutcome> for ResultEnvelope {
    fn from(outcome: BatchOutcome) -> Self {
        match outcome {
            BatchOutcome::Complete(bundles) => Self {
                items: Some(bundles.into_iter().map(Some).collect()),
                errors: Vec::new(),
            },
            BatchOutcome::Aborted(err) => Self {
                items: None,
                errors: vec![ItemError {
                    index: err.index,
                    message: err.source.to_string(),
                }],
            },
            BatchOutcome::Partial(report) => Self {
                items: Some(
                    report
                        .items
                        .iter()
                        .map(|item| item.as_ref().ok().cloned())
                        .collect(),
                ),
                errors: report
                    .failures()
                    .map(|(index, e)| ItemError {
                        index,
                        message: e.to_string(),
                    })
                    .collect(),
            },
        }
    }
}

/// Runs the accepters named in `descriptor`.
pub fn dispatch(descriptor: &BatchDescriptor, orchestrator: &IssuanceOrchestrator) -> ResultEnvelope {
    let mut envelope = ResultEnvelope::default();
    for accepter in &descriptor.accepter {
        match accepter.as_str() {
            ITEM_FOR_X509 => {
                envelope = orchestrator.run(&descriptor.message.items).into();
                if envelope.items.is_none() {
                    error!(
                        runtime_session_id = %descriptor.runtime_session_id,
                        "certificate batch aborted"
                    );
                }
            }
            other => warn!(accepter = other, "ignoring unknown accepter"),
        }
    }
    envelope
}
