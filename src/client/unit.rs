//! Client-side unit
//!
//! A unit bundles one or more function calls under one TID. Its delivery
//! mode follows from the TID kind and the number of queue names:
//!
//! | TID        | queue names | mode     |
//! |------------|-------------|----------|
//! | classic    | 0           | tRFC     |
//! | classic    | 1           | qRFC     |
//! | background | 0           | bgRFC/T  |
//! | background | 1 or more   | bgRFC/Q  |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ClientError;
use crate::server::Params;
use crate::tid::{Tid, UnitIdentifier, UnitType};

/// Routing attributes passed unmodified to the transport, e.g. `{"lock": 1}`
pub type UnitAttributes = Map<String, Value>;

/// One call inside a unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub params: Params,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, params: Params) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryMode {
    Transactional,
    Queued,
    BackgroundTransactional,
    BackgroundQueued,
}

impl DeliveryMode {
    /// Mode for a unit kind and queue count; rejects invalid cardinality
    pub fn resolve(background: bool, queue_count: usize) -> Result<Self, ClientError> {
        match (background, queue_count) {
            (false, 0) => Ok(DeliveryMode::Transactional),
            (false, 1) => Ok(DeliveryMode::Queued),
            (false, n) => Err(ClientError::Validation(format!(
                "qRFC unit takes exactly one queue name, got {}",
                n
            ))),
            (true, 0) => Ok(DeliveryMode::BackgroundTransactional),
            (true, _) => Ok(DeliveryMode::BackgroundQueued),
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, DeliveryMode::Queued | DeliveryMode::BackgroundQueued)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Transactional => "tRFC",
            DeliveryMode::Queued => "qRFC",
            DeliveryMode::BackgroundTransactional => "bgRFC/T",
            DeliveryMode::BackgroundQueued => "bgRFC/Q",
        }
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub tid: Tid,
    pub background: bool,
    pub queued: bool,
    pub calls: Vec<FunctionCall>,
    pub queue_names: Vec<String>,
    pub attributes: UnitAttributes,
}

impl Unit {
    /// Empty unit with a fresh TID
    pub fn new(background: bool) -> Self {
        Self {
            tid: Tid::generate(background),
            background,
            queued: false,
            calls: Vec::new(),
            queue_names: Vec::new(),
            attributes: UnitAttributes::new(),
        }
    }

    pub fn unit_type(&self) -> UnitType {
        if self.queued {
            UnitType::Queued
        } else {
            UnitType::Transactional
        }
    }

    pub fn identifier(&self) -> UnitIdentifier {
        UnitIdentifier::new(self.tid.clone(), self.unit_type())
    }

    pub fn mode(&self) -> DeliveryMode {
        match (self.background, self.queued) {
            (false, false) => DeliveryMode::Transactional,
            (false, true) => DeliveryMode::Queued,
            (true, false) => DeliveryMode::BackgroundTransactional,
            (true, true) => DeliveryMode::BackgroundQueued,
        }
    }

    /// Validate and store the payload; nothing is sent
    pub fn fill(
        &mut self,
        calls: Vec<FunctionCall>,
        queue_names: Vec<String>,
        attributes: UnitAttributes,
    ) -> Result<DeliveryMode, ClientError> {
        if calls.is_empty() {
            return Err(ClientError::Validation("unit has no function calls".into()));
        }
        if let Some(call) = calls.iter().find(|c| c.name.trim().is_empty()) {
            return Err(ClientError::Validation(format!(
                "function name must not be empty: {:?}",
                call
            )));
        }
        if queue_names.iter().any(|q| q.trim().is_empty()) {
            return Err(ClientError::Validation("queue name must not be empty".into()));
        }
        Tid::parse_for(self.tid.as_str(), self.background)
            .map_err(|e| ClientError::Validation(e.to_string()))?;
        let mode = DeliveryMode::resolve(self.background, queue_names.len())?;

        self.calls = calls;
        self.queue_names = queue_names;
        self.attributes = attributes;
        self.queued = mode.is_queued();
        Ok(mode)
    }
}
