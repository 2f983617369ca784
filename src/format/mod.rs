//! Wire-format adapters.
//!
//! Each variant is a pure function from the internal history to one model
//! backend's request shape. Role-envelope differences (flat tool-role lists
//! vs results nested in user content) are fully contained here; the internal
//! log never bends to a specific backend.

mod anthropic;
mod generic;
mod openai;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::toolserver::schema::ToolSchema;
use crate::types::message::validate_pairing;
use crate::types::ChatMessage;

/// Closed set of supported backend wire formats.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum WireFormat {
    OpenAi,
    Anthropic,
    Generic,
}

/// A provider-shaped request body, tagged with the format that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderPayload {
    pub format: WireFormat,
    pub body: serde_json::Value,
}

impl WireFormat {
    /// Render the full history plus tool catalog into this backend's
    /// request shape.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::TychoError::MessageFormat`] when the
    /// history violates the call/result pairing invariant; this is fatal to
    /// the current run only.
    pub fn payload(
        &self,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
        tools: &[ToolSchema],
    ) -> Result<ProviderPayload> {
        validate_pairing(history)?;
        let body = match self {
            Self::OpenAi => openai::render(history, system_prompt, tools)?,
            Self::Anthropic => anthropic::render(history, system_prompt, tools)?,
            Self::Generic => generic::render(history, system_prompt, tools)?,
        };
        Ok(ProviderPayload {
            format: *self,
            body,
        })
    }
}
