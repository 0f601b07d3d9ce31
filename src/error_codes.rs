use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedErrorKind {
    /// Bad flags or arguments.
    Usage,
    /// The manifest could not be read or failed validation.
    Manifest,
    /// No GPU adapter or device.
    Device,
}

impl CodedErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Usage => 2,
            Self::Manifest => 3,
            Self::Device => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodedError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
    pub kind: CodedErrorKind,
}

impl CodedError {
    fn new(kind: CodedErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            kind,
        }
    }

    pub fn usage(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(CodedErrorKind::Usage, code, message)
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::new(CodedErrorKind::Manifest, "invalid_manifest", message)
    }

    pub fn device(message: impl Into<String>) -> Self {
        Self::new(CodedErrorKind::Device, "gpu_unavailable", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.code.to_owned(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CodedError {}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_coded_error(error: &Error) -> Option<&CodedError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CodedError>())
}

/// Envelope for any error: the coded error if one is in the chain, otherwise
/// a generic `internal` code carrying the full context chain.
pub fn envelope_for(error: &Error) -> ErrorEnvelope {
    match find_coded_error(error) {
        Some(coded) => coded.envelope(),
        None => ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: "internal".to_owned(),
                message: format!("{error:#}"),
                details: None,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use serde_json::json;

    #[test]
    fn coded_error_survives_context_wrapping() {
        let result: anyhow::Result<()> = Err(CodedError::usage("invalid_every", "--every must be > 0").into());
        let error = result.context("render failed").unwrap_err();
        let envelope = envelope_for(&error);
        assert_eq!(envelope.error.code, "invalid_every");
        assert_eq!(find_coded_error(&error).unwrap().kind.exit_code(), 2);
    }

    #[test]
    fn uncoded_errors_map_to_internal() {
        let error = anyhow::anyhow!("disk on fire");
        let value = serde_json::to_value(envelope_for(&error)).unwrap();
        assert_eq!(
            value,
            json!({ "ok": false, "error": { "code": "internal", "message": "disk on fire" } })
        );
    }
}
