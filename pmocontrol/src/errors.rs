use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlPointError {
    #[error("{0}")]
    ParsingError(String),
    #[error("Missing {0} element in SOAP body")]
    UpnpMissingReturnValue(String),
    #[error("Invalid {0} value: {1}")]
    UpnpBadReturnValue(String, String),
    #[error("{0} returned UPnP error {1}: {2} (HTTP status {3})")]
    SoapUpnpParseError(String, u32, String, u32),
    #[error("{0} failed with HTTP status {1} and body: {2}")]
    SoapActionWrongBody(String, u32, String),
    #[error("Soap Error: No envelop for action {0}")]
    SoapNoEnvelop(String),
    #[error("Soap Error: cannot build request for {0}: {1}")]
    SoapBuild(String, String),
    #[error("{0} timed out")]
    Timeout(String),
    #[error("HTTP error on {0}: {1}")]
    Http(String, String),
    #[error("Device description unavailable: {0}")]
    Description(String),
    #[error("Capability detection failed: {0}")]
    CapabilityDetection(String),
    #[error("MusicRenderer operation '{0}' is not supported by backend '{1}'")]
    UpnpOperationNotSupported(String, String),
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),
}

impl ControlPointError {
    pub fn upnp_operation_not_supported(operation: &str, service: &str) -> Self {
        ControlPointError::UpnpOperationNotSupported(operation.to_string(), service.to_string())
    }

    pub fn upnp_missing_return_value(value: &str) -> Self {
        ControlPointError::UpnpMissingReturnValue(value.to_string())
    }

    pub fn upnp_bad_return_value(name: &str, value: &str) -> Self {
        ControlPointError::UpnpBadReturnValue(name.to_string(), value.to_string())
    }

    /// Convertit une erreur reqwest en distinguant les timeouts.
    pub fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ControlPointError::Timeout(context.to_string())
        } else {
            ControlPointError::Http(context.to_string(), err.to_string())
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ControlPointError::Timeout(_))
    }
}

/// Backend operations, as named in failure reports and retry accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendAction {
    Connect,
    Load,
    Play,
    Pause,
    Stop,
    Seek,
    SetVolume,
    GetVolume,
    GetPosition,
    GetStatus,
    GetCapabilities,
}

impl BackendAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendAction::Connect => "connect",
            BackendAction::Load => "load",
            BackendAction::Play => "play",
            BackendAction::Pause => "pause",
            BackendAction::Stop => "stop",
            BackendAction::Seek => "seek",
            BackendAction::SetVolume => "set_volume",
            BackendAction::GetVolume => "get_volume",
            BackendAction::GetPosition => "get_position",
            BackendAction::GetStatus => "get_status",
            BackendAction::GetCapabilities => "get_capabilities",
        }
    }

    /// Actions that change the renderer state and must be serialized.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            BackendAction::Load
                | BackendAction::Play
                | BackendAction::Pause
                | BackendAction::Stop
                | BackendAction::Seek
                | BackendAction::SetVolume
        )
    }
}

impl fmt::Display for BackendAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a backend operation.
#[derive(Error, Debug)]
#[error("backend action {action} failed: {source}")]
pub struct BackendError {
    pub action: BackendAction,
    #[source]
    pub source: ControlPointError,
}

impl BackendError {
    pub fn new(action: BackendAction, source: ControlPointError) -> Self {
        Self { action, source }
    }

    pub fn timeout(action: BackendAction) -> Self {
        Self::new(action, ControlPointError::Timeout(action.to_string()))
    }

    pub fn is_timeout(&self) -> bool {
        self.source.is_timeout()
    }
}

/// Attache l'action en échec à un résultat de bas niveau.
pub(crate) trait WithAction<T> {
    fn for_action(self, action: BackendAction) -> Result<T, BackendError>;
}

impl<T> WithAction<T> for Result<T, ControlPointError> {
    fn for_action(self, action: BackendAction) -> Result<T, BackendError> {
        self.map_err(|e| BackendError::new(action, e))
    }
}
