//! Request and response envelopes and the structured wire error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::REQUEST_ID;

/// Request envelope sent by the initiator.
///
/// ```text
/// {"method": "volumes", "id": 100, "params": {"search_key": null, "flags": 0}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Method name used to route the request.
    pub method: String,
    /// Correlation id. Constant, since only one request is ever in flight.
    pub id: i64,
    /// Method parameters. A missing or `null` params field reads as empty.
    #[serde(default, deserialize_with = "null_as_default")]
    pub params: Map<String, Value>,
}

impl Request {
    /// Creates a request with the protocol's fixed correlation id.
    pub fn new(method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            method: method.into(),
            id: REQUEST_ID,
            params,
        }
    }

    /// Returns the params as a JSON object value, ready for typed decoding.
    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

/// Response envelope sent by the responder.
///
/// Exactly one of `error` and `result` is meaningful; see
/// [`Transport::invoke`](crate::Transport::invoke) for how an envelope
/// carrying neither is treated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id echoed from the request.
    #[serde(default)]
    pub id: i64,
    /// Structured error, if the call failed.
    #[serde(default)]
    pub error: Option<ErrorResponse>,
    /// Method-specific result. `None` only when the key is missing; an
    /// explicit `null` reads as `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
}

impl Response {
    /// Creates a success response.
    pub fn result(result: Value) -> Self {
        Self {
            id: REQUEST_ID,
            error: None,
            result: Some(result),
        }
    }

    /// Creates an error response.
    pub fn error(error: ErrorResponse) -> Self {
        Self {
            id: REQUEST_ID,
            error: Some(error),
            result: None,
        }
    }

    /// Returns true if this is an error response.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

macro_rules! error_codes {
    ($($(#[$doc:meta])* $name:ident = $value:literal,)+) => {
        /// Numeric error codes carried in [`ErrorResponse::code`].
        ///
        /// Codes not listed here are preserved in [`ErrorCode::Other`] so that
        /// an error relayed from a peer is never altered.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "i32", into = "i32")]
        pub enum ErrorCode {
            $($(#[$doc])* $name,)+
            /// Any code without a named variant.
            Other(i32),
        }

        impl ErrorCode {
            /// Returns the numeric wire value.
            pub fn as_i32(self) -> i32 {
                match self {
                    $(Self::$name => $value,)+
                    Self::Other(code) => code,
                }
            }
        }

        impl From<i32> for ErrorCode {
            fn from(code: i32) -> Self {
                match code {
                    $($value => Self::$name,)+
                    other => Self::Other(other),
                }
            }
        }
    };
}

error_codes! {
    /// No error.
    Ok = 0,
    /// Bug in the library.
    LibBug = 1,
    /// Bug in the plugin (including protocol violations by the responder).
    PluginBug = 2,
    /// A job has been started.
    JobStarted = 7,
    /// Plugin timed out talking to the storage system.
    Timeout = 11,
    /// The management daemon is not running.
    DaemonNotRunning = 12,
    /// Insufficient permission.
    PermissionDenied = 13,
    /// A resource with that name already exists.
    NameConflict = 50,
    /// Initiator already exists in the group.
    ExistsInitiator = 52,
    /// An argument is incorrect.
    InvalidArgument = 101,
    /// Request resulted in no change of storage state.
    NoStateChange = 125,
    /// Network connection refused.
    NetworkConnRefused = 140,
    /// Networked host unreachable.
    NetworkHostDown = 141,
    /// Generic network error.
    NetworkError = 142,
    /// Out of memory.
    NoMemory = 152,
    /// Operation not supported.
    NoSupport = 153,
    /// Volume is masked to an access group.
    IsMasked = 160,
    /// Volume or file system has a child dependency.
    HasChildDependency = 161,
    /// Access group not found.
    NotFoundAccessGroup = 200,
    /// File system not found.
    NotFoundFs = 201,
    /// Job not found.
    NotFoundJob = 202,
    /// Pool not found.
    NotFoundPool = 203,
    /// File system snapshot not found.
    NotFoundFsSnapshot = 204,
    /// Volume not found.
    NotFoundVolume = 205,
    /// NFS export not found.
    NotFoundNfsExport = 206,
    /// System not found.
    NotFoundSystem = 208,
    /// Disk not found.
    NotFoundDisk = 209,
    /// Functionality not licensed.
    NotLicensed = 226,
    /// Operation requires the target offline.
    NoSupportOnlineChange = 250,
    /// Operation requires the target online.
    NoSupportOfflineChange = 251,
    /// Plugin failed to authenticate.
    PluginAuthFailed = 300,
    /// Wrong permissions on the IPC socket.
    PluginSocketPermission = 307,
    /// Plugin does not exist.
    PluginNotExist = 311,
    /// Not enough space.
    NotEnoughSpace = 350,
    /// Failure reading or writing the IPC stream.
    TransportCommunication = 400,
    /// Failure serializing a payload.
    TransportSerialization = 401,
    /// Parameter carried over IPC is invalid.
    TransportInvalidArg = 402,
    /// Refusing to remove the last initiator from an access group.
    LastInitInAccessGroup = 502,
    /// Search key not supported.
    UnsupportedSearchKey = 510,
    /// Access group has no initiator.
    EmptyAccessGroup = 511,
    /// Pool not ready.
    PoolNotReady = 512,
    /// Disk is not free.
    DiskNotFree = 513,
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

/// Structured error carried in a response or a failed job status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Extra detail, empty when the peer sent none.
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: String,
}

impl ErrorResponse {
    /// Creates a new error response.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: String::new(),
        }
    }

    /// Builder: set the data field.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    /// Creates a not-supported error for a method.
    pub fn no_support(method: &str) -> Self {
        Self::new(ErrorCode::NoSupport, format!("method {} not supported", method))
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// Creates a plugin bug error.
    pub fn plugin_bug(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PluginBug, message)
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.data.is_empty() {
            write!(f, "code = {}, message = {}", self.code, self.message)
        } else {
            write!(
                f,
                "code = {}, message = {}, data = {}",
                self.code, self.message, self.data
            )
        }
    }
}

impl std::error::Error for ErrorResponse {}

/// Marks a field as present, keeping an explicit `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Deserializes `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serde_shape() {
        let mut params = Map::new();
        params.insert("job_id".into(), json!("JOB_1"));
        params.insert("flags".into(), json!(0));
        let request = Request::new("job_status", params);

        insta::assert_json_snapshot!(request, @r#"
        {
          "method": "job_status",
          "id": 100,
          "params": {
            "flags": 0,
            "job_id": "JOB_1"
          }
        }
        "#);
    }

    #[test]
    fn request_null_params_read_as_empty() {
        let parsed: Request =
            serde_json::from_str(r#"{"method":"systems","id":100,"params":null}"#).unwrap();
        assert!(parsed.params.is_empty());

        let parsed: Request = serde_json::from_str(r#"{"method":"systems","id":7}"#).unwrap();
        assert_eq!(parsed.id, 7);
        assert!(parsed.params.is_empty());
    }

    #[test]
    fn request_params_must_be_an_object() {
        let parsed: Result<Request, _> =
            serde_json::from_str(r#"{"method":"systems","id":100,"params":[1,2]}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn response_serde_result() {
        let response = Response::result(json!(["desc", "1.0"]));
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"id":100,"error":null,"result":["desc","1.0"]}"#);
    }

    #[test]
    fn response_serde_error() {
        let response = Response::error(ErrorResponse::no_support("fs"));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            json!({
                "id": 100,
                "error": {"code": 153, "message": "method fs not supported", "data": ""},
                "result": null
            })
        );

        let parsed: Response = serde_json::from_value(json).unwrap();
        assert!(parsed.is_error());
        assert_eq!(parsed.error.unwrap().code, ErrorCode::NoSupport);
    }

    #[test]
    fn response_missing_fields_read_as_none() {
        let parsed: Response = serde_json::from_str(r#"{"id":100}"#).unwrap();
        assert!(parsed.error.is_none());
        assert!(parsed.result.is_none());
    }

    #[test]
    fn response_null_result_is_kept_apart_from_missing() {
        let parsed: Response = serde_json::from_str(r#"{"id":100,"error":null,"result":null}"#).unwrap();
        assert!(!parsed.is_error());
        assert_eq!(parsed.result, Some(Value::Null));
    }

    #[test]
    fn error_code_roundtrip_preserves_unknown_codes() {
        assert_eq!(ErrorCode::from(205), ErrorCode::NotFoundVolume);
        assert_eq!(ErrorCode::from(4242), ErrorCode::Other(4242));
        assert_eq!(i32::from(ErrorCode::Other(4242)), 4242);
        assert_eq!(ErrorCode::TransportInvalidArg.as_i32(), 402);

        let parsed: ErrorResponse =
            serde_json::from_str(r#"{"code":4242,"message":"vendor","data":null}"#).unwrap();
        assert_eq!(parsed.code, ErrorCode::Other(4242));
        assert_eq!(parsed.data, "");
        assert_eq!(
            serde_json::to_value(&parsed).unwrap(),
            json!({"code": 4242, "message": "vendor", "data": ""})
        );
    }

    #[test]
    fn error_response_display() {
        let error = ErrorResponse::new(ErrorCode::NotFoundVolume, "not found");
        assert_eq!(error.to_string(), "code = 205, message = not found");

        let error = error.with_data("V1");
        assert_eq!(error.to_string(), "code = 205, message = not found, data = V1");
    }
}
