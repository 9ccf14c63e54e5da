//! Wire types for the bridge protocol.
//!
//! Every frame is one line of UTF-8 text. Inbound frames are either the
//! literal `ping` or a JSON object:
//!
//! ```text
//! {"type": "add_cube", "params": {"name": "Cube", "scale": {"x": 2, "y": 2, "z": 2}}}
//! ```
//!
//! Outbound frames are a single JSON object tagged by `status`:
//!
//! ```text
//! {"status":"success","result":{"message":"pong"}}
//! {"status":"error","message":"Invalid JSON"}
//! ```

use std::fmt;
use std::str::FromStr;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ParseVec3Error, ProtocolError};

pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const ADD_CUBE: &str = "add_cube";
pub const COMMAND_RECEIVED: &str = "Command received";

/// A command sent by the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub kind: CompactString,
    pub params: Value,
}

impl Request {
    pub fn new(kind: impl Into<CompactString>, params: Value) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }

    /// Parses one frame. Only the JSON syntax is checked: a missing or
    /// non-string `type` reads as `""` and missing `params` as `null`.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line)?;
        Ok(Self::from_value(value))
    }

    fn from_value(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::new("", Value::Null);
        };
        let kind = match object.get("type") {
            Some(Value::String(kind)) => CompactString::from(kind.as_str()),
            _ => CompactString::default(),
        };
        let params = object.remove("params").unwrap_or(Value::Null);
        Self { kind, params }
    }

    pub fn command(&self) -> Command {
        Command::from_type(&self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddCube,
    Other(CompactString),
}

impl Command {
    pub fn from_type(kind: &str) -> Self {
        match kind {
            ADD_CUBE => Command::AddCube,
            other => Command::Other(other.into()),
        }
    }
}

/// Reply frame. The server always sends `Response<Reply>`, clients read
/// `Response<Value>` so they don't depend on the shape of each result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response<R = Reply> {
    Success { result: R },
    Error { message: CompactString },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Echo {
        message: CompactString,
        echo_type: CompactString,
        echo_params: Value,
    },
    Message {
        message: CompactString,
    },
}

impl Response {
    pub fn pong() -> Self {
        Response::Success {
            result: Reply::Message {
                message: PONG.into(),
            },
        }
    }

    pub fn echo(request: Request) -> Self {
        Response::Success {
            result: Reply::Echo {
                message: COMMAND_RECEIVED.into(),
                echo_type: request.kind,
                echo_params: request.params,
            },
        }
    }
}

impl<R> Response<R> {
    pub fn error(message: impl Into<CompactString>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}

impl<R: Serialize> Response<R> {
    /// Serializes to a single line, without the trailing newline.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<R> From<&ProtocolError> for Response<R> {
    fn from(err: &ProtocolError) -> Self {
        Response::Error {
            message: err.client_message().into(),
        }
    }
}

/// Turns one inbound line into its response.
///
/// `ping` is matched on the trimmed line before any JSON parsing. Every
/// other line is parsed and echoed back; `add_cube` is only logged.
pub fn handle_line(line: &str) -> Response {
    if line.trim() == PING {
        return Response::pong();
    }
    match Request::parse(line) {
        Ok(request) => {
            tracing::debug!(kind = %request.kind, params = %request.params, "command");
            execute(&request);
            Response::echo(request)
        }
        Err(err) => {
            tracing::warn!("{err}");
            Response::from(&err)
        }
    }
}

fn execute(request: &Request) {
    match request.command() {
        Command::AddCube => match AddCube::from_params(&request.params) {
            Ok(cube) => tracing::info!(
                name = %cube.name,
                position = %cube.position,
                scale = %cube.scale,
                "add_cube"
            ),
            Err(err) => tracing::warn!("add_cube with unexpected params: {err}"),
        },
        Command::Other(_) => {}
    }
}

// ADD CUBE //

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::splat(0.0);
    pub const ONE: Vec3 = Vec3::splat(1.0);

    pub const fn splat(v: f64) -> Self {
        Self { x: v, y: v, z: v }
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Parses `x,y,z`.
impl FromStr for Vec3 {
    type Err = ParseVec3Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseVec3Error(s.to_owned());
        let mut parts = s.split(',').map(|part| part.trim().parse::<f64>());
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) => Ok(Vec3 { x, y, z }),
            _ => Err(invalid()),
        }
    }
}

/// Parameters of the `add_cube` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddCube {
    pub name: CompactString,
    pub position: Vec3,
    pub scale: Vec3,
}

impl Default for AddCube {
    fn default() -> Self {
        Self {
            name: CompactString::from("New Cube"),
            position: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl AddCube {
    /// `null` params mean all defaults.
    pub fn from_params(params: &Value) -> Result<Self, serde_json::Error> {
        if params.is_null() {
            return Ok(Self::default());
        }
        AddCube::deserialize(params)
    }
}
