use std::fmt::{Display, Formatter, Write};
use std::str::FromStr;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind, CoreResult};

pub const TASK_ID_BYTES: usize = 16;
pub const TASK_COMMAND: &str = "example";
pub const TASK_ARGS: [&str; 3] = ["a", "b", "c"];

/// Hex encoding of 16 bytes drawn from the operating system entropy source.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> CoreResult<Self> {
        let mut bytes = [0u8; TASK_ID_BYTES];
        OsRng.try_fill_bytes(&mut bytes).map_err(|error| CoreError {
            backend: None,
            action: None,
            task_id: None,
            kind: CoreErrorKind::EntropyFailure,
            message: format!("entropy source failed while generating task id: {error}"),
        })?;
        Ok(Self::from_bytes(&bytes))
    }

    pub fn from_bytes(bytes: &[u8; TASK_ID_BYTES]) -> Self {
        let mut encoded = String::with_capacity(TASK_ID_BYTES * 2);
        for byte in bytes {
            // Writing into a String cannot fail.
            let _ = write!(encoded, "{byte:02x}");
        }
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    Create,
    Status,
    #[serde(rename = "out")]
    Output,
    Delete,
}

impl TaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Status => "status",
            Self::Output => "out",
            Self::Delete => "delete",
        }
    }
}

impl Display for TaskAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub command: String,
    pub args: Vec<String>,
    pub output: String,
}

impl Task {
    pub fn generate() -> CoreResult<Self> {
        Ok(Self {
            id: TaskId::generate()?,
            status: TaskStatus::Pending,
            command: TASK_COMMAND.to_string(),
            args: TASK_ARGS.iter().map(|arg| (*arg).to_string()).collect(),
            output: String::new(),
        })
    }
}
