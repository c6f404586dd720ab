//! Core type definitions for job specifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier types
pub type JobName = String;

/// Job tags, keyed by tag name
pub type Tags = BTreeMap<String, TagValue>;

/// Input bindings, keyed by logical input name
pub type Inputs = BTreeMap<String, JobInput>;

/// Output bindings, keyed by logical output name
pub type Outputs = BTreeMap<String, JobOutput>;

/// Environment variables set on the remote job
pub type EnvironmentVariables = BTreeMap<String, String>;

/// A tag value: free text, a number or a flag
///
/// The platform stores tags as strings; `Display` gives the wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Number(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Number(n) => write!(f, "{}", n),
            TagValue::Float(x) => write!(f, "{}", x),
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

impl From<u32> for TagValue {
    fn from(n: u32) -> Self {
        TagValue::Number(i64::from(n))
    }
}

impl From<i64> for TagValue {
    fn from(n: i64) -> Self {
        TagValue::Number(n)
    }
}

impl From<f64> for TagValue {
    fn from(x: f64) -> Self {
        TagValue::Float(x)
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        TagValue::Bool(b)
    }
}

/// Distributed execution backend requested for the run
///
/// Unrecognised values are kept verbatim so they still show up in tags and
/// the display name; they simply select no distribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParallelMode {
    /// MPI launcher (`"openmpi"`)
    OpenMpi,

    /// PyTorch native launcher (`"pytorch"`)
    PyTorch,

    /// Anything else
    Other(String),
}

impl ParallelMode {
    pub fn as_str(&self) -> &str {
        match self {
            ParallelMode::OpenMpi => "openmpi",
            ParallelMode::PyTorch => "pytorch",
            ParallelMode::Other(s) => s,
        }
    }
}

impl Default for ParallelMode {
    fn default() -> Self {
        ParallelMode::PyTorch
    }
}

impl From<String> for ParallelMode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "openmpi" => ParallelMode::OpenMpi,
            "pytorch" => ParallelMode::PyTorch,
            _ => ParallelMode::Other(s),
        }
    }
}

impl From<&str> for ParallelMode {
    fn from(s: &str) -> Self {
        ParallelMode::from(s.to_string())
    }
}

impl From<ParallelMode> for String {
    fn from(mode: ParallelMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ParallelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a folder input is made available to the job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    #[serde(rename = "ro_mount")]
    ReadOnlyMount,
}

/// How a folder output is written back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    #[serde(rename = "rw_mount")]
    ReadWriteMount,
}

/// Input binding descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobInput {
    /// Folder at a storage URI
    UriFolder { path: String, mode: InputMode },

    /// Integer scalar with a default value
    Integer { default: i64 },
}

impl JobInput {
    /// Integer default, if this is a scalar input
    pub fn integer_default(&self) -> Option<i64> {
        match self {
            JobInput::Integer { default } => Some(*default),
            _ => None,
        }
    }
}

/// Output binding descriptor (always a folder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    /// Destination URI
    pub path: String,

    /// Write mode
    pub mode: OutputMode,

    /// Data asset name registered for the output
    pub name: Option<String>,
}

/// Identity the job runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    /// Submitting user's identity
    User,
}

/// Distribution descriptor attached to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Distribution {
    /// MPI launch
    Mpi { process_count_per_instance: u32 },

    /// PyTorch native launch
    PyTorch { process_count_per_instance: u32 },
}

impl Distribution {
    pub fn process_count_per_instance(&self) -> u32 {
        match self {
            Distribution::Mpi {
                process_count_per_instance,
            }
            | Distribution::PyTorch {
                process_count_per_instance,
            } => *process_count_per_instance,
        }
    }
}

/// Complete command job specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique job name (resource name on the platform)
    pub name: JobName,

    /// Human readable name shown in the studio
    pub display_name: String,

    /// Experiment the job is grouped under
    pub experiment_name: String,

    /// Code location
    pub code: String,

    /// Shell command; `${{inputs.*}}`/`${{outputs.*}}` are resolved remotely
    pub command: String,

    /// Environment reference
    pub environment: String,

    pub identity: Identity,

    pub tags: Tags,

    pub inputs: Inputs,

    pub outputs: Outputs,

    pub environment_variables: EnvironmentVariables,

    /// Number of nodes
    pub instance_count: u32,

    /// Shared memory size per container (e.g. "15g")
    pub shm_size: String,

    /// Compute target name
    pub compute: String,

    /// Distribution strategy; `None` runs one process per instance
    pub distribution: Option<Distribution>,
}

/// Handle returned by the platform for a submitted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    /// Job name
    pub name: JobName,

    /// Status reported at submission time
    pub status: String,

    /// Studio URL for following the job
    pub studio_url: Option<String>,

    /// When the submission was acknowledged
    pub submitted_at: DateTime<Utc>,
}
