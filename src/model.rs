use std::convert::Infallible;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use getset::{CopyGetters, Getters, Setters};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::regex;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProblemId(String);

impl<T: Into<String>> From<T> for ProblemId {
    fn from(id: T) -> Self {
        Self(id.into())
    }
}

impl FromStr for ProblemId {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl AsRef<str> for ProblemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProblemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Problem metadata kept next to the solution source. Loaded before a
/// submission and written back with the outcome afterwards.
#[derive(
    Serialize, Deserialize, Getters, CopyGetters, Setters, Debug, Clone, PartialEq, Eq, Hash,
)]
pub struct ProblemInfo {
    #[get = "pub"]
    id: ProblemId,
    #[get = "pub"]
    title: String,
    /// Language id as assigned by the judge's submit form.
    #[get_copy = "pub"]
    language_id: u32,
    #[get = "pub"]
    source_path: PathBuf,
    #[serde(default)]
    #[get_copy = "pub"]
    #[set = "pub"]
    accepted: bool,
    #[serde(default)]
    #[get = "pub"]
    #[set = "pub"]
    checksum: Option<String>,
}

impl ProblemInfo {
    pub const FILE_NAME: &'static str = ".bojsub.json";

    pub fn new(
        id: impl Into<ProblemId>,
        title: impl Into<String>,
        language_id: u32,
        source_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            language_id,
            source_path: source_path.into(),
            accepted: false,
            checksum: None,
        }
    }
}

/// Stored login material : the judge username and the auto-login cookie value.
#[derive(Deserialize, Getters, Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    #[get = "pub"]
    username: String,
    #[get = "pub"]
    token: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // never print the token
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"********")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    path: PathBuf,
    text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SolutionId(String);

impl SolutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl AsRef<str> for SolutionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SolutionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source visibility on the judge.
#[derive(
    Serialize,
    Deserialize,
    EnumString,
    EnumVariantNames,
    IntoStaticStr,
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CodeOpen {
    Open,
    Close,
    OnlyAccepted,
}

impl CodeOpen {
    /// Value expected by the judge's submit form.
    pub fn as_form_value(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::OnlyAccepted => "onlyaccepted",
        }
    }
}

impl Default for CodeOpen {
    fn default() -> Self {
        Self::Open
    }
}

impl fmt::Display for CodeOpen {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.into())
    }
}

/// Judging status as reported on the progress channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Verdict {
    Pending,
    Compiling,
    PreparingJudge,
    Judging { progress: Option<u8> },
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    OutputLimitExceeded,
    RuntimeError,
    CompileError,
    Other(String),
}

impl Verdict {
    /// In-progress statuses keep the listener waiting; everything else,
    /// including labels this tool does not know, ends the run.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Pending | Self::Compiling | Self::PreparingJudge | Self::Judging { .. } => false,
            _ => true,
        }
    }

    pub fn is_accepted(&self) -> bool {
        *self == Self::Accepted
    }
}

impl From<String> for Verdict {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Pending" | "Pending Rejudge" => Self::Pending,
            "Compiling" => Self::Compiling,
            "Preparing Judge" => Self::PreparingJudge,
            "Accepted" => Self::Accepted,
            "Wrong Answer" => Self::WrongAnswer,
            "Time Limit Exceeded" => Self::TimeLimitExceeded,
            "Memory Limit Exceeded" => Self::MemoryLimitExceeded,
            "Output Limit Exceeded" => Self::OutputLimitExceeded,
            "Runtime Error" => Self::RuntimeError,
            "Compile Error" => Self::CompileError,
            s if s.starts_with("Judging") => {
                let progress = regex!(r"(\d+)\s*%")
                    .captures(s)
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse().ok());
                Self::Judging { progress }
            }
            _ => Self::Other(label),
        }
    }
}

impl From<Verdict> for String {
    fn from(verdict: Verdict) -> Self {
        verdict.to_string()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Compiling => f.write_str("Compiling"),
            Self::PreparingJudge => f.write_str("Preparing Judge"),
            Self::Judging {
                progress: Some(progress),
            } => write!(f, "Judging {}%", progress),
            Self::Judging { progress: None } => f.write_str("Judging"),
            Self::Accepted => f.write_str("Accepted"),
            Self::WrongAnswer => f.write_str("Wrong Answer"),
            Self::TimeLimitExceeded => f.write_str("Time Limit Exceeded"),
            Self::MemoryLimitExceeded => f.write_str("Memory Limit Exceeded"),
            Self::OutputLimitExceeded => f.write_str("Output Limit Exceeded"),
            Self::RuntimeError => f.write_str("Runtime Error"),
            Self::CompileError => f.write_str("Compile Error"),
            Self::Other(label) => f.write_str(label),
        }
    }
}

/// One update received on the verdict channel.
#[derive(Serialize, Deserialize, Getters, CopyGetters, Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerdictMessage {
    #[get = "pub"]
    status: Verdict,
    /// Execution time in milliseconds, present on terminal messages.
    #[serde(default)]
    #[get_copy = "pub"]
    time: Option<u32>,
    /// Peak memory in kilobytes, present on terminal messages.
    #[serde(default)]
    #[get_copy = "pub"]
    memory: Option<u32>,
}

impl VerdictMessage {
    pub fn new(status: Verdict) -> Self {
        Self {
            status,
            time: None,
            memory: None,
        }
    }
}

impl fmt::Display for VerdictMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.time, self.memory) {
            (Some(time), Some(memory)) => {
                write!(f, "{} ({} ms, {} KB)", self.status, time, memory)
            }
            (Some(time), None) => write!(f, "{} ({} ms)", self.status, time),
            _ => write!(f, "{}", self.status),
        }
    }
}
