use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::feedback::Feedback;

#[cfg(feature = "cli")]
pub mod cli;
pub mod json;

/// Commands a UI can send to the [`Explorer`](crate::explorer::Explorer)
///
/// Commands without a variable name work on the current level of the navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ping,
    SetDebugFile(PathBuf),
    GetDebugFile,
    ListCompileUnits,
    ListChildren,
    StepInto(String),
    Back,
    Reset,
    Where,
    Show,
    CurrentType,
    GetType(String),
    EntryInfo(String),
    ReadVariable(Option<String>),
    SetVariable(Option<String>, Vec<u8>),
    GetField(String),
    SetField(String, u64),
    SetOffset(i64),
    Quit,
}

pub trait ExplorerUI {
    /// Presents the result of the last command and gets the next one
    fn process(&mut self, feedback: &Feedback) -> Result<Status>;
}
