//! Call-script model
//!
//! A call script describes a target program as named functions and a main
//! body. It is the program format the command-line tool runs.
//!
//! ```json
//! {
//!   "imports": ["helpers"],
//!   "functions": {
//!     "f": { "body": [{ "call": "h" }] },
//!     "g": {},
//!     "h": { "module": "helpers" }
//!   },
//!   "main": [{ "call": "f" }, { "call": "g" }]
//! }
//! ```

use regiontrace_common::{ParamValue, SourceLocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::ScriptError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Modules loaded before `main` starts
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub functions: BTreeMap<String, Function>,
    #[serde(default)]
    pub main: Vec<Stmt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Function {
    /// Owning module; defaults to the main namespace's module
    #[serde(default)]
    pub module: Option<String>,
    /// Defined in a namespace without a module name
    #[serde(default)]
    pub anonymous: bool,
    /// Definition site, forwarded to the backend on every call
    #[serde(default)]
    pub location: Option<SourceLocation>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    /// Call a function by name
    Call(String),
    /// Load a module
    Import(String),
    /// Raise an exception that unwinds until a `try`
    Raise(String),
    /// Request program exit
    Exit(i32),
    /// Run a block, handling exceptions raised inside it
    Try(Vec<Stmt>),
    /// Run a block on a worker thread and join it
    Spawn(Vec<Stmt>),
    /// Bind a value in the local namespace
    Assign { name: String, value: serde_json::Value },
    /// Switch backend recording on or off
    Record(bool),
    /// Attach a user parameter to the current region
    Param { name: String, value: ParamValue },
    /// Run a block inside an explicit user region
    Region {
        name: String,
        #[serde(default)]
        body: Vec<Stmt>,
    },
}

impl Script {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Read and parse a call script
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ScriptError::Read { path: path.to_path_buf(), source })?;
        Self::parse(&text).map_err(|source| ScriptError::Parse { path: path.to_path_buf(), source })
    }
}
