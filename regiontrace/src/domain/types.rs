//! Domain types providing compile-time safety and self-documentation

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local thread tag
///
/// Small sequential number handed out the first time a thread asks for it.
/// Backends use it to keep per-thread stacks apart; it is NOT the kernel TID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadTag(pub u64);

impl ThreadTag {
    /// Tag of the calling thread
    #[must_use]
    pub fn current() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        thread_local! {
            static TAG: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
        }
        ThreadTag(TAG.with(|tag| *tag))
    }
}

impl fmt::Display for ThreadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T#{}", self.0)
    }
}

/// Binding name that holds the owning module of a namespace
pub const NAME_KEY: &str = "__name__";

/// Name bound by the main namespace
pub const MAIN_MODULE: &str = "__main__";

/// String-keyed bindings a unit of target code executes against
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace(BTreeMap<String, Value>);

impl Namespace {
    /// Namespace of an imported module
    #[must_use]
    pub fn module(name: &str) -> Self {
        let mut ns = Self::default();
        ns.set(NAME_KEY, Value::from(name));
        ns
    }

    /// Emulated top-level namespace for a script run as the main program
    #[must_use]
    pub fn main(file: &Path, argv: &[String]) -> Self {
        let mut ns = Self::module(MAIN_MODULE);
        ns.set("__file__", Value::from(file.to_string_lossy().into_owned()));
        ns.set("__package__", Value::Null);
        ns.set("__cached__", Value::Null);
        ns.set("argv", Value::from(argv.to_vec()));
        ns
    }

    /// Owning module, if the namespace binds one
    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.0.get(NAME_KEY).and_then(Value::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
