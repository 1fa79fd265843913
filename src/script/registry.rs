// src/script/registry.rs

//! Process builders for non-shell engines.
//!
//! An invocation line `command args...` is resolved against a
//! [`ParserRegistry`]; the builder registered for `command` turns the
//! arguments and the current `%define` values into processes.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::dag::{File, GridSpec, Process};
use crate::errors::{DagError, Result};

/// Values collected from `%define` lines so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defines {
    values: BTreeMap<String, Vec<String>>,
}

impl Defines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`. An empty value list defines a flag.
    pub fn set(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.values.insert(key.into(), values);
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// First value of `key` parsed as `T`; a bad value is an error naming
    /// the key.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.first(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                DagError::InvalidArguments(format!("invalid value for {key}: {raw}"))
            }),
        }
    }
}

/// Builds processes from invocation arguments.
pub type ProcessBuilder = fn(&[String], &Defines) -> Result<Vec<Process>>;

#[derive(Clone)]
pub struct ParserRegistry {
    builders: HashMap<String, ProcessBuilder>,
}

impl Default for ParserRegistry {
    /// Registry holding the builtin `job` builder.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("job", build_job);
        registry
    }
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, builder: ProcessBuilder) {
        self.builders.insert(name.into(), builder);
    }

    pub fn get(&self, name: &str) -> Option<ProcessBuilder> {
        self.builders.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn build(&self, name: &str, args: &[String], defines: &Defines) -> Result<Vec<Process>> {
        let builder = self
            .get(name)
            .ok_or_else(|| DagError::UnknownFunction(name.to_string()))?;
        builder(args, defines)
    }
}

fn file_list_arg(arg: &str) -> Vec<File> {
    if arg == "-" {
        return Vec::new();
    }
    arg.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(File::new)
        .collect()
}

/// `job <executable> <inputs|-> <outputs|-> [args...]`
///
/// Inputs and outputs are comma-separated; `-` means none. Resource fields
/// come from the defines `memory_limit`, `deadline`, `fpops_est`,
/// `fpops_bound`, `app`, `project_name`, `host` and `nproc`.
pub fn build_job(args: &[String], defines: &Defines) -> Result<Vec<Process>> {
    let [executable, inputs, outputs, rest @ ..] = args else {
        return Err(DagError::InvalidArguments(
            "job requires: <executable> <inputs|-> <outputs|-> [args...]".to_string(),
        ));
    };

    let mut spec = GridSpec::default();
    if let Some(v) = defines.parse::<u64>("memory_limit")? {
        spec.memory_bound = v;
    }
    if let Some(v) = defines.parse::<f64>("fpops_est")? {
        spec.fpops_est = v;
    }
    if let Some(v) = defines.parse::<f64>("fpops_bound")? {
        spec.fpops_bound = v;
    }
    spec.deadline = defines.parse::<u64>("deadline")?;
    spec.nproc = defines.parse::<u32>("nproc")?;
    spec.app = defines.first("app").map(str::to_string);
    spec.project_name = defines.first("project_name").map(str::to_string);
    spec.host = defines.first("host").map(str::to_string);

    let process = Process::grid(executable.clone(), rest.to_vec(), spec)
        .with_inputs(file_list_arg(inputs))
        .with_outputs(file_list_arg(outputs));
    Ok(vec![process])
}
