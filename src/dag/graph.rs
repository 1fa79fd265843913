// src/dag/graph.rs

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::process::{Process, ProcessId};

/// Producer index: logical output name -> processes that write it.
///
/// Consumers find their producers by looking up their input names here, so
/// file edges never need to be stored on the processes themselves. Keys are
/// only present while at least one producer remains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Graph {
    producers: BTreeMap<String, Vec<ProcessId>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every output of `process`.
    pub fn add_process(&mut self, process: &Process) {
        for file in &process.output_files {
            let entry = self.producers.entry(file.logical_name.clone()).or_default();
            if !entry.contains(&process.id) {
                entry.push(process.id);
            }
        }
    }

    /// Drop `process` from every output list, removing keys left empty.
    pub fn remove_process(&mut self, process: &Process) {
        for file in &process.output_files {
            if let Some(ids) = self.producers.get_mut(&file.logical_name) {
                ids.retain(|id| *id != process.id);
                if ids.is_empty() {
                    self.producers.remove(&file.logical_name);
                }
            }
        }
    }

    /// Producers of a logical name; empty if nothing produces it.
    pub fn producers(&self, logical_name: &str) -> &[ProcessId] {
        self.producers
            .get(logical_name)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, logical_name: &str) -> bool {
        self.producers.contains_key(logical_name)
    }

    /// Whether `id` appears anywhere in the index.
    pub fn references(&self, id: ProcessId) -> bool {
        self.producers.values().any(|ids| ids.contains(&id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ProcessId])> {
        self.producers
            .iter()
            .map(|(name, ids)| (name.as_str(), ids.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    pub fn clear(&mut self) {
        self.producers.clear();
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, ids) in &self.producers {
            let ids: Vec<String> = ids.iter().map(ProcessId::to_string).collect();
            writeln!(f, "{name}: {}", ids.join(", "))?;
        }
        Ok(())
    }
}
