//! Type-erased view of an asset set plus the report logging seam

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Write as _;
use std::sync::Arc;

/// One cached entry as seen by diagnostics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub hash: u64,
    /// Only present when names are being recorded
    pub name: Option<String>,
}

impl AssetRecord {
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("<{:#018x}>", self.hash),
        }
    }
}

/// Capabilities every cached type exposes to the [`AssetSetManager`](crate::AssetSetManager)
pub trait AssetHeap: Any + Send + Sync {
    fn type_code(&self) -> u64;

    fn type_name(&self) -> &'static str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached instance
    fn clear(&self);

    /// Entries in hash order
    fn records(&self) -> Vec<AssetRecord>;

    /// Count-then-enumerate dump of this set
    fn log_report(&self, log: &mut dyn AssetLog) {
        let records = self.records();
        log.log_header(records.len(), self.type_name());
        for (index, record) in records.iter().enumerate() {
            log.log_asset_name(index, &record.display_name());
        }
    }

    /// Used to recover the concrete set
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Logging collaborator consumed by report dumps
pub trait AssetLog {
    fn log_header(&mut self, count: usize, type_name: &str);
    fn log_asset_name(&mut self, index: usize, name: &str);
}

/// Sends report lines to `tracing` at info level
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

impl AssetLog for TracingLog {
    fn log_header(&mut self, count: usize, type_name: &str) {
        tracing::info!("{count} assets of type {type_name}");
    }

    fn log_asset_name(&mut self, index: usize, name: &str) {
        tracing::info!("  [{index}] {name}");
    }
}

/// Collects the report as plain text
#[derive(Clone, Debug, Default)]
pub struct TextLog {
    pub text: String,
}

impl TextLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetLog for TextLog {
    fn log_header(&mut self, count: usize, type_name: &str) {
        let _ = writeln!(self.text, "{count} assets of type {type_name}");
    }

    fn log_asset_name(&mut self, index: usize, name: &str) {
        let _ = writeln!(self.text, "  [{index}] {name}");
    }
}
