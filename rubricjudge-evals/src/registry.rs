// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Keyed registry of inference engines
//!
//! Engines are expensive to build (HTTP pools, local model weights), so
//! callers share them through a registry owned by the inference boundary.
//! Judges receive an engine handle and never touch the registry.

use crate::llm_client::{engine_from_settings, InferenceEngine};
use dashmap::DashMap;
use rubricjudge_core::{InferenceSettings, RubricError};
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
pub struct EngineRegistry {
    engines: DashMap<String, Arc<dyn InferenceEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the engine stored under `key`, building it on first use
    ///
    /// The factory runs at most once per key even under concurrent callers.
    pub fn get_or_create<F>(&self, key: &str, factory: F) -> Result<Arc<dyn InferenceEngine>, RubricError>
    where
        F: FnOnce() -> Result<Arc<dyn InferenceEngine>, RubricError>,
    {
        if let Some(engine) = self.engines.get(key) {
            return Ok(engine.value().clone());
        }

        let entry = self.engines.entry(key.to_string());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(existing) => Ok(existing.get().clone()),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let engine = factory()?;
                info!("Registered inference engine '{}'", key);
                Ok(vacant.insert(engine).value().clone())
            }
        }
    }

    /// Engine for a configuration, keyed by provider, model and endpoint
    pub fn from_settings(
        &self,
        settings: &InferenceSettings,
    ) -> Result<Arc<dyn InferenceEngine>, RubricError> {
        let key = format!(
            "{:?}:{}:{}",
            settings.provider,
            settings.model,
            settings.base_url.as_deref().unwrap_or("default")
        );
        self.get_or_create(&key, || engine_from_settings(settings))
    }

    pub fn remove(&self, key: &str) -> Option<Arc<dyn InferenceEngine>> {
        self.engines.remove(key).map(|(_, engine)| engine)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}
