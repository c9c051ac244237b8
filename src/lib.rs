// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Asset Sets - typed asset caches with dependency invalidation
//!
//! - [`AssetSet`]: one ordered cache per asset type, get-or-construct by initializer hash
//! - [`DependencyValidation`]: freshness tokens forming a weak dependency graph
//! - [`AssetSetManager`]: registry of every set plus the per-frame barrier
//! - [`InvalidAssetManager`]: what's currently broken, for tooling
//! - [`AssetServices`]: the context object tying them together

pub mod asset_set;
pub mod compiler;
pub mod config;
pub mod construct;
pub mod depval;
pub mod error;
pub mod hash;
pub mod heap;
pub mod invalid;
pub mod manager;
pub mod marker;
pub mod services;

pub use asset_set::*;
pub use compiler::*;
pub use config::*;
pub use construct::*;
pub use depval::*;
pub use error::*;
pub use hash::*;
pub use heap::*;
pub use invalid::*;
pub use manager::*;
pub use marker::*;
pub use services::*;
