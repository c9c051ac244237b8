//! Construction strategies
//!
//! The cache doesn't know how an asset is built; each call site picks a strategy.
//! [`Immediate`] forwards the initializers straight to the type's constructor.
//! [`Background`] hands them to an [`IntermediateCompiler`] and builds the asset
//! around the returned marker; the asset itself decides when to poll or stall.

use crate::asset_set::Asset;
use crate::compiler::{Artifact, CompileType, IntermediateCompiler};
use crate::error::Result;
use crate::marker::AssetMarker;

/// Asset that can be built synchronously from its initializers
pub trait ConstructFromInitializers: Asset + Sized {
    fn construct(initializers: &[&str]) -> Result<Self>;
}

/// Asset that wraps a background compile
pub trait ConstructFromMarker: Asset + Sized {
    /// Compile process that produces this asset's intermediate artifact
    const COMPILE_TYPE: CompileType;

    fn from_marker(initializers: &[&str], marker: AssetMarker<Artifact>) -> Result<Self>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstructMode {
    Immediate,
    Background,
}

/// Policy used by [`AssetSet::get_or_construct`](crate::AssetSet::get_or_construct)
pub trait ConstructionStrategy<T> {
    fn mode(&self) -> ConstructMode;

    /// Build a fresh instance; errors propagate to the caller unchanged
    fn construct(&self, initializers: &[&str]) -> Result<T>;
}

/// Build on the calling thread
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl<T: ConstructFromInitializers> ConstructionStrategy<T> for Immediate {
    fn mode(&self) -> ConstructMode {
        ConstructMode::Immediate
    }

    fn construct(&self, initializers: &[&str]) -> Result<T> {
        T::construct(initializers)
    }
}

/// Build around a pending background compile
#[derive(Clone, Copy)]
pub struct Background<'a> {
    compiler: &'a dyn IntermediateCompiler,
}

impl<'a> Background<'a> {
    pub fn new(compiler: &'a dyn IntermediateCompiler) -> Self {
        Self { compiler }
    }
}

impl<T: ConstructFromMarker> ConstructionStrategy<T> for Background<'_> {
    fn mode(&self) -> ConstructMode {
        ConstructMode::Background
    }

    fn construct(&self, initializers: &[&str]) -> Result<T> {
        let marker = self.compiler.prepare(T::COMPILE_TYPE, initializers)?;
        T::from_marker(initializers, marker)
    }
}
