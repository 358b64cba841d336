//! The module-variant model.
//!
//! Split phases turn each declaration into [`Variant`]s: shallow copies
//! of the declarative properties plus a growing axis tuple. A variant
//! owns nothing but its identity and its decl snapshot; computed
//! outputs live with the assembler so the pipeline stays snapshot-pure.

use std::sync::Arc;

use serde::Serialize;

use crate::core::decl::ModuleDecl;
use crate::core::module_id::ModuleId;
use crate::core::variant::VariantKey;
use crate::util::Symbol;

/// Lifecycle of a module variant through evaluation.
///
/// A variant only moves forward. When a step fails, the variant stays
/// at the stage it reached; it produces nothing further but does not
/// block siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Declared,
    Split,
    DepsResolved,
    Assembled,
    Published,
}

/// One concrete configuration instance of a declared module.
#[derive(Debug, Clone)]
pub struct Variant {
    /// Identity: (name, variant tuple), interned.
    pub id: ModuleId,
    /// Shared snapshot of the declarative properties.
    pub decl: Arc<ModuleDecl>,
}

impl Variant {
    /// The initial, unsplit variant of a declaration.
    pub fn declared(decl: Arc<ModuleDecl>) -> Variant {
        let id = ModuleId::new(&decl.name, VariantKey::empty());
        Variant { id, decl }
    }

    /// A copy of this variant re-keyed with a new tuple.
    pub fn with_key(&self, key: VariantKey) -> Variant {
        Variant {
            id: ModuleId::new(self.name(), key),
            decl: Arc::clone(&self.decl),
        }
    }

    pub fn name(&self) -> Symbol {
        self.id.name()
    }

    pub fn key(&self) -> &VariantKey {
        self.id.variant()
    }
}
