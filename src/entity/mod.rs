//! Entity capabilities and the per-kind adapters
//!
//! The engine is generic over two capabilities: producing a stable id, and
//! naming the kind whose durable table receives the flush. Each concrete
//! entity only supplies those two facts.

use crate::core::EntityKind;

/// Anything with a stable identifier string
pub trait Identifiable {
    fn impression_id(&self) -> String;
}

/// Entities whose impressions column can be durably incremented
pub trait DurablyIncrementable {
    const KIND: EntityKind;

    fn impression_table() -> &'static str {
        Self::KIND.table()
    }
}

impl<T: Identifiable> Identifiable for &T {
    fn impression_id(&self) -> String {
        (**self).impression_id()
    }
}

impl<T: DurablyIncrementable> DurablyIncrementable for &T {
    const KIND: EntityKind = T::KIND;
}

/// Binds an entity type to its kind and generates the engine's
/// `record_<kind>_impressions` entry point.
macro_rules! impression_entity {
    ($ty:ident, $name:ident, $kind:expr) => {
        impl $crate::entity::Identifiable for $ty {
            fn impression_id(&self) -> String {
                self.id.to_string()
            }
        }

        impl $crate::entity::DurablyIncrementable for $ty {
            const KIND: $crate::core::EntityKind = $kind;
        }

        paste::paste! {
            impl $crate::engine::ImpressionEngine {
                #[doc = "Record one view for each `" $ty "` in a listing response."]
                pub fn [<record_ $name _impressions>](&self, items: &[$ty]) {
                    self.record_impressions(items);
                }
            }
        }
    };
}

mod models;

pub use models::{Event, Opening, Post, Project, User};
