use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};

use tracing::debug;

use crate::error::MapperError;

use super::Entity;
use super::mapping::TableMapping;
use super::spec::CreateFlags;

type Slot = Arc<Mutex<Option<Arc<TableMapping>>>>;

static REGISTRY: LazyLock<RwLock<HashMap<(TypeId, CreateFlags), Slot>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Mapping for `T` under `flags`, built on first use and shared for the life of the process.
///
/// Each entry has its own initialisation lock, so building one type never blocks lookups of
/// another. A failed build is not cached.
///
/// # Errors
/// Returns [`MapperError::Schema`] when `T`'s declared shape is invalid.
pub fn mapping_for<T: Entity>(flags: CreateFlags) -> Result<Arc<TableMapping>, MapperError> {
    let key = (TypeId::of::<T>(), flags);
    let existing = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
        .cloned();
    let slot = match existing {
        Some(slot) => slot,
        None => Arc::clone(
            REGISTRY
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_default(),
        ),
    };

    let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(mapping) = entry.as_ref() {
        return Ok(Arc::clone(mapping));
    }
    let mapping = Arc::new(TableMapping::build(T::describe(), flags)?);
    debug!(
        table = mapping.table_name(),
        columns = mapping.columns().len(),
        "built table mapping"
    );
    *entry = Some(Arc::clone(&mapping));
    Ok(mapping)
}
