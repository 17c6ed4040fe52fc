// ── Concurrent stores ──

mod collection;

pub(crate) use collection::EntityCollection;
