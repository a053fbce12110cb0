//! Lifecycle hook points around record persistence.

use super::{ModelResult, Record};

/// Per-model lifecycle callbacks. Every hook defaults to a no-op; an
/// error returned from a hook aborts the surrounding operation.
///
/// Order during `save`: `pre_save`, `pre_insert`/`pre_update`, filter
/// hooks, the write, `post_insert`/`post_update`, `post_save`, then
/// `pre_save_related`, each related save, `post_save_related`.
pub trait RecordHooks {
    fn pre_save(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn post_save(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn pre_insert(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn post_insert(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn pre_update(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn post_update(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn pre_save_related(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn post_save_related(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn pre_delete(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn post_delete(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn pre_filter(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }

    fn post_filter(&self, _record: &mut Record) -> ModelResult<()> {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl RecordHooks for NoHooks {}
