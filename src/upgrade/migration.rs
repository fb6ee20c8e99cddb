// ABOUTME: Data directory migration parameterized by state marker.
// ABOUTME: Carries the run's context and the captured locale between steps.

use std::marker::PhantomData;

use super::context::UpgradeContext;
use super::locale::ClusterLocale;
use super::state::Pending;

/// A data directory migration in progress, parameterized by its current state.
///
/// Each step consumes the migration and returns it in the next state, so
/// steps cannot run out of order and the swap cannot happen before the new
/// cluster exists.
#[derive(Debug)]
pub struct Migration<S> {
    pub(crate) ctx: UpgradeContext,
    pub(crate) locale: Option<ClusterLocale>,
    pub(crate) _state: PhantomData<S>,
}

impl Migration<Pending> {
    pub fn new(ctx: UpgradeContext) -> Self {
        Migration {
            ctx,
            locale: None,
            _state: PhantomData,
        }
    }
}

impl<S> Migration<S> {
    /// Internal helper to transition to a new state.
    pub(super) fn transition<T>(self) -> Migration<T> {
        Migration {
            ctx: self.ctx,
            locale: self.locale,
            _state: PhantomData,
        }
    }
}
