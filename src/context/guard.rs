//! Exit guards for scoped acquisition.
//!
//! A scope acquires before running its body and must release afterwards no
//! matter how the body ends. The normal path disarms the guard and releases
//! explicitly so release errors can be returned; the guard's `Drop` covers
//! panics and, for async scopes, a future dropped mid-body.

use crate::core::CtxError;
use tracing::warn;

/// What a context does when a scope is left without reaching its normal
/// release path.
pub(crate) trait ScopeExit {
    fn exit_on_drop(&mut self);
}

pub(crate) struct ExitGuard<'a, C: ScopeExit> {
    ctx: &'a mut C,
    armed: bool,
}

impl<'a, C: ScopeExit> ExitGuard<'a, C> {
    pub(crate) fn new(ctx: &'a mut C) -> Self {
        Self { ctx, armed: true }
    }

    pub(crate) fn ctx(&mut self) -> &mut C {
        &mut *self.ctx
    }

    /// Hand the context back for the normal release path.
    pub(crate) fn disarm(&mut self) -> &mut C {
        self.armed = false;
        &mut *self.ctx
    }
}

impl<C: ScopeExit> Drop for ExitGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.ctx.exit_on_drop();
        }
    }
}

/// Combine a scope body's outcome with the outcome of its release.
///
/// A body error takes precedence; a release error is only returned when the
/// body succeeded.
pub(crate) fn settle<R, E>(out: Result<R, E>, released: crate::core::Result<()>) -> Result<R, E>
where
    E: From<CtxError>,
{
    match (out, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!(error = %release_err, "release failed after scope body error");
            Err(err)
        }
    }
}
