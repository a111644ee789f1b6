//! The contract user navigations implement, the registry that builds them
//! by `kind`, and the built-in `http` and `think` navigations.
mod builtins;
mod context;
mod registry;


use async_trait::async_trait;

use crate::error::NavigationError;

pub use builtins::{HttpNavigation, ThinkNavigation};
pub use context::{IterationContext, RequestSample, ThinkTime, WorkerIdentity};
pub use registry::{NavigationFactory, Registry};

/// User code one worker runs over and over.
///
/// `steps` is the iteration body. `setup` and `teardown` wrap it either on
/// every iteration or once per worker, depending on the hook policy.
/// `configure` runs once before the first iteration.
#[async_trait]
pub trait Navigation: Send {
    async fn configure(&mut self, _ctx: &mut IterationContext) -> Result<(), NavigationError> {
        Ok(())
    }

    async fn setup(&mut self, _ctx: &mut IterationContext) -> Result<(), NavigationError> {
        Ok(())
    }

    async fn steps(&mut self, ctx: &mut IterationContext) -> Result<(), NavigationError>;

    async fn teardown(&mut self, _ctx: &mut IterationContext) -> Result<(), NavigationError> {
        Ok(())
    }
}
