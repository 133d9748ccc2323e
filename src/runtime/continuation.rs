//! Continuations
//!
//! A continuation is a synthetic ask-capable actor whose state is a frame
//! captured by the caller. It is used as the `reply_to` of an ask. The frame
//! is moved in before the continuation's address exists, so no handler can
//! observe a partially built frame.

use super::actor::{Behavior, Kind, Shape, Turn};
use super::error::{ContractError, ContractResult};
use super::handle::Handle;
use super::Runtime;

impl Runtime {
    /// Create a reusable continuation owned by `owner`
    ///
    /// Every message sent to the returned handle runs `handler` with the
    /// frame. The continuation keeps `owner` reachable until it terminates.
    pub fn continue_with<S, F>(&self, owner: &Handle, frame: S, handler: F) -> ContractResult<Handle>
    where
        S: Send + 'static,
        F: FnMut(&Turn<'_>, &mut S, Option<Handle>, Handle) + Send + 'static,
    {
        self.continuation(owner, frame, handler, false)
    }

    /// Create a single-shot continuation owned by `owner`
    ///
    /// After its first delivery the continuation terminates and drops its
    /// frame; later sends come back `Delivery::Discarded`.
    pub fn continue_once<S, F>(&self, owner: &Handle, frame: S, handler: F) -> ContractResult<Handle>
    where
        S: Send + 'static,
        F: FnMut(&Turn<'_>, &mut S, Option<Handle>, Handle) + Send + 'static,
    {
        self.continuation(owner, frame, handler, true)
    }

    fn continuation<S, F>(
        &self,
        owner: &Handle,
        frame: S,
        mut handler: F,
        single_shot: bool,
    ) -> ContractResult<Handle>
    where
        S: Send + 'static,
        F: FnMut(&Turn<'_>, &mut S, Option<Handle>, Handle) + Send + 'static,
    {
        let Some(owner_id) = owner.address() else {
            return Err(ContractError::NotAnActor { found: owner.kind() });
        };
        let owner = owner.clone();
        let kind = Kind::Continuation {
            single_shot,
            owner: owner_id,
        };
        Ok(self.install(Shape::Ask, kind, move |_turn: &Turn<'_>| {
            let mut frame = frame;
            Behavior::Ask(Box::new(
                move |turn: &Turn<'_>, reply_to: Option<Handle>, payload: Handle| {
                    tracing::trace!(continuation = %turn.id(), owner = %owner, "continuation resumed");
                    handler(turn, &mut frame, reply_to, payload)
                },
            ))
        }))
    }
}
