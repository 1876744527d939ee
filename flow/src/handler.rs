//! Action handlers, typed adapters and the action router.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::action::Action;
use crate::context::Context;
use crate::error::FlowError;
use crate::types::{ActionType, Event};

/// What a handler produces: the event fed to the transition table (or
/// `None` for no event) plus the flow's next internal data.
pub type HandlerResult<D> = Result<(Option<Event>, D), FlowError>;

/// Turns an action into an event and the next internal data.
///
/// On error the flow stays in its current state and keeps its current
/// data. A `None` event also keeps the state, but commits the returned
/// data.
#[async_trait]
pub trait ActionHandler<D>: Send + Sync {
    async fn handle(&self, ctx: &Context, data: &D, action: &dyn Action) -> HandlerResult<D>;
}

/// Adapter produced by [`typed`]: downcasts the incoming action to a
/// concrete type before invoking the wrapped function.
pub struct TypedHandler<A, F> {
    handler: F,
    _action: PhantomData<fn(A)>,
}

/// Lift a function over a concrete action type into a generic handler.
///
/// The returned handler fails with [`FlowError::InvalidActionType`] when
/// the runtime action is not an `A`:
///
/// ```rust,ignore
/// let handler = typed(|_ctx, data: &OrderData, payment: &PaymentAction| {
///     // payment is already the concrete type
///     Ok((Some("OrderPaid".into()), data.clone()))
/// });
/// ```
pub fn typed<D, A, F>(handler: F) -> Arc<dyn ActionHandler<D>>
where
    D: Send + Sync + 'static,
    A: Action,
    F: Fn(&Context, &D, &A) -> HandlerResult<D> + Send + Sync + 'static,
{
    Arc::new(TypedHandler {
        handler,
        _action: PhantomData,
    })
}

#[async_trait]
impl<D, A, F> ActionHandler<D> for TypedHandler<A, F>
where
    D: Send + Sync,
    A: Action,
    F: Fn(&Context, &D, &A) -> HandlerResult<D> + Send + Sync,
{
    async fn handle(&self, ctx: &Context, data: &D, action: &dyn Action) -> HandlerResult<D> {
        let Some(action) = action.downcast_ref::<A>() else {
            return Err(FlowError::InvalidActionType(action.action_type()));
        };
        (self.handler)(ctx, data, action)
    }
}

/// Action-type → handler mapping.
pub type ActionRoutes<D> = HashMap<ActionType, Arc<dyn ActionHandler<D>>>;

/// Dispatches actions to per-type handlers.
///
/// The router is itself an [`ActionHandler`], so a state that must accept
/// several action types installs one router:
///
/// ```rust,ignore
/// let router = ActionRouter::new()
///     .route("PayForOrder", typed(handle_payment))
///     .route("CancelOrder", typed(handle_cancelation));
/// let config = StateConfig::new().handler(Arc::new(router));
/// ```
pub struct ActionRouter<D> {
    routes: ActionRoutes<D>,
}

impl<D> Default for ActionRouter<D> {
    fn default() -> Self {
        Self {
            routes: ActionRoutes::new(),
        }
    }
}

impl<D> ActionRouter<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: ActionRoutes<D>) -> Self {
        Self { routes }
    }

    /// Add a route, builder style.
    pub fn route(
        mut self,
        action_type: impl Into<ActionType>,
        handler: Arc<dyn ActionHandler<D>>,
    ) -> Self {
        self.routes.insert(action_type.into(), handler);
        self
    }

    pub fn add_route(
        &mut self,
        action_type: impl Into<ActionType>,
        handler: Arc<dyn ActionHandler<D>>,
    ) {
        self.routes.insert(action_type.into(), handler);
    }

    pub fn add_routes(&mut self, routes: ActionRoutes<D>) {
        self.routes.extend(routes);
    }
}

#[async_trait]
impl<D: Send + Sync> ActionHandler<D> for ActionRouter<D> {
    async fn handle(&self, ctx: &Context, data: &D, action: &dyn Action) -> HandlerResult<D> {
        let action_type = action.action_type();
        match self.routes.get(&action_type) {
            Some(handler) => handler.handle(ctx, data, action).await,
            None => Err(FlowError::NoRoute(action_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Ping;

    impl Action for Ping {
        fn action_type(&self) -> ActionType {
            ActionType::from_static("Ping")
        }
    }

    #[derive(Debug, Clone)]
    struct Pong;

    impl Action for Pong {
        fn action_type(&self) -> ActionType {
            ActionType::from_static("Pong")
        }
    }

    #[tokio::test]
    async fn test_typed_handler_accepts_matching_action() {
        let handler = typed(|_ctx, count: &u32, _ping: &Ping| Ok((Some("Pinged".into()), count + 1)));

        let ctx = Context::background();
        let (event, data) = handler.handle(&ctx, &1, &Ping).await.unwrap();
        assert_eq!(event, Some(Event::from("Pinged")));
        assert_eq!(data, 2);
    }

    #[tokio::test]
    async fn test_typed_handler_rejects_other_action() {
        let handler = typed(|_ctx, count: &u32, _ping: &Ping| Ok((None, *count)));

        let ctx = Context::background();
        let err = handler.handle(&ctx, &1, &Pong).await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidActionType(t) if t.as_str() == "Pong"));
    }

    #[tokio::test]
    async fn test_router_dispatches_by_action_type() {
        let router: ActionRouter<u32> = ActionRouter::new()
            .route("Ping", typed(|_ctx, n: &u32, _a: &Ping| Ok((None, n + 1))))
            .route("Pong", typed(|_ctx, n: &u32, _a: &Pong| Ok((None, n + 10))));

        let ctx = Context::background();
        let (_, after_ping) = router.handle(&ctx, &0, &Ping).await.unwrap();
        let (_, after_pong) = router.handle(&ctx, &0, &Pong).await.unwrap();
        assert_eq!(after_ping, 1);
        assert_eq!(after_pong, 10);
    }

    #[tokio::test]
    async fn test_router_unknown_action_type() {
        let router: ActionRouter<u32> = ActionRouter::new();
        let ctx = Context::background();
        let err = router.handle(&ctx, &0, &Ping).await.unwrap_err();
        assert!(matches!(err, FlowError::NoRoute(t) if t.as_str() == "Ping"));
    }
}
