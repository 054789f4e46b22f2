//! Handler registry: binds request and event types to their handlers.
//!
//! Built once at process wiring time and shared by the dispatchers through
//! an `Arc`. Reads (resolution) vastly outnumber writes (registration), so
//! each table sits behind an `RwLock`: registration after startup is allowed
//! and is mutually exclusive with concurrent resolution.
//!
//! Resolution is a pure lookup. Handlers registered as instances are shared;
//! handlers registered through a factory are built by that factory on every
//! resolution, and by nothing else.

mod subscriber;

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::error::{DispatchError, RegistryError};
use crate::event::DomainEvent;
use crate::handler::{AnyEventHandler, CommandHandler, EventHandler, QueryHandler};
use crate::message::{Command, Query, RequestKind};

pub(crate) use subscriber::{ErasedSubscriber, ResolvedSubscriber};
use subscriber::{CatchAll, Typed};

type CommandFactory<C> = Arc<dyn Fn() -> Arc<dyn CommandHandler<Command = C>> + Send + Sync>;
type QueryFactory<Q> = Arc<dyn Fn() -> Arc<dyn QueryHandler<Query = Q>> + Send + Sync>;
type SubscriberFactory = Arc<dyn Fn() -> Arc<dyn ErasedSubscriber> + Send + Sync>;

/// Identifies one subscription, for [`HandlerRegistry::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// The single handler bound to a command or query type. `factory` holds a
/// `CommandFactory<C>` or `QueryFactory<Q>` for the keyed type.
struct RequestEntry {
    type_name: &'static str,
    factory: Box<dyn Any + Send + Sync>,
}

struct SubscriberEntry {
    id: SubscriptionId,
    name: String,
    factory: SubscriberFactory,
}

impl SubscriberEntry {
    fn resolve(&self) -> ResolvedSubscriber {
        ResolvedSubscriber {
            name: self.name.clone(),
            handler: (self.factory)(),
        }
    }
}

/// Maps request and event types to their registered handlers.
pub struct HandlerRegistry {
    commands: RwLock<HashMap<TypeId, RequestEntry>>,
    queries: RwLock<HashMap<TypeId, RequestEntry>>,
    subscribers: RwLock<HashMap<TypeId, Vec<SubscriberEntry>>>,
    catch_all: RwLock<Vec<SubscriberEntry>>,
    next_subscription: AtomicU64,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("commands", &self.registered_commands())
            .field("queries", &self.registered_queries())
            .field("subscribed_event_types", &read(&self.subscribers).len())
            .field("catch_all", &read(&self.catch_all).len())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry {
            commands: RwLock::new(HashMap::new()),
            queries: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            catch_all: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Bind a shared handler instance to its command type.
    ///
    /// Fails with [`RegistryError::DuplicateHandler`] if the command type
    /// already has a handler.
    pub fn register_command<H: CommandHandler>(&self, handler: H) -> Result<(), RegistryError> {
        let handler = Arc::new(handler);
        self.register_command_factory(move || Arc::clone(&handler))
    }

    /// Bind a handler factory to its command type. The factory runs on every
    /// resolution.
    pub fn register_command_factory<H, F>(&self, factory: F) -> Result<(), RegistryError>
    where
        H: CommandHandler,
        F: Fn() -> Arc<H> + Send + Sync + 'static,
    {
        let factory: CommandFactory<H::Command> =
            Arc::new(move || factory() as Arc<dyn CommandHandler<Command = H::Command>>);
        insert_request::<H::Command>(&self.commands, RequestKind::Command, Box::new(factory))
    }

    /// Remove the handler bound to `C`. Returns whether one was bound.
    pub fn unregister_command<C: Command>(&self) -> bool {
        remove_request::<C>(&self.commands, RequestKind::Command)
    }

    pub fn has_command_handler<C: Command>(&self) -> bool {
        read(&self.commands).contains_key(&TypeId::of::<C>())
    }

    /// Resolve the handler bound to `C`.
    pub fn resolve_command<C: Command>(
        &self,
    ) -> Result<Arc<dyn CommandHandler<Command = C>>, DispatchError> {
        let factory = lookup_request::<C, CommandFactory<C>>(&self.commands)?;
        Ok(factory())
    }

    /// Registered command type names, sorted.
    pub fn registered_commands(&self) -> Vec<&'static str> {
        sorted_names(&self.commands)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Bind a shared handler instance to its query type.
    pub fn register_query<H: QueryHandler>(&self, handler: H) -> Result<(), RegistryError> {
        let handler = Arc::new(handler);
        self.register_query_factory(move || Arc::clone(&handler))
    }

    /// Bind a handler factory to its query type.
    pub fn register_query_factory<H, F>(&self, factory: F) -> Result<(), RegistryError>
    where
        H: QueryHandler,
        F: Fn() -> Arc<H> + Send + Sync + 'static,
    {
        let factory: QueryFactory<H::Query> =
            Arc::new(move || factory() as Arc<dyn QueryHandler<Query = H::Query>>);
        insert_request::<H::Query>(&self.queries, RequestKind::Query, Box::new(factory))
    }

    pub fn unregister_query<Q: Query>(&self) -> bool {
        remove_request::<Q>(&self.queries, RequestKind::Query)
    }

    pub fn has_query_handler<Q: Query>(&self) -> bool {
        read(&self.queries).contains_key(&TypeId::of::<Q>())
    }

    pub fn resolve_query<Q: Query>(&self) -> Result<Arc<dyn QueryHandler<Query = Q>>, DispatchError> {
        let factory = lookup_request::<Q, QueryFactory<Q>>(&self.queries)?;
        Ok(factory())
    }

    pub fn registered_queries(&self) -> Vec<&'static str> {
        sorted_names(&self.queries)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Add a subscriber for event type `E`. Subscribers are invoked in
    /// registration order.
    pub fn subscribe<E, H>(&self, handler: H) -> SubscriptionId
    where
        E: DomainEvent,
        H: EventHandler<E>,
    {
        let name = handler.name().to_string();
        let erased: Arc<dyn ErasedSubscriber> = Arc::new(Typed::<E, H>::new(Arc::new(handler)));
        self.add_subscriber(TypeId::of::<E>(), type_name::<E>(), name, Arc::new(move || Arc::clone(&erased)))
    }

    /// Add a subscriber for `E` built by `factory` on every publication.
    pub fn subscribe_factory<E, H, F>(&self, factory: F) -> SubscriptionId
    where
        E: DomainEvent,
        H: EventHandler<E>,
        F: Fn() -> Arc<H> + Send + Sync + 'static,
    {
        let factory: SubscriberFactory =
            Arc::new(move || Arc::new(Typed::<E, H>::new(factory())) as Arc<dyn ErasedSubscriber>);
        self.add_subscriber(TypeId::of::<E>(), type_name::<E>(), type_name::<H>().to_string(), factory)
    }

    /// Add a subscriber that receives every published event. Catch-all
    /// subscribers run after the subscribers of the event's own type.
    pub fn subscribe_all<H: AnyEventHandler>(&self, handler: H) -> SubscriptionId {
        let name = handler.name().to_string();
        let erased: Arc<dyn ErasedSubscriber> = Arc::new(CatchAll::new(Arc::new(handler)));
        let id = self.next_subscription_id();
        info!(subscriber = %name, "registered catch-all subscriber");
        write(&self.catch_all).push(SubscriberEntry {
            id,
            name,
            factory: Arc::new(move || Arc::clone(&erased)),
        });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        {
            let mut subscribers = write(&self.subscribers);
            for entries in subscribers.values_mut() {
                if let Some(pos) = entries.iter().position(|e| e.id == id) {
                    entries.remove(pos);
                    return true;
                }
            }
        }
        let mut catch_all = write(&self.catch_all);
        match catch_all.iter().position(|e| e.id == id) {
            Some(pos) => {
                catch_all.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of subscribers registered for `E`, not counting catch-all
    /// subscribers.
    pub fn subscriber_count<E: DomainEvent>(&self) -> usize {
        read(&self.subscribers)
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Subscribers for one event, in invocation order: the event type's own
    /// subscribers by registration, then catch-all subscribers. Empty is
    /// valid and means the publication is a no-op.
    pub(crate) fn resolve_subscribers(&self, event: &dyn DomainEvent) -> Vec<ResolvedSubscriber> {
        let mut resolved: Vec<ResolvedSubscriber> = read(&self.subscribers)
            .get(&event.concrete_type_id())
            .map(|entries| entries.iter().map(SubscriberEntry::resolve).collect())
            .unwrap_or_default();
        resolved.extend(read(&self.catch_all).iter().map(SubscriberEntry::resolve));
        resolved
    }

    fn add_subscriber(
        &self,
        event_type: TypeId,
        event_name: &'static str,
        name: String,
        factory: SubscriberFactory,
    ) -> SubscriptionId {
        let id = self.next_subscription_id();
        info!(event = event_name, subscriber = %name, "registered event subscriber");
        write(&self.subscribers)
            .entry(event_type)
            .or_default()
            .push(SubscriberEntry { id, name, factory });
        id
    }

    fn next_subscription_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed))
    }
}

fn insert_request<R: 'static>(
    table: &RwLock<HashMap<TypeId, RequestEntry>>,
    kind: RequestKind,
    factory: Box<dyn Any + Send + Sync>,
) -> Result<(), RegistryError> {
    let request_type = type_name::<R>();
    let mut table = write(table);
    if table.contains_key(&TypeId::of::<R>()) {
        return Err(RegistryError::DuplicateHandler { kind, request_type });
    }
    table.insert(
        TypeId::of::<R>(),
        RequestEntry {
            type_name: request_type,
            factory,
        },
    );
    info!(%kind, request = request_type, "registered handler");
    Ok(())
}

fn remove_request<R: 'static>(table: &RwLock<HashMap<TypeId, RequestEntry>>, kind: RequestKind) -> bool {
    let removed = write(table).remove(&TypeId::of::<R>()).is_some();
    if removed {
        debug!(%kind, request = type_name::<R>(), "unregistered handler");
    }
    removed
}

/// Clone the stored factory out of the table so it runs without the lock
/// held.
fn lookup_request<R: 'static, F: Clone + 'static>(
    table: &RwLock<HashMap<TypeId, RequestEntry>>,
) -> Result<F, DispatchError> {
    let no_handler = || DispatchError::NoHandler {
        request_type: type_name::<R>(),
    };
    let table = read(table);
    let entry = table.get(&TypeId::of::<R>()).ok_or_else(no_handler)?;
    entry.factory.downcast_ref::<F>().cloned().ok_or_else(no_handler)
}

fn sorted_names(table: &RwLock<HashMap<TypeId, RequestEntry>>) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = read(table).values().map(|e| e.type_name).collect();
    names.sort_unstable();
    names
}

// Every write leaves the tables consistent, so a poisoned lock is still safe
// to use.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
