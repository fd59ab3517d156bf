//! The bus: contexts, queues, distribution, and dispatch.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{MessagingError, MessagingResult};
use crate::events::{EventCtx, EventId, EventListener};
use crate::message::{
    HandlerId, Message, MessageHandler, MessageOptions, MessageType, PRIORITY_CUSTOM,
    PRIORITY_EVENT, PRIORITY_INTERNAL,
};

// ── ContextId ─────────────────────────────────────────────────────────────────

/// Identity of a registered thread context.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

/// Distinguishes bus instances in the per-thread binding list, so a thread
/// can participate in more than one bus (two simulations in one process)
/// without the bindings colliding.
static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// (bus id, context) bindings of the current OS thread.
    static THREAD_BINDINGS: RefCell<Vec<(u64, ContextId)>> = const { RefCell::new(Vec::new()) };
}

// ── Queue entries ─────────────────────────────────────────────────────────────

enum Payload {
    /// An addressed handler message.
    Handler {
        target: HandlerId,
        message_type: MessageType,
        message: Arc<dyn Message>,
        process_on_main: bool,
    },
    /// An event publication, fanned out to subscribers at distribution.
    Event {
        id: EventId,
        ctx: Option<EventCtx>,
        args: Arc<dyn Message>,
    },
    /// Internal control: detach every listener of an event id.
    UnsubscribeAll { id: EventId, ctx: Option<EventCtx> },
}

struct OutgoingEntry {
    priority: u32,
    /// Simulation time before which this entry stays in the global queue.
    deliver_at_ms: u64,
    payload: Payload,
}

enum InputEntry {
    Message {
        handler: Arc<dyn MessageHandler>,
        message_type: MessageType,
        message: Arc<dyn Message>,
    },
    Event {
        listener: Arc<dyn EventListener>,
        id: EventId,
        ctx: Option<EventCtx>,
        args: Arc<dyn Message>,
    },
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct ThreadContext {
    outgoing: Mutex<Vec<OutgoingEntry>>,
    input: Mutex<VecDeque<InputEntry>>,
}

struct HandlerEntry {
    handler: Arc<dyn MessageHandler>,
    ctx: ContextId,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Binding {
    Global,
    Ctx(EventCtx),
}

impl Binding {
    fn matches(self, published: Option<EventCtx>) -> bool {
        match (self, published) {
            // Global publications reach every binding; global bindings
            // hear every publication.
            (Binding::Global, _) | (_, None) => true,
            (Binding::Ctx(bound), Some(published)) => bound == published,
        }
    }
}

struct Subscription {
    listener: Arc<dyn EventListener>,
    binding: Binding,
    thread_ctx: ContextId,
}

#[derive(Default)]
struct Registry {
    contexts: BTreeMap<ContextId, Arc<ThreadContext>>,
    main_ctx: Option<ContextId>,
    handlers: HashMap<HandlerId, HandlerEntry>,
    subscriptions: HashMap<EventId, Vec<Subscription>>,
    /// Time-offset messages waiting in the global queue.
    deferred: Vec<OutgoingEntry>,
    next_context: u64,
    next_handler: u64,
}

// ── MessageBus ────────────────────────────────────────────────────────────────

/// See the [crate docs](crate) for the delivery protocol.
pub struct MessageBus {
    bus_id: u64,
    /// Simulation time as of the most recent distribution; anchors
    /// `time_offset_ms` arithmetic for posts made during the current tick.
    now_ms: AtomicU64,
    registry: RwLock<Registry>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            bus_id: NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed),
            now_ms: AtomicU64::new(0),
            registry: RwLock::new(Registry::default()),
        }
    }

    // ── Thread registration ───────────────────────────────────────────────

    /// Register the calling thread as this bus's main thread.  Must run on
    /// the thread that will later call [`distribute_messages`](Self::distribute_messages).
    pub fn register_main_thread(&self) -> MessagingResult<ContextId> {
        if self.registry.read().main_ctx.is_some() {
            return Err(MessagingError::MainAlreadyRegistered);
        }
        self.register_thread_inner(true)
    }

    /// Create a context for the calling thread.
    pub fn register_thread(&self) -> MessagingResult<ContextId> {
        self.register_thread_inner(false)
    }

    fn register_thread_inner(&self, is_main: bool) -> MessagingResult<ContextId> {
        if self.current_context().is_some() {
            return Err(MessagingError::ThreadAlreadyRegistered);
        }
        let mut reg = self.registry.write();
        reg.next_context += 1;
        let ctx = ContextId(reg.next_context);
        reg.contexts.insert(
            ctx,
            Arc::new(ThreadContext {
                outgoing: Mutex::new(Vec::new()),
                input: Mutex::new(VecDeque::new()),
            }),
        );
        if is_main {
            reg.main_ctx = Some(ctx);
        }
        drop(reg);
        THREAD_BINDINGS.with(|b| b.borrow_mut().push((self.bus_id, ctx)));
        Ok(ctx)
    }

    /// Destroy the calling thread's context.  Pending input for the
    /// context is discarded; handlers still bound to it become
    /// undeliverable and are dropped at the next distribution.
    pub fn unregister_thread(&self) -> MessagingResult<()> {
        let ctx = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let mut reg = self.registry.write();
        reg.contexts.remove(&ctx);
        if reg.main_ctx == Some(ctx) {
            reg.main_ctx = None;
        }
        drop(reg);
        THREAD_BINDINGS.with(|b| {
            b.borrow_mut()
                .retain(|&(bus, c)| bus != self.bus_id || c != ctx)
        });
        Ok(())
    }

    /// The calling thread's context on this bus, if registered.
    pub fn current_context(&self) -> Option<ContextId> {
        THREAD_BINDINGS.with(|b| {
            b.borrow()
                .iter()
                .find(|&&(bus, _)| bus == self.bus_id)
                .map(|&(_, ctx)| ctx)
        })
    }

    // ── Handler registration ──────────────────────────────────────────────

    /// Bind `handler` to the calling thread's context and return its
    /// addressing token.
    pub fn register_handler(
        &self,
        handler: Arc<dyn MessageHandler>,
    ) -> MessagingResult<HandlerId> {
        let ctx = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let mut reg = self.registry.write();
        reg.next_handler += 1;
        let id = HandlerId(reg.next_handler);
        reg.handlers.insert(id, HandlerEntry { handler, ctx });
        Ok(id)
    }

    pub fn unregister_handler(&self, id: HandlerId) -> MessagingResult<()> {
        let mut reg = self.registry.write();
        reg.handlers
            .remove(&id)
            .map(|_| ())
            .ok_or(MessagingError::UnknownHandler(id))
    }

    /// Move an already-registered handler to another context.  For agents
    /// managed by other agents, where the managing entity knows the right
    /// context; the caller is responsible for passing a context whose
    /// thread will actually dispatch.
    pub fn re_register_handler(&self, id: HandlerId, new_ctx: ContextId) -> MessagingResult<()> {
        let mut reg = self.registry.write();
        if !reg.contexts.contains_key(&new_ctx) {
            return Err(MessagingError::UnknownContext(new_ctx));
        }
        match reg.handlers.get_mut(&id) {
            Some(entry) => {
                entry.ctx = new_ctx;
                Ok(())
            }
            None => Err(MessagingError::UnknownHandler(id)),
        }
    }

    /// The context a handler is currently bound to.
    pub fn handler_context(&self, id: HandlerId) -> Option<ContextId> {
        self.registry.read().handlers.get(&id).map(|e| e.ctx)
    }

    // ── Sending ───────────────────────────────────────────────────────────

    /// Enqueue a message on the calling thread's outgoing queue.  Delivery
    /// happens after the next distribute + dispatch pair (later, if
    /// `time_offset_ms` defers it).
    pub fn post_message(
        &self,
        target: HandlerId,
        message_type: MessageType,
        message: Arc<dyn Message>,
        options: MessageOptions,
    ) -> MessagingResult<()> {
        let ctx = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let reg = self.registry.read();
        if !reg.handlers.contains_key(&target) {
            return Err(MessagingError::UnknownHandler(target));
        }
        let sender = reg
            .contexts
            .get(&ctx)
            .cloned()
            .ok_or(MessagingError::UnknownContext(ctx))?;
        drop(reg);

        sender.outgoing.lock().push(OutgoingEntry {
            priority: PRIORITY_CUSTOM,
            deliver_at_ms: self.now_ms.load(Ordering::Relaxed) + options.time_offset_ms,
            payload: Payload::Handler {
                target,
                message_type,
                message,
                process_on_main: options.process_on_main,
            },
        });
        Ok(())
    }

    /// Invoke the target handler synchronously, in-line, on the calling
    /// thread.  Legal only when the target shares the caller's context.
    pub fn send_instantaneous_message(
        &self,
        target: HandlerId,
        message_type: MessageType,
        message: Arc<dyn Message>,
    ) -> MessagingResult<()> {
        let caller_ctx = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let handler = {
            let reg = self.registry.read();
            let entry = reg
                .handlers
                .get(&target)
                .ok_or(MessagingError::UnknownHandler(target))?;
            if entry.ctx != caller_ctx {
                return Err(MessagingError::CrossContext {
                    target,
                    target_ctx: entry.ctx,
                    caller_ctx,
                });
            }
            entry.handler.clone()
        };
        handler.handle_message(message_type, message);
        Ok(())
    }

    /// Instantaneous when the target shares the caller's context, posted
    /// otherwise.
    pub fn send_message(
        &self,
        target: HandlerId,
        message_type: MessageType,
        message: Arc<dyn Message>,
    ) -> MessagingResult<()> {
        let caller_ctx = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let same_ctx = {
            let reg = self.registry.read();
            let entry = reg
                .handlers
                .get(&target)
                .ok_or(MessagingError::UnknownHandler(target))?;
            entry.ctx == caller_ctx
        };
        if same_ctx {
            self.send_instantaneous_message(target, message_type, message)
        } else {
            self.post_message(target, message_type, message, MessageOptions::default())
        }
    }

    // ── Events ────────────────────────────────────────────────────────────

    /// Subscribe `listener` to every publication of `id`.
    pub fn subscribe_event(
        &self,
        id: EventId,
        listener: &Arc<dyn EventListener>,
    ) -> MessagingResult<()> {
        self.subscribe(id, Binding::Global, listener)
    }

    /// Subscribe `listener` to publications of `id` carrying `ctx`.
    pub fn subscribe_event_ctx(
        &self,
        id: EventId,
        ctx: EventCtx,
        listener: &Arc<dyn EventListener>,
    ) -> MessagingResult<()> {
        self.subscribe(id, Binding::Ctx(ctx), listener)
    }

    fn subscribe(
        &self,
        id: EventId,
        binding: Binding,
        listener: &Arc<dyn EventListener>,
    ) -> MessagingResult<()> {
        let thread_ctx = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let mut reg = self.registry.write();
        let subs = reg.subscriptions.entry(id).or_default();
        let duplicate = subs
            .iter()
            .any(|s| s.binding == binding && Arc::ptr_eq(&s.listener, listener));
        if !duplicate {
            subs.push(Subscription {
                listener: listener.clone(),
                binding,
                thread_ctx,
            });
        }
        Ok(())
    }

    /// Remove `listener`'s global binding for `id`.
    pub fn unsubscribe_event(&self, id: EventId, listener: &Arc<dyn EventListener>) {
        self.unsubscribe(id, Binding::Global, listener);
    }

    /// Remove `listener`'s contextual binding for `(id, ctx)`.
    pub fn unsubscribe_event_ctx(
        &self,
        id: EventId,
        ctx: EventCtx,
        listener: &Arc<dyn EventListener>,
    ) {
        self.unsubscribe(id, Binding::Ctx(ctx), listener);
    }

    fn unsubscribe(&self, id: EventId, binding: Binding, listener: &Arc<dyn EventListener>) {
        let mut reg = self.registry.write();
        if let Some(subs) = reg.subscriptions.get_mut(&id) {
            subs.retain(|s| !(s.binding == binding && Arc::ptr_eq(&s.listener, listener)));
            if subs.is_empty() {
                reg.subscriptions.remove(&id);
            }
        }
    }

    /// Detach every listener of `id` at the next distribution.  The
    /// detach request outranks event publications in the global queue, so
    /// publications already distributed to input queues still reach their
    /// listeners before the bindings disappear.
    pub fn unsubscribe_all(&self, id: EventId) -> MessagingResult<()> {
        self.post_unsubscribe_all(id, None)
    }

    /// Like [`unsubscribe_all`](Self::unsubscribe_all) but detaches only
    /// bindings for `ctx`.
    pub fn unsubscribe_all_ctx(&self, id: EventId, ctx: EventCtx) -> MessagingResult<()> {
        self.post_unsubscribe_all(id, Some(ctx))
    }

    fn post_unsubscribe_all(&self, id: EventId, ctx: Option<EventCtx>) -> MessagingResult<()> {
        let caller = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let sender = self
            .registry
            .read()
            .contexts
            .get(&caller)
            .cloned()
            .ok_or(MessagingError::UnknownContext(caller))?;
        sender.outgoing.lock().push(OutgoingEntry {
            priority: PRIORITY_INTERNAL,
            deliver_at_ms: self.now_ms.load(Ordering::Relaxed),
            payload: Payload::UnsubscribeAll { id, ctx },
        });
        Ok(())
    }

    /// Publish a global event (delivered to every listener of `id`).
    pub fn publish_event(&self, id: EventId, args: Arc<dyn Message>) -> MessagingResult<()> {
        self.post_event(id, None, args)
    }

    /// Publish a contextual event (delivered to global listeners and to
    /// listeners bound to `ctx`).
    pub fn publish_event_ctx(
        &self,
        id: EventId,
        ctx: EventCtx,
        args: Arc<dyn Message>,
    ) -> MessagingResult<()> {
        self.post_event(id, Some(ctx), args)
    }

    fn post_event(
        &self,
        id: EventId,
        ctx: Option<EventCtx>,
        args: Arc<dyn Message>,
    ) -> MessagingResult<()> {
        let caller = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let sender = self
            .registry
            .read()
            .contexts
            .get(&caller)
            .cloned()
            .ok_or(MessagingError::UnknownContext(caller))?;
        sender.outgoing.lock().push(OutgoingEntry {
            priority: PRIORITY_EVENT,
            deliver_at_ms: self.now_ms.load(Ordering::Relaxed),
            payload: Payload::Event { id, ctx, args },
        });
        Ok(())
    }

    /// Deliver an event synchronously to matching listeners registered in
    /// the caller's thread context.  Listeners in other contexts are
    /// skipped — instantaneous publication never crosses a context.
    pub fn publish_instantaneous_event(
        &self,
        id: EventId,
        ctx: EventCtx,
        args: Arc<dyn Message>,
    ) -> MessagingResult<()> {
        let caller = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let targets: Vec<Arc<dyn EventListener>> = {
            let reg = self.registry.read();
            match reg.subscriptions.get(&id) {
                None => Vec::new(),
                Some(subs) => subs
                    .iter()
                    .filter(|s| s.thread_ctx == caller && s.binding.matches(Some(ctx)))
                    .map(|s| s.listener.clone())
                    .collect(),
            }
        };
        for listener in targets {
            listener.on_event(id, Some(ctx), &*args);
        }
        Ok(())
    }

    // ── Distribution (main thread) ────────────────────────────────────────

    /// Drain every context's outgoing queue into the global queue, release
    /// overdue deferred messages, order by priority, execute internal and
    /// `process_on_main` entries, and redistribute the rest into
    /// per-target-thread input queues.
    ///
    /// Must be called by the main thread while workers are parked at the
    /// frame barrier; `now_ms` is the simulation clock.
    pub fn distribute_messages(&self, now_ms: u64) -> MessagingResult<()> {
        let caller = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        {
            let reg = self.registry.read();
            if reg.main_ctx != Some(caller) {
                return Err(MessagingError::NotMainThread(caller));
            }
        }
        self.now_ms.store(now_ms, Ordering::Relaxed);

        // Collect: older deferred entries first, then this round's posts in
        // context order.  Per-sender FIFO is preserved because each
        // outgoing queue drains in posting order.
        let mut queue: Vec<OutgoingEntry> = {
            let mut reg = self.registry.write();
            let mut q = std::mem::take(&mut reg.deferred);
            let contexts: Vec<Arc<ThreadContext>> = reg.contexts.values().cloned().collect();
            drop(reg);
            for ctx in contexts {
                q.append(&mut ctx.outgoing.lock());
            }
            q
        };

        // Hold back entries that are not due yet.
        let mut due = Vec::with_capacity(queue.len());
        {
            let mut reg = self.registry.write();
            for entry in queue.drain(..) {
                if entry.deliver_at_ms > now_ms {
                    reg.deferred.push(entry);
                } else {
                    due.push(entry);
                }
            }
        }

        // Stable sort: internal > event > custom, FIFO within a priority.
        due.sort_by_key(|e| Reverse(e.priority));

        for entry in due {
            match entry.payload {
                Payload::UnsubscribeAll { id, ctx } => {
                    let mut reg = self.registry.write();
                    match ctx {
                        None => {
                            reg.subscriptions.remove(&id);
                        }
                        Some(ctx) => {
                            if let Some(subs) = reg.subscriptions.get_mut(&id) {
                                subs.retain(|s| s.binding != Binding::Ctx(ctx));
                                if subs.is_empty() {
                                    reg.subscriptions.remove(&id);
                                }
                            }
                        }
                    }
                }

                Payload::Handler { target, message_type, message, process_on_main } => {
                    let resolved = {
                        let reg = self.registry.read();
                        reg.handlers
                            .get(&target)
                            .map(|e| (e.handler.clone(), e.ctx))
                    };
                    let Some((handler, handler_ctx)) = resolved else {
                        debug!(%target, "dropping message for unregistered handler");
                        continue;
                    };
                    if process_on_main {
                        handler.handle_message(message_type, message);
                        continue;
                    }
                    let input_ctx = self.registry.read().contexts.get(&handler_ctx).cloned();
                    match input_ctx {
                        Some(tc) => tc.input.lock().push_back(InputEntry::Message {
                            handler,
                            message_type,
                            message,
                        }),
                        None => debug!(%target, %handler_ctx, "dropping message for dead context"),
                    }
                }

                Payload::Event { id, ctx, args } => {
                    let targets: Vec<(Arc<dyn EventListener>, ContextId)> = {
                        let reg = self.registry.read();
                        match reg.subscriptions.get(&id) {
                            None => Vec::new(),
                            Some(subs) => subs
                                .iter()
                                .filter(|s| s.binding.matches(ctx))
                                .map(|s| (s.listener.clone(), s.thread_ctx))
                                .collect(),
                        }
                    };
                    for (listener, thread_ctx) in targets {
                        let input_ctx = self.registry.read().contexts.get(&thread_ctx).cloned();
                        if let Some(tc) = input_ctx {
                            tc.input.lock().push_back(InputEntry::Event {
                                listener,
                                id,
                                ctx,
                                args: args.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ── Dispatch (each registered thread) ─────────────────────────────────

    /// Drain the calling thread's input queue, invoking each target in
    /// FIFO order.  Workers call this once per base tick, at the top of
    /// their frame; the main thread never needs to.
    pub fn thread_dispatch_messages(&self) -> MessagingResult<()> {
        let caller = self.current_context().ok_or(MessagingError::ThreadNotRegistered)?;
        let ctx = self
            .registry
            .read()
            .contexts
            .get(&caller)
            .cloned()
            .ok_or(MessagingError::UnknownContext(caller))?;

        let drained: VecDeque<InputEntry> = std::mem::take(&mut *ctx.input.lock());
        for entry in drained {
            match entry {
                InputEntry::Message { handler, message_type, message } => {
                    handler.handle_message(message_type, message);
                }
                InputEntry::Event { listener, id, ctx, args } => {
                    listener.on_event(id, ctx, &*args);
                }
            }
        }
        Ok(())
    }

    // ── Teardown ──────────────────────────────────────────────────────────

    /// Drop all contexts, handlers, subscriptions, and queued messages.
    /// Called by the driver after the final tick, once workers have
    /// unregistered and exited.
    pub fn shutdown(&self) {
        let mut reg = self.registry.write();
        reg.contexts.clear();
        reg.handlers.clear();
        reg.subscriptions.clear();
        reg.deferred.clear();
        reg.main_ctx = None;
        drop(reg);
        THREAD_BINDINGS.with(|b| b.borrow_mut().retain(|&(bus, _)| bus != self.bus_id));
    }
}
