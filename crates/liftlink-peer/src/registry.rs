use liftlink_frame::Frame;
use tracing::debug;

use crate::error::{ListenerKind, PeerError, Result};

/// Frame correlation id. Peer-scoped; wraps within the role's id range.
pub type FrameId = u8;

/// High bit of a frame id marks which end of the link allocated it.
const ROLE_BIT: u8 = 0x80;
const SEQ_MASK: u8 = 0x7F;

/// Which end of the link this registry speaks for.
///
/// Ids allocated by the controller side carry the role bit, ids allocated
/// by the device side do not, so the two wrapping counters never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The network-facing side; initiates commands and heartbeats.
    Controller,
    /// The motion-controller side; answers queries, emits events.
    Device,
}

impl Role {
    fn id_base(self) -> u8 {
        match self {
            Role::Controller => ROLE_BIT,
            Role::Device => 0,
        }
    }
}

/// What a type listener wants done with its registration after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerAction {
    /// Stay registered for further frames of this type.
    Continue,
    /// Deregister after this call.
    Unregister,
}

/// Outcome of routing one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A pending query or type listener consumed the frame.
    Delivered,
    /// No specific match; only the generic diagnostic path saw it.
    Unmatched,
}

/// One-shot response handler for a pending query.
pub type ResponseFn = Box<dyn FnMut(&Frame) + Send>;
/// One-shot timeout handler for a pending query.
pub type TimeoutFn = Box<dyn FnMut() + Send>;
/// Persistent per-type handler.
pub type TypeHandlerFn = Box<dyn FnMut(&Frame) -> ListenerAction + Send>;
/// Diagnostics-only fallback handler.
pub type GenericHandlerFn = Box<dyn FnMut(&Frame) + Send>;

struct PendingQuery {
    id: FrameId,
    on_response: ResponseFn,
    on_timeout: TimeoutFn,
    ticks_remaining: u16,
}

struct TypeListener {
    frame_type: u8,
    handler: TypeHandlerFn,
}

/// Fixed-capacity slot table: an array of slots plus a free-list of
/// indices. Bounded memory, no reallocation after construction.
struct SlotTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> SlotTable<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).rev().collect(),
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn insert(&mut self, value: T) -> Option<usize> {
        let index = self.free.pop()?;
        self.slots[index] = Some(value);
        Some(index)
    }

    fn remove(&mut self, index: usize) -> Option<T> {
        let value = self.slots[index].take();
        if value.is_some() {
            self.free.push(index);
        }
        value
    }

    fn position(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(&mut predicate))
    }
}

/// Capacities for the three listener classes, fixed at initialization.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub query_slots: usize,
    pub type_slots: usize,
    pub generic_slots: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            query_slots: 4,
            type_slots: 4,
            generic_slots: 2,
        }
    }
}

/// Routes inbound frames to pending queries, type listeners, or the
/// generic diagnostic fallback, and allocates outbound frame ids.
pub struct Registry {
    role: Role,
    queries: SlotTable<PendingQuery>,
    types: SlotTable<TypeListener>,
    generics: SlotTable<GenericHandlerFn>,
    next_seq: u8,
}

impl Registry {
    /// Create a registry with the given slot capacities and link role.
    pub fn new(config: RegistryConfig, role: Role) -> Self {
        Self {
            role,
            queries: SlotTable::with_capacity(config.query_slots),
            types: SlotTable::with_capacity(config.type_slots),
            generics: SlotTable::with_capacity(config.generic_slots),
            next_seq: 0,
        }
    }

    /// The link role this registry allocates ids for.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Number of queries currently awaiting a response or timeout.
    pub fn pending(&self) -> usize {
        self.queries.capacity() - self.queries.free.len()
    }

    /// Register a persistent listener for one frame type.
    pub fn add_type_listener(
        &mut self,
        frame_type: u8,
        handler: impl FnMut(&Frame) -> ListenerAction + Send + 'static,
    ) -> Result<()> {
        let listener = TypeListener {
            frame_type,
            handler: Box::new(handler),
        };
        match self.types.insert(listener) {
            Some(_) => Ok(()),
            None => Err(PeerError::CapacityExceeded {
                kind: ListenerKind::Type,
                capacity: self.types.capacity(),
            }),
        }
    }

    /// Register a diagnostics-only fallback listener.
    ///
    /// Generic listeners see every frame nothing else matched; they never
    /// consume registry state.
    pub fn add_generic_listener(
        &mut self,
        handler: impl FnMut(&Frame) + Send + 'static,
    ) -> Result<()> {
        match self.generics.insert(Box::new(handler)) {
            Some(_) => Ok(()),
            None => Err(PeerError::CapacityExceeded {
                kind: ListenerKind::Generic,
                capacity: self.generics.capacity(),
            }),
        }
    }

    /// Allocate a fresh frame id for a fire-and-forget send.
    ///
    /// Skips ids still held by pending queries so a wrapped counter can
    /// never shadow an outstanding correlation.
    pub fn alloc_frame_id(&mut self) -> FrameId {
        for _ in 0..=SEQ_MASK {
            let seq = self.next_seq;
            self.next_seq = (self.next_seq + 1) & SEQ_MASK;
            let candidate = self.role.id_base() | seq;
            if self.queries.position(|q| q.id == candidate).is_none() {
                return candidate;
            }
        }
        // Unreachable while query capacity is below the id space; keep the
        // allocator total anyway.
        self.role.id_base() | self.next_seq
    }

    /// Register a pending query and return its freshly allocated frame id.
    ///
    /// Exactly one of `on_response` / `on_timeout` will fire, whichever
    /// comes first, and the slot is freed when it does.
    pub fn register_query(
        &mut self,
        on_response: impl FnMut(&Frame) + Send + 'static,
        on_timeout: impl FnMut() + Send + 'static,
        timeout_ticks: u16,
    ) -> Result<FrameId> {
        if self.queries.free.is_empty() {
            return Err(PeerError::CapacityExceeded {
                kind: ListenerKind::Query,
                capacity: self.queries.capacity(),
            });
        }
        let id = self.alloc_frame_id();
        let query = PendingQuery {
            id,
            on_response: Box::new(on_response),
            on_timeout: Box::new(on_timeout),
            ticks_remaining: timeout_ticks,
        };
        self.queries.insert(query);
        Ok(id)
    }

    /// Drop a pending query without firing either handler.
    ///
    /// Only used to roll back a registration whose send never made it onto
    /// the wire; there is no application-facing cancel operation.
    pub(crate) fn remove_query(&mut self, id: FrameId) -> bool {
        match self.queries.position(|q| q.id == id) {
            Some(index) => self.queries.remove(index).is_some(),
            None => false,
        }
    }

    /// Route one inbound frame to at most one matching listener.
    ///
    /// Precedence: pending query by id (one-shot, removed before its
    /// handler runs), then first type listener by type, then the generic
    /// fallback. A response id with no pending query is a stray frame and
    /// takes the generic path; it cannot disturb the pending table.
    pub fn dispatch(&mut self, frame: &Frame) -> Dispatch {
        if let Some(index) = self.queries.position(|q| q.id == frame.id) {
            if let Some(mut query) = self.queries.remove(index) {
                (query.on_response)(frame);
                return Dispatch::Delivered;
            }
        }

        let mut matched = None;
        for index in 0..self.types.slots.len() {
            if let Some(listener) = self.types.slots[index].as_mut() {
                if listener.frame_type == frame.frame_type {
                    let action = (listener.handler)(frame);
                    matched = Some((index, action));
                    break;
                }
            }
        }
        if let Some((index, action)) = matched {
            if action == ListenerAction::Unregister {
                self.types.remove(index);
            }
            return Dispatch::Delivered;
        }

        for slot in self.generics.slots.iter_mut() {
            if let Some(handler) = slot.as_mut() {
                (handler)(frame);
            }
        }
        Dispatch::Unmatched
    }

    /// Advance every pending query's timeout by one tick.
    ///
    /// Queries reaching zero fire their timeout handler and free the slot.
    pub fn tick(&mut self) {
        for index in 0..self.queries.slots.len() {
            let expired = match self.queries.slots[index].as_mut() {
                Some(query) => {
                    query.ticks_remaining = query.ticks_remaining.saturating_sub(1);
                    query.ticks_remaining == 0
                }
                None => false,
            };
            if expired {
                if let Some(mut query) = self.queries.remove(index) {
                    debug!(id = query.id, "query timed out");
                    (query.on_timeout)();
                }
            }
        }
    }
}
