//! Per-connection stage chain
//!
//! A [`Pipeline`] owns an ordered list of named stages between a head (the
//! transport side) and a tail (the application side). It is sans-IO: bytes
//! and events are pushed in by whoever drives the connection, and whatever
//! reaches the head is queued for that driver to flush.
//!
//! Dispatch is depth-first. Actions a stage records are carried out before
//! the actions recorded earlier by the stages that called it, so a message
//! forwarded downstream is fully handled, chain mutations included, before the
//! forwarding stage continues. Actions recorded in `handler_removed` run after
//! everything else the current call produced.

use crate::error::{Error, PipelineError, Result};
use crate::event::PipelineEvent;
use crate::message::Message;
use crate::promise::{self, WriteFuture, WritePromise};
use crate::stage::{Action, Stage, StageContext, StageId};
use crate::timer::{TimerFired, TimerId, Timers};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a fresh identifier
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

enum Mutation {
    RemoveSelf,
    Remove(String),
    Replace {
        old: String,
        name: String,
        stage: Box<dyn Stage>,
    },
    AddAfter {
        anchor: String,
        name: String,
        stage: Box<dyn Stage>,
    },
    AddBefore {
        anchor: String,
        name: String,
        stage: Box<dyn Stage>,
    },
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::RemoveSelf => f.write_str("RemoveSelf"),
            Mutation::Remove(name) => f.debug_tuple("Remove").field(name).finish(),
            Mutation::Replace { old, name, .. } => {
                f.debug_struct("Replace").field("old", old).field("name", name).finish()
            }
            Mutation::AddAfter { anchor, name, .. } => f
                .debug_struct("AddAfter")
                .field("anchor", anchor)
                .field("name", name)
                .finish(),
            Mutation::AddBefore { anchor, name, .. } => f
                .debug_struct("AddBefore")
                .field("anchor", anchor)
                .field("name", name)
                .finish(),
        }
    }
}

/// Chain mutations applied together, in order.
///
/// Every name a batch refers to is checked before anything is applied, so a
/// batch naming a missing stage fails with [`PipelineError::StageNotFound`]
/// and leaves the chain untouched.
#[derive(Debug, Default)]
pub struct MutationBatch {
    ops: Vec<Mutation>,
}

impl MutationBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the stage that submits the batch
    pub fn remove_self(mut self) -> Self {
        self.ops.push(Mutation::RemoveSelf);
        self
    }

    /// Remove the stage registered under `name`
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.ops.push(Mutation::Remove(name.into()));
        self
    }

    /// Put `stage` in the place of the stage registered under `old`
    pub fn replace(
        mut self,
        old: impl Into<String>,
        name: impl Into<String>,
        stage: impl Stage,
    ) -> Self {
        self.ops.push(Mutation::Replace {
            old: old.into(),
            name: name.into(),
            stage: Box::new(stage),
        });
        self
    }

    /// Insert `stage` right after `anchor`, towards the tail
    pub fn add_after(
        mut self,
        anchor: impl Into<String>,
        name: impl Into<String>,
        stage: impl Stage,
    ) -> Self {
        self.ops.push(Mutation::AddAfter {
            anchor: anchor.into(),
            name: name.into(),
            stage: Box::new(stage),
        });
        self
    }

    /// Insert `stage` right before `anchor`, towards the head
    pub fn add_before(
        mut self,
        anchor: impl Into<String>,
        name: impl Into<String>,
        stage: impl Stage,
    ) -> Self {
        self.ops.push(Mutation::AddBefore {
            anchor: anchor.into(),
            name: name.into(),
            stage: Box::new(stage),
        });
        self
    }

    /// Number of mutations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch holds no mutation
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Entry queued at the head, in write order
#[derive(Debug)]
pub struct Outbound {
    /// The message that reached the head
    pub message: Message,
    /// Completion for the write, if the writer asked for one
    pub promise: Option<WritePromise>,
}

struct Slot {
    id: StageId,
    name: String,
    // taken out while the stage is being called
    stage: Option<Box<dyn Stage>>,
}

#[derive(Debug, Clone, Copy)]
enum Link {
    Head,
    Tail,
    Stage(StageId),
}

/// Where actions of a stage that left the chain continue
#[derive(Debug, Clone, Copy)]
struct Tombstone {
    inbound: Link,
    outbound: Link,
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    Head,
    Tail,
    Stage(StageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy)]
enum Hop {
    Head,
    Tail,
    Stage(usize),
}

enum Call {
    Added,
    Removed,
    Active,
    Inactive,
    Read(Message),
    Event(PipelineEvent),
    Write(Message, Option<WritePromise>),
    Close,
    Resume,
    Timer(TimerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Front,
    Back,
}

struct Work {
    from: Origin,
    action: Action,
}

type Queue = VecDeque<Work>;

/// Ordered chain of stages for one connection
pub struct Pipeline {
    connection_id: ConnectionId,
    slots: Vec<Slot>,
    tombstones: HashMap<StageId, Tombstone>,
    version: u64,
    active: bool,
    inactive_fired: bool,
    closed: bool,
    outbound: VecDeque<Outbound>,
    inbound: VecDeque<Message>,
    events: VecDeque<PipelineEvent>,
    timers: Timers,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Empty pipeline with a fresh connection identifier
    pub fn new() -> Self {
        Self::with_connection_id(ConnectionId::next())
    }

    /// Empty pipeline for the given connection
    pub fn with_connection_id(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            slots: Vec::new(),
            tombstones: HashMap::new(),
            version: 0,
            active: false,
            inactive_fired: false,
            closed: false,
            outbound: VecDeque::new(),
            inbound: VecDeque::new(),
            events: VecDeque::new(),
            timers: Timers::new(),
        }
    }

    /// Connection this pipeline serves
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Append a stage at the tail end of the chain
    pub fn add_last(&mut self, name: impl Into<String>, stage: impl Stage) -> Result<()> {
        let index = self.slots.len();
        self.add_at(index, name.into(), Box::new(stage))
    }

    /// Insert a stage at the head end of the chain
    pub fn add_first(&mut self, name: impl Into<String>, stage: impl Stage) -> Result<()> {
        self.add_at(0, name.into(), Box::new(stage))
    }

    /// Insert a stage right after `anchor`
    pub fn add_after(&mut self, anchor: &str, name: impl Into<String>, stage: impl Stage) -> Result<()> {
        self.mutate(MutationBatch::new().add_after(anchor, name, stage))
    }

    /// Insert a stage right before `anchor`
    pub fn add_before(&mut self, anchor: &str, name: impl Into<String>, stage: impl Stage) -> Result<()> {
        self.mutate(MutationBatch::new().add_before(anchor, name, stage))
    }

    /// Put a stage in the place of `old`
    pub fn replace(&mut self, old: &str, name: impl Into<String>, stage: impl Stage) -> Result<()> {
        self.mutate(MutationBatch::new().replace(old, name, stage))
    }

    /// Remove the stage registered under `name`
    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.mutate(MutationBatch::new().remove(name))
    }

    fn add_at(&mut self, index: usize, name: String, stage: Box<dyn Stage>) -> Result<()> {
        if self.position_by_name(&name).is_some() {
            return Err(PipelineError::DuplicateName(name).into());
        }
        let id = StageId::next();
        self.slots.insert(
            index,
            Slot {
                id,
                name,
                stage: Some(stage),
            },
        );
        self.version += 1;

        let mut queue = Queue::new();
        let result = self.invoke(id, Call::Added, &mut queue, Placement::Front);
        self.drain(queue, result)
    }

    /// Apply a mutation batch from outside the chain
    pub fn mutate(&mut self, batch: MutationBatch) -> Result<()> {
        let mut queue = Queue::new();
        let result = self.apply(None, batch, &mut queue);
        self.drain(queue, result)
    }

    /// Signal that the transport is active
    pub fn fire_active(&mut self) -> Result<()> {
        self.active = true;
        self.run(Origin::Head, Action::Active)
    }

    /// Signal that the transport went away; only the first call has effect
    pub fn fire_inactive(&mut self) -> Result<()> {
        if self.inactive_fired {
            return Ok(());
        }
        self.inactive_fired = true;
        self.active = false;
        self.run(Origin::Head, Action::Inactive)
    }

    /// Push an inbound message in at the head
    pub fn fire_read(&mut self, msg: impl Into<Message>) -> Result<()> {
        self.run(Origin::Head, Action::Read(msg.into()))
    }

    /// Push an inbound event in at the head
    pub fn fire_event(&mut self, event: PipelineEvent) -> Result<()> {
        self.run(Origin::Head, Action::Event(event))
    }

    /// Write from the tail end of the chain
    pub fn write(&mut self, msg: impl Into<Message>) -> Result<()> {
        self.run(Origin::Tail, Action::Write(msg.into(), None))
    }

    /// Write from the tail end of the chain and observe its completion
    pub fn write_and_listen(&mut self, msg: impl Into<Message>) -> Result<WriteFuture> {
        let (promise, future) = WritePromise::new();
        self.run(Origin::Tail, Action::Write(msg.into(), Some(promise)))?;
        Ok(future)
    }

    /// Request a close from the tail end of the chain
    pub fn close(&mut self) -> Result<()> {
        self.run(Origin::Tail, Action::Close)
    }

    /// Next message that reached the head, completing its write
    pub fn read_outbound(&mut self) -> Option<Message> {
        self.outbound.pop_front().map(|entry| {
            promise::complete(entry.promise, Ok(()));
            entry.message
        })
    }

    /// Next entry that reached the head, leaving its promise to the caller
    pub fn take_outbound(&mut self) -> Option<Outbound> {
        self.outbound.pop_front()
    }

    /// Whether messages are waiting at the head
    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Next message that reached the tail
    pub fn read_inbound(&mut self) -> Option<Message> {
        self.inbound.pop_front()
    }

    /// Next event that reached the tail
    pub fn read_event(&mut self) -> Option<PipelineEvent> {
        self.events.pop_front()
    }

    /// Whether a stage is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.position_by_name(name).is_some()
    }

    /// Stage names from head to tail
    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.name.as_str()).collect()
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the chain holds no stage
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Counter bumped by every structural change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the transport is active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether a close reached the head
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether any stage timer is outstanding
    pub fn has_pending_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    /// Wait for the next expired timer
    pub async fn next_timer(&mut self) -> TimerFired {
        self.timers.next().await
    }

    /// Deliver an expired timer to its stage
    pub fn fire_timer(&mut self, fired: TimerFired) -> Result<()> {
        if !self.timers.claim(&fired) || self.position(fired.stage).is_none() {
            return Ok(());
        }
        let mut queue = Queue::new();
        let result = self.invoke(fired.stage, Call::Timer(fired.timer), &mut queue, Placement::Front);
        self.drain(queue, result)
    }

    /// Deliver every timer that already expired
    pub fn run_pending_timers(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(fired) = self.timers.try_next() {
            if let Err(error) = self.fire_timer(fired) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn position(&self, id: StageId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.id == id)
    }

    fn position_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name == name)
    }

    fn run(&mut self, from: Origin, action: Action) -> Result<()> {
        let mut queue = Queue::new();
        queue.push_back(Work { from, action });
        self.drain(queue, Ok(()))
    }

    /// Work through the queue; the first error wins but never stops the rest
    fn drain(&mut self, mut queue: Queue, first: Result<()>) -> Result<()> {
        let mut first_error = first.err();
        while let Some(work) = queue.pop_front() {
            if let Err(error) = self.step(work, &mut queue) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn step(&mut self, work: Work, queue: &mut Queue) -> Result<()> {
        let Work { from, action } = work;
        match action {
            Action::Active => self.deliver(from, Direction::Inbound, Call::Active, queue),
            Action::Inactive => self.deliver(from, Direction::Inbound, Call::Inactive, queue),
            Action::Read(msg) => self.deliver(from, Direction::Inbound, Call::Read(msg), queue),
            Action::Event(event) => {
                self.deliver(from, Direction::Inbound, Call::Event(event), queue)
            }
            Action::Write(msg, promise) => {
                self.deliver(from, Direction::Outbound, Call::Write(msg, promise), queue)
            }
            Action::Close => self.deliver(from, Direction::Outbound, Call::Close, queue),
            Action::Resume => match from {
                Origin::Stage(id) if self.position(id).is_some() => {
                    self.invoke(id, Call::Resume, queue, Placement::Front)
                }
                _ => Ok(()),
            },
            Action::Schedule(timer, delay) => {
                if let Origin::Stage(id) = from {
                    self.timers.schedule(id, timer, delay);
                }
                Ok(())
            }
            Action::Cancel(timer) => {
                self.timers.cancel(timer);
                Ok(())
            }
            Action::Mutate(batch) => {
                let origin = match from {
                    Origin::Stage(id) => Some(id),
                    _ => None,
                };
                self.apply(origin, batch, queue)
            }
        }
    }

    fn deliver(&mut self, from: Origin, direction: Direction, call: Call, queue: &mut Queue) -> Result<()> {
        match self.next_hop(from, direction) {
            Hop::Stage(index) => {
                let id = self.slots[index].id;
                self.invoke(id, call, queue, Placement::Front)
            }
            Hop::Head => {
                self.head(call, queue);
                Ok(())
            }
            Hop::Tail => {
                self.tail(call);
                Ok(())
            }
        }
    }

    fn next_hop(&self, from: Origin, direction: Direction) -> Hop {
        match (from, direction) {
            (Origin::Head, Direction::Inbound) => self.first_hop(),
            (Origin::Tail, Direction::Outbound) => self.last_hop(),
            (Origin::Head, Direction::Outbound) => Hop::Head,
            (Origin::Tail, Direction::Inbound) => Hop::Tail,
            (Origin::Stage(id), _) => match self.position(id) {
                Some(index) => self.neighbour(index, direction),
                None => self.follow(id, direction),
            },
        }
    }

    fn first_hop(&self) -> Hop {
        if self.slots.is_empty() {
            Hop::Tail
        } else {
            Hop::Stage(0)
        }
    }

    fn last_hop(&self) -> Hop {
        match self.slots.len() {
            0 => Hop::Head,
            len => Hop::Stage(len - 1),
        }
    }

    fn neighbour(&self, index: usize, direction: Direction) -> Hop {
        match direction {
            Direction::Inbound if index + 1 < self.slots.len() => Hop::Stage(index + 1),
            Direction::Inbound => Hop::Tail,
            Direction::Outbound if index > 0 => Hop::Stage(index - 1),
            Direction::Outbound => Hop::Head,
        }
    }

    /// Resolve the next hop of a stage that already left the chain
    fn follow(&self, id: StageId, direction: Direction) -> Hop {
        let mut current = id;
        loop {
            let Some(tombstone) = self.tombstones.get(&current) else {
                return match direction {
                    Direction::Inbound => Hop::Tail,
                    Direction::Outbound => Hop::Head,
                };
            };
            let link = match direction {
                Direction::Inbound => tombstone.inbound,
                Direction::Outbound => tombstone.outbound,
            };
            match link {
                Link::Head => return Hop::Head,
                Link::Tail => return Hop::Tail,
                Link::Stage(next) => match self.position(next) {
                    Some(index) => return Hop::Stage(index),
                    None => current = next,
                },
            }
        }
    }

    fn head(&mut self, call: Call, queue: &mut Queue) {
        match call {
            Call::Write(message, promise) => {
                if self.closed {
                    promise::complete(
                        promise,
                        Err(Error::Connection(format!(
                            "{} closed, {} discarded",
                            self.connection_id,
                            message.kind()
                        ))),
                    );
                    return;
                }
                self.outbound.push_back(Outbound { message, promise });
            }
            Call::Close => {
                if self.closed {
                    return;
                }
                self.closed = true;
                crate::log_debug!("{} closed", self.connection_id);
                if !self.inactive_fired {
                    self.inactive_fired = true;
                    self.active = false;
                    queue.push_front(Work {
                        from: Origin::Head,
                        action: Action::Inactive,
                    });
                }
            }
            _ => {}
        }
    }

    fn tail(&mut self, call: Call) {
        match call {
            Call::Read(msg) => self.inbound.push_back(msg),
            Call::Event(event) => self.events.push_back(event),
            _ => {}
        }
    }

    fn invoke(&mut self, id: StageId, call: Call, queue: &mut Queue, placement: Placement) -> Result<()> {
        let Some(index) = self.position(id) else {
            return Ok(());
        };
        let Some(mut stage) = self.slots[index].stage.take() else {
            return Ok(());
        };

        let (result, actions) = {
            let slot = &self.slots[index];
            let mut ctx = StageContext::new(self.connection_id, id, &slot.name, self.active, self);
            let result = dispatch(stage.as_mut(), &mut ctx, call);
            (result, ctx.into_actions())
        };
        self.slots[index].stage = Some(stage);

        enqueue(queue, Origin::Stage(id), actions, placement);
        result
    }

    /// Call a stage that is no longer part of the chain
    fn invoke_detached(&mut self, id: StageId, name: &str, stage: &mut dyn Stage, queue: &mut Queue) -> Result<()> {
        let mut ctx = StageContext::new(self.connection_id, id, name, self.active, self);
        let result = dispatch(stage, &mut ctx, Call::Removed);
        enqueue(queue, Origin::Stage(id), ctx.into_actions(), Placement::Back);
        result
    }

    pub(crate) fn check(&self, origin: Option<StageId>, batch: &MutationBatch) -> Result<()> {
        let mut names: Vec<&str> = self.names();
        let own = origin
            .and_then(|id| self.position(id))
            .map(|index| self.slots[index].name.as_str());

        let found = |names: &Vec<&str>, name: &str| -> Result<usize> {
            names
                .iter()
                .position(|candidate| *candidate == name)
                .ok_or_else(|| PipelineError::StageNotFound(name.to_string()).into())
        };
        let unique = |names: &Vec<&str>, name: &str| -> Result<()> {
            if names.contains(&name) {
                Err(PipelineError::DuplicateName(name.to_string()).into())
            } else {
                Ok(())
            }
        };

        for op in &batch.ops {
            match op {
                Mutation::RemoveSelf => {
                    let own = own.ok_or_else(|| PipelineError::StageNotFound("self".to_string()))?;
                    let index = found(&names, own)?;
                    names.remove(index);
                }
                Mutation::Remove(name) => {
                    let index = found(&names, name)?;
                    names.remove(index);
                }
                Mutation::Replace { old, name, .. } => {
                    let index = found(&names, old)?;
                    names.remove(index);
                    unique(&names, name)?;
                    names.insert(index, name.as_str());
                }
                Mutation::AddAfter { anchor, name, .. } => {
                    let index = found(&names, anchor)?;
                    unique(&names, name)?;
                    names.insert(index + 1, name.as_str());
                }
                Mutation::AddBefore { anchor, name, .. } => {
                    let index = found(&names, anchor)?;
                    unique(&names, name)?;
                    names.insert(index, name.as_str());
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, origin: Option<StageId>, batch: MutationBatch, queue: &mut Queue) -> Result<()> {
        self.check(origin, &batch)?;

        let mut first_error = None;
        for op in batch.ops {
            let result = match op {
                Mutation::RemoveSelf => match origin.and_then(|id| self.position(id)) {
                    Some(index) => self.remove_at(index, queue),
                    None => Ok(()),
                },
                Mutation::Remove(name) => match self.position_by_name(&name) {
                    Some(index) => self.remove_at(index, queue),
                    None => Ok(()),
                },
                Mutation::Replace { old, name, stage } => match self.position_by_name(&old) {
                    Some(index) => self.replace_at(index, name, stage, queue),
                    None => Ok(()),
                },
                Mutation::AddAfter { anchor, name, stage } => match self.position_by_name(&anchor) {
                    Some(index) => self.insert_at(index + 1, name, stage, queue),
                    None => Ok(()),
                },
                Mutation::AddBefore { anchor, name, stage } => match self.position_by_name(&anchor) {
                    Some(index) => self.insert_at(index, name, stage, queue),
                    None => Ok(()),
                },
            };
            self.version += 1;
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn remove_at(&mut self, index: usize, queue: &mut Queue) -> Result<()> {
        let inbound = self
            .slots
            .get(index + 1)
            .map_or(Link::Tail, |slot| Link::Stage(slot.id));
        let outbound = match index {
            0 => Link::Head,
            _ => Link::Stage(self.slots[index - 1].id),
        };

        let slot = self.slots.remove(index);
        crate::log_trace!("{} removed {}", self.connection_id, slot.name);
        self.tombstones.insert(slot.id, Tombstone { inbound, outbound });
        self.timers.cancel_stage(slot.id);

        match slot.stage {
            Some(mut stage) => self.invoke_detached(slot.id, &slot.name, stage.as_mut(), queue),
            None => Ok(()),
        }
    }

    fn replace_at(&mut self, index: usize, name: String, stage: Box<dyn Stage>, queue: &mut Queue) -> Result<()> {
        let id = StageId::next();
        let old = std::mem::replace(
            &mut self.slots[index],
            Slot {
                id,
                name,
                stage: Some(stage),
            },
        );
        crate::log_trace!(
            "{} replaced {} with {}",
            self.connection_id,
            old.name,
            self.slots[index].name
        );
        self.tombstones.insert(
            old.id,
            Tombstone {
                inbound: Link::Stage(id),
                outbound: Link::Stage(id),
            },
        );
        self.timers.cancel_stage(old.id);

        let added = self.invoke(id, Call::Added, queue, Placement::Back);
        let removed = match old.stage {
            Some(mut stage) => self.invoke_detached(old.id, &old.name, stage.as_mut(), queue),
            None => Ok(()),
        };
        added.and(removed)
    }

    fn insert_at(&mut self, index: usize, name: String, stage: Box<dyn Stage>, queue: &mut Queue) -> Result<()> {
        let id = StageId::next();
        crate::log_trace!("{} added {}", self.connection_id, name);
        self.slots.insert(
            index,
            Slot {
                id,
                name,
                stage: Some(stage),
            },
        );
        self.invoke(id, Call::Added, queue, Placement::Back)
    }
}

fn dispatch(stage: &mut dyn Stage, ctx: &mut StageContext<'_>, call: Call) -> Result<()> {
    match call {
        Call::Added => stage.handler_added(ctx),
        Call::Removed => stage.handler_removed(ctx),
        Call::Active => stage.channel_active(ctx),
        Call::Inactive => stage.channel_inactive(ctx),
        Call::Read(msg) => stage.read(ctx, msg),
        Call::Event(event) => stage.event(ctx, event),
        Call::Write(msg, promise) => stage.write(ctx, msg, promise),
        Call::Close => stage.close(ctx),
        Call::Resume => stage.resume(ctx),
        Call::Timer(timer) => stage.timer(ctx, timer),
    }
}

fn enqueue(queue: &mut Queue, from: Origin, actions: Vec<Action>, placement: Placement) {
    match placement {
        Placement::Front => {
            for action in actions.into_iter().rev() {
                queue.push_front(Work { from, action });
            }
        }
        Placement::Back => {
            for action in actions {
                queue.push_back(Work { from, action });
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("connection_id", &self.connection_id)
            .field("stages", &self.names())
            .field("version", &self.version)
            .field("active", &self.active)
            .field("closed", &self.closed)
            .field("outbound", &self.outbound.len())
            .field("inbound", &self.inbound.len())
            .field("events", &self.events.len())
            .finish()
    }
}
