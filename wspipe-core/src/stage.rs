//! Stages and the context they act through
//!
//! A [`Stage`] is one link of a connection's chain. Every callback has a
//! pass-through default, so a stage only overrides what it handles. Stages
//! never touch their neighbours directly: they record actions on the
//! [`StageContext`] and the pipeline carries them out after the callback
//! returns, which keeps chain mutation out of the callback itself.

use crate::error::Result;
use crate::event::PipelineEvent;
use crate::message::Message;
use crate::pipeline::{ConnectionId, MutationBatch, Pipeline};
use crate::promise::WritePromise;
use crate::timer::TimerId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_STAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a stage instance, stable across chain mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageId(u64);

impl StageId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage-{}", self.0)
    }
}

/// One link of a connection's chain.
///
/// Inbound callbacks (`read`, `event`, activity changes) travel from head to
/// tail; `write` and `close` travel from tail to head.
pub trait Stage: Send + 'static {
    /// The stage was inserted into a chain
    fn handler_added(&mut self, _ctx: &mut StageContext<'_>) -> Result<()> {
        Ok(())
    }

    /// The stage was taken out of the chain; actions recorded here are
    /// carried out after the rest of the current mutation batch
    fn handler_removed(&mut self, _ctx: &mut StageContext<'_>) -> Result<()> {
        Ok(())
    }

    /// The transport became active
    fn channel_active(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.fire_active();
        Ok(())
    }

    /// The transport went away
    fn channel_inactive(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.fire_inactive();
        Ok(())
    }

    /// Inbound message
    fn read(&mut self, ctx: &mut StageContext<'_>, msg: Message) -> Result<()> {
        ctx.fire_read(msg);
        Ok(())
    }

    /// Inbound event
    fn event(&mut self, ctx: &mut StageContext<'_>, event: PipelineEvent) -> Result<()> {
        ctx.fire_event(event);
        Ok(())
    }

    /// Outbound message
    fn write(
        &mut self,
        ctx: &mut StageContext<'_>,
        msg: Message,
        promise: Option<WritePromise>,
    ) -> Result<()> {
        ctx.write_with_promise(msg, promise);
        Ok(())
    }

    /// Outbound close request
    fn close(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        ctx.close();
        Ok(())
    }

    /// Continue work requested with [`StageContext::resume`]
    fn resume(&mut self, _ctx: &mut StageContext<'_>) -> Result<()> {
        Ok(())
    }

    /// A timer scheduled by this stage expired
    fn timer(&mut self, _ctx: &mut StageContext<'_>, _timer: TimerId) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) enum Action {
    Active,
    Inactive,
    Read(Message),
    Event(PipelineEvent),
    Write(Message, Option<WritePromise>),
    Close,
    Mutate(MutationBatch),
    Resume,
    Schedule(TimerId, Duration),
    Cancel(TimerId),
}

/// Handle a stage uses to act on its chain during a callback
#[derive(Debug)]
pub struct StageContext<'a> {
    connection_id: ConnectionId,
    stage_id: StageId,
    name: &'a str,
    active: bool,
    chain: &'a Pipeline,
    actions: Vec<Action>,
}

impl<'a> StageContext<'a> {
    pub(crate) fn new(
        connection_id: ConnectionId,
        stage_id: StageId,
        name: &'a str,
        active: bool,
        chain: &'a Pipeline,
    ) -> Self {
        Self {
            connection_id,
            stage_id,
            name,
            active,
            chain,
            actions: Vec::new(),
        }
    }

    pub(crate) fn into_actions(self) -> Vec<Action> {
        self.actions
    }

    /// Connection this chain belongs to
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Identity of the stage being called
    pub fn stage_id(&self) -> StageId {
        self.stage_id
    }

    /// Name the stage was registered under
    pub fn name(&self) -> &str {
        self.name
    }

    /// Whether the transport is active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether a stage named `name` is currently in the chain
    pub fn contains(&self, name: &str) -> bool {
        self.chain.contains(name)
    }

    /// Check `batch` against the chain as it is now, without applying it.
    ///
    /// Mutations recorded earlier in the same callback are not taken into
    /// account.
    pub fn check_mutation(&self, batch: &MutationBatch) -> Result<()> {
        self.chain.check(Some(self.stage_id), batch)
    }

    /// Pass activation to the next stage
    pub fn fire_active(&mut self) {
        self.actions.push(Action::Active);
    }

    /// Pass deactivation to the next stage
    pub fn fire_inactive(&mut self) {
        self.actions.push(Action::Inactive);
    }

    /// Pass a message to the next stage towards the tail
    pub fn fire_read(&mut self, msg: impl Into<Message>) {
        self.actions.push(Action::Read(msg.into()));
    }

    /// Pass an event to the next stage towards the tail
    pub fn fire_event(&mut self, event: PipelineEvent) {
        self.actions.push(Action::Event(event));
    }

    /// Pass a message to the next stage towards the head
    pub fn write(&mut self, msg: impl Into<Message>) {
        self.actions.push(Action::Write(msg.into(), None));
    }

    /// Like [`write`](Self::write), carrying a completion promise
    pub fn write_with_promise(&mut self, msg: impl Into<Message>, promise: Option<WritePromise>) {
        self.actions.push(Action::Write(msg.into(), promise));
    }

    /// Ask the stages towards the head to close the transport
    pub fn close(&mut self) {
        self.actions.push(Action::Close);
    }

    /// Apply a batch of chain mutations once this callback returns
    pub fn mutate(&mut self, batch: MutationBatch) {
        self.actions.push(Action::Mutate(batch));
    }

    /// Call this stage's [`Stage::resume`] once the actions recorded so far
    /// are carried out. Skipped if the stage has left the chain by then.
    pub fn resume(&mut self) {
        self.actions.push(Action::Resume);
    }

    /// Schedule a timer for this stage
    pub fn schedule(&mut self, delay: Duration) -> TimerId {
        let timer = TimerId::next();
        self.actions.push(Action::Schedule(timer, delay));
        timer
    }

    /// Cancel a timer scheduled by this stage
    pub fn cancel(&mut self, timer: TimerId) {
        self.actions.push(Action::Cancel(timer));
    }
}
