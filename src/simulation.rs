//! Wires the scheduler, channel, reader and tags into one driving loop. A
//! single owner drives reader, channel and tags through explicit `&mut`
//! access instead of back-pointers between them.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::channel::Channel;
use crate::codec::{Command, Reply};
use crate::error::SimError;
use crate::event::Event;
use crate::observer::{NullObserver, SimObserver};
use crate::reader::Reader;
use crate::scheduler::{EventHandle, Scheduler};
use crate::tag::Tag;
use crate::timing::{command_duration, pri, tag_frame_duration, TagPreamble};

/// A fully-wired simulation run: one reader, a shared channel, and the
/// population of tags it inventories.
pub struct Simulation {
    scheduler: Scheduler<Event>,
    channel: Channel,
    reader: Reader,
    tags: Vec<Tag>,
    rng: StdRng,
    observer: Box<dyn SimObserver>,
    pending_command: Option<Command>,
    pending_replies: Vec<(usize, Reply)>,
    /// Simulated time the current command finished transmitting, used by
    /// the inter-command-pause formula.
    t_sent: f64,
    /// The single in-flight T4 listen timer; cancelled on every delivered
    /// reply and re-armed when the next command is transmitted.
    reply_timeout: Option<EventHandle>,
    max_rounds: Option<u64>,
}

impl Simulation {
    /// Wires up a run, attaching the reader and every tag to `channel`.
    /// Fails if `channel` already carries a reader — a misconfigured run,
    /// not a recoverable runtime condition.
    pub fn new(reader: Reader, tags: Vec<Tag>, mut channel: Channel, seed: u64) -> Result<Self, SimError> {
        channel.attach_reader()?;
        for tag in &tags {
            channel.attach_tag(tag.id);
        }
        Ok(Simulation {
            scheduler: Scheduler::new(),
            channel,
            reader,
            tags,
            rng: StdRng::seed_from_u64(seed),
            observer: Box::new(NullObserver),
            pending_command: None,
            pending_replies: Vec::new(),
            t_sent: 0.0,
            reply_timeout: None,
            max_rounds: None,
        })
    }

    pub fn with_observer(mut self, observer: Box<dyn SimObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_max_rounds(mut self, rounds: u64) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn with_horizon(mut self, max_time: f64) -> Self {
        self.scheduler = Scheduler::with_horizon(max_time);
        self
    }

    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Runs the simulation to completion: every round exhausts its slots, or
    /// the configured horizon/round cap is hit first.
    pub fn run(&mut self) -> Result<(), SimError> {
        let cmd = self.reader.begin_round();
        self.observer.round_started(self.scheduler.now());
        self.observer.slot_started(self.scheduler.now(), self.reader.slot() as u16);
        self.transmit(cmd);

        while let Some(event) = self.scheduler.pop_next() {
            match event {
                Event::ReaderFrameEnd => self.on_reader_frame_end()?,
                Event::TagFrameEnd { tag } => self.on_tag_frame_end(tag)?,
                Event::ReaderTimeout => self.on_reader_timeout(),
                Event::SendCommand(cmd) => self.transmit(cmd),
            }
            if self.reader.is_round_complete() {
                self.observer.round_ended(self.scheduler.now());
                if self.should_stop() {
                    break;
                }
                let cmd = self.reader.begin_round();
                self.observer.round_started(self.scheduler.now());
                self.observer.slot_started(self.scheduler.now(), self.reader.slot() as u16);
                self.transmit(cmd);
            }
        }
        Ok(())
    }

    /// Reports a slot boundary crossed by a reader-side transition (a reply
    /// dispatched to completion, or a listen timeout): if the slot counter
    /// moved, the old slot ended and, unless the round is now complete, a
    /// new one started.
    fn note_slot_transition(&mut self, slot_before: u32) {
        let slot_after = self.reader.slot();
        if slot_after != slot_before {
            self.observer.slot_ended(self.scheduler.now(), slot_before as u16);
            if !self.reader.is_round_complete() {
                self.observer.slot_started(self.scheduler.now(), slot_after as u16);
            }
        }
    }

    fn should_stop(&self) -> bool {
        match self.max_rounds {
            Some(max) => self.reader.round >= max,
            None => true,
        }
    }

    /// The per-slot listen timer's lower bound, used here as its fixed
    /// duration since no tighter one is defined.
    fn t4(&self) -> f64 {
        2.0 * self.reader.config.rtcal
    }

    /// Re-evaluates every tag's power state against the reader's current
    /// antenna, reporting any OFF/READY transition to the observer. Stands
    /// in for the standard's `update_field` fan-out: this simulator has no
    /// reader-owned continuous-wave object, so the effect is applied
    /// directly to the tag population instead of through the channel.
    fn refresh_tag_power(&mut self) {
        let tx_power_dbm = self.reader.config.tx_power_dbm;
        let antenna = self.reader.current_antenna();
        for tag in &mut self.tags {
            let rx = self.channel.rx_power_dbm(tx_power_dbm, &antenna, &tag.antenna, 0.0);
            if let Some((from, to)) = tag.update_power(rx) {
                self.observer.tag_state_changed(self.scheduler.now(), tag.id, from, to);
            }
        }
    }

    /// Sends `cmd`, arming both the frame-end event and the listen timer
    /// that will advance the slot if no reply is delivered in time. Any
    /// previously armed timer is replaced.
    fn transmit(&mut self, cmd: Command) {
        let cfg = self.reader.config.clone();
        let duration = command_duration(&cmd, cfg.tari, cfg.rtcal, cfg.trcal, cfg.delim);
        self.observer.command_sent(self.scheduler.now(), &cmd);

        self.refresh_tag_power();

        self.pending_command = Some(cmd);
        self.scheduler.schedule(duration, Event::ReaderFrameEnd);
        self.t_sent = self.scheduler.now() + duration;
        self.reply_timeout = Some(
            self.scheduler
                .schedule(duration + self.t4(), Event::ReaderTimeout),
        );
    }

    fn on_reader_frame_end(&mut self) -> Result<(), SimError> {
        let cmd = self
            .pending_command
            .take()
            .ok_or_else(|| SimError::InvalidState("frame end with no pending command".into()))?;
        let cfg = self.reader.config.clone();

        let mut replies = Vec::new();
        for tag in &mut self.tags {
            if let Some(reply) = tag.handle_command(&cmd, &mut self.rng)? {
                replies.push((tag.id, reply));
            }
        }

        if replies.is_empty() {
            return Ok(());
        }

        self.pending_replies = replies.clone();
        let blf_hz = crate::timing::blf(cfg.dr, cfg.trcal);
        for (tag_id, reply) in &replies {
            self.channel.begin_tag_reply(*tag_id);
            let duration = tag_frame_duration(reply, blf_hz, cfg.m, cfg.trext);
            self.scheduler
                .schedule(duration, Event::TagFrameEnd { tag: *tag_id });
        }
        Ok(())
    }

    fn on_tag_frame_end(&mut self, tag_id: usize) -> Result<(), SimError> {
        let collided = self.channel.end_tag_reply(tag_id);
        let reply = self
            .pending_replies
            .iter()
            .find(|(id, _)| *id == tag_id)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| SimError::InvalidState(format!("no pending reply for tag {tag_id}")))?;

        let cfg = self.reader.config.clone();
        let reader_antenna = self.reader.current_antenna();
        let tag_antenna = self.tags[tag_id].antenna;
        let forward = self
            .channel
            .rx_power_dbm(cfg.tx_power_dbm, &reader_antenna, &tag_antenna, 0.0);
        let rx_power = self.channel.rx_power_dbm(forward, &tag_antenna, &reader_antenna, 0.0);

        let blf_hz = crate::timing::blf(cfg.dr, cfg.trcal);
        let preamble_duration = TagPreamble::new(cfg.m, cfg.trext).duration(blf_hz);
        let spb = cfg.m.symbols_per_bit();
        let pri_s = pri(cfg.trcal, cfg.dr);

        let success = self.channel.reception_succeeds(
            rx_power,
            preamble_duration,
            spb,
            pri_s,
            reply.bitlen(),
            collided,
            &mut self.rng,
        );

        self.pending_replies.retain(|(id, _)| *id != tag_id);

        if !success {
            let reason = if collided { "collision" } else { "bit errors" };
            let err = SimError::ReceptionFailure(reason.to_string());
            log::debug!("{err}");
            self.observer.reply_lost(self.scheduler.now(), Some(tag_id), reason);
            // Not delivered to the reader MAC: the already-armed listen
            // timer is what eventually advances the slot.
            return Ok(());
        }

        if let Some(handle) = self.reply_timeout.take() {
            self.scheduler.cancel(handle);
        }
        self.observer.reply_received(self.scheduler.now(), tag_id, &reply);
        let inventoried_before = self.reader.inventory.len();
        let slot_before = self.reader.slot();
        let next = self.reader.on_reply(&reply);
        self.note_slot_transition(slot_before);
        if self.reader.inventory.len() > inventoried_before {
            let tagged = self.reader.inventory.last().expect("just recorded");
            self.observer
                .tag_read(self.scheduler.now(), tag_id, self.reader.config.read_bank, &tagged.data);
        }
        if let Some(cmd) = next {
            let dt = crate::timing::t2_pause(self.scheduler.now(), self.t_sent, cfg.rtcal, cfg.trcal, cfg.dr);
            self.scheduler.schedule(dt, Event::SendCommand(cmd));
        }
        Ok(())
    }

    /// The listen timer expired with no reply delivered to the MAC: advance
    /// the slot and issue the next command immediately.
    fn on_reader_timeout(&mut self) {
        self.reply_timeout = None;
        let slot_before = self.reader.slot();
        let next = self.reader.on_timeout();
        self.note_slot_transition(slot_before);
        if let Some(cmd) = next {
            self.transmit(cmd);
        }
    }
}
