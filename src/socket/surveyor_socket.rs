// src/socket/surveyor_socket.rs

use crate::error::{SpError, SpResult};
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::protocol::sp::backtrace::{self, END_OF_BACKTRACE};
use crate::socket::core::{Inbound, SocketCore};
use crate::socket::options::{
  duration_ms_to_bytes, parse_positive_ms_option, DEFAULT_SURVEYOR_DEADLINE, SURVEYOR_DEADLINE,
};
use crate::socket::patterns::Distributor;
use crate::socket::{inbound_readiness, recv_fair_queued, split_backtrace_ingress, ISocket};
use async_channel::Sender as AsyncSender;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Survey {
  id: u32,
  deadline: Instant,
}

#[derive(Debug)]
struct SurveyState {
  next_id: u32,
  current: Option<Survey>,
}

/// Broadcasts a survey and collects responses until `SURVEYOR_DEADLINE`.
/// Raw surveyors have no deadline and pass the survey id through as control.
#[derive(Debug)]
pub(crate) struct SurveyorSocket {
  core: Arc<SocketCore>,
  distributor: Distributor,
  state: Mutex<SurveyState>,
  deadline: Mutex<Duration>,
}

impl SurveyorSocket {
  pub fn new(core: Arc<SocketCore>) -> Self {
    Self {
      core,
      distributor: Distributor::new(),
      state: Mutex::new(SurveyState {
        next_id: rand::random::<u32>(),
        current: None,
      }),
      deadline: Mutex::new(DEFAULT_SURVEYOR_DEADLINE),
    }
  }

  fn start_survey(&self, msg: Msg) {
    let deadline = *self.deadline.lock();
    let mut state = self.state.lock();
    let id = state.next_id | END_OF_BACKTRACE;
    state.next_id = state.next_id.wrapping_add(1);
    let survey = Msg::from_bytes(backtrace::prepend_word(id, msg.data()));
    let delivered = self.distributor.send_to_all(&survey);
    state.current = Some(Survey {
      id,
      deadline: Instant::now() + deadline,
    });
    tracing::debug!(handle = self.core.handle, survey_id = id, delivered, "Survey started");
  }

  async fn recv_cooked(&self, flags: Flags) -> SpResult<Msg> {
    let survey = self
      .state
      .lock()
      .current
      .ok_or(SpError::InvalidState("no survey in progress"))?;
    let survey_left = survey.deadline.saturating_duration_since(Instant::now());
    let timeout = match self.core.options.read().rcvtimeo {
      Some(rcvtimeo) if rcvtimeo < survey_left => rcvtimeo,
      _ => survey_left,
    };
    let result = self
      .core
      .wait_for(flags, Some(timeout), || {
        while let Some(inbound) = self.core.inbound.try_pop() {
          if inbound.header[..] == survey.id.to_be_bytes() {
            return Ok(Some(inbound.body));
          }
          tracing::trace!(handle = self.core.handle, pipe_id = inbound.pipe_id, "Discarding response to an old survey");
        }
        Ok(None)
      })
      .await;
    if matches!(result, Err(SpError::Timeout)) && Instant::now() >= survey.deadline {
      let mut state = self.state.lock();
      if matches!(state.current, Some(current) if current.id == survey.id) {
        state.current = None;
        tracing::debug!(handle = self.core.handle, survey_id = survey.id, "Survey deadline reached");
      }
    }
    result
  }
}

#[async_trait]
impl ISocket for SurveyorSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, control: Control, _flags: Flags) -> SpResult<()> {
    if !self.core.is_raw() {
      self.start_survey(msg);
      self.core.notify_activity();
      return Ok(());
    }
    if !backtrace::is_complete_backtrace(control.as_bytes()) {
      return Err(SpError::ProtocolViolation("control is not a survey backtrace".into()));
    }
    let survey = Msg::from_bytes(backtrace::prepend(control.as_bytes(), msg.data()));
    let delivered = self.distributor.send_to_all(&survey);
    tracing::trace!(handle = self.core.handle, delivered, "Raw survey forwarded");
    Ok(())
  }

  async fn recv(&self, flags: Flags) -> SpResult<(Msg, Control)> {
    if !self.core.is_raw() {
      return Ok((self.recv_cooked(flags).await?, Control::empty()));
    }
    let inbound = recv_fair_queued(&self.core, flags).await?;
    Ok((inbound.body, Control::from_bytes(inbound.header)))
  }

  fn set_pattern_option(&self, level: i32, option: i32, value: &[u8]) -> SpResult<()> {
    if level != self.core.protocol.id() as i32 || option != SURVEYOR_DEADLINE {
      return Err(SpError::InvalidOption { level, option });
    }
    *self.deadline.lock() =
      parse_positive_ms_option(value).map_err(|_| SpError::InvalidOptionValue { level, option })?;
    Ok(())
  }

  fn get_pattern_option(&self, level: i32, option: i32) -> SpResult<Vec<u8>> {
    if level != self.core.protocol.id() as i32 || option != SURVEYOR_DEADLINE {
      return Err(SpError::InvalidOption { level, option });
    }
    Ok(duration_ms_to_bytes(Some(*self.deadline.lock())))
  }

  fn pipe_attached(&self, pipe_id: u32, tx: AsyncSender<Msg>) -> bool {
    self.distributor.add_pipe(pipe_id, tx);
    true
  }

  fn pipe_detached(&self, pipe_id: u32) {
    self.distributor.remove_pipe(pipe_id);
  }

  fn ingress(&self, pipe_id: u32, msg: Msg) -> Option<Inbound> {
    split_backtrace_ingress(&self.core, pipe_id, msg)
  }

  fn readiness(&self) -> PollEvents {
    let surveying = self.core.is_raw() || self.state.lock().current.is_some();
    let mut events = PollEvents::OUT;
    if surveying {
      events |= inbound_readiness(&self.core);
    }
    events
  }
}
