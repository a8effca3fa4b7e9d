// src/socket/req_socket.rs

use crate::error::{SpError, SpResult};
use crate::message::{Control, Flags, Msg};
use crate::poll::PollEvents;
use crate::protocol::sp::backtrace::{self, END_OF_BACKTRACE};
use crate::socket::core::{Inbound, SocketCore};
use crate::socket::options::{
  duration_ms_to_bytes, parse_bool_option, parse_positive_ms_option, DEFAULT_RESEND_IVL, REQ_CANCEL_PENDING,
  REQ_RESEND_IVL,
};
use crate::socket::patterns::LoadBalancer;
use crate::socket::{inbound_readiness, recv_fair_queued, split_backtrace_ingress, send_load_balanced, ISocket};
use async_channel::Sender as AsyncSender;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The request currently awaiting its reply.
#[derive(Debug)]
struct Outstanding {
  id: u32,
  /// Request as sent on the wire (id ‖ body), kept for resending.
  request: Msg,
  /// Pipe holding the request; `None` while waiting for a peer with capacity.
  pipe_id: Option<u32>,
  resend_at: Instant,
}

#[derive(Debug)]
struct ReqState {
  next_id: u32,
  // None = Idle, Some = AwaitingReply.
  outstanding: Option<Outstanding>,
}

/// Request socket.
///
/// Cooked: one request at a time, tagged with a 32-bit id (top bit set). The request
/// is resent after `REQ_RESEND_IVL` without a reply, or as soon as the pipe holding it
/// disconnects; replies carrying any other id are discarded.
///
/// Raw: the caller supplies the whole backtrace as control and gets the reply's
/// backtrace back; no state is kept.
#[derive(Debug)]
pub(crate) struct ReqSocket {
  core: Arc<SocketCore>,
  load_balancer: LoadBalancer,
  state: Mutex<ReqState>,
  resend_ivl: Mutex<Duration>,
  cancel_pending: AtomicBool,
  /// Wakes the resend task when the outstanding request changes.
  rearm: Notify,
}

impl ReqSocket {
  pub fn create(core: Arc<SocketCore>) -> SpResult<Arc<Self>> {
    let socket = Arc::new(Self {
      core: core.clone(),
      load_balancer: LoadBalancer::new(),
      state: Mutex::new(ReqState {
        next_id: rand::random::<u32>(),
        outstanding: None,
      }),
      resend_ivl: Mutex::new(DEFAULT_RESEND_IVL),
      cancel_pending: AtomicBool::new(false),
      rearm: Notify::new(),
    });
    if !core.is_raw() {
      let runtime = tokio::runtime::Handle::try_current()
        .map_err(|_| SpError::Creation("REQ sockets must be created inside a Tokio runtime".into()))?;
      let task = runtime.spawn(resend_loop(Arc::downgrade(&socket), core.token().clone()));
      core.spawn_task(task);
    }
    Ok(socket)
  }

  /// Dispatches an undelivered request, or resends one whose interval elapsed.
  /// Returns when the resend task should next look at the request.
  fn service_outstanding(&self) -> Option<Instant> {
    let resend_ivl = *self.resend_ivl.lock();
    let mut state = self.state.lock();
    let outstanding = state.outstanding.as_mut()?;
    let now = Instant::now();
    if outstanding.pipe_id.is_none() || outstanding.resend_at <= now {
      if outstanding.pipe_id.is_some() {
        tracing::debug!(handle = self.core.handle, request_id = outstanding.id, "No reply within resend interval, resending request");
      }
      match self.load_balancer.try_send(outstanding.request.clone()) {
        Ok(pipe_id) => {
          tracing::trace!(handle = self.core.handle, pipe_id, request_id = outstanding.id, "Request dispatched");
          outstanding.pipe_id = Some(pipe_id);
          outstanding.resend_at = now + resend_ivl;
        }
        Err(_) => outstanding.pipe_id = None,
      }
    }
    outstanding.pipe_id.map(|_| outstanding.resend_at)
  }

  fn awaiting_dispatch(&self) -> bool {
    matches!(&self.state.lock().outstanding, Some(o) if o.pipe_id.is_none())
  }

  fn send_cooked(&self, msg: Msg) -> SpResult<()> {
    let resend_ivl = *self.resend_ivl.lock();
    let mut state = self.state.lock();
    if let Some(previous) = &state.outstanding {
      if !self.cancel_pending.load(Ordering::Relaxed) {
        return Err(SpError::ProtocolViolation(
          "a request is already awaiting its reply".into(),
        ));
      }
      tracing::debug!(handle = self.core.handle, request_id = previous.id, "Abandoning outstanding request");
    }
    let id = state.next_id | END_OF_BACKTRACE;
    state.next_id = state.next_id.wrapping_add(1);
    let request = Msg::from_bytes(backtrace::prepend_word(id, msg.data()));
    let pipe_id = self.load_balancer.try_send(request.clone()).ok();
    tracing::trace!(handle = self.core.handle, request_id = id, ?pipe_id, "Request sent");
    state.outstanding = Some(Outstanding {
      id,
      request,
      pipe_id,
      resend_at: Instant::now() + resend_ivl,
    });
    drop(state);
    self.rearm.notify_one();
    self.core.notify_activity();
    Ok(())
  }

  async fn recv_cooked(&self, flags: Flags) -> SpResult<Msg> {
    let timeout = self.core.options.read().rcvtimeo;
    self
      .core
      .wait_for(flags, timeout, || {
        let mut state = self.state.lock();
        let expected = match &state.outstanding {
          Some(outstanding) => outstanding.id,
          None => return Err(SpError::InvalidState("no request is awaiting a reply")),
        };
        while let Some(inbound) = self.core.inbound.try_pop() {
          if inbound.header[..] == expected.to_be_bytes() {
            state.outstanding = None;
            return Ok(Some(inbound.body));
          }
          tracing::trace!(handle = self.core.handle, pipe_id = inbound.pipe_id, "Discarding reply to a different request");
        }
        Ok(None)
      })
      .await
  }
}

async fn resend_loop(socket: Weak<ReqSocket>, token: CancellationToken) {
  loop {
    let Some(socket) = socket.upgrade() else {
      break;
    };
    let activity = socket.core.activity().notified();
    tokio::pin!(activity);
    activity.as_mut().enable();

    let wake_at = socket.service_outstanding();
    let undispatched = socket.awaiting_dispatch();
    tokio::select! {
      _ = token.cancelled() => break,
      _ = socket.rearm.notified() => {}
      // A pipe may have gained capacity.
      _ = &mut activity, if undispatched => {}
      _ = sleep_until_opt(wake_at) => {}
    }
  }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}

#[async_trait]
impl ISocket for ReqSocket {
  fn core(&self) -> &Arc<SocketCore> {
    &self.core
  }

  async fn send(&self, msg: Msg, control: Control, flags: Flags) -> SpResult<()> {
    if !self.core.is_raw() {
      return self.send_cooked(msg);
    }
    if !backtrace::is_complete_backtrace(control.as_bytes()) {
      return Err(SpError::ProtocolViolation("control is not a request backtrace".into()));
    }
    let request = Msg::from_bytes(backtrace::prepend(control.as_bytes(), msg.data()));
    send_load_balanced(&self.core, &self.load_balancer, request, flags).await?;
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
    if level != self.core.protocol.id() as i32 {
      return Err(SpError::InvalidOption { level, option });
    }
    let invalid = || SpError::InvalidOptionValue { level, option };
    match option {
      REQ_RESEND_IVL => {
        *self.resend_ivl.lock() = parse_positive_ms_option(value).map_err(|_| invalid())?;
        self.rearm.notify_one();
      }
      REQ_CANCEL_PENDING => {
        let cancel = parse_bool_option(value).map_err(|_| invalid())?;
        self.cancel_pending.store(cancel, Ordering::Relaxed);
      }
      _ => return Err(SpError::InvalidOption { level, option }),
    }
    Ok(())
  }

  fn get_pattern_option(&self, level: i32, option: i32) -> SpResult<Vec<u8>> {
    if level != self.core.protocol.id() as i32 {
      return Err(SpError::InvalidOption { level, option });
    }
    match option {
      REQ_RESEND_IVL => Ok(duration_ms_to_bytes(Some(*self.resend_ivl.lock()))),
      REQ_CANCEL_PENDING => Ok((self.cancel_pending.load(Ordering::Relaxed) as i32).to_ne_bytes().to_vec()),
      _ => Err(SpError::InvalidOption { level, option }),
    }
  }

  fn pipe_attached(&self, pipe_id: u32, tx: AsyncSender<Msg>) -> bool {
    self.load_balancer.add_pipe(pipe_id, tx);
    self.rearm.notify_one();
    true
  }

  fn pipe_detached(&self, pipe_id: u32) {
    self.load_balancer.remove_pipe(pipe_id);
    let mut state = self.state.lock();
    if let Some(outstanding) = state.outstanding.as_mut() {
      if outstanding.pipe_id == Some(pipe_id) {
        tracing::debug!(handle = self.core.handle, pipe_id, request_id = outstanding.id, "Peer holding request went away, will resend");
        outstanding.pipe_id = None;
        drop(state);
        self.rearm.notify_one();
      }
    }
  }

  fn ingress(&self, pipe_id: u32, msg: Msg) -> Option<Inbound> {
    split_backtrace_ingress(&self.core, pipe_id, msg)
  }

  fn readiness(&self) -> PollEvents {
    if self.core.is_raw() {
      let mut events = inbound_readiness(&self.core);
      if self.load_balancer.has_capacity() {
        events |= PollEvents::OUT;
      }
      return events;
    }
    // A cooked request is always accepted; it is dispatched once a peer can take it.
    let awaiting = self.state.lock().outstanding.is_some();
    let mut events = PollEvents::OUT;
    if awaiting {
      events |= inbound_readiness(&self.core);
    }
    events
  }
}
