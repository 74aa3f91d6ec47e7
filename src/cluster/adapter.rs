//! Bounded adapter from a replicated log Image to a state-machine service.
//!
//! The adapter must never read log entries a quorum has not durably
//! committed, so every poll is bounded by the caller's commit position. And
//! because the log is an append-only artifact written by multiple nodes
//! across versions, one malformed or unrecognized record must never halt
//! the stream: every failure class here is reported and dropped, and the
//! next fragment is dispatched normally.

use std::convert::Infallible;
use std::sync::Arc;

use crate::buffer::RegionBuffer;
use crate::frame::FrameContext;
use crate::image::Image;

use super::codecs::{
    decode_log_event, CloseReason, ClusterAction, LogEvent, MessageHeader, CLUSTER_SCHEMA_ID,
    SESSION_MESSAGE_HEADER_LENGTH,
};

/// Callback surface of the replicated state machine. Implementations
/// receive events in exactly the order they were committed to the log.
///
/// The five required callbacks cover the events every service must handle;
/// timer and membership-change events default to log-and-ignore.
pub trait ClusterService {
    #[allow(clippy::too_many_arguments)]
    fn on_session_open(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        cluster_session_id: i64,
        timestamp: i64,
        response_stream_id: i32,
        response_channel: &str,
        encoded_principal: &[u8],
    );

    fn on_session_close(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        cluster_session_id: i64,
        timestamp: i64,
        close_reason: CloseReason,
    );

    fn on_service_action(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        action: ClusterAction,
    );

    #[allow(clippy::too_many_arguments)]
    fn on_new_leadership_term(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        timestamp: i64,
        term_base_log_position: i64,
        leader_member_id: i32,
        log_session_id: i32,
        time_unit: i32,
        app_version: i32,
    );

    /// The application payload slice is borrowed straight from the log
    /// region; it is valid for the duration of the callback only.
    #[allow(clippy::too_many_arguments)]
    fn on_session_message(
        &mut self,
        log_position: i64,
        cluster_session_id: i64,
        timestamp: i64,
        payload_buffer: &Arc<RegionBuffer>,
        payload_offset: usize,
        payload_length: usize,
        frame: &FrameContext,
    );

    fn on_timer_event(&mut self, correlation_id: i64, timestamp: i64) {
        tracing::debug!(correlation_id, timestamp, "ignoring timer event");
    }

    fn on_membership_change(
        &mut self,
        leadership_term_id: i64,
        log_position: i64,
        leader_member_id: i32,
        member_id: i32,
    ) {
        tracing::debug!(
            leadership_term_id,
            log_position,
            leader_member_id,
            member_id,
            "ignoring membership change"
        );
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AdapterOptions {
    /// Fragment budget per poll call.
    pub fragment_limit: usize,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self { fragment_limit: 50 }
    }
}

/// Drives a [`ClusterService`] from one replicated-log Image, up to a
/// position ceiling.
pub struct BoundedLogAdapter<S> {
    image: Arc<Image>,
    service: S,
    max_log_position: i64,
    fragment_limit: usize,
    closed: bool,
}

impl<S: ClusterService> BoundedLogAdapter<S> {
    pub fn new(image: Arc<Image>, service: S, max_log_position: i64, options: AdapterOptions) -> Self {
        Self {
            image,
            service,
            max_log_position,
            fragment_limit: options.fragment_limit,
            closed: false,
        }
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// True once further polling is pointless: the ceiling is reached, the
    /// stream ended, or the adapter/Image was closed. Callers stop their
    /// duty cycle on this.
    pub fn is_done(&self) -> bool {
        self.image.position() >= self.max_log_position
            || self.image.is_end_of_stream()
            || self.image.is_closed()
    }

    /// Poll up to the configured fragment limit, never past
    /// `limit_position`. Returns fragments dispatched or dropped; decode
    /// and dispatch failures are absorbed here and never unwind.
    pub fn poll(&mut self, limit_position: i64) -> usize {
        let image = Arc::clone(&self.image);
        let service = &mut self.service;
        let result: Result<usize, Infallible> = image.bounded_poll(
            &mut |buffer: &Arc<RegionBuffer>, offset, length, frame: &FrameContext| {
                on_fragment(service, buffer, offset, length, frame);
                Ok(())
            },
            limit_position,
            self.fragment_limit,
        );
        match result {
            Ok(fragments) => fragments,
            Err(never) => match never {},
        }
    }

    /// Idempotent; closes the underlying Image.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.image.close();
        }
    }
}

fn on_fragment<S: ClusterService>(
    service: &mut S,
    buffer: &Arc<RegionBuffer>,
    offset: usize,
    length: usize,
    frame: &FrameContext,
) {
    let header = match MessageHeader::read(buffer, offset, length) {
        Ok(header) => header,
        Err(err) => {
            tracing::warn!(position = frame.position(), "dropping fragment: {err}");
            return;
        }
    };

    if header.schema_id != CLUSTER_SCHEMA_ID {
        tracing::warn!(
            schema_id = header.schema_id,
            position = frame.position(),
            "dropping fragment with unexpected schema id"
        );
        return;
    }

    let event = match decode_log_event(buffer, offset, length, header) {
        Ok(Some(event)) => event,
        Ok(None) => {
            tracing::warn!(
                template_id = header.template_id,
                position = frame.position(),
                "dropping fragment with unknown template id"
            );
            return;
        }
        Err(err) => {
            tracing::warn!(
                template_id = header.template_id,
                position = frame.position(),
                "dropping undecodable fragment: {err}"
            );
            return;
        }
    };

    let log_position = frame.position();
    match event {
        LogEvent::Timer(e) => service.on_timer_event(e.correlation_id, e.timestamp),
        LogEvent::SessionOpen(e) => service.on_session_open(
            e.leadership_term_id,
            log_position,
            e.cluster_session_id,
            e.timestamp,
            e.response_stream_id,
            &e.response_channel,
            &e.encoded_principal,
        ),
        LogEvent::SessionClose(e) => service.on_session_close(
            e.leadership_term_id,
            log_position,
            e.cluster_session_id,
            e.timestamp,
            e.close_reason,
        ),
        LogEvent::ClusterAction(e) => {
            service.on_service_action(e.leadership_term_id, e.log_position, e.timestamp, e.action);
        }
        LogEvent::NewLeadershipTerm(e) => service.on_new_leadership_term(
            e.leadership_term_id,
            e.log_position,
            e.timestamp,
            e.term_base_log_position,
            e.leader_member_id,
            e.log_session_id,
            e.time_unit,
            e.app_version,
        ),
        LogEvent::MembershipChange(e) => service.on_membership_change(
            e.leadership_term_id,
            e.log_position,
            e.leader_member_id,
            e.member_id,
        ),
        LogEvent::SessionMessage(e) => service.on_session_message(
            log_position,
            e.cluster_session_id,
            e.timestamp,
            buffer,
            offset + SESSION_MESSAGE_HEADER_LENGTH,
            length - SESSION_MESSAGE_HEADER_LENGTH,
            frame,
        ),
    }
}
