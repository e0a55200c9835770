//! Frame demultiplexer.
//!
//! A frame may carry several packets back to back, each either preceded by
//! a suite switch marker or recognisable from its first byte. Packets are
//! dispatched in order. Anything that makes the remaining offsets
//! untrustworthy ends the frame.

use bytes::{Buf, Bytes};
use log::{debug, warn};
use rust_compas_common::{types::FaceId, Error};

use crate::suite::{DispatchStatus, Suite, SuiteRegistry, SUITE_SWITCH};

/// What happened to one frame.
#[derive(Debug, Default)]
pub struct DemuxOutcome {
    /// Number of dispatcher calls made.
    pub dispatched: usize,
    /// Why the frame was abandoned early, if it was.
    pub error: Option<Error>,
}

impl DemuxOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Feed every packet of `frame` to its suite's dispatcher.
pub fn demux<C>(ctx: &mut C, registry: &SuiteRegistry<C>, face: FaceId, frame: Bytes) -> DemuxOutcome {
    let mut outcome = DemuxOutcome::default();
    let mut buf = frame;

    while buf.has_remaining() {
        let suite = match next_suite(&mut buf) {
            Ok(suite) => suite,
            Err(e) => {
                warn!("[DEMUX] {} from face {}, dropping rest of frame", e, face.0);
                outcome.error = Some(e);
                break;
            }
        };

        let Some(ops) = registry.get(suite) else {
            warn!("[DEMUX] no dispatcher for suite {}", suite);
            outcome.error = Some(Error::NoDispatcher(suite.to_string()));
            break;
        };

        let before = buf.remaining();
        outcome.dispatched += 1;
        match (ops.dispatch)(ctx, face, &mut buf) {
            Ok(DispatchStatus::Stop) => break,
            Ok(DispatchStatus::Consumed) if buf.remaining() == before => {
                debug!("[DEMUX] {} dispatcher consumed nothing, stopping", suite);
                break;
            }
            Ok(DispatchStatus::Consumed) => {}
            Err(e) => {
                debug!("[DEMUX] {} packet rejected: {}", suite, e);
                outcome.error = Some(e);
                break;
            }
        }
    }

    outcome
}

/// Strip an optional switch marker and decide the suite of the next packet.
fn next_suite(buf: &mut Bytes) -> Result<Suite, Error> {
    let first = buf[0];
    if first != SUITE_SWITCH {
        return Suite::sniff(first).ok_or(Error::UnknownSuite(first));
    }

    if buf.remaining() < 2 {
        return Err(Error::Tlv("suite switch marker without encoding byte".into()));
    }
    let enc = buf[1];
    let suite = Suite::from_encoding(enc).ok_or(Error::UnknownSuite(enc))?;
    buf.advance(2);
    Ok(suite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::ENC_COMPAS;
    use rust_compas_common::{
        ndn::{Interest, Name},
        Result,
    };

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(Suite, usize)>,
    }

    fn take_interest(ctx: &mut Recorder, _face: FaceId, buf: &mut Bytes) -> Result<DispatchStatus> {
        let len = buf.remaining();
        Interest::decode(buf)?;
        ctx.calls.push((Suite::Ndn2013, len));
        Ok(DispatchStatus::Consumed)
    }

    fn take_one_byte(ctx: &mut Recorder, _face: FaceId, buf: &mut Bytes) -> Result<DispatchStatus> {
        ctx.calls.push((Suite::Compas, buf.remaining()));
        buf.advance(1);
        Ok(DispatchStatus::Consumed)
    }

    fn consume_nothing(ctx: &mut Recorder, _face: FaceId, buf: &mut Bytes) -> Result<DispatchStatus> {
        ctx.calls.push((Suite::Compas, buf.remaining()));
        Ok(DispatchStatus::Consumed)
    }

    fn registry() -> SuiteRegistry<Recorder> {
        let mut registry = SuiteRegistry::new();
        registry.register(Suite::Ndn2013, take_interest, None);
        registry.register(Suite::Compas, take_one_byte, None);
        registry
    }

    fn interest_bytes(name: &str) -> Vec<u8> {
        Interest::new(Name::from_string(name)).encode().to_vec()
    }

    #[test]
    fn back_to_back_packets_dispatch_in_order() {
        let mut frame = interest_bytes("/one");
        frame.extend_from_slice(&[SUITE_SWITCH, ENC_COMPAS, 0xAA]);
        frame.extend_from_slice(&interest_bytes("/two"));

        let mut ctx = Recorder::default();
        let outcome = demux(&mut ctx, &registry(), FaceId(1), Bytes::from(frame));

        assert!(outcome.is_ok());
        assert_eq!(outcome.dispatched, 3);
        let suites: Vec<Suite> = ctx.calls.iter().map(|(s, _)| *s).collect();
        assert_eq!(suites, vec![Suite::Ndn2013, Suite::Compas, Suite::Ndn2013]);
    }

    #[test]
    fn unknown_leading_byte_aborts_whole_frame() {
        let mut frame = vec![0xFF];
        frame.extend_from_slice(&interest_bytes("/recoverable"));

        let mut ctx = Recorder::default();
        let outcome = demux(&mut ctx, &registry(), FaceId(1), Bytes::from(frame));

        assert_eq!(outcome.dispatched, 0);
        assert!(ctx.calls.is_empty());
        assert!(matches!(outcome.error, Some(Error::UnknownSuite(0xFF))));
    }

    #[test]
    fn unknown_switch_encoding_aborts() {
        let mut ctx = Recorder::default();
        let frame = Bytes::from_static(&[SUITE_SWITCH, 0x42, 0x05, 0x00]);
        let outcome = demux(&mut ctx, &registry(), FaceId(1), frame);
        assert_eq!(outcome.dispatched, 0);
        assert!(matches!(outcome.error, Some(Error::UnknownSuite(0x42))));
    }

    #[test]
    fn missing_dispatcher_is_fatal_to_the_packet() {
        let mut registry: SuiteRegistry<Recorder> = SuiteRegistry::new();
        registry.register(Suite::Ndn2013, take_interest, None);

        let mut ctx = Recorder::default();
        let frame = Bytes::from_static(&[SUITE_SWITCH, ENC_COMPAS, 0xC2, 0x01, 0x00]);
        let outcome = demux(&mut ctx, &registry, FaceId(1), frame);
        assert_eq!(outcome.dispatched, 0);
        assert!(matches!(outcome.error, Some(Error::NoDispatcher(_))));
    }

    #[test]
    fn dispatcher_that_consumes_nothing_terminates() {
        let mut registry: SuiteRegistry<Recorder> = SuiteRegistry::new();
        registry.register(Suite::Compas, consume_nothing, None);

        let mut ctx = Recorder::default();
        let frame = Bytes::from_static(&[SUITE_SWITCH, ENC_COMPAS, 0x00, 0x00]);
        let outcome = demux(&mut ctx, &registry, FaceId(1), frame);
        assert_eq!(outcome.dispatched, 1);
        assert!(outcome.is_ok());
    }

    #[test]
    fn malformed_packet_stops_the_frame() {
        // Interest header claims more bytes than present
        let mut frame = vec![0x05, 0x40, 0x07, 0x00];
        frame.extend_from_slice(&interest_bytes("/after"));

        let mut ctx = Recorder::default();
        let outcome = demux(&mut ctx, &registry(), FaceId(1), Bytes::from(frame));
        assert_eq!(outcome.dispatched, 1);
        assert!(ctx.calls.is_empty());
        assert!(outcome.error.is_some());
    }
}
