//! In-call control and inter-host RPC facade (spec.md §4.6).
//!
//! The actual JSON-RPC-over-REST transport is an external collaborator
//! (spec.md §1: "consumed through a simple request/reply facade"); this
//! module only specifies the request/response shapes and in-process
//! dispatch that the transport would carry, handler validation, and the
//! idempotence the spec requires.

/// Requests exchanged between a control channel (CC) and a voice channel
/// (VC), or issued by an external supervisor to a control channel (ICC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IccRequest {
    /// CC -> VC: permit a talkgroup to use this channel.
    PermitTg { dst_id: u32, slot: Option<u8> },
    /// CC -> VC or VC -> CC: release a previously granted talkgroup.
    ReleaseGrant { dst_id: u32 },
    /// CC -> VC: refresh (touch) an in-progress grant's hang timer.
    TouchGrant { dst_id: u32 },
    /// CC -> VC: replace the active-talkgroup list broadcast to voice-only peers.
    ActiveTgs { dst_ids: Vec<u32> },
    /// CC -> VC: clear the active-talkgroup list.
    ClearActiveTgs,
    /// Control -> VC: force a RF-rejected state for traffic to `dst_id`.
    RejectTraffic { dst_id: u32 },
}

/// Responses returned from an ICC/CC-VC handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IccResponse {
    Ok,
    InvalidArgs(String),
    BadRequest(String),
}

/// Implemented by any component that accepts ICC/CC-VC traffic (a protocol
/// controller's voice-channel side, typically). Handlers must be
/// idempotent: re-applying the same request twice leaves state unchanged
/// after the first application.
pub trait IccHandler {
    fn handle(&mut self, request: IccRequest) -> IccResponse;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        active: Vec<u32>,
        rejected: Option<u32>,
    }

    impl IccHandler for Recorder {
        fn handle(&mut self, request: IccRequest) -> IccResponse {
            match request {
                IccRequest::ActiveTgs { dst_ids } => {
                    self.active = dst_ids;
                    IccResponse::Ok
                }
                IccRequest::ClearActiveTgs => {
                    self.active.clear();
                    IccResponse::Ok
                }
                IccRequest::RejectTraffic { dst_id } => {
                    self.rejected = Some(dst_id);
                    IccResponse::Ok
                }
                IccRequest::PermitTg { dst_id, .. } if dst_id == 0 => {
                    IccResponse::InvalidArgs("dst_id must be nonzero".to_string())
                }
                _ => IccResponse::Ok,
            }
        }
    }

    #[test]
    fn reject_traffic_is_idempotent() {
        let mut r = Recorder {
            active: vec![],
            rejected: None,
        };
        assert_eq!(
            r.handle(IccRequest::RejectTraffic { dst_id: 100 }),
            IccResponse::Ok
        );
        assert_eq!(r.rejected, Some(100));
        assert_eq!(
            r.handle(IccRequest::RejectTraffic { dst_id: 100 }),
            IccResponse::Ok
        );
        assert_eq!(r.rejected, Some(100));
    }

    #[test]
    fn invalid_args_is_reported() {
        let mut r = Recorder {
            active: vec![],
            rejected: None,
        };
        assert_eq!(
            r.handle(IccRequest::PermitTg {
                dst_id: 0,
                slot: None
            }),
            IccResponse::InvalidArgs("dst_id must be nonzero".to_string())
        );
    }
}
