//! Pure query interfaces for the external lookup tables named in spec.md §1
//! ("Lookup tables (radio-ID ACL, talkgroup rules, channel-identity
//! bandplan) — consumed as pure query interfaces."). Their loading, storage,
//! and update mechanics are out of scope for this core; only the seams the
//! controllers call through are specified here.

/// Radio ID access-control lookup. `None`/unknown IDs default to permitted,
/// matching a fail-open ACL that only denies explicitly blocked IDs.
pub trait RadioIdLookup {
    /// Whether `rid` is permitted to transmit.
    fn is_permitted(&self, rid: u32) -> bool;
    /// Whether `rid` is present in the loaded table at all.
    fn exists(&self, rid: u32) -> bool;
}

/// Talkgroup rules lookup: which talkgroups are active, on which slot (for
/// DMR), and whether they are "non-preferred" (lower scheduling priority).
pub trait TalkgroupRulesLookup {
    fn is_active(&self, tg: u32) -> bool;
    fn slot_for(&self, tg: u32) -> Option<u8>;
    fn is_non_preferred(&self, tg: u32) -> bool;
}

/// Channel identity / bandplan lookup: resolves a channel number to an RF
/// center frequency pair, used by trunking control to announce adjacent
/// sites and compute grant channel numbers.
pub trait ChannelIdentityLookup {
    fn base_frequency(&self, iden_id: u8) -> Option<u32>;
    fn spacing_hz(&self, iden_id: u8) -> Option<u32>;
    fn tx_offset_hz(&self, iden_id: u8) -> Option<i32>;
}

/// An always-permissive lookup set, used in tests and as a safe default
/// when the host is not configured to consult real tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveLookup;

impl RadioIdLookup for PermissiveLookup {
    fn is_permitted(&self, _rid: u32) -> bool {
        true
    }
    fn exists(&self, _rid: u32) -> bool {
        true
    }
}

impl TalkgroupRulesLookup for PermissiveLookup {
    fn is_active(&self, _tg: u32) -> bool {
        true
    }
    fn slot_for(&self, _tg: u32) -> Option<u8> {
        Some(1)
    }
    fn is_non_preferred(&self, _tg: u32) -> bool {
        false
    }
}

impl ChannelIdentityLookup for PermissiveLookup {
    fn base_frequency(&self, _iden_id: u8) -> Option<u32> {
        Some(851_000_000)
    }
    fn spacing_hz(&self, _iden_id: u8) -> Option<u32> {
        Some(12_500)
    }
    fn tx_offset_hz(&self, _iden_id: u8) -> Option<i32> {
        Some(45_000_000)
    }
}
