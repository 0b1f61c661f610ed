//! Modem command/response opcode table (spec.md §6), expressed as an
//! exhaustively-matched enum per the §9 redesign note ("Function-pointer
//! bound handlers -> enum-dispatched opcode table").

/// Inbound/outbound TYPE byte values on the modem wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DvmCommand {
    GetVersion,
    GetStatus,
    SetConfig,
    SetMode,
    SetSymLvlAdj,
    SetRxLevel,
    SetRfParams,
    SetBuffers,
    CalData,
    RssiData,
    SendCwId,
    DmrData1,
    DmrLost1,
    DmrData2,
    DmrLost2,
    DmrShortLc,
    DmrStart,
    DmrAbort,
    P25Data,
    P25Lost,
    P25Clear,
    NxdnData,
    NxdnLost,
    NxdnClear,
    Ack,
    Nak,
    FlshRead,
    FlshWrite,
    Debug1,
    Debug2,
    Debug3,
    Debug4,
    Debug5,
    DebugDump,
    /// Any byte value not recognized by this table.
    Unknown(u8),
}

impl DvmCommand {
    pub fn to_byte(self) -> u8 {
        use DvmCommand::*;
        match self {
            GetVersion => 0x00,
            GetStatus => 0x01,
            SetConfig => 0x02,
            SetMode => 0x03,
            SetSymLvlAdj => 0x04,
            SetRxLevel => 0x05,
            SetRfParams => 0x06,
            SetBuffers => 0x07,
            CalData => 0x08,
            RssiData => 0x09,
            SendCwId => 0x0A,
            DmrData1 => 0x18,
            DmrLost1 => 0x19,
            DmrData2 => 0x1A,
            DmrLost2 => 0x1B,
            DmrShortLc => 0x1C,
            DmrStart => 0x1D,
            DmrAbort => 0x1E,
            P25Data => 0x31,
            P25Lost => 0x32,
            P25Clear => 0x33,
            NxdnData => 0x41,
            NxdnLost => 0x42,
            NxdnClear => 0x43,
            Ack => 0x70,
            Nak => 0x7F,
            FlshRead => 0xE0,
            FlshWrite => 0xE1,
            Debug1 => 0xF1,
            Debug2 => 0xF2,
            Debug3 => 0xF3,
            Debug4 => 0xF4,
            Debug5 => 0xF5,
            DebugDump => 0xFA,
            Unknown(b) => b,
        }
    }

    pub fn from_byte(byte: u8) -> Self {
        use DvmCommand::*;
        match byte {
            0x00 => GetVersion,
            0x01 => GetStatus,
            0x02 => SetConfig,
            0x03 => SetMode,
            0x04 => SetSymLvlAdj,
            0x05 => SetRxLevel,
            0x06 => SetRfParams,
            0x07 => SetBuffers,
            0x08 => CalData,
            0x09 => RssiData,
            0x0A => SendCwId,
            0x18 => DmrData1,
            0x19 => DmrLost1,
            0x1A => DmrData2,
            0x1B => DmrLost2,
            0x1C => DmrShortLc,
            0x1D => DmrStart,
            0x1E => DmrAbort,
            0x31 => P25Data,
            0x32 => P25Lost,
            0x33 => P25Clear,
            0x41 => NxdnData,
            0x42 => NxdnLost,
            0x43 => NxdnClear,
            0x70 => Ack,
            0x7F => Nak,
            0xE0 => FlshRead,
            0xE1 => FlshWrite,
            0xF1 => Debug1,
            0xF2 => Debug2,
            0xF3 => Debug3,
            0xF4 => Debug4,
            0xF5 => Debug5,
            0xFA => DebugDump,
            other => Unknown(other),
        }
    }
}

/// NAK reason codes (spec.md §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NakReason {
    IllegalLength,
    InvalidRequest,
    RingBuffFull,
    InvalidFdmaPreamble,
    InvalidMode,
    InvalidDmrCc,
    InvalidDmrSlot,
    InvalidDmrStart,
    InvalidDmrRxDelay,
    InvalidP25CorrCount,
    NoInternalFlash,
    FailedEraseFlash,
    FailedWriteFlash,
    FlashWriteTooBig,
    HsNoDualMode,
    DmrDisabled,
    P25Disabled,
    NxdnDisabled,
    Unknown(u8),
}

impl NakReason {
    pub fn from_byte(byte: u8) -> Self {
        use NakReason::*;
        match byte {
            2 => IllegalLength,
            4 => InvalidRequest,
            8 => RingBuffFull,
            10 => InvalidFdmaPreamble,
            11 => InvalidMode,
            12 => InvalidDmrCc,
            13 => InvalidDmrSlot,
            14 => InvalidDmrStart,
            15 => InvalidDmrRxDelay,
            16 => InvalidP25CorrCount,
            20 => NoInternalFlash,
            21 => FailedEraseFlash,
            22 => FailedWriteFlash,
            23 => FlashWriteTooBig,
            32 => HsNoDualMode,
            63 => DmrDisabled,
            64 => P25Disabled,
            65 => NxdnDisabled,
            other => Unknown(other),
        }
    }

    pub fn description(self) -> &'static str {
        use NakReason::*;
        match self {
            IllegalLength => "illegal length",
            InvalidRequest => "invalid request",
            RingBuffFull => "ring buffer full",
            InvalidFdmaPreamble => "invalid FDMA preamble",
            InvalidMode => "invalid mode",
            InvalidDmrCc => "invalid DMR color code",
            InvalidDmrSlot => "invalid DMR slot",
            InvalidDmrStart => "invalid DMR start",
            InvalidDmrRxDelay => "invalid DMR Rx delay",
            InvalidP25CorrCount => "invalid P25 corr count",
            NoInternalFlash => "no internal flash",
            FailedEraseFlash => "failed to erase flash",
            FailedWriteFlash => "failed to write flash",
            FlashWriteTooBig => "flash write too big",
            HsNoDualMode => "hotspot does not support dual mode",
            DmrDisabled => "DMR disabled",
            P25Disabled => "P25 disabled",
            NxdnDisabled => "NXDN disabled",
            Unknown(_) => "unknown reason",
        }
    }
}

/// Logical channels the modem multiplexes frames for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Dmr1,
    Dmr2,
    P25,
    Nxdn,
}

impl Channel {
    pub fn data_command(self) -> DvmCommand {
        match self {
            Channel::Dmr1 => DvmCommand::DmrData1,
            Channel::Dmr2 => DvmCommand::DmrData2,
            Channel::P25 => DvmCommand::P25Data,
            Channel::Nxdn => DvmCommand::NxdnData,
        }
    }

    pub fn lost_command(self) -> DvmCommand {
        match self {
            Channel::Dmr1 => DvmCommand::DmrLost1,
            Channel::Dmr2 => DvmCommand::DmrLost2,
            Channel::P25 => DvmCommand::P25Lost,
            Channel::Nxdn => DvmCommand::NxdnLost,
        }
    }

    /// Size in bytes of one "logical frame" of credit for this channel, used
    /// when the modem doesn't report space-in-blocks (spec.md §3).
    pub fn logical_frame_bytes(self) -> usize {
        match self {
            Channel::Dmr1 | Channel::Dmr2 => 35,
            Channel::Nxdn => 30,
            Channel::P25 => 216, // one LDU frame
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_round_trips() {
        for b in 0u16..=255 {
            let b = b as u8;
            let cmd = DvmCommand::from_byte(b);
            if let DvmCommand::Unknown(orig) = cmd {
                assert_eq!(orig, b);
            } else {
                assert_eq!(cmd.to_byte(), b);
            }
        }
    }

    #[test]
    fn nak_reason_known_values() {
        assert_eq!(NakReason::from_byte(8), NakReason::RingBuffFull);
        assert_eq!(NakReason::from_byte(8).description(), "ring buffer full");
    }
}
