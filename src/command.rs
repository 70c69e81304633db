//! Typed CP commands and their on-wire `code + body` encoding.
//!
//! Every command kind is one variant of [`Command`], carrying its own fields.
//! [`Command::encode`] produces the bytes that follow the control byte in a
//! frame, and checks that they fit in a frame.

use arrayvec::ArrayVec;
use snafu::{ensure, Snafu};

use crate::types::Address;

/// Maximum length of an encoded command, code byte included.
pub const MAX_COMMAND_LEN: usize = 128;

/// Maximum number of characters in a text command.
pub const MAX_TEXT_LEN: usize = 32;

/// Encoded command: code byte followed by the body.
pub type CommandBytes = ArrayVec<u8, MAX_COMMAND_LEN>;

/// Command codes.
pub mod code {
    pub const POLL: u8 = 0x60;
    pub const ID: u8 = 0x61;
    pub const CAP: u8 = 0x62;
    pub const LSTAT: u8 = 0x64;
    pub const ISTAT: u8 = 0x65;
    pub const OSTAT: u8 = 0x66;
    pub const RSTAT: u8 = 0x67;
    pub const OUT: u8 = 0x68;
    pub const LED: u8 = 0x69;
    pub const BUZ: u8 = 0x6a;
    pub const TEXT: u8 = 0x6b;
    pub const COMSET: u8 = 0x6e;
}

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The encoded command doesn't fit in a frame.
    #[snafu(display("Command of {} bytes exceeds the maximum of {}", len, max))]
    PayloadTooLarge { len: usize, max: usize },
    /// The text doesn't fit in a text command.
    #[snafu(display("Text of {} bytes exceeds the maximum of {}", len, MAX_TEXT_LEN))]
    TextTooLong { len: usize },
}

/// A command from the CP to a peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Idle poll, sent whenever no other command is pending.
    Poll,
    /// Request the peripheral identification report.
    Id,
    /// Request the peripheral capabilities report.
    Capabilities,
    /// Request local (tamper and power) status.
    LocalStatus,
    /// Request input status.
    InputStatus,
    /// Request output status.
    OutputStatus,
    /// Request reader tamper status.
    ReaderStatus,
    /// Output control, one record per output.
    Output(ArrayVec<OutputControl, 16>),
    /// Reader LED control, one record per LED.
    Led(ArrayVec<LedControl, 8>),
    /// Reader buzzer control.
    Buzzer(BuzzerControl),
    /// Text output to a reader display.
    Text(TextCommand),
    /// Change the peripheral address and baud rate.
    ComSet(ComSet),
    /// Any command code not covered above, with a pre-encoded body.
    Raw { code: u8, body: ArrayVec<u8, 127> },
}

impl Command {
    /// The command code byte.
    pub fn code(&self) -> u8 {
        match self {
            Command::Poll => code::POLL,
            Command::Id => code::ID,
            Command::Capabilities => code::CAP,
            Command::LocalStatus => code::LSTAT,
            Command::InputStatus => code::ISTAT,
            Command::OutputStatus => code::OSTAT,
            Command::ReaderStatus => code::RSTAT,
            Command::Output(_) => code::OUT,
            Command::Led(_) => code::LED,
            Command::Buzzer(_) => code::BUZ,
            Command::Text(_) => code::TEXT,
            Command::ComSet(_) => code::COMSET,
            Command::Raw { code, .. } => *code,
        }
    }

    /// Length of the encoded command, code byte included.
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            Command::Poll
            | Command::LocalStatus
            | Command::InputStatus
            | Command::OutputStatus
            | Command::ReaderStatus => 0,
            Command::Id | Command::Capabilities => 1,
            Command::Output(outputs) => outputs.len() * OutputControl::LEN,
            Command::Led(leds) => leds.len() * LedControl::LEN,
            Command::Buzzer(_) => BuzzerControl::LEN,
            Command::Text(text) => TextCommand::HEADER_LEN + text.text.len(),
            Command::ComSet(_) => ComSet::LEN,
            Command::Raw { body, .. } => body.len(),
        }
    }

    /// Encode into `code + body` bytes.
    /// # Errors
    /// Returns [`Error::PayloadTooLarge`] if the encoding exceeds [`MAX_COMMAND_LEN`].
    pub fn encode(&self) -> Result<CommandBytes, Error> {
        let len = self.encoded_len();
        ensure!(
            len <= MAX_COMMAND_LEN,
            PayloadTooLargeSnafu {
                len,
                max: MAX_COMMAND_LEN
            }
        );

        let mut buf = CommandBytes::new();
        buf.push(self.code());
        match self {
            Command::Poll
            | Command::LocalStatus
            | Command::InputStatus
            | Command::OutputStatus
            | Command::ReaderStatus => (),
            // 0x00: standard report
            Command::Id | Command::Capabilities => buf.push(0x00),
            Command::Output(outputs) => outputs.iter().for_each(|o| o.write(&mut buf)),
            Command::Led(leds) => leds.iter().for_each(|l| l.write(&mut buf)),
            Command::Buzzer(buz) => buz.write(&mut buf),
            Command::Text(text) => text.write(&mut buf),
            Command::ComSet(comset) => comset.write(&mut buf),
            Command::Raw { body, .. } => buf.extend(body.iter().copied()),
        }
        debug_assert_eq!(buf.len(), len);
        Ok(buf)
    }

    /// Create a raw command from a code and an already encoded body.
    /// # Errors
    /// Returns [`Error::PayloadTooLarge`] if `body` doesn't fit.
    pub fn raw(code: u8, body: &[u8]) -> Result<Self, Error> {
        let mut raw = ArrayVec::new();
        raw.try_extend_from_slice(body)
            .map_err(|_| Error::PayloadTooLarge {
                len: body.len() + 1,
                max: MAX_COMMAND_LEN,
            })?;
        Ok(Command::Raw { code, body: raw })
    }
}

/// Output control actions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputAction {
    Nop = 0,
    /// Permanent off, abort any timed operation.
    PermanentOff = 1,
    /// Permanent on, abort any timed operation.
    PermanentOn = 2,
    /// Permanent off, let a running timed operation complete.
    PermanentOffAllowTimed = 3,
    /// Permanent on, let a running timed operation complete.
    PermanentOnAllowTimed = 4,
    /// Temporary on for `timer`, then resume the permanent state.
    TemporaryOn = 5,
    /// Temporary off for `timer`, then resume the permanent state.
    TemporaryOff = 6,
}

/// One output control record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OutputControl {
    pub output: u8,
    pub action: OutputAction,
    /// Timer in units of 100 ms.
    pub timer: u16,
}

impl OutputControl {
    const LEN: usize = 4;

    fn write(&self, buf: &mut CommandBytes) {
        buf.push(self.output);
        buf.push(self.action as u8);
        buf.extend(self.timer.to_le_bytes().iter().copied());
    }
}

/// LED colors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum LedColor {
    Black = 0,
    Red = 1,
    Green = 2,
    Amber = 3,
    Blue = 4,
}

/// Temporary LED settings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TemporaryLed {
    /// Leave the temporary state as it is.
    Nop,
    /// Cancel a running temporary operation and show the permanent state.
    Cancel,
    /// Start a temporary operation lasting `timer` units of 100 ms.
    Set {
        on_count: u8,
        off_count: u8,
        on_color: LedColor,
        off_color: LedColor,
        timer: u16,
    },
}

/// Permanent LED settings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PermanentLed {
    Nop,
    Set {
        on_count: u8,
        off_count: u8,
        on_color: LedColor,
        off_color: LedColor,
    },
}

/// One reader LED control record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LedControl {
    pub reader: u8,
    pub led: u8,
    pub temporary: TemporaryLed,
    pub permanent: PermanentLed,
}

impl LedControl {
    const LEN: usize = 14;

    fn write(&self, buf: &mut CommandBytes) {
        buf.push(self.reader);
        buf.push(self.led);
        match self.temporary {
            TemporaryLed::Nop => buf.extend([0; 7].iter().copied()),
            TemporaryLed::Cancel => {
                buf.push(1);
                buf.extend([0; 6].iter().copied());
            }
            TemporaryLed::Set {
                on_count,
                off_count,
                on_color,
                off_color,
                timer,
            } => {
                let [lsb, msb] = timer.to_le_bytes();
                buf.extend(
                    [2, on_count, off_count, on_color as u8, off_color as u8, lsb, msb]
                        .iter()
                        .copied(),
                );
            }
        }
        match self.permanent {
            PermanentLed::Nop => buf.extend([0; 5].iter().copied()),
            PermanentLed::Set {
                on_count,
                off_count,
                on_color,
                off_color,
            } => buf.extend(
                [1, on_count, off_count, on_color as u8, off_color as u8]
                    .iter()
                    .copied(),
            ),
        }
    }
}

/// Buzzer tones.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum BuzzerTone {
    None = 0,
    Off = 1,
    Default = 2,
}

/// Reader buzzer control.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BuzzerControl {
    pub reader: u8,
    pub tone: BuzzerTone,
    /// On time, units of 100 ms.
    pub on_count: u8,
    /// Off time, units of 100 ms.
    pub off_count: u8,
    /// Number of cycles, zero means forever.
    pub repeat: u8,
}

impl BuzzerControl {
    const LEN: usize = 5;

    fn write(&self, buf: &mut CommandBytes) {
        buf.extend(
            [
                self.reader,
                self.tone as u8,
                self.on_count,
                self.off_count,
                self.repeat,
            ]
            .iter()
            .copied(),
        );
    }
}

/// Text display modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum TextMode {
    PermanentNoWrap = 1,
    PermanentWrap = 2,
    TemporaryNoWrap = 3,
    TemporaryWrap = 4,
}

/// Text output to a reader display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCommand {
    pub reader: u8,
    pub mode: TextMode,
    /// Display time for temporary text, in seconds.
    pub temp_time: u8,
    pub row: u8,
    pub column: u8,
    text: ArrayVec<u8, MAX_TEXT_LEN>,
}

impl TextCommand {
    const HEADER_LEN: usize = 6;

    /// # Errors
    /// Returns [`Error::TextTooLong`] if `text` exceeds [`MAX_TEXT_LEN`] bytes.
    pub fn new(reader: u8, mode: TextMode, row: u8, column: u8, text: &[u8]) -> Result<Self, Error> {
        let mut buf = ArrayVec::new();
        buf.try_extend_from_slice(text)
            .map_err(|_| Error::TextTooLong { len: text.len() })?;
        Ok(Self {
            reader,
            mode,
            temp_time: 0,
            row,
            column,
            text: buf,
        })
    }

    pub fn text(&self) -> &[u8] {
        &self.text
    }

    fn write(&self, buf: &mut CommandBytes) {
        buf.extend(
            [
                self.reader,
                self.mode as u8,
                self.temp_time,
                self.row,
                self.column,
                self.text.len() as u8,
            ]
            .iter()
            .copied(),
        );
        buf.extend(self.text.iter().copied());
    }
}

/// New communication settings for a peripheral.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ComSet {
    pub address: Address,
    pub baud_rate: u32,
}

impl ComSet {
    const LEN: usize = 5;

    fn write(&self, buf: &mut CommandBytes) {
        buf.push(*self.address);
        buf.extend(self.baud_rate.to_le_bytes().iter().copied());
    }
}
