use nom::bytes::streaming::{tag, take};
use nom::combinator::verify;
use nom::number::streaming::le_u16;
use nom::sequence::{preceded, tuple};
use nom::Err::Incomplete;
use nom::IResult;

use crate::frame::{MARK, MAX_FRAME_LEN, MIN_FRAME_LEN, SOM};

type Buf = [u8];

const SYNC: &Buf = &[MARK, SOM];

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) enum FrameToken<'a> {
    /// A complete frame, ready for [`crate::frame::decode`].
    Frame(&'a Buf),
    /// A mark byte that doesn't start a plausible frame.
    Garbage,
    NeedData,
}

/// Find the next frame in a stream of received bytes.
///
/// Returns the number of bytes to consume from the front of `buf`
/// together with the token. Bytes ahead of the first mark byte are always
/// consumed; they can't be part of any frame.
pub(crate) fn parse_frame(buf: &Buf) -> (usize, FrameToken<'_>) {
    let skip = buf.iter().position(|&c| c == MARK).unwrap_or(buf.len());
    match frame(&buf[skip..]) {
        Ok((remaining, frame)) => (buf.len() - remaining.len(), FrameToken::Frame(frame)),
        Err(Incomplete(_)) => (skip, FrameToken::NeedData),
        Err(_) => (skip + 1, FrameToken::Garbage),
    }
}

fn header(buf: &Buf) -> IResult<&Buf, u16> {
    // MARK SOM ADDR, then the length field
    preceded(tuple((tag(SYNC), take(1_usize))), le_u16)(buf)
}

fn frame(buf: &Buf) -> IResult<&Buf, &Buf> {
    let (_, len) = verify(header, |len: &u16| {
        (MIN_FRAME_LEN - 1..MAX_FRAME_LEN).contains(&usize::from(*len))
    })(buf)?;
    // the length field doesn't count the mark byte
    take(usize::from(len) + 1)(buf)
}

pub(crate) mod reply {
    use nom::combinator::{map, rest};
    use nom::multi::length_data;
    use nom::number::complete::{le_u16, le_u24, le_u32, u8};
    use nom::sequence::tuple;
    use nom::IResult;

    use super::Buf;
    use crate::reply::IdentityRecord;

    /// vendor (3), model, version, serial (4), firmware major, minor, build
    pub(crate) fn pd_id(buf: &Buf) -> IResult<&Buf, IdentityRecord> {
        map(
            tuple((le_u24, u8, u8, le_u32, u8, u8, u8)),
            |(vendor_code, model, version, serial_number, major, minor, build)| IdentityRecord {
                vendor_code,
                model,
                version,
                serial_number,
                firmware_version: u32::from_be_bytes([0, major, minor, build]),
            },
        )(buf)
    }

    /// address, baud rate (LE)
    pub(crate) fn com(buf: &Buf) -> IResult<&Buf, (u8, u32)> {
        tuple((u8, le_u32))(buf)
    }

    /// tamper, power
    pub(crate) fn local_status(buf: &Buf) -> IResult<&Buf, (u8, u8)> {
        tuple((u8, u8))(buf)
    }

    /// reader, format, bit count (LE), data
    pub(crate) fn raw_card(buf: &Buf) -> IResult<&Buf, (u8, u8, u16, &Buf)> {
        tuple((u8, u8, le_u16, rest))(buf)
    }

    /// reader, digit count, digits
    pub(crate) fn keypad(buf: &Buf) -> IResult<&Buf, (u8, &Buf)> {
        tuple((u8, length_data(u8)))(buf)
    }

}
