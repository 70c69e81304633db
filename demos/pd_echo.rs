//! Minimal peripheral on stdin/stdout, for trying the CP against a pipe or
//! a pty. Answers polls with ACK and ID requests with a fixed report.

use std::io::{self, Read, Write};

use anyhow::Result;
use log::{info, warn};
use osdp_cp::frame::{self, FrameDraft};
use osdp_cp::reply::code;
use osdp_cp::{addr, Address};

const ID_REPORT: [u8; 12] = [
    0xa1, 0xa2, 0xa3, 0xb1, 0xc1, 0xd1, 0xd2, 0xd3, 0xd4, 0x01, 0x00, 0x00,
];

fn respond(command: u8, payload: &[u8]) -> (u8, Vec<u8>) {
    info!("command 0x{:02x} {:02x?}", command, payload);
    match command {
        0x60 => (code::ACK, vec![]),
        0x61 => (code::PDID, ID_REPORT.to_vec()),
        0x64 => (code::LSTATR, vec![0, 0]),
        0x6a | 0x69 | 0x68 | 0x6b => (code::ACK, vec![]),
        // unknown command
        _ => (code::NAK, vec![0x03]),
    }
}

/// Take the next complete frame off the front of `rx`, if there is one.
fn next_frame(rx: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (consumed, received) = frame::split(rx);
    let received = received.map(<[u8]>::to_vec);
    rx.drain(..consumed);
    received
}

fn pd_main_loop(address: Address) -> Result<()> {
    let mut rx = Vec::new();
    let mut data_in = [0; 64];
    let mut stdout = io::stdout();

    loop {
        let len = io::stdin().read(&mut data_in)?;
        if len == 0 {
            break;
        }
        rx.extend_from_slice(&data_in[..len]);

        while let Some(received) = next_frame(&mut rx) {
            let command = match frame::decode_command(&received, address) {
                Ok(command) => command,
                Err(err) => {
                    warn!("dropping frame: {}", err);
                    continue;
                }
            };
            let (code, payload) = respond(command.code, command.payload);
            let reply = FrameDraft::reply(address, code, &payload)
                .sequence(command.sequence)
                .trailer(command.trailer)
                .to_frame()?;
            stdout.write_all(&reply)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let address = match std::env::args().nth(1) {
        Some(arg) => Address::new(arg.parse::<u8>()?)?,
        None => addr(101),
    };
    pd_main_loop(address)
}
