use osdp_cp::command::{BuzzerControl, BuzzerTone};
use osdp_cp::cp::{ControlPanel, Received};
use osdp_cp::frame::{self, FrameDraft};
use osdp_cp::{addr, Command, CommandQueue, IdentityRecord, PeripheralConfig, Reply, TrailerMode};

const POLL_SEQ0: [u8; 9] = [0xff, 0x53, 0x65, 0x08, 0x00, 0x04, 0x60, 0x60, 0x90];
const ID_SEQ1: [u8; 10] = [0xff, 0x53, 0x65, 0x09, 0x00, 0x05, 0x61, 0x00, 0xe9, 0x4d];
const ACK_SEQ0: [u8; 9] = [0xff, 0x53, 0xe5, 0x08, 0x00, 0x04, 0x40, 0xd2, 0x96];
const ACK_SEQ1: [u8; 9] = [0xff, 0x53, 0xe5, 0x08, 0x00, 0x05, 0x40, 0xe3, 0xa5];

fn done(received: Received<'_>) -> Reply {
    match received {
        Received::Done(reply) => reply,
        Received::NeedData(_) => panic!("reply incomplete"),
    }
}

#[test]
fn test_poll_then_id() {
    let mut cp = ControlPanel::new();
    let pd = cp.add(PeripheralConfig::new(101).unwrap());

    let exchange = cp.begin(pd).unwrap();
    assert_eq!(exchange.frame(), &POLL_SEQ0[..]);
    assert!(!exchange.is_command());
    assert_eq!(done(exchange.receive_data(&ACK_SEQ0).unwrap()), Reply::Ack);

    cp.enqueue(pd, Command::Id).unwrap();
    let exchange = cp.begin(pd).unwrap();
    assert_eq!(exchange.frame(), &ID_SEQ1[..]);
    assert!(exchange.is_command());
    assert_eq!(done(exchange.receive_data(&ACK_SEQ1).unwrap()), Reply::Ack);
    assert!(cp.peripheral(pd).unwrap().queue().is_empty());
}

#[test]
fn test_ack_decode() {
    let decoded = frame::decode_reply(&ACK_SEQ1, addr(101)).unwrap();
    assert_eq!(decoded.code, 0x40);
    assert!(decoded.payload.is_empty());
    assert_eq!(*decoded.sequence, 1);
    assert_eq!(decoded.trailer, TrailerMode::Crc16);
}

#[test]
fn test_poll_seen_by_peripheral() {
    let decoded = frame::decode_command(&POLL_SEQ0, addr(101)).unwrap();
    assert_eq!(decoded.code, 0x60);
    assert!(decoded.payload.is_empty());
    assert_eq!(*decoded.sequence, 0);
}

#[test]
fn test_buzzer_with_checksum() {
    let buzzer = Command::Buzzer(BuzzerControl {
        reader: 101,
        tone: BuzzerTone::None,
        on_count: 10,
        off_count: 10,
        repeat: 0,
    });
    let encoded = buzzer.encode().unwrap();
    assert_eq!(encoded.as_slice(), &[0x6a, 0x65, 0x00, 0x0a, 0x0a, 0x00]);

    let expected = [
        0xff, 0x53, 0x65, 0x0c, 0x00, 0x00, 0x6a, 0x65, 0x00, 0x0a, 0x0a, 0x00, 0x59,
    ];
    let frame = FrameDraft::command(addr(101), encoded[0], &encoded[1..])
        .trailer(TrailerMode::Checksum)
        .to_frame()
        .unwrap();
    assert_eq!(frame.as_slice(), &expected);

    let mut cp = ControlPanel::new();
    let pd = cp.add(PeripheralConfig::new(101).unwrap().trailer(TrailerMode::Checksum));
    cp.enqueue(pd, buzzer).unwrap();
    assert_eq!(cp.begin(pd).unwrap().frame(), &expected);
}

#[test]
fn test_identification_report() {
    let reply = Reply::from_bytes(&[
        0x45, 0xa1, 0xa2, 0xa3, 0xb1, 0xc1, 0xd1, 0xd2, 0xd3, 0xd4, 0xe1, 0xe2, 0xe3,
    ])
    .unwrap();
    let expected = IdentityRecord {
        vendor_code: 0x00a3_a2a1,
        model: 0xb1,
        version: 0xc1,
        serial_number: 0xd4d3_d2d1,
        firmware_version: 0x00e1_e2e3,
    };
    assert_eq!(reply, Reply::Id(expected));

    // the same report arriving through an exchange updates the peripheral
    let mut cp = ControlPanel::new();
    let pd = cp.add(PeripheralConfig::new(101).unwrap());
    let payload = [0xa1, 0xa2, 0xa3, 0xb1, 0xc1, 0xd1, 0xd2, 0xd3, 0xd4, 0xe1, 0xe2, 0xe3];
    let frame = FrameDraft::reply(addr(101), 0x45, &payload).to_frame().unwrap();
    cp.enqueue(pd, Command::Id).unwrap();
    let exchange = cp.begin(pd).unwrap();
    assert_eq!(done(exchange.receive_data(&frame).unwrap()), Reply::Id(expected));
    assert_eq!(cp.peripheral(pd).unwrap().identity(), Some(&expected));
}

#[test]
fn test_queue_mixed_sizes() {
    let mut queue = CommandQueue::new();
    for &len in &[96_usize, 32, 16] {
        let body: Vec<u8> = (1..len as u8).collect();
        queue.enqueue(Command::raw(0x80, &body).unwrap()).unwrap();
        let peeked = queue.peek().unwrap().bytes().to_vec();
        let entry = queue.dequeue().unwrap();
        assert_eq!(entry.bytes(), peeked.as_slice());
        assert_eq!(entry.bytes().len(), len);
    }
    assert!(queue.dequeue().is_none());
}

#[test]
fn test_reply_split_across_reads() {
    let mut cp = ControlPanel::new();
    let pd = cp.add(PeripheralConfig::new(101).unwrap());
    let mut exchange = cp.begin(pd).unwrap();

    // line noise ahead of the reply, then the reply a few bytes at a time
    let mut input = vec![0x00, 0x12, 0xff, 0x00];
    input.extend_from_slice(&ACK_SEQ0);
    let mut chunks = input.chunks(3).peekable();
    let reply = loop {
        let chunk = chunks.next().unwrap();
        match exchange.receive_data(chunk).unwrap() {
            Received::NeedData(next) => exchange = next,
            Received::Done(reply) => break reply,
        }
    };
    assert_eq!(reply, Reply::Ack);
    assert!(chunks.peek().is_none());
}

#[test]
fn test_corrupt_reply_keeps_command() {
    let mut cp = ControlPanel::new();
    let pd = cp.add(PeripheralConfig::new(101).unwrap());
    cp.enqueue(pd, Command::Id).unwrap();

    let exchange = cp.begin(pd).unwrap();
    assert_eq!(*exchange.sequence(), 0);
    let mut corrupt = ACK_SEQ0;
    corrupt[6] ^= 0x01;
    let err = exchange.receive_data(&corrupt).unwrap_err();
    assert!(err.is_transmission_error());

    let pd_state = cp.peripheral(pd).unwrap();
    assert_eq!(pd_state.queue().len(), 1);
    assert!(pd_state.awaiting_reply());

    let exchange = cp.begin(pd).unwrap();
    assert!(exchange.is_retransmission());
    assert_eq!(*exchange.sequence(), 0);
    assert_eq!(done(exchange.receive_data(&ACK_SEQ0).unwrap()), Reply::Ack);
    assert!(cp.peripheral(pd).unwrap().queue().is_empty());
}

#[test]
fn test_busy_and_nak() {
    let mut cp = ControlPanel::new();
    let pd = cp.add(PeripheralConfig::new(101).unwrap());
    cp.enqueue(pd, Command::LocalStatus).unwrap();

    let busy = FrameDraft::reply(addr(101), 0x79, &[]).to_frame().unwrap();
    let exchange = cp.begin(pd).unwrap();
    assert_eq!(done(exchange.receive_data(&busy).unwrap()), Reply::Busy);
    assert_eq!(cp.peripheral(pd).unwrap().queue().len(), 1);

    // a sequence number NAK drops the command and restarts numbering
    let exchange = cp.begin(pd).unwrap();
    assert!(exchange.is_retransmission());
    let nak = FrameDraft::reply(addr(101), 0x41, &[0x04]).to_frame().unwrap();
    assert!(matches!(
        done(exchange.receive_data(&nak).unwrap()),
        Reply::Nak(_)
    ));
    assert!(cp.peripheral(pd).unwrap().queue().is_empty());
    assert_eq!(*cp.begin(pd).unwrap().sequence(), 0);
}

#[test]
fn test_unknown_peripheral() {
    let mut cp = ControlPanel::new();
    let pd = cp.add(PeripheralConfig::new(1).unwrap());
    let mut other = ControlPanel::new();
    other.add(PeripheralConfig::new(1).unwrap());
    other.add(PeripheralConfig::new(2).unwrap());
    let missing = other.pds().last().unwrap();
    assert!(cp.begin(missing).is_err());
    assert!(cp.begin(pd).is_ok());
}

#[test]
fn test_stale_reply_does_not_complete_command() {
    let mut cp = ControlPanel::new();
    let pd = cp.add(PeripheralConfig::new(101).unwrap());

    // a poll goes unanswered, then a command supersedes it
    cp.begin(pd).unwrap().abandon();
    cp.enqueue(
        pd,
        Command::Buzzer(BuzzerControl {
            reader: 0,
            tone: BuzzerTone::Default,
            on_count: 1,
            off_count: 1,
            repeat: 1,
        }),
    )
    .unwrap();
    let exchange = cp.begin(pd).unwrap();
    assert_eq!(*exchange.sequence(), 1);

    // the late answer to the poll arrives
    let err = exchange.receive_data(&ACK_SEQ0).unwrap_err();
    assert!(matches!(
        err,
        osdp_cp::cp::Error::SequenceMismatch {
            expected: 1,
            found: 0
        }
    ));
    assert!(err.is_transmission_error());
    assert_eq!(cp.peripheral(pd).unwrap().queue().len(), 1);

    let exchange = cp.begin(pd).unwrap();
    assert!(exchange.is_retransmission());
    assert_eq!(done(exchange.receive_data(&ACK_SEQ1).unwrap()), Reply::Ack);
    assert!(cp.peripheral(pd).unwrap().queue().is_empty());
}

#[test]
fn test_withdrawn_command_gets_fresh_sequence() {
    let mut cp = ControlPanel::new();
    let pd = cp.add(PeripheralConfig::new(101).unwrap());
    cp.enqueue(pd, Command::Id).unwrap();
    let exchange = cp.begin(pd).unwrap();
    assert_eq!(*exchange.sequence(), 0);
    exchange.abandon();

    cp.peripheral_mut(pd).unwrap().clear_queue();
    cp.enqueue(pd, Command::Capabilities).unwrap();
    let exchange = cp.begin(pd).unwrap();
    assert!(!exchange.is_retransmission());
    assert_eq!(*exchange.sequence(), 1);
    assert_eq!(exchange.frame()[6], 0x62);
}
