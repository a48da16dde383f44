#![no_main]

use bytes::BytesMut;
use kinetic_listener::protocol::{ActionCodec, ActionMessage};
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes from the daemon: truncated lines, invalid UTF-8,
    // overlong lines, bad base64 in records. Decoding may fail, never panic.
    let mut codec = ActionCodec::with_max_line_length(4096);
    let mut buf = BytesMut::from(data);

    loop {
        match codec.decode(&mut buf) {
            Ok(Some(ActionMessage::ProcessRecords { records })) => {
                for record in records {
                    let _ = record.into_message(Some("shardId-000000000000"));
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                let _ = codec.decode_eof(&mut buf);
                break;
            }
            Err(_) => break,
        }
    }

    if let Ok(line) = std::str::from_utf8(data) {
        let _ = ActionMessage::parse(line);
    }
});
