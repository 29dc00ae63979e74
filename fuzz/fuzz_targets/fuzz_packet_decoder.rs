//! Fuzz target: `Packet::decode` and the remaining-length varint.
//!
//! Feeds arbitrary bytes to the decoder and checks that it never panics,
//! never reports consuming more than it was given, and that whatever it
//! accepts re-encodes to the same bytes.
//!
//! cargo fuzz run fuzz_packet_decoder

#![no_main]

use fieldlink::protocol::codec::{self, Packet};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = codec::decode_remaining_length(data);

    let mut rest = data;
    while let Ok((packet, used)) = Packet::decode(rest) {
        assert!(used >= 2 && used <= rest.len(), "consumed {used} of {}", rest.len());

        // Non-minimal varints (e.g. 0x80 0x00) decode fine but re-encode
        // shorter, so compare the body rather than the raw prefix.
        let again = packet.encode().expect("decoded packet re-encodes");
        let (round, _) = Packet::decode(&again).expect("re-encoded packet decodes");
        assert_eq!(round, packet);

        rest = &rest[used..];
    }
});
