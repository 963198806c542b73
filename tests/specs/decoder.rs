//! Event-stream resilience: malformed lines never kill a turn.

use fedi_adapters::EventStreamDecoder;

#[test]
fn bad_line_is_skipped_and_stream_continues() {
    let mut decoder = EventStreamDecoder::new();
    let events = decoder.feed(b"{bad json\n{\"type\":\"result\"}\n");

    // The malformed line produced nothing; the terminal event survived
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "result");
    assert_eq!(decoder.decode_errors(), 1);
}

#[test]
fn split_chunks_reassemble_across_feeds() {
    let mut decoder = EventStreamDecoder::new();
    assert!(decoder.feed(b"{\"type\":\"assistant\",\"message\"").is_empty());
    let events = decoder.feed(b":{\"content\":[]}}\n");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "assistant");
}
