mod common;

use eval_pulse::log_buffer::{LogBuffer, DEFAULT_CAPACITY};
use eval_pulse::types::Severity;

use common::{at, make_entry};

#[test]
fn default_capacity_is_twenty() {
    let buffer = LogBuffer::default();
    assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
    assert_eq!(buffer.capacity(), 20);
    assert!(buffer.is_empty());
}

#[test]
fn never_grows_beyond_capacity() {
    let mut buffer = LogBuffer::with_capacity(5);
    for i in 0..50 {
        buffer.append(make_entry(i, Severity::Info, &format!("step {}", i)));
        assert!(buffer.len() <= 5);
    }
    assert_eq!(buffer.len(), 5);
}

#[test]
fn overflow_keeps_last_n_in_order() {
    let mut buffer = LogBuffer::with_capacity(4);
    for i in 0..7 {
        buffer.append(make_entry(i, Severity::Info, &format!("msg {}", i)));
    }
    let messages: Vec<&str> = buffer.entries().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, vec!["msg 3", "msg 4", "msg 5", "msg 6"]);
    assert_eq!(buffer.last().map(|e| e.message.as_str()), Some("msg 6"));
}

#[test]
fn zero_capacity_holds_one_entry() {
    let mut buffer = LogBuffer::with_capacity(0);
    assert_eq!(buffer.capacity(), 1);
    buffer.append(make_entry(0, Severity::Info, "a"));
    buffer.append(make_entry(1, Severity::Error, "b"));
    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.last().map(|e| e.message.as_str()), Some("b"));
}

#[test]
fn earlier_timestamp_is_raised_to_previous() {
    let mut buffer = LogBuffer::with_capacity(3);
    buffer.append(make_entry(10, Severity::Info, "later"));
    buffer.append(make_entry(5, Severity::Info, "clock went back"));
    let stamps: Vec<_> = buffer.entries().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![at(10), at(10)]);
}

#[test]
fn entries_can_be_walked_newest_first() {
    let mut buffer = LogBuffer::with_capacity(3);
    buffer.append(make_entry(0, Severity::Info, "a"));
    buffer.append(make_entry(1, Severity::Success, "b"));
    let newest: Vec<&str> = buffer.entries().rev().map(|e| e.message.as_str()).collect();
    assert_eq!(newest, vec!["b", "a"]);
    assert_eq!(buffer.entries().len(), 2);
}
