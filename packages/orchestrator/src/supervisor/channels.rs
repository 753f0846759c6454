//! Per-worker ephemeral channels: a live output log and an input
//! queue, held in a registry keyed by worker slot.
//!
//! External callers (dashboards, operators) interact with a running
//! worker only through these handles. Lifecycle is tied to the
//! worker: registering a slot replaces any prior handles, closing it
//! drops the input queue while the log stays readable with its final
//! `is_running = false` flag.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One offset read of a worker's live log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRead {
    /// Lines appended since the caller's offset
    pub lines: Vec<String>,
    /// Total complete lines now in the log, the caller's next offset
    pub total: usize,
    pub is_running: bool,
}

#[derive(Default)]
struct LiveLogState {
    lines: Vec<String>,
    /// Bytes of the last line until its terminator arrives
    partial: String,
    running: bool,
}

/// Append-only output log for one worker, read by line offset.
pub struct LiveLog {
    state: Mutex<LiveLogState>,
}

impl LiveLog {
    fn new() -> Self {
        Self {
            state: Mutex::new(LiveLogState {
                running: true,
                ..Default::default()
            }),
        }
    }

    /// Append one already-cleaned output chunk. Chunks split lines
    /// arbitrarily; a line is only published once its newline arrives.
    pub fn append_chunk(&self, chunk: &str) {
        let mut state = self.state.lock().unwrap();
        let mut rest = chunk;
        while let Some(pos) = rest.find('\n') {
            let (head, tail) = rest.split_at(pos);
            let line = format!("{}{}", state.partial, head);
            state.partial.clear();
            state.lines.push(line);
            rest = &tail[1..];
        }
        state.partial.push_str(rest);
    }

    /// Lines appended since `offset` complete lines were last seen.
    pub fn read_from(&self, offset: usize) -> LogRead {
        let state = self.state.lock().unwrap();
        let lines = if offset < state.lines.len() {
            state.lines[offset..].to_vec()
        } else {
            Vec::new()
        };
        LogRead {
            lines,
            total: state.lines.len(),
            is_running: state.running,
        }
    }

    /// The last `n` characters of everything logged, including any
    /// unterminated final line.
    pub fn tail_chars(&self, n: usize) -> String {
        let state = self.state.lock().unwrap();
        let mut full = state.lines.join("\n");
        if !state.partial.is_empty() {
            if !full.is_empty() {
                full.push('\n');
            }
            full.push_str(&state.partial);
        }
        let chars: Vec<char> = full.chars().collect();
        let start = chars.len().saturating_sub(n);
        chars[start..].iter().collect()
    }

    pub fn mark_exited(&self) {
        self.state.lock().unwrap().running = false;
    }
}

/// Pending input for one worker, forwarded verbatim by the relay.
///
/// Callers append text (including their own line terminator); the
/// relay repeatedly takes whatever arrived since its last take.
pub struct InputQueue {
    pending: Mutex<Vec<u8>>,
}

impl InputQueue {
    fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn append(&self, text: &str) {
        self.pending.lock().unwrap().extend_from_slice(text.as_bytes());
    }

    /// Drain everything appended since the last take.
    pub fn take_new(&self) -> Vec<u8> {
        std::mem::take(&mut *self.pending.lock().unwrap())
    }
}

/// The channel handles for one registered worker slot.
#[derive(Clone)]
pub struct WorkerChannels {
    pub live_log: Arc<LiveLog>,
    pub input: Arc<InputQueue>,
}

#[derive(Default)]
struct RegistryState {
    logs: HashMap<i32, Arc<LiveLog>>,
    inputs: HashMap<i32, Arc<InputQueue>>,
}

/// Registry of per-slot channels, owned by the supervisor.
#[derive(Default)]
pub struct ChannelRegistry {
    state: Mutex<RegistryState>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open fresh channels for a slot, replacing any prior ones.
    pub fn register(&self, slot: i32) -> WorkerChannels {
        let channels = WorkerChannels {
            live_log: Arc::new(LiveLog::new()),
            input: Arc::new(InputQueue::new()),
        };
        let mut state = self.state.lock().unwrap();
        state.logs.insert(slot, Arc::clone(&channels.live_log));
        state.inputs.insert(slot, Arc::clone(&channels.input));
        channels
    }

    /// Read the slot's live log from a line offset.
    pub fn read_log(&self, slot: i32, offset: usize) -> Option<LogRead> {
        let log = self.state.lock().unwrap().logs.get(&slot).cloned()?;
        Some(log.read_from(offset))
    }

    /// Queue input for the slot's worker. Returns `false` when the
    /// worker is not running (no input queue exists).
    pub fn push_input(&self, slot: i32, text: &str) -> bool {
        let input = self.state.lock().unwrap().inputs.get(&slot).cloned();
        match input {
            Some(input) => {
                input.append(text);
                true
            }
            None => false,
        }
    }

    /// Mark the slot exited: the log stops reporting `is_running`
    /// and the input queue is dropped.
    pub fn close(&self, slot: i32) {
        let mut state = self.state.lock().unwrap();
        if let Some(log) = state.logs.get(&slot) {
            log.mark_exited();
        }
        state.inputs.remove(&slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_reads_return_only_new_lines() {
        let log = LiveLog::new();
        log.append_chunk("one\ntwo\n");

        let first = log.read_from(0);
        assert_eq!(first.lines, vec!["one", "two"]);
        assert_eq!(first.total, 2);
        assert!(first.is_running);

        log.append_chunk("three\nfour\nfive\n");
        let second = log.read_from(first.total);
        assert_eq!(second.lines, vec!["three", "four", "five"]);
        assert_eq!(second.total, 5);

        // Re-reading at the new offset yields nothing
        let third = log.read_from(second.total);
        assert!(third.lines.is_empty());
        assert_eq!(third.total, 5);
    }

    #[test]
    fn lines_split_across_chunks_are_joined() {
        let log = LiveLog::new();
        log.append_chunk("hel");
        log.append_chunk("lo\nwor");
        assert_eq!(log.read_from(0).lines, vec!["hello"]);
        log.append_chunk("ld\n");
        assert_eq!(log.read_from(1).lines, vec!["world"]);
    }

    #[test]
    fn tail_includes_unterminated_output() {
        let log = LiveLog::new();
        log.append_chunk("alpha\nbeta\ngamma");
        assert_eq!(log.tail_chars(10), "beta\ngamma");
        assert_eq!(log.tail_chars(1000), "alpha\nbeta\ngamma");
    }

    #[test]
    fn input_queue_drains_once() {
        let queue = InputQueue::new();
        queue.append("status\n");
        assert_eq!(queue.take_new(), b"status\n");
        assert!(queue.take_new().is_empty());
        queue.append("quit\n");
        assert_eq!(queue.take_new(), b"quit\n");
    }

    #[test]
    fn closed_slot_rejects_input_but_keeps_log() {
        let registry = ChannelRegistry::new();
        let channels = registry.register(7);
        channels.live_log.append_chunk("done\n");

        registry.close(7);
        assert!(!registry.push_input(7, "too late\n"));

        let read = registry.read_log(7, 0).unwrap();
        assert_eq!(read.lines, vec!["done"]);
        assert!(!read.is_running);
    }

    #[test]
    fn register_replaces_prior_channels() {
        let registry = ChannelRegistry::new();
        let old = registry.register(1);
        old.live_log.append_chunk("stale\n");

        registry.register(1);
        let read = registry.read_log(1, 0).unwrap();
        assert!(read.lines.is_empty());
    }
}
